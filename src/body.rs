//! Definitions for the Request and Response bodies.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use futures_util::stream::Stream;
use http_body::{Body as HttpBody, Frame};
use pin_project::pin_project;

use crate::async_stream::AsyncStream;

/// Body is returned by the webdav handler, and implements both `Stream`
/// and `http_body::Body`.
pub struct Body {
    pub(crate) inner: BodyType,
}

pub(crate) enum BodyType {
    Bytes(Option<Bytes>),
    AsyncStream(AsyncStream<Bytes, io::Error>),
    Empty,
}

impl Body {
    /// Return an empty body.
    pub fn empty() -> Body {
        Body { inner: BodyType::Empty }
    }
}

impl Stream for Body {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        match self.inner {
            BodyType::Bytes(ref mut strm) => Poll::Ready(strm.take().map(|b| Ok(b))),
            BodyType::AsyncStream(ref mut strm) => {
                let strm = Pin::new(strm);
                strm.poll_next(cx)
            },
            BodyType::Empty => Poll::Ready(None),
        }
    }
}

impl HttpBody for Body {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>>
    {
        self.poll_next(cx).map(|o| o.map(|r| r.map(Frame::data)))
    }
}

impl From<String> for Body {
    fn from(t: String) -> Body {
        Body { inner: BodyType::Bytes(Some(Bytes::from(t))) }
    }
}

impl From<&str> for Body {
    fn from(t: &str) -> Body {
        Body { inner: BodyType::Bytes(Some(Bytes::from(t.to_string()))) }
    }
}

impl From<Bytes> for Body {
    fn from(t: Bytes) -> Body {
        Body { inner: BodyType::Bytes(Some(t)) }
    }
}

impl From<AsyncStream<Bytes, io::Error>> for Body {
    fn from(s: AsyncStream<Bytes, io::Error>) -> Body {
        Body { inner: BodyType::AsyncStream(s) }
    }
}

/// Adapts any incoming `http_body::Body` into a plain byte `Stream`, the
/// way the rest of the crate (request draining, PUT) wants to consume it.
#[pin_project]
pub(crate) struct InBody<B> {
    #[pin]
    inner: http_body_util::BodyDataStream<B>,
}

impl<B> From<B> for InBody<B>
where B: HttpBody
{
    fn from(body: B) -> InBody<B> {
        InBody { inner: http_body_util::BodyDataStream::new(body) }
    }
}

impl<B> Stream for InBody<B>
where
    B: HttpBody,
    B::Data: Buf,
{
    type Item = Result<Bytes, B::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        this.inner.poll_next(cx).map(|o| {
            o.map(|r| r.map(|mut buf| buf.copy_to_bytes(buf.remaining())))
        })
    }
}
