//! Multi-Status response builder (RFC 4918 §13) for DELETE/COPY/MOVE.
//!
//! PROPFIND/PROPPATCH build their own multistatus body directly in
//! `handle_props`, since every property needs its own per-property status.
//! The handlers here only ever attach a single status to a path, so this
//! collects `(DavPath, StatusCode)` pairs and collapses down to a bare
//! status code when there's exactly one, and it's for the request path
//! itself - the common case where the whole operation just worked.

use http::{Response, StatusCode};
use xml::common::XmlVersion;
use xml::writer::EventWriter;
use xml::writer::XmlEvent as XmlWEvent;

use crate::body::Body;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::util::MemBuffer;
use crate::DavResult;

pub(crate) struct MultiError {
    req_path: DavPath,
    items:    Vec<(DavPath, StatusCode)>,
}

impl MultiError {
    pub(crate) fn new(req_path: &DavPath) -> MultiError {
        MultiError {
            req_path: req_path.clone(),
            items:    Vec::new(),
        }
    }

    /// Record a status for `path`. Never fails - worst case the operation
    /// just accumulates one more multistatus entry.
    pub(crate) fn add_status(&mut self, path: &DavPath, status: impl Into<DavError>) {
        let status = status.into().statuscode();
        debug!("multierror: {} {}", path, status);
        self.items.push((path.clone(), status));
    }

    /// Finish up. If nothing was recorded, or the only thing recorded was
    /// `default`-ish success for the request path itself, return a plain
    /// status response. Otherwise, a `207 Multi-Status` body.
    pub(crate) fn finalstatus(self, path: &DavPath, default: StatusCode) -> DavResult<Response<Body>> {
        if self.items.is_empty() {
            return Ok(Response::builder()
                .status(default)
                .body(Body::empty())
                .unwrap());
        }
        if self.items.len() == 1 && &self.items[0].0 == path {
            let status = self.items[0].1;
            return Ok(Response::builder().status(status).body(Body::empty()).unwrap());
        }
        self.close()
    }

    /// Always emit a multistatus body, even if only one item was recorded.
    pub(crate) fn close(self) -> DavResult<Response<Body>> {
        let mut xw = EventWriter::new_with_config(
            MemBuffer::new(),
            xml::EmitterConfig {
                perform_indent: false,
                ..xml::EmitterConfig::default()
            },
        );
        xw.write(XmlWEvent::StartDocument {
            version:    XmlVersion::Version10,
            encoding:   Some("utf-8"),
            standalone: None,
        })?;
        xw.write(XmlWEvent::start_element("D:multistatus").ns("D", "DAV:"))?;
        for (path, status) in &self.items {
            write_response(&mut xw, path, *status)?;
        }
        xw.write(XmlWEvent::end_element())?;

        let body = xw.inner_mut().take();
        Ok(Response::builder()
            .header("content-type", "application/xml; charset=utf-8")
            .status(StatusCode::MULTI_STATUS)
            .body(Body::from(body))
            .unwrap())
    }
}

fn write_elem(xw: &mut EventWriter<MemBuffer>, name: &str, text: &str) -> Result<(), DavError> {
    xw.write(XmlWEvent::start_element(name))?;
    if !text.is_empty() {
        xw.write(XmlWEvent::characters(text))?;
    }
    xw.write(XmlWEvent::end_element())?;
    Ok(())
}

fn write_response(xw: &mut EventWriter<MemBuffer>, path: &DavPath, sc: StatusCode) -> Result<(), DavError> {
    xw.write(XmlWEvent::start_element("D:response"))?;
    write_elem(xw, "D:href", &path.as_url_string_with_prefix())?;
    write_elem(xw, "D:status", &format!("HTTP/1.1 {}", sc))?;
    xw.write(XmlWEvent::end_element())?;
    Ok(())
}
