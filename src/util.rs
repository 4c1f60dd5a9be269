use std::io::{Cursor, Write};
use std::time::SystemTime;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::method::InvalidMethod;
use http::StatusCode;

use crate::body::Body;
use crate::errors::DavError;
use crate::DavResult;

/// HTTP Methods supported by DavHandler.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
#[repr(u32)]
pub enum Method {
    Head      = 0x0001,
    Get       = 0x0002,
    Put       = 0x0004,
    Patch     = 0x0008,
    Options   = 0x0010,
    PropFind  = 0x0020,
    PropPatch = 0x0040,
    MkCol     = 0x0080,
    Copy      = 0x0100,
    Move      = 0x0200,
    Delete    = 0x0400,
    Lock      = 0x0800,
    Unlock    = 0x1000,
}

// translate method into our own enum that has webdav methods as well.
pub(crate) fn dav_method(m: &http::Method) -> DavResult<Method> {
    let m = match m {
        &http::Method::HEAD => Method::Head,
        &http::Method::GET => Method::Get,
        &http::Method::PUT => Method::Put,
        &http::Method::PATCH => Method::Patch,
        &http::Method::DELETE => Method::Delete,
        &http::Method::OPTIONS => Method::Options,
        _ => {
            match m.as_str() {
                "PROPFIND" => Method::PropFind,
                "PROPPATCH" => Method::PropPatch,
                "MKCOL" => Method::MkCol,
                "COPY" => Method::Copy,
                "MOVE" => Method::Move,
                "LOCK" => Method::Lock,
                "UNLOCK" => Method::Unlock,
                _ => {
                    return Err(DavError::UnknownDavMethod);
                },
            }
        },
    };
    Ok(m)
}

// for external use.
impl std::convert::TryFrom<&http::Method> for Method {
    type Error = InvalidMethod;

    fn try_from(value: &http::Method) -> Result<Self, Self::Error> {
        dav_method(value).map_err(|_| {
            // A trick to get at the value of http::method::InvalidMethod.
            http::method::Method::from_bytes(b"").unwrap_err()
        })
    }
}

/// A set of allowed [`Method`]s.
///
/// [`Method`]: enum.Method.html
#[derive(Clone, Copy, Debug)]
pub struct AllowedMethods(u32);

impl AllowedMethods {
    pub const HTTP_RO: AllowedMethods =
        AllowedMethods(Method::Get as u32 | Method::Head as u32 | Method::Options as u32);
    pub const HTTP_RW: AllowedMethods = AllowedMethods(Self::HTTP_RO.0 | Method::Put as u32);
    pub const WEBDAV_RO: AllowedMethods = AllowedMethods(Self::HTTP_RO.0 | Method::PropFind as u32);
    pub const WEBDAV_RW: AllowedMethods = AllowedMethods(0xffffffff);

    /// New set, all methods allowed.
    pub fn all() -> AllowedMethods {
        AllowedMethods(0xffffffff)
    }

    /// New empty set.
    pub fn none() -> AllowedMethods {
        AllowedMethods(0)
    }

    /// Add a method.
    pub fn add(&mut self, m: Method) -> &Self {
        self.0 |= m as u32;
        self
    }

    /// Remove a method.
    pub fn remove(&mut self, m: Method) -> &Self {
        self.0 &= !(m as u32);
        self
    }

    /// Check if a method is in the set.
    pub fn contains(&self, m: Method) -> bool {
        self.0 & (m as u32) > 0
    }

    /// Alias of [`contains`](Self::contains), read naturally at call sites
    /// that check whether a request method is allowed.
    pub fn allowed(&self, m: Method) -> bool {
        self.contains(m)
    }

    /// Generate an AllowedMethods from a list of words.
    pub fn from_vec(v: Vec<impl AsRef<str>>) -> Result<AllowedMethods, InvalidMethod> {
        let mut m: u32 = 0;
        for w in &v {
            m |= match w.as_ref().to_lowercase().as_str() {
                "head" => Method::Head as u32,
                "get" => Method::Get as u32,
                "put" => Method::Put as u32,
                "patch" => Method::Patch as u32,
                "delete" => Method::Delete as u32,
                "options" => Method::Options as u32,
                "propfind" => Method::PropFind as u32,
                "proppatch" => Method::PropPatch as u32,
                "mkcol" => Method::MkCol as u32,
                "copy" => Method::Copy as u32,
                "move" => Method::Move as u32,
                "lock" => Method::Lock as u32,
                "unlock" => Method::Unlock as u32,
                "http-ro" => Self::HTTP_RO.0,
                "http-rw" => Self::HTTP_RW.0,
                "webdav-ro" => Self::WEBDAV_RO.0,
                "webdav-rw" => Self::WEBDAV_RW.0,
                _ => {
                    // A trick to get at the value of http::method::InvalidMethod.
                    let invalid_method = http::method::Method::from_bytes(b"").unwrap_err();
                    return Err(invalid_method);
                },
            };
        }
        Ok(AllowedMethods(m))
    }
}

pub(crate) fn dav_xml_error(body: &str) -> Body {
    let xml = format!(
        "{}\n{}\n{}\n{}\n",
        r#"<?xml version="1.0" encoding="utf-8" ?>"#, r#"<D:error xmlns:D="DAV:">"#, body, r#"</D:error>"#
    );
    Body::from(xml)
}

/// A bare 404 response, used when no filesystem is configured or a path
/// cannot be mapped at all.
pub(crate) fn notfound() -> http::Response<Body> {
    http::Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Body::from(""))
        .unwrap()
}

pub(crate) fn systemtime_to_chrono(t: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(t)
}

pub(crate) fn systemtime_to_httpdate(t: SystemTime) -> String {
    let d = headers::Date::from(t);
    let mut v = Vec::new();
    use headers::Header;
    d.encode(&mut v);
    v[0].to_str().unwrap().to_owned()
}

pub(crate) fn systemtime_to_rfc3339(t: SystemTime) -> String {
    // 1996-12-19T16:39:57Z
    systemtime_to_chrono(t).to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

// A buffer that implements "Write".
#[derive(Clone)]
pub(crate) struct MemBuffer(Cursor<Vec<u8>>);

impl MemBuffer {
    pub fn new() -> MemBuffer {
        MemBuffer(Cursor::new(Vec::new()))
    }

    pub fn take(&mut self) -> Bytes {
        let buf = std::mem::replace(self.0.get_mut(), Vec::new());
        self.0.set_position(0);
        Bytes::from(buf)
    }
}

impl Write for MemBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    #[test]
    fn test_rfc3339() {
        assert!(systemtime_to_rfc3339(UNIX_EPOCH) == "1970-01-01T00:00:00Z");
    }
}
