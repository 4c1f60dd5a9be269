//! Response compression negotiation (SPEC_FULL.md §4.7).
//!
//! Only applies to already-buffered `BodyType::Bytes` responses (multistatus,
//! property, and error XML bodies). Streaming GET bodies are served
//! identity-encoded; see DESIGN.md's Open Questions for why.

use std::io::{self, Read, Write};

use flate2::read::DeflateEncoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use http::Response;

use crate::body::{Body, BodyType};
use crate::davheaders::{AcceptEncoding, ContentCoding};

// server-side preference order when several codings are equally acceptable.
const PREFERENCE: &[ContentCoding] = &[ContentCoding::Br, ContentCoding::Gzip, ContentCoding::Deflate];

fn compress(data: &[u8], coding: ContentCoding) -> io::Result<Vec<u8>> {
    match coding {
        ContentCoding::Gzip | ContentCoding::XGzip => {
            let mut enc = GzEncoder::new(Vec::new(), Compression::default());
            enc.write_all(data)?;
            enc.finish()
        },
        ContentCoding::Deflate => {
            let mut enc = DeflateEncoder::new(data, Compression::default());
            let mut out = Vec::new();
            enc.read_to_end(&mut out)?;
            Ok(out)
        },
        ContentCoding::Br => {
            let mut out = Vec::new();
            let mut reader = brotli::CompressorReader::new(data, 4096, 5, 22);
            reader.read_to_end(&mut out)?;
            Ok(out)
        },
        ContentCoding::Identity => Ok(data.to_vec()),
    }
}

fn coding_name(coding: ContentCoding) -> &'static str {
    match coding {
        ContentCoding::Gzip => "gzip",
        ContentCoding::XGzip => "x-gzip",
        ContentCoding::Deflate => "deflate",
        ContentCoding::Br => "br",
        ContentCoding::Identity => "identity",
    }
}

// pick the best-quality coding this server knows how to produce.
fn negotiate(accept: Option<&AcceptEncoding>) -> ContentCoding {
    let accept = match accept {
        Some(a) => a,
        None => return ContentCoding::Identity,
    };
    // fold instead of max_by: on a quality tie, keep the earlier (more
    // preferred) coding rather than the later one.
    let mut best: Option<(ContentCoding, f32)> = None;
    for &coding in PREFERENCE {
        let q = accept.quality(coding);
        if q <= 0.0 {
            continue;
        }
        if best.map(|(_, bq)| q > bq).unwrap_or(true) {
            best = Some((coding, q));
        }
    }
    best.map(|(c, _)| c).unwrap_or(ContentCoding::Identity)
}

fn decompress(data: &[u8], coding: ContentCoding) -> io::Result<Vec<u8>> {
    match coding {
        ContentCoding::Gzip | ContentCoding::XGzip => {
            let mut dec = flate2::read::GzDecoder::new(data);
            let mut out = Vec::new();
            dec.read_to_end(&mut out)?;
            Ok(out)
        },
        ContentCoding::Deflate => {
            let mut dec = flate2::read::DeflateDecoder::new(data);
            let mut out = Vec::new();
            dec.read_to_end(&mut out)?;
            Ok(out)
        },
        ContentCoding::Br => {
            let mut out = Vec::new();
            let mut reader = brotli::Decompressor::new(data, 4096);
            reader.read_to_end(&mut out)?;
            Ok(out)
        },
        ContentCoding::Identity => Ok(data.to_vec()),
    }
}

/// Undo a request's `Content-Encoding`, applied in reverse of the order the
/// codings were listed (the last-listed coding was applied first).
pub(crate) fn decode_request_body(codings: &[ContentCoding], data: Vec<u8>) -> io::Result<Vec<u8>> {
    let mut data = data;
    for &coding in codings.iter().rev() {
        data = decompress(&data, coding)?;
    }
    Ok(data)
}

fn has_no_transform(resp: &Response<Body>) -> bool {
    resp.headers()
        .get(http::header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|d| d.trim().eq_ignore_ascii_case("no-transform")))
        .unwrap_or(false)
}

/// Compress `resp`'s body against the request's `Accept-Encoding`, if config
/// allows it, the body is a buffered byte body, and the response doesn't
/// carry `Cache-Control: no-transform`. Always sets `Vary: Accept-Encoding`
/// once compression is considered at all.
pub(crate) fn encode_response(
    accept: Option<&AcceptEncoding>,
    config_enabled: bool,
    mut resp: Response<Body>,
) -> Response<Body>
{
    if !config_enabled || has_no_transform(&resp) {
        return resp;
    }

    let data = match resp.body().inner {
        BodyType::Bytes(Some(ref b)) => b.clone(),
        _ => return resp,
    };

    resp.headers_mut().insert(http::header::VARY, "accept-encoding".parse().unwrap());

    let coding = negotiate(accept);
    if coding == ContentCoding::Identity {
        return resp;
    }

    match compress(&data, coding) {
        Ok(compressed) => {
            *resp.body_mut() = Body::from(bytes::Bytes::from(compressed));
            resp.headers_mut()
                .insert(http::header::CONTENT_ENCODING, coding_name(coding).parse().unwrap());
            resp
        },
        Err(_) => resp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::davheaders::AcceptEncoding;
    use headers::Header;
    use http::HeaderValue;

    fn accept(s: &str) -> AcceptEncoding {
        let v = HeaderValue::from_str(s).unwrap();
        AcceptEncoding::decode(&mut std::iter::once(&v)).unwrap()
    }

    #[test]
    fn negotiate_prefers_br_over_gzip() {
        assert_eq!(negotiate(Some(&accept("gzip, br"))), ContentCoding::Br);
    }

    #[test]
    fn negotiate_falls_back_to_identity() {
        assert_eq!(negotiate(Some(&accept("identity"))), ContentCoding::Identity);
        assert_eq!(negotiate(None), ContentCoding::Identity);
    }

    #[test]
    fn negotiate_respects_q_values() {
        assert_eq!(negotiate(Some(&accept("br;q=0.1, gzip;q=0.9"))), ContentCoding::Gzip);
    }

    #[test]
    fn roundtrip_gzip() {
        let data = b"hello, webdav world";
        let compressed = compress(data, ContentCoding::Gzip).unwrap();
        let mut dec = flate2::read::GzDecoder::new(compressed.as_slice());
        let mut out = Vec::new();
        dec.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn decode_request_body_roundtrip() {
        let data = b"<propfind xmlns=\"DAV:\"/>".to_vec();
        let compressed = compress(&data, ContentCoding::Gzip).unwrap();
        let decoded = decode_request_body(&[ContentCoding::Gzip], compressed).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn decode_request_body_multiple_codings_reversed() {
        let data = b"nested".to_vec();
        let once = compress(&data, ContentCoding::Deflate).unwrap();
        let twice = compress(&once, ContentCoding::Gzip).unwrap();
        // Content-Encoding: deflate, gzip means deflate was applied first,
        // so it must be undone last.
        let decoded = decode_request_body(&[ContentCoding::Deflate, ContentCoding::Gzip], twice).unwrap();
        assert_eq!(decoded, data);
    }
}
