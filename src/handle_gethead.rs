use htmlescape;
use http::{Request, Response, StatusCode as SC};

use bytes::Bytes;
use headers::HeaderMapExt;

use crate::async_stream::AsyncStream;
use crate::body::Body;
use crate::conditional;
use crate::davheaders;
use crate::errors::*;
use crate::fs::*;
use crate::util::{systemtime_to_httpdate, systemtime_to_rfc3339};
use crate::DavResult;

impl crate::DavInner {
    pub(crate) async fn handle_get(self, req: Request<()>) -> DavResult<Response<Body>> {
        let path = self.path(&req);
        if self.is_hidden(&path).await {
            return Err(DavError::Status(SC::NOT_FOUND));
        }

        // check if it's a directory. fall back to a generated listing.
        let head = req.method() == &http::Method::HEAD;
        let meta = self.fs.metadata(&path).await?;
        if meta.is_dir() {
            if !self.autoindex.unwrap_or(true) {
                return Err(DavError::Status(SC::METHOD_NOT_ALLOWED));
            }
            return self.handle_dirlist(req, head).await;
        }

        // double check, is it a regular file.
        let mut file = self.fs.open(&path, OpenOptions::read()).await?;
        let meta = file.metadata().await?;
        if !meta.is_file() {
            return Err(DavError::Status(SC::METHOD_NOT_ALLOWED));
        }

        let mut start = 0;
        let mut count = meta.len();
        let len = count;
        let mut do_range = true;

        if req.headers().typed_get::<davheaders::IfRange>().is_some() {
            do_range = conditional::ifrange_match(&req, Some(&meta));
        }

        // see if we want to get a range.
        if do_range {
            do_range = false;
            if let Some(r) = req.headers().get(http::header::RANGE).and_then(|v| v.to_str().ok()) {
                if let Some(spec) = r.strip_prefix("bytes=") {
                    if let Some((s, e)) = parse_single_range(spec, len) {
                        start = s;
                        count = e - s + 1;
                        if start >= len {
                            return Err(DavError::Status(SC::RANGE_NOT_SATISFIABLE));
                        }
                        if start + count > len {
                            count = len - start;
                        }
                        do_range = true;
                    }
                }
            }
        }

        let mut res = Response::new(Body::empty());

        // set Last-Modified and ETag headers.
        if let Ok(modified) = meta.modified() {
            res.headers_mut().insert(
                http::header::LAST_MODIFIED,
                systemtime_to_httpdate(modified).parse().unwrap(),
            );
        }
        if let Some(etag) = davheaders::ETag::from_meta(&meta) {
            res.headers_mut().typed_insert(etag);
        }

        // handle the if-headers.
        if let Some(s) = conditional::if_match(&req, Some(&meta)) {
            return Err(DavError::Status(s));
        }

        if do_range {
            // seek to beginning of requested data.
            if file.seek(std::io::SeekFrom::Start(start)).await.is_err() {
                *res.status_mut() = SC::RANGE_NOT_SATISFIABLE;
                return Ok(res);
            }

            let r = format!("bytes {}-{}/{}", start, start + count - 1, len);
            res.headers_mut().insert("Content-Range", r.parse().unwrap());
            *res.status_mut() = SC::PARTIAL_CONTENT;
        } else {
            *res.status_mut() = SC::OK;
        }

        res.headers_mut()
            .insert("Content-Type", path.get_mime_type_str().parse().unwrap());
        res.headers_mut().typed_insert(headers::ContentLength(count));
        res.headers_mut().typed_insert(headers::AcceptRanges::bytes());

        debug!("head is {}", head);
        if head {
            return Ok(res);
        }
        let _ = meta;

        *res.body_mut() = Body::from(AsyncStream::new(|mut tx| {
            async move {
                let mut remaining = count;
                while remaining > 0 {
                    let want = std::cmp::min(remaining, 8192u64) as usize;
                    let data = file.read_bytes(want).await?;
                    if data.is_empty() {
                        break;
                    }
                    remaining -= data.len() as u64;
                    tx.send(data).await;
                }
                Ok::<(), std::io::Error>(())
            }
        }));

        Ok(res)
    }

    pub(crate) async fn handle_dirlist(self, req: Request<()>, head: bool) -> DavResult<Response<Body>> {
        let path = self.path(&req);
        let mut res = Response::new(Body::empty());

        // This is a directory. If the path doesn't end in "/", send a redirect.
        // Most webdav clients handle redirects really badly, but a client asking
        // for a directory index is usually a browser.
        if !path.is_collection() {
            let mut path = path.clone();
            path.add_slash();
            res.headers_mut()
                .insert("Location", path.as_url_string_with_prefix().parse().unwrap());
            res.headers_mut().typed_insert(headers::ContentLength(0));
            *res.status_mut() = SC::FOUND;
            return Ok(res);
        }

        // read directory or bail.
        let mut entries = self.fs.read_dir(&path, ReadDirMeta::DataSymlink).await?;
        let hide_dot_prefix = self.hide_dot_prefix == Some(crate::DavOptionHide::Always);
        let hide_symlinks = self.hide_symlinks.unwrap_or(true);

        res.headers_mut()
            .insert("Content-Type", "text/html; charset=utf-8".parse().unwrap());
        *res.status_mut() = SC::OK;
        if head {
            return Ok(res);
        }

        *res.body_mut() = Body::from(AsyncStream::new(|mut tx| {
            async move {
                struct Dirent {
                    path: String,
                    name: String,
                    meta: Box<dyn DavMetaData>,
                }

                let mut dirents: Vec<Dirent> = Vec::new();
                use futures_util::StreamExt;
                while let Some(dirent) = entries.next().await {
                    let dirent = match dirent {
                        Ok(d) => d,
                        Err(_) => continue,
                    };
                    let mut name = dirent.name();
                    if hide_dot_prefix && name.starts_with(b".") {
                        continue;
                    }
                    let mut npath = path.clone();
                    npath.push_segment(&name);
                    if let Ok(meta) = dirent.metadata().await {
                        if hide_symlinks && meta.is_symlink() {
                            continue;
                        }
                        if meta.is_dir() {
                            name.push(b'/');
                            npath.add_slash();
                        }
                        dirents.push(Dirent {
                            path: npath.as_url_string_with_prefix(),
                            name: String::from_utf8_lossy(&name).to_string(),
                            meta,
                        });
                    }
                }

                dirents.sort_by(|a, b| {
                    let adir = a.meta.is_dir();
                    let bdir = b.meta.is_dir();
                    if adir && !bdir {
                        std::cmp::Ordering::Less
                    } else if bdir && !adir {
                        std::cmp::Ordering::Greater
                    } else {
                        a.name.cmp(&b.name)
                    }
                });

                let upath = htmlescape::encode_minimal(&path.as_url_string());
                let mut w = String::new();
                w.push_str("<html><head>");
                w.push_str(&format!("<title>Index of {}</title>", upath));
                w.push_str("<style>");
                w.push_str("table { border-collapse: separate; border-spacing: 1.5em 0.25em; }");
                w.push_str("h1 { padding-left: 0.3em; }");
                w.push_str(".mono { font-family: monospace; }");
                w.push_str("</style>");
                w.push_str("</head>");

                w.push_str("<body>");
                w.push_str(&format!("<h1>Index of {}</h1>", upath));
                w.push_str("<table>");
                w.push_str("<tr><th>Name</th><th>Last modified</th><th>Size</th></tr>");
                w.push_str("<tr><th colspan=\"3\"><hr></th></tr>");
                w.push_str("<tr><td><a href=\"..\">Parent Directory</a></td><td>&nbsp;</td><td class=\"mono\" align=\"right\">[DIR]</td></tr>");
                tx.send(Bytes::from(w)).await;

                for dirent in &dirents {
                    let modified = match dirent.meta.modified() {
                        Ok(t) => systemtime_to_rfc3339(t),
                        Err(_) => "".to_string(),
                    };
                    let size = if dirent.meta.is_file() {
                        dirent.meta.len().to_string()
                    } else {
                        "[DIR]".to_string()
                    };
                    let name = htmlescape::encode_minimal(&dirent.name);
                    let s = format!(
                        "<tr><td><a href=\"{}\">{}</a></td><td class=\"mono\">{}</td><td class=\"mono\" align=\"right\">{}</td></tr>",
                        dirent.path, name, modified, size
                    );
                    tx.send(Bytes::from(s)).await;
                }

                let mut w = String::new();
                w.push_str("<tr><th colspan=\"3\"><hr></th></tr>");
                w.push_str("</table></body></html>");
                tx.send(Bytes::from(w)).await;

                Ok::<(), std::io::Error>(())
            }
        }));

        Ok(res)
    }
}

// Parse a single `bytes=a-b` / `bytes=a-` / `bytes=-n` range spec. We only
// support a single range, matching what the old handler accepted.
fn parse_single_range(spec: &str, len: u64) -> Option<(u64, u64)> {
    let (a, b) = spec.split_once('-')?;
    if !a.is_empty() && !b.is_empty() {
        let s: u64 = a.parse().ok()?;
        let e: u64 = b.parse().ok()?;
        Some((s, e))
    } else if !a.is_empty() {
        let s: u64 = a.parse().ok()?;
        Some((s, len.saturating_sub(1)))
    } else if !b.is_empty() {
        let n: u64 = b.parse().ok()?;
        Some((len.saturating_sub(n), len.saturating_sub(1)))
    } else {
        None
    }
}
