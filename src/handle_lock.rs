use std::cmp;
use std::io::Cursor;
use std::time::Duration;

use headers::HeaderMapExt;
use http::{Request, Response, StatusCode as SC};
use xml::common::XmlVersion;
use xml::writer::EventWriter;
use xml::writer::XmlEvent as XmlWEvent;
use xmltree::Element;

use crate::body::Body;
use crate::conditional::if_match;
use crate::davheaders::{self, DavTimeout, Depth, Timeout};
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::fs::{FsError, OpenOptions};
use crate::ls::DavLock;
use crate::util::MemBuffer;
use crate::xmltree_ext::ElementExt;
use crate::DavResult;

// render a `D:prop` lock-response body the same way `multierror` assembles
// a multistatus body: a one-off `EventWriter` over a `MemBuffer`.
fn render_lock_prop(prop: &Element) -> DavResult<bytes::Bytes> {
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
    prop.write_ev(&mut xw)?;
    Ok(xw.inner_mut().take())
}

impl crate::DavInner {
    pub(crate) async fn handle_lock(self, req: Request<()>, xmldata: Vec<u8>) -> DavResult<Response<Body>> {
        // must have a locksystem or bail
        let locksystem = match self.ls {
            Some(ref ls) => ls,
            None => return Err(DavError::Status(SC::METHOD_NOT_ALLOWED)),
        };

        // path and meta
        let mut path = self.path(&req);
        let meta = self.fs.metadata(&path).await.ok();
        let mut res = Response::new(Body::empty());
        let meta = meta.map(|m| self.fixpath(&mut res, &mut path, m));

        // lock refresh?
        if xmldata.is_empty() {
            // get locktoken
            let tokens = match self.if_match_tokens(&req, meta.as_ref(), &path).await {
                Ok(t) => t,
                Err(s) => return Err(DavError::Status(s)),
            };
            if tokens.len() != 1 {
                return Err(DavError::Status(SC::BAD_REQUEST));
            }

            let timeout = get_timeout(&req, true, false);
            let lock = match locksystem.refresh(&path, &tokens[0], timeout) {
                Ok(lock) => lock,
                Err(_) => return Err(DavError::Status(SC::PRECONDITION_FAILED)),
            };

            let prop = build_lock_prop(&lock, true);
            *res.status_mut() = SC::OK;
            res.headers_mut()
                .insert("content-type", "application/xml; charset=utf-8".parse().unwrap());
            *res.body_mut() = Body::from(render_lock_prop(&prop)?);
            return Ok(res);
        }

        // handle Depth:
        let deep = match req.headers().typed_get::<Depth>() {
            Some(Depth::Infinity) | None => true,
            Some(Depth::Zero) => false,
            _ => return Err(DavError::Status(SC::BAD_REQUEST)),
        };

        // handle the if-headers.
        if let Some(s) = if_match(&req, meta.as_ref()) {
            return Err(DavError::Status(s));
        }

        // cut & paste from handle_put.rs.
        let mut oo = OpenOptions::write();
        oo.create = true;
        if req
            .headers()
            .typed_get::<davheaders::IfMatch>()
            .map_or(false, |h| h.0 == davheaders::ETagList::Star)
        {
            oo.create = false;
        }
        if req
            .headers()
            .typed_get::<davheaders::IfNoneMatch>()
            .map_or(false, |h| h.0 == davheaders::ETagList::Star)
        {
            oo.create_new = true;
        }

        // parse xml
        let tree = Element::parse2(Cursor::new(xmldata))?;
        if tree.name != "lockinfo" {
            return Err(DavError::XmlParseError);
        }

        // decode Element.
        let mut shared: Option<bool> = None;
        let mut owner: Option<Element> = None;
        let mut locktype = false;

        for elem in tree.children {
            let elem = match elem {
                xmltree::XMLNode::Element(e) => e,
                _ => continue,
            };
            match elem.name.as_str() {
                "lockscope" if elem.children.len() == 1 => {
                    let child = match &elem.children[0] {
                        xmltree::XMLNode::Element(e) => e,
                        _ => return Err(DavError::XmlParseError),
                    };
                    match child.name.as_str() {
                        "exclusive" => shared = Some(false),
                        "shared" => shared = Some(true),
                        _ => return Err(DavError::XmlParseError),
                    }
                },
                "locktype" if elem.children.len() == 1 => {
                    let child = match &elem.children[0] {
                        xmltree::XMLNode::Element(e) => e,
                        _ => return Err(DavError::XmlParseError),
                    };
                    match child.name.as_str() {
                        "write" => locktype = true,
                        _ => return Err(DavError::XmlParseError),
                    }
                },
                "owner" => {
                    let mut o = elem.clone();
                    o.prefix = Some("D".to_owned());
                    owner = Some(o);
                },
                _ => return Err(DavError::XmlParseError),
            }
        }

        // sanity check.
        if shared.is_none() || !locktype {
            return Err(DavError::XmlParseError);
        }
        let shared = shared.unwrap();

        // four-code permission decision (SPEC_FULL.md §4.4): a conflicting
        // exclusive lock denies outright; a depthZero exclusive lock on the
        // parent also denies a new lock (contents may still be written, but
        // no new lock may be taken); a shared lock elsewhere only admits
        // another shared request.
        let eff = crate::lock_engine::effective_locks(locksystem.as_ref(), &path);
        match crate::lock_engine::lock_permission(&eff, shared) {
            crate::lock_engine::Permission::Denied | crate::lock_engine::Permission::ContentsOnly => {
                return Err(DavError::Status(SC::LOCKED));
            },
            crate::lock_engine::Permission::Full | crate::lock_engine::Permission::SharedOk => {},
        }

        // create lock
        let timeout = get_timeout(&req, false, shared);
        let principal = self.principal.as_ref().map(|s| s.as_str());
        let lock = match locksystem.lock(&path, principal, owner.as_ref(), timeout, shared, deep) {
            Ok(lock) => lock,
            Err(_) => return Err(DavError::Status(SC::LOCKED)),
        };

        // try to create file if it doesn't exist.
        if meta.is_none() {
            match self.fs.open(&path, oo).await {
                Ok(_) => {},
                Err(FsError::NotFound) | Err(FsError::Exists) => {
                    let s = if !oo.create || oo.create_new {
                        SC::PRECONDITION_FAILED
                    } else {
                        SC::CONFLICT
                    };
                    locksystem.unlock(&path, &lock.token).ok();
                    return Err(DavError::Status(s));
                },
                Err(e) => {
                    locksystem.unlock(&path, &lock.token).ok();
                    return Err(DavError::FsError(e));
                },
            };
        }

        // output result
        res.headers_mut().typed_insert(davheaders::LockToken("<".to_string() + &lock.token + ">"));
        if meta.is_none() {
            *res.status_mut() = SC::CREATED;
        } else {
            *res.status_mut() = SC::OK;
        }
        res.headers_mut()
            .insert("content-type", "application/xml; charset=utf-8".parse().unwrap());

        let prop = build_lock_prop(&lock, true);
        *res.body_mut() = Body::from(render_lock_prop(&prop)?);

        Ok(res)
    }

    pub(crate) async fn handle_unlock(self, req: Request<()>) -> DavResult<Response<Body>> {
        // must have a locksystem or bail
        let locksystem = match self.ls {
            Some(ref ls) => ls,
            None => return Err(DavError::Status(SC::METHOD_NOT_ALLOWED)),
        };

        // Must have Lock-Token header
        let t = req
            .headers()
            .typed_get::<davheaders::LockToken>()
            .ok_or(DavError::Status(SC::BAD_REQUEST))?;
        let token = t.0.trim_matches(|c| c == '<' || c == '>');

        let mut path = self.path(&req);
        let meta = self.fs.metadata(&path).await.map_err(DavError::FsError)?;
        path.add_slash_if(meta.is_dir());

        match locksystem.unlock(&path, token) {
            Ok(_) => Ok(Response::builder()
                .status(SC::NO_CONTENT)
                .body(Body::empty())
                .unwrap()),
            Err(_) => Err(DavError::Status(SC::CONFLICT)),
        }
    }

    // thin wrapper: the LOCK handler only needs the token-extraction half of
    // `if_match_get_tokens`, against the (possibly absent) target resource.
    async fn if_match_tokens(
        &self,
        req: &Request<()>,
        meta: Option<&Box<dyn crate::fs::DavMetaData>>,
        path: &DavPath,
    ) -> Result<Vec<String>, SC>
    {
        crate::conditional::if_match_get_tokens(req, meta, &self.fs, &self.ls, path).await
    }
}

pub(crate) fn list_lockdiscovery(ls: Option<&Box<dyn crate::ls::DavLockSystem>>, path: &DavPath) -> Element {
    let mut elem = Element::new2("D:lockdiscovery");

    // must have a locksystem or bail
    let locksystem = match ls {
        Some(ls) => ls,
        None => return elem,
    };

    // list the locks.
    let locks = locksystem.discover(path);
    for lock in &locks {
        elem.push(build_lock_prop(lock, false));
    }
    elem
}

pub(crate) fn list_supportedlock(ls: Option<&Box<dyn crate::ls::DavLockSystem>>) -> Element {
    let mut elem = Element::new2("D:supportedlock");

    // must have a locksystem or bail
    if ls.is_none() {
        return elem;
    }

    let mut entry = Element::new2("D:lockentry");
    let mut scope = Element::new2("D:lockscope");
    scope.push(Element::new2("D:exclusive"));
    scope.push(Element::new2("D:write"));
    entry.push(scope);
    elem.push(entry);

    let mut entry = Element::new2("D:lockentry");
    let mut scope = Element::new2("D:lockscope");
    scope.push(Element::new2("D:shared"));
    scope.push(Element::new2("D:write"));
    entry.push(scope);
    elem.push(entry);

    elem
}

// process timeout header
fn get_timeout(req: &Request<()>, refresh: bool, shared: bool) -> Option<Duration> {
    let max_timeout = if shared {
        Duration::new(86400, 0)
    } else {
        Duration::new(600, 0)
    };
    match req.headers().typed_get::<Timeout>() {
        Some(Timeout(ref vec)) if !vec.is_empty() => match vec[0] {
            DavTimeout::Infinite => {
                if refresh {
                    None
                } else {
                    Some(max_timeout)
                }
            },
            DavTimeout::Seconds(n) => Some(cmp::min(max_timeout, Duration::new(n as u64, 0))),
        },
        _ => None,
    }
}

fn build_lock_prop(lock: &DavLock, full: bool) -> Element {
    let mut actlock = Element::new2("D:activelock");

    let mut elem = Element::new2("D:lockscope");
    elem.push(match lock.shared {
        false => Element::new2("D:exclusive"),
        true => Element::new2("D:shared"),
    });
    actlock.push(elem);

    let mut elem = Element::new2("D:locktype");
    elem.push(Element::new2("D:write"));
    actlock.push(elem);

    actlock.push(Element::new2("D:depth").text(match lock.deep {
        false => "0",
        true => "Infinity",
    }));

    actlock.push(Element::new2("D:timeout").text(match lock.timeout {
        None => "Infinite".to_string(),
        Some(d) => format!("Second-{}", d.as_secs()),
    }));

    let mut locktokenelem = Element::new2("D:locktoken");
    locktokenelem.push(Element::new2("D:href").text(lock.token.clone()));
    actlock.push(locktokenelem);

    let mut lockroot = Element::new2("D:lockroot");
    lockroot.push(Element::new2("D:href").text(lock.path.as_url_string_with_prefix()));
    actlock.push(lockroot);

    if let Some(ref o) = lock.owner {
        actlock.push(o.clone());
    }

    if !full {
        return actlock;
    }

    let mut ldis = Element::new2("D:lockdiscovery");
    ldis.push(actlock);
    let mut prop = Element::new2("D:prop").ns("D", "DAV:");
    prop.push(ldis);

    prop
}
