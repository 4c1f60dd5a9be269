//! Evaluation of RFC 7232 conditional headers and the RFC 4918 `If` header.
//!
//! `davheaders::If` already parses the full tagged-list grammar (resource
//! tags, NOT, state-tokens, ETags, AND/OR grouping); this module is what
//! walks that parsed structure against live lock state and extracts the set
//! of lock tokens the caller submitted, which the lock engine then uses to
//! decide whether the caller owns the locks blocking a mutation.

use headers::HeaderMapExt;
use http::{Method, Request, StatusCode};

use crate::davheaders::{self, ETagList, IfItem};
use crate::davpath::DavPath;
use crate::fs::{DavFileSystem, DavMetaData};
use crate::ls::DavLockSystem;

fn etaglist_matches(list: &ETagList, cur: Option<&davheaders::ETag>) -> bool {
    match (list, cur) {
        (ETagList::Star, Some(_)) => true,
        (ETagList::Star, None) => false,
        (ETagList::Tags(tags), Some(cur)) => tags.iter().any(|t| t == cur),
        (ETagList::Tags(_), None) => false,
    }
}

/// Plain RFC 7232 conditional-GET/conditional-write evaluation.
/// Returns `Some(status)` if the request should be short-circuited.
pub(crate) fn if_match(req: &Request<()>, meta: Option<&Box<dyn DavMetaData>>) -> Option<StatusCode> {
    let etag = meta.and_then(|m| davheaders::ETag::from_meta(m));
    let modified = meta.and_then(|m| m.modified().ok());

    if let Some(r) = req.headers().typed_get::<davheaders::IfMatch>() {
        if !etaglist_matches(&r.0, etag.as_ref()) {
            return Some(StatusCode::PRECONDITION_FAILED);
        }
    } else if let Some(r) = req.headers().typed_get::<headers::IfUnmodifiedSince>() {
        match modified {
            None => return Some(StatusCode::PRECONDITION_FAILED),
            Some(m) => {
                if !r.precondition_passes(m) {
                    return Some(StatusCode::PRECONDITION_FAILED);
                }
            },
        }
    }

    if let Some(r) = req.headers().typed_get::<davheaders::IfNoneMatch>() {
        if etaglist_matches(&r.0, etag.as_ref()) {
            let code = if req.method() == Method::GET || req.method() == Method::HEAD {
                StatusCode::NOT_MODIFIED
            } else {
                StatusCode::PRECONDITION_FAILED
            };
            return Some(code);
        }
    } else if let Some(r) = req.headers().typed_get::<headers::IfModifiedSince>() {
        if req.method() == Method::GET || req.method() == Method::HEAD {
            if let Some(m) = modified {
                if !r.is_modified(m) {
                    return Some(StatusCode::NOT_MODIFIED);
                }
            }
        }
    }
    None
}

/// Whether a `Range` request should be honored, given `If-Range`.
pub(crate) fn ifrange_match(req: &Request<()>, meta: Option<&Box<dyn DavMetaData>>) -> bool {
    let r = match req.headers().typed_get::<davheaders::IfRange>() {
        Some(r) => r,
        None => return true,
    };
    match r {
        davheaders::IfRange::ETag(want) => {
            meta.and_then(|m| davheaders::ETag::from_meta(m)).map(|e| e == want).unwrap_or(false)
        },
        davheaders::IfRange::Date(d) => {
            let want: std::time::SystemTime = d.into();
            meta.and_then(|m| m.modified().ok()).map(|m| m <= want).unwrap_or(false)
        },
    }
}

// Evaluate one resource-tagged list: all conditions must hold (AND), and
// every `StateToken` condition found along the way is recorded into
// `tokens` so the caller can pass them on to `DavLockSystem::check` - the
// lock engine, not this parser, is responsible for deciding whether the
// request's principal actually owns each token.
fn eval_list(
    list: &davheaders::IfList,
    cur_etag: Option<&davheaders::ETag>,
    tokens: &mut Vec<String>,
) -> bool {
    let mut ok = true;
    for cond in &list.conditions {
        let matched = match &cond.item {
            IfItem::StateToken(token) => {
                tokens.push(token.clone());
                true
            },
            IfItem::ETag(tag) => cur_etag.map(|e| e == tag).unwrap_or(false),
        };
        let satisfied = if cond.not { !matched } else { matched };
        ok = ok && satisfied;
    }
    ok
}

/// Evaluate the `If` header (if present) against the current resource state,
/// fold in `If-Match`/`If-None-Match`, and return the set of lock tokens the
/// request submitted (for use by `DavLockSystem::check`).
pub(crate) async fn if_match_get_tokens(
    req: &Request<()>,
    meta: Option<&Box<dyn DavMetaData>>,
    _fs: &Box<dyn DavFileSystem>,
    _ls: &Option<Box<dyn DavLockSystem>>,
    _path: &DavPath,
) -> Result<Vec<String>, StatusCode> {
    let cur_etag = meta.and_then(|m| davheaders::ETag::from_meta(m));
    let mut tokens = Vec::new();

    if let Some(if_header) = req.headers().typed_get::<davheaders::If>() {
        // OR across lists; collect tokens from every list, since a resource
        // can be covered by more than one lock (e.g. nested collections).
        let mut any_ok = false;
        for list in &if_header.0 {
            if eval_list(list, cur_etag.as_ref(), &mut tokens) {
                any_ok = true;
            }
        }
        if !any_ok {
            return Err(StatusCode::PRECONDITION_FAILED);
        }
    }

    if let Some(r) = req.headers().typed_get::<davheaders::IfMatch>() {
        if !etaglist_matches(&r.0, cur_etag.as_ref()) {
            return Err(StatusCode::PRECONDITION_FAILED);
        }
    }

    if let Some(r) = req.headers().typed_get::<davheaders::IfNoneMatch>() {
        if etaglist_matches(&r.0, cur_etag.as_ref()) {
            return Err(StatusCode::PRECONDITION_FAILED);
        }
    }

    Ok(tokens)
}
