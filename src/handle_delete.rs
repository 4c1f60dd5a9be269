use headers::HeaderMapExt;
use http::{Request, Response, StatusCode as SC};

use crate::body::Body;
use crate::conditional::if_match_get_tokens;
use crate::davheaders::Depth;
use crate::davpath::DavPath;
use crate::errors::{fserror_to_status, DavError};
use crate::fs::*;
use crate::multierror::MultiError;
use crate::DavResult;

// map_err helper.
fn add_status(res: &mut MultiError, path: &DavPath, e: FsError) -> DavError {
    let status = fserror_to_status(e);
    res.add_status(path, status);
    DavError::Status(status)
}

// map_err helper for directories, the result statuscode
// mappings are not 100% the same.
fn dir_status(res: &mut MultiError, path: &DavPath, e: FsError) -> DavError {
    let status = match e {
        FsError::Exists => SC::CONFLICT,
        e => fserror_to_status(e),
    };
    res.add_status(path, status);
    DavError::Status(status)
}

impl crate::DavInner {
    pub(crate) async fn delete_items(
        &self,
        res: &mut MultiError,
        depth: Depth,
        meta: Box<dyn DavMetaData>,
        path: &DavPath,
    ) -> DavResult<()>
    {
        if !meta.is_dir() {
            debug!("delete_items (file) {} {:?}", path, depth);
            return self.fs.remove_file(path).await.map_err(|e| add_status(res, path, e));
        }
        if depth == Depth::Zero {
            debug!("delete_items (dir) {} {:?}", path, depth);
            return self.fs.remove_dir(path).await.map_err(|e| dir_status(res, path, e));
        }
        debug!("delete_items (recurse) {} {:?}", path, depth);

        // walk over all entries.
        let mut entries = self.fs.read_dir(path, ReadDirMeta::Data).await.map_err(|e| add_status(res, path, e))?;
        let mut result = Ok(());

        use futures_util::StreamExt;
        while let Some(dirent) = entries.next().await {
            let dirent = match dirent {
                Ok(d) => d,
                Err(e) => {
                    result = Err(add_status(res, path, e));
                    continue;
                },
            };
            // NOTE: dirent.metadata == symlink_metadata (!)
            let meta = match dirent.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    result = Err(add_status(res, path, e));
                    continue;
                },
            };

            let mut npath = path.clone();
            npath.push_segment(&dirent.name());
            npath.add_slash_if(meta.is_dir());

            // do the actual work. If this fails with a non-fs related error,
            // return immediately.
            if let Err(e) = Box::pin(self.delete_items(res, depth, meta, &npath)).await {
                match e {
                    DavError::Status(_) => {
                        result = Err(e);
                        continue;
                    },
                    _ => return Err(e),
                }
            }
        }

        // if we got any error, return with the error,
        // and do not try to remove the directory.
        result?;

        self.fs.remove_dir(path).await.map_err(|e| dir_status(res, path, e))
    }

    pub(crate) async fn handle_delete(self, req: Request<()>) -> DavResult<Response<Body>> {
        // RFC4918 9.6.1 DELETE for Collections.
        // Note that allowing Depth: 0 is NOT RFC compliant.
        let depth = match req.headers().typed_get::<Depth>() {
            Some(Depth::Infinity) | None => Depth::Infinity,
            Some(Depth::Zero) => Depth::Zero,
            _ => return Err(DavError::Status(SC::BAD_REQUEST)),
        };

        let mut path = self.path(&req);
        let meta = self.fs.symlink_metadata(&path).await.map_err(DavError::FsError)?;
        if meta.is_symlink() {
            if let Ok(m2) = self.fs.metadata(&path).await {
                path.add_slash_if(m2.is_dir());
            }
        }
        path.add_slash_if(meta.is_dir());

        // check the If and If-* headers.
        let tokens = if_match_get_tokens(&req, Some(&meta), &self.fs, &self.ls, &path);
        let tokens = match tokens.await {
            Ok(t) => t,
            Err(s) => return Err(DavError::Status(s)),
        };

        // check locks. since we cancel the entire operation if there is
        // a conflicting lock, we do not return a 207 multistatus, but
        // just a simple status. DELETE removes the namespace mapping, so
        // it needs code 2 (full); a depthZero "contents only" lock on the
        // parent still blocks it.
        let t = tokens.iter().map(|s| s.as_str()).collect::<Vec<&str>>();
        if self.lock_permission(&path, &t) != crate::lock_engine::Permission::Full {
            return Err(DavError::Status(SC::LOCKED));
        }
        // lock_engine only walks the ancestor chain; a deep delete also
        // needs to know about locks on descendants of `path`.
        if let Some(ref locksystem) = self.ls {
            let principal = self.principal.as_ref().map(|s| s.as_str());
            if let Err(_l) = locksystem.check(&path, principal, false, true, t) {
                return Err(DavError::Status(SC::LOCKED));
            }
        }

        let mut multierror = MultiError::new(&path);

        if let Ok(()) = self.delete_items(&mut multierror, depth, meta, &path).await {
            // should really do this per resource, in case the delete partially fails.
            if let Some(ref locksystem) = self.ls {
                locksystem.delete(&path).ok();
            }
            return multierror.finalstatus(&path, SC::NO_CONTENT);
        }

        multierror.close()
    }
}
