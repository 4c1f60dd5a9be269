use headers::HeaderMapExt;
use http::{Request, Response, StatusCode as SC};

use crate::body::Body;
use crate::conditional::if_match_get_tokens;
use crate::davheaders::{self, Depth};
use crate::davpath::DavPath;
use crate::errors::{fserror_to_status, DavError};
use crate::fs::*;
use crate::multierror::MultiError;
use crate::util::Method;
use crate::DavResult;

// map_err helper.
fn add_status(res: &mut MultiError, path: &DavPath, e: FsError) -> DavError {
    let status = fserror_to_status(e);
    res.add_status(path, status);
    DavError::Status(status)
}

impl crate::DavInner {
    fn do_copy<'a>(
        &'a self,
        source: &'a DavPath,
        topdest: &'a DavPath,
        dest: &'a DavPath,
        depth: Depth,
        multierror: &'a mut MultiError,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = FsResult<()>> + Send + 'a>>
    {
        Box::pin(async move {
            debug!("do_copy {} {} depth {:?}", source, dest, depth);

            // when doing "COPY /a/b /a/b/c" make sure we don't recursively
            // copy /a/b/c/ into /a/b/c.
            if source == topdest {
                return Ok(());
            }

            // source must exist.
            let meta = match self.fs.metadata(source).await {
                Err(e) => {
                    multierror.add_status(source, fserror_to_status(e));
                    return Err(e);
                },
                Ok(m) => m,
            };

            // if it's a file we can overwrite it.
            if !meta.is_dir() {
                return match self.fs.copy(source, dest).await {
                    Ok(_) => Ok(()),
                    Err(e) => {
                        debug!("do_copy: self.fs.copy error: {:?}", e);
                        multierror.add_status(dest, fserror_to_status(e));
                        Err(e)
                    },
                };
            }

            // Copying a directory onto an existing directory with Depth 0
            // is not an error. It means "only copy properties" (which
            // we do not do yet).
            if let Err(e) = self.fs.create_dir(dest).await {
                if depth != Depth::Zero || e != FsError::Exists {
                    debug!("do_copy: self.fs.create_dir error: {:?}", e);
                    multierror.add_status(dest, fserror_to_status(e));
                    return Err(e);
                }
            }

            // only recurse when Depth > 0.
            if depth == Depth::Zero {
                return Ok(());
            }

            let mut entries = match self.fs.read_dir(source, ReadDirMeta::Data).await {
                Ok(entries) => entries,
                Err(e) => {
                    debug!("do_copy: self.fs.read_dir error: {:?}", e);
                    multierror.add_status(source, fserror_to_status(e));
                    return Err(e);
                },
            };

            // If we encounter errors, just record them, and keep going.
            // Last seen error is returned from the function.
            let mut retval = Ok(());
            use futures_util::StreamExt;
            while let Some(dirent) = entries.next().await {
                // NOTE: dirent.metadata() behaves like symlink_metadata()
                let dirent = match dirent {
                    Ok(d) => d,
                    Err(e) => {
                        multierror.add_status(source, fserror_to_status(e));
                        return Err(e);
                    },
                };
                let meta = match dirent.metadata().await {
                    Ok(meta) => meta,
                    Err(e) => {
                        multierror.add_status(source, fserror_to_status(e));
                        return Err(e);
                    },
                };
                let name = dirent.name();
                let mut nsrc = source.clone();
                let mut ndest = dest.clone();
                nsrc.push_segment(&name);
                ndest.push_segment(&name);

                if meta.is_dir() {
                    nsrc.add_slash();
                    ndest.add_slash();
                }
                if let Err(e) = self.do_copy(&nsrc, topdest, &ndest, depth, multierror).await {
                    retval = Err(e);
                }
            }

            retval
        })
    }

    async fn do_move(
        &self,
        source: &DavPath,
        dest: &DavPath,
        existed: bool,
        mut multierror: MultiError,
    ) -> DavResult<Response<Body>>
    {
        debug!("do_move {} {}", source, dest);
        if let Err(e) = self.fs.rename(source, dest).await {
            // This is a single action ATM, so we don't need a multi-error.
            add_status(&mut multierror, source, e);
            Err(DavError::Status(multierror.close()?.status()))
        } else {
            let s = if existed { SC::NO_CONTENT } else { SC::CREATED };
            multierror.finalstatus(source, s)
        }
    }

    pub(crate) async fn handle_copymove(self, req: Request<()>, method: Method) -> DavResult<Response<Body>> {
        // get and check headers.
        let overwrite = req.headers().typed_get::<davheaders::Overwrite>().map_or(true, |o| o.0);
        let depth = match req.headers().typed_get::<Depth>() {
            Some(Depth::Infinity) | None => Depth::Infinity,
            Some(Depth::Zero) if method == Method::Copy => Depth::Zero,
            _ => return Err(DavError::Status(SC::BAD_REQUEST)),
        };

        // decode and validate destination.
        let dest = req
            .headers()
            .typed_get::<davheaders::Destination>()
            .ok_or(DavError::Status(SC::BAD_REQUEST))?;
        let dest = DavPath::from_str_and_prefix(&dest.0, &self.prefix)?;

        // for MOVE, tread with care - if the path ends in "/" but it actually
        // is a symlink, we want to move the symlink, not what it points to.
        let mut path = self.path(&req);
        let meta = if method == Method::Move {
            let meta = self.fs.symlink_metadata(&path).await.map_err(DavError::FsError)?;
            if meta.is_symlink() {
                if let Ok(m2) = self.fs.metadata(&path).await {
                    path.add_slash_if(m2.is_dir());
                }
            }
            meta
        } else {
            self.fs.metadata(&path).await.map_err(DavError::FsError)?
        };
        path.add_slash_if(meta.is_dir());

        // parent of the destination must exist.
        if !self.has_parent(&dest).await {
            return Err(DavError::Status(SC::CONFLICT));
        }

        // for the destination, also check if it's a symlink. If we are going
        // to remove it first, we want to remove the link, not what it points to.
        let (dest_is_file, dmeta) = match self.fs.symlink_metadata(&dest).await {
            Ok(meta) => {
                let mut is_file = false;
                if meta.is_symlink() {
                    if let Ok(m) = self.fs.metadata(&dest).await {
                        is_file = m.is_file();
                    }
                }
                if meta.is_file() {
                    is_file = true;
                }
                (is_file, Ok(meta))
            },
            Err(e) => (false, Err(e)),
        };

        // check if overwrite is "F"
        let exists = dmeta.is_ok();
        if !overwrite && exists {
            return Err(DavError::Status(SC::PRECONDITION_FAILED));
        }

        // check if source == dest
        if path == dest {
            return Err(DavError::Status(SC::FORBIDDEN));
        }

        // check If and If-* headers for source URL
        let tokens = match if_match_get_tokens(&req, Some(&meta), &self.fs, &self.ls, &path).await {
            Ok(t) => t,
            Err(s) => return Err(DavError::Status(s)),
        };

        let mut multierror = MultiError::new(&path);

        // check locks. since we cancel the entire operation if there is
        // a conflicting lock, we do not return a 207 multistatus, but
        // just a simple status. MOVE removes the source's namespace
        // mapping and COPY/MOVE both create (or overwrite) the
        // destination's, so both need code 2 (full).
        let t = tokens.iter().map(|s| s.as_str()).collect::<Vec<&str>>();
        if method == Method::Move {
            // for MOVE check if source path is locked
            if self.lock_permission(&path, &t) != crate::lock_engine::Permission::Full {
                return multierror.finalstatus(&path, SC::LOCKED);
            }
        }
        // for MOVE and COPY check if destination is locked
        if self.lock_permission(&dest, &t) != crate::lock_engine::Permission::Full {
            return multierror.finalstatus(&path, SC::LOCKED);
        }
        // lock_engine only walks the ancestor chain; deep copy/move also
        // needs to know about locks on descendants of source/destination.
        if let Some(ref locksystem) = self.ls {
            let principal = self.principal.as_ref().map(|s| s.as_str());
            if method == Method::Move {
                if let Err(_l) = locksystem.check(&path, principal, false, true, t.clone()) {
                    return multierror.finalstatus(&path, SC::LOCKED);
                }
            }
            if let Err(_l) = locksystem.check(&dest, principal, false, true, t) {
                return multierror.finalstatus(&path, SC::LOCKED);
            }
        }

        // see if we need to delete the destination first.
        if overwrite && exists && depth != Depth::Zero && !dest_is_file {
            debug!("handle_copymove: deleting destination {}", dest);
            if let Err(e) = self.delete_items(&mut multierror, Depth::Infinity, dmeta.unwrap(), &dest).await {
                return Err(e);
            }
            // should really do this per item, in case the delete partially fails.
            if let Some(ref locksystem) = self.ls {
                locksystem.delete(&dest).ok();
            }
        }

        // COPY or MOVE.
        if method == Method::Copy {
            match self.do_copy(&path, &dest, &dest, depth, &mut multierror).await {
                Err(_) => Err(DavError::Status(multierror.close()?.status())),
                Ok(_) => {
                    let s = if exists { SC::NO_CONTENT } else { SC::CREATED };
                    multierror.finalstatus(&path, s)
                },
            }
        } else {
            // move and if successful, remove locks at old location.
            let res = self.do_move(&path, &dest, exists, multierror).await?;
            if let Some(ref locksystem) = self.ls {
                locksystem.delete(&path).ok();
            }
            Ok(res)
        }
    }
}
