use headers::HeaderMapExt;
use http::{Request, Response, StatusCode as SC};

use crate::body::Body;
use crate::conditional::if_match_get_tokens;
use crate::davheaders;
use crate::errors::DavError;
use crate::fs::FsError;
use crate::DavResult;

impl crate::DavInner {
    pub(crate) async fn handle_mkcol(self, req: Request<()>) -> DavResult<Response<Body>> {
        let mut path = self.path(&req);
        let meta = self.fs.metadata(&path).await;

        // check the If and If-* headers.
        let tokens = if_match_get_tokens(&req, meta.as_ref().ok(), &self.fs, &self.ls, &path);
        let tokens = match tokens.await {
            Ok(t) => t,
            Err(s) => return Err(DavError::StatusClose(s)),
        };

        // if locked check if we hold that lock.
        if let Some(ref locksystem) = self.ls {
            let t = tokens.iter().map(|s| s.as_str()).collect::<Vec<&str>>();
            let principal = self.principal.as_ref().map(|s| s.as_str());
            if let Err(_l) = locksystem.check(&path, principal, false, false, t) {
                return Err(DavError::StatusClose(SC::LOCKED));
            }
        }

        let mut res = Response::new(Body::empty());

        match self.fs.create_dir(&path).await {
            // RFC 4918 9.3.1 MKCOL Status Codes.
            Err(FsError::Exists) => Err(DavError::Status(SC::METHOD_NOT_ALLOWED)),
            Err(FsError::NotFound) => Err(DavError::Status(SC::CONFLICT)),
            Err(e) => Err(DavError::FsError(e)),
            Ok(()) => {
                if path.is_collection() {
                    path.add_slash();
                    res.headers_mut()
                        .typed_insert(davheaders::ContentLocation(path.as_url_string_with_prefix()));
                }
                *res.status_mut() = SC::CREATED;
                Ok(res)
            },
        }
    }
}
