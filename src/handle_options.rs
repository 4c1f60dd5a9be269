use headers::HeaderMapExt;
use http::{Request, Response, StatusCode as SC};

use crate::body::Body;
use crate::davheaders;
use crate::fs::{DavMetaData, FsResult};
use crate::util::{dav_method, Method};
use crate::DavResult;

impl crate::DavInner {
    pub(crate) async fn handle_options(self, req: Request<()>) -> DavResult<Response<Body>> {
        let mut res = Response::new(Body::empty());
        {
            let h = res.headers_mut();
            if self.ls.is_some() {
                h.typed_insert(davheaders::DAV("1,2,3,sabredav-partialupdate".to_string()));
            } else {
                h.typed_insert(davheaders::DAV("1,3,sabredav-partialupdate".to_string()));
            }
            h.typed_insert(davheaders::MSAuthorVia("DAV".to_string()));
            h.typed_insert(headers::ContentLength(0));
        }
        let meta = self.fs.metadata(&self.path(&req)).await;
        self.do_options(&req, &mut res, meta).await?;
        *res.status_mut() = SC::OK;
        Ok(res)
    }

    async fn do_options(
        &self,
        req: &Request<()>,
        res: &mut Response<Body>,
        meta: FsResult<Box<dyn DavMetaData>>,
    ) -> DavResult<()>
    {
        // Helper to add method to array if method is in fact
        // allowed. If the current method is not OPTIONS, leave
        // out the current method since we're probably called
        // for MethodNotAllowed.
        let method = dav_method(req.method()).unwrap_or(Method::Options);
        let islock = |m| m == Method::Lock || m == Method::Unlock;
        let mm = |v: &mut Vec<String>, m: &str, y: Method| {
            if (y == Method::Options || (y != method || islock(y) != islock(method)))
                && (!islock(y) || self.ls.is_some())
                && self.allow.as_ref().map_or(true, |x| x.allowed(y))
            {
                v.push(m.to_string());
            }
        };
        let mut v = Vec::new();

        let path = self.path(&req);
        let is_unmapped = meta.is_err();
        let is_file = meta.map(|m| m.is_file()).unwrap_or_default();
        let is_star = path.is_star() && method == Method::Options;

        if is_unmapped && !is_star {
            mm(&mut v, "OPTIONS", Method::Options);
            mm(&mut v, "MKCOL", Method::MkCol);
            mm(&mut v, "PUT", Method::Put);
            mm(&mut v, "LOCK", Method::Lock);
        } else {
            if is_file || is_star {
                mm(&mut v, "HEAD", Method::Head);
                mm(&mut v, "GET", Method::Get);
                mm(&mut v, "PATCH", Method::Patch);
                mm(&mut v, "PUT", Method::Put);
            }
            mm(&mut v, "OPTIONS", Method::Options);
            mm(&mut v, "PROPFIND", Method::PropFind);
            mm(&mut v, "COPY", Method::Copy);
            if path.as_url_string() != "/" {
                mm(&mut v, "MOVE", Method::Move);
                mm(&mut v, "DELETE", Method::Delete);
            }
            mm(&mut v, "LOCK", Method::Lock);
            mm(&mut v, "UNLOCK", Method::Unlock);
        }

        let a = v.join(",");
        res.headers_mut().insert("allow", a.parse().unwrap());

        Ok(())
    }
}
