#[cfg(target_os = "linux")]
mod lock_tests {
    use bytes::Bytes;
    use dav_server::{body::Body, localfs::LocalFs, memls::MemLs, DavHandler};
    use http::{Request, StatusCode};

    fn setup(dir: &str) -> DavHandler {
        let _ = std::fs::remove_dir_all(dir);
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(format!("{dir}/file.txt"), b"hello").unwrap();

        DavHandler::builder()
            .filesystem(LocalFs::new(dir, false, false, false))
            .locksystem(MemLs::new())
            .build_handler()
    }

    fn lock_request(uri: &str) -> Request<Body> {
        let body = br#"<?xml version="1.0" encoding="utf-8" ?>
            <D:lockinfo xmlns:D="DAV:">
              <D:lockscope><D:exclusive/></D:lockscope>
              <D:locktype><D:write/></D:locktype>
              <D:owner><D:href>someone</D:href></D:owner>
            </D:lockinfo>"#;
        Request::builder()
            .method("LOCK")
            .uri(uri)
            .header("depth", "0")
            .body(Body::from(Bytes::from(body.to_vec())))
            .unwrap()
    }

    #[tokio::test]
    async fn test_lock_blocks_delete_without_token() {
        let server = setup("/tmp/DAV_SERVER_LOCK_TEST_1");

        let resp = server.handle(lock_request("/file.txt")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let req = Request::builder()
            .method("DELETE")
            .uri("/file.txt")
            .body(Body::empty())
            .unwrap();
        let resp = server.handle(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::LOCKED);
    }

    #[tokio::test]
    async fn test_lock_token_permits_delete() {
        let server = setup("/tmp/DAV_SERVER_LOCK_TEST_2");

        let resp = server.handle(lock_request("/file.txt")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let token = resp
            .headers()
            .get("lock-token")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        let req = Request::builder()
            .method("DELETE")
            .uri("/file.txt")
            .header("if", format!("({token})"))
            .body(Body::empty())
            .unwrap();
        let resp = server.handle(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_depth_zero_lock_on_parent_still_permits_put() {
        let server = setup("/tmp/DAV_SERVER_LOCK_TEST_3");

        let resp = server.handle(lock_request("/")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        // a depthZero lock on the parent collection is "contents only"
        // (code 1): PUT on a child still succeeds without the token.
        let req = Request::builder()
            .method("PUT")
            .uri("/file.txt")
            .body(Body::from(Bytes::from(b"overwritten".to_vec())))
            .unwrap();
        let resp = server.handle(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        // but DELETE of that same child is denied: contents-only doesn't
        // extend to removing the namespace mapping.
        let req = Request::builder()
            .method("DELETE")
            .uri("/file.txt")
            .body(Body::empty())
            .unwrap();
        let resp = server.handle(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::LOCKED);
    }

    #[tokio::test]
    async fn test_unknown_content_encoding_rejected() {
        let server = setup("/tmp/DAV_SERVER_LOCK_TEST_5");

        let req = Request::builder()
            .method("PUT")
            .uri("/other.txt")
            .header("content-encoding", "bogus")
            .body(Body::from(Bytes::from(b"data".to_vec())))
            .unwrap();
        let resp = server.handle(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_gzip_content_encoding_decompressed_on_proppatch() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let server = setup("/tmp/DAV_SERVER_LOCK_TEST_6");

        let body = br#"<?xml version="1.0" encoding="utf-8" ?>
            <D:propertyupdate xmlns:D="DAV:">
              <D:set>
                <D:prop><D:displayname>new name</D:displayname></D:prop>
              </D:set>
            </D:propertyupdate>"#;
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(body).unwrap();
        let compressed = enc.finish().unwrap();

        let req = Request::builder()
            .method("PROPPATCH")
            .uri("/file.txt")
            .header("content-encoding", "gzip")
            .body(Body::from(Bytes::from(compressed)))
            .unwrap();
        let resp = server.handle(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
    }

    #[tokio::test]
    async fn test_second_exclusive_lock_denied() {
        let server = setup("/tmp/DAV_SERVER_LOCK_TEST_4");

        let resp = server.handle(lock_request("/file.txt")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = server.handle(lock_request("/file.txt")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::LOCKED);
    }
}
