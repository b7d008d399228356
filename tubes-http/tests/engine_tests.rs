use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use reqwest::Method;
use serde_json::json;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tubes_http::config::DEFAULT_USER_AGENT;
use tubes_http::{
    CookieStore, HttpError, Payload, ProxyDescriptor, ProxyMode, RequestConfig, RequestEngine,
};
use wiremock::matchers::{body_json, body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn engine() -> RequestEngine {
    RequestEngine::new().expect("engine should build")
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html")
        .set_body_string(body)
}

async fn mount_redirect_chain(server: &MockServer, hops: usize) {
    for i in 0..hops {
        let next = if i + 1 == hops {
            "/final".to_string()
        } else {
            format!("/hop/{}", i + 1)
        };
        Mock::given(method("GET"))
            .and(path(format!("/hop/{}", i)))
            .respond_with(ResponseTemplate::new(302).insert_header("location", next.as_str()))
            .expect(1)
            .mount(server)
            .await;
    }
}

// ============================================================================
// Headers
// ============================================================================

#[tokio::test]
async fn test_default_headers_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<html></html>"))
        .mount(&server)
        .await;

    engine().get(&server.uri()).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let headers = &requests[0].headers;
    assert_eq!(headers.get("user-agent").unwrap(), DEFAULT_USER_AGENT);
    assert_eq!(headers.get("accept-encoding").unwrap(), "gzip, deflate");
}

#[tokio::test]
async fn test_caller_headers_override_defaults() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("ok"))
        .mount(&server)
        .await;

    let config = RequestConfig::new()
        .with_header("User-Agent", "tubes-test/1.0")
        .unwrap()
        .with_header("X-Shop", "demo")
        .unwrap();
    engine().send(&server.uri(), &config).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let headers = &requests[0].headers;
    assert_eq!(headers.get_all("user-agent").iter().count(), 1);
    assert_eq!(headers.get("user-agent").unwrap(), "tubes-test/1.0");
    assert_eq!(headers.get("x-shop").unwrap(), "demo");
    assert_eq!(headers.get("accept-encoding").unwrap(), "gzip, deflate");
}

// ============================================================================
// Cookies
// ============================================================================

#[tokio::test]
async fn test_cookies_captured_and_replayed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("set-cookie", "session=abc; Path=/; HttpOnly")
                .append_header("set-cookie", "theme=dark"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/account"))
        .respond_with(html("account"))
        .mount(&server)
        .await;

    let store = CookieStore::new();
    let config = RequestConfig::new().with_cookies(store.clone());
    let engine = engine();

    engine
        .send(&format!("{}/login", server.uri()), &config)
        .await
        .unwrap();
    assert_eq!(store.get_value("session").as_deref(), Some("abc"));
    assert_eq!(store.len(), 2);

    engine
        .send(&format!("{}/account", server.uri()), &config)
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("cookie").is_none());
    assert_eq!(
        requests[1].headers.get("cookie").unwrap(),
        "session=abc; theme=dark"
    );
}

#[tokio::test]
async fn test_cookie_set_on_redirect_is_sent_to_target() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", "/home")
                .insert_header("set-cookie", "token=xyz"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/home"))
        .and(header("cookie", "token=xyz"))
        .respond_with(html("welcome"))
        .expect(1)
        .mount(&server)
        .await;

    let store = CookieStore::new();
    let config = RequestConfig::new().with_cookies(store.clone());
    let response = engine()
        .send(&format!("{}/auth", server.uri()), &config)
        .await
        .unwrap();

    assert_eq!(response.text(), "welcome");
    assert_eq!(response.meta.redirects, 1);
    assert_eq!(store.get_value("token").as_deref(), Some("xyz"));
}

// ============================================================================
// Decompression
// ============================================================================

#[tokio::test]
async fn test_gzip_body_decoded() {
    let server = MockServer::start().await;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(b"<html>gzipped catalog</html>").unwrap();

    Mock::given(method("GET"))
        .and(path("/gz"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-encoding", "gzip")
                .set_body_bytes(encoder.finish().unwrap()),
        )
        .mount(&server)
        .await;

    let response = engine()
        .get(&format!("{}/gz", server.uri()))
        .await
        .unwrap();
    assert_eq!(response.text(), "<html>gzipped catalog</html>");
}

#[tokio::test]
async fn test_deflate_body_decoded() {
    let server = MockServer::start().await;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(b"deflated product").unwrap();

    Mock::given(method("GET"))
        .and(path("/deflate"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-encoding", "deflate")
                .set_body_bytes(encoder.finish().unwrap()),
        )
        .mount(&server)
        .await;

    let response = engine()
        .get(&format!("{}/deflate", server.uri()))
        .await
        .unwrap();
    assert_eq!(response.text(), "deflated product");
}

#[tokio::test]
async fn test_corrupt_gzip_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-encoding", "gzip")
                .set_body_bytes(b"not gzip at all".to_vec()),
        )
        .mount(&server)
        .await;

    let err = engine().get(&server.uri()).await.unwrap_err();
    assert!(matches!(err, HttpError::Decode { ref encoding, .. } if encoding == "gzip"));
}

// ============================================================================
// Redirects
// ============================================================================

#[tokio::test]
async fn test_redirects_up_to_max_succeed() {
    let server = MockServer::start().await;
    mount_redirect_chain(&server, 3).await;
    Mock::given(method("GET"))
        .and(path("/final"))
        .respond_with(html("landed"))
        .expect(1)
        .mount(&server)
        .await;

    let config = RequestConfig::new().with_max_redirects(3);
    let response = engine()
        .send(&format!("{}/hop/0", server.uri()), &config)
        .await
        .unwrap();

    assert_eq!(response.text(), "landed");
    assert_eq!(response.meta.redirects, 3);
    assert_eq!(response.url().path(), "/final");
}

#[tokio::test]
async fn test_redirects_past_max_fail_without_extra_request() {
    let server = MockServer::start().await;
    mount_redirect_chain(&server, 4).await;
    Mock::given(method("GET"))
        .and(path("/final"))
        .respond_with(html("never"))
        .expect(0)
        .mount(&server)
        .await;

    let config = RequestConfig::new().with_max_redirects(3);
    let err = engine()
        .send(&format!("{}/hop/0", server.uri()), &config)
        .await
        .unwrap_err();

    assert!(matches!(err, HttpError::MaxRedirectsExceeded { max: 3, .. }));
    assert!(err.to_string().starts_with("Max redirects (3) reached"));
}

#[tokio::test]
async fn test_relative_location_resolves_against_host() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/shop/category/page"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "landing?from=old"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/landing"))
        .respond_with(html("landing"))
        .expect(1)
        .mount(&server)
        .await;

    let response = engine()
        .get(&format!("{}/shop/category/page", server.uri()))
        .await
        .unwrap();
    assert_eq!(response.text(), "landing");
    assert_eq!(response.url().query(), Some("from=old"));
}

#[tokio::test]
async fn test_redirect_without_location_is_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;

    let response = engine().get(&server.uri()).await.unwrap();
    assert_eq!(response.status(), 304);
    assert_eq!(response.meta.redirects, 0);
}

#[tokio::test]
async fn test_redirect_reissues_method_and_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(307).insert_header("location", "/search/v2"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/search/v2"))
        .and(body_json(json!({"q": "kettle"})))
        .respond_with(html("results"))
        .expect(1)
        .mount(&server)
        .await;

    let config = RequestConfig::new().with_payload(Payload::Json(json!({"q": "kettle"})));
    let response = engine()
        .send(&format!("{}/search", server.uri()), &config)
        .await
        .unwrap();
    assert_eq!(response.text(), "results");
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_error_status_carries_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such product"))
        .mount(&server)
        .await;

    let err = engine().get(&server.uri()).await.unwrap_err();
    match err {
        HttpError::Status { status, body, .. } => {
            assert_eq!(status, 404);
            assert_eq!(body, "no such product");
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unauthorized_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(407))
        .mount(&server)
        .await;
    let err = engine().get(&server.uri()).await.unwrap_err();
    assert_eq!(err.status(), Some(407));
    assert!(!err.is_unauthorized());

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let err = engine().get(&server.uri()).await.unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn test_timeout_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html("slow").set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let config = RequestConfig::new().with_timeout(Duration::from_millis(200));
    let err = engine().send(&server.uri(), &config).await.unwrap_err();
    assert!(err.is_transport());
    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = engine()
        .get(&format!("http://{}/", addr))
        .await
        .unwrap_err();
    assert!(err.is_transport());
    assert!(!err.is_timeout());
}

#[tokio::test]
async fn test_invalid_url_rejected() {
    let err = engine().get("not a url").await.unwrap_err();
    assert!(matches!(err, HttpError::InvalidUrl(_)));
}

// ============================================================================
// Payloads
// ============================================================================

#[tokio::test]
async fn test_json_payload_posts_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"sku": "A-1", "qty": 2})))
        .respond_with(ResponseTemplate::new(201).set_body_string("created"))
        .expect(1)
        .mount(&server)
        .await;

    let config = RequestConfig::new().with_payload(Payload::Json(json!({"sku": "A-1", "qty": 2})));
    let response = engine()
        .send(&format!("{}/api", server.uri()), &config)
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
}

#[tokio::test]
async fn test_form_payload_with_explicit_method() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/form"))
        .and(body_string("name=tubes&note=two+words"))
        .respond_with(html("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let config = RequestConfig::new()
        .with_method(Method::PUT)
        .with_payload(Payload::Form(vec![
            ("name".into(), "tubes".into()),
            ("note".into(), "two words".into()),
        ]));
    engine()
        .send(&format!("{}/form", server.uri()), &config)
        .await
        .unwrap();
}

// ============================================================================
// Proxies
// ============================================================================

#[tokio::test]
async fn test_http_target_goes_through_proxy_with_credentials() {
    let proxy = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/catalog"))
        .and(header("proxy-authorization", "Basic dXNlcjprZXk="))
        .respond_with(html("via proxy"))
        .expect(1)
        .mount(&proxy)
        .await;

    let descriptor = ProxyDescriptor::new("127.0.0.1", proxy.address().port()).with_auth("user", "key");
    let config = RequestConfig::new().with_proxy(ProxyMode::Via(descriptor));

    let response = engine()
        .send("http://shop.invalid/catalog", &config)
        .await
        .unwrap();
    assert_eq!(response.text(), "via proxy");

    let requests = proxy.received_requests().await.unwrap();
    assert_eq!(requests[0].headers.get("host").unwrap(), "shop.invalid");
}

#[tokio::test]
async fn test_default_proxy_used_unless_direct() {
    let proxy = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html("proxied"))
        .mount(&proxy)
        .await;
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html("direct"))
        .mount(&origin)
        .await;

    let engine = engine()
        .with_default_proxy(Some(ProxyDescriptor::new("127.0.0.1", proxy.address().port())));

    let response = engine.get("http://shop.invalid/").await.unwrap();
    assert_eq!(response.text(), "proxied");

    let direct = RequestConfig::new().with_proxy(ProxyMode::Direct);
    let response = engine.send(&origin.uri(), &direct).await.unwrap();
    assert_eq!(response.text(), "direct");
}

#[tokio::test]
async fn test_https_target_tunnels_with_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let proxy_side = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
            if received.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }
        socket
            .write_all(b"HTTP/1.1 502 Bad Gateway\r\ncontent-length: 0\r\n\r\n")
            .await
            .unwrap();
        String::from_utf8_lossy(&received).to_ascii_lowercase()
    });

    let descriptor = ProxyDescriptor::new("127.0.0.1", port).with_auth("user", "key");
    let config = RequestConfig::new().with_proxy(ProxyMode::Via(descriptor));
    let err = engine()
        .send("https://shop.invalid/secret/path", &config)
        .await
        .unwrap_err();
    assert!(err.is_transport());

    let handshake = proxy_side.await.unwrap();
    assert!(handshake.starts_with("connect shop.invalid:443"));
    assert!(handshake.contains("proxy-authorization: basic dxnlcjprzxk="));
    assert!(!handshake.contains("/secret/path"));
}
