// tests/fetcher.rs
//
// HttpFetcher against a one-shot local HTTP server.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bdns_scrape::config::options::ScrapeOptions;
use bdns_scrape::core::net;
use bdns_scrape::specs::{Fetch, FetchOutcome, HttpFetcher};

/// Answers one request with `status` and `body` (or hangs up when `status` is
/// `None`) and hands back the request line it saw.
fn serve_once(status: Option<&'static str>, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = [0u8; 4096];
        let n = stream.read(&mut buf).unwrap_or(0);
        let request = String::from_utf8_lossy(&buf[..n]).into_owned();
        let line = request.lines().next().unwrap_or_default().to_string();

        if let Some(status) = status {
            let head = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(head.as_bytes()).unwrap();
            stream.write_all(body.as_bytes()).unwrap();
            let _ = stream.flush();
        }
        line
    });
    (format!("http://{addr}/bdnstrans/api/convocatorias"), handle)
}

fn fetcher_for(url: String) -> HttpFetcher {
    let opts = ScrapeOptions {
        api_url: url,
        request_timeout: Duration::from_secs(5),
        ..ScrapeOptions::default()
    };
    HttpFetcher::new(&opts).unwrap()
}

#[test]
fn found_record_and_request_shape() {
    let (url, server) = serve_once(
        Some("200 OK"),
        r#"{"codigoBDNS": "865179", "fechaRecepcion": "2024-03-15"}"#,
    );
    let before = net::requests_issued();

    let outcome = fetcher_for(url).fetch(865179);

    assert_eq!(
        server.join().unwrap(),
        "GET /bdnstrans/api/convocatorias?numConv=865179&vpd=GE HTTP/1.1"
    );
    match outcome {
        FetchOutcome::Found(rec) => {
            assert_eq!(rec.codigo_bdns.as_deref(), Some("865179"));
            assert_eq!(rec.fecha_recepcion.as_deref(), Some("2024-03-15"));
        }
        other => panic!("expected Found, got {other:?}"),
    }
    assert!(net::requests_issued() > before);
}

#[test]
fn missing_identifier_is_not_found() {
    let (url, server) = serve_once(Some("404 Not Found"), "");
    let outcome = fetcher_for(url).fetch(1);
    server.join().unwrap();
    assert!(matches!(outcome, FetchOutcome::NotFound), "{outcome:?}");
}

#[test]
fn server_error_is_transient() {
    let (url, server) = serve_once(Some("500 Internal Server Error"), "oops");
    let outcome = fetcher_for(url).fetch(2);
    server.join().unwrap();
    match outcome {
        FetchOutcome::TransientError(detail) => assert!(detail.contains("500"), "{detail}"),
        other => panic!("expected TransientError, got {other:?}"),
    }
}

#[test]
fn dropped_connection_is_transient() {
    let (url, server) = serve_once(None, "");
    let outcome = fetcher_for(url).fetch(3);
    server.join().unwrap();
    assert!(matches!(outcome, FetchOutcome::TransientError(_)), "{outcome:?}");
}

#[test]
fn non_object_body_is_transient() {
    let (url, server) = serve_once(Some("200 OK"), "[]");
    let outcome = fetcher_for(url).fetch(4);
    server.join().unwrap();
    assert!(matches!(outcome, FetchOutcome::TransientError(_)), "{outcome:?}");
}

#[test]
fn every_lookup_is_counted() {
    let before = net::requests_issued();
    for status in ["404 Not Found", "503 Service Unavailable"] {
        let (url, server) = serve_once(Some(status), "");
        fetcher_for(url).fetch(5);
        server.join().unwrap();
    }
    assert!(net::requests_issued() >= before + 2);
}
