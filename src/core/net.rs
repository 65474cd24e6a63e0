// src/core/net.rs
// Blocking HTTPS GET. One request in flight at a time; the caller decides what
// a status code means.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{self, HeaderMap, HeaderValue};

use crate::config::consts;

static REQUESTS: AtomicU64 = AtomicU64::new(0);

/// Requests issued by this process so far (observability only).
pub fn requests_issued() -> u64 {
    REQUESTS.load(Ordering::Relaxed)
}

pub struct Response {
    pub status: u16,
    pub body: String,
}

/// Client with browser-like default headers and a per-request timeout.
pub fn client(timeout: Duration) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static(consts::ACCEPT));
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static(consts::ACCEPT_LANGUAGE));
    headers.insert(header::REFERER, HeaderValue::from_static(consts::REFERER));

    Client::builder()
        .user_agent(consts::USER_AGENT)
        .default_headers(headers)
        .timeout(timeout)
        .build()
}

/// GET `url` with `query` appended. Any status is returned as-is; only
/// transport failures (DNS, TLS, timeout, reset) are errors.
pub fn http_get(client: &Client, url: &str, query: &[(&str, String)]) -> Result<Response, reqwest::Error> {
    REQUESTS.fetch_add(1, Ordering::Relaxed);
    let resp = client.get(url).query(query).send()?;
    let status = resp.status().as_u16();
    let body = resp.text()?;
    Ok(Response { status, body })
}
