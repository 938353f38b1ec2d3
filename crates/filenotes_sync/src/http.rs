//! HTTP client abstraction.
//!
//! Providers that speak HTTP go through [`HttpClient`], so the library does
//! not pick an HTTP stack. The CLI plugs in `reqwest`; tests plug in
//! [`ScriptedClient`].

use parking_lot::Mutex;
use std::collections::VecDeque;

/// An outgoing POST request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Absolute URL.
    pub url: String,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Creates a POST request with an empty body.
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Adds a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Value of the first header called `name`, case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A received response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// True for 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking HTTP transport.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request. `Err` means no response was received.
    fn post(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

/// A client that replays queued responses and records requests.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    responses: Mutex<VecDeque<Result<HttpResponse, String>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedClient {
    /// Creates a client with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn respond(&self, status: u16, body: impl Into<Vec<u8>>) {
        self.responses
            .lock()
            .push_back(Ok(HttpResponse::new(status, body)));
    }

    /// Queues a transport failure.
    pub fn fail(&self, message: impl Into<String>) {
        self.responses.lock().push_back(Err(message.into()));
    }

    /// Requests sent so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }
}

impl HttpClient for ScriptedClient {
    fn post(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        self.requests.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err("no scripted response".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder() {
        let request = HttpRequest::post("https://api.example.com/x")
            .header("Authorization", "Bearer t")
            .body(b"{}".to_vec());

        assert_eq!(request.url, "https://api.example.com/x");
        assert_eq!(request.header_value("authorization"), Some("Bearer t"));
        assert_eq!(request.header_value("Content-Type"), None);
        assert_eq!(request.body, b"{}");
    }

    #[test]
    fn response_status() {
        assert!(HttpResponse::new(200, Vec::new()).is_success());
        assert!(!HttpResponse::new(409, Vec::new()).is_success());
    }

    #[test]
    fn scripted_client_replays_in_order() {
        let client = ScriptedClient::new();
        client.respond(200, b"one".to_vec());
        client.fail("connection reset");

        let first = client.post(HttpRequest::post("a")).unwrap();
        assert_eq!(first.body, b"one");
        assert_eq!(
            client.post(HttpRequest::post("b")).unwrap_err(),
            "connection reset"
        );
        assert!(client.post(HttpRequest::post("c")).is_err());
        assert_eq!(client.requests().len(), 3);
    }
}
