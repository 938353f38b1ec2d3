//! Blocking `reqwest` transport for the Dropbox service.

use filenotes_sync::{HttpClient, HttpRequest, HttpResponse};
use reqwest::blocking::Client;
use std::time::Duration;

/// Request timeout, generous enough for large note uploads.
const TIMEOUT: Duration = Duration::from_secs(120);

/// [`HttpClient`] over a blocking `reqwest` client.
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    /// Creates a client with rustls and the default timeout.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(TIMEOUT)
            .user_agent(concat!("filenotes/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn post(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .body(request.body)
            .send()
            .map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(|e| e.to_string())?;

        Ok(HttpResponse::new(status, body.to_vec()))
    }
}
