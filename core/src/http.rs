//! HTTP transport types and the `Transport` seam.
//!
//! # Design
//! Requests and responses are plain data. The client builds an `HttpRequest`
//! (the XML envelope travels as the single form field `xml`, the session
//! token as the `sess_id` cookie) and hands it to a `Transport`, which owns
//! connections, TLS, timeouts and any retry policy. Tests substitute scripted
//! transports; `UreqTransport` is the default network implementation.

use crate::error::TransportError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// An HTTP request described as plain data.
///
/// `form` holds unencoded key/value pairs; the transport URL-encodes them
/// into the body (POST) or the query string (GET).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub form: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
}

impl HttpRequest {
    /// POST carrying `xml` as the single form field `xml`.
    pub fn post_xml(url: &str, xml: String) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.to_string(),
            form: vec![("xml".to_string(), xml)],
            cookies: Vec::new(),
        }
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    /// Value of the form field `name`, if present.
    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Cookies rendered as one header value of `key=value;` pairs.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(key, value)| format!("{key}={value};"))
                .collect(),
        )
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes one HTTP round trip.
pub trait Transport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request)
    }
}
