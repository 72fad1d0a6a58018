//! Transport-independent request handling.
//!
//! The HTTP server turns every incoming request into an [`ApiRequest`],
//! hands it to a [`Handler`] and writes the returned [`ApiResponse`] back.
//! Keeping the routing free of socket types lets it be tested directly.

mod handler;

use std::net::IpAddr;

use serde_json::Value;

pub use handler::{Handler, HandlerSettings, LOCATIONS_PATH, SAVE_LOCATION_PATH};

/// Headers attached to every response so browsers on any origin may call the API.
pub const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
    ("Access-Control-Allow-Headers", "Content-Type"),
];

/// Request method, reduced to what the router distinguishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `OPTIONS`
    Options,
    /// Anything else.
    Other(String),
}

impl Method {
    /// Parse a method name. Matching is case-sensitive, as in HTTP.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "OPTIONS" => Self::Options,
            other => Self::Other(other.to_string()),
        }
    }
}

/// An inbound request as seen by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    /// Request method.
    pub method: Method,
    /// Request target, possibly with a query string.
    pub path: String,
    /// Raw `X-Forwarded-For` header value, if any.
    pub forwarded_for: Option<String>,
    /// Transport-level peer address, if known.
    pub peer: Option<IpAddr>,
    /// Request body. May be one byte longer than the configured limit to
    /// signal that the client sent too much.
    pub body: Vec<u8>,
}

impl ApiRequest {
    /// A request with no headers, peer or body.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            forwarded_for: None,
            peer: None,
            body: Vec::new(),
        }
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Set the peer address.
    #[must_use]
    pub fn with_peer(mut self, peer: IpAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Set the `X-Forwarded-For` value.
    #[must_use]
    pub fn with_forwarded_for(mut self, value: impl Into<String>) -> Self {
        self.forwarded_for = Some(value.into());
        self
    }

    /// The path without its query string.
    #[must_use]
    pub fn route(&self) -> &str {
        self.path
            .split_once('?')
            .map_or(self.path.as_str(), |(route, _)| route)
    }
}

/// An outbound response as produced by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// `Content-Type`, if the body has one.
    pub content_type: Option<&'static str>,
    /// Response body.
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// A response with no body.
    #[must_use]
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            body: Vec::new(),
        }
    }

    /// A plain response with an untyped text body.
    #[must_use]
    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: None,
            body: body.as_bytes().to_vec(),
        }
    }

    /// An HTML page.
    #[must_use]
    pub fn html(page: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: Some("text/html"),
            body: page,
        }
    }

    /// A JSON value.
    #[must_use]
    pub fn json(status: u16, value: &Value) -> Self {
        Self::json_bytes(status, value.to_string().into_bytes())
    }

    /// Already-serialized JSON.
    #[must_use]
    pub fn json_bytes(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type: Some("application/json"),
            body,
        }
    }

    /// Every header to send: content type (if any) followed by CORS headers.
    #[must_use]
    pub fn headers(&self) -> Vec<(&'static str, &'static str)> {
        self.content_type
            .map(|content_type| ("Content-Type", content_type))
            .into_iter()
            .chain(CORS_HEADERS)
            .collect()
    }
}

#[cfg(test)]
impl ApiResponse {
    pub(crate) fn body_json(&self) -> serde_json::Result<Value> {
        serde_json::from_slice(&self.body)
    }
}
