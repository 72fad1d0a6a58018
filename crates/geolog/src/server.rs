//! HTTP transport.
//!
//! `tiny_http` accepts connections on a blocking loop. Each request's body
//! is read on tokio's blocking pool; the async [`Handler`] then runs as a
//! runtime task, so no pool thread is parked while a write is in flight.

use std::fmt;
use std::io::{Cursor, Read};
use std::net::SocketAddr;
use std::sync::Arc;

use tiny_http::{Header, Request, Response, Server};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::api::{ApiRequest, ApiResponse, Handler, Method};
use crate::error::{Error, Result};

/// Header naming the original client when behind a proxy.
const FORWARDED_FOR: &str = "X-Forwarded-For";

/// A bound HTTP listener serving a [`Handler`].
pub struct HttpServer {
    server: Arc<Server>,
    handler: Handler,
    runtime: Handle,
    local_addr: SocketAddr,
}

impl fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpServer")
            .field("local_addr", &self.local_addr)
            .field("handler", &self.handler)
            .finish_non_exhaustive()
    }
}

impl HttpServer {
    /// Bind `addr` (`host:port`; port 0 picks a free port).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServerBind`] if the address cannot be bound, or an
    /// internal error if called outside a tokio runtime.
    pub fn bind(addr: &str, handler: Handler) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|err| Error::internal(format!("HTTP server needs a tokio runtime: {err}")))?;

        let server = Server::http(addr).map_err(|err| Error::server_bind(addr, err.to_string()))?;
        let local_addr = server
            .server_addr()
            .to_ip()
            .ok_or_else(|| Error::server_bind(addr, "listener has no IP address"))?;

        info!(%local_addr, "HTTP server listening");
        Ok(Self {
            server: Arc::new(server),
            handler,
            runtime,
            local_addr,
        })
    }

    /// The address actually bound.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A handle that stops the accept loop from another task.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            server: Arc::clone(&self.server),
        }
    }

    /// Accept requests until [`ShutdownHandle::shutdown`] is called.
    ///
    /// Blocks the calling thread.
    pub fn run(&self) {
        for request in self.server.incoming_requests() {
            let handler = self.handler.clone();
            let runtime = self.runtime.clone();
            self.runtime
                .spawn_blocking(move || serve_one(&runtime, handler, request));
        }
        info!(local_addr = %self.local_addr, "HTTP server stopped accepting requests");
    }

    /// Run the accept loop on the blocking pool until shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if the accept loop panicked.
    pub async fn serve(self) -> Result<()> {
        tokio::task::spawn_blocking(move || self.run())
            .await
            .map_err(|err| Error::internal(format!("HTTP accept loop failed: {err}")))
    }
}

/// Stops an [`HttpServer`]'s accept loop.
#[derive(Clone)]
pub struct ShutdownHandle {
    server: Arc<Server>,
}

impl fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownHandle").finish_non_exhaustive()
    }
}

impl ShutdownHandle {
    /// Wake the accept loop and make it return. Requests already accepted
    /// still get their responses.
    pub fn shutdown(&self) {
        self.server.unblock();
    }
}

fn serve_one(runtime: &Handle, handler: Handler, mut request: Request) {
    let api_request = match read_request(&mut request, handler.settings().max_body_bytes) {
        Ok(api_request) => api_request,
        Err(err) => {
            warn!(error = %err, "Failed to read request");
            respond(request, ApiResponse::empty(400));
            return;
        }
    };

    debug!(method = ?api_request.method, path = %api_request.path, "Request received");
    runtime.spawn(async move {
        let response = handler.handle(api_request).await;
        if let Err(err) = tokio::task::spawn_blocking(move || respond(request, response)).await {
            warn!(error = %err, "Response writer failed");
        }
    });
}

fn respond(request: Request, response: ApiResponse) {
    if let Err(err) = request.respond(into_http(response)) {
        debug!(error = %err, "Failed to write response");
    }
}

/// Read at most `max_body_bytes + 1` body bytes so oversized bodies are
/// detectable without buffering them whole.
fn read_request(request: &mut Request, max_body_bytes: usize) -> std::io::Result<ApiRequest> {
    let forwarded_for = request
        .headers()
        .iter()
        .find(|header| header.field.equiv(FORWARDED_FOR))
        .map(|header| header.value.as_str().to_string());

    let limit = u64::try_from(max_body_bytes)
        .unwrap_or(u64::MAX)
        .saturating_add(1);
    let mut body = Vec::new();
    request.as_reader().take(limit).read_to_end(&mut body)?;

    Ok(ApiRequest {
        method: Method::parse(&request.method().to_string()),
        path: request.url().to_string(),
        forwarded_for,
        peer: request.remote_addr().map(SocketAddr::ip),
        body,
    })
}

fn into_http(response: ApiResponse) -> Response<Cursor<Vec<u8>>> {
    let headers = response.headers();
    let mut http = Response::from_data(response.body).with_status_code(response.status);
    for (name, value) in headers {
        match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            Ok(header) => http.add_header(header),
            Err(()) => warn!(name, "Skipping invalid response header"),
        }
    }
    http
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_http_status_and_headers() {
        let response = into_http(ApiResponse::json(201, &serde_json::json!({"ok": true})));

        assert_eq!(response.status_code().0, 201);
        let names: Vec<String> = response
            .headers()
            .iter()
            .map(|header| header.field.as_str().to_string())
            .collect();
        assert!(names.iter().any(|name| name == "Content-Type"));
        assert!(names.iter().any(|name| name == "Access-Control-Allow-Origin"));
    }

    #[test]
    fn test_into_http_empty_body() {
        let response = into_http(ApiResponse::empty(200));
        assert_eq!(response.data_length(), Some(0));
    }

    #[test]
    fn test_bind_outside_runtime_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::storage::AppendStore::open(
            dir.path().join("locations.json"),
            crate::storage::StoreOptions::default(),
        )
        .unwrap();
        let handler = Handler::new(
            Arc::new(store),
            crate::api::HandlerSettings::from(&crate::config::ServerConfig::default()),
        );

        let err = HttpServer::bind("127.0.0.1:0", handler).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test]
    async fn test_bind_reports_local_addr() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::storage::AppendStore::open(
            dir.path().join("locations.json"),
            crate::storage::StoreOptions::default(),
        )
        .unwrap();
        let handler = Handler::new(
            Arc::new(store),
            crate::api::HandlerSettings::from(&crate::config::ServerConfig::default()),
        );

        let server = HttpServer::bind("127.0.0.1:0", handler).unwrap();
        assert!(server.local_addr().ip().is_loopback());
        assert_ne!(server.local_addr().port(), 0);
    }
}
