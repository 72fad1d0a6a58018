//! Routing and endpoint logic.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use tracing::{error, info, warn};

use super::{ApiRequest, ApiResponse, Method};
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::storage::AppendStore;

/// Endpoint accepting a location report.
pub const SAVE_LOCATION_PATH: &str = "/api/save-location";

/// Endpoint returning the whole collection.
pub const LOCATIONS_PATH: &str = "/api/locations";

/// Recorded when neither a forwarded address nor a peer is available.
const UNKNOWN_CLIENT: &str = "unknown";

/// Request-handling settings taken from the server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerSettings {
    /// Page served at `/` and `/index.html`.
    pub index_path: PathBuf,
    /// Prefer `X-Forwarded-For` over the peer address.
    pub trust_forwarded_for: bool,
    /// Largest accepted request body, in bytes.
    pub max_body_bytes: usize,
}

impl From<&ServerConfig> for HandlerSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            index_path: config.index_path.clone(),
            trust_forwarded_for: config.trust_forwarded_for,
            max_body_bytes: config.max_body_bytes,
        }
    }
}

/// Routes requests to the append store.
///
/// Cheap to clone; every clone shares the same store.
#[derive(Debug, Clone)]
pub struct Handler {
    store: Arc<AppendStore>,
    settings: Arc<HandlerSettings>,
}

impl Handler {
    /// Create a handler writing into `store`.
    #[must_use]
    pub fn new(store: Arc<AppendStore>, settings: HandlerSettings) -> Self {
        Self {
            store,
            settings: Arc::new(settings),
        }
    }

    /// The settings this handler was built with.
    #[must_use]
    pub fn settings(&self) -> &HandlerSettings {
        &self.settings
    }

    /// Produce the response for one request. Never fails: every error is
    /// turned into an HTTP status here.
    pub async fn handle(&self, request: ApiRequest) -> ApiResponse {
        match (&request.method, request.route()) {
            (Method::Options, _) => ApiResponse::empty(200),
            (Method::Get, "/" | "/index.html") => self.index().await,
            (Method::Post, SAVE_LOCATION_PATH) => self.save_location(&request).await,
            (Method::Get, LOCATIONS_PATH) => self.locations(),
            _ => ApiResponse::text(404, "Not found"),
        }
    }

    async fn index(&self) -> ApiResponse {
        match tokio::fs::read(&self.settings.index_path).await {
            Ok(page) => ApiResponse::html(page),
            Err(err) => {
                warn!(
                    path = %self.settings.index_path.display(),
                    error = %err,
                    "Error loading page"
                );
                ApiResponse::text(500, "Error loading page")
            }
        }
    }

    async fn save_location(&self, request: &ApiRequest) -> ApiResponse {
        let record = match self.build_record(request) {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, "Rejected location report");
                return invalid_data();
            }
        };

        let ip = record.ip().unwrap_or(UNKNOWN_CLIENT).to_string();
        match self.store.append(record).await {
            Ok(outcome) => {
                info!(%ip, total = outcome.total, "Location saved");
                ApiResponse::json(200, &json!({"success": true, "message": "Location saved"}))
            }
            Err(err) if err.is_writer_closed() => {
                warn!(%ip, "Store is shutting down, location not saved");
                invalid_data()
            }
            Err(err) => {
                error!(%ip, error = %err, "Error saving location");
                invalid_data()
            }
        }
    }

    fn locations(&self) -> ApiResponse {
        match self.store.read_raw() {
            Ok(raw) => ApiResponse::json_bytes(200, raw.into_bytes()),
            Err(err) => {
                error!(error = %err, "Could not read locations");
                ApiResponse::json(500, &json!({"error": "Could not read locations"}))
            }
        }
    }

    /// Turn a save request into a record carrying the client address.
    fn build_record(&self, request: &ApiRequest) -> Result<Record> {
        if request.body.len() > self.settings.max_body_bytes {
            return Err(Error::invalid_record(format!(
                "body exceeds {} bytes",
                self.settings.max_body_bytes
            )));
        }
        let body = std::str::from_utf8(&request.body)
            .map_err(|_| Error::invalid_record("body is not valid UTF-8"))?;

        let mut record = Record::from_json(body)?;
        record.set_ip(self.client_ip(request));
        Ok(record)
    }

    /// The address to record for `request`.
    ///
    /// The first `X-Forwarded-For` entry names the original client; later
    /// entries are proxies.
    #[must_use]
    pub fn client_ip(&self, request: &ApiRequest) -> String {
        if self.settings.trust_forwarded_for {
            let forwarded = request
                .forwarded_for
                .as_deref()
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|client| !client.is_empty());
            if let Some(client) = forwarded {
                return client.to_string();
            }
        }

        request
            .peer
            .map_or_else(|| UNKNOWN_CLIENT.to_string(), |peer| peer.to_string())
    }
}

fn invalid_data() -> ApiResponse {
    ApiResponse::json(400, &json!({"success": false, "message": "Invalid data"}))
}
