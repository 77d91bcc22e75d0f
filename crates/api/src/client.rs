//! The backend operations as a trait, plus the reqwest implementation.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{server_message, ApiError, ApiResult};
use crate::types::{
    Agenda, HistoryFilter, HumidityReading, IrrigationEvent, NodeInfo, ZoneCommand, ZoneConfig,
    ZoneConfigUpsert, ZoneStatus,
};

/// Fixed per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// One async method per backend operation. Every failure, transport or
/// server-reported, comes back as an [`ApiError`].
#[async_trait]
pub trait IrrigationApi: Send + Sync {
    async fn list_nodes(&self) -> ApiResult<Vec<NodeInfo>>;

    async fn send_command(&self, node_id: &str, cmd: &ZoneCommand) -> ApiResult<()>;

    async fn zone_status(&self, node_id: &str) -> ApiResult<Vec<ZoneStatus>>;

    async fn list_agendas(&self, node_id: &str) -> ApiResult<Vec<Agenda>>;

    async fn upsert_agenda(&self, node_id: &str, agenda: &Agenda) -> ApiResult<Agenda>;

    async fn delete_agenda(&self, node_id: &str, agenda_id: &str) -> ApiResult<()>;

    async fn list_events(
        &self,
        node_id: &str,
        filter: &HistoryFilter,
    ) -> ApiResult<Vec<IrrigationEvent>>;

    async fn list_humidity(
        &self,
        node_id: &str,
        filter: &HistoryFilter,
    ) -> ApiResult<Vec<HumidityReading>>;

    async fn list_zone_configs(
        &self,
        node_id: &str,
        only_enabled: bool,
    ) -> ApiResult<Vec<ZoneConfig>>;

    async fn zone_config(&self, node_id: &str, zona: u8) -> ApiResult<ZoneConfig>;

    async fn upsert_zone_config(
        &self,
        node_id: &str,
        config: &ZoneConfigUpsert,
    ) -> ApiResult<ZoneConfig>;

    async fn rename_zone(&self, node_id: &str, zona: u8, nombre: &str) -> ApiResult<ZoneConfig>;

    async fn toggle_zone(&self, node_id: &str, zona: u8) -> ApiResult<ZoneConfig>;

    async fn delete_zone_config(&self, node_id: &str, zona: u8) -> ApiResult<()>;

    async fn reorder_zones(&self, node_id: &str, zonas: &[u8]) -> ApiResult<Vec<ZoneConfig>>;

    async fn health(&self) -> ApiResult<()>;

    /// Open a zone for `minutes`; the backend takes seconds.
    async fn start_watering(&self, node_id: &str, zona: u8, minutes: u32) -> ApiResult<()> {
        let cmd = ZoneCommand::on(node_id, zona, minutes.saturating_mul(60));
        self.send_command(node_id, &cmd).await
    }

    async fn stop_watering(&self, node_id: &str, zona: u8) -> ApiResult<()> {
        self.send_command(node_id, &ZoneCommand::off(node_id, zona)).await
    }
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
struct RenameBody<'a> {
    nombre: &'a str,
}

#[derive(Serialize)]
struct OrderBody<'a> {
    zonas: &'a [u8],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OnlyEnabled {
    solo_habilitadas: bool,
}

/// REST client for the backend. `base_url` includes the `/api` prefix.
#[derive(Clone)]
pub struct HttpApi {
    base_url: String,
    base: Url,
    credentials: Option<Credentials>,
    http: Client,
}

impl HttpApi {
    pub fn new(base_url: &str, credentials: Option<Credentials>) -> ApiResult<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let base = Url::parse(&base_url)
            .map_err(|e| ApiError::Invalid(format!("bad base URL '{base_url}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::Invalid(format!("bad base URL '{base_url}'")));
        }

        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            base,
            credentials,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Base URL plus `segments`, each percent-encoded as one path segment.
    fn url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base.clone();
        // http(s) bases always have path segments; checked in `new`
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        self.build(method, self.url(segments.iter().copied()))
    }

    /// Request under `/nodos/{node_id}`.
    fn node_request(&self, method: Method, node_id: &str, rest: &[&str]) -> RequestBuilder {
        let segments = ["nodos", node_id].into_iter().chain(rest.iter().copied());
        self.build(method, self.url(segments))
    }

    fn build(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(%method, %url, "request");
        let req = self.http.request(method, url);
        match &self.credentials {
            Some(c) => req.basic_auth(&c.username, Some(&c.password)),
            None => req,
        }
    }

    /// Send and map non-2xx replies to `ApiError::Server`.
    async fn send(&self, req: RequestBuilder) -> ApiResult<Response> {
        let resp = req.send().await?;
        let status = resp.status();
        debug!(status = status.as_u16(), url = %resp.url(), "response");

        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let fallback = status.canonical_reason().unwrap_or("request failed");
        let message = server_message(&body, fallback);
        warn!(status = status.as_u16(), %message, "backend rejected request");
        Err(ApiError::Server {
            status: status.as_u16(),
            message,
        })
    }

    async fn json<T: DeserializeOwned>(&self, req: RequestBuilder) -> ApiResult<T> {
        let resp = self.send(req).await?;
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn empty(&self, req: RequestBuilder) -> ApiResult<()> {
        self.send(req).await.map(|_| ())
    }
}

#[async_trait]
impl IrrigationApi for HttpApi {
    async fn list_nodes(&self) -> ApiResult<Vec<NodeInfo>> {
        self.json(self.request(Method::GET, &["nodos"])).await
    }

    async fn send_command(&self, node_id: &str, cmd: &ZoneCommand) -> ApiResult<()> {
        let req = self.node_request(Method::POST, node_id, &["cmd"]);
        self.empty(req.json(cmd)).await
    }

    async fn zone_status(&self, node_id: &str) -> ApiResult<Vec<ZoneStatus>> {
        let req = self.node_request(Method::GET, node_id, &["status"]);
        self.json(req).await
    }

    async fn list_agendas(&self, node_id: &str) -> ApiResult<Vec<Agenda>> {
        let req = self.node_request(Method::GET, node_id, &["agendas"]);
        self.json(req).await
    }

    async fn upsert_agenda(&self, node_id: &str, agenda: &Agenda) -> ApiResult<Agenda> {
        let req = self.node_request(Method::POST, node_id, &["agendas"]);
        self.json(req.json(agenda)).await
    }

    async fn delete_agenda(&self, node_id: &str, agenda_id: &str) -> ApiResult<()> {
        let req = self.node_request(Method::DELETE, node_id, &["agendas", agenda_id]);
        self.empty(req).await
    }

    async fn list_events(
        &self,
        node_id: &str,
        filter: &HistoryFilter,
    ) -> ApiResult<Vec<IrrigationEvent>> {
        let req = self.node_request(Method::GET, node_id, &["eventos"]);
        self.json(req.query(filter)).await
    }

    async fn list_humidity(
        &self,
        node_id: &str,
        filter: &HistoryFilter,
    ) -> ApiResult<Vec<HumidityReading>> {
        let req = self.node_request(Method::GET, node_id, &["humedad"]);
        self.json(req.query(filter)).await
    }

    async fn list_zone_configs(
        &self,
        node_id: &str,
        only_enabled: bool,
    ) -> ApiResult<Vec<ZoneConfig>> {
        let mut req = self.node_request(Method::GET, node_id, &["zonas"]);
        if only_enabled {
            req = req.query(&OnlyEnabled {
                solo_habilitadas: true,
            });
        }
        self.json(req).await
    }

    async fn zone_config(&self, node_id: &str, zona: u8) -> ApiResult<ZoneConfig> {
        let zona = zona.to_string();
        let req = self.node_request(Method::GET, node_id, &["zonas", &zona]);
        self.json(req).await
    }

    async fn upsert_zone_config(
        &self,
        node_id: &str,
        config: &ZoneConfigUpsert,
    ) -> ApiResult<ZoneConfig> {
        let req = self.node_request(Method::POST, node_id, &["zonas"]);
        self.json(req.json(config)).await
    }

    async fn rename_zone(&self, node_id: &str, zona: u8, nombre: &str) -> ApiResult<ZoneConfig> {
        let zona = zona.to_string();
        let req = self.node_request(Method::PATCH, node_id, &["zonas", &zona, "nombre"]);
        self.json(req.json(&RenameBody { nombre })).await
    }

    async fn toggle_zone(&self, node_id: &str, zona: u8) -> ApiResult<ZoneConfig> {
        let zona = zona.to_string();
        let req = self.node_request(Method::PATCH, node_id, &["zonas", &zona, "toggle"]);
        self.json(req).await
    }

    async fn delete_zone_config(&self, node_id: &str, zona: u8) -> ApiResult<()> {
        let zona = zona.to_string();
        let req = self.node_request(Method::DELETE, node_id, &["zonas", &zona]);
        self.empty(req).await
    }

    async fn reorder_zones(&self, node_id: &str, zonas: &[u8]) -> ApiResult<Vec<ZoneConfig>> {
        let req = self.node_request(Method::PUT, node_id, &["zonas", "orden"]);
        self.json(req.json(&OrderBody { zonas })).await
    }

    async fn health(&self) -> ApiResult<()> {
        self.empty(self.request(Method::GET, &["health"])).await
    }
}
