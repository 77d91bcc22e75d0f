//! Persisted per-zone configuration (display name, enabled flag, order)
//! for one node.

use irrigation_api::{ApiResult, IrrigationApi, ZoneConfig, ZoneConfigUpsert};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::store::{still_bound, tracked, OpStatus, Shared, Tracked};

/// Stable sort by `orden`; zones sharing an `orden` keep server order.
pub fn sort_by_order(configs: &mut [ZoneConfig]) {
    configs.sort_by_key(|c| c.orden);
}

/// Entry for a zone picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneOption {
    pub label: String,
    pub value: u8,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneConfigState {
    pub node_id: String,
    /// Always sorted by `orden`.
    pub configs: Vec<ZoneConfig>,
    pub status: OpStatus,
}

impl ZoneConfigState {
    pub fn config(&self, zona: u8) -> Option<&ZoneConfig> {
        self.configs.iter().find(|c| c.zona == zona)
    }

    fn config_mut(&mut self, zona: u8) -> Option<&mut ZoneConfig> {
        self.configs.iter_mut().find(|c| c.zona == zona)
    }

    pub fn enabled_zones(&self) -> Vec<&ZoneConfig> {
        let mut enabled: Vec<&ZoneConfig> = self.configs.iter().filter(|c| c.habilitada).collect();
        enabled.sort_by_key(|c| c.orden);
        enabled
    }

    pub fn available_zone_options(&self) -> Vec<ZoneOption> {
        self.enabled_zones()
            .into_iter()
            .map(|c| ZoneOption {
                label: c.nombre.clone(),
                value: c.zona,
            })
            .collect()
    }

    /// Configured name, or a generated one for unconfigured zones.
    pub fn zone_name(&self, zona: u8) -> String {
        match self.config(zona) {
            Some(c) => c.nombre.clone(),
            None => format!("Zone {zona}"),
        }
    }

    /// Unconfigured zones count as enabled.
    pub fn is_zone_enabled(&self, zona: u8) -> bool {
        self.config(zona).map_or(true, |c| c.habilitada)
    }
}

impl Tracked for ZoneConfigState {
    fn op_status(&mut self) -> &mut OpStatus {
        &mut self.status
    }

    fn node_id(&self) -> &str {
        &self.node_id
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct ZoneConfigStore<A> {
    api: Arc<A>,
    state: Shared<ZoneConfigState>,
}

impl<A> Clone for ZoneConfigStore<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            state: Arc::clone(&self.state),
        }
    }
}

impl<A: IrrigationApi> ZoneConfigStore<A> {
    pub fn new(api: Arc<A>, node_id: impl Into<String>) -> Self {
        let state = ZoneConfigState {
            node_id: node_id.into(),
            ..Default::default()
        };
        Self {
            api,
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn state(&self) -> Shared<ZoneConfigState> {
        Arc::clone(&self.state)
    }

    pub async fn snapshot(&self) -> ZoneConfigState {
        self.state.read().await.clone()
    }

    pub async fn node_id(&self) -> String {
        self.state.read().await.node_id.clone()
    }

    /// Replace the local list with the server's, sorted by `orden`.
    pub async fn fetch_configs(&self, only_enabled: bool) -> ApiResult<()> {
        tracked(&self.state, "zone_config.fetch", async {
            let node_id = self.node_id().await;
            let mut list = self.api.list_zone_configs(&node_id, only_enabled).await?;
            sort_by_order(&mut list);

            let mut st = self.state.write().await;
            if still_bound(&*st, &node_id, "zone_config.fetch") {
                debug!(node = %node_id, count = list.len(), only_enabled, "zone configs loaded");
                st.configs = list;
            }
            Ok(())
        })
        .await
    }

    /// Fetch one zone's config without touching the local list.
    pub async fn get_config(&self, zona: u8) -> ApiResult<ZoneConfig> {
        tracked(&self.state, "zone_config.get", async {
            let node_id = self.node_id().await;
            self.api.zone_config(&node_id, zona).await
        })
        .await
    }

    /// Create or replace a zone config, then reload the full list. The
    /// node id is taken from the store's binding.
    pub async fn upsert_config(&self, mut data: ZoneConfigUpsert) -> ApiResult<ZoneConfig> {
        tracked(&self.state, "zone_config.upsert", async {
            let node_id = self.node_id().await;
            data.node_id = node_id.clone();
            let saved = self.api.upsert_zone_config(&node_id, &data).await?;
            info!(node = %node_id, zone = saved.zona, "zone config saved");

            self.fetch_configs(false).await?;
            Ok(saved)
        })
        .await
    }

    /// Change a zone's display name; patches the local entry in place.
    pub async fn rename(&self, zona: u8, nombre: &str) -> ApiResult<ZoneConfig> {
        tracked(&self.state, "zone_config.rename", async {
            let node_id = self.node_id().await;
            let saved = self.api.rename_zone(&node_id, zona, nombre).await?;

            let mut st = self.state.write().await;
            if still_bound(&*st, &node_id, "zone_config.rename") {
                if let Some(c) = st.config_mut(zona) {
                    c.nombre = nombre.to_string();
                    c.updated_at = saved.updated_at;
                }
            }
            Ok(saved)
        })
        .await
    }

    /// Flip the enabled flag server-side and take the new value from the
    /// response.
    pub async fn toggle_enabled(&self, zona: u8) -> ApiResult<ZoneConfig> {
        tracked(&self.state, "zone_config.toggle", async {
            let node_id = self.node_id().await;
            let saved = self.api.toggle_zone(&node_id, zona).await?;
            info!(node = %node_id, zone = zona, enabled = saved.habilitada, "zone toggled");

            let mut st = self.state.write().await;
            if still_bound(&*st, &node_id, "zone_config.toggle") {
                if let Some(c) = st.config_mut(zona) {
                    c.habilitada = saved.habilitada;
                    c.updated_at = saved.updated_at;
                }
            }
            Ok(saved)
        })
        .await
    }

    /// Soft delete: the entry stays in the list, disabled.
    pub async fn delete_config(&self, zona: u8) -> ApiResult<()> {
        tracked(&self.state, "zone_config.delete", async {
            let node_id = self.node_id().await;
            self.api.delete_zone_config(&node_id, zona).await?;
            info!(node = %node_id, zone = zona, "zone config deleted");

            let mut st = self.state.write().await;
            if still_bound(&*st, &node_id, "zone_config.delete") {
                if let Some(c) = st.config_mut(zona) {
                    c.habilitada = false;
                }
            }
            Ok(())
        })
        .await
    }

    /// Submit a new display order; the local list becomes the server's
    /// reordered list.
    pub async fn reorder(&self, zonas: &[u8]) -> ApiResult<()> {
        tracked(&self.state, "zone_config.reorder", async {
            let node_id = self.node_id().await;
            let mut list = self.api.reorder_zones(&node_id, zonas).await?;
            sort_by_order(&mut list);

            let mut st = self.state.write().await;
            if still_bound(&*st, &node_id, "zone_config.reorder") {
                st.configs = list;
            }
            Ok(())
        })
        .await
    }

    /// Bind to another node: drop cached configs and reload.
    pub async fn set_node_id(&self, node_id: impl Into<String>) -> ApiResult<()> {
        {
            let mut st = self.state.write().await;
            st.node_id = node_id.into();
            st.configs.clear();
            st.status = OpStatus::default();
            info!(node = %st.node_id, "zone config rebound");
        }
        self.fetch_configs(false).await
    }
}

// ===========================================================================
// Tests
// ===========================================================================
