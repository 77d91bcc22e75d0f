//! In-memory backend for store tests. Behaves like the real server for the
//! happy path, can be told to fail named operations, and can hold one call
//! in flight so tests can look at optimistic state.

use async_trait::async_trait;
use irrigation_api::{
    Action, Agenda, ApiError, ApiResult, HistoryFilter, HumidityReading, IrrigationApi,
    IrrigationEvent, NodeInfo, ZoneCommand, ZoneConfig, ZoneConfigUpsert, ZoneStatus,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use time::macros::datetime;
use time::OffsetDateTime;
use tokio::sync::Notify;

pub(crate) const SERVER_TIME: OffsetDateTime = datetime!(2025-03-02 8:30 UTC);

/// Lets a test observe a call while it is suspended.
#[derive(Default)]
pub(crate) struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

#[derive(Default)]
pub(crate) struct FakeApi {
    pub statuses: Mutex<HashMap<String, Vec<ZoneStatus>>>,
    pub configs: Mutex<HashMap<String, Vec<ZoneConfig>>>,
    pub agendas: Mutex<HashMap<String, Vec<Agenda>>>,
    pub commands: Mutex<Vec<(String, ZoneCommand)>>,
    pub upserted_agendas: Mutex<Vec<Agenda>>,
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<&'static str>>,
    gate: Mutex<Option<Arc<Gate>>>,
    next_id: AtomicU32,
}

pub(crate) fn status(zona: u8, activa: bool, secs: Option<u32>) -> ZoneStatus {
    ZoneStatus {
        zona,
        nombre: format!("Zone {zona}"),
        activa,
        tiempo_restante_seg: secs,
        proximo_riego: None,
    }
}

pub(crate) fn config(zona: u8, orden: i32, habilitada: bool) -> ZoneConfig {
    ZoneConfig {
        node_id: Some("node-a".into()),
        zona,
        nombre: format!("Bed {zona}"),
        habilitada,
        icono: None,
        orden,
        created_at: None,
        updated_at: None,
    }
}

pub(crate) fn agenda(id: &str, zona: u8, activa: bool) -> Agenda {
    Agenda {
        id: Some(id.to_string()),
        node_id: Some("node-a".into()),
        nombre: Some(format!("Rule {id}")),
        zona,
        dias_semana: vec![irrigation_api::Weekday::Lun],
        hora_inicio: "07:00".into(),
        duracion_min: 15,
        activa,
        version: Some(1),
        updated_at: None,
    }
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_statuses(&self, node: &str, list: Vec<ZoneStatus>) {
        self.statuses.lock().unwrap().insert(node.into(), list);
    }

    pub fn set_configs(&self, node: &str, list: Vec<ZoneConfig>) {
        self.configs.lock().unwrap().insert(node.into(), list);
    }

    pub fn set_agendas(&self, node: &str, list: Vec<Agenda>) {
        self.agendas.lock().unwrap().insert(node.into(), list);
    }

    pub fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn recover(&self, op: &'static str) {
        self.failing.lock().unwrap().remove(op);
    }

    /// The next gated call waits for `release` after signalling `entered`.
    pub fn hold(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn check(&self, op: &'static str, node: &str) -> ApiResult<()> {
        self.calls.lock().unwrap().push(format!("{op} {node}"));
        if self.failing.lock().unwrap().contains(op) {
            return Err(ApiError::Server {
                status: 500,
                message: format!("{op} failed"),
            });
        }
        Ok(())
    }

    async fn pause(&self) {
        let gate = self.gate.lock().unwrap().take();
        if let Some(g) = gate {
            g.entered.notify_one();
            g.release.notified().await;
        }
    }

    fn not_found(what: String) -> ApiError {
        ApiError::Server {
            status: 404,
            message: format!("{what} not found"),
        }
    }
}

#[async_trait]
impl IrrigationApi for FakeApi {
    async fn list_nodes(&self) -> ApiResult<Vec<NodeInfo>> {
        self.check("list_nodes", "-")?;
        let nodes = self.statuses.lock().unwrap().keys().cloned().collect::<Vec<_>>();
        Ok(nodes
            .into_iter()
            .map(|node_id| NodeInfo {
                node_id,
                nombre: None,
            })
            .collect())
    }

    async fn send_command(&self, node_id: &str, cmd: &ZoneCommand) -> ApiResult<()> {
        self.commands
            .lock()
            .unwrap()
            .push((node_id.to_string(), cmd.clone()));
        self.pause().await;
        self.check("send_command", node_id)?;

        let mut statuses = self.statuses.lock().unwrap();
        if let Some(z) = statuses
            .get_mut(node_id)
            .and_then(|l| l.iter_mut().find(|z| z.zona == cmd.zona))
        {
            match cmd.accion {
                Action::On => {
                    z.activa = true;
                    z.tiempo_restante_seg = cmd.duracion;
                }
                Action::Off => {
                    z.activa = false;
                    z.tiempo_restante_seg = None;
                }
            }
        }
        Ok(())
    }

    async fn zone_status(&self, node_id: &str) -> ApiResult<Vec<ZoneStatus>> {
        self.pause().await;
        self.check("zone_status", node_id)?;
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(node_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_agendas(&self, node_id: &str) -> ApiResult<Vec<Agenda>> {
        self.pause().await;
        self.check("list_agendas", node_id)?;
        Ok(self
            .agendas
            .lock()
            .unwrap()
            .get(node_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert_agenda(&self, node_id: &str, agenda: &Agenda) -> ApiResult<Agenda> {
        self.upserted_agendas.lock().unwrap().push(agenda.clone());
        self.pause().await;
        self.check("upsert_agenda", node_id)?;

        let mut saved = agenda.clone();
        if saved.id.is_none() {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 100;
            saved.id = Some(n.to_string());
        }
        saved.updated_at = Some(SERVER_TIME);

        let mut all = self.agendas.lock().unwrap();
        let list = all.entry(node_id.to_string()).or_default();
        match list.iter_mut().find(|a| a.id == saved.id) {
            Some(existing) => *existing = saved.clone(),
            None => list.push(saved.clone()),
        }
        Ok(saved)
    }

    async fn delete_agenda(&self, node_id: &str, agenda_id: &str) -> ApiResult<()> {
        self.check("delete_agenda", node_id)?;
        let mut all = self.agendas.lock().unwrap();
        let list = all.entry(node_id.to_string()).or_default();
        let before = list.len();
        list.retain(|a| a.id.as_deref() != Some(agenda_id));
        if list.len() == before {
            return Err(Self::not_found(format!("agenda {agenda_id}")));
        }
        Ok(())
    }

    async fn list_events(
        &self,
        node_id: &str,
        _filter: &HistoryFilter,
    ) -> ApiResult<Vec<IrrigationEvent>> {
        self.check("list_events", node_id)?;
        Ok(Vec::new())
    }

    async fn list_humidity(
        &self,
        node_id: &str,
        _filter: &HistoryFilter,
    ) -> ApiResult<Vec<HumidityReading>> {
        self.check("list_humidity", node_id)?;
        Ok(Vec::new())
    }

    async fn list_zone_configs(
        &self,
        node_id: &str,
        only_enabled: bool,
    ) -> ApiResult<Vec<ZoneConfig>> {
        self.check("list_zone_configs", node_id)?;
        let list = self
            .configs
            .lock()
            .unwrap()
            .get(node_id)
            .cloned()
            .unwrap_or_default();
        Ok(list
            .into_iter()
            .filter(|c| !only_enabled || c.habilitada)
            .collect())
    }

    async fn zone_config(&self, node_id: &str, zona: u8) -> ApiResult<ZoneConfig> {
        self.check("zone_config", node_id)?;
        self.configs
            .lock()
            .unwrap()
            .get(node_id)
            .and_then(|l| l.iter().find(|c| c.zona == zona).cloned())
            .ok_or_else(|| Self::not_found(format!("zona {zona}")))
    }

    async fn upsert_zone_config(
        &self,
        node_id: &str,
        config: &ZoneConfigUpsert,
    ) -> ApiResult<ZoneConfig> {
        self.check("upsert_zone_config", node_id)?;
        let saved = ZoneConfig {
            node_id: Some(config.node_id.clone()),
            zona: config.zona,
            nombre: config.nombre.clone(),
            habilitada: config.habilitada,
            icono: config.icono.clone(),
            orden: config.orden,
            created_at: Some(SERVER_TIME),
            updated_at: Some(SERVER_TIME),
        };
        let mut all = self.configs.lock().unwrap();
        let list = all.entry(node_id.to_string()).or_default();
        match list.iter_mut().find(|c| c.zona == config.zona) {
            Some(existing) => *existing = saved.clone(),
            None => list.push(saved.clone()),
        }
        Ok(saved)
    }

    async fn rename_zone(&self, node_id: &str, zona: u8, nombre: &str) -> ApiResult<ZoneConfig> {
        self.pause().await;
        self.check("rename_zone", node_id)?;
        let mut all = self.configs.lock().unwrap();
        let c = all
            .get_mut(node_id)
            .and_then(|l| l.iter_mut().find(|c| c.zona == zona))
            .ok_or_else(|| Self::not_found(format!("zona {zona}")))?;
        c.nombre = nombre.to_string();
        c.updated_at = Some(SERVER_TIME);
        Ok(c.clone())
    }

    async fn toggle_zone(&self, node_id: &str, zona: u8) -> ApiResult<ZoneConfig> {
        self.check("toggle_zone", node_id)?;
        let mut all = self.configs.lock().unwrap();
        let c = all
            .get_mut(node_id)
            .and_then(|l| l.iter_mut().find(|c| c.zona == zona))
            .ok_or_else(|| Self::not_found(format!("zona {zona}")))?;
        c.habilitada = !c.habilitada;
        c.updated_at = Some(SERVER_TIME);
        Ok(c.clone())
    }

    async fn delete_zone_config(&self, node_id: &str, zona: u8) -> ApiResult<()> {
        self.check("delete_zone_config", node_id)?;
        let mut all = self.configs.lock().unwrap();
        let c = all
            .get_mut(node_id)
            .and_then(|l| l.iter_mut().find(|c| c.zona == zona))
            .ok_or_else(|| Self::not_found(format!("zona {zona}")))?;
        c.habilitada = false;
        Ok(())
    }

    async fn reorder_zones(&self, node_id: &str, zonas: &[u8]) -> ApiResult<Vec<ZoneConfig>> {
        self.check("reorder_zones", node_id)?;
        let mut all = self.configs.lock().unwrap();
        let list = all.entry(node_id.to_string()).or_default();
        for c in list.iter_mut() {
            if let Some(pos) = zonas.iter().position(|z| *z == c.zona) {
                c.orden = pos as i32;
            }
        }
        Ok(list.clone())
    }

    async fn health(&self) -> ApiResult<()> {
        self.check("health", "-")
    }
}
