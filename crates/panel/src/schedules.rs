//! Watering schedules ("agendas") for one node. Create and update share the
//! backend's upsert call; toggling is optimistic with rollback.

use irrigation_api::{Agenda, ApiError, ApiResult, IrrigationApi, Weekday};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::store::{still_bound, tracked, OpStatus, Shared, Tracked};

/// Shown when the backend is unreachable and nothing has been loaded yet.
pub fn placeholder_agendas() -> Vec<Agenda> {
    use Weekday::*;

    let agenda = |id: &str, nombre: &str, zona: u8, hora: &str, minutes: u16| Agenda {
        id: Some(id.to_string()),
        node_id: None,
        nombre: Some(nombre.to_string()),
        zona,
        dias_semana: Vec::new(),
        hora_inicio: hora.to_string(),
        duracion_min: minutes,
        activa: true,
        version: None,
        updated_at: None,
    };
    vec![
        Agenda {
            dias_semana: vec![Lun, Mie, Vie],
            ..agenda("1", "Morning garden", 1, "07:00", 15)
        },
        Agenda {
            dias_semana: Weekday::ALL.to_vec(),
            ..agenda("2", "Evening vegetable patch", 3, "19:00", 20)
        },
        Agenda {
            dias_semana: vec![Sab, Dom],
            activa: false,
            ..agenda("3", "Weekend lawn", 2, "08:00", 10)
        },
    ]
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleState {
    pub node_id: String,
    pub agendas: Vec<Agenda>,
    pub status: OpStatus,
}

impl ScheduleState {
    pub fn agenda(&self, id: &str) -> Option<&Agenda> {
        self.agendas.iter().find(|a| a.id.as_deref() == Some(id))
    }

    fn agenda_mut(&mut self, id: &str) -> Option<&mut Agenda> {
        self.agendas.iter_mut().find(|a| a.id.as_deref() == Some(id))
    }
}

impl Tracked for ScheduleState {
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

pub struct ScheduleStore<A> {
    api: Arc<A>,
    state: Shared<ScheduleState>,
}

impl<A> Clone for ScheduleStore<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            state: Arc::clone(&self.state),
        }
    }
}

impl<A: IrrigationApi> ScheduleStore<A> {
    pub fn new(api: Arc<A>, node_id: impl Into<String>) -> Self {
        let state = ScheduleState {
            node_id: node_id.into(),
            ..Default::default()
        };
        Self {
            api,
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn state(&self) -> Shared<ScheduleState> {
        Arc::clone(&self.state)
    }

    pub async fn snapshot(&self) -> ScheduleState {
        self.state.read().await.clone()
    }

    pub async fn node_id(&self) -> String {
        self.state.read().await.node_id.clone()
    }

    /// Replace the local list with the server's. Failures are recorded, not
    /// returned; with nothing loaded yet the placeholder schedules are shown.
    pub async fn fetch_agendas(&self) {
        let node_id = {
            let mut st = self.state.write().await;
            st.status.begin(true);
            st.node_id.clone()
        };

        let result = self.api.list_agendas(&node_id).await;

        let mut st = self.state.write().await;
        if !still_bound(&*st, &node_id, "schedules.fetch") {
            return;
        }
        match result {
            Ok(list) => {
                debug!(node = %node_id, count = list.len(), "agendas loaded");
                st.agendas = list;
            }
            Err(e) => {
                st.status.fail("schedules.fetch", e.to_string());
                if st.agendas.is_empty() {
                    info!(node = %node_id, "backend unreachable, showing placeholder agendas");
                    st.agendas = placeholder_agendas();
                }
            }
        }
        st.status.loading = false;
    }

    async fn save(&self, op: &'static str, mut data: Agenda) -> ApiResult<Agenda> {
        tracked(&self.state, op, async {
            data.validate()?;
            let node_id = self.node_id().await;
            data.node_id = Some(node_id.clone());

            let saved = self.api.upsert_agenda(&node_id, &data).await?;
            info!(
                node = %node_id,
                id = saved.id.as_deref().unwrap_or("-"),
                zone = saved.zona,
                "agenda saved"
            );

            self.fetch_agendas().await;
            Ok(saved)
        })
        .await
    }

    /// Create a schedule; the list is reloaded to pick up the assigned id.
    pub async fn create_agenda(&self, data: Agenda) -> ApiResult<Agenda> {
        self.save("schedules.create", data).await
    }

    /// Replace schedule `id` with `data`.
    pub async fn update_agenda(&self, id: &str, mut data: Agenda) -> ApiResult<Agenda> {
        data.id = Some(id.to_string());
        self.save("schedules.update", data).await
    }

    pub async fn delete_agenda(&self, id: &str) -> ApiResult<()> {
        tracked(&self.state, "schedules.delete", async {
            let node_id = self.node_id().await;
            self.api.delete_agenda(&node_id, id).await?;
            info!(node = %node_id, id, "agenda deleted");

            self.fetch_agendas().await;
            Ok(())
        })
        .await
    }

    /// Flip `agenda`'s active flag. The local entry flips immediately and is
    /// restored if the server rejects the update.
    pub async fn toggle_agenda(&self, agenda: &Agenda) -> ApiResult<Agenda> {
        let Some(id) = agenda.id.clone() else {
            return Err(ApiError::Invalid("agenda has no id".into()));
        };

        let (node_id, previous) = {
            let mut st = self.state.write().await;
            st.status.error = None;
            let previous = st.agenda_mut(&id).map(|a| {
                let was = a.activa;
                a.activa = !was;
                was
            });
            debug!(id = %id, ?previous, "optimistic agenda toggle");
            (st.node_id.clone(), previous)
        };

        let mut outgoing = agenda.clone();
        outgoing.activa = !agenda.activa;
        outgoing.node_id = Some(node_id.clone());
        outgoing.version = None;
        outgoing.updated_at = None;

        match self.api.upsert_agenda(&node_id, &outgoing).await {
            Ok(saved) => {
                info!(node = %node_id, id = %id, active = outgoing.activa, "agenda toggled");
                Ok(saved)
            }
            Err(e) => {
                let mut st = self.state.write().await;
                if still_bound(&*st, &node_id, "schedules.toggle") {
                    if let (Some(was), Some(a)) = (previous, st.agenda_mut(&id)) {
                        a.activa = was;
                        warn!(id = %id, active = was, "agenda toggle rolled back");
                    }
                    st.status.fail("schedules.toggle", e.to_string());
                }
                Err(e)
            }
        }
    }

    /// Bind to another node: drop cached schedules and reload.
    pub async fn set_node_id(&self, node_id: impl Into<String>) {
        {
            let mut st = self.state.write().await;
            st.node_id = node_id.into();
            st.agendas.clear();
            st.status = OpStatus::default();
            info!(node = %st.node_id, "schedules rebound");
        }
        self.fetch_agendas().await;
    }
}

// ===========================================================================
// Tests
// ===========================================================================
