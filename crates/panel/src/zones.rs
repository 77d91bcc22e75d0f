//! Live zone status for one controller node: polling, manual start/stop,
//! and the derived remaining-time / progress fields.

use irrigation_api::{ApiResult, IrrigationApi, ZoneStatus};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::store::{still_bound, tracked, OpStatus, Shared, Tracked};

/// Reference window for `progress`: a full bar means one hour left.
const PROGRESS_WINDOW_SEC: f64 = 3600.0;

// ---------------------------------------------------------------------------
// Derived fields
// ---------------------------------------------------------------------------

/// Whole minutes left, rounded up. Missing means zero.
pub fn remaining_minutes(seconds: Option<u32>) -> u32 {
    seconds.unwrap_or(0).div_ceil(60)
}

/// Percentage of the one-hour window still to run, clamped to [0, 100].
/// Zero unless the zone is active with a positive remaining time.
pub fn progress_percent(active: bool, seconds: Option<u32>) -> f64 {
    match seconds {
        Some(s) if active && s > 0 => (s as f64 / PROGRESS_WINDOW_SEC * 100.0).clamp(0.0, 100.0),
        _ => 0.0,
    }
}

// ---------------------------------------------------------------------------
// Zone view
// ---------------------------------------------------------------------------

/// One zone as the UI sees it. Rebuilt from every status fetch; the derived
/// fields have no public setters.
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    id: u8,
    name: String,
    active: bool,
    remaining_time: u32,
    progress: f64,
    next_schedule: Option<String>,
}

impl Zone {
    pub fn from_status(s: &ZoneStatus) -> Self {
        Self {
            id: s.zona,
            name: s.nombre.clone(),
            active: s.activa,
            remaining_time: remaining_minutes(s.tiempo_restante_seg),
            progress: progress_percent(s.activa, s.tiempo_restante_seg),
            next_schedule: s.proximo_riego.clone(),
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn active(&self) -> bool {
        self.active
    }

    /// Minutes left.
    pub fn remaining_time(&self) -> u32 {
        self.remaining_time
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn next_schedule(&self) -> Option<&str> {
        self.next_schedule.as_deref()
    }

    /// "—" when nothing is left, "N min" under an hour, "Hh MMm" above.
    pub fn remaining_label(&self) -> String {
        match self.remaining_time {
            0 => "—".to_string(),
            m if m < 60 => format!("{m} min"),
            m => format!("{}h {:02}m", m / 60, m % 60),
        }
    }

    fn mark_started(&mut self, minutes: u32) {
        self.active = true;
        self.remaining_time = minutes;
        self.progress = 0.0;
    }

    fn mark_stopped(&mut self) {
        self.active = false;
        self.remaining_time = 0;
        self.progress = 0.0;
    }
}

/// Fold a fresh status list into `current` by zone id: matching entries are
/// overwritten in place, unseen zones appended, vanished zones dropped.
pub fn merge_zones(current: &mut Vec<Zone>, incoming: Vec<Zone>) {
    if current.is_empty() {
        *current = incoming;
        return;
    }

    let ids: HashSet<u8> = incoming.iter().map(|z| z.id).collect();
    for zone in incoming {
        match current.iter_mut().find(|z| z.id == zone.id) {
            Some(existing) => *existing = zone,
            None => current.push(zone),
        }
    }
    current.retain(|z| ids.contains(&z.id));
}

/// Shown when the backend is unreachable and nothing has been loaded yet.
pub fn placeholder_zones() -> Vec<Zone> {
    let zone = |id: u8, name: &str, next: Option<&str>| Zone {
        id,
        name: name.to_string(),
        active: false,
        remaining_time: 0,
        progress: 0.0,
        next_schedule: next.map(str::to_string),
    };
    vec![
        zone(1, "Zone 1 - Front garden", Some("Today 19:00 (15min)")),
        zone(2, "Zone 2 - Side garden", Some("Today 19:00 (15min)")),
        zone(3, "Zone 3 - Vegetable patch", Some("Tomorrow 07:00 (20min)")),
        zone(4, "Zone 4 - Patio", None),
    ]
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneStatusState {
    pub node_id: String,
    pub zones: Vec<Zone>,
    /// Whether the last status fetch reached the backend.
    pub connected: bool,
    pub status: OpStatus,
}

impl ZoneStatusState {
    pub fn zone(&self, id: u8) -> Option<&Zone> {
        self.zones.iter().find(|z| z.id == id)
    }

    pub fn active_zones(&self) -> Vec<&Zone> {
        self.zones.iter().filter(|z| z.active).collect()
    }

    pub fn idle_zones(&self) -> Vec<&Zone> {
        self.zones.iter().filter(|z| !z.active).collect()
    }
}

impl Tracked for ZoneStatusState {
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

pub struct ZoneStatusStore<A> {
    api: Arc<A>,
    state: Shared<ZoneStatusState>,
}

impl<A> Clone for ZoneStatusStore<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            state: Arc::clone(&self.state),
        }
    }
}

impl<A: IrrigationApi> ZoneStatusStore<A> {
    pub fn new(api: Arc<A>, node_id: impl Into<String>) -> Self {
        let state = ZoneStatusState {
            node_id: node_id.into(),
            ..Default::default()
        };
        Self {
            api,
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn state(&self) -> Shared<ZoneStatusState> {
        Arc::clone(&self.state)
    }

    pub async fn snapshot(&self) -> ZoneStatusState {
        self.state.read().await.clone()
    }

    pub async fn node_id(&self) -> String {
        self.state.read().await.node_id.clone()
    }

    /// Refresh from the backend. Failures are recorded, not returned; with
    /// nothing loaded yet the placeholder zones are shown instead.
    pub async fn fetch_status(&self) {
        let node_id = {
            let mut st = self.state.write().await;
            // Only the first load shows a spinner; polls update silently.
            let first_load = st.zones.is_empty();
            st.status.begin(first_load);
            st.node_id.clone()
        };

        let result = self.api.zone_status(&node_id).await;

        let mut st = self.state.write().await;
        if !still_bound(&*st, &node_id, "zones.fetch_status") {
            return;
        }
        match result {
            Ok(list) => {
                let incoming = list.iter().map(Zone::from_status).collect();
                merge_zones(&mut st.zones, incoming);
                st.connected = true;
            }
            Err(e) => {
                st.status.fail("zones.fetch_status", e.to_string());
                st.connected = false;
                if st.zones.is_empty() {
                    info!(node = %node_id, "backend unreachable, showing placeholder zones");
                    st.zones = placeholder_zones();
                }
            }
        }
        st.status.loading = false;
    }

    /// Open `zone` for `minutes`. The zone is shown as running straight
    /// away; on success the status is refetched. A failed command leaves
    /// the optimistic state in place until the next fetch.
    pub async fn start_watering(&self, zone: u8, minutes: u32) -> ApiResult<()> {
        tracked(&self.state, "zones.start_watering", async {
            let node_id = {
                let mut st = self.state.write().await;
                if let Some(z) = st.zones.iter_mut().find(|z| z.id == zone) {
                    z.mark_started(minutes);
                    debug!(zone, minutes, "optimistic start");
                }
                st.node_id.clone()
            };

            self.api.start_watering(&node_id, zone, minutes).await?;
            info!(node = %node_id, zone, minutes, "watering started");

            self.fetch_status().await;
            Ok(())
        })
        .await
    }

    /// Close `zone`. Same optimistic handling as [`Self::start_watering`].
    pub async fn stop_watering(&self, zone: u8) -> ApiResult<()> {
        tracked(&self.state, "zones.stop_watering", async {
            let node_id = {
                let mut st = self.state.write().await;
                if let Some(z) = st.zones.iter_mut().find(|z| z.id == zone) {
                    z.mark_stopped();
                    debug!(zone, "optimistic stop");
                }
                st.node_id.clone()
            };

            self.api.stop_watering(&node_id, zone).await?;
            info!(node = %node_id, zone, "watering stopped");

            self.fetch_status().await;
            Ok(())
        })
        .await
    }

    /// Bind to another node: drop everything cached and reload.
    pub async fn set_node_id(&self, node_id: impl Into<String>) {
        {
            let mut st = self.state.write().await;
            st.node_id = node_id.into();
            st.zones.clear();
            st.connected = false;
            st.status = OpStatus::default();
            info!(node = %st.node_id, "zone status rebound");
        }
        self.fetch_status().await;
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{status, FakeApi};
    use irrigation_api::Action;

    fn store_with(zones: Vec<ZoneStatus>) -> (Arc<FakeApi>, ZoneStatusStore<FakeApi>) {
        let api = FakeApi::new();
        api.set_statuses("node-a", zones);
        let store = ZoneStatusStore::new(Arc::clone(&api), "node-a");
        (api, store)
    }

    fn two_idle_zones() -> Vec<ZoneStatus> {
        vec![status(1, false, None), status(2, false, None)]
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    // -- Derived fields -----------------------------------------------------

    #[test]
    fn remaining_minutes_rounds_up() {
        assert_eq!(remaining_minutes(None), 0);
        assert_eq!(remaining_minutes(Some(0)), 0);
        assert_eq!(remaining_minutes(Some(1)), 1);
        assert_eq!(remaining_minutes(Some(60)), 1);
        assert_eq!(remaining_minutes(Some(61)), 2);
        assert_eq!(remaining_minutes(Some(3599)), 60);
    }

    #[test]
    fn progress_zero_unless_active_with_time_left() {
        assert_eq!(progress_percent(false, Some(1800)), 0.0);
        assert_eq!(progress_percent(true, None), 0.0);
        assert_eq!(progress_percent(true, Some(0)), 0.0);
    }

    #[test]
    fn progress_relative_to_one_hour() {
        assert!(approx(progress_percent(true, Some(1800)), 50.0));
        assert!(approx(progress_percent(true, Some(36)), 1.0));
        assert!(approx(progress_percent(true, Some(3600)), 100.0));
    }

    #[test]
    fn progress_clamped_to_hundred() {
        assert_eq!(progress_percent(true, Some(7200)), 100.0);
    }

    #[test]
    fn zone_from_status_derives_fields() {
        let z = Zone::from_status(&status(3, true, Some(90)));
        assert_eq!(z.id(), 3);
        assert!(z.active());
        assert_eq!(z.remaining_time(), 2);
        assert!(approx(z.progress(), 2.5));
    }

    #[test]
    fn remaining_label_formats() {
        let mut z = Zone::from_status(&status(1, false, None));
        assert_eq!(z.remaining_label(), "—");
        z.mark_started(12);
        assert_eq!(z.remaining_label(), "12 min");
        z.mark_started(65);
        assert_eq!(z.remaining_label(), "1h 05m");
    }

    // -- Merge --------------------------------------------------------------

    #[test]
    fn merge_into_empty_takes_list() {
        let mut current = Vec::new();
        merge_zones(&mut current, placeholder_zones());
        assert_eq!(current.len(), 4);
    }

    #[test]
    fn merge_updates_appends_and_removes() {
        fn views(list: &[ZoneStatus]) -> Vec<Zone> {
            list.iter().map(Zone::from_status).collect()
        }

        let mut current = views(&[
            status(1, false, None),
            status(2, false, None),
            status(3, false, None),
        ]);
        let incoming = views(&[
            status(3, true, Some(600)),
            status(1, false, None),
            status(5, false, None),
        ]);

        merge_zones(&mut current, incoming);

        let ids: Vec<u8> = current.iter().map(Zone::id).collect();
        // existing order kept, new zone appended, missing zone dropped
        assert_eq!(ids, vec![1, 3, 5]);
        assert!(current[1].active());
        assert_eq!(current[1].remaining_time(), 10);
    }

    // -- fetch_status -------------------------------------------------------

    #[tokio::test]
    async fn fetch_populates_and_connects() {
        let (_api, store) = store_with(vec![status(1, true, Some(1800)), status(2, false, None)]);
        store.fetch_status().await;

        let st = store.snapshot().await;
        assert!(st.connected);
        assert!(!st.status.loading);
        assert_eq!(st.status.error, None);
        assert_eq!(st.zones.len(), 2);
        assert_eq!(st.active_zones().len(), 1);
        assert_eq!(st.idle_zones().len(), 1);
        assert!(approx(st.zone(1).unwrap().progress(), 50.0));
    }

    #[tokio::test]
    async fn fetch_failure_on_empty_list_uses_placeholder() {
        let (api, store) = store_with(two_idle_zones());
        api.fail("zone_status");

        store.fetch_status().await;

        let st = store.snapshot().await;
        assert!(!st.connected);
        assert!(!st.status.loading);
        assert_eq!(
            st.status.error.as_deref(),
            Some("server error (500): zone_status failed")
        );
        assert_eq!(st.zones, placeholder_zones());
    }

    #[tokio::test]
    async fn fetch_failure_keeps_loaded_zones() {
        let (api, store) = store_with(two_idle_zones());
        store.fetch_status().await;

        api.fail("zone_status");
        store.fetch_status().await;

        let st = store.snapshot().await;
        assert!(!st.connected);
        assert_eq!(st.zones.iter().map(Zone::id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn successful_fetch_clears_previous_error() {
        let (api, store) = store_with(two_idle_zones());
        api.fail("zone_status");
        store.fetch_status().await;
        api.recover("zone_status");

        store.fetch_status().await;

        let st = store.snapshot().await;
        assert!(st.connected);
        assert_eq!(st.status.error, None);
        assert_eq!(st.zones.len(), 2);
    }

    // -- start / stop -------------------------------------------------------

    #[tokio::test]
    async fn start_watering_is_optimistic_before_command_resolves() {
        let (api, store) = store_with(two_idle_zones());
        store.fetch_status().await;

        let gate = api.hold();
        let task = tokio::spawn({
            let store = store.clone();
            async move { store.start_watering(2, 10).await }
        });
        gate.entered.notified().await;

        {
            let st = store.state();
            let st = st.read().await;
            let z = st.zone(2).unwrap();
            assert!(z.active());
            assert_eq!(z.remaining_time(), 10);
            assert_eq!(z.progress(), 0.0);
            assert!(st.status.loading);
        }

        gate.release.notify_one();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn start_watering_sends_seconds_and_refetches() {
        let (api, store) = store_with(two_idle_zones());
        store.fetch_status().await;

        store.start_watering(2, 10).await.unwrap();

        let commands = api.commands.lock().unwrap().clone();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].0, "node-a");
        assert_eq!(commands[0].1.accion, Action::On);
        assert_eq!(commands[0].1.duracion, Some(600));
        assert_eq!(api.count("zone_status"), 2);

        // Server truth after the refetch: 600 s left.
        let st = store.snapshot().await;
        let z = st.zone(2).unwrap();
        assert!(z.active());
        assert_eq!(z.remaining_time(), 10);
        assert!(approx(z.progress(), 600.0 / 3600.0 * 100.0));
        assert!(!st.status.loading);
    }

    #[tokio::test]
    async fn start_watering_failure_keeps_optimistic_state() {
        let (api, store) = store_with(two_idle_zones());
        store.fetch_status().await;
        api.fail("send_command");

        let err = store.start_watering(2, 10).await.unwrap_err();

        assert_eq!(err.status(), Some(500));
        let st = store.snapshot().await;
        // No rollback for start/stop: the zone still reads as running.
        let z = st.zone(2).unwrap();
        assert!(z.active());
        assert_eq!(z.remaining_time(), 10);
        assert_eq!(
            st.status.error.as_deref(),
            Some("server error (500): send_command failed")
        );
        assert!(!st.status.loading);
        // No reconciling fetch after a failed command.
        assert_eq!(api.count("zone_status"), 1);
    }

    #[tokio::test]
    async fn stop_watering_marks_idle_and_refetches() {
        let (api, store) = store_with(vec![status(1, true, Some(900))]);
        store.fetch_status().await;

        store.stop_watering(1).await.unwrap();

        let commands = api.commands.lock().unwrap().clone();
        assert_eq!(commands[0].1.accion, Action::Off);
        assert_eq!(commands[0].1.duracion, None);
        let st = store.snapshot().await;
        let z = st.zone(1).unwrap();
        assert!(!z.active());
        assert_eq!(z.remaining_time(), 0);
        assert_eq!(z.progress(), 0.0);
    }

    #[tokio::test]
    async fn stop_watering_failure_keeps_optimistic_state() {
        let (api, store) = store_with(vec![status(1, true, Some(900))]);
        store.fetch_status().await;
        api.fail("send_command");

        let err = store.stop_watering(1).await.unwrap_err();

        assert_eq!(err.status(), Some(500));
        let st = store.snapshot().await;
        let z = st.zone(1).unwrap();
        assert!(!z.active());
        assert_eq!(z.remaining_time(), 0);
        assert_eq!(z.progress(), 0.0);
        assert_eq!(
            st.status.error.as_deref(),
            Some("server error (500): send_command failed")
        );
        assert!(!st.status.loading);
        assert_eq!(api.count("zone_status"), 1);
    }

    #[tokio::test]
    async fn start_unknown_zone_still_sends_command() {
        let (api, store) = store_with(two_idle_zones());
        store.fetch_status().await;

        store.start_watering(7, 5).await.unwrap();

        assert_eq!(api.commands.lock().unwrap().len(), 1);
        assert!(store.snapshot().await.zone(7).is_none());
    }

    // -- Node binding -------------------------------------------------------

    #[tokio::test]
    async fn set_node_id_reloads_for_new_node_only() {
        let (api, store) = store_with(two_idle_zones());
        api.set_statuses("node-42", vec![status(9, true, Some(120))]);
        let other = ZoneStatusStore::new(Arc::clone(&api), "node-a");
        store.fetch_status().await;
        other.fetch_status().await;

        store.set_node_id("node-42").await;

        let st = store.snapshot().await;
        assert_eq!(st.node_id, "node-42");
        assert_eq!(st.zones.iter().map(Zone::id).collect::<Vec<_>>(), vec![9]);
        assert!(api.calls().contains(&"zone_status node-42".to_string()));

        let other = other.snapshot().await;
        assert_eq!(other.node_id, "node-a");
        assert_eq!(other.zones.len(), 2);
    }

    #[tokio::test]
    async fn response_for_previous_node_is_discarded() {
        let (api, store) = store_with(two_idle_zones());
        api.set_statuses("node-b", vec![status(4, false, None)]);

        let gate = api.hold();
        let stale = tokio::spawn({
            let store = store.clone();
            async move { store.fetch_status().await }
        });
        gate.entered.notified().await;

        store.set_node_id("node-b").await;
        gate.release.notify_one();
        stale.await.unwrap();

        let st = store.snapshot().await;
        assert_eq!(st.node_id, "node-b");
        assert_eq!(st.zones.iter().map(Zone::id).collect::<Vec<_>>(), vec![4]);
    }

    #[tokio::test]
    async fn command_failure_for_previous_node_not_reported() {
        let (api, store) = store_with(two_idle_zones());
        api.set_statuses("node-b", vec![status(4, false, None)]);
        store.fetch_status().await;
        api.fail("send_command");

        let gate = api.hold();
        let stale = tokio::spawn({
            let store = store.clone();
            async move { store.start_watering(1, 5).await }
        });
        gate.entered.notified().await;

        store.set_node_id("node-b").await;
        gate.release.notify_one();
        assert!(stale.await.unwrap().is_err());

        let st = store.snapshot().await;
        assert_eq!(st.node_id, "node-b");
        assert_eq!(st.status.error, None);
        assert!(!st.status.loading);
        assert_eq!(st.zones.iter().map(Zone::id).collect::<Vec<_>>(), vec![4]);
    }
}
