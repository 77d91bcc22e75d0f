//! Client-side state for the irrigation panel.
//!
//! Three independent stores, each bound to one controller node:
//! [`ZoneStatusStore`] (live valve state), [`ZoneConfigStore`] (names,
//! enabled flags, order) and [`ScheduleStore`] (watering rules). All of
//! them talk to the backend through an [`IrrigationApi`] implementation.

pub mod config;
pub mod render;
pub mod schedules;
pub mod store;
pub mod zone_config;
pub mod zones;

#[cfg(test)]
mod fake;

use irrigation_api::IrrigationApi;
use std::sync::Arc;

pub use schedules::{ScheduleState, ScheduleStore};
pub use store::{OpStatus, Shared};
pub use zone_config::{ZoneConfigState, ZoneConfigStore, ZoneOption};
pub use zones::{Zone, ZoneStatusState, ZoneStatusStore};

/// The three stores, sharing one API client and starting on the same node.
/// Rebinding one store leaves the others where they are.
pub struct Panel<A> {
    pub zones: ZoneStatusStore<A>,
    pub configs: ZoneConfigStore<A>,
    pub schedules: ScheduleStore<A>,
}

impl<A> Clone for Panel<A> {
    fn clone(&self) -> Self {
        Self {
            zones: self.zones.clone(),
            configs: self.configs.clone(),
            schedules: self.schedules.clone(),
        }
    }
}

impl<A: IrrigationApi> Panel<A> {
    pub fn new(api: Arc<A>, node_id: &str) -> Self {
        Self {
            zones: ZoneStatusStore::new(Arc::clone(&api), node_id),
            configs: ZoneConfigStore::new(Arc::clone(&api), node_id),
            schedules: ScheduleStore::new(api, node_id),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
