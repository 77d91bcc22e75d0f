//! Client for the irrigation backend's REST API.
//!
//! [`IrrigationApi`] is the seam the panel's stores are written against;
//! [`HttpApi`] is the production implementation.

pub mod client;
pub mod error;
pub mod types;

pub use client::{Credentials, HttpApi, IrrigationApi, REQUEST_TIMEOUT};
pub use error::{ApiError, ApiResult};
pub use types::{
    Action, Agenda, HistoryFilter, HumidityReading, IrrigationEvent, NodeInfo, Weekday,
    ZoneCommand, ZoneConfig, ZoneConfigUpsert, ZoneStatus, MAX_AGENDA_MINUTES, MAX_ZONE,
};
