//! JSON wire types exchanged with the irrigation backend. Field names follow
//! the backend's camelCase Spanish vocabulary (`zona`, `habilitada`, ...).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::error::{ApiError, ApiResult};

/// Highest zone number a controller node exposes.
pub const MAX_ZONE: u8 = 8;

/// Longest schedule the backend accepts, in minutes.
pub const MAX_AGENDA_MINUTES: u16 = 180;

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    #[serde(alias = "id")]
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nombre: Option<String>,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "ON")]
    On,
    #[serde(rename = "OFF")]
    Off,
}

impl FromStr for Action {
    type Err = String;

    /// Parse "ON"/"OFF" (case-insensitive, trims whitespace).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_uppercase();
        match s.as_str() {
            "ON" => Ok(Self::On),
            "OFF" => Ok(Self::Off),
            _ => Err(format!("unknown valve command '{s}'")),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => write!(f, "ON"),
            Self::Off => write!(f, "OFF"),
        }
    }
}

/// Body of `POST /nodos/{nodeId}/cmd`. `duracion` is in seconds and only
/// present on `ON` commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneCommand {
    pub node_id: String,
    pub zona: u8,
    pub accion: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duracion: Option<u32>,
}

impl ZoneCommand {
    pub fn on(node_id: &str, zona: u8, seconds: u32) -> Self {
        Self {
            node_id: node_id.to_string(),
            zona,
            accion: Action::On,
            duracion: (seconds > 0).then_some(seconds),
        }
    }

    pub fn off(node_id: &str, zona: u8) -> Self {
        Self {
            node_id: node_id.to_string(),
            zona,
            accion: Action::Off,
            duracion: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Live status
// ---------------------------------------------------------------------------

/// One entry of `GET /nodos/{nodeId}/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneStatus {
    pub zona: u8,
    #[serde(default)]
    pub nombre: String,
    #[serde(default)]
    pub activa: bool,
    #[serde(default)]
    pub tiempo_restante_seg: Option<u32>,
    #[serde(default)]
    pub proximo_riego: Option<String>,
}

// ---------------------------------------------------------------------------
// Zone configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub zona: u8,
    pub nombre: String,
    #[serde(default = "default_true")]
    pub habilitada: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icono: Option<String>,
    #[serde(default)]
    pub orden: i32,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<OffsetDateTime>,
}

/// Body of `POST /nodos/{nodeId}/zonas`; creates or replaces one zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneConfigUpsert {
    pub node_id: String,
    pub zona: u8,
    pub nombre: String,
    pub habilitada: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icono: Option<String>,
    pub orden: i32,
}

// ---------------------------------------------------------------------------
// Schedules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Weekday {
    Lun,
    Mar,
    Mie,
    Jue,
    Vie,
    Sab,
    Dom,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Self::Lun,
        Self::Mar,
        Self::Mie,
        Self::Jue,
        Self::Vie,
        Self::Sab,
        Self::Dom,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Lun => "LUN",
            Self::Mar => "MAR",
            Self::Mie => "MIE",
            Self::Jue => "JUE",
            Self::Vie => "VIE",
            Self::Sab => "SAB",
            Self::Dom => "DOM",
        }
    }
}

impl FromStr for Weekday {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|d| d.code() == code)
            .ok_or_else(|| format!("unknown weekday '{s}' (use LUN..DOM)"))
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A recurring watering rule. Create and update share one upsert call: a
/// record without `id` is created, one with `id` replaces the stored rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agenda {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nombre: Option<String>,
    pub zona: u8,
    pub dias_semana: Vec<Weekday>,
    #[serde(alias = "hora")]
    pub hora_inicio: String,
    #[serde(alias = "duracionMinutos")]
    pub duracion_min: u16,
    #[serde(default = "default_true")]
    pub activa: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i32>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<OffsetDateTime>,
}

impl Agenda {
    /// Check the record against the backend's constraints. Returns
    /// `ApiError::Invalid` describing every violation found.
    pub fn validate(&self) -> ApiResult<()> {
        let mut errors: Vec<String> = Vec::new();

        if !(1..=MAX_ZONE).contains(&self.zona) {
            errors.push(format!("zona {} out of range [1, {MAX_ZONE}]", self.zona));
        }
        if self.dias_semana.is_empty() {
            errors.push("diasSemana is empty".to_string());
        }
        if !is_clock_time(&self.hora_inicio) {
            errors.push(format!(
                "horaInicio '{}' is not a HH:MM time",
                self.hora_inicio
            ));
        }
        if !(1..=MAX_AGENDA_MINUTES).contains(&self.duracion_min) {
            errors.push(format!(
                "duracionMin {} out of range [1, {MAX_AGENDA_MINUTES}]",
                self.duracion_min
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Invalid(errors.join("; ")))
        }
    }
}

fn is_clock_time(s: &str) -> bool {
    s.len() == 5 && time::Time::parse(s, format_description!("[hour]:[minute]")).is_ok()
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IrrigationEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub zona: Option<u8>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default)]
    pub duracion_seg: Option<u32>,
    #[serde(default)]
    pub origen: Option<String>,
    #[serde(default)]
    pub version_agenda: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumidityReading {
    #[serde(default)]
    pub zona: Option<u8>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub humedad: f64,
}

/// Optional query parameters for the history endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zona: Option<u8>,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub desde: Option<OffsetDateTime>,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub hasta: Option<OffsetDateTime>,
}

// ===========================================================================
// Tests
// ===========================================================================
