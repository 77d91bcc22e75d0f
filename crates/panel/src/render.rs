//! Plain-text tables for the command-line front-end.

use irrigation_api::{Agenda, HumidityReading, IrrigationEvent, NodeInfo};
use std::fmt::Write;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::zone_config::ZoneConfigState;
use crate::zones::ZoneStatusState;

const BAR_WIDTH: usize = 10;

/// `[#####-----]` for a 0..=100 percentage.
pub fn progress_bar(percent: f64) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * BAR_WIDTH as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

fn timestamp(t: &OffsetDateTime) -> String {
    t.format(&Rfc3339).unwrap_or_else(|_| t.to_string())
}

fn opt<T: ToString>(v: Option<T>) -> String {
    v.map_or_else(|| "-".to_string(), |v| v.to_string())
}

pub fn node_table(nodes: &[NodeInfo]) -> String {
    let mut out = format!("{:<20} {}\n", "NODE", "NAME");
    for n in nodes {
        let _ = writeln!(out, "{:<20} {}", n.node_id, opt(n.nombre.as_deref()));
    }
    out
}

/// Live zone table. Names come from the configuration store so renamed
/// zones show their configured names.
pub fn zone_table(status: &ZoneStatusState, names: &ZoneConfigState) -> String {
    let mut out = format!(
        "{:<5} {:<24} {:<7} {:<9} {:<17} {}\n",
        "ZONE", "NAME", "STATE", "LEFT", "PROGRESS", "NEXT"
    );
    for z in &status.zones {
        let state = if z.active() { "ON" } else { "off" };
        let _ = writeln!(
            out,
            "{:<5} {:<24} {:<7} {:<9} {} {:>4.0}%  {}",
            z.id(),
            names.zone_name(z.id()),
            state,
            z.remaining_label(),
            progress_bar(z.progress()),
            z.progress(),
            z.next_schedule().unwrap_or("-"),
        );
    }
    out
}

pub fn config_table(configs: &ZoneConfigState) -> String {
    let mut out = format!(
        "{:<5} {:<24} {:<8} {:<6} {:<10} {}\n",
        "ZONE", "NAME", "ENABLED", "ORDER", "ICON", "UPDATED"
    );
    for c in &configs.configs {
        let _ = writeln!(
            out,
            "{:<5} {:<24} {:<8} {:<6} {:<10} {}",
            c.zona,
            c.nombre,
            if c.habilitada { "yes" } else { "no" },
            c.orden,
            opt(c.icono.as_deref()),
            opt(c.updated_at.as_ref().map(timestamp)),
        );
    }
    out
}

pub fn agenda_table(agendas: &[Agenda], names: &ZoneConfigState) -> String {
    let mut out = format!(
        "{:<8} {:<24} {:<20} {:<6} {:<5} {:<27} {}\n",
        "ID", "NAME", "ZONE", "START", "MIN", "DAYS", "ACTIVE"
    );
    for a in agendas {
        let days: Vec<&str> = a.dias_semana.iter().map(|d| d.code()).collect();
        let _ = writeln!(
            out,
            "{:<8} {:<24} {:<20} {:<6} {:<5} {:<27} {}",
            opt(a.id.as_deref()),
            opt(a.nombre.as_deref()),
            format!("{} {}", a.zona, names.zone_name(a.zona)),
            a.hora_inicio,
            a.duracion_min,
            days.join(","),
            if a.activa { "yes" } else { "no" },
        );
    }
    out
}

pub fn event_table(events: &[IrrigationEvent]) -> String {
    let mut out = format!(
        "{:<26} {:<5} {:<9} {:<10} {}\n",
        "TIME", "ZONE", "SECONDS", "SOURCE", "AGENDA VERSION"
    );
    for e in events {
        let _ = writeln!(
            out,
            "{:<26} {:<5} {:<9} {:<10} {}",
            timestamp(&e.timestamp),
            opt(e.zona),
            opt(e.duracion_seg),
            opt(e.origen.as_deref()),
            opt(e.version_agenda),
        );
    }
    out
}

pub fn humidity_table(readings: &[HumidityReading]) -> String {
    let mut out = format!("{:<26} {:<5} {}\n", "TIME", "ZONE", "HUMIDITY");
    for r in readings {
        let _ = writeln!(
            out,
            "{:<26} {:<5} {:.1}%",
            timestamp(&r.timestamp),
            opt(r.zona),
            r.humedad
        );
    }
    out
}

// ===========================================================================
// Tests
// ===========================================================================
