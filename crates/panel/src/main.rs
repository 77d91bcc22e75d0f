use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use irrigation_api::{Agenda, HistoryFilter, HttpApi, IrrigationApi, Weekday, ZoneConfigUpsert};
use serde_json::json;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use irrigation_panel::config::{self, DEFAULT_CONFIG_PATH};
use irrigation_panel::{render, Panel};

#[derive(Parser)]
#[command(name = "irrigation-panel", version, about = "Monitor and control irrigation zones")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, env = "PANEL_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Controller node to act on (overrides the configured default)
    #[arg(long, global = true)]
    node: Option<String>,

    /// Print JSON instead of tables where supported
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered controller nodes
    Nodes,
    /// Check that the backend is reachable
    Health,
    /// Show live zone status
    Status,
    /// Refresh the zone status until Ctrl-C
    Watch,
    /// Start manual watering
    Start {
        zone: u8,
        minutes: u32,
    },
    /// Stop watering
    Stop {
        zone: u8,
    },
    /// Zone configuration
    Zones {
        #[command(subcommand)]
        command: ZoneCommands,
    },
    /// Watering schedules
    Agendas {
        #[command(subcommand)]
        command: AgendaCommands,
    },
    /// Past watering events and humidity readings
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
}

#[derive(Subcommand)]
enum ZoneCommands {
    /// List zone configurations, sorted by display order
    List {
        /// Only enabled zones
        #[arg(long)]
        enabled: bool,
    },
    /// Show one zone's configuration
    Show { zone: u8 },
    /// Create or replace a zone's configuration
    Set {
        zone: u8,
        name: String,
        #[arg(long)]
        disabled: bool,
        /// Display order (defaults to the zone number)
        #[arg(long)]
        order: Option<i32>,
        #[arg(long)]
        icon: Option<String>,
    },
    /// Change a zone's display name
    Rename { zone: u8, name: String },
    /// Enable or disable a zone
    Toggle { zone: u8 },
    /// Disable a zone (its configuration is kept)
    Delete { zone: u8 },
    /// Set the display order, first zone first
    Reorder {
        #[arg(required = true)]
        zones: Vec<u8>,
    },
}

#[derive(Subcommand)]
enum AgendaCommands {
    /// List schedules
    List,
    /// Create a schedule
    Add {
        #[arg(long)]
        zone: u8,
        /// Comma-separated weekday codes, e.g. LUN,MIE,VIE
        #[arg(long, value_delimiter = ',', required = true)]
        days: Vec<Weekday>,
        /// Start time, HH:MM
        #[arg(long)]
        start: String,
        #[arg(long)]
        minutes: u16,
        #[arg(long)]
        name: Option<String>,
        /// Create the schedule switched off
        #[arg(long)]
        inactive: bool,
    },
    /// Change fields of an existing schedule
    Edit {
        id: String,
        #[arg(long)]
        zone: Option<u8>,
        #[arg(long, value_delimiter = ',')]
        days: Vec<Weekday>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        minutes: Option<u16>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        active: Option<bool>,
    },
    /// Delete a schedule
    Delete { id: String },
    /// Switch a schedule on or off
    Toggle { id: String },
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// Watering events
    Events(HistoryArgs),
    /// Soil humidity readings
    Humidity(HistoryArgs),
}

#[derive(clap::Args)]
struct HistoryArgs {
    #[arg(long)]
    zone: Option<u8>,
    /// RFC 3339 timestamp
    #[arg(long, value_parser = parse_timestamp)]
    since: Option<OffsetDateTime>,
    /// RFC 3339 timestamp
    #[arg(long, value_parser = parse_timestamp)]
    until: Option<OffsetDateTime>,
}

impl HistoryArgs {
    fn filter(&self) -> HistoryFilter {
        HistoryFilter {
            zona: self.zone,
            desde: self.since,
            hasta: self.until,
        }
    }
}

fn parse_timestamp(s: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(s, &Rfc3339).map_err(|e| format!("not an RFC 3339 timestamp: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging (stderr, stdout stays for command output) ───────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // ── Config ──────────────────────────────────────────────────────
    let cfg = config::load(&cli.config, cli.node.as_deref())?;
    let api = HttpApi::new(&cfg.api.base_url, cfg.credentials())
        .context("failed to create API client")?;
    info!(base_url = api.base_url(), node = %cfg.panel.default_node_id, "panel ready");

    let api = Arc::new(api);
    let panel = Panel::new(Arc::clone(&api), &cfg.panel.default_node_id);

    match cli.command {
        Commands::Nodes => {
            let nodes = api.list_nodes().await.context("failed to list nodes")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&nodes)?);
            } else {
                print!("{}", render::node_table(&nodes));
            }
        }
        Commands::Health => {
            api.health().await.context("backend health check failed")?;
            println!("ok");
        }
        Commands::Status => {
            load_names(&panel).await;
            panel.zones.fetch_status().await;
            print_status(&panel, cli.json).await?;
        }
        Commands::Watch => watch(&panel, cfg.poll_interval()).await?,
        Commands::Start { zone, minutes } => {
            load_names(&panel).await;
            panel.zones.fetch_status().await;
            panel
                .zones
                .start_watering(zone, minutes)
                .await
                .with_context(|| format!("failed to start zone {zone}"))?;
            print_status(&panel, cli.json).await?;
        }
        Commands::Stop { zone } => {
            load_names(&panel).await;
            panel.zones.fetch_status().await;
            panel
                .zones
                .stop_watering(zone)
                .await
                .with_context(|| format!("failed to stop zone {zone}"))?;
            print_status(&panel, cli.json).await?;
        }
        Commands::Zones { command } => run_zones(&panel, command, cli.json).await?,
        Commands::Agendas { command } => run_agendas(&panel, command, cli.json).await?,
        Commands::History { command } => {
            let node = panel.zones.node_id().await;
            match command {
                HistoryCommands::Events(args) => {
                    let events = api
                        .list_events(&node, &args.filter())
                        .await
                        .context("failed to load events")?;
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&events)?);
                    } else {
                        print!("{}", render::event_table(&events));
                    }
                }
                HistoryCommands::Humidity(args) => {
                    let readings = api
                        .list_humidity(&node, &args.filter())
                        .await
                        .context("failed to load humidity readings")?;
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&readings)?);
                    } else {
                        print!("{}", render::humidity_table(&readings));
                    }
                }
            }
        }
    }

    Ok(())
}

/// Zone names for the tables. Failure is not fatal: the generated names
/// are used instead.
async fn load_names<A: IrrigationApi>(panel: &Panel<A>) {
    if let Err(e) = panel.configs.fetch_configs(false).await {
        warn!(error = %e, "zone names unavailable, using defaults");
    }
}

async fn print_status<A: IrrigationApi>(panel: &Panel<A>, as_json: bool) -> Result<()> {
    let status = panel.zones.snapshot().await;
    let names = panel.configs.snapshot().await;

    if !status.connected {
        warn!(
            error = status.status.error.as_deref().unwrap_or("-"),
            "backend unreachable, zone data may be placeholder"
        );
    }

    if as_json {
        let zones: Vec<_> = status
            .zones
            .iter()
            .map(|z| {
                json!({
                    "zona": z.id(),
                    "nombre": names.zone_name(z.id()),
                    "activa": z.active(),
                    "tiempoRestanteMin": z.remaining_time(),
                    "progreso": z.progress(),
                    "proximoRiego": z.next_schedule(),
                })
            })
            .collect();
        let out = json!({
            "nodeId": status.node_id,
            "connected": status.connected,
            "zonas": zones,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print!("{}", render::zone_table(&status, &names));
    }
    Ok(())
}

async fn watch<A: IrrigationApi>(panel: &Panel<A>, every: std::time::Duration) -> Result<()> {
    load_names(panel).await;

    let mut ticker = tokio::time::interval(every);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!(every_sec = every.as_secs(), "watching zone status (Ctrl-C to stop)");
    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                res.context("failed to listen for Ctrl-C")?;
                info!("watch stopped");
                return Ok(());
            }
            _ = ticker.tick() => {
                panel.zones.fetch_status().await;
                // clear screen, cursor home
                print!("\x1b[2J\x1b[H");
                print_status(panel, false).await?;
            }
        }
    }
}

async fn run_zones<A: IrrigationApi>(
    panel: &Panel<A>,
    command: ZoneCommands,
    as_json: bool,
) -> Result<()> {
    let store = &panel.configs;
    match command {
        ZoneCommands::List { enabled } => {
            store
                .fetch_configs(enabled)
                .await
                .context("failed to load zone configuration")?;
            let st = store.snapshot().await;
            if as_json {
                println!("{}", serde_json::to_string_pretty(&st.configs)?);
            } else {
                print!("{}", render::config_table(&st));
            }
        }
        ZoneCommands::Show { zone } => {
            let c = store
                .get_config(zone)
                .await
                .with_context(|| format!("failed to load zone {zone}"))?;
            println!("{}", serde_json::to_string_pretty(&c)?);
        }
        ZoneCommands::Set {
            zone,
            name,
            disabled,
            order,
            icon,
        } => {
            let saved = store
                .upsert_config(ZoneConfigUpsert {
                    node_id: String::new(),
                    zona: zone,
                    nombre: name,
                    habilitada: !disabled,
                    icono: icon,
                    orden: order.unwrap_or(i32::from(zone)),
                })
                .await
                .with_context(|| format!("failed to save zone {zone}"))?;
            println!("zone {} saved as '{}'", saved.zona, saved.nombre);
        }
        ZoneCommands::Rename { zone, name } => {
            store
                .rename(zone, &name)
                .await
                .with_context(|| format!("failed to rename zone {zone}"))?;
            println!("zone {zone} renamed to '{name}'");
        }
        ZoneCommands::Toggle { zone } => {
            let saved = store
                .toggle_enabled(zone)
                .await
                .with_context(|| format!("failed to toggle zone {zone}"))?;
            let state = if saved.habilitada { "enabled" } else { "disabled" };
            println!("zone {zone} {state}");
        }
        ZoneCommands::Delete { zone } => {
            store
                .delete_config(zone)
                .await
                .with_context(|| format!("failed to delete zone {zone}"))?;
            println!("zone {zone} disabled");
        }
        ZoneCommands::Reorder { zones } => {
            store
                .reorder(&zones)
                .await
                .context("failed to reorder zones")?;
            print!("{}", render::config_table(&store.snapshot().await));
        }
    }
    Ok(())
}

/// Current copy of agenda `id`, from a fresh fetch.
async fn find_agenda<A: IrrigationApi>(panel: &Panel<A>, id: &str) -> Result<Agenda> {
    panel.schedules.fetch_agendas().await;
    let st = panel.schedules.snapshot().await;
    if let Some(e) = &st.status.error {
        bail!("failed to load agendas: {e}");
    }
    match st.agenda(id) {
        Some(a) => Ok(a.clone()),
        None => bail!("agenda {id} not found"),
    }
}

async fn run_agendas<A: IrrigationApi>(
    panel: &Panel<A>,
    command: AgendaCommands,
    as_json: bool,
) -> Result<()> {
    let store = &panel.schedules;
    match command {
        AgendaCommands::List => {
            load_names(panel).await;
            store.fetch_agendas().await;
            let st = store.snapshot().await;
            if let Some(e) = &st.status.error {
                warn!(error = %e, "agendas unavailable, showing placeholder data");
            }
            if as_json {
                println!("{}", serde_json::to_string_pretty(&st.agendas)?);
            } else {
                let names = panel.configs.snapshot().await;
                print!("{}", render::agenda_table(&st.agendas, &names));
            }
        }
        AgendaCommands::Add {
            zone,
            days,
            start,
            minutes,
            name,
            inactive,
        } => {
            let saved = store
                .create_agenda(Agenda {
                    id: None,
                    node_id: None,
                    nombre: name,
                    zona: zone,
                    dias_semana: days,
                    hora_inicio: start,
                    duracion_min: minutes,
                    activa: !inactive,
                    version: None,
                    updated_at: None,
                })
                .await
                .context("failed to create agenda")?;
            println!("agenda {} created", saved.id.as_deref().unwrap_or("-"));
        }
        AgendaCommands::Edit {
            id,
            zone,
            days,
            start,
            minutes,
            name,
            active,
        } => {
            let mut a = find_agenda(panel, &id).await?;
            if let Some(zone) = zone {
                a.zona = zone;
            }
            if !days.is_empty() {
                a.dias_semana = days;
            }
            if let Some(start) = start {
                a.hora_inicio = start;
            }
            if let Some(minutes) = minutes {
                a.duracion_min = minutes;
            }
            if name.is_some() {
                a.nombre = name;
            }
            if let Some(active) = active {
                a.activa = active;
            }
            a.version = None;
            a.updated_at = None;

            store
                .update_agenda(&id, a)
                .await
                .with_context(|| format!("failed to update agenda {id}"))?;
            println!("agenda {id} updated");
        }
        AgendaCommands::Delete { id } => {
            store
                .delete_agenda(&id)
                .await
                .with_context(|| format!("failed to delete agenda {id}"))?;
            println!("agenda {id} deleted");
        }
        AgendaCommands::Toggle { id } => {
            let a = find_agenda(panel, &id).await?;
            let saved = store
                .toggle_agenda(&a)
                .await
                .with_context(|| format!("failed to toggle agenda {id}"))?;
            let state = if saved.activa { "on" } else { "off" };
            println!("agenda {id} switched {state}");
        }
    }
    Ok(())
}
