use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use reqwest::Client;
use rusqlite::Connection;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use vending_dashboard::cli::{Args, Command, FieldAssignment};
use vending_dashboard::config::Config;
use vending_dashboard::net::{self, HttpUpdateService};
use vending_dashboard::report;
use vending_dashboard::simulate;
use vending_dashboard::storage;
use vending_dashboard::{DeviceSnapshot, FleetController, ShadowDecoder, SubmitError, SubmitOutcome};

const SIMULATED_UNITS: u32 = 8;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f == "json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

struct App {
    config: Config,
    client: Client,
    conn: Connection,
    decoder: ShadowDecoder,
    controller: FleetController<HttpUpdateService>,
}

impl App {
    fn new(config: Config, client: Client) -> Result<Self> {
        let conn = storage::init(&config.db_path)?;
        info!("Initialized local cache.");
        let decoder = ShadowDecoder::with_prefix(&config.unit_prefix);
        let controller = FleetController::new(
            HttpUpdateService::new(client.clone(), config.clone()),
            config.aggregator(),
        );
        Ok(App {
            config,
            client,
            conn,
            decoder,
            controller,
        })
    }

    async fn devices(&self) -> Result<Vec<String>> {
        if !self.config.devices.is_empty() {
            return Ok(self.config.devices.clone());
        }
        if self.config.simulate {
            return Ok(vec!["simulated-01".to_string()]);
        }
        let things = net::list_things(&self.client, &self.config).await?;
        Ok(things.into_iter().filter_map(|t| t.thing_name).collect())
    }

    /// Fetches and decodes a device's shadow. Only bodies that decode are
    /// cached. With `allow_cached`, a failed fetch or an undecodable body
    /// falls back to the last cached shadow; editing never passes it.
    async fn load(&self, device: &str, allow_cached: bool) -> Result<DeviceSnapshot> {
        let fetched = if self.config.simulate {
            Ok(simulate::generate_shadow(SIMULATED_UNITS, &self.config.unit_prefix).to_string())
        } else {
            net::fetch_shadow(&self.client, &self.config, device).await
        };

        let live_error = match fetched {
            Ok(body) => match self.decoder.decode_str(device, &body) {
                Ok(snapshot) => {
                    storage::record_snapshot(&self.conn, device, Utc::now(), &body)?;
                    storage::prune_snapshots(&self.conn, device, self.config.snapshot_retention)?;
                    self.controller.load(snapshot.clone());
                    return Ok(snapshot);
                }
                Err(e) => anyhow::Error::new(e),
            },
            Err(e) => e,
        };

        if !allow_cached {
            return Err(live_error.context(format!("live shadow for {device} is unavailable")));
        }
        let cached = storage::latest_snapshot(&self.conn, device)?
            .with_context(|| format!("no usable shadow for {device} and nothing is cached: {live_error}"))?;
        warn!(device, error = %live_error, cached_at = %cached.fetched_at, "Using cached shadow.");

        let (snapshot, issue) = self.decoder.decode_or_empty(device, &cached.body);
        if let Some(issue) = issue {
            warn!(device, error = %issue, "Cached shadow could not be decoded.");
        }
        self.controller.load(snapshot.clone());
        Ok(snapshot)
    }

    async fn refresh_fleet(&self) -> Result<()> {
        for device in self.devices().await? {
            if let Err(e) = self.refresh_device(&device).await {
                error!(device = %device, error = %e, "Failed to refresh device");
            }
        }
        Ok(())
    }

    async fn refresh_device(&self, device: &str) -> Result<()> {
        let snapshot = self.load(device, true).await?;
        let Some(metrics) = self.controller.metrics(device) else {
            return Ok(());
        };
        info!(
            device,
            units = metrics.units.len(),
            enabled = metrics.enabled_units,
            sales_total = %report::format_thousands(metrics.sales_total),
            transactions = metrics.transaction_count,
            balance = snapshot.general().and_then(|g| g.balance.as_deref()),
            "Machine state"
        );
        for unit in metrics.warning_units() {
            warn!(device, unit = %unit.key, sales = unit.sale_count, threshold = unit.warning_threshold, "Unit reached warning threshold");
        }

        if let Some(dir) = &self.config.report_dir {
            let rows = report::rows(&snapshot, &self.config.aggregator());
            if !rows.is_empty() {
                report::write_report(dir, Some(device), Utc::now().date_naive(), &rows)?;
            }
        }
        Ok(())
    }

    async fn monitor(&self) -> Result<()> {
        let mut refresh_interval = time::interval(Duration::from_secs(self.config.refresh_interval_secs.max(1)));
        loop {
            tokio::select! {
                _ = refresh_interval.tick() => {
                    if let Err(e) = self.refresh_fleet().await {
                        error!("Fleet refresh failed: {}", e);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down.");
                    return Ok(());
                }
            }
        }
    }

    async fn set(&self, device: &str, edits: &[FieldAssignment]) -> Result<()> {
        self.load(device, false).await?;
        self.controller.begin_edit(device)?;
        for edit in edits {
            if let Err(e) = self.controller.set_field(device, &edit.unit, &edit.field, &edit.value) {
                self.controller.cancel(device)?;
                return Err(e.into());
            }
        }

        match self.controller.submit(device).await {
            Ok(SubmitOutcome::NoChanges) => info!(device, "Nothing changed, no patch sent."),
            Ok(SubmitOutcome::Dispatched(patch)) => {
                storage::record_dispatch(&self.conn, device, &patch, None)?;
                info!(device, patch = %serde_json::to_string(&patch)?, "Patch applied.");
            }
            Err(SubmitError::Dispatch { device, patch, source }) => {
                storage::record_dispatch(&self.conn, &device, &patch, Some(&source.to_string()))?;
                anyhow::bail!("update for {device} failed: {source}");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    async fn report(&self, device: &str) -> Result<()> {
        let snapshot = self.load(device, true).await?;
        let rows = report::rows(&snapshot, &self.config.aggregator());
        let dir = self.config.report_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        let path = report::write_report(&dir, Some(device), Utc::now().date_naive(), &rows)?;
        println!("{}", path.display());
        Ok(())
    }

    fn history(&self, device: &str, limit: u32) -> Result<()> {
        for record in storage::recent_dispatches(&self.conn, device, limit)? {
            println!(
                "{} {} {} {}",
                record.sent_at.to_rfc3339(),
                record.id,
                if record.succeeded() { "ok" } else { "failed" },
                serde_json::to_string(&record.patch)?
            );
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = Config::load()?;
    info!("Dashboard starting with config: {:?}", config);
    let app = App::new(config, Client::new())?;

    match args.command.unwrap_or(Command::Monitor) {
        Command::Monitor => app.monitor().await,
        Command::Things => {
            for thing in net::list_things(&app.client, &app.config).await? {
                println!(
                    "{}\t{}",
                    thing.thing_name.unwrap_or_default(),
                    thing.thing_type_name.unwrap_or_default()
                );
            }
            Ok(())
        }
        Command::Set { device, edits } => app.set(&device, &edits).await,
        Command::Refresh { device } => net::request_refresh(&app.client, &app.config, &device).await,
        Command::Report { device } => app.report(&device).await,
        Command::History { device, limit } => app.history(&device, limit),
    }
}
