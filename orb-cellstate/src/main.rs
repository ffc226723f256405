use clap::{
    Parser,
    builder::{Styles, styling::AnsiColor},
};
use color_eyre::eyre::{Result, WrapErr as _};
use orb_cellstate::{
    config::{self, CarrierConfig, Settings},
    modem::cli::MmcliChannel,
    sim::SimRecords,
    statsd::dd::DogstatsdClient,
    telemetry::TelemetryConfig,
    utils::retry_for,
};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::signal::unix::{self, SignalKind};
use tracing::{debug, info, warn};

const SYSLOG_IDENTIFIER: &str = "worldcoin-cellstate";

/// Tracks cellular registration, roaming and radio power.
#[derive(Parser, Debug)]
#[clap(version, about, styles = clap_v3_styles())]
struct Cli {
    /// ModemManager modem id. Discovered with `mmcli -L` when not set.
    #[arg(long, env = "ORB_CELLSTATE_MODEM_ID")]
    modem_id: Option<String>,

    /// Subscription id, used to keep persisted state apart.
    #[arg(long, env = "ORB_CELLSTATE_SUB_ID", default_value_t = 0)]
    subscription_id: u32,

    #[arg(long, env = "ORB_CELLSTATE_STATE_DIR", default_value = "/var/lib/orb-cellstate")]
    state_dir: PathBuf,

    /// Carrier configuration JSON.
    #[arg(long, env = "ORB_CELLSTATE_CARRIER_CONFIG")]
    carrier_config: Option<PathBuf>,

    /// SIM records JSON.
    #[arg(long, env = "ORB_CELLSTATE_SIM_RECORDS")]
    sim_records: Option<PathBuf>,

    /// Seconds between modem polls.
    #[arg(long, default_value_t = 20)]
    poll_interval: u64,

    /// Seconds to wait for data teardown before forcing the radio off.
    #[arg(long, default_value_t = 30)]
    power_off_timeout: u64,

    #[arg(long, default_value_t = 2000)]
    cell_info_min_interval_ms: u64,

    #[arg(long, default_value_t = 2000)]
    cell_info_timeout_ms: u64,

    /// The device can register over IWLAN.
    #[arg(long)]
    iwlan: bool,
}

fn clap_v3_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Green.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let tel_flusher = TelemetryConfig::new()
        .with_journald(SYSLOG_IDENTIFIER)
        .init();

    let cli = Cli::parse();
    debug!(?cli, "starting");

    let result = run(cli).await;

    tel_flusher.flush().await;

    result
}

async fn run(cli: Cli) -> Result<()> {
    let carrier_config: CarrierConfig = match &cli.carrier_config {
        Some(path) => config::load_json(path).await?,
        None => CarrierConfig::default(),
    };

    let sim_records: SimRecords = match &cli.sim_records {
        Some(path) => config::load_json(path).await?,
        None => SimRecords::default(),
    };

    let settings = Settings::builder()
        .power_off_timeout(Duration::from_secs(cli.power_off_timeout))
        .cell_info_min_interval(Duration::from_millis(cli.cell_info_min_interval_ms))
        .cell_info_query_timeout(Duration::from_millis(cli.cell_info_timeout_ms))
        .iwlan_available(cli.iwlan)
        .build();

    let mmcli = match cli.modem_id {
        Some(id) => MmcliChannel::new(id),
        None => {
            info!("looking for a modem");
            retry_for(
                Duration::from_secs(120),
                Duration::from_secs(10),
                MmcliChannel::discover,
            )
            .await
            .wrap_err("no modem found")?
        }
    };
    info!(modem_id = mmcli.modem_id(), "using modem");
    let mmcli = Arc::new(mmcli);

    let (_tracker, tasks) = orb_cellstate::program()
        .channel(mmcli.clone())
        .data_sessions(mmcli)
        .state_dir(cli.state_dir.join(format!("sub-{}", cli.subscription_id)))
        .statsd_client(DogstatsdClient::new())
        .settings(settings)
        .carrier_config(carrier_config)
        .sim_records(sim_records)
        .monitor_interval(Duration::from_secs(cli.poll_interval))
        .run()
        .await?;

    let mut sigterm = unix::signal(SignalKind::terminate())?;
    let mut sigint = unix::signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => warn!("received SIGTERM"),
        _ = sigint.recv()  => warn!("received SIGINT"),
    }

    info!("aborting tasks and exiting gracefully");

    for handle in tasks {
        handle.abort();
    }

    Ok(())
}
