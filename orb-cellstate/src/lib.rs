use color_eyre::eyre::Result;
use config::{CarrierConfig, Settings};
use modem::{DataSessions, ModemChannel};
use persist::JsonFileSink;
use sim::SimRecords;
use statsd::StatsdClient;
use std::{path::Path, sync::Arc, time::Duration};
use tokio::task::{self, JoinHandle};
use tracing::{info, warn};
use tracker::{ServiceStateTracker, TrackerHandle};

pub mod cell_info;
pub mod config;
pub mod diff;
pub mod display;
pub mod merge;
pub mod modem;
pub mod monitor;
pub mod persist;
pub mod poll;
pub mod power;
pub mod ratchet;
pub mod registrants;
pub mod reporters;
pub mod restriction;
pub mod roaming;
pub mod service_state;
pub mod sim;
pub mod statsd;
pub mod telemetry;
pub mod tracker;
pub mod utils;

pub type Tasks = Vec<JoinHandle<Result<()>>>;

/// Wires the tracker to its collaborators and spawns it along with the modem monitor
/// and the metrics reporter.
#[bon::builder(finish_fn = run)]
pub async fn program(
    channel: Arc<dyn ModemChannel>,
    data_sessions: Arc<dyn DataSessions>,
    default_data_sessions: Option<Arc<dyn DataSessions>>,
    state_dir: impl AsRef<Path>,
    statsd_client: impl StatsdClient,
    #[builder(default)] settings: Settings,
    #[builder(default)] carrier_config: CarrierConfig,
    #[builder(default)] sim_records: SimRecords,
    #[builder(default = Duration::from_secs(20))] monitor_interval: Duration,
    #[builder(default = Duration::from_secs(20))] report_interval: Duration,
) -> Result<(TrackerHandle, Tasks)> {
    let state_dir = state_dir.as_ref().to_path_buf();

    let last_display = persist::load_display(&state_dir)
        .await
        .inspect_err(|e| warn!("ignoring persisted display state: {e:?}"))
        .ok()
        .flatten();

    let (sink, sink_task) = JsonFileSink::spawn(&state_dir);

    info!(
        iwlan = settings.iwlan_available,
        power_off_timeout_s = settings.power_off_timeout.as_secs(),
        "starting service state tracker"
    );

    let (tracker, handle) = ServiceStateTracker::builder()
        .channel(channel.clone())
        .data(data_sessions)
        .maybe_default_data(default_data_sessions)
        .sink(Arc::new(sink))
        .settings(settings)
        .config(carrier_config)
        .sim(sim_records)
        .maybe_last_display(last_display)
        .build();

    let mut tasks = vec![
        sink_task,
        task::spawn(tracker.run()),
        monitor::spawn(channel, handle.clone(), monitor_interval),
    ];

    tasks.extend(reporters::spawn(
        handle.subscribe(),
        statsd_client,
        report_interval,
    ));

    Ok((handle, tasks))
}
