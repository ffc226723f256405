use crate::{Tasks, service_state::ServiceState, statsd::StatsdClient};
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::info;

pub mod dd_service_state_reporter;

pub fn spawn(
    state: watch::Receiver<Arc<ServiceState>>,
    statsd_client: impl StatsdClient,
    report_interval: Duration,
) -> Tasks {
    info!("starting reporter tasks");

    vec![dd_service_state_reporter::spawn(
        state,
        statsd_client,
        report_interval,
    )]
}
