use crate::{
    service_state::{RegState, ServiceState},
    statsd::StatsdClient,
};
use color_eyre::Result;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    task::{self, JoinHandle},
    time,
};
use tracing::{error, info};

const NO_TAGS: &[&str] = &[];

pub fn spawn(
    state: watch::Receiver<Arc<ServiceState>>,
    statsd_client: impl StatsdClient,
    report_interval: Duration,
) -> JoinHandle<Result<()>> {
    info!("starting dd service state reporter");

    task::spawn(async move {
        loop {
            let ss = state.borrow().clone();
            if let Err(e) = report(&ss, &statsd_client).await {
                error!("failed to report service state to datadog: {e}");
            }

            time::sleep(report_interval).await;
        }
    })
}

fn as_gauge(in_service: bool) -> &'static str {
    if in_service { "1" } else { "0" }
}

async fn report(ss: &ServiceState, statsd_client: &impl StatsdClient) -> Result<()> {
    statsd_client
        .gauge(
            "orb.cell.voice.in_service",
            as_gauge(ss.voice_reg_state == RegState::InService),
            NO_TAGS,
        )
        .await?;

    statsd_client
        .gauge(
            "orb.cell.data.in_service",
            as_gauge(ss.data_reg_state == RegState::InService),
            NO_TAGS,
        )
        .await?;

    statsd_client
        .gauge("orb.cell.roaming", as_gauge(ss.roaming()), NO_TAGS)
        .await?;

    if ss.combined_reg_state().is_in_service() {
        let rat = ss.data_rat();
        let tags: Vec<String> = [
            Some(format!("rat:{rat}")),
            Some(format!("generation:{}", rat.generation())),
            ss.operator.numeric.as_ref().map(|o| format!("operator:{o}")),
        ]
        .into_iter()
        .flatten()
        .collect();

        statsd_client
            .count("orb.cell.heartbeat", 1, tags.as_ref())
            .await?;
    }

    Ok(())
}
