//! Polls the modem for the radio state, since `mmcli` delivers no unsolicited
//! notifications.

use crate::{
    modem::{ModemChannel, RadioState},
    tracker::{Event, TrackerHandle},
};
use color_eyre::Result;
use std::{sync::Arc, time::Duration};
use tokio::{
    task::{self, JoinHandle},
    time,
};
use tracing::{error, info, warn};

pub fn spawn(
    channel: Arc<dyn ModemChannel>,
    tracker: TrackerHandle,
    poll_interval: Duration,
) -> JoinHandle<Result<()>> {
    info!("starting modem monitor");

    task::spawn(async move {
        let mut last = None;

        loop {
            if let Err(e) = tick(channel.as_ref(), &tracker, &mut last).await {
                error!("modem monitor: {e}");
            }

            time::sleep(poll_interval).await;
        }
    })
}

async fn tick(
    channel: &dyn ModemChannel,
    tracker: &TrackerHandle,
    last: &mut Option<RadioState>,
) -> Result<()> {
    match channel.radio_state().await {
        Ok(radio) if Some(radio) != *last => {
            *last = Some(radio);
            // a radio state change starts a poll on its own
            return tracker.send(Event::RadioStateChanged(radio));
        }
        Ok(_) => {}
        Err(e) => warn!("could not read radio state: {e}"),
    }

    tracker.send(Event::NetworkStateChanged)
}
