//! Rate limited cell info queries with fallback to the last known list.

use crate::modem::{CellInfo, ChannelError};
use std::time::Duration;
use tokio::{sync::oneshot, time::Instant};
use tracing::{debug, warn};

type Reply = oneshot::Sender<Vec<CellInfo>>;

#[derive(Debug, Default)]
pub struct CellInfoCache {
    last: Vec<CellInfo>,
    last_updated: Option<Instant>,
    waiting: Vec<Reply>,
    next_request: u64,
    in_flight: Option<u64>,
}

impl CellInfoCache {
    fn is_fresh(&self, now: Instant, min_interval: Duration) -> bool {
        self.last_updated
            .is_some_and(|at| now.saturating_duration_since(at) < min_interval)
    }

    /// Answers from cache when fresh. Otherwise queues `reply` and returns the id of a
    /// new modem query to issue, unless one is already in flight.
    pub fn request(&mut self, reply: Reply, now: Instant, min_interval: Duration) -> Option<u64> {
        if self.is_fresh(now, min_interval) {
            let _ = reply.send(self.last.clone());
            return None;
        }

        self.waiting.push(reply);
        if self.in_flight.is_some() {
            return None;
        }

        self.next_request += 1;
        self.in_flight = Some(self.next_request);

        Some(self.next_request)
    }

    pub fn on_result(
        &mut self,
        request: u64,
        result: Result<Vec<CellInfo>, ChannelError>,
        now: Instant,
    ) {
        if self.in_flight != Some(request) {
            debug!(request, "dropping late cell info result");
            return;
        }

        match result {
            Ok(list) => {
                self.last = list;
                self.last_updated = Some(now);
            }
            Err(e) => warn!("cell info query failed, serving last known list: {e}"),
        }

        self.answer_waiting();
    }

    pub fn on_timeout(&mut self, request: u64) {
        if self.in_flight != Some(request) {
            return;
        }

        warn!(request, "cell info query timed out, serving last known list");
        self.answer_waiting();
    }

    fn answer_waiting(&mut self) {
        self.in_flight = None;
        for reply in self.waiting.drain(..) {
            let _ = reply.send(self.last.clone());
        }
    }
}
