use color_eyre::Result;
use dogstatsd::DogstatsdResult;
use flume::Sender;
use std::{thread, time::Duration};
use tokio::sync::oneshot;
use tracing::error;

use super::StatsdClient;

const CONNECT_BACKOFF: Duration = Duration::from_secs(10);

/// Dogstatsd client living on its own thread, since `dogstatsd::Client` is blocking.
pub struct DogstatsdClient {
    tx: Sender<Msg>,
}

struct Msg {
    stat: String,
    metric: Metric,
    tags: Vec<String>,
    reply: oneshot::Sender<DogstatsdResult>,
}

enum Metric {
    Count(i64),
    Gauge(String),
}

impl DogstatsdClient {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded::<Msg>();

        thread::spawn(move || {
            let client = loop {
                match dogstatsd::Client::new(dogstatsd::Options::default()) {
                    Ok(client) => break client,
                    Err(e) => {
                        error!(
                            "failed to create dd client: {e}, trying again in {}s",
                            CONNECT_BACKOFF.as_secs()
                        );
                        thread::sleep(CONNECT_BACKOFF);
                    }
                }
            };

            while let Ok(Msg {
                stat,
                metric,
                tags,
                reply,
            }) = rx.recv()
            {
                let result = match metric {
                    Metric::Count(count) => client.count(stat, count, tags),
                    Metric::Gauge(val) => client.gauge(stat, val, tags),
                };
                let _ = reply.send(result);
            }
        });

        Self { tx }
    }

    async fn send<S: AsRef<str>>(&self, stat: &str, metric: Metric, tags: &[S]) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Msg {
            stat: stat.to_string(),
            metric,
            tags: tags.iter().map(|t| t.as_ref().to_string()).collect(),
            reply,
        })?;

        Ok(rx.await??)
    }
}

impl StatsdClient for DogstatsdClient {
    async fn count<S: AsRef<str> + Sync + Send>(
        &self,
        stat: &str,
        count: i64,
        tags: &[S],
    ) -> Result<()> {
        self.send(stat, Metric::Count(count), tags).await
    }

    async fn gauge<S: AsRef<str> + Sync + Send>(
        &self,
        stat: &str,
        val: &str,
        tags: &[S],
    ) -> Result<()> {
        self.send(stat, Metric::Gauge(val.to_string()), tags).await
    }
}
