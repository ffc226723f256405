//! Persisted copies of the committed state, for crash recovery and for other
//! processes that want to read it without talking to the tracker.

use crate::{display::DisplayTuple, service_state::ServiceState};
use chrono::{DateTime, Utc};
use color_eyre::{Result, eyre::WrapErr as _};
use flume::{Receiver, Sender};
use serde::Serialize;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::{
    fs,
    task::{self, JoinHandle},
};
use tracing::{error, info};

const SERVICE_STATE_FILE: &str = "service_state.json";
const DISPLAY_FILE: &str = "display.json";

/// Receives every committed snapshot and every published display tuple.
///
/// Called from the tracker task, so implementations must not block.
pub trait StateSink: 'static + Send + Sync {
    fn service_state(&self, ss: &ServiceState);
    fn display(&self, tuple: &DisplayTuple);
}

/// On-disk form. Readers that only want the value ignore `saved_at`.
#[derive(Serialize)]
struct Stamped<'a, T> {
    saved_at: DateTime<Utc>,
    #[serde(flatten)]
    value: &'a T,
}

enum Msg {
    ServiceState(ServiceState),
    Display(DisplayTuple),
}

/// Writes JSON files under one directory per subscription.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    tx: Sender<Msg>,
}

impl std::fmt::Debug for Msg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Msg::ServiceState(_) => f.write_str("Msg::ServiceState"),
            Msg::Display(_) => f.write_str("Msg::Display"),
        }
    }
}

impl JsonFileSink {
    /// Spawns the writer task. It exits once every clone of the sink is dropped.
    pub fn spawn(dir: impl Into<PathBuf>) -> (Self, JoinHandle<Result<()>>) {
        let dir = dir.into();
        let (tx, rx) = flume::unbounded();

        let handle = task::spawn(async move {
            fs::create_dir_all(&dir)
                .await
                .wrap_err_with(|| format!("failed to create {}", dir.display()))?;

            info!(dir = %dir.display(), "persisting service state");
            writer(dir, rx).await;

            Ok(())
        });

        (Self { tx }, handle)
    }
}

async fn writer(dir: PathBuf, rx: Receiver<Msg>) {
    while let Ok(msg) = rx.recv_async().await {
        let res = match &msg {
            Msg::ServiceState(ss) => write_atomic(&dir, SERVICE_STATE_FILE, ss).await,
            Msg::Display(tuple) => write_atomic(&dir, DISPLAY_FILE, tuple).await,
        };

        if let Err(e) = res {
            error!("failed to persist {msg:?}: {e:?}");
        }
    }
}

async fn write_atomic(dir: &Path, name: &str, value: &impl Serialize) -> Result<()> {
    let path = dir.join(name);
    let tmp = dir.join(format!(".{name}.tmp"));
    let contents = serde_json::to_vec_pretty(&Stamped {
        saved_at: Utc::now(),
        value,
    })?;

    fs::write(&tmp, contents)
        .await
        .wrap_err_with(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, &path)
        .await
        .wrap_err_with(|| format!("failed to rename to {}", path.display()))?;

    Ok(())
}

impl StateSink for JsonFileSink {
    fn service_state(&self, ss: &ServiceState) {
        let _ = self.tx.send(Msg::ServiceState(ss.clone()));
    }

    fn display(&self, tuple: &DisplayTuple) {
        let _ = self.tx.send(Msg::Display(tuple.clone()));
    }
}

/// Display tuple persisted by a previous run, if any.
pub async fn load_display(dir: impl AsRef<Path>) -> Result<Option<DisplayTuple>> {
    let path = dir.as_ref().join(DISPLAY_FILE);

    match fs::read_to_string(&path).await {
        Ok(contents) => Ok(Some(
            serde_json::from_str(&contents)
                .wrap_err_with(|| format!("failed to parse {}", path.display()))?,
        )),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).wrap_err_with(|| format!("failed to read {}", path.display())),
    }
}
