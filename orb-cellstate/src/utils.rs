use color_eyre::{Result, eyre::eyre};
use std::time::Duration;
use tokio::{
    process::Command,
    time::{self, Instant},
};

pub async fn run_cmd(cmd: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(cmd).args(args).output().await?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let err = String::from_utf8_lossy(&output.stderr);
        let args = args.join(" ");
        Err(eyre!("Failed to run {cmd} {args}. Error {err}"))
    }
}

pub async fn retry_for<F, K>(timeout: Duration, backoff: Duration, f: F) -> Result<K>
where
    F: AsyncFn() -> Result<K>,
{
    let start = Instant::now();

    loop {
        match f().await {
            Err(e) => {
                if start.elapsed() >= timeout {
                    return Err(e);
                }

                time::sleep(backoff).await;
            }

            Ok(m) => return Ok(m),
        }
    }
}

/// Posts `msg` on `tx` after `delay`. Dropped silently when the receiver is gone.
pub fn send_after<T: Send + 'static>(
    tx: tokio::sync::mpsc::UnboundedSender<T>,
    delay: Duration,
    msg: T,
) {
    tokio::spawn(async move {
        time::sleep(delay).await;
        let _ = tx.send(msg);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retry_for_gives_up_after_timeout() {
        let calls = AtomicU32::new(0);

        let res: Result<()> = retry_for(Duration::from_secs(3), Duration::from_secs(1), async || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(eyre!("nope"))
        })
        .await;

        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn send_after_delivers_once_delay_elapsed() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        send_after(tx, Duration::from_secs(30), 7u32);
        time::sleep(Duration::from_secs(29)).await;
        assert!(rx.try_recv().is_err());

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(rx.recv().await, Some(7));
    }
}
