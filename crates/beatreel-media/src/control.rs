//! Run cancellation and bounded waits.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::{MediaError, MediaResult, Stage};

/// Create a linked cancel handle and run control.
pub fn cancel_pair() -> (CancelHandle, RunControl) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, RunControl { rx })
}

/// Caller side: requests cancellation of a run.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Pipeline side: observed by every wait in a run.
#[derive(Clone, Debug)]
pub struct RunControl {
    rx: watch::Receiver<bool>,
}

impl RunControl {
    /// A control that is never cancelled.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Fail with `Cancelled` if cancellation was requested.
    pub fn check(&self) -> MediaResult<()> {
        if self.is_cancelled() {
            Err(MediaError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Receiver handed to [`FfmpegRunner::with_cancel`](crate::command::FfmpegRunner::with_cancel).
    pub fn receiver(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }

    /// Resolves once cancellation is requested. Never resolves when the
    /// handle is gone without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Run `fut` bounded by `limit` and by cancellation.
    pub async fn guard<F, T>(&self, stage: Stage, limit: Option<Duration>, fut: F) -> MediaResult<T>
    where
        F: Future<Output = MediaResult<T>>,
    {
        self.check()?;
        let deadline = async {
            match limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            result = fut => result,
            _ = self.cancelled() => Err(MediaError::Cancelled),
            _ = deadline => Err(MediaError::timeout(stage, limit.unwrap_or_default())),
        }
    }

    /// Cancellable sleep.
    pub async fn sleep(&self, duration: Duration) -> MediaResult<()> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.cancelled() => Err(MediaError::Cancelled),
        }
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::never()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_passes_result_through() {
        let control = RunControl::never();
        let value = control
            .guard(Stage::Trim, Some(Duration::from_secs(1)), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_guard_times_out() {
        let control = RunControl::never();
        let result: MediaResult<()> = control
            .guard(Stage::Merge, Some(Duration::from_millis(10)), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(
            result,
            Err(MediaError::Timeout {
                stage: Stage::Merge,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_wait() {
        let (handle, control) = cancel_pair();
        let waiter = tokio::spawn(async move {
            control
                .guard(Stage::Concat, None, async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(())
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(MediaError::Cancelled)));
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_check_after_cancel() {
        let (handle, control) = cancel_pair();
        assert!(control.check().is_ok());
        handle.cancel();
        assert!(matches!(control.check(), Err(MediaError::Cancelled)));
        assert!(control.sleep(Duration::from_secs(10)).await.is_err());
    }
}
