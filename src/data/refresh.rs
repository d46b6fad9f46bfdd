//! Per-widget polling loop. One task per widget; the registry cancels the old
//! task before spawning a replacement so a widget never has two concurrent
//! fetch loops.

use std::sync::mpsc::Sender;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::constants::MIN_REFRESH_INTERVAL_MS;
use crate::utils::CancellationToken;

#[cfg(debug_assertions)]
use crate::config::DF;

use super::fetch::{FetchDispatcher, FetchResult, FetchSpec};

/// Handle to a widget's recurring refresh task.
pub struct RefreshHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl RefreshHandle {
    /// Stops the loop and invalidates any fetch still in flight. The token is
    /// flipped first so a result that is already past its service call cannot
    /// commit afterwards.
    pub fn cancel(&self) {
        self.token.cancel();
        self.join.abort();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Spawns the polling loop for one widget. The first tick fires immediately,
/// which doubles as the fetch-on-mount. Results go back over the channel; a
/// closed receiver means the canvas is gone and the loop exits.
pub fn spawn_refresh_task(
    dispatcher: FetchDispatcher,
    spec: FetchSpec,
    interval_ms: u64,
    results_tx: Sender<FetchResult>,
    token: CancellationToken,
) -> RefreshHandle {
    let task_token = token.clone();

    let join = tokio::spawn(async move {
        let period = Duration::from_millis(interval_ms.max(MIN_REFRESH_INTERVAL_MS));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            if task_token.is_cancelled() {
                break;
            }

            // None means the fetch was cancelled mid-flight; nothing to send.
            let Some(result) = dispatcher.fetch(&spec, &task_token).await else {
                break;
            };
            if task_token.is_cancelled() {
                break;
            }
            if results_tx.send(result).is_err() {
                break;
            }
        }

        #[cfg(debug_assertions)]
        if DF.log_refresh {
            log::info!("refresh: task for widget {} stopped", spec.widget_id);
        }
    });

    RefreshHandle { token, join }
}
