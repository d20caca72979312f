//! Cosmetic progress text while a frame is being analyzed
//!
//! A ticker publishes one scripted message per interval into the session
//! status. It lives exactly as long as the processing stage: the session
//! cancels it on exit, and dropping it cancels it too.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::types::SessionStatus;

/// Default script shown while waiting for the verdict
pub fn default_script() -> Vec<String> {
    [
        "正在接入生物神经网络...",
        "解析微表情数据...",
        "比对宇宙失败者数据库...",
        "检测到异常脑电波...",
        "生成最终审判报告...",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Running progress ticker
#[derive(Debug)]
pub struct ProgressTicker {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ProgressTicker {
    /// Start publishing `script` into `status`, one line per `every`.
    /// The first line appears after one interval. Once the script runs out
    /// the last line stays until cancellation.
    pub fn start(
        script: Vec<String>,
        every: Duration,
        status: Arc<watch::Sender<SessionStatus>>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + every, every);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            for line in script {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = ticks.tick() => {
                        debug!(text = %line, "progress");
                        status.send_modify(|s| s.loading_message = Some(line));
                    }
                }
            }

            token.cancelled().await;
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Whether the ticker task is still alive
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Stop the ticker and wait for its task to exit. No update is
    /// published after this returns.
    pub async fn cancel(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
