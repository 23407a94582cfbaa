use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, error, info};

use crate::session::CampingSession;

/// Background task that sweeps a session on a fixed interval.
///
/// Sweeps run one after another inside a single task; a sweep that overruns the
/// interval makes the ticker skip the missed ticks rather than bunch them up.
/// [`SessionTicker::stop`] lets a running sweep finish before the loop exits.
pub struct SessionTicker {
    session: Arc<CampingSession>,
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl SessionTicker {
    /// Spawns the sweep loop. The first sweep runs immediately.
    pub fn start(session: Arc<CampingSession>) -> Self {
        let tick_interval = session.config().tick_interval;
        let refresh_interval = session.config().catalog_refresh_interval;
        info!(
            "Starting session ticker (every {:?}, catalog refresh every {:?})",
            tick_interval, refresh_interval
        );

        let (shutdown, mut stopped) = watch::channel(false);
        let task_session = session.clone();
        let handle = tokio::spawn(async move {
            let mut ticks = interval(tick_interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last_refresh = Instant::now();

            loop {
                tokio::select! {
                    _ = ticks.tick() => {}
                    _ = stopped.changed() => break,
                }

                if last_refresh.elapsed() >= refresh_interval {
                    last_refresh = Instant::now();
                    if let Err(e) = task_session.refresh_catalog().await {
                        error!("Catalog refresh failed, keeping cached catalog: {}", e);
                    }
                }

                let report = task_session.tick_now().await;
                if !report.due.is_empty() || report.rearmed > 0 {
                    info!(
                        "Sweep fired {} alerts, re-armed {}",
                        report.due.len(),
                        report.rearmed
                    );
                } else {
                    debug!("Sweep finished with nothing due");
                }
                for failure in &report.dispatch_failures {
                    error!(
                        "Alert {} was not delivered: {}",
                        failure.notification_id, failure.error
                    );
                }
            }
            debug!("Session ticker loop exited");
        });

        Self {
            session,
            shutdown,
            handle: Some(handle),
        }
    }

    /// The session being swept.
    pub fn session(&self) -> &Arc<CampingSession> {
        &self.session
    }

    /// Whether the sweep loop is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Stops the sweep loop, waiting for a sweep in progress to complete.
    pub async fn stop(&mut self) {
        info!("Stopping session ticker");

        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("Session ticker task failed: {}", e);
            }
        }
    }
}

impl Drop for SessionTicker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
