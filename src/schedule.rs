// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use anyhow::Result;
use tokio::{
    select,
    task::JoinHandle,
    time::{Instant, sleep},
};
use tokio_util::sync::CancellationToken;

use crate::{broadcast::Broadcaster, service::Notifications};

/// The recurring broadcast to all active subscriptions.
#[derive(Debug)]
pub(crate) struct Schedule {
    task: JoinHandle<()>,
    cancel: CancellationToken,
}

impl Schedule {
    pub(crate) fn spawn(broadcaster: Broadcaster) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(broadcaster, cancel.clone()));

        Self { task, cancel }
    }

    /// Stops the loop; a batch in progress is finished first.
    pub(crate) async fn shutdown(self) -> Result<()> {
        log::info!("stopping scheduled broadcasts");
        self.cancel.cancel();
        self.task.await?;
        Ok(())
    }
}

/// Waits for `duration`, returning `false` if cancelled in the meantime.
async fn pause(cancel: &CancellationToken, duration: std::time::Duration) -> bool {
    select! {
        _ = cancel.cancelled() => false,
        _ = sleep(duration) => true,
    }
}

async fn run(broadcaster: Broadcaster, cancel: CancellationToken) {
    let settings = broadcaster.settings().clone();
    let mut last_run: Option<Instant> = None;
    log::info!(
        "broadcasting every {:?}, at most every {:?}",
        settings.cycle_interval,
        settings.cooldown
    );

    loop {
        while last_run.is_some_and(|last| last.elapsed() < settings.cooldown) {
            if !pause(&cancel, settings.poll_interval).await {
                return;
            }
        }

        if cancel.is_cancelled() {
            return;
        }

        log::info!("starting broadcast");
        let summary = broadcaster.broadcast(&cancel).await;
        last_run = Some(Instant::now());
        log::info!("broadcast finished: {summary}");
        if let Err(err) = Notifications::broadcast_finished(&summary) {
            log::debug!("could not report status: {err}");
        }

        if !pause(&cancel, settings.cycle_interval).await {
            return;
        }
    }
}
