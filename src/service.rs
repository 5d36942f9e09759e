// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use std::io::Error;

use sd_notify::{NotifyState, notify};
use tokio::{
    select,
    signal::unix::{Signal, SignalKind, signal},
};

use crate::broadcast::Summary;

/// What the service manager asked us to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Request {
    /// `SIGHUP`
    Reload,
    /// `SIGINT`, `SIGTERM` or `SIGQUIT`
    Shutdown,
}

#[derive(Debug)]
pub(crate) struct Signals {
    hangup: Signal,
    interrupt: Signal,
    terminate: Signal,
    quit: Signal,
}

impl Signals {
    pub(crate) fn new() -> Result<Self, Error> {
        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    /// Waits for the next request; `None` once signals can no longer arrive.
    pub(crate) async fn next(&mut self) -> Option<Request> {
        select! {
            result = self.hangup.recv() => result.map(|_| Request::Reload),
            result = self.interrupt.recv() => result.map(|_| Request::Shutdown),
            result = self.terminate.recv() => result.map(|_| Request::Shutdown),
            result = self.quit.recv() => result.map(|_| Request::Shutdown),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Notifications {}

impl Notifications {
    pub(crate) fn starting() -> Result<(), Error> {
        notify(false, &[NotifyState::Status("opening the wallpaper store")])
    }

    pub(crate) fn ready() -> Result<(), Error> {
        notify(
            false,
            &[
                NotifyState::Ready,
                NotifyState::Status("waiting for the first broadcast"),
            ],
        )
    }

    pub(crate) fn reloading() -> Result<(), Error> {
        notify(
            false,
            &[
                NotifyState::Reloading,
                NotifyState::monotonic_usec_now()?,
                NotifyState::Status("reloading configuration"),
            ],
        )
    }

    /// Reports the outcome of the latest broadcast as the service status.
    pub(crate) fn broadcast_finished(summary: &Summary) -> Result<(), Error> {
        notify(
            false,
            &[NotifyState::Status(&format!("last broadcast: {summary}"))],
        )
    }

    pub(crate) fn stopping() -> Result<(), Error> {
        notify(
            false,
            &[
                NotifyState::Stopping,
                NotifyState::Status("finishing deliveries in progress"),
            ],
        )
    }

    pub(crate) fn failed(code: u32, message: &str) -> Result<(), Error> {
        notify(
            false,
            &[NotifyState::Status(message), NotifyState::Errno(code)],
        )
    }
}
