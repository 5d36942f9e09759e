// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
};

/// Chats that currently have a delivery in progress.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    chats: Mutex<HashSet<i64>>,
}

impl InFlight {
    fn chats(&self) -> MutexGuard<'_, HashSet<i64>> {
        // the set stays consistent even if a holder panicked
        self.chats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claims `chat_id`, or returns `None` if it is already claimed.
    pub(crate) fn try_acquire(self: &Arc<Self>, chat_id: i64) -> Option<Slot> {
        if !self.chats().insert(chat_id) {
            return None;
        }

        Some(Slot {
            registry: self.clone(),
            chat_id,
        })
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, chat_id: i64) -> bool {
        self.chats().contains(&chat_id)
    }
}

/// A claimed chat; dropping it releases the claim.
#[derive(Debug)]
pub(crate) struct Slot {
    registry: Arc<InFlight>,
    chat_id: i64,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.registry.chats().remove(&self.chat_id);
    }
}
