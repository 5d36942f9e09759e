// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use chrono::Utc;
use serde_json::Value;

use crate::{
    model::{ChatType, Subscription},
    store::Store,
};

/// Display metadata of a chat, as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChatInfo {
    pub(crate) chat_id: i64,
    pub(crate) chat_type: ChatType,
    pub(crate) title: String,
    pub(crate) username: Option<String>,
}

/// Our own role in a chat after a membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MemberStatus {
    Administrator,
    Member,
    Left,
    Kicked,
    /// owner or restricted member
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MembershipChange {
    pub(crate) chat: ChatInfo,
    pub(crate) status: MemberStatus,
    /// meaningful for administrators and members only
    pub(crate) can_post: bool,
}

fn subscription(chat: ChatInfo, is_admin: bool, active: bool) -> Subscription {
    let now = Utc::now();

    Subscription {
        chat_id: chat.chat_id,
        chat_type: chat.chat_type,
        title: chat.title,
        username: chat.username,
        is_admin,
        active,
        created_at: now,
        updated_at: now,
        extra_info: Value::Object(Default::default()),
    }
}

/// Subscribes a chat on explicit request, reactivating it if necessary.
pub(crate) async fn opt_in(store: &dyn Store, chat: ChatInfo) -> bool {
    let chat_id = chat.chat_id;
    let stored = store.upsert_subscription(&subscription(chat, false, true)).await;
    if stored {
        log::info!("chat {chat_id} subscribed");
    }

    stored
}

pub(crate) async fn opt_out(store: &dyn Store, chat_id: i64) -> bool {
    let deactivated = store.deactivate_subscription(chat_id).await;
    if deactivated {
        log::info!("chat {chat_id} unsubscribed");
    }

    deactivated
}

/// Follows our membership in channels. Changes in other kinds of chats are
/// ignored and count as handled.
pub(crate) async fn membership_changed(store: &dyn Store, change: MembershipChange) -> bool {
    if change.chat.chat_type != ChatType::Channel {
        log::debug!(
            "ignoring membership change in {} {}",
            change.chat.chat_type,
            change.chat.chat_id
        );
        return true;
    }

    let chat_id = change.chat.chat_id;
    match change.status {
        MemberStatus::Administrator | MemberStatus::Member => {
            let is_admin = change.status == MemberStatus::Administrator;
            log::info!(
                "joined channel {chat_id} (admin: {is_admin}, may post: {})",
                change.can_post
            );
            store
                .upsert_subscription(&subscription(change.chat, is_admin, change.can_post))
                .await
        }
        MemberStatus::Left | MemberStatus::Kicked => {
            log::info!("removed from channel {chat_id}");
            store.deactivate_subscription(chat_id).await
        }
        MemberStatus::Other => true,
    }
}
