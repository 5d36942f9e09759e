// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

pub(crate) mod caption;
pub(crate) mod commands;

use std::{sync::Arc, time::Duration};

use anyhow::{Context as _, Error, Result};
use async_trait::async_trait;
use reqwest::{Proxy, Url};
use teloxide::{
    dispatching::{ShutdownToken, UpdateHandler},
    net,
    payloads::setters::*,
    prelude::*,
    types::{
        AllowedUpdate, Chat, ChatMemberStatus, ChatMemberUpdated, FileId, InputFile, ParseMode,
    },
    update_listeners::Polling,
};
use tokio::task::JoinHandle;

use self::commands::Command;
use crate::{
    broadcast::Broadcaster,
    config,
    delivery::{Delivery, Photo},
    model::{ChatType, Wallpaper},
    store::Store,
    subscriptions::{self, ChatInfo, MemberStatus, MembershipChange},
};

/// Leeway on top of the long polling timeout before a request is abandoned.
const REQUEST_LEEWAY: Duration = Duration::from_secs(10);

/// Builds a bot for the configured endpoint; nothing is sent yet.
pub(crate) fn connect(settings: &config::Telegram) -> Result<Bot> {
    let mut client = net::default_reqwest_settings().timeout(settings.poll_timeout() + REQUEST_LEEWAY);
    if let Some(proxy) = settings.proxy() {
        client = client.proxy(Proxy::all(proxy).with_context(|| format!("invalid proxy {proxy}"))?);
    }
    let api_url = Url::parse(settings.api_url())
        .with_context(|| format!("invalid api url {}", settings.api_url()))?;
    let client = client.build().context("failed to set up the http client")?;

    Ok(Bot::with_client(settings.token(), client).set_api_url(api_url))
}

/// The handle of the largest size Telegram made of an uploaded photo.
fn largest_photo(message: &Message) -> Result<String> {
    message
        .photo()
        .and_then(|sizes| sizes.last())
        .map(|size| size.file.id.to_string())
        .context("sent message carries no photo")
}

#[async_trait]
impl Delivery for Bot {
    fn caption(&self, wallpaper: &Wallpaper) -> String {
        caption::caption(wallpaper)
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: Photo<'_>,
        caption: &str,
        sensitive: bool,
    ) -> Result<String> {
        let file = match photo {
            Photo::Handle(handle) => InputFile::file_id(FileId(handle.to_string())),
            Photo::Url(url) => {
                InputFile::url(Url::parse(url).with_context(|| format!("invalid photo url {url}"))?)
            }
        };

        let message = Requester::send_photo(self, ChatId(chat_id), file)
            .caption(caption)
            .parse_mode(ParseMode::MarkdownV2)
            .has_spoiler(sensitive)
            .await?;

        largest_photo(&message)
    }
}

pub(crate) fn chat_info(chat: &Chat) -> ChatInfo {
    let chat_type = if chat.is_channel() {
        ChatType::Channel
    } else if chat.is_supergroup() {
        ChatType::Supergroup
    } else if chat.is_group() {
        ChatType::Group
    } else {
        ChatType::Private
    };

    // private chats have no title, use the full name instead
    let title = match chat.title() {
        Some(title) => title.to_string(),
        None => [chat.first_name(), chat.last_name()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" "),
    };

    ChatInfo {
        chat_id: chat.id.0,
        chat_type,
        title,
        username: chat.username().map(str::to_string),
    }
}

fn member_status(status: ChatMemberStatus) -> MemberStatus {
    match status {
        ChatMemberStatus::Administrator => MemberStatus::Administrator,
        ChatMemberStatus::Member => MemberStatus::Member,
        ChatMemberStatus::Left => MemberStatus::Left,
        ChatMemberStatus::Banned => MemberStatus::Kicked,
        ChatMemberStatus::Owner | ChatMemberStatus::Restricted => MemberStatus::Other,
    }
}

fn membership_change(chat: &Chat, status: ChatMemberStatus, can_post: bool) -> MembershipChange {
    MembershipChange {
        chat: chat_info(chat),
        status: member_status(status),
        can_post,
    }
}

/// Everything the handlers need besides the bot itself.
#[derive(Clone)]
pub(crate) struct Context {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) broadcaster: Broadcaster,
}

async fn membership(context: Context, update: ChatMemberUpdated) -> Result<()> {
    let kind = &update.new_chat_member.kind;
    let change = membership_change(&update.chat, kind.status(), kind.can_post_messages());
    let chat_id = change.chat.chat_id;
    if !subscriptions::membership_changed(context.store.as_ref(), change).await {
        log::error!("failed to record membership change in chat {chat_id}");
    }

    Ok(())
}

fn schema() -> UpdateHandler<Error> {
    dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(commands::answer),
        )
        .branch(Update::filter_my_chat_member().endpoint(membership))
}

pub(crate) struct Telegram {
    task: JoinHandle<()>,
    shutdown: ShutdownToken,
}

impl Telegram {
    pub(crate) fn spawn(bot: Bot, context: Context, poll_timeout: Duration) -> Self {
        let mut dispatcher = Dispatcher::builder(bot.clone(), schema())
            .dependencies(dptree::deps![context])
            .default_handler(|update| async move {
                log::debug!("ignoring update {:?}", update.id);
            })
            .error_handler(LoggingErrorHandler::with_custom_text(
                "failed to handle an update",
            ))
            .build();
        let shutdown = dispatcher.shutdown_token();

        let task = tokio::spawn(async move {
            log::info!("starting telegram bot");
            let listener = Polling::builder(bot)
                .timeout(poll_timeout)
                .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::MyChatMember])
                .build();
            dispatcher
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("failed to fetch updates"),
                )
                .await;
        });

        Self { task, shutdown }
    }

    /// Stops polling once the updates being handled are done.
    pub(crate) async fn shutdown(self) -> Result<()> {
        log::info!("shutting down telegram bot");
        match self.shutdown.shutdown() {
            Ok(stopped) => stopped.await,
            // the dispatcher is not running (yet)
            Err(_) => self.task.abort(),
        }

        match self.task.await {
            Err(err) if !err.is_cancelled() => Err(err.into()),
            _ => Ok(()),
        }
    }
}
