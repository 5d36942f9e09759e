// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use anyhow::Result;
use teloxide::{prelude::*, utils::command::BotCommands};

use super::{Context, chat_info};
use crate::{broadcast::Outcome, model::Safety, subscriptions};

#[derive(BotCommands, Debug, Clone, Copy, PartialEq, Eq)]
#[command(
    rename_rule = "lowercase",
    description = "👋 Welcome! I send you beautiful wallpapers.\n\nCommands:"
)]
pub(crate) enum Command {
    #[command(description = "show this message")]
    Start,
    #[command(description = "a random safe wallpaper")]
    Sfw,
    #[command(description = "a random unsafe wallpaper")]
    Nsfw,
    #[command(description = "receive a wallpaper every now and then")]
    Subscribe,
    #[command(description = "stop receiving wallpapers")]
    Unsubscribe,
}

async fn reply(bot: &Bot, chat_id: ChatId, text: String) {
    if let Err(err) = bot.send_message(chat_id, text).await {
        log::error!("failed to reply to chat {chat_id}: {err}");
    }
}

async fn send_wallpaper(bot: &Bot, context: &Context, chat_id: ChatId, safety: Safety) {
    match context.broadcaster.send_wallpaper(chat_id.0, safety).await {
        Outcome::Delivered | Outcome::Skipped => {}
        Outcome::NoCandidate | Outcome::Failed => {
            reply(bot, chat_id, "❌ Failed to send a wallpaper.".to_string()).await
        }
    }
}

pub(super) async fn answer(
    bot: Bot,
    context: Context,
    message: Message,
    command: Command,
) -> Result<()> {
    let chat_id = message.chat.id;
    log::debug!("{command:?} in chat {chat_id}");

    match command {
        Command::Start => reply(&bot, chat_id, Command::descriptions().to_string()).await,
        Command::Sfw => send_wallpaper(&bot, &context, chat_id, Safety::Safe).await,
        Command::Nsfw => send_wallpaper(&bot, &context, chat_id, Safety::Unsafe).await,
        Command::Subscribe => {
            let text = if subscriptions::opt_in(context.store.as_ref(), chat_info(&message.chat)).await {
                "✅ Subscribed, you will receive a random wallpaper every now and then."
            } else {
                "❌ Subscribing failed, please try again later."
            };
            reply(&bot, chat_id, text.to_string()).await
        }
        Command::Unsubscribe => {
            let text = if subscriptions::opt_out(context.store.as_ref(), chat_id.0).await {
                "✅ Unsubscribed."
            } else {
                "❌ Unsubscribing failed, please try again later."
            };
            reply(&bot, chat_id, text.to_string()).await
        }
    }

    Ok(())
}
