//! Telegram update handlers.
//!
//! Handlers are thin: they pull the text out of the update, let
//! [`commands::respond`] decide the reply (if any), and send it back.

use std::sync::Arc;

use teloxide::{prelude::*, types::ParseMode};

use gwt_core::domain::ChatId;

use crate::router::AppState;

pub mod commands;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let chat_id = ChatId(msg.chat.id.0);

    // Mutations in one chat are applied in arrival order.
    let _guard = state.chat_locks.lock_chat(chat_id.0).await;

    let reply = match commands::respond(&state.ctx, &state.pending, chat_id, text).await {
        Ok(Some(reply)) => reply,
        Ok(None) => return Ok(()),
        Err(e) => {
            tracing::error!(chat_id = chat_id.0, error = %e, "failed to handle message");
            "⚠️ Your change was applied but could not be saved. Please try again later."
                .to_string()
        }
    };

    bot.send_message(msg.chat.id, reply)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}
