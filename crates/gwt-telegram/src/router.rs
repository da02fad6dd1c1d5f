use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::{Mutex, OwnedMutexGuard};

use gwt_core::Context;

use crate::handlers::{self, commands::PendingVerifications};

#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<Context>,
    pub chat_locks: Arc<ChatLocks>,
    pub pending: Arc<PendingVerifications>,
}

#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Long-poll Telegram and answer verification/subscription commands until
/// the dispatcher stops.
pub async fn run_polling(ctx: Arc<Context>) -> anyhow::Result<()> {
    let bot = Bot::new(ctx.config().telegram_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "telegram bot started"),
        Err(e) => tracing::warn!(error = %e, "telegram getMe failed"),
    }

    let state = Arc::new(AppState {
        ctx,
        chat_locks: Arc::new(ChatLocks::default()),
        pending: Arc::new(PendingVerifications::default()),
    });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn chat_locks_serialize_one_chat_only() {
        let locks = ChatLocks::default();
        let held = locks.lock_chat(1).await;

        // Another chat is independent.
        let other = tokio::time::timeout(std::time::Duration::from_millis(50), locks.lock_chat(2)).await;
        assert!(other.is_ok());

        // The same chat waits until the first guard drops.
        let same = tokio::time::timeout(std::time::Duration::from_millis(50), locks.lock_chat(1)).await;
        assert!(same.is_err());

        drop(held);
        let again = tokio::time::timeout(std::time::Duration::from_millis(50), locks.lock_chat(1)).await;
        assert!(again.is_ok());
    }
}
