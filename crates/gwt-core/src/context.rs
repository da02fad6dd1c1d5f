use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde_json::Value;
use tokio::sync::RwLock;

use crate::{
    config::Configuration,
    domain::{ChatId, EventKind},
    store::{FileStore, StateStore},
    subscriptions::{Preferences, SubscriptionTable},
    verified::VerifiedChats,
    Result,
};

/// Shared state handle for the webhook listener and the Telegram handler.
///
/// Reads take a shared lock. Every mutation holds the record's write lock
/// until its persist call returns, so two writers cannot interleave and one
/// cannot overwrite the other's update with a stale snapshot. A failed
/// persist is returned to the caller; the in-memory change is kept.
pub struct Context {
    store: Arc<dyn StateStore>,
    directory: Option<PathBuf>,
    config: Configuration,
    verified: RwLock<VerifiedChats>,
    table: RwLock<SubscriptionTable>,
}

impl Context {
    /// Load configuration, verified chats and the subscription table from
    /// `directory`, then migrate the table.
    pub fn initialize(directory: impl AsRef<Path>) -> Result<Self> {
        let store = FileStore::new(directory.as_ref());
        let config = Configuration::load(&store)?;
        let mut ctx = Self::with_config(Arc::new(store), config)?;
        ctx.directory = Some(directory.as_ref().to_path_buf());
        Ok(ctx)
    }

    /// Load the mutable records for an already-validated configuration.
    ///
    /// Lets the binary configure logging from `config.log_level` before the
    /// state files are read.
    pub fn with_config(store: Arc<dyn StateStore>, config: Configuration) -> Result<Self> {
        let verified = VerifiedChats::load(store.as_ref())?;
        let table = SubscriptionTable::load(store.as_ref())?.migrate();

        tracing::info!(
            projects = config.projects.len(),
            verified_chats = verified.len(),
            subscribed_projects = table.len(),
            "state loaded"
        );

        Ok(Self {
            store,
            directory: None,
            config,
            verified: RwLock::new(verified),
            table: RwLock::new(table),
        })
    }

    pub fn from_store(store: Arc<dyn StateStore>) -> Result<Self> {
        let config = Configuration::load(store.as_ref())?;
        Self::with_config(store, config)
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// State directory, when backed by [`FileStore`].
    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    pub fn is_authorized_project(&self, token: &str) -> bool {
        self.config.is_authorized_project(token)
    }

    pub async fn is_verified(&self, chat_id: ChatId) -> bool {
        self.verified.read().await.is_verified(chat_id)
    }

    /// Check `passphrase` and mark the chat verified on success.
    ///
    /// `Ok(false)` means a wrong passphrase; nothing is written in that case.
    pub async fn verify(&self, chat_id: ChatId, passphrase: &str) -> Result<bool> {
        if passphrase != self.config.passphrase {
            tracing::warn!(chat_id = chat_id.0, "verification failed");
            return Ok(false);
        }
        self.add_verified(chat_id).await?;
        tracing::info!(chat_id = chat_id.0, "chat verified");
        Ok(true)
    }

    pub async fn add_verified(&self, chat_id: ChatId) -> Result<()> {
        let mut verified = self.verified.write().await;
        verified.add(chat_id);
        verified.persist(self.store.as_ref())
    }

    pub async fn get_preferences(&self, token: &str, chat_id: ChatId) -> Option<Preferences> {
        self.table
            .read()
            .await
            .get_preferences(token, chat_id)
            .cloned()
    }

    pub async fn set_preferences(
        &self,
        token: &str,
        chat_id: ChatId,
        prefs: Preferences,
    ) -> Result<()> {
        let mut table = self.table.write().await;
        table.set_preferences(token, chat_id, prefs);
        table.persist(self.store.as_ref())
    }

    /// Read-modify-write of one chat's preferences under a single lock.
    pub async fn update_preferences<F>(
        &self,
        token: &str,
        chat_id: ChatId,
        f: F,
    ) -> Result<Option<Preferences>>
    where
        F: FnOnce(Option<&Preferences>) -> Option<Preferences>,
    {
        let mut table = self.table.write().await;
        let prev = table.get_preferences(token, chat_id).cloned();
        let next = f(prev.as_ref());
        if next == prev {
            return Ok(next);
        }
        match &next {
            Some(prefs) => table.set_preferences(token, chat_id, prefs.clone()),
            None => {
                table.remove_preferences(token, chat_id);
            }
        }
        table.persist(self.store.as_ref())?;
        Ok(next)
    }

    pub async fn remove_preferences(
        &self,
        token: &str,
        chat_id: ChatId,
    ) -> Result<Option<Preferences>> {
        let mut table = self.table.write().await;
        let removed = table.remove_preferences(token, chat_id);
        if removed.is_some() {
            table.persist(self.store.as_ref())?;
        }
        Ok(removed)
    }

    pub async fn subscribers_for(&self, token: &str, kind: EventKind) -> BTreeSet<ChatId> {
        self.table.read().await.subscribers_for(token, kind)
    }

    /// `(token, preferences)` for every project the chat is registered under.
    pub async fn subscriptions_of(&self, chat_id: ChatId) -> Vec<(String, Preferences)> {
        self.table
            .read()
            .await
            .subscriptions_of(chat_id)
            .into_iter()
            .map(|(token, prefs)| (token.to_string(), prefs.clone()))
            .collect()
    }

    pub async fn kind_entry(&self, token: &str, kind: EventKind, key: &str) -> Option<Value> {
        self.table.read().await.kind_entry(token, kind, key).cloned()
    }

    pub async fn set_kind_entry(
        &self,
        token: &str,
        kind: EventKind,
        key: &str,
        value: Value,
    ) -> Result<()> {
        let mut table = self.table.write().await;
        if table.set_kind_entry(token, kind, key, value) {
            table.persist(self.store.as_ref())?;
        }
        Ok(())
    }

    /// Snapshot of the table, for inspection and tests.
    pub async fn table(&self) -> SubscriptionTable {
        self.table.read().await.clone()
    }
}
