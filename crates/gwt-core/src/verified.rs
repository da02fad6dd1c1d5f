use serde::{Deserialize, Serialize};

use crate::{
    domain::ChatId,
    errors::Error,
    store::{Record, StateStore},
    Result,
};

/// Chats that proved knowledge of the passphrase (`verified_chats.json`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerifiedChats {
    chats: Vec<ChatId>,
}

impl VerifiedChats {
    /// Absent file means nobody is verified yet.
    pub fn load(store: &dyn StateStore) -> Result<Self> {
        let path = store.location(Record::VerifiedChats);
        let Some(raw) = store.load(Record::VerifiedChats)? else {
            tracing::warn!(path = %path.display(), "verified chats file not found, assuming empty");
            return Ok(Self::default());
        };
        serde_json::from_value(raw).map_err(|source| Error::MalformedState { path, source })
    }

    pub fn is_verified(&self, chat_id: ChatId) -> bool {
        self.chats.contains(&chat_id)
    }

    /// Returns false when the chat was already present.
    pub fn add(&mut self, chat_id: ChatId) -> bool {
        if self.is_verified(chat_id) {
            return false;
        }
        self.chats.push(chat_id);
        true
    }

    pub fn persist(&self, store: &dyn StateStore) -> Result<()> {
        store.save(Record::VerifiedChats, &serde_json::to_value(self)?)
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ChatId> + '_ {
        self.chats.iter().copied()
    }
}
