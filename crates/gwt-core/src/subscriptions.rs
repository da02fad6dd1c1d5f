//! Per-project subscription table (`chats_projects.json`).
//!
//! Layout on disk:
//!
//! ```json
//! { "<project token>": {
//!     "users": { "<chat id>": { "pipelines": true, ... } },
//!     "jobs": {}, "pipelines": {}, "merge_requests": {} } }
//! ```
//!
//! `users` is the only source of truth for who wants which events. The kind
//! mappings hold opaque bookkeeping for the notifier (for instance which
//! message announced a pipeline, so a later event can edit it) and are never
//! consulted to answer subscription questions. Any other key of an entry is
//! carried through untouched.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    domain::{ChatId, EventKind},
    errors::Error,
    store::{Record, StateStore},
    Result,
};

/// Opaque per-chat settings. Stored and migrated, interpreted only by
/// [`wants`].
pub type Preferences = Value;

/// Opaque per-kind bookkeeping of one project.
pub type KindState = BTreeMap<String, Value>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectEntry {
    #[serde(default)]
    pub users: BTreeMap<ChatId, Preferences>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<KindState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipelines: Option<KindState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_requests: Option<KindState>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProjectEntry {
    /// A fresh entry already carries every kind mapping.
    pub fn new() -> Self {
        let mut entry = Self::default();
        entry.migrate();
        entry
    }

    fn slot(&mut self, kind: EventKind) -> &mut Option<KindState> {
        match kind {
            EventKind::Jobs => &mut self.jobs,
            EventKind::Pipelines => &mut self.pipelines,
            EventKind::MergeRequests => &mut self.merge_requests,
        }
    }

    pub fn kind_state(&self, kind: EventKind) -> Option<&KindState> {
        match kind {
            EventKind::Jobs => self.jobs.as_ref(),
            EventKind::Pipelines => self.pipelines.as_ref(),
            EventKind::MergeRequests => self.merge_requests.as_ref(),
        }
    }

    pub fn kind_state_mut(&mut self, kind: EventKind) -> &mut KindState {
        self.slot(kind).get_or_insert_with(KindState::new)
    }

    pub fn has_all_kinds(&self) -> bool {
        EventKind::ALL
            .iter()
            .all(|k| self.kind_state(*k).is_some())
    }

    /// Returns how many kind mappings had to be added.
    fn migrate(&mut self) -> usize {
        let mut added = 0;
        for kind in EventKind::ALL {
            let slot = self.slot(kind);
            if slot.is_none() {
                *slot = Some(KindState::new());
                added += 1;
            }
        }
        added
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionTable {
    entries: BTreeMap<String, ProjectEntry>,
}

impl SubscriptionTable {
    /// Load the table as stored; callers run [`SubscriptionTable::migrate`]
    /// before use. Chat keys must be integers.
    pub fn load(store: &dyn StateStore) -> Result<Self> {
        let path = store.location(Record::ChatsProjects);
        let Some(raw) = store.load(Record::ChatsProjects)? else {
            tracing::warn!(path = %path.display(), "subscription table not found, assuming empty");
            return Ok(Self::default());
        };
        serde_json::from_value(raw).map_err(|source| Error::MalformedState { path, source })
    }

    /// Give every entry the `jobs`, `pipelines` and `merge_requests` mappings.
    /// Existing mappings and `users` are left untouched; running it again is a
    /// no-op.
    pub fn migrate(mut self) -> Self {
        let added: usize = self.entries.values_mut().map(ProjectEntry::migrate).sum();
        if added > 0 {
            tracing::debug!(added, "migrated subscription table");
        }
        self
    }

    pub fn persist(&self, store: &dyn StateStore) -> Result<()> {
        store.save(Record::ChatsProjects, &serde_json::to_value(self)?)
    }

    pub fn entry(&self, token: &str) -> Option<&ProjectEntry> {
        self.entries.get(token)
    }

    fn entry_mut(&mut self, token: &str) -> &mut ProjectEntry {
        self.entries
            .entry(token.to_string())
            .or_insert_with(ProjectEntry::new)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_preferences(&self, token: &str, chat_id: ChatId) -> Option<&Preferences> {
        self.entries.get(token)?.users.get(&chat_id)
    }

    /// Creates the project entry and the chat key when missing.
    pub fn set_preferences(&mut self, token: &str, chat_id: ChatId, prefs: Preferences) {
        self.entry_mut(token).users.insert(chat_id, prefs);
    }

    /// Drop a chat from a project. The project entry itself stays.
    pub fn remove_preferences(&mut self, token: &str, chat_id: ChatId) -> Option<Preferences> {
        self.entries.get_mut(token)?.users.remove(&chat_id)
    }

    /// Chats under `token` whose preferences ask for `kind`.
    pub fn subscribers_for(&self, token: &str, kind: EventKind) -> BTreeSet<ChatId> {
        let Some(entry) = self.entries.get(token) else {
            return BTreeSet::new();
        };
        entry
            .users
            .iter()
            .filter(|(_, prefs)| wants(prefs, kind))
            .map(|(chat, _)| *chat)
            .collect()
    }

    /// Every project the chat has preferences under, with those preferences.
    pub fn subscriptions_of(&self, chat_id: ChatId) -> Vec<(&str, &Preferences)> {
        self.entries
            .iter()
            .filter_map(|(token, entry)| {
                entry
                    .users
                    .get(&chat_id)
                    .map(|prefs| (token.as_str(), prefs))
            })
            .collect()
    }

    pub fn kind_entry(&self, token: &str, kind: EventKind, key: &str) -> Option<&Value> {
        self.entries.get(token)?.kind_state(kind)?.get(key)
    }

    /// Store `value` under `key` in a project's kind mapping; `Value::Null`
    /// removes the key. Returns whether the table changed.
    pub fn set_kind_entry(
        &mut self,
        token: &str,
        kind: EventKind,
        key: &str,
        value: Value,
    ) -> bool {
        if value.is_null() {
            return self
                .entries
                .get_mut(token)
                .and_then(|entry| entry.slot(kind).as_mut())
                .and_then(|state| state.remove(key))
                .is_some();
        }
        let state = self.entry_mut(token).kind_state_mut(kind);
        state.insert(key.to_string(), value.clone()) != Some(value)
    }
}

/// Whether a preferences value asks for `kind`.
///
/// `true`, non-zero numbers, and non-empty strings/arrays/objects count as a
/// subscription (an object may carry per-kind filters).
pub fn wants(prefs: &Preferences, kind: EventKind) -> bool {
    match prefs.get(kind.as_str()) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(xs)) => !xs.is_empty(),
        Some(Value::Object(m)) => !m.is_empty(),
    }
}

/// Copy of `prefs` with `kind` switched on or off. Non-object preferences are
/// replaced by an object.
pub fn with_kind(prefs: Option<&Preferences>, kind: EventKind, enabled: bool) -> Preferences {
    let mut map = match prefs {
        Some(Value::Object(m)) => m.clone(),
        _ => Map::new(),
    };
    map.insert(kind.as_str().to_string(), Value::Bool(enabled));
    Value::Object(map)
}

/// True when no kind is requested any more.
pub fn is_unsubscribed(prefs: &Preferences) -> bool {
    EventKind::ALL.iter().all(|k| !wants(prefs, *k))
}
