use std::collections::HashSet;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    errors::Error,
    store::{Record, StateStore},
    Result,
};

const REQUIRED_KEYS: [&str; 3] = ["gitlab-projects", "passphrase", "telegram-token"];

/// A GitLab project allowed to deliver webhooks.
///
/// Only `token` has meaning here; every other key of the project object is
/// kept verbatim for the collaborators that render or list projects.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Project {
    pub token: String,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl Project {
    pub fn name(&self) -> Option<&str> {
        self.metadata.get("name").and_then(Value::as_str)
    }
}

/// Contents of `config.json`. Read once at startup, never written back.
#[derive(Clone, Debug, Deserialize)]
pub struct Configuration {
    #[serde(rename = "gitlab-projects")]
    pub projects: Vec<Project>,
    pub passphrase: String,
    #[serde(rename = "telegram-token")]
    pub telegram_token: String,
    #[serde(rename = "log-level", default)]
    pub log_level: Option<String>,
}

impl Configuration {
    /// Load and validate the configuration record.
    ///
    /// Every failure here is fatal for the process: without a valid project
    /// list nothing can be authorized.
    pub fn load(store: &dyn StateStore) -> Result<Self> {
        let path = store.location(Record::Config);
        let Some(raw) = store.load(Record::Config)? else {
            return Err(Error::MissingConfig { path });
        };
        Self::from_value(raw).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn from_value(raw: Value) -> Result<Self> {
        let Some(obj) = raw.as_object() else {
            return Err(Error::Config(
                "expected a JSON object at the top level".to_string(),
            ));
        };

        let missing: Vec<&str> = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|k| !obj.contains_key(*k))
            .collect();
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "misconfigured, missing key(s): {}",
                missing.join(", ")
            )));
        }

        let cfg: Configuration =
            serde_json::from_value(raw).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (idx, project) in self.projects.iter().enumerate() {
            if project.token.is_empty() {
                return Err(Error::Config(format!(
                    "gitlab-projects[{idx}] has an empty token"
                )));
            }
            if !seen.insert(project.token.as_str()) {
                return Err(Error::Config(format!(
                    "gitlab-projects[{idx}] reuses the token of an earlier project"
                )));
            }
        }
        Ok(())
    }

    /// Exact, case-sensitive token match.
    pub fn is_authorized_project(&self, token: &str) -> bool {
        self.project(token).is_some()
    }

    pub fn project(&self, token: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.token == token)
    }

    /// Resolve a user-supplied selector: a project name, or a 1-based index
    /// into `gitlab-projects`.
    pub fn find_project(&self, selector: &str) -> Option<&Project> {
        let selector = selector.trim();
        if let Some(p) = self.projects.iter().find(|p| p.name() == Some(selector)) {
            return Some(p);
        }
        let idx = selector.parse::<usize>().ok()?;
        self.projects.get(idx.checked_sub(1)?)
    }

    /// Label for a project that never reveals its token.
    pub fn label(&self, token: &str) -> String {
        let Some(idx) = self.projects.iter().position(|p| p.token == token) else {
            return "unknown project".to_string();
        };
        match self.projects[idx].name() {
            Some(name) => name.to_string(),
            None => format!("project #{}", idx + 1),
        }
    }
}
