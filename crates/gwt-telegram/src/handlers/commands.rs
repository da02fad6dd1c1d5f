//! Chat command handling, independent of teloxide so it can be driven from
//! tests with a plain [`Context`].

use std::collections::HashSet;

use tokio::sync::Mutex;

use gwt_core::{
    domain::{ChatId, EventKind},
    subscriptions::{is_unsubscribed, wants, with_kind},
    Context, Result,
};

const HELP: &str = "<b>Commands</b>\n\
/projects - list known projects\n\
/subscribe &lt;project&gt; [jobs|pipelines|merge_requests]\n\
/unsubscribe &lt;project&gt; [jobs|pipelines|merge_requests]\n\
/status - show your subscriptions\n\
/help - this message";

pub(crate) fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

pub(crate) fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Chats that sent `/start` and whose next plain-text message is a
/// passphrase attempt.
#[derive(Default)]
pub struct PendingVerifications {
    inner: Mutex<HashSet<i64>>,
}

impl PendingVerifications {
    pub async fn begin(&self, chat_id: ChatId) {
        self.inner.lock().await.insert(chat_id.0);
    }

    /// Leave verification mode; true if the chat was in it.
    pub async fn take(&self, chat_id: ChatId) -> bool {
        self.inner.lock().await.remove(&chat_id.0)
    }

    pub async fn is_pending(&self, chat_id: ChatId) -> bool {
        self.inner.lock().await.contains(&chat_id.0)
    }
}

/// Compute the HTML reply for one incoming text message; `None` means stay
/// silent.
///
/// Plain text is ordinary chat conversation, except right after `/start` in
/// an unverified chat, where it is taken as the passphrase. Unverified chats
/// may also use `/verify <passphrase>`.
pub async fn respond(
    ctx: &Context,
    pending: &PendingVerifications,
    chat_id: ChatId,
    text: &str,
) -> Result<Option<String>> {
    let text = text.trim();

    if !text.starts_with('/') {
        if !pending.take(chat_id).await {
            return Ok(None);
        }
        return verify(ctx, chat_id, text).await.map(Some);
    }

    let (cmd, rest) = parse_command(text);

    if !ctx.is_verified(chat_id).await {
        let reply = match cmd.as_str() {
            "verify" if !rest.is_empty() => {
                pending.take(chat_id).await;
                verify(ctx, chat_id, &rest).await?
            }
            "start" | "verify" => {
                pending.begin(chat_id).await;
                "🔑 Please send the passphrase.".to_string()
            }
            _ => "🔒 This chat is not verified yet. Send /start to verify it.".to_string(),
        };
        return Ok(Some(reply));
    }

    let reply = match cmd.as_str() {
        "start" | "help" | "verify" => HELP.to_string(),
        "projects" => list_projects(ctx),
        "status" => status(ctx, chat_id).await,
        "subscribe" => toggle(ctx, chat_id, &rest, true).await?,
        "unsubscribe" => toggle(ctx, chat_id, &rest, false).await?,
        _ => format!("Unknown command: /{}", escape_html(&cmd)),
    };
    Ok(Some(reply))
}

async fn verify(ctx: &Context, chat_id: ChatId, passphrase: &str) -> Result<String> {
    if ctx.verify(chat_id, passphrase).await? {
        Ok(format!("✅ Chat verified.\n\n{HELP}"))
    } else {
        Ok("❌ Wrong passphrase. Send /start to try again.".to_string())
    }
}

fn list_projects(ctx: &Context) -> String {
    let cfg = ctx.config();
    if cfg.projects.is_empty() {
        return "No projects are configured.".to_string();
    }
    let mut out = String::from("<b>Projects</b>\n");
    for (idx, project) in cfg.projects.iter().enumerate() {
        out.push_str(&format!(
            "{}. {}\n",
            idx + 1,
            escape_html(&cfg.label(&project.token))
        ));
    }
    out
}

async fn status(ctx: &Context, chat_id: ChatId) -> String {
    let subs = ctx.subscriptions_of(chat_id).await;
    let lines: Vec<String> = subs
        .iter()
        .filter(|(token, _)| ctx.is_authorized_project(token))
        .filter_map(|(token, prefs)| {
            let kinds: Vec<&str> = EventKind::ALL
                .iter()
                .filter(|k| wants(prefs, **k))
                .map(|k| k.as_str())
                .collect();
            if kinds.is_empty() {
                return None;
            }
            Some(format!(
                "• {}: {}",
                escape_html(&ctx.config().label(token)),
                kinds.join(", ")
            ))
        })
        .collect();

    if lines.is_empty() {
        return "You are not subscribed to anything.".to_string();
    }
    format!("<b>Subscriptions</b>\n{}", lines.join("\n"))
}

async fn toggle(ctx: &Context, chat_id: ChatId, args: &str, enabled: bool) -> Result<String> {
    let verb = if enabled { "subscribe" } else { "unsubscribe" };
    let mut parts = args.split_whitespace();
    let Some(selector) = parts.next() else {
        return Ok(format!("Usage: /{verb} &lt;project&gt; [kind]"));
    };

    let kinds: Vec<EventKind> = match parts.next() {
        None => EventKind::ALL.to_vec(),
        Some(raw) => match raw.parse::<EventKind>() {
            Ok(kind) => vec![kind],
            Err(e) => return Ok(escape_html(&e)),
        },
    };

    let cfg = ctx.config();
    let Some(project) = cfg.find_project(selector) else {
        return Ok(format!("Unknown project: {}", escape_html(selector)));
    };
    let token = project.token.clone();

    ctx.update_preferences(&token, chat_id, |prev| {
        let mut prefs = prev.cloned();
        for kind in &kinds {
            prefs = Some(with_kind(prefs.as_ref(), *kind, enabled));
        }
        prefs.filter(|p| !is_unsubscribed(p))
    })
    .await?;

    let what = kinds
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let label = escape_html(&cfg.label(&token));
    Ok(if enabled {
        format!("🔔 Subscribed to {what} of {label}.")
    } else {
        format!("🔕 Unsubscribed from {what} of {label}.")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use gwt_core::store::{MemoryStore, Record};
    use serde_json::json;

    fn ctx() -> Context {
        let store = MemoryStore::new().with(
            Record::Config,
            json!({
                "gitlab-projects": [
                    {"token": "tok-api", "name": "api"},
                    {"token": "tok-web"}
                ],
                "passphrase": "let me in",
                "telegram-token": "1:x"
            }),
        );
        Context::from_store(Arc::new(store)).unwrap()
    }

    async fn say(
        ctx: &Context,
        pending: &PendingVerifications,
        chat: ChatId,
        text: &str,
    ) -> String {
        respond(ctx, pending, chat, text)
            .await
            .unwrap()
            .unwrap_or_default()
    }

    #[test]
    fn parses_commands_with_bot_suffix() {
        assert_eq!(
            parse_command("/Subscribe@gwt_bot api jobs"),
            ("subscribe".to_string(), "api jobs".to_string())
        );
        assert_eq!(parse_command("/status"), ("status".to_string(), String::new()));
    }

    #[tokio::test]
    async fn plain_chatter_is_ignored() {
        let ctx = ctx();
        let pending = PendingVerifications::default();

        let reply = respond(&ctx, &pending, ChatId(-100), "lunch anyone?").await.unwrap();
        assert!(reply.is_none());
        // Even the right passphrase is only accepted after /start.
        let reply = respond(&ctx, &pending, ChatId(-100), "let me in").await.unwrap();
        assert!(reply.is_none());
        assert!(!ctx.is_verified(ChatId(-100)).await);

        ctx.add_verified(ChatId(-100)).await.unwrap();
        let reply = respond(&ctx, &pending, ChatId(-100), "build is green, nice")
            .await
            .unwrap();
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn start_then_passphrase_verifies() {
        let ctx = ctx();
        let pending = PendingVerifications::default();
        let chat = ChatId(100);

        let reply = say(&ctx, &pending, chat, "/projects").await;
        assert!(reply.contains("not verified"));

        let reply = say(&ctx, &pending, chat, "/start").await;
        assert!(reply.contains("passphrase"));
        assert!(pending.is_pending(chat).await);

        let reply = say(&ctx, &pending, chat, "nope").await;
        assert!(reply.contains("Wrong passphrase"));
        assert!(!ctx.is_verified(chat).await);
        assert!(!pending.is_pending(chat).await);

        // The mode ended with the failed attempt.
        assert!(respond(&ctx, &pending, chat, "let me in").await.unwrap().is_none());

        say(&ctx, &pending, chat, "/start@gwt_bot").await;
        let reply = say(&ctx, &pending, chat, "let me in").await;
        assert!(reply.contains("verified"));
        assert!(ctx.is_verified(chat).await);
    }

    #[tokio::test]
    async fn pending_mode_is_per_chat() {
        let ctx = ctx();
        let pending = PendingVerifications::default();

        say(&ctx, &pending, ChatId(1), "/start").await;
        assert!(respond(&ctx, &pending, ChatId(2), "let me in").await.unwrap().is_none());
        assert!(!ctx.is_verified(ChatId(2)).await);
        assert!(pending.is_pending(ChatId(1)).await);
    }

    #[tokio::test]
    async fn verify_command_accepts_passphrase_argument() {
        let ctx = ctx();
        let pending = PendingVerifications::default();
        say(&ctx, &pending, ChatId(1), "/verify let me in").await;
        assert!(ctx.is_verified(ChatId(1)).await);
    }

    #[tokio::test]
    async fn projects_never_show_tokens() {
        let ctx = ctx();
        let pending = PendingVerifications::default();
        ctx.add_verified(ChatId(1)).await.unwrap();
        let reply = say(&ctx, &pending, ChatId(1), "/projects").await;
        assert!(reply.contains("1. api"));
        assert!(reply.contains("2. project #2"));
        assert!(!reply.contains("tok-"));
    }

    #[tokio::test]
    async fn subscribe_and_unsubscribe_flow() {
        let ctx = ctx();
        let pending = PendingVerifications::default();
        let chat = ChatId(-42);
        ctx.add_verified(chat).await.unwrap();

        say(&ctx, &pending, chat, "/subscribe api pipelines").await;
        say(&ctx, &pending, chat, "/subscribe 2").await;

        assert_eq!(
            ctx.get_preferences("tok-api", chat).await,
            Some(json!({"pipelines": true}))
        );
        assert!(ctx
            .subscribers_for("tok-web", EventKind::MergeRequests)
            .await
            .contains(&chat));

        let reply = say(&ctx, &pending, chat, "/status").await;
        assert!(reply.contains("api: pipelines"));
        assert!(reply.contains("project #2: jobs, pipelines, merge_requests"));

        say(&ctx, &pending, chat, "/unsubscribe api pipelines").await;
        assert_eq!(ctx.get_preferences("tok-api", chat).await, None);

        say(&ctx, &pending, chat, "/unsubscribe 2 jobs").await;
        assert_eq!(
            ctx.get_preferences("tok-web", chat).await,
            Some(json!({"jobs": false, "pipelines": true, "merge_requests": true}))
        );
    }

    #[tokio::test]
    async fn bad_arguments_are_reported() {
        let ctx = ctx();
        let pending = PendingVerifications::default();
        ctx.add_verified(ChatId(1)).await.unwrap();

        let reply = say(&ctx, &pending, ChatId(1), "/subscribe").await;
        assert!(reply.starts_with("Usage"));
        let reply = say(&ctx, &pending, ChatId(1), "/subscribe nope").await;
        assert!(reply.contains("Unknown project"));
        let reply = say(&ctx, &pending, ChatId(1), "/subscribe api issues").await;
        assert!(reply.contains("unknown event kind"));
        let reply = say(&ctx, &pending, ChatId(1), "/frobnicate").await;
        assert!(reply.contains("Unknown command"));
    }
}
