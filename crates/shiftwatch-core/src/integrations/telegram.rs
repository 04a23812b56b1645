//! Telegram integration -- long-poll updates, post replies and warnings.
//!
//! [`TelegramClient`] speaks the Bot API (`getUpdates`, `sendMessage`) and
//! implements [`NotificationSink`]. [`TelegramBot`] routes each update:
//! photos in the monitored chat become activity signals, text in the admin
//! chat goes to the [`AdminDesk`], commands anywhere else are denied.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::commands::AdminDesk;
use crate::engine::ActivityEngine;
use crate::error::{ConfigError, NotificationError};
use crate::notify::NotificationSink;
use crate::storage::Channels;

/// Reply posted in the monitored chat when a photo is recorded.
pub const PHOTO_ACK: &str = "Photo received, thanks!";

const RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    /// Photo sizes; only presence matters here.
    #[serde(default)]
    pub photo: Option<Vec<serde_json::Value>>,
}

impl Message {
    pub fn has_photo(&self) -> bool {
        self.photo.as_ref().is_some_and(|sizes| !sizes.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

/// Bot API client.
pub struct TelegramClient {
    http: Client,
    base: Url,
    token: String,
}

impl TelegramClient {
    /// `api_base` is normally `https://api.telegram.org`.
    pub fn new(api_base: &str, token: &str) -> Result<Self, ConfigError> {
        if token.trim().is_empty() {
            return Err(ConfigError::MissingKey("BOT_TOKEN".into()));
        }
        let mut base = api_base.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)
            .map_err(|e| ConfigError::invalid("telegram.api_base", e.to_string()))?;
        Ok(Self {
            http: Client::new(),
            base,
            token: token.trim().to_string(),
        })
    }

    fn method_url(&self, method: &str) -> Result<Url, url::ParseError> {
        self.base.join(&format!("bot{}/{}", self.token, method))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<(u16, ApiResponse<T>), String> {
        let url = self.method_url(method).map_err(|e| e.to_string())?;
        let resp = self
            .http
            .post(url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            // Drop the URL from the error: it contains the token.
            .map_err(|e| e.without_url().to_string())?;
        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(|e| e.without_url().to_string())?;
        let parsed = serde_json::from_str::<ApiResponse<T>>(&text)
            .map_err(|_| format!("HTTP {status}: {text}"))?;
        Ok((status, parsed))
    }

    /// Post `text` to `chat_id`.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), NotificationError> {
        let body = json!({ "chat_id": chat_id, "text": text });
        let (status, resp) = self
            .call::<serde_json::Value>("sendMessage", body, Duration::from_secs(30))
            .await
            .map_err(|message| NotificationError::DeliveryFailed {
                destination: chat_id,
                message,
            })?;
        if resp.ok {
            Ok(())
        } else {
            Err(NotificationError::Rejected {
                destination: chat_id,
                status,
                body: resp.description.unwrap_or_default(),
            })
        }
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, NotificationError> {
        let body = json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });
        // Leave the HTTP timeout some slack over the long-poll window.
        let http_timeout = Duration::from_secs(timeout_secs + 10);
        let (status, resp) = self
            .call::<Vec<Update>>("getUpdates", body, http_timeout)
            .await
            .map_err(NotificationError::PollFailed)?;
        if !resp.ok {
            return Err(NotificationError::PollFailed(format!(
                "HTTP {status}: {}",
                resp.description.unwrap_or_default()
            )));
        }
        Ok(resp.result.unwrap_or_default())
    }
}

#[async_trait]
impl NotificationSink for TelegramClient {
    async fn send(&self, destination: i64, text: &str) -> Result<(), NotificationError> {
        self.send_message(destination, text).await
    }
}

/// Routes Telegram updates into the engine and the admin desk.
pub struct TelegramBot {
    engine: Arc<ActivityEngine>,
    desk: Arc<AdminDesk>,
    replies: Arc<dyn NotificationSink>,
    channels: Channels,
}

impl TelegramBot {
    pub fn new(
        engine: Arc<ActivityEngine>,
        desk: Arc<AdminDesk>,
        replies: Arc<dyn NotificationSink>,
        channels: Channels,
    ) -> Self {
        Self {
            engine,
            desk,
            replies,
            channels,
        }
    }

    /// Handle one update.
    pub async fn handle_update(&self, update: &Update) {
        let Some(message) = &update.message else {
            return;
        };
        let chat_id = message.chat.id;

        if chat_id == self.channels.source {
            if !message.has_photo() {
                return;
            }
            let Some(from) = &message.from else {
                return;
            };
            let recorded = self.engine.on_activity_signal(
                from.id,
                from.username.as_deref(),
                self.engine.now(),
            );
            if recorded {
                self.reply(chat_id, PHOTO_ACK).await;
            }
            return;
        }

        let Some(text) = message.text.as_deref() else {
            return;
        };
        // Non-admin chats only reach the desk with commands, so the denial
        // gets logged without reacting to ordinary chatter.
        if chat_id != self.channels.admin && !text.trim_start().starts_with('/') {
            return;
        }
        if let Some(reply) = self.desk.handle(chat_id, text).await {
            self.reply(chat_id, &reply).await;
        }
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.replies.send(chat_id, text).await {
            tracing::warn!(chat_id, error = %e, "reply not delivered");
        }
    }

    /// Poll `client` until `cancel` fires.
    pub async fn run(&self, client: &TelegramClient, poll_timeout_secs: u64, cancel: CancellationToken) {
        let mut offset = 0i64;
        tracing::info!(
            source = self.channels.source,
            admin = self.channels.admin,
            report = self.channels.report,
            "telegram polling started"
        );
        loop {
            let polled = tokio::select! {
                _ = cancel.cancelled() => break,
                polled = client.get_updates(offset, poll_timeout_secs) => polled,
            };
            match polled {
                Ok(updates) => {
                    for update in &updates {
                        offset = offset.max(update.update_id + 1);
                        self.handle_update(update).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "telegram poll failed; retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RETRY_DELAY) => {}
                    }
                }
            }
        }
        tracing::info!("telegram polling stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::*;
    use crate::notify::RecordingSink;
    use crate::session::AdminSessions;
    use crate::store::ActivityStore;
    use chrono::Duration as ChronoDuration;
    use mockito::Matcher;

    const SOURCE: i64 = -200;
    const ADMIN: i64 = -100;

    fn update(raw: serde_json::Value) -> Update {
        serde_json::from_value(raw).unwrap()
    }

    fn bot(engine: Arc<ActivityEngine>, replies: Arc<RecordingSink>) -> TelegramBot {
        let sessions = Arc::new(AdminSessions::new(ChronoDuration::minutes(5)));
        let desk = Arc::new(AdminDesk::new(engine.clone(), sessions, ADMIN));
        TelegramBot::new(
            engine,
            desk,
            replies,
            Channels {
                admin: ADMIN,
                source: SOURCE,
                report: REPORT_CHAT,
            },
        )
    }

    #[tokio::test]
    async fn send_message_posts_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botTEST/sendMessage")
            .match_body(Matcher::PartialJson(json!({ "chat_id": -500, "text": "hi" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"result":{"message_id":1}}"#)
            .create_async()
            .await;

        let client = TelegramClient::new(&server.url(), "TEST").unwrap();
        client.send(-500, "hi").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn send_message_surfaces_api_rejection() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/botTEST/sendMessage")
            .with_status(400)
            .with_body(r#"{"ok":false,"description":"Bad Request: chat not found"}"#)
            .create_async()
            .await;

        let client = TelegramClient::new(&server.url(), "TEST").unwrap();
        let err = client.send_message(1, "x").await.unwrap_err();
        match err {
            NotificationError::Rejected { status, body, .. } => {
                assert_eq!(status, 400);
                assert!(body.contains("chat not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn get_updates_parses_photo_messages() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/botTEST/getUpdates")
            .match_body(Matcher::PartialJson(json!({ "offset": 10, "timeout": 0 })))
            .with_status(200)
            .with_body(
                r#"{"ok":true,"result":[
                    {"update_id":10,"message":{"message_id":1,"chat":{"id":-200},
                     "from":{"id":42,"username":"alice","first_name":"A"},
                     "photo":[{"file_id":"x","width":1,"height":1}]}},
                    {"update_id":11}
                ]}"#,
            )
            .create_async()
            .await;

        let client = TelegramClient::new(&server.url(), "TEST").unwrap();
        let updates = client.get_updates(10, 0).await.unwrap();
        assert_eq!(updates.len(), 2);
        let msg = updates[0].message.as_ref().unwrap();
        assert!(msg.has_photo());
        assert_eq!(msg.from.as_ref().unwrap().username.as_deref(), Some("alice"));
        assert!(updates[1].message.is_none());
    }

    #[test]
    fn empty_token_is_a_config_error() {
        assert!(matches!(
            TelegramClient::new("https://api.telegram.org", " "),
            Err(ConfigError::MissingKey(_))
        ));
    }

    #[tokio::test]
    async fn photo_in_source_chat_records_activity_and_acks() {
        let h = harness(45);
        let replies = Arc::new(RecordingSink::new());
        let bot = bot(h.engine.clone(), replies.clone());

        bot.handle_update(&update(json!({
            "update_id": 1,
            "message": {"message_id": 5, "chat": {"id": SOURCE},
                        "from": {"id": 42, "username": "alice"},
                        "photo": [{"file_id": "p"}]}
        })))
        .await;

        let rows = h.db.list_participants().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 42);
        assert_eq!(rows[0].last_active_at, t0());
        assert_eq!(replies.sent_to(SOURCE), vec![PHOTO_ACK.to_string()]);
    }

    #[tokio::test]
    async fn text_in_source_chat_is_not_activity() {
        let h = harness(45);
        let replies = Arc::new(RecordingSink::new());
        let bot = bot(h.engine.clone(), replies.clone());

        bot.handle_update(&update(json!({
            "update_id": 1,
            "message": {"message_id": 5, "chat": {"id": SOURCE},
                        "from": {"id": 42}, "text": "/ignore 42"}
        })))
        .await;

        assert!(h.db.list_participants().unwrap().is_empty());
        assert!(h.db.list_ignored().unwrap().is_empty());
        assert!(replies.sent().is_empty());
    }

    #[tokio::test]
    async fn admin_text_is_answered_and_foreign_commands_denied() {
        let h = harness(45);
        let replies = Arc::new(RecordingSink::new());
        let bot = bot(h.engine.clone(), replies.clone());

        bot.handle_update(&update(json!({
            "update_id": 1,
            "message": {"message_id": 1, "chat": {"id": ADMIN}, "text": "/ignore 9"}
        })))
        .await;
        bot.handle_update(&update(json!({
            "update_id": 2,
            "message": {"message_id": 2, "chat": {"id": 777}, "text": "/unignore 9"}
        })))
        .await;

        assert_eq!(
            replies.sent_to(ADMIN),
            vec!["User 9 added to the ignore list.".to_string()]
        );
        assert!(replies.sent_to(777).is_empty());
        assert!(h.db.list_ignored().unwrap().contains(&9));
    }
}
