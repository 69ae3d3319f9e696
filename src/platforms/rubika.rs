// src/platforms/rubika.rs - Rubika messenger binding: websocket update feed + HTTPS API calls

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde_json::{json, Value};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use crate::platforms::{AdminAction, ChatTransport, PinAction};
use crate::types::{
    BotIdentity, ChatEvent, FileInfo, IncomingMessage, MessageInfo, MessageKind, UserInfo,
};

/// Configuration for the Rubika connection
#[derive(Debug, Clone)]
pub struct RubikaConfig {
    pub auth_token: String,
    pub api_url: String,
    pub ws_url: String,
    pub bot_guid: String,
    pub bot_name: String,
    pub data_file: PathBuf,
}

impl RubikaConfig {
    /// Load Rubika configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let auth_token =
            env::var("RUBIKA_AUTH").context("RUBIKA_AUTH environment variable not set")?;

        let bot_guid =
            env::var("RUBIKA_BOT_GUID").context("RUBIKA_BOT_GUID environment variable not set")?;

        let api_url = env::var("RUBIKA_API_URL")
            .unwrap_or_else(|_| "https://messengerg2c4.iranlms.ir/".to_string());

        let ws_url = env::var("RUBIKA_WS_URL")
            .unwrap_or_else(|_| "wss://msocket1.iranlms.ir:80/".to_string());

        let bot_name = env::var("RUBIKA_BOT_NAME").unwrap_or_else(|_| "RubiGuard".to_string());

        let data_file: PathBuf = env::var("RUBIGUARD_DATA_FILE")
            .unwrap_or_else(|_| "bot_data.json".to_string())
            .into();

        info!("Loaded Rubika config for bot '{}' ({})", bot_name, bot_guid);

        Ok(Self {
            auth_token,
            api_url,
            ws_url,
            bot_guid,
            bot_name,
            data_file,
        })
    }
}

/// Rubika connection: receives updates over a websocket and issues actions
/// through the JSON HTTPS API.
pub struct RubikaConnection {
    config: RubikaConfig,
    http: reqwest::Client,
    identity: BotIdentity,
    event_sender: Option<broadcast::Sender<ChatEvent>>,
    is_connected: Arc<RwLock<bool>>,
}

impl RubikaConnection {
    pub fn new(config: RubikaConfig) -> Self {
        let identity = BotIdentity {
            guid: config.bot_guid.clone(),
            display_name: config.bot_name.clone(),
        };

        Self {
            config,
            http: reqwest::Client::new(),
            identity,
            event_sender: None,
            is_connected: Arc::new(RwLock::new(false)),
        }
    }

    /// Open the websocket, authenticate, and start the update reader.
    pub async fn connect(&mut self) -> Result<()> {
        info!("Connecting to Rubika websocket...");

        let url = Url::parse(&self.config.ws_url).context("Failed to parse Rubika websocket URL")?;

        let (ws_stream, _) = connect_async(url)
            .await
            .context("Failed to connect to Rubika websocket")?;

        let (write, read) = ws_stream.split();
        let writer = Arc::new(RwLock::new(write));

        let handshake = json!({
            "api_version": "5",
            "auth": self.config.auth_token,
            "method": "handShake",
        })
        .to_string();
        writer
            .write()
            .await
            .send(Message::Text(handshake))
            .await
            .context("Failed to send handshake")?;

        let (tx, _) = broadcast::channel(1000);
        self.event_sender = Some(tx.clone());

        *self.is_connected.write().await = true;

        // Keepalive: the socket drops silently without periodic empty frames.
        {
            let writer = Arc::clone(&writer);
            let is_connected = Arc::clone(&self.is_connected);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
                loop {
                    interval.tick().await;
                    if !*is_connected.read().await {
                        break;
                    }
                    if let Err(e) = writer.write().await.send(Message::Text("{}".to_string())).await
                    {
                        warn!("Keepalive failed, stopping: {}", e);
                        break;
                    }
                }
            });
        }

        // Update reader
        let event_sender = tx;
        let is_connected = Arc::clone(&self.is_connected);
        tokio::spawn(async move {
            let mut read = read;
            info!("Rubika update reader started");

            loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        for event in parse_update(&text) {
                            if let Err(e) = event_sender.send(event) {
                                warn!("Failed to broadcast event: {}", e);
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(e) = writer.write().await.send(Message::Pong(payload)).await {
                            error!("Failed to send pong: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!("Websocket connection closed: {:?}", frame);
                        break;
                    }
                    Some(Ok(_)) => {
                        debug!("Ignoring non-text frame");
                    }
                    Some(Err(e)) => {
                        error!("Websocket error: {}", e);
                        break;
                    }
                    None => {
                        warn!("Websocket stream ended");
                        break;
                    }
                }
            }

            *is_connected.write().await = false;
            warn!("Rubika update reader exited");
        });

        info!("Connected to Rubika");
        Ok(())
    }

    /// Get a receiver for classified events. Available after `connect`.
    pub fn get_event_receiver(&self) -> Option<broadcast::Receiver<ChatEvent>> {
        self.event_sender.as_ref().map(|sender| sender.subscribe())
    }

    pub async fn is_connected(&self) -> bool {
        *self.is_connected.read().await
    }

    pub async fn disconnect(&mut self) {
        *self.is_connected.write().await = false;
        self.event_sender = None;
        info!("Disconnected from Rubika");
    }

    async fn api_call(&self, method: &str, input: Value) -> Result<Value> {
        let payload = json!({
            "api_version": "5",
            "auth": self.config.auth_token,
            "method": method,
            "input": input,
        });

        let response = self
            .http
            .post(&self.config.api_url)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Failed to call {}", method))?;

        let body: Value = response
            .json()
            .await
            .with_context(|| format!("Invalid response from {}", method))?;

        let status = body.get("status").and_then(Value::as_str).unwrap_or("UNKNOWN");
        if status != "OK" {
            return Err(anyhow!("{} returned status {}", method, status));
        }

        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl ChatTransport for RubikaConnection {
    async fn send_message(
        &self,
        chat_guid: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<String> {
        let mut input = json!({
            "object_guid": chat_guid,
            "text": text,
            "rnd": chrono::Utc::now().timestamp_millis().to_string(),
        });
        if let Some(reply_id) = reply_to {
            input["reply_to_message_id"] = Value::String(reply_id.to_string());
        }

        let data = self.api_call("sendMessage", input).await?;
        Ok(id_string(data.pointer("/message_update/message_id")).unwrap_or_default())
    }

    async fn delete_messages(&self, chat_guid: &str, message_ids: &[String]) -> Result<()> {
        self.api_call(
            "deleteMessages",
            json!({
                "object_guid": chat_guid,
                "message_ids": message_ids,
                "type": "Global",
            }),
        )
        .await?;
        Ok(())
    }

    async fn get_user_info(&self, user_guid: &str) -> Result<UserInfo> {
        let data = self.api_call("getUserInfo", json!({ "user_guid": user_guid })).await?;
        let user = data
            .get("user")
            .ok_or_else(|| anyhow!("getUserInfo response has no user"))?;

        Ok(UserInfo {
            first_name: user
                .get("first_name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            last_name: user
                .get("last_name")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
    }

    async fn is_admin(&self, chat_guid: &str, user_guid: &str) -> Result<bool> {
        let data = self
            .api_call("getGroupAdminMembers", json!({ "group_guid": chat_guid }))
            .await?;

        let admins = data
            .get("in_chat_members")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(admins.iter().any(|member| {
            member.get("member_guid").and_then(Value::as_str) == Some(user_guid)
        }))
    }

    async fn ban_member(&self, chat_guid: &str, user_guid: &str) -> Result<()> {
        self.api_call(
            "banGroupMember",
            json!({
                "group_guid": chat_guid,
                "member_guid": user_guid,
                "action": "Set",
            }),
        )
        .await?;
        Ok(())
    }

    async fn set_admin_role(
        &self,
        chat_guid: &str,
        user_guid: &str,
        action: AdminAction,
    ) -> Result<()> {
        let action = match action {
            AdminAction::Grant => "SetAdmin",
            AdminAction::Revoke => "UnsetAdmin",
        };
        self.api_call(
            "setGroupAdmin",
            json!({
                "group_guid": chat_guid,
                "member_guid": user_guid,
                "action": action,
            }),
        )
        .await?;
        Ok(())
    }

    async fn pin_message(&self, chat_guid: &str, message_id: &str, action: PinAction) -> Result<()> {
        let action = match action {
            PinAction::Pin => "Pin",
            PinAction::Unpin => "Unpin",
        };
        self.api_call(
            "setPinMessage",
            json!({
                "object_guid": chat_guid,
                "message_id": message_id,
                "action": action,
            }),
        )
        .await?;
        Ok(())
    }

    async fn get_messages_by_id(
        &self,
        chat_guid: &str,
        message_ids: &[String],
    ) -> Result<Vec<MessageInfo>> {
        let data = self
            .api_call(
                "getMessagesByID",
                json!({
                    "object_guid": chat_guid,
                    "message_ids": message_ids,
                }),
            )
            .await?;

        let messages = data.get("messages").and_then(Value::as_array).cloned().unwrap_or_default();

        Ok(messages
            .iter()
            .filter_map(|message| {
                Some(MessageInfo {
                    message_id: id_string(message.get("message_id"))?,
                    author_guid: message
                        .get("author_object_guid")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })
            })
            .collect())
    }

    async fn join_group(&self, invite_link: &str) -> Result<()> {
        // The API takes the trailing hash of the invite link.
        let hash_link = invite_link
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .ok_or_else(|| anyhow!("Invalid invite link: {}", invite_link))?;

        self.api_call("joinGroup", json!({ "hash_link": hash_link })).await?;
        Ok(())
    }

    fn identity(&self) -> &BotIdentity {
        &self.identity
    }
}

/// Parse one websocket frame into classified events. Membership updates fan
/// out to one event per affected member.
fn parse_update(raw: &str) -> Vec<ChatEvent> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            debug!("Ignoring unparsable frame: {}", e);
            return Vec::new();
        }
    };

    // Frames may carry a single update or a batch under message_updates.
    match value.get("message_updates").and_then(Value::as_array) {
        Some(updates) => updates.iter().flat_map(parse_one).collect(),
        None => parse_one(&value),
    }
}

fn parse_one(update: &Value) -> Vec<ChatEvent> {
    if update.get("update_type").and_then(Value::as_str) != Some("NewMessage") {
        return Vec::new();
    }
    let chat_guid = match update.get("object_guid").and_then(Value::as_str) {
        Some(guid) => guid.to_string(),
        None => return Vec::new(),
    };
    let message = match update.get("message") {
        Some(message) => message,
        None => return Vec::new(),
    };

    let kind_str = message.get("type").and_then(Value::as_str).unwrap_or("Text");

    if kind_str == "Event" {
        let event_data = match message.get("event_data") {
            Some(event_data) => event_data,
            None => return Vec::new(),
        };
        let peers: Vec<String> = event_data
            .get("peer_guids")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        return match event_data.get("type").and_then(Value::as_str) {
            Some("AddGroupMembers") => peers
                .into_iter()
                .map(|user_guid| ChatEvent::MemberJoined {
                    chat_guid: chat_guid.clone(),
                    user_guid,
                })
                .collect(),
            Some("RemoveGroupMembers") => peers
                .into_iter()
                .map(|user_guid| ChatEvent::MemberLeft {
                    chat_guid: chat_guid.clone(),
                    user_guid,
                })
                .collect(),
            _ => Vec::new(),
        };
    }

    let kind = match kind_str {
        "Text" => MessageKind::Text,
        "Gif" => MessageKind::Gif,
        "Image" => MessageKind::Image,
        "Voice" => MessageKind::Voice,
        "Video" => MessageKind::Video,
        "File" | "FileInline" => MessageKind::File,
        other => {
            debug!("Ignoring message type {}", other);
            return Vec::new();
        }
    };

    let message_id = match id_string(message.get("message_id")) {
        Some(id) => id,
        None => return Vec::new(),
    };

    let file = message.get("file_inline").map(|file_inline| FileInfo {
        mime_type: file_inline
            .get("mime")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        is_story: update
            .pointer("/message/metadata/is_story")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    });

    vec![ChatEvent::Message(IncomingMessage {
        chat_guid,
        sender_guid: message
            .get("author_object_guid")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        message_id,
        kind,
        text: message
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        reply_to: id_string(message.get("reply_to_message_id")),
        file,
    })]
}

/// Ids arrive as strings or bare numbers depending on the endpoint.
fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_message_update() {
        let raw = r#"{
            "update_type": "NewMessage",
            "object_guid": "g_123",
            "message": {
                "message_id": 42,
                "type": "Text",
                "text": "hello",
                "author_object_guid": "u_9",
                "reply_to_message_id": "41"
            }
        }"#;

        let events = parse_update(raw);
        assert_eq!(events.len(), 1);
        match &events[0] {
            ChatEvent::Message(msg) => {
                assert_eq!(msg.chat_guid, "g_123");
                assert_eq!(msg.sender_guid, "u_9");
                assert_eq!(msg.message_id, "42");
                assert_eq!(msg.kind, MessageKind::Text);
                assert_eq!(msg.text, "hello");
                assert_eq!(msg.reply_to.as_deref(), Some("41"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn membership_events_fan_out_per_member() {
        let raw = r#"{
            "update_type": "NewMessage",
            "object_guid": "g_123",
            "message": {
                "type": "Event",
                "event_data": {
                    "type": "AddGroupMembers",
                    "peer_guids": ["u_1", "u_2"]
                }
            }
        }"#;

        let events = parse_update(raw);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(e, ChatEvent::MemberJoined { .. })));
    }

    #[test]
    fn story_file_carries_attachment_metadata() {
        let raw = r#"{
            "update_type": "NewMessage",
            "object_guid": "g_123",
            "message": {
                "message_id": "7",
                "type": "File",
                "author_object_guid": "u_9",
                "file_inline": { "mime": "video/mp4" },
                "metadata": { "is_story": true }
            }
        }"#;

        let events = parse_update(raw);
        assert_eq!(events.len(), 1);
        match &events[0] {
            ChatEvent::Message(msg) => {
                assert_eq!(msg.kind, MessageKind::File);
                let file = msg.file.as_ref().expect("file info");
                assert_eq!(file.mime_type, "video/mp4");
                assert!(file.is_story);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn non_message_updates_are_ignored() {
        assert!(parse_update(r#"{"update_type": "UpdateChatCount"}"#).is_empty());
        assert!(parse_update("not json").is_empty());
        assert!(parse_update(r#"{"status": "OK"}"#).is_empty());
    }
}
