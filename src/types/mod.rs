// src/types/mod.rs - Core event and record types shared across the bot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classified updates delivered by the chat transport.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    MemberJoined { chat_guid: String, user_guid: String },
    MemberLeft { chat_guid: String, user_guid: String },
    Message(IncomingMessage),
}

/// Message kinds as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Gif,
    Image,
    Voice,
    Video,
    File,
}

/// A single inbound chat message, normalized from the transport's update format.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Chat the message was posted in. Equal to `sender_guid` in a private conversation.
    pub chat_guid: String,
    pub sender_guid: String,
    pub message_id: String,
    pub kind: MessageKind,
    pub text: String,
    /// Message id this message replies to, if any.
    pub reply_to: Option<String>,
    /// Attachment details, present for `MessageKind::File`.
    pub file: Option<FileInfo>,
}

impl IncomingMessage {
    pub fn is_text(&self) -> bool {
        self.kind == MessageKind::Text
    }

    /// Private one-to-one conversations report the sender as the chat object.
    pub fn is_private(&self) -> bool {
        self.chat_guid == self.sender_guid
    }
}

/// Attachment metadata for file messages.
#[derive(Debug, Clone, Default)]
pub struct FileInfo {
    pub mime_type: String,
    pub is_story: bool,
}

/// Per-user record, created on join or on first observed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub join_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub messages_count: u64,
    #[serde(default)]
    pub warnings: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub original_content: Option<String>,
}

impl Default for UserRecord {
    fn default() -> Self {
        Self {
            name: String::new(),
            join_date: None,
            messages_count: 0,
            warnings: 0,
            title: String::new(),
            role: default_role(),
            original_content: None,
        }
    }
}

fn default_role() -> String {
    "member".to_string()
}

/// Marker stored in `UserRecord::role` by the promote-special command.
pub const SPECIAL_ROLE: &str = "special";

/// The closed set of toggleable content filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Gif,
    Story,
    Photo,
    Voice,
    Video,
    OtherFiles,
}

impl FilterKind {
    pub const ALL: [FilterKind; 6] = [
        FilterKind::Gif,
        FilterKind::Story,
        FilterKind::Photo,
        FilterKind::Voice,
        FilterKind::Video,
        FilterKind::OtherFiles,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::Gif => "gif",
            FilterKind::Story => "story",
            FilterKind::Photo => "photo",
            FilterKind::Voice => "voice",
            FilterKind::Video => "video",
            FilterKind::OtherFiles => "other_files",
        }
    }

    /// Parse a filter kind label. Unknown labels are rejected, never inserted.
    pub fn parse(label: &str) -> Option<FilterKind> {
        match label {
            "gif" => Some(FilterKind::Gif),
            "story" => Some(FilterKind::Story),
            "photo" => Some(FilterKind::Photo),
            "voice" => Some(FilterKind::Voice),
            "video" => Some(FilterKind::Video),
            "other_files" => Some(FilterKind::OtherFiles),
            _ => None,
        }
    }
}

/// Per-kind filter flags. A fixed struct rather than a string-keyed map so the
/// schema always contains exactly the six defined kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet {
    #[serde(default)]
    pub gif: bool,
    #[serde(default)]
    pub story: bool,
    #[serde(default)]
    pub photo: bool,
    #[serde(default)]
    pub voice: bool,
    #[serde(default)]
    pub video: bool,
    #[serde(default)]
    pub other_files: bool,
}

impl FilterSet {
    pub fn get(&self, kind: FilterKind) -> bool {
        match kind {
            FilterKind::Gif => self.gif,
            FilterKind::Story => self.story,
            FilterKind::Photo => self.photo,
            FilterKind::Voice => self.voice,
            FilterKind::Video => self.video,
            FilterKind::OtherFiles => self.other_files,
        }
    }

    pub fn set(&mut self, kind: FilterKind, enabled: bool) {
        match kind {
            FilterKind::Gif => self.gif = enabled,
            FilterKind::Story => self.story = enabled,
            FilterKind::Photo => self.photo = enabled,
            FilterKind::Voice => self.voice = enabled,
            FilterKind::Video => self.video = enabled,
            FilterKind::OtherFiles => self.other_files = enabled,
        }
    }
}

/// Group-wide moderation settings, one instance per group scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupSettings {
    /// true: link violations ban the sender; false: delete the message only.
    #[serde(default)]
    pub strict_mode: bool,
    #[serde(default)]
    pub filters: FilterSet,
    /// Informational flag, no enforcement logic.
    #[serde(default)]
    pub voice_call_active: bool,
}

/// Identity of the running bot, used for self-message suppression and welcome text.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub guid: String,
    pub display_name: String,
}

/// User profile details fetched from the transport.
#[derive(Debug, Clone, Default)]
pub struct UserInfo {
    pub first_name: String,
    pub last_name: Option<String>,
}

impl UserInfo {
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

/// A previously posted message fetched by id, used to resolve reply targets.
#[derive(Debug, Clone)]
pub struct MessageInfo {
    pub message_id: String,
    pub author_guid: Option<String>,
}
