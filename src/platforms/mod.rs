use anyhow::Result;
use async_trait::async_trait;

use crate::types::{BotIdentity, MessageInfo, UserInfo};

pub mod rubika;

/// Admin-role change requested through the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    Grant,
    Revoke,
}

/// Pin-state change requested through the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinAction {
    Pin,
    Unpin,
}

/// Capability set the moderation core consumes from the chat platform.
///
/// The core never talks to the wire directly; every side effect goes through
/// this trait so the pipeline can be exercised against a test double.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Post a message, optionally as a reply. Returns the new message id.
    async fn send_message(&self, chat_guid: &str, text: &str, reply_to: Option<&str>)
        -> Result<String>;

    /// Delete messages by id. Callers may impose their own timeout.
    async fn delete_messages(&self, chat_guid: &str, message_ids: &[String]) -> Result<()>;

    async fn get_user_info(&self, user_guid: &str) -> Result<UserInfo>;

    /// Whether the user currently holds admin rights in the chat.
    async fn is_admin(&self, chat_guid: &str, user_guid: &str) -> Result<bool>;

    /// Remove the user from the group.
    async fn ban_member(&self, chat_guid: &str, user_guid: &str) -> Result<()>;

    async fn set_admin_role(&self, chat_guid: &str, user_guid: &str, action: AdminAction)
        -> Result<()>;

    async fn pin_message(&self, chat_guid: &str, message_id: &str, action: PinAction)
        -> Result<()>;

    /// Fetch previously posted messages, used to resolve reply-target authors.
    async fn get_messages_by_id(&self, chat_guid: &str, message_ids: &[String])
        -> Result<Vec<MessageInfo>>;

    /// Join a group via invite link.
    async fn join_group(&self, invite_link: &str) -> Result<()>;

    /// Identity of the running bot account.
    fn identity(&self) -> &BotIdentity;
}
