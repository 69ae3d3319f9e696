use anyhow::Result;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{timeout, Duration};

use crate::platforms::ChatTransport;
use crate::types::{ChatEvent, FilterKind, IncomingMessage, UserRecord};

pub mod commands;
pub mod mutes;
pub mod rules;
pub mod storage;

use commands::CommandInterpreter;
use mutes::MuteScheduler;
use rules::{ContentViolation, RuleEngine};
use storage::UserStore;

/// Upper bound on the spam-path delete attempt. A timed-out delete is
/// abandoned, not treated as an error.
const SPAM_DELETE_TIMEOUT: Duration = Duration::from_millis(500);

/// Best-effort notice to the chat. Failures are logged, never propagated.
pub(crate) async fn notify(
    transport: &dyn ChatTransport,
    chat_guid: &str,
    text: &str,
    reply_to: Option<&str>,
) {
    if let Err(e) = transport.send_message(chat_guid, text, reply_to).await {
        warn!("Failed to send notice to {}: {}", chat_guid, e);
    }
}

/// Core moderation engine: classifies incoming events and runs the message
/// pipeline (spam check, mute check, commands, content policy) against shared
/// state owned here.
pub struct GroupBot {
    transport: Arc<dyn ChatTransport>,
    store: Arc<UserStore>,
    mutes: Arc<MuteScheduler>,
    rules: RuleEngine,
    commands: CommandInterpreter,
}

impl GroupBot {
    pub fn new(transport: Arc<dyn ChatTransport>, store: Arc<UserStore>) -> Result<Self> {
        let mutes = Arc::new(MuteScheduler::new());
        let commands = CommandInterpreter::new(Arc::clone(&store), Arc::clone(&mutes));

        Ok(Self {
            transport,
            store,
            mutes,
            rules: RuleEngine::new()?,
            commands,
        })
    }

    /// Consume the transport's event stream, dispatching each event on its own
    /// task. Per-event failures are logged and never stop the loop.
    pub async fn run(self: Arc<Self>, mut events: broadcast::Receiver<ChatEvent>) {
        info!("Moderation pipeline started");
        loop {
            match events.recv().await {
                Ok(event) => {
                    let bot = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = bot.handle_event(event).await {
                            error!("Event handling failed: {:#}", e);
                        }
                    });
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event receiver lagged by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Event stream closed");
                    break;
                }
            }
        }
    }

    /// Dispatch one classified event.
    pub async fn handle_event(&self, event: ChatEvent) -> Result<()> {
        match event {
            ChatEvent::MemberJoined { chat_guid, user_guid } => {
                self.handle_join(&chat_guid, &user_guid).await
            }
            ChatEvent::MemberLeft { chat_guid, user_guid } => {
                self.handle_leave(&chat_guid, &user_guid).await
            }
            ChatEvent::Message(msg) => self.handle_message(msg).await,
        }
    }

    async fn handle_join(&self, chat_guid: &str, user_guid: &str) -> Result<()> {
        // Profile lookup is best-effort; a failed fetch falls back to a
        // placeholder name rather than skipping the welcome.
        let name = match self.transport.get_user_info(user_guid).await {
            Ok(info) => info.full_name(),
            Err(e) => {
                debug!("Could not fetch profile of {}: {}", user_guid, e);
                "کاربر ناشناس".to_string()
            }
        };
        let join_date = chrono::Utc::now();

        let record_name = name.clone();
        self.store
            .update(user_guid, move |r| {
                *r = UserRecord {
                    name: record_name,
                    join_date: Some(join_date),
                    ..UserRecord::default()
                };
            })
            .await?;

        let welcome = format!(
            "سلام {} عزیز! به گروه **{}** خوش آمدید.\nتاریخ و زمان ورود: {}",
            name,
            self.transport.identity().display_name,
            join_date.format("%Y-%m-%d %H:%M:%S")
        );
        notify(self.transport.as_ref(), chat_guid, &welcome, None).await;
        Ok(())
    }

    async fn handle_leave(&self, chat_guid: &str, user_guid: &str) -> Result<()> {
        // The record is kept in case the user returns.
        let record = self.store.get(user_guid).await;
        let name = if record.name.is_empty() { "کاربر" } else { record.name.as_str() };
        notify(
            self.transport.as_ref(),
            chat_guid,
            &format!("کاربر {} گروه را ترک کرد.", name),
            None,
        )
        .await;
        Ok(())
    }

    /// Linear message pipeline with early exit: a stage that deletes or bans
    /// prevents every later stage from running for the same message.
    async fn handle_message(&self, msg: IncomingMessage) -> Result<()> {
        let transport = self.transport.as_ref();

        // The bot never moderates itself.
        if msg.sender_guid == transport.identity().guid {
            return Ok(());
        }

        // Hang/spam patterns get a bounded delete attempt; a timeout abandons
        // the delete but still terminates the pipeline for this message.
        if msg.is_text() && self.rules.is_hang_message(&msg.text) {
            match timeout(
                SPAM_DELETE_TIMEOUT,
                transport.delete_messages(&msg.chat_guid, std::slice::from_ref(&msg.message_id)),
            )
            .await
            {
                Ok(Ok(())) => {
                    info!("Deleted hang message {} from {}", msg.message_id, msg.sender_guid)
                }
                Ok(Err(e)) => warn!("Failed to delete hang message {}: {}", msg.message_id, e),
                Err(_) => debug!("Delete of hang message {} timed out, abandoning", msg.message_id),
            }
            return Ok(());
        }

        if self.mutes.is_muted(&msg.sender_guid).await {
            self.delete_message(&msg).await;
            return Ok(());
        }

        let mut handled = self.commands.handle_self_service(transport, &msg).await?;

        if !handled {
            if let Some(reply_id) = &msg.reply_to {
                if let Some(target_guid) = self.resolve_reply_author(&msg.chat_guid, reply_id).await
                {
                    handled = self
                        .commands
                        .handle_reply_commands(transport, &msg, &target_guid)
                        .await?;
                }
            }
        }

        if !handled {
            handled = self.commands.handle_settings(transport, &msg).await?;
        }

        // Private conversations only carry the join-link flow; the group
        // content policy does not apply there.
        if msg.is_private() && msg.is_text() && !handled {
            return self.commands.handle_direct(transport, &msg).await;
        }

        let settings = self.store.settings().await;
        match RuleEngine::content_violation(&msg, &settings) {
            Some(ContentViolation::Link) => {
                return self.enforce_link_policy(&msg).await;
            }
            Some(ContentViolation::SuspiciousText) => {
                self.delete_message(&msg).await;
                notify(transport, &msg.chat_guid, "پیام حاوی کد نامعتبر یا طولانی حذف شد.", None)
                    .await;
                return Ok(());
            }
            Some(ContentViolation::Filtered(kind)) => {
                self.delete_message(&msg).await;
                let text = match kind {
                    FilterKind::Story => "ارسال استوری مجاز نیست.".to_string(),
                    FilterKind::OtherFiles => "ارسال سایر فایل‌ها مجاز نیست.".to_string(),
                    other => format!("ارسال {} مجاز نیست.", other.as_str()),
                };
                notify(transport, &msg.chat_guid, &text, None).await;
                return Ok(());
            }
            None => {}
        }

        // Count only text messages that survived moderation, so a stats report
        // issued right after joining still reads zero.
        if msg.is_text() {
            if let Err(e) = self.store.increment_messages(&msg.sender_guid).await {
                warn!("Failed to persist message counter for {}: {}", msg.sender_guid, e);
            }
        }

        Ok(())
    }

    /// Strict mode bans non-admin link senders and wipes their record;
    /// otherwise the message alone is deleted.
    async fn enforce_link_policy(&self, msg: &IncomingMessage) -> Result<()> {
        let transport = self.transport.as_ref();

        if self.store.strict_mode().await {
            let is_admin = transport
                .is_admin(&msg.chat_guid, &msg.sender_guid)
                .await
                .unwrap_or(false);
            if is_admin {
                return Ok(());
            }

            match transport.ban_member(&msg.chat_guid, &msg.sender_guid).await {
                Ok(()) => {
                    self.store.delete(&msg.sender_guid).await?;
                    notify(
                        transport,
                        &msg.chat_guid,
                        "کاربر به دلیل ارسال لینک در حالت سختگیرانه بن شد.",
                        None,
                    )
                    .await;
                }
                Err(e) => {
                    warn!("Failed to ban link sender {}: {}", msg.sender_guid, e);
                    notify(transport, &msg.chat_guid, &format!("خطا در بن کردن کاربر: {}", e), None)
                        .await;
                }
            }
        } else {
            self.delete_message(msg).await;
            notify(transport, &msg.chat_guid, "لینک ارسالی شما حذف شد.", None).await;
        }
        Ok(())
    }

    async fn delete_message(&self, msg: &IncomingMessage) {
        if let Err(e) = self
            .transport
            .delete_messages(&msg.chat_guid, std::slice::from_ref(&msg.message_id))
            .await
        {
            warn!("Failed to delete message {}: {}", msg.message_id, e);
        }
    }

    async fn resolve_reply_author(&self, chat_guid: &str, reply_id: &str) -> Option<String> {
        let ids = [reply_id.to_string()];
        match self.transport.get_messages_by_id(chat_guid, &ids).await {
            Ok(messages) => messages.into_iter().next().and_then(|m| m.author_guid),
            Err(e) => {
                debug!("Could not resolve reply target {}: {}", reply_id, e);
                None
            }
        }
    }
}
