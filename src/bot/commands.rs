// src/bot/commands.rs - Self-service, reply-target admin, and group-wide settings commands

use anyhow::Result;
use log::{debug, warn};
use std::sync::Arc;

use crate::bot::mutes::MuteScheduler;
use crate::bot::notify;
use crate::bot::storage::UserStore;
use crate::platforms::{AdminAction, ChatTransport, PinAction};
use crate::types::{FilterKind, IncomingMessage, SPECIAL_ROLE};

// Command labels and notices are Persian; the bot serves Persian-language groups.
const CMD_STATS: &str = "آمارم";
const CMD_ORIGINAL: &str = "اصل";
const ORIGINAL_PREFIX: &str = "اصل ";
const CMD_BAN: &str = "بن";
const CMD_DEMOTE: &str = "ادمین معمولی";
const CMD_PROMOTE_SPECIAL: &str = "ویژه";
const TITLE_PREFIX: &str = "لقب ";
const MUTE_PREFIX: &str = "سکوت ";
const CMD_STRICT_ON: &str = "سختگیرانه فعال";
const CMD_STRICT_OFF: &str = "سختگیرانه خاموش";
const CMD_VOICE_CALL_ON: &str = "ویسکال فعال";
const CMD_VOICE_CALL_OFF: &str = "ویسکال غیرفعال";
const CMD_PIN: &str = "پین";
const CMD_UNPIN: &str = "آنپین";

const GROUP_LINK_PREFIX: &str = "https://rubika.ir/g/";

const MUTE_USAGE: &str =
    "لطفاً مدت زمان سکوت را به دقیقه و به صورت عدد صحیح وارد کنید (مثال: سکوت 1).";
const DIRECT_USAGE: &str =
    "لطفاً لینک دعوت گروه را به درستی ارسال کنید (مثال: https://rubika.ir/g/xxxxx).";

/// Group-wide commands that mutate settings or pin state, parsed from exact text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SettingsCommand {
    StrictMode(bool),
    Filter(FilterKind, bool),
    VoiceCall(bool),
    Pin(PinAction),
}

pub(crate) fn parse_settings_command(text: &str) -> Option<SettingsCommand> {
    match text {
        CMD_STRICT_ON => return Some(SettingsCommand::StrictMode(true)),
        CMD_STRICT_OFF => return Some(SettingsCommand::StrictMode(false)),
        CMD_VOICE_CALL_ON => return Some(SettingsCommand::VoiceCall(true)),
        CMD_VOICE_CALL_OFF => return Some(SettingsCommand::VoiceCall(false)),
        CMD_PIN => return Some(SettingsCommand::Pin(PinAction::Pin)),
        CMD_UNPIN => return Some(SettingsCommand::Pin(PinAction::Unpin)),
        _ => {}
    }
    filter_toggle(text).map(|(kind, enabled)| SettingsCommand::Filter(kind, enabled))
}

/// Parse the `فیلتر <kind> فعال/خاموش` toggle pairs. Unknown kind labels are
/// rejected here rather than inserted into the settings.
fn filter_toggle(text: &str) -> Option<(FilterKind, bool)> {
    let rest = text.strip_prefix("فیلتر ")?;
    let (label, enabled) = if let Some(label) = rest.strip_suffix(" فعال") {
        (label, true)
    } else if let Some(label) = rest.strip_suffix(" خاموش") {
        (label, false)
    } else {
        return None;
    };

    let kind = match label {
        "گیف" => FilterKind::Gif,
        "استوری" => FilterKind::Story,
        "عکس" => FilterKind::Photo,
        "ویس" => FilterKind::Voice,
        "ویدیو" => FilterKind::Video,
        "سایر" => FilterKind::OtherFiles,
        _ => return None,
    };
    Some((kind, enabled))
}

fn display_name(name: &str) -> &str {
    if name.is_empty() {
        "کاربر ناشناس"
    } else {
        name
    }
}

/// Resolves commands from message text plus reply-target context and executes
/// the permission-gated actions against the store, scheduler, and transport.
pub struct CommandInterpreter {
    store: Arc<UserStore>,
    mutes: Arc<MuteScheduler>,
}

impl CommandInterpreter {
    pub fn new(store: Arc<UserStore>, mutes: Arc<MuteScheduler>) -> Self {
        Self { store, mutes }
    }

    /// Commands any sender may issue, regardless of role. Returns whether one matched.
    pub async fn handle_self_service(
        &self,
        transport: &dyn ChatTransport,
        msg: &IncomingMessage,
    ) -> Result<bool> {
        if !msg.is_text() {
            return Ok(false);
        }
        let text = msg.text.as_str();

        if text == CMD_STATS {
            self.send_stats(transport, msg).await;
            return Ok(true);
        }

        if let Some(payload) = text.strip_prefix(ORIGINAL_PREFIX) {
            let payload = payload.trim();
            if payload.is_empty() {
                notify(
                    transport,
                    &msg.chat_guid,
                    "لطفاً بعد از 'اصل' متن اصلی خود را وارد کنید.",
                    Some(&msg.message_id),
                )
                .await;
            } else {
                let content = payload.to_string();
                self.store
                    .update(&msg.sender_guid, |r| r.original_content = Some(content))
                    .await?;
                notify(
                    transport,
                    &msg.chat_guid,
                    &format!("✅ اصل شما با موفقیت ثبت شد: '{}'", payload),
                    Some(&msg.message_id),
                )
                .await;
            }
            return Ok(true);
        }

        // The bare query echoes the sender's own content; when replying, the
        // reply-target variant takes over instead.
        if text == CMD_ORIGINAL && msg.reply_to.is_none() {
            let record = self.store.get(&msg.sender_guid).await;
            let content = record.original_content.as_deref().unwrap_or("ثبت نشده");
            notify(
                transport,
                &msg.chat_guid,
                &format!("اصل ثبت شده شما: '{}'", content),
                Some(&msg.message_id),
            )
            .await;
            return Ok(true);
        }

        Ok(false)
    }

    async fn send_stats(&self, transport: &dyn ChatTransport, msg: &IncomingMessage) {
        let record = self.store.get(&msg.sender_guid).await;
        let name = if record.name.is_empty() { "شما" } else { record.name.as_str() };
        // Live role check; a failed lookup reads as an ordinary member.
        let is_admin = transport
            .is_admin(&msg.chat_guid, &msg.sender_guid)
            .await
            .unwrap_or(false);
        let role = if is_admin { "ادمین" } else { "کاربر" };
        let title = if record.title.is_empty() { "ندارد" } else { record.title.as_str() };
        let original = if record.original_content.is_some() { "ثبت شده" } else { "ثبت نشده" };
        let join_date = record
            .join_date
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "نامشخص".to_string());

        let report = format!(
            "📊 آمار {}:\n📋 مقام: {}\n👑 لقب: {}\n💬 تعداد پیام‌ها: {}\n⚠️ اخطارها: {}\n📝 اصل: {}\n🕰️ تاریخ ورود: {}",
            name, role, title, record.messages_count, record.warnings, original, join_date
        );
        notify(transport, &msg.chat_guid, &report, Some(&msg.message_id)).await;
    }

    /// Commands scoped to the author of the replied-to message. The admin
    /// check runs once; a non-admin sender suppresses all of them.
    pub async fn handle_reply_commands(
        &self,
        transport: &dyn ChatTransport,
        msg: &IncomingMessage,
        target_guid: &str,
    ) -> Result<bool> {
        if !msg.is_text() {
            return Ok(false);
        }
        let text = msg.text.as_str();

        // Anyone may query the reply target's registered content.
        if text == CMD_ORIGINAL {
            let target = self.store.get(target_guid).await;
            let content = target.original_content.as_deref().unwrap_or("ثبت نشده");
            notify(
                transport,
                &msg.chat_guid,
                &format!("اصل ثبت شده توسط {}: '{}'", display_name(&target.name), content),
                Some(&msg.message_id),
            )
            .await;
            return Ok(true);
        }

        let is_reply_command = text == CMD_BAN
            || text == CMD_DEMOTE
            || text == CMD_PROMOTE_SPECIAL
            || text.starts_with(TITLE_PREFIX)
            || text.starts_with(MUTE_PREFIX);
        if !is_reply_command {
            return Ok(false);
        }

        if !transport
            .is_admin(&msg.chat_guid, &msg.sender_guid)
            .await
            .unwrap_or(false)
        {
            debug!("Ignoring reply command from non-admin {}", msg.sender_guid);
            return Ok(false);
        }

        let target_record = self.store.get(target_guid).await;
        let target_name = display_name(&target_record.name).to_string();

        if text == CMD_BAN {
            match transport.ban_member(&msg.chat_guid, target_guid).await {
                Ok(()) => {
                    self.store.delete(target_guid).await?;
                    notify(
                        transport,
                        &msg.chat_guid,
                        &format!("کاربر {} با موفقیت از گروه بن شد.", target_name),
                        None,
                    )
                    .await;
                }
                Err(e) => {
                    warn!("Failed to ban {}: {}", target_guid, e);
                    notify(
                        transport,
                        &msg.chat_guid,
                        &format!("خطا در بن کردن کاربر {}: {}", target_name, e),
                        Some(&msg.message_id),
                    )
                    .await;
                }
            }
            return Ok(true);
        }

        if text == CMD_DEMOTE {
            match transport
                .set_admin_role(&msg.chat_guid, target_guid, AdminAction::Revoke)
                .await
            {
                Ok(()) => {
                    notify(
                        transport,
                        &msg.chat_guid,
                        &format!("کاربر {} با موفقیت به ادمین معمولی تبدیل شد.", target_name),
                        None,
                    )
                    .await;
                }
                Err(e) => {
                    warn!("Failed to demote {}: {}", target_guid, e);
                    notify(
                        transport,
                        &msg.chat_guid,
                        &format!("خطا در تبدیل کاربر {} به ادمین معمولی: {}", target_name, e),
                        Some(&msg.message_id),
                    )
                    .await;
                }
            }
            return Ok(true);
        }

        // Local bookkeeping only, no transport call.
        if text == CMD_PROMOTE_SPECIAL {
            self.store
                .update(target_guid, |r| r.role = SPECIAL_ROLE.to_string())
                .await?;
            notify(
                transport,
                &msg.chat_guid,
                &format!("کاربر {} با موفقیت به ادمین ویژه تبدیل شد.", target_name),
                None,
            )
            .await;
            return Ok(true);
        }

        if let Some(payload) = text.strip_prefix(TITLE_PREFIX) {
            let title = payload.trim();
            if title.is_empty() {
                notify(
                    transport,
                    &msg.chat_guid,
                    "لطفاً بعد از 'لقب' لقب مورد نظر را وارد کنید.",
                    Some(&msg.message_id),
                )
                .await;
            } else {
                let value = title.to_string();
                self.store.update(target_guid, |r| r.title = value).await?;
                notify(
                    transport,
                    &msg.chat_guid,
                    &format!("✅ لقب کاربر {} با موفقیت به '{}' تغییر یافت.", target_name, title),
                    Some(&msg.message_id),
                )
                .await;
            }
            return Ok(true);
        }

        if let Some(payload) = text.strip_prefix(MUTE_PREFIX) {
            match payload.trim().parse::<i64>() {
                Ok(minutes) => match self.mutes.mute(target_guid, minutes).await {
                    Ok(_) => {
                        notify(
                            transport,
                            &msg.chat_guid,
                            &format!("کاربر {} به مدت {} دقیقه سکوت شد.", target_name, minutes),
                            None,
                        )
                        .await;
                    }
                    Err(_) => {
                        notify(transport, &msg.chat_guid, MUTE_USAGE, Some(&msg.message_id)).await;
                    }
                },
                Err(_) => {
                    notify(transport, &msg.chat_guid, MUTE_USAGE, Some(&msg.message_id)).await;
                }
            }
            return Ok(true);
        }

        Ok(false)
    }

    /// Group-wide settings commands. Admin-gated, no reply target required.
    pub async fn handle_settings(
        &self,
        transport: &dyn ChatTransport,
        msg: &IncomingMessage,
    ) -> Result<bool> {
        if !msg.is_text() {
            return Ok(false);
        }
        let command = match parse_settings_command(&msg.text) {
            Some(command) => command,
            None => return Ok(false),
        };

        if !transport
            .is_admin(&msg.chat_guid, &msg.sender_guid)
            .await
            .unwrap_or(false)
        {
            debug!("Ignoring settings command from non-admin {}", msg.sender_guid);
            return Ok(false);
        }

        match command {
            SettingsCommand::StrictMode(enabled) => {
                self.store.set_strict_mode(enabled).await?;
                let text = if enabled {
                    "⚙️ حالت سختگیرانه فعال شد. ارسال لینک منجر به بن کاربر می‌شود."
                } else {
                    "⚙️ حالت سختگیرانه غیرفعال شد. ارسال لینک منجر به حذف لینک می‌شود."
                };
                notify(transport, &msg.chat_guid, text, None).await;
            }
            SettingsCommand::Filter(kind, enabled) => {
                self.store.set_filter(kind, enabled).await?;
                let state = if enabled { "فعال" } else { "غیرفعال" };
                notify(
                    transport,
                    &msg.chat_guid,
                    &format!("✅ فیلتر {} {} شد.", kind.as_str(), state),
                    None,
                )
                .await;
            }
            SettingsCommand::VoiceCall(active) => {
                self.store.set_voice_call(active).await?;
                let text = if active {
                    "📞 ویسکال فعال شد."
                } else {
                    "🚫 ویسکال غیرفعال شد."
                };
                notify(transport, &msg.chat_guid, text, None).await;
            }
            SettingsCommand::Pin(action) => {
                self.handle_pin(transport, msg, action).await;
            }
        }

        Ok(true)
    }

    /// Pin/unpin reuses the current message's reply-to id as its target.
    async fn handle_pin(&self, transport: &dyn ChatTransport, msg: &IncomingMessage, action: PinAction) {
        let reply_id = match &msg.reply_to {
            Some(reply_id) => reply_id,
            None => {
                let hint = match action {
                    PinAction::Pin => {
                        "برای پین کردن، روی پیام مورد نظر ریپلای کنید و 'پین' را ارسال کنید."
                    }
                    PinAction::Unpin => {
                        "برای آنپین کردن، روی پیام مورد نظر ریپلای کنید و 'آنپین' را ارسال کنید."
                    }
                };
                notify(transport, &msg.chat_guid, hint, Some(&msg.message_id)).await;
                return;
            }
        };

        match transport.pin_message(&msg.chat_guid, reply_id, action).await {
            Ok(()) => {
                let text = match action {
                    PinAction::Pin => "✅ پیام با موفقیت پین شد.",
                    PinAction::Unpin => "✅ پیام با موفقیت آنپین شد.",
                };
                notify(transport, &msg.chat_guid, text, Some(&msg.message_id)).await;
            }
            Err(e) => {
                warn!("Failed to change pin state of {}: {}", reply_id, e);
                let text = match action {
                    PinAction::Pin => format!("خطا در پین کردن پیام: {}", e),
                    PinAction::Unpin => format!("خطا در آنپین کردن پیام: {}", e),
                };
                notify(transport, &msg.chat_guid, &text, Some(&msg.message_id)).await;
            }
        }
    }

    /// Private one-to-one conversations only accept a group invite link.
    pub async fn handle_direct(
        &self,
        transport: &dyn ChatTransport,
        msg: &IncomingMessage,
    ) -> Result<()> {
        let text = msg.text.trim();
        if text.starts_with(GROUP_LINK_PREFIX) {
            match transport.join_group(text).await {
                Ok(()) => {
                    notify(transport, &msg.sender_guid, "✅ با موفقیت به گروه مورد نظر جوین شدم!", None)
                        .await;
                }
                Err(e) => {
                    warn!("Failed to join group via invite link: {}", e);
                    notify(
                        transport,
                        &msg.sender_guid,
                        &format!("❌ خطایی در جوین شدن به گروه رخ داد: {}", e),
                        None,
                    )
                    .await;
                }
            }
        } else {
            notify(transport, &msg.sender_guid, DIRECT_USAGE, None).await;
        }
        Ok(())
    }
}
