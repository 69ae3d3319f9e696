//! # Rubiguard
//!
//! A group moderation bot for the Rubika messenger, written in Rust.
//!
//! ## Features
//!
//! - **Spam Protection**: numeric/symbol/token flood patterns deleted within a bounded window
//! - **Content Policy**: link policy with strict mode, message hygiene, per-kind media filters
//! - **Admin Commands**: reply-scoped ban/mute/title/role commands plus group-wide toggles
//! - **Persistent Stats**: per-user message counters and settings that survive restarts
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rubiguard::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RubikaConfig::from_env()?;
//!     let store = Arc::new(UserStore::load(config.data_file.clone()).await);
//!
//!     let mut connection = RubikaConnection::new(config);
//!     connection.connect().await?;
//!     let events = connection.get_event_receiver().expect("connected");
//!
//!     let bot = Arc::new(GroupBot::new(Arc::new(connection), store)?);
//!     bot.run(events).await;
//!     Ok(())
//! }
//! ```

pub mod types;
pub mod platforms;
pub mod bot;

// Re-export commonly used items
pub mod prelude {
    pub use crate::bot::GroupBot;
    pub use crate::bot::storage::UserStore;
    pub use crate::bot::mutes::MuteScheduler;
    pub use crate::platforms::{
        ChatTransport,
        rubika::{RubikaConnection, RubikaConfig},
    };
    pub use crate::types::{
        ChatEvent, IncomingMessage, MessageKind, UserRecord, GroupSettings, FilterKind,
    };
    pub use anyhow::Result;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
