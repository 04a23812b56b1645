//! Chat transports.
//!
//! Only Telegram is wired up. Anything else plugs in by implementing
//! [`NotificationSink`](crate::notify::NotificationSink) for outbound
//! messages and feeding inbound photos and admin text into the engine and
//! [`AdminDesk`](crate::commands::AdminDesk).

pub mod telegram;

pub use telegram::{TelegramBot, TelegramClient, Update, PHOTO_ACK};
