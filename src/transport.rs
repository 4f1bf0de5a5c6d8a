//! Telegram-facing edge: inbound mapping, canned replies and the bot dispatcher.

pub mod inbound;
pub mod replies;
pub mod telegram;

pub use inbound::InboundMessage;
pub use telegram::{BotCommand, DeliveryMode, TelegramReplySink};
