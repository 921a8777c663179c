pub mod attachments;
pub mod config;
pub mod filter;
pub mod intake;
pub mod message;
pub mod store;
pub mod telegram;

pub use config::{ReceiveMode, RelayMode, RuleFilterMode, Settings};
pub use filter::{BanAction, BanRule, Verdict};
pub use intake::IntakePipeline;
pub use message::{InboundEnvelope, ParsedMessage};
pub use store::{AccountDirectory, BlobStore, EmailStatus, MailStore, SettingsSource};
pub use telegram::{RelaySink, TelegramSink};
