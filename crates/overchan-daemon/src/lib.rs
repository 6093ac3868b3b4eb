//! # overchan-daemon
//!
//! The relay daemon: configuration, the dispatcher hub wiring sessions
//! to store/index/expiration/fanout, and the `overchand` binary glue.

pub mod config;
pub mod daemon;
pub mod expire;
pub mod frontend;
pub mod moderation;

pub use config::{Args, Config, DaemonSection, FeedSection, PolicyEntry, StoreSection};
pub use daemon::Daemon;
pub use expire::{ExpirationCore, ExpireRequest};
pub use frontend::{frontend_allows_group, frontend_channels, FrontendClient, FrontendLink};
pub use moderation::ModerationQueue;
