//! `crownkeeper`: a room moderation bot that keeps rooms crowned.
//!
//! The [`Keeper`] owns every piece of mutable state (permission document, room connections,
//! crown flags, loop handles) and is driven by [`Event`]s. Sockets and timers live outside it
//! and only feed the event channel; see the `crownkeeperd` binary for the wiring.

pub mod auth;
pub mod command;
pub mod commands;
pub mod config;
pub mod conn;
pub mod crown;
pub mod cursor;
pub mod eval;
pub mod keeper;
pub mod loops;
pub mod rank;
pub mod reconnect;
pub mod reply;
pub mod router;
pub mod store;

pub use config::KeeperConfig;
pub use conn::{ConnId, LinkState, Transport};
pub use keeper::{Event, Keeper, Reconnect, EVENT_QUEUE};
pub use rank::Rank;
pub use store::PermissionStore;

/// Wall clock in ms since the epoch.
pub fn unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
