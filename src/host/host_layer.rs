// Host adapter - everything the binary needs to drive the core services
// from outside the process.

#[path = "commands.rs"]
pub mod commands;
#[path = "config.rs"]
pub mod config;

pub use commands::{serve, CommandHandler, HostCommand, HostResponse};
pub use config::HostConfig;
