// Core moderation module - escrow-bypass detection and case handling.
// Following the same pattern as the other core modules: models, logic, ports.

pub mod blocking_service;
pub mod classifier;
pub mod keywords;
pub mod moderation_models;
pub mod moderation_service;

pub use blocking_service::*;
pub use classifier::classify;
pub use moderation_models::*;
pub use moderation_service::*;
