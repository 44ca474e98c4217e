// Escrow-bypass moderation for a marketplace chat.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (in-memory, SQLite)
// - `host/` = Adapter that drives the services from the outside (stdin/stdout)

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with several mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
pub mod core;
#[path = "host/host_layer.rs"]
pub mod host;
#[path = "infra/infra_layer.rs"]
pub mod infra;
