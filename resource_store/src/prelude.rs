//! Convenience re-exports for common resource-store usage

pub use crate::resource::Resource;
pub use crate::store::ResourceStore;
pub use crate::validation::validate_content;

// Transaction layer types every store caller touches
pub use tx_system::prelude::*;

// Common external dependencies that are frequently used
pub use serde_json::json;
