//! ps-core
//!
//! Domain models, the storage contract and the shared algorithms (paths,
//! cursors, concurrent map) both storage plugins build on.

pub mod context;
pub mod cursor;
pub mod error;
pub mod models;
pub mod path;
pub mod safemap;
pub mod traits;

// Re-exporting for easier access in other crates
pub use context::*;
pub use error::*;
pub use models::*;
pub use safemap::*;
pub use traits::*;
