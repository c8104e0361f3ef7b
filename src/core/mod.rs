/*!
 * Core Module
 * Fundamental types, limits and error handling shared by the sandbox core
 */

pub mod data_structures;
pub mod errors;
pub mod limits;
pub mod types;

// Re-export for convenience
pub use data_structures::InlineString;
pub use errors::*;
pub use types::*;
