/*!
 * Sandbox Core Library
 * Policy evaluation, API interception setup and DACL helpers for a broker/target sandbox
 */

pub mod acl;
pub mod config;
pub mod core;
pub mod interception;
pub mod monitoring;
pub mod policy;

// Re-exports
pub use crate::core::errors::{Result, SandboxCoreError, SerializableError};
pub use acl::{SecurityApi, SimulatedSecurityApi};
pub use config::SandboxCoreConfig;
pub use interception::{InterceptionManager, InterceptionType, Interceptor, TargetProcess};
pub use monitoring::init_tracing;
pub use policy::{EvalOptions, PolicyAction, PolicyProcessor, PolicyResult, PolicyRule};
