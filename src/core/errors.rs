/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use crate::core::data_structures::InlineString;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Re-export module errors so callers can match on them from one place
pub use crate::acl::AclError;
pub use crate::config::ConfigError;
pub use crate::interception::{BufferError, InterceptionError};
pub use crate::policy::RuleError;

/// Unified sandbox core error type with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum SandboxCoreError {
    #[error("Policy rule error: {0}")]
    #[diagnostic(
        code(sandbox::policy_rule),
        help("The compiled rule is malformed. Rebuild it with PolicyRuleBuilder.")
    )]
    Rule(#[from] RuleError),

    #[error("Interception error: {0}")]
    #[diagnostic(
        code(sandbox::interception),
        help("Check the registered interceptions and the size of the config buffer.")
    )]
    Interception(#[from] InterceptionError),

    #[error("Interception buffer error: {0}")]
    #[diagnostic(
        code(sandbox::config_buffer),
        help("The serialized interception buffer failed validation and must not be used.")
    )]
    Buffer(#[from] BufferError),

    #[error("ACL error: {0}")]
    #[diagnostic(
        code(sandbox::acl),
        help("The security descriptor was left unchanged. Check the handle and its access rights.")
    )]
    Acl(#[from] AclError),

    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(sandbox::configuration),
        help("Invalid configuration. Review configuration parameters.")
    )]
    Config(#[from] ConfigError),
}

/// Serializable error representation for reporting to the broker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SerializableError {
    pub error_type: InlineString,
    pub message: InlineString,
}

impl SerializableError {
    pub fn new(error_type: impl Into<InlineString>, message: impl Into<InlineString>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
        }
    }
}

impl From<SandboxCoreError> for SerializableError {
    fn from(err: SandboxCoreError) -> Self {
        let error_type = match &err {
            SandboxCoreError::Rule(_) => "rule_error",
            SandboxCoreError::Interception(_) => "interception_error",
            SandboxCoreError::Buffer(_) => "buffer_error",
            SandboxCoreError::Acl(_) => "acl_error",
            SandboxCoreError::Config(_) => "configuration_error",
        };
        SerializableError::new(error_type, err.to_string())
    }
}

/// Result type for sandbox core operations
pub type Result<T> = std::result::Result<T, SandboxCoreError>;
