/*!
 * Sandbox Core Configuration
 *
 * Cold-module list, evaluation options and rule limits used by the broker.
 */

use crate::core::limits::{DEFAULT_LOCAL_MODULE, MAX_POLICY_OPCODES};
use crate::interception::LocalModulePolicy;
use crate::policy::{EvalOptions, PolicyRule, RuleResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration result
#[must_use = "configuration loading can fail and must be handled"]
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// Broker-side configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct SandboxCoreConfig {
    /// Modules whose interceptions are always applied by the broker
    /// (default: the OS loader library)
    pub local_modules: Vec<String>,

    /// Abort evaluation on the first opcode error (default: true)
    pub stop_on_errors: bool,

    /// Short-circuit evaluation; evaluation refuses to run without it (default: true)
    pub short_circuit: bool,

    /// Largest rule accepted from the policy compiler (default: 1024)
    pub max_opcodes_per_rule: usize,
}

impl SandboxCoreConfig {
    /// Create default configuration
    pub fn new() -> Self {
        Self {
            local_modules: vec![DEFAULT_LOCAL_MODULE.to_string()],
            stop_on_errors: true,
            short_circuit: true,
            max_opcodes_per_rule: MAX_POLICY_OPCODES,
        }
    }

    /// Keep evaluating past opcode errors (diagnostics only)
    pub fn lenient() -> Self {
        Self {
            stop_on_errors: false,
            ..Self::new()
        }
    }

    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> ConfigResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(index) = self.local_modules.iter().position(|m| m.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "local_modules".into(),
                reason: format!("entry {index} is empty"),
            });
        }
        if self.max_opcodes_per_rule == 0 || self.max_opcodes_per_rule > MAX_POLICY_OPCODES {
            return Err(ConfigError::Invalid {
                field: "max_opcodes_per_rule".into(),
                reason: format!("must be within 1..={MAX_POLICY_OPCODES}"),
            });
        }
        Ok(())
    }

    pub fn cold_module_policy(&self) -> LocalModulePolicy {
        LocalModulePolicy::new(&self.local_modules)
    }

    /// Decode a transferred rule under this configuration's opcode cap
    pub fn decode_rule(&self, bytes: &[u8]) -> RuleResult<PolicyRule> {
        PolicyRule::from_bincode_with_limit(bytes, self.max_opcodes_per_rule)
    }

    pub fn eval_options(&self) -> EvalOptions {
        let mut options = EvalOptions::NONE;
        if self.short_circuit {
            options |= EvalOptions::SHORT_EVAL;
        }
        if self.stop_on_errors {
            options |= EvalOptions::STOP_ON_ERRORS;
        }
        options
    }
}

impl Default for SandboxCoreConfig {
    fn default() -> Self {
        Self::new()
    }
}
