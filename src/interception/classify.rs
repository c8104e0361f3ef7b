/*!
 * Cold/Hot Classification
 * Decides which interceptions the broker applies itself
 */

use super::types::{InterceptionRecord, InterceptionType, Placement};
use crate::core::limits::DEFAULT_LOCAL_MODULE;

/// Predicate for modules that must always be patched from the broker
pub trait ColdModulePolicy: Send + Sync {
    fn is_local_module(&self, module: &str) -> bool;
}

/// Classify a record; depends only on the record and the fixed policy
pub fn classify(record: &InterceptionRecord, policy: &dyn ColdModulePolicy) -> Placement {
    if record.technique == InterceptionType::ServiceCall || policy.is_local_module(&record.module) {
        Placement::Cold
    } else {
        Placement::Hot
    }
}

/// Name-list policy; case-insensitive, `.dll` suffix optional
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalModulePolicy {
    modules: Vec<String>,
}

impl LocalModulePolicy {
    pub fn new<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            modules: modules
                .into_iter()
                .map(|m| normalize_module(m.as_ref()))
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// Policy that treats nothing as local; only the technique decides
    pub fn none() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    pub fn modules(&self) -> &[String] {
        &self.modules
    }
}

impl Default for LocalModulePolicy {
    fn default() -> Self {
        Self::new([DEFAULT_LOCAL_MODULE])
    }
}

impl ColdModulePolicy for LocalModulePolicy {
    fn is_local_module(&self, module: &str) -> bool {
        let module = normalize_module(module);
        self.modules.iter().any(|m| *m == module)
    }
}

/// Comparison key for module names: trimmed, ASCII lowercase, `.dll` suffix dropped
pub(crate) fn normalize_module(module: &str) -> String {
    let lower = module.trim().to_ascii_lowercase();
    match lower.strip_suffix(".dll") {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}
