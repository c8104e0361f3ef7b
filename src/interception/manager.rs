/*!
 * Interception Manager
 * Collects interceptions for one target and splits them between broker and child
 *
 * Cold interceptions (service calls and anything in a local module) are
 * applied by the broker. Hot interceptions are serialized into the config
 * buffer the child applies before running untrusted code.
 */

use super::buffer::ConfigBufferBuilder;
use super::classify::{classify, normalize_module, ColdModulePolicy, LocalModulePolicy};
use super::target::TargetProcess;
use super::types::{
    InterceptionError, InterceptionRecord, InterceptionResult, InterceptionSummary,
    InterceptionType, Interceptor, Placement,
};
use crate::config::SandboxCoreConfig;
use crate::core::data_structures::InlineString;
use crate::core::limits::UNLOAD_MODULE_FUNCTION;
use crate::core::types::Address;
use crate::monitoring::span_operation;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct InterceptionManager {
    policy: Arc<dyn ColdModulePolicy>,
    interceptions: Vec<InterceptionRecord>,
    unload_modules: Vec<InlineString>,
    interceptor_base: Address,
}

impl InterceptionManager {
    pub fn new() -> Self {
        Self::with_policy(Arc::new(LocalModulePolicy::default()))
    }

    pub fn with_policy(policy: Arc<dyn ColdModulePolicy>) -> Self {
        Self {
            policy,
            interceptions: Vec::new(),
            unload_modules: Vec::new(),
            interceptor_base: 0,
        }
    }

    pub fn from_config(config: &SandboxCoreConfig) -> Self {
        Self::with_policy(Arc::new(config.cold_module_policy()))
    }

    /// Register a function patch; duplicates are kept in registration order
    pub fn add_to_patched_functions(
        &mut self,
        module: impl Into<InlineString>,
        function: impl Into<InlineString>,
        technique: InterceptionType,
        interceptor: Interceptor,
    ) -> InterceptionResult<()> {
        let record = InterceptionRecord::new(module, function, technique, interceptor);

        let invalid = |reason: &str| InterceptionError::InvalidRecord {
            module: record.module.to_string(),
            function: record.function.to_string(),
            reason: reason.to_string(),
        };
        if record.module.trim().is_empty() {
            return Err(invalid("module name is empty"));
        }
        if record.function.trim().is_empty() {
            return Err(invalid("function name is empty"));
        }
        if record.module.contains('\0') {
            return Err(invalid("module name contains a nul byte"));
        }
        if record.function.contains('\0') {
            return Err(invalid("function name contains a nul byte"));
        }
        if record.interceptor.wire_name().contains('\0') {
            return Err(invalid("interceptor name contains a nul byte"));
        }
        if technique == InterceptionType::UnloadModule {
            return Err(invalid("use add_to_unload_modules to unload a module"));
        }
        if self.is_unload_module(&record.module) {
            return Err(InterceptionError::UnloadConflict {
                module: record.module.to_string(),
            });
        }

        debug!(record = %record, placement = ?classify(&record, self.policy.as_ref()), "Registered interception");
        self.interceptions.push(record);
        Ok(())
    }

    /// Ask the child to unmap `module` before it runs
    pub fn add_to_unload_modules(&mut self, module: impl Into<InlineString>) -> InterceptionResult<()> {
        let module = module.into();
        let invalid = |reason: &str| InterceptionError::InvalidRecord {
            module: module.to_string(),
            function: UNLOAD_MODULE_FUNCTION.to_string(),
            reason: reason.to_string(),
        };
        if module.trim().is_empty() {
            return Err(invalid("module name is empty"));
        }
        if module.contains('\0') {
            return Err(invalid("module name contains a nul byte"));
        }
        if self.policy.is_local_module(&module) {
            return Err(invalid("local modules cannot be unloaded"));
        }
        let key = normalize_module(&module);
        if self
            .interceptions
            .iter()
            .any(|r| normalize_module(&r.module) == key)
        {
            return Err(InterceptionError::UnloadConflict {
                module: module.to_string(),
            });
        }
        if !self.is_unload_module(&module) {
            debug!(module = %module, "Registered module unload");
            self.unload_modules.push(module);
        }
        Ok(())
    }

    /// Module names compare with the same normalization the cold policy uses
    fn is_unload_module(&self, module: &str) -> bool {
        let key = normalize_module(module);
        self.unload_modules
            .iter()
            .any(|m| normalize_module(m) == key)
    }

    pub fn cold_interceptions(&self) -> impl Iterator<Item = &InterceptionRecord> + '_ {
        self.interceptions
            .iter()
            .filter(move |r| classify(r, self.policy.as_ref()) == Placement::Cold)
    }

    pub fn hot_interceptions(&self) -> impl Iterator<Item = &InterceptionRecord> + '_ {
        self.interceptions
            .iter()
            .filter(move |r| classify(r, self.policy.as_ref()) == Placement::Hot)
    }

    pub fn unload_modules(&self) -> &[InlineString] {
        &self.unload_modules
    }

    /// Registered function patches (cold and hot)
    pub fn len(&self) -> usize {
        self.interceptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptions.is_empty() && self.unload_modules.is_empty()
    }

    /// Whether any hot interceptor is given by symbol name, so the child needs
    /// the main module's base address to resolve it
    pub fn names_used(&self) -> bool {
        self.hot_interceptions().any(|r| r.interceptor.is_symbol())
    }

    pub fn interceptor_base(&self) -> Address {
        self.interceptor_base
    }

    pub fn set_interceptor_base(&mut self, base: Address) {
        self.interceptor_base = base;
    }

    fn has_hot_work(&self) -> bool {
        !self.unload_modules.is_empty() || self.hot_interceptions().next().is_some()
    }

    fn builder(&self) -> ConfigBufferBuilder<'_> {
        let base = if self.names_used() { self.interceptor_base } else { 0 };
        let mut builder = ConfigBufferBuilder::new().with_interceptor_base(base);
        for record in self.hot_interceptions() {
            builder.add_function(record);
        }
        for module in &self.unload_modules {
            builder.add_unload(module);
        }
        builder
    }

    /// Exact size `setup_config_buffer` needs; 0 when nothing is hot
    pub fn get_buffer_size(&self) -> usize {
        if !self.has_hot_work() {
            return 0;
        }
        self.builder().required_size()
    }

    /// Serialize the hot set into `buffer` and return the bytes written
    ///
    /// On success the hot set is consumed and cold records stay registered.
    /// An undersized buffer is rejected before anything is written.
    pub fn setup_config_buffer(&mut self, buffer: &mut [u8]) -> InterceptionResult<usize> {
        if !self.has_hot_work() {
            return Ok(0);
        }
        let written = self.builder().write_into(buffer)?;
        self.consume_hot();
        Ok(written)
    }

    /// Owned variant of `setup_config_buffer`
    pub fn build_config_buffer(&mut self) -> InterceptionResult<Bytes> {
        if !self.has_hot_work() {
            return Ok(Bytes::new());
        }
        let bytes = self.builder().build()?;
        self.consume_hot();
        Ok(bytes)
    }

    fn consume_hot(&mut self) {
        let policy = Arc::clone(&self.policy);
        self.interceptions
            .retain(|r| classify(r, policy.as_ref()) == Placement::Cold);
        self.unload_modules.clear();
    }

    /// Push the hot set into a suspended target
    ///
    /// The cold set stays registered for the broker to apply. If the transfer
    /// fails nothing is consumed.
    pub fn initialize_interceptions(
        &mut self,
        target: &mut dyn TargetProcess,
    ) -> InterceptionResult<InterceptionSummary> {
        let span = span_operation("initialize_interceptions");
        let _guard = span.enter();

        let cold_functions = self.cold_interceptions().count();
        let hot_functions = self.hot_interceptions().count();

        if !self.has_hot_work() {
            info!(cold_functions, "No interceptions for the target to apply");
            span.record_result(true);
            return Ok(InterceptionSummary {
                cold_functions,
                ..InterceptionSummary::default()
            });
        }

        if self.names_used() {
            self.interceptor_base = target.main_module();
        }

        let builder = self.builder();
        let dll_groups = builder.dll_groups();
        let config = match builder.build() {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, "Config buffer could not be built");
                span.record_error(&err.to_string());
                return Err(err);
            }
        };

        let remote = match target.transfer_config(&config) {
            Ok(address) => address,
            Err(err) => {
                warn!(error = %err, bytes = config.len(), "Config transfer failed");
                span.record_error(&err.to_string());
                return Err(err);
            }
        };
        self.consume_hot();

        span.record_items_processed(hot_functions);
        span.record_result(true);
        info!(
            dll_groups,
            hot_functions,
            cold_functions,
            bytes = config.len(),
            remote_address = remote,
            "Interceptions transferred to target"
        );

        Ok(InterceptionSummary {
            dll_groups,
            hot_functions,
            cold_functions,
            bytes_written: config.len(),
            remote_address: Some(remote),
        })
    }
}

impl Default for InterceptionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InterceptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptionManager")
            .field("interceptions", &self.interceptions)
            .field("unload_modules", &self.unload_modules)
            .field("interceptor_base", &self.interceptor_base)
            .finish_non_exhaustive()
    }
}
