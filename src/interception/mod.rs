/*!
 * Interception Module
 * Registration, cold/hot partitioning and serialization of API interceptions
 *
 * ## Usage
 * ```ignore
 * use sandbox_core::interception::*;
 *
 * let mut manager = InterceptionManager::new();
 * manager.add_to_patched_functions(
 *     "kernel32.dll",
 *     "CreateFileW",
 *     InterceptionType::Eat,
 *     Interceptor::symbol("TargetCreateFileW").unwrap(),
 * )?;
 *
 * let mut buffer = vec![0u8; manager.get_buffer_size()];
 * manager.setup_config_buffer(&mut buffer)?;
 * ```
 */

mod buffer;
mod classify;
mod manager;
mod reader;
mod target;
mod types;

pub use buffer::{ConfigBufferBuilder, DLL_GROUP_UNLOAD};
pub use classify::{classify, ColdModulePolicy, LocalModulePolicy};
pub use manager::InterceptionManager;
pub use reader::{
    ConfigBufferReader, DecodedConfig, DecodedDllGroup, DecodedFunction, DllGroupView,
    FunctionView,
};
pub use target::{SimulatedTarget, TargetProcess};
pub use types::{
    BufferError, BufferResult, InterceptionError, InterceptionRecord, InterceptionResult,
    InterceptionSummary, InterceptionType, Interceptor, Placement,
};
