/*!
 * System Limits and Constants
 *
 * Centralized location for limits, wire-layout sizes and magic numbers.
 * Organized by domain for maintainability and discoverability.
 *
 * - Security-critical constants are marked with [SECURITY]
 * - Values fixed by the cross-process buffer layout are marked with [WIRE]
 * - Values fixed by the Windows security descriptor format are marked with [WIN-COMPAT]
 */

// =============================================================================
// POLICY EVALUATION LIMITS
// =============================================================================

/// Maximum opcodes in a single compiled rule
/// [SECURITY] Bounds evaluation time inside an intercepted call
pub const MAX_POLICY_OPCODES: usize = 1024;

/// Maximum typed arguments captured from one intercepted call
/// Matches the widest broker IPC call signature
pub const MAX_CALL_PARAMETERS: usize = 9;

// =============================================================================
// INTERCEPTION BUFFER LAYOUT
// =============================================================================

/// Every record in the interception buffer starts on this boundary
/// [WIRE]
pub const CONFIG_BUFFER_ALIGNMENT: usize = 8;

/// Buffer header: dll group count, reserved word, interceptor base
/// [WIRE]
pub const CONFIG_HEADER_BYTES: usize = 16;

/// Fixed part of a dll group: record length, function offset, count, flags
/// [WIRE]
pub const DLL_GROUP_FIXED_BYTES: usize = 24;

/// Fixed part of a function record: record length, technique, reserved, address
/// [WIRE]
pub const FUNCTION_RECORD_FIXED_BYTES: usize = 24;

/// Largest interception buffer the builder writes and a reader accepts (1MB)
/// [SECURITY] Rejects absurd sizes before any writing or walking starts
pub const MAX_CONFIG_BUFFER_BYTES: usize = 1024 * 1024;

/// Dummy function name recorded for module unload requests
pub const UNLOAD_MODULE_FUNCTION: &str = "@";

/// Module that must always be patched from the broker (the OS loader library)
pub const DEFAULT_LOCAL_MODULE: &str = "ntdll.dll";

// =============================================================================
// SECURITY DESCRIPTOR LIMITS
// =============================================================================

/// ACL revision written for access-allowed/denied ACEs
/// [WIN-COMPAT]
pub const ACL_REVISION: u8 = 2;

/// ACL revision that allows object ACEs (accepted on read)
/// [WIN-COMPAT]
pub const ACL_REVISION_DS: u8 = 4;

/// ACL header: revision, sbz1, size, ace count, sbz2
/// [WIN-COMPAT]
pub const ACL_HEADER_BYTES: usize = 8;

/// ACE header plus access mask
/// [WIN-COMPAT]
pub const ACE_FIXED_BYTES: usize = 8;

/// Largest ACL the 16-bit size field can describe (DWORD aligned)
/// [WIN-COMPAT]
pub const MAX_ACL_BYTES: usize = 0xFFFC;

/// SID revision
/// [WIN-COMPAT]
pub const SID_REVISION: u8 = 1;

/// Maximum sub-authorities in a SID
/// [WIN-COMPAT]
pub const MAX_SID_SUB_AUTHORITIES: usize = 15;

/// SID header: revision, sub-authority count, identifier authority
/// [WIN-COMPAT]
pub const SID_HEADER_BYTES: usize = 8;
