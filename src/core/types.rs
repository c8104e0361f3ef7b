/*!
 * Core Types
 * Common types used across the sandbox core
 */

/// Address inside the target process (interceptor entry points, module bases)
pub type Address = u64;

/// Wire code for an interception technique
pub type TechniqueCode = u32;

/// NT status code returned to an intercepted caller
pub type NtStatus = u32;

/// Win32 error code reported by a failed OS call
pub type OsErrorCode = u32;

/// Round `value` up to the next multiple of `alignment` (a power of two)
#[inline]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}
