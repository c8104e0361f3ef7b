/*!
 * ACL Module
 * SIDs, binary ACLs and helpers that widen token and object DACLs
 *
 * Helpers only ever append grant entries. The OS is reached through the
 * `SecurityApi` trait: `WindowsSecurityApi` on Windows, `SimulatedSecurityApi`
 * everywhere else and in tests.
 */

mod helpers;
mod sid;
mod simulation;
mod traits;
mod types;

#[cfg(windows)]
mod windows;

pub use helpers::{
    add_known_sid_to_kernel_object, add_known_sid_to_object, add_sid_to_dacl,
    add_sid_to_default_dacl, add_sid_to_object, add_user_sid_to_default_dacl, get_default_dacl,
};
pub use sid::{Sid, WellKnownSid};
pub use simulation::SimulatedSecurityApi;
pub use traits::SecurityApi;
pub use types::{
    AccessEntry, AccessMask, AccessMode, Ace, AceFlags, Acl, AclError, AclResult, ObjectHandle,
    ObjectType, RawAce, SecurityOperation, TokenHandle, ERROR_INVALID_HANDLE,
    ERROR_INVALID_PARAMETER,
};

#[cfg(windows)]
pub use windows::WindowsSecurityApi;

/// Security API for the current host
#[cfg(windows)]
pub fn platform_security_api() -> Box<dyn SecurityApi> {
    Box::new(WindowsSecurityApi::new())
}

/// Security API for the current host
#[cfg(not(windows))]
pub fn platform_security_api() -> Box<dyn SecurityApi> {
    Box::new(SimulatedSecurityApi::new())
}
