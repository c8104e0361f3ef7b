/*!
 * ACL Helpers
 * Append a single grant entry to a token default DACL or an object DACL
 *
 * Each helper reads the current DACL, builds the widened copy and commits it
 * with one `set_*` call. Any failure before the commit leaves the OS state
 * untouched, and existing entries are never reordered or removed.
 */

use super::sid::{Sid, WellKnownSid};
use super::traits::SecurityApi;
use super::types::{AccessMask, AccessMode, Ace, Acl, AclError, AclResult, ObjectHandle, ObjectType, TokenHandle};
use crate::monitoring::span_operation;
use tracing::{debug, warn};

/// Current default DACL of `token`; `None` when it is null
pub fn get_default_dacl<A: SecurityApi + ?Sized>(
    api: &A,
    token: TokenHandle,
) -> AclResult<Option<Acl>> {
    api.token_default_dacl(token)
}

/// New ACL with `existing`'s entries followed by one non-inheriting grant
///
/// A null `existing` DACL yields a one-entry ACL.
pub fn add_sid_to_dacl(
    sid: &Sid,
    existing: Option<&Acl>,
    mode: AccessMode,
    access: AccessMask,
) -> AclResult<Acl> {
    if mode != AccessMode::Grant {
        return Err(AclError::UnsupportedAccessMode(mode));
    }
    let base = existing.cloned().unwrap_or_default();
    base.with_appended(Ace::grant(sid.clone(), access))
}

pub fn add_sid_to_default_dacl<A: SecurityApi + ?Sized>(
    api: &A,
    token: TokenHandle,
    sid: &Sid,
    access: AccessMask,
) -> AclResult<()> {
    let span = span_operation("add_sid_to_default_dacl");
    let _guard = span.enter();

    let result = get_default_dacl(api, token)
        .and_then(|current| add_sid_to_dacl(sid, current.as_ref(), AccessMode::Grant, access))
        .and_then(|dacl| {
            debug!(token = token.0, sid = %sid, entries = dacl.len(), "Committing token default DACL");
            api.set_token_default_dacl(token, &dacl)
        });

    if let Err(err) = &result {
        warn!(token = token.0, sid = %sid, error = %err, "Token default DACL left unchanged");
    }
    span.finish(result)
}

/// Grant the token's own user SID in its default DACL
pub fn add_user_sid_to_default_dacl<A: SecurityApi + ?Sized>(
    api: &A,
    token: TokenHandle,
    access: AccessMask,
) -> AclResult<()> {
    let user = api.token_user(token).map_err(|err| {
        warn!(token = token.0, error = %err, "Could not read token user");
        err
    })?;
    add_sid_to_default_dacl(api, token, &user, access)
}

/// Append a grant for `sid` to the DACL of an object of any type
pub fn add_sid_to_object<A: SecurityApi + ?Sized>(
    api: &A,
    object: ObjectHandle,
    object_type: ObjectType,
    sid: &Sid,
    access: AccessMask,
) -> AclResult<()> {
    let span = span_operation("add_sid_to_object");
    let _guard = span.enter();

    let result = api
        .object_dacl(object, object_type)
        .and_then(|current| add_sid_to_dacl(sid, current.as_ref(), AccessMode::Grant, access))
        .and_then(|dacl| {
            debug!(object = object.0, ?object_type, sid = %sid, entries = dacl.len(), "Committing object DACL");
            api.set_object_dacl(object, object_type, &dacl)
        });

    if let Err(err) = &result {
        warn!(object = object.0, ?object_type, sid = %sid, error = %err, "Object DACL left unchanged");
    }
    span.finish(result)
}

/// Append a grant for a well-known principal to an object's DACL
pub fn add_known_sid_to_object<A: SecurityApi + ?Sized>(
    api: &A,
    object: ObjectHandle,
    object_type: ObjectType,
    known: WellKnownSid,
    access: AccessMask,
) -> AclResult<()> {
    add_sid_to_object(api, object, object_type, &Sid::well_known(known), access)
}

/// Append a grant for `sid` to a kernel object's DACL
pub fn add_known_sid_to_kernel_object<A: SecurityApi + ?Sized>(
    api: &A,
    object: ObjectHandle,
    sid: &Sid,
    access: AccessMask,
) -> AclResult<()> {
    add_sid_to_object(api, object, ObjectType::KernelObject, sid, access)
}
