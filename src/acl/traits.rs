/*!
 * Security API Traits
 * OS seam for reading and committing token and object DACLs
 */

use super::sid::Sid;
use super::types::{Acl, AclResult, ObjectHandle, ObjectType, TokenHandle};

/// Token and object security descriptor access
///
/// A `None` DACL is a null DACL (no restrictions). The `set_*` calls are the
/// only ones that change OS state.
pub trait SecurityApi: Send + Sync {
    /// Default DACL applied to objects the token creates
    fn token_default_dacl(&self, token: TokenHandle) -> AclResult<Option<Acl>>;

    fn set_token_default_dacl(&self, token: TokenHandle, dacl: &Acl) -> AclResult<()>;

    /// User SID the token runs as
    fn token_user(&self, token: TokenHandle) -> AclResult<Sid>;

    fn object_dacl(&self, object: ObjectHandle, object_type: ObjectType) -> AclResult<Option<Acl>>;

    fn set_object_dacl(
        &self,
        object: ObjectHandle,
        object_type: ObjectType,
        dacl: &Acl,
    ) -> AclResult<()>;
}
