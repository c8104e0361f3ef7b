/*!
 * Simulated Security API
 * In-memory tokens and objects for tests and non-Windows hosts
 *
 * DACLs are stored in their binary form, so every commit goes through the
 * same encoding and size checks a real descriptor would.
 */

use super::sid::Sid;
use super::traits::SecurityApi;
use super::types::{
    Acl, AclError, AclResult, ObjectHandle, ObjectType, SecurityOperation, TokenHandle,
    ERROR_INVALID_HANDLE, ERROR_INVALID_PARAMETER,
};
use crate::core::types::OsErrorCode;
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
struct SimulatedToken {
    user: Sid,
    default_dacl: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
struct SimulatedObject {
    object_type: ObjectType,
    dacl: Option<Vec<u8>>,
}

/// Simulation-backed security API
pub struct SimulatedSecurityApi {
    tokens: Arc<DashMap<TokenHandle, SimulatedToken, RandomState>>,
    objects: Arc<DashMap<ObjectHandle, SimulatedObject, RandomState>>,
    failures: Arc<DashMap<SecurityOperation, OsErrorCode, RandomState>>,
    next_handle: Arc<AtomicU64>,
    commits: Arc<AtomicUsize>,
}

impl SimulatedSecurityApi {
    pub fn new() -> Self {
        info!("Security API initialized (simulation mode)");
        Self {
            tokens: Arc::new(DashMap::with_hasher(RandomState::new())),
            objects: Arc::new(DashMap::with_hasher(RandomState::new())),
            failures: Arc::new(DashMap::with_hasher(RandomState::new())),
            next_handle: Arc::new(AtomicU64::new(0x100)),
            commits: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn allocate_handle(&self) -> u64 {
        // Handle values are multiples of four, like real kernel handles
        self.next_handle.fetch_add(4, Ordering::Relaxed)
    }

    pub fn create_token(&self, user: Sid, default_dacl: Option<&Acl>) -> AclResult<TokenHandle> {
        let default_dacl = default_dacl.map(Acl::to_bytes).transpose()?;
        let handle = TokenHandle(self.allocate_handle());
        self.tokens.insert(handle, SimulatedToken { user, default_dacl });
        Ok(handle)
    }

    pub fn create_object(
        &self,
        object_type: ObjectType,
        dacl: Option<&Acl>,
    ) -> AclResult<ObjectHandle> {
        let dacl = dacl.map(Acl::to_bytes).transpose()?;
        let handle = ObjectHandle(self.allocate_handle());
        self.objects.insert(handle, SimulatedObject { object_type, dacl });
        Ok(handle)
    }

    /// Make `operation` fail with `code` until cleared
    pub fn fail_on(&self, operation: SecurityOperation, code: OsErrorCode) {
        self.failures.insert(operation, code);
    }

    pub fn clear_failures(&self) {
        self.failures.clear();
    }

    /// Number of successful `set_*` calls
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::Relaxed)
    }

    fn check(&self, operation: SecurityOperation) -> AclResult<()> {
        match self.failures.get(&operation) {
            Some(code) => Err(AclError::Os {
                operation,
                code: *code,
            }),
            None => Ok(()),
        }
    }

    fn decode(stored: &Option<Vec<u8>>) -> AclResult<Option<Acl>> {
        stored.as_deref().map(Acl::from_bytes).transpose()
    }
}

impl Default for SimulatedSecurityApi {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SimulatedSecurityApi {
    fn clone(&self) -> Self {
        Self {
            tokens: Arc::clone(&self.tokens),
            objects: Arc::clone(&self.objects),
            failures: Arc::clone(&self.failures),
            next_handle: Arc::clone(&self.next_handle),
            commits: Arc::clone(&self.commits),
        }
    }
}

impl SecurityApi for SimulatedSecurityApi {
    fn token_default_dacl(&self, token: TokenHandle) -> AclResult<Option<Acl>> {
        let operation = SecurityOperation::GetTokenDefaultDacl;
        self.check(operation)?;
        let entry = self.tokens.get(&token).ok_or(AclError::Os {
            operation,
            code: ERROR_INVALID_HANDLE,
        })?;
        Self::decode(&entry.default_dacl)
    }

    fn set_token_default_dacl(&self, token: TokenHandle, dacl: &Acl) -> AclResult<()> {
        let operation = SecurityOperation::SetTokenDefaultDacl;
        self.check(operation)?;
        let bytes = dacl.to_bytes()?;
        let mut entry = self.tokens.get_mut(&token).ok_or(AclError::Os {
            operation,
            code: ERROR_INVALID_HANDLE,
        })?;
        entry.default_dacl = Some(bytes);
        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn token_user(&self, token: TokenHandle) -> AclResult<Sid> {
        let operation = SecurityOperation::GetTokenUser;
        self.check(operation)?;
        self.tokens
            .get(&token)
            .map(|entry| entry.user.clone())
            .ok_or(AclError::Os {
                operation,
                code: ERROR_INVALID_HANDLE,
            })
    }

    fn object_dacl(&self, object: ObjectHandle, object_type: ObjectType) -> AclResult<Option<Acl>> {
        let operation = SecurityOperation::GetObjectDacl;
        self.check(operation)?;
        let entry = self.objects.get(&object).ok_or(AclError::Os {
            operation,
            code: ERROR_INVALID_HANDLE,
        })?;
        if entry.object_type != object_type {
            return Err(AclError::Os {
                operation,
                code: ERROR_INVALID_PARAMETER,
            });
        }
        Self::decode(&entry.dacl)
    }

    fn set_object_dacl(
        &self,
        object: ObjectHandle,
        object_type: ObjectType,
        dacl: &Acl,
    ) -> AclResult<()> {
        let operation = SecurityOperation::SetObjectDacl;
        self.check(operation)?;
        let bytes = dacl.to_bytes()?;
        let mut entry = self.objects.get_mut(&object).ok_or(AclError::Os {
            operation,
            code: ERROR_INVALID_HANDLE,
        })?;
        if entry.object_type != object_type {
            return Err(AclError::Os {
                operation,
                code: ERROR_INVALID_PARAMETER,
            });
        }
        entry.dacl = Some(bytes);
        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
