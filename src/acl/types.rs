/*!
 * ACL Types
 * Access masks, ACEs, binary ACLs, handles and errors
 */

use super::sid::Sid;
use crate::core::limits::{
    ACE_FIXED_BYTES, ACL_HEADER_BYTES, ACL_REVISION, ACL_REVISION_DS, MAX_ACL_BYTES,
};
use crate::core::types::OsErrorCode;
use bytes::BufMut;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use thiserror::Error;

/// ACL operation result
///
/// # Must Use
/// A failed ACL operation leaves the descriptor untouched and must be reported
#[must_use = "ACL operations can fail and must be handled"]
pub type AclResult<T> = Result<T, AclError>;

/// OS error for an unknown or closed handle
pub const ERROR_INVALID_HANDLE: OsErrorCode = 6;
/// OS error for a bad argument, such as the wrong object type
pub const ERROR_INVALID_PARAMETER: OsErrorCode = 87;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum AclError {
    #[error("Invalid SID: {0}")]
    InvalidSid(String),

    #[error("Malformed ACL at offset {offset}: {reason}")]
    MalformedAcl { offset: usize, reason: String },

    #[error("ACL of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },

    #[error("Access mode {0:?} is not supported; only grants can be appended")]
    UnsupportedAccessMode(AccessMode),

    #[error("{operation} failed with OS error {code}")]
    Os {
        operation: SecurityOperation,
        code: OsErrorCode,
    },
}

/// OS calls a helper can fail in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityOperation {
    GetTokenDefaultDacl,
    SetTokenDefaultDacl,
    GetTokenUser,
    GetObjectDacl,
    SetObjectDacl,
}

impl fmt::Display for SecurityOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SecurityOperation::GetTokenDefaultDacl => "GetTokenInformation(TokenDefaultDacl)",
            SecurityOperation::SetTokenDefaultDacl => "SetTokenInformation(TokenDefaultDacl)",
            SecurityOperation::GetTokenUser => "GetTokenInformation(TokenUser)",
            SecurityOperation::GetObjectDacl => "GetSecurityInfo",
            SecurityOperation::SetObjectDacl => "SetSecurityInfo",
        };
        f.write_str(name)
    }
}

/// Access rights bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessMask(u32);

impl AccessMask {
    pub const NONE: AccessMask = AccessMask(0);
    pub const DELETE: AccessMask = AccessMask(0x0001_0000);
    pub const READ_CONTROL: AccessMask = AccessMask(0x0002_0000);
    pub const WRITE_DAC: AccessMask = AccessMask(0x0004_0000);
    pub const WRITE_OWNER: AccessMask = AccessMask(0x0008_0000);
    pub const SYNCHRONIZE: AccessMask = AccessMask(0x0010_0000);
    pub const STANDARD_RIGHTS_REQUIRED: AccessMask = AccessMask(0x000F_0000);
    pub const GENERIC_ALL: AccessMask = AccessMask(0x1000_0000);
    pub const GENERIC_EXECUTE: AccessMask = AccessMask(0x2000_0000);
    pub const GENERIC_WRITE: AccessMask = AccessMask(0x4000_0000);
    pub const GENERIC_READ: AccessMask = AccessMask(0x8000_0000);

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        AccessMask(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: AccessMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for AccessMask {
    type Output = AccessMask;

    fn bitor(self, rhs: AccessMask) -> AccessMask {
        AccessMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for AccessMask {
    fn bitor_assign(&mut self, rhs: AccessMask) {
        self.0 |= rhs.0;
    }
}

/// How an entry is merged into an ACL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    Grant,
    Set,
    Deny,
    Revoke,
}

/// ACE inheritance flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AceFlags(u8);

impl AceFlags {
    pub const NO_INHERITANCE: AceFlags = AceFlags(0);
    pub const OBJECT_INHERIT: AceFlags = AceFlags(0x01);
    pub const CONTAINER_INHERIT: AceFlags = AceFlags(0x02);
    pub const NO_PROPAGATE_INHERIT: AceFlags = AceFlags(0x04);
    pub const INHERIT_ONLY: AceFlags = AceFlags(0x08);
    pub const INHERITED: AceFlags = AceFlags(0x10);

    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        AceFlags(bits)
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

/// Body of an access-allowed or access-denied entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessEntry {
    pub flags: AceFlags,
    pub mask: AccessMask,
    pub sid: Sid,
}

/// Entry kept byte-for-byte because its type is not interpreted here
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawAce {
    pub ace_type: u8,
    pub flags: u8,
    /// Everything after the 4-byte ACE header
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ace {
    AccessAllowed(AccessEntry),
    AccessDenied(AccessEntry),
    Raw(RawAce),
}

const ACCESS_ALLOWED_ACE_TYPE: u8 = 0;
const ACCESS_DENIED_ACE_TYPE: u8 = 1;
const ACE_HEADER_BYTES: usize = 4;

impl Ace {
    /// Grant entry that applies to the object itself only
    pub fn grant(sid: Sid, mask: AccessMask) -> Self {
        Ace::AccessAllowed(AccessEntry {
            flags: AceFlags::NO_INHERITANCE,
            mask,
            sid,
        })
    }

    pub fn byte_len(&self) -> usize {
        match self {
            Ace::AccessAllowed(entry) | Ace::AccessDenied(entry) => {
                ACE_FIXED_BYTES + entry.sid.byte_len()
            }
            Ace::Raw(raw) => ACE_HEADER_BYTES + raw.body.len(),
        }
    }

    pub fn sid(&self) -> Option<&Sid> {
        match self {
            Ace::AccessAllowed(entry) | Ace::AccessDenied(entry) => Some(&entry.sid),
            Ace::Raw(_) => None,
        }
    }

    fn write_to<B: BufMut>(&self, out: &mut B) {
        let size = self.byte_len() as u16;
        match self {
            Ace::AccessAllowed(entry) | Ace::AccessDenied(entry) => {
                let ace_type = if matches!(self, Ace::AccessAllowed(_)) {
                    ACCESS_ALLOWED_ACE_TYPE
                } else {
                    ACCESS_DENIED_ACE_TYPE
                };
                out.put_u8(ace_type);
                out.put_u8(entry.flags.bits());
                out.put_u16_le(size);
                out.put_u32_le(entry.mask.bits());
                entry.sid.write_to(out);
            }
            Ace::Raw(raw) => {
                out.put_u8(raw.ace_type);
                out.put_u8(raw.flags);
                out.put_u16_le(size);
                out.put_slice(&raw.body);
            }
        }
    }
}

/// Discretionary ACL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Acl {
    revision: u8,
    entries: Vec<Ace>,
}

impl Acl {
    pub fn new() -> Self {
        Self {
            revision: ACL_REVISION,
            entries: Vec::new(),
        }
    }

    pub fn from_entries(entries: Vec<Ace>) -> Self {
        Self {
            revision: ACL_REVISION,
            entries,
        }
    }

    pub fn entries(&self) -> &[Ace] {
        &self.entries
    }

    pub fn revision(&self) -> u8 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn byte_len(&self) -> usize {
        ACL_HEADER_BYTES + self.entries.iter().map(Ace::byte_len).sum::<usize>()
    }

    /// Copy of this ACL with `ace` appended; existing entries keep their order
    pub fn with_appended(&self, ace: Ace) -> AclResult<Acl> {
        let mut entries = Vec::with_capacity(self.entries.len() + 1);
        entries.extend_from_slice(&self.entries);
        entries.push(ace);
        let acl = Acl {
            revision: self.revision,
            entries,
        };
        acl.check_size()?;
        Ok(acl)
    }

    /// Whether `base`'s entries are an unchanged prefix of this ACL's entries
    pub fn extends(&self, base: &Acl) -> bool {
        self.entries.starts_with(&base.entries)
    }

    pub fn grants(&self, sid: &Sid, mask: AccessMask) -> bool {
        self.entries.iter().any(|ace| match ace {
            Ace::AccessAllowed(entry) => entry.sid == *sid && entry.mask.contains(mask),
            _ => false,
        })
    }

    fn check_size(&self) -> AclResult<()> {
        let size = self.byte_len();
        if size > MAX_ACL_BYTES || self.entries.len() > u16::MAX as usize {
            return Err(AclError::TooLarge {
                size,
                max: MAX_ACL_BYTES,
            });
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> AclResult<Vec<u8>> {
        self.check_size()?;
        let size = self.byte_len();
        let mut out = Vec::with_capacity(size);
        out.put_u8(self.revision);
        out.put_u8(0);
        out.put_u16_le(size as u16);
        out.put_u16_le(self.entries.len() as u16);
        out.put_u16_le(0);
        for ace in &self.entries {
            ace.write_to(&mut out);
        }
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> AclResult<Acl> {
        let malformed = |offset: usize, reason: String| AclError::MalformedAcl { offset, reason };

        if bytes.len() < ACL_HEADER_BYTES {
            return Err(malformed(0, format!("{} bytes is shorter than the header", bytes.len())));
        }
        let revision = bytes[0];
        if !(ACL_REVISION..=ACL_REVISION_DS).contains(&revision) {
            return Err(malformed(0, format!("unknown revision {revision}")));
        }
        let size = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
        let count = u16::from_le_bytes([bytes[4], bytes[5]]) as usize;
        if size < ACL_HEADER_BYTES || size > bytes.len() {
            return Err(malformed(2, format!("size {size} outside the {} byte buffer", bytes.len())));
        }

        let mut entries = Vec::with_capacity(count);
        let mut offset = ACL_HEADER_BYTES;
        for _ in 0..count {
            if offset + ACE_HEADER_BYTES > size {
                return Err(malformed(offset, "truncated ACE header".into()));
            }
            let ace_type = bytes[offset];
            let flags = bytes[offset + 1];
            let ace_size = u16::from_le_bytes([bytes[offset + 2], bytes[offset + 3]]) as usize;
            if ace_size < ACE_HEADER_BYTES || ace_size % 4 != 0 || offset + ace_size > size {
                return Err(malformed(offset, format!("invalid ACE size {ace_size}")));
            }
            let body = &bytes[offset + ACE_HEADER_BYTES..offset + ace_size];

            let ace = match ace_type {
                ACCESS_ALLOWED_ACE_TYPE | ACCESS_DENIED_ACE_TYPE => {
                    if body.len() < 4 {
                        return Err(malformed(offset, "missing access mask".into()));
                    }
                    let mask = AccessMask(u32::from_le_bytes([body[0], body[1], body[2], body[3]]));
                    let (sid, sid_len) = Sid::from_bytes(&body[4..])
                        .map_err(|e| malformed(offset, e.to_string()))?;
                    if 4 + sid_len != body.len() {
                        return Err(malformed(offset, "SID does not fill the ACE".into()));
                    }
                    let entry = AccessEntry {
                        flags: AceFlags(flags),
                        mask,
                        sid,
                    };
                    if ace_type == ACCESS_ALLOWED_ACE_TYPE {
                        Ace::AccessAllowed(entry)
                    } else {
                        Ace::AccessDenied(entry)
                    }
                }
                _ => Ace::Raw(RawAce {
                    ace_type,
                    flags,
                    body: body.to_vec(),
                }),
            };
            entries.push(ace);
            offset += ace_size;
        }

        Ok(Acl { revision, entries })
    }
}

impl Default for Acl {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque token handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenHandle(pub u64);

/// Opaque securable object handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectHandle(pub u64);

/// Kind of securable object behind an `ObjectHandle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    File,
    Service,
    RegistryKey,
    KernelObject,
    WindowObject,
}

impl ObjectType {
    /// `SE_OBJECT_TYPE` value
    pub const fn code(self) -> i32 {
        match self {
            ObjectType::File => 1,
            ObjectType::Service => 2,
            ObjectType::RegistryKey => 4,
            ObjectType::KernelObject => 6,
            ObjectType::WindowObject => 7,
        }
    }
}
