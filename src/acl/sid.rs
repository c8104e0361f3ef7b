/*!
 * Security Identifiers
 * SIDs in string (S-1-...) and binary form, plus the well-known principals
 */

use super::types::{AclError, AclResult};
use crate::core::limits::{MAX_SID_SUB_AUTHORITIES, SID_HEADER_BYTES, SID_REVISION};
use bytes::BufMut;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Security identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sid {
    authority: u64,
    sub_authorities: Vec<u32>,
}

/// Principals the broker grants access to by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WellKnownSid {
    Null,
    World,
    CreatorOwner,
    Anonymous,
    AuthenticatedUsers,
    RestrictedCode,
    LocalSystem,
    BuiltinAdministrators,
    BuiltinUsers,
    UntrustedLabel,
    LowLabel,
    MediumLabel,
}

const MAX_AUTHORITY: u64 = (1 << 48) - 1;

impl Sid {
    pub fn new(authority: u64, sub_authorities: &[u32]) -> AclResult<Self> {
        if authority > MAX_AUTHORITY {
            return Err(AclError::InvalidSid(format!(
                "identifier authority {authority} does not fit in 48 bits"
            )));
        }
        if sub_authorities.len() > MAX_SID_SUB_AUTHORITIES {
            return Err(AclError::InvalidSid(format!(
                "{} sub-authorities, limit is {MAX_SID_SUB_AUTHORITIES}",
                sub_authorities.len()
            )));
        }
        Ok(Self {
            authority,
            sub_authorities: sub_authorities.to_vec(),
        })
    }

    pub fn well_known(kind: WellKnownSid) -> Self {
        let (authority, subs): (u64, &[u32]) = match kind {
            WellKnownSid::Null => (0, &[0]),
            WellKnownSid::World => (1, &[0]),
            WellKnownSid::CreatorOwner => (3, &[0]),
            WellKnownSid::Anonymous => (5, &[7]),
            WellKnownSid::AuthenticatedUsers => (5, &[11]),
            WellKnownSid::RestrictedCode => (5, &[12]),
            WellKnownSid::LocalSystem => (5, &[18]),
            WellKnownSid::BuiltinAdministrators => (5, &[32, 544]),
            WellKnownSid::BuiltinUsers => (5, &[32, 545]),
            WellKnownSid::UntrustedLabel => (16, &[0]),
            WellKnownSid::LowLabel => (16, &[0x1000]),
            WellKnownSid::MediumLabel => (16, &[0x2000]),
        };
        Self {
            authority,
            sub_authorities: subs.to_vec(),
        }
    }

    pub fn authority(&self) -> u64 {
        self.authority
    }

    pub fn sub_authorities(&self) -> &[u32] {
        &self.sub_authorities
    }

    /// Size of the binary form; always a multiple of four
    pub fn byte_len(&self) -> usize {
        SID_HEADER_BYTES + 4 * self.sub_authorities.len()
    }

    pub fn write_to<B: BufMut>(&self, out: &mut B) {
        out.put_u8(SID_REVISION);
        out.put_u8(self.sub_authorities.len() as u8);
        // Identifier authority is stored big-endian
        out.put_slice(&self.authority.to_be_bytes()[2..]);
        for sub in &self.sub_authorities {
            out.put_u32_le(*sub);
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        self.write_to(&mut out);
        out
    }

    /// Parse a binary SID from the start of `bytes`, returning it and its length
    pub fn from_bytes(bytes: &[u8]) -> AclResult<(Self, usize)> {
        if bytes.len() < SID_HEADER_BYTES {
            return Err(AclError::InvalidSid(format!(
                "{} bytes is shorter than a SID header",
                bytes.len()
            )));
        }
        if bytes[0] != SID_REVISION {
            return Err(AclError::InvalidSid(format!("unknown revision {}", bytes[0])));
        }
        let count = bytes[1] as usize;
        if count > MAX_SID_SUB_AUTHORITIES {
            return Err(AclError::InvalidSid(format!(
                "{count} sub-authorities, limit is {MAX_SID_SUB_AUTHORITIES}"
            )));
        }
        let len = SID_HEADER_BYTES + 4 * count;
        if bytes.len() < len {
            return Err(AclError::InvalidSid(format!(
                "truncated: {} of {len} bytes",
                bytes.len()
            )));
        }

        let mut authority = [0u8; 8];
        authority[2..].copy_from_slice(&bytes[2..8]);
        let sub_authorities = bytes[SID_HEADER_BYTES..len]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok((
            Self {
                authority: u64::from_be_bytes(authority),
                sub_authorities,
            },
            len,
        ))
    }
}

impl From<WellKnownSid> for Sid {
    fn from(kind: WellKnownSid) -> Self {
        Sid::well_known(kind)
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{SID_REVISION}-")?;
        if self.authority > u32::MAX as u64 {
            write!(f, "0x{:012X}", self.authority)?;
        } else {
            write!(f, "{}", self.authority)?;
        }
        for sub in &self.sub_authorities {
            write!(f, "-{sub}")?;
        }
        Ok(())
    }
}

impl FromStr for Sid {
    type Err = AclError;

    fn from_str(s: &str) -> AclResult<Self> {
        let invalid = || AclError::InvalidSid(s.to_string());

        let mut parts = s.trim().split('-');
        if !parts.next().is_some_and(|p| p.eq_ignore_ascii_case("s")) {
            return Err(invalid());
        }
        if parts.next() != Some("1") {
            return Err(invalid());
        }
        let authority = parts.next().ok_or_else(invalid)?;
        let authority = match authority
            .strip_prefix("0x")
            .or_else(|| authority.strip_prefix("0X"))
        {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => authority.parse::<u64>(),
        }
        .map_err(|_| invalid())?;

        let subs = parts
            .map(|p| p.parse::<u32>().map_err(|_| invalid()))
            .collect::<AclResult<Vec<_>>>()?;

        Sid::new(authority, &subs)
    }
}

impl TryFrom<String> for Sid {
    type Error = AclError;

    fn try_from(value: String) -> AclResult<Self> {
        value.parse()
    }
}

impl From<Sid> for String {
    fn from(sid: Sid) -> Self {
        sid.to_string()
    }
}
