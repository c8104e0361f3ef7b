/*!
 * Windows Security API
 * Token and object DACL access through the Win32 security functions
 */

use super::sid::Sid;
use super::traits::SecurityApi;
use super::types::{
    Acl, AclError, AclResult, ObjectHandle, ObjectType, SecurityOperation, TokenHandle,
};
use std::ffi::c_void;
use std::ptr;
use windows_sys::Win32::Foundation::{GetLastError, LocalFree, ERROR_SUCCESS, HANDLE};
use windows_sys::Win32::Security::Authorization::{GetSecurityInfo, SetSecurityInfo};
use windows_sys::Win32::Security::{
    GetLengthSid, GetTokenInformation, SetTokenInformation, TokenDefaultDacl, TokenUser, ACL,
    DACL_SECURITY_INFORMATION, PSECURITY_DESCRIPTOR, TOKEN_DEFAULT_DACL, TOKEN_INFORMATION_CLASS,
    TOKEN_USER,
};

/// Security API backed by the running Windows host
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsSecurityApi;

impl WindowsSecurityApi {
    pub fn new() -> Self {
        Self
    }
}

fn handle(raw: u64) -> HANDLE {
    raw as usize as HANDLE
}

fn os_error(operation: SecurityOperation) -> AclError {
    AclError::Os {
        operation,
        // SAFETY: reads the calling thread's last-error value
        code: unsafe { GetLastError() },
    }
}

/// Copy of an ACL in a DWORD-aligned buffer, as the OS requires
fn aligned_acl(acl: &Acl) -> AclResult<Vec<u32>> {
    let bytes = acl.to_bytes()?;
    let mut words = vec![0u32; bytes.len().div_ceil(4)];
    // SAFETY: `words` holds at least `bytes.len()` bytes
    unsafe {
        ptr::copy_nonoverlapping(bytes.as_ptr(), words.as_mut_ptr().cast::<u8>(), bytes.len());
    }
    Ok(words)
}

/// Decode an OS-owned ACL; `None` for a null pointer
///
/// # Safety
/// `acl` must be null or point to a valid ACL of `AclSize` bytes
unsafe fn read_acl(acl: *const ACL) -> AclResult<Option<Acl>> {
    if acl.is_null() {
        return Ok(None);
    }
    let size = (*acl).AclSize as usize;
    let bytes = std::slice::from_raw_parts(acl.cast::<u8>(), size);
    Acl::from_bytes(bytes).map(Some)
}

/// Variable-length token information in an 8-byte aligned buffer
fn token_information(
    token: TokenHandle,
    class: TOKEN_INFORMATION_CLASS,
    operation: SecurityOperation,
) -> AclResult<Vec<u64>> {
    let mut needed = 0u32;
    // SAFETY: size query with a null buffer
    unsafe {
        GetTokenInformation(handle(token.0), class, ptr::null_mut(), 0, &mut needed);
    }
    if needed == 0 {
        return Err(os_error(operation));
    }

    let mut buffer = vec![0u64; (needed as usize).div_ceil(8)];
    // SAFETY: `buffer` holds at least `needed` bytes
    let ok = unsafe {
        GetTokenInformation(
            handle(token.0),
            class,
            buffer.as_mut_ptr().cast::<c_void>(),
            needed,
            &mut needed,
        )
    };
    if ok == 0 {
        return Err(os_error(operation));
    }
    Ok(buffer)
}

impl SecurityApi for WindowsSecurityApi {
    fn token_default_dacl(&self, token: TokenHandle) -> AclResult<Option<Acl>> {
        let buffer = token_information(
            token,
            TokenDefaultDacl,
            SecurityOperation::GetTokenDefaultDacl,
        )?;
        // SAFETY: the OS filled the buffer with a TOKEN_DEFAULT_DACL whose ACL
        // lives inside the same buffer
        unsafe {
            let info = &*buffer.as_ptr().cast::<TOKEN_DEFAULT_DACL>();
            read_acl(info.DefaultDacl)
        }
    }

    fn set_token_default_dacl(&self, token: TokenHandle, dacl: &Acl) -> AclResult<()> {
        let mut words = aligned_acl(dacl)?;
        let info = TOKEN_DEFAULT_DACL {
            DefaultDacl: words.as_mut_ptr().cast::<ACL>(),
        };
        // SAFETY: `info` points at a valid ACL that outlives the call
        let ok = unsafe {
            SetTokenInformation(
                handle(token.0),
                TokenDefaultDacl,
                ptr::addr_of!(info).cast::<c_void>(),
                std::mem::size_of::<TOKEN_DEFAULT_DACL>() as u32,
            )
        };
        if ok == 0 {
            return Err(os_error(SecurityOperation::SetTokenDefaultDacl));
        }
        Ok(())
    }

    fn token_user(&self, token: TokenHandle) -> AclResult<Sid> {
        let buffer = token_information(token, TokenUser, SecurityOperation::GetTokenUser)?;
        // SAFETY: the OS filled the buffer with a TOKEN_USER whose SID lives
        // inside the same buffer
        unsafe {
            let info = &*buffer.as_ptr().cast::<TOKEN_USER>();
            let sid = info.User.Sid;
            let len = GetLengthSid(sid) as usize;
            let bytes = std::slice::from_raw_parts(sid.cast::<u8>(), len);
            Sid::from_bytes(bytes).map(|(sid, _)| sid)
        }
    }

    fn object_dacl(&self, object: ObjectHandle, object_type: ObjectType) -> AclResult<Option<Acl>> {
        let mut dacl: *mut ACL = ptr::null_mut();
        let mut descriptor: PSECURITY_DESCRIPTOR = ptr::null_mut();
        // SAFETY: out-pointers are valid; the descriptor is freed below
        let status = unsafe {
            GetSecurityInfo(
                handle(object.0),
                object_type.code(),
                DACL_SECURITY_INFORMATION,
                ptr::null_mut(),
                ptr::null_mut(),
                &mut dacl,
                ptr::null_mut(),
                &mut descriptor,
            )
        };
        if status != ERROR_SUCCESS {
            return Err(AclError::Os {
                operation: SecurityOperation::GetObjectDacl,
                code: status,
            });
        }

        // SAFETY: `dacl` points into `descriptor`, which is still alive
        let result = unsafe { read_acl(dacl) };
        // SAFETY: `descriptor` was allocated by GetSecurityInfo
        unsafe {
            LocalFree(descriptor);
        }
        result
    }

    fn set_object_dacl(
        &self,
        object: ObjectHandle,
        object_type: ObjectType,
        dacl: &Acl,
    ) -> AclResult<()> {
        let words = aligned_acl(dacl)?;
        // SAFETY: `words` holds a valid ACL for the duration of the call
        let status = unsafe {
            SetSecurityInfo(
                handle(object.0),
                object_type.code(),
                DACL_SECURITY_INFORMATION,
                ptr::null_mut(),
                ptr::null_mut(),
                words.as_ptr().cast::<ACL>(),
                ptr::null(),
            )
        };
        if status != ERROR_SUCCESS {
            return Err(AclError::Os {
                operation: SecurityOperation::SetObjectDacl,
                code: status,
            });
        }
        Ok(())
    }
}
