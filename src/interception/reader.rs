/*!
 * Config Buffer Reader
 * Bounds-checked walker over a serialized interception buffer
 *
 * The whole buffer is validated when the reader is created, so the views it
 * hands out never index outside the input. Trailing bytes after the last
 * group are ignored because callers size buffers generously.
 */

use super::buffer::DLL_GROUP_UNLOAD;
use super::types::{BufferError, BufferResult, InterceptionRecord, InterceptionType, Interceptor};
use crate::core::limits::{
    CONFIG_BUFFER_ALIGNMENT, CONFIG_HEADER_BYTES, DLL_GROUP_FIXED_BYTES,
    FUNCTION_RECORD_FIXED_BYTES, MAX_CONFIG_BUFFER_BYTES,
};
use crate::core::types::Address;
use serde::{Deserialize, Serialize};

/// One validated function record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionView<'a> {
    pub offset: usize,
    pub technique: InterceptionType,
    pub interceptor_address: Address,
    pub function: &'a str,
    pub interceptor_name: &'a str,
}

impl FunctionView<'_> {
    pub fn interceptor(&self) -> Option<Interceptor> {
        if self.interceptor_name.is_empty() {
            Interceptor::address(self.interceptor_address)
        } else {
            Interceptor::symbol(self.interceptor_name)
        }
    }
}

/// One validated dll group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DllGroupView<'a> {
    pub offset: usize,
    pub module: String,
    pub unload: bool,
    functions: Vec<FunctionView<'a>>,
}

impl<'a> DllGroupView<'a> {
    pub fn functions(&self) -> std::slice::Iter<'_, FunctionView<'a>> {
        self.functions.iter()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }
}

/// Validating reader
#[derive(Debug, Clone)]
pub struct ConfigBufferReader<'a> {
    interceptor_base: Address,
    consumed: usize,
    groups: Vec<DllGroupView<'a>>,
}

impl<'a> ConfigBufferReader<'a> {
    pub fn new(bytes: &'a [u8]) -> BufferResult<Self> {
        if bytes.len() > MAX_CONFIG_BUFFER_BYTES {
            return Err(BufferError::TooLarge {
                size: bytes.len(),
                max: MAX_CONFIG_BUFFER_BYTES,
            });
        }
        let walker = Walker { bytes };

        let num_groups = walker.u32_at(0)?;
        if walker.u32_at(4)? != 0 {
            return Err(BufferError::ReservedNotZero { offset: 4 });
        }
        let interceptor_base = walker.u64_at(8)?;

        let mut groups = Vec::new();
        let mut offset = CONFIG_HEADER_BYTES;
        for _ in 0..num_groups {
            let group = walker.group_at(offset)?;
            offset = group.1;
            groups.push(group.0);
        }

        Ok(Self {
            interceptor_base,
            consumed: offset,
            groups,
        })
    }

    pub fn interceptor_base(&self) -> Address {
        self.interceptor_base
    }

    /// Bytes covered by the header and all groups
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn dll_groups(&self) -> std::slice::Iter<'_, DllGroupView<'a>> {
        self.groups.iter()
    }

    pub fn decode(&self) -> DecodedConfig {
        DecodedConfig {
            interceptor_base: self.interceptor_base,
            groups: self
                .groups
                .iter()
                .map(|group| DecodedDllGroup {
                    module: group.module.clone(),
                    unload: group.unload,
                    functions: group
                        .functions
                        .iter()
                        .filter_map(|f| {
                            Some(DecodedFunction {
                                function: f.function.to_string(),
                                technique: f.technique,
                                interceptor: f.interceptor()?,
                            })
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

struct Walker<'a> {
    bytes: &'a [u8],
}

impl<'a> Walker<'a> {
    fn slice(&self, offset: usize, len: usize) -> BufferResult<&'a [u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.bytes.get(offset..end))
            .ok_or(BufferError::Truncated {
                offset,
                needed: len,
                available: self.bytes.len().saturating_sub(offset),
            })
    }

    fn u32_at(&self, offset: usize) -> BufferResult<u32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.slice(offset, 4)?);
        Ok(u32::from_le_bytes(raw))
    }

    fn u64_at(&self, offset: usize) -> BufferResult<u64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.slice(offset, 8)?);
        Ok(u64::from_le_bytes(raw))
    }

    /// Length field of the record at `offset`, checked against its fixed part
    /// and the end of the enclosing region
    fn record_len(&self, offset: usize, fixed: usize, limit: usize) -> BufferResult<usize> {
        if offset % CONFIG_BUFFER_ALIGNMENT != 0 {
            return Err(BufferError::Misaligned { offset });
        }
        let length = self.u64_at(offset)?;
        let valid = usize::try_from(length).ok().filter(|&len| {
            len >= fixed
                && len % CONFIG_BUFFER_ALIGNMENT == 0
                && offset.checked_add(len).is_some_and(|end| end <= limit)
        });
        match valid {
            Some(len) => Ok(len),
            None if offset.saturating_add(fixed) > limit => Err(BufferError::Truncated {
                offset,
                needed: fixed,
                available: limit.saturating_sub(offset),
            }),
            None => Err(BufferError::InvalidRecordLength { offset, length }),
        }
    }

    fn group_at(&self, offset: usize) -> BufferResult<(DllGroupView<'a>, usize)> {
        // Fixed part must be readable before its length field can be trusted
        self.slice(offset, DLL_GROUP_FIXED_BYTES)?;
        let size = self.record_len(offset, DLL_GROUP_FIXED_BYTES, self.bytes.len())?;
        let end = offset + size;

        let functions_offset = self.u64_at(offset + 8)?;
        let min = DLL_GROUP_FIXED_BYTES + CONFIG_BUFFER_ALIGNMENT;
        let functions_rel = usize::try_from(functions_offset)
            .ok()
            .filter(|&rel| rel >= min && rel <= size && rel % CONFIG_BUFFER_ALIGNMENT == 0)
            .ok_or(BufferError::OffsetOutOfBounds {
                offset,
                value: functions_offset,
                min,
                max: size,
            })?;

        let declared = self.u32_at(offset + 16)?;
        let flags = self.u32_at(offset + 20)?;
        if flags & !DLL_GROUP_UNLOAD != 0 {
            return Err(BufferError::ReservedNotZero { offset: offset + 20 });
        }

        let name_start = offset + DLL_GROUP_FIXED_BYTES;
        let module = self.utf16_at(offset, name_start, offset + functions_rel)?;

        let mut functions = Vec::new();
        let mut cursor = offset + functions_rel;
        while cursor < end {
            let function = self.function_at(cursor, end)?;
            cursor = function.1;
            functions.push(function.0);
        }

        if functions.len() != declared as usize {
            return Err(BufferError::FunctionCountMismatch {
                offset,
                declared,
                found: functions.len() as u32,
            });
        }

        Ok((
            DllGroupView {
                offset,
                module,
                unload: flags & DLL_GROUP_UNLOAD != 0,
                functions,
            },
            end,
        ))
    }

    fn function_at(&self, offset: usize, limit: usize) -> BufferResult<(FunctionView<'a>, usize)> {
        let size = self.record_len(offset, FUNCTION_RECORD_FIXED_BYTES, limit)?;
        let end = offset + size;

        let code = self.u32_at(offset + 8)?;
        let technique = InterceptionType::from_code(code)
            .filter(|t| *t != InterceptionType::UnloadModule)
            .ok_or(BufferError::UnknownTechnique { offset, code })?;
        if self.u32_at(offset + 12)? != 0 {
            return Err(BufferError::ReservedNotZero { offset: offset + 12 });
        }
        let interceptor_address = self.u64_at(offset + 16)?;

        let strings = &self.bytes[offset + FUNCTION_RECORD_FIXED_BYTES..end];
        let (function, rest) = split_cstr(strings, offset)?;
        let (interceptor_name, _) = split_cstr(rest, offset)?;

        if function.is_empty() {
            return Err(BufferError::InvalidInterceptor {
                offset,
                reason: "an empty function name".into(),
            });
        }
        match (interceptor_address == 0, interceptor_name.is_empty()) {
            (true, true) => {
                return Err(BufferError::InvalidInterceptor {
                    offset,
                    reason: "neither an interceptor address nor a name".into(),
                })
            }
            (false, false) => {
                return Err(BufferError::InvalidInterceptor {
                    offset,
                    reason: "both an interceptor address and a name".into(),
                })
            }
            _ => {}
        }

        Ok((
            FunctionView {
                offset,
                technique,
                interceptor_address,
                function,
                interceptor_name,
            },
            end,
        ))
    }

    fn utf16_at(&self, record: usize, start: usize, end: usize) -> BufferResult<String> {
        let raw = &self.bytes[start..end];
        let units: Vec<u16> = raw
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        let len = units
            .iter()
            .position(|&unit| unit == 0)
            .ok_or(BufferError::MissingTerminator { offset: record })?;
        if len == 0 {
            return Err(BufferError::InvalidString { offset: record });
        }
        String::from_utf16(&units[..len]).map_err(|_| BufferError::InvalidString { offset: record })
    }
}

fn split_cstr(bytes: &[u8], record: usize) -> BufferResult<(&str, &[u8])> {
    let nul = bytes
        .iter()
        .position(|&b| b == 0)
        .ok_or(BufferError::MissingTerminator { offset: record })?;
    let text = std::str::from_utf8(&bytes[..nul])
        .map_err(|_| BufferError::InvalidString { offset: record })?;
    Ok((text, &bytes[nul + 1..]))
}

/// Owned decode of a buffer, for inspection and tests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedConfig {
    pub interceptor_base: Address,
    pub groups: Vec<DecodedDllGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedDllGroup {
    pub module: String,
    pub unload: bool,
    pub functions: Vec<DecodedFunction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedFunction {
    pub function: String,
    pub technique: InterceptionType,
    pub interceptor: Interceptor,
}

impl DecodedConfig {
    /// Function records flattened back into registration form, group by group
    pub fn records(&self) -> Vec<InterceptionRecord> {
        self.groups
            .iter()
            .flat_map(|group| {
                group.functions.iter().map(move |f| {
                    InterceptionRecord::new(
                        group.module.as_str(),
                        f.function.as_str(),
                        f.technique,
                        f.interceptor.clone(),
                    )
                })
            })
            .collect()
    }

    pub fn unload_modules(&self) -> Vec<&str> {
        self.groups
            .iter()
            .filter(|group| group.unload)
            .map(|group| group.module.as_str())
            .collect()
    }
}
