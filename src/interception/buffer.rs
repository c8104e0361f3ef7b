/*!
 * Config Buffer Builder
 * Serializes hot interceptions into the buffer handed to the target process
 *
 * Layout (little-endian, every record 8-byte aligned):
 * - header: u32 dll group count, u32 reserved, u64 interceptor base
 * - dll group: u64 record bytes, u64 offset to functions, u32 function count,
 *   u32 flags, UTF-16LE module name (nul terminated, zero padded)
 * - function: u64 record bytes, u32 technique, u32 reserved, u64 interceptor
 *   address, UTF-8 function name and interceptor name (both nul terminated,
 *   zero padded)
 */

use super::classify::normalize_module;
use super::types::{BufferError, InterceptionError, InterceptionRecord, InterceptionResult};
use crate::core::limits::{
    CONFIG_BUFFER_ALIGNMENT, CONFIG_HEADER_BYTES, DLL_GROUP_FIXED_BYTES,
    FUNCTION_RECORD_FIXED_BYTES, MAX_CONFIG_BUFFER_BYTES,
};
use crate::core::types::{align_up, Address};
use ahash::RandomState;
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;

/// Dll group flag: unmap the module instead of patching it
pub const DLL_GROUP_UNLOAD: u32 = 0x1;

#[derive(Debug)]
struct GroupEntry<'a> {
    module: &'a str,
    unload: bool,
    functions: Vec<&'a InterceptionRecord>,
}

impl GroupEntry<'_> {
    fn name_bytes(&self) -> usize {
        align_up((self.module.encode_utf16().count() + 1) * 2, CONFIG_BUFFER_ALIGNMENT)
    }

    fn functions_offset(&self) -> usize {
        DLL_GROUP_FIXED_BYTES + self.name_bytes()
    }

    fn size(&self) -> usize {
        self.functions_offset() + self.functions.iter().map(|f| function_size(f)).sum::<usize>()
    }
}

fn function_size(record: &InterceptionRecord) -> usize {
    let strings = record.function.len() + 1 + record.interceptor.wire_name().len() + 1;
    align_up(FUNCTION_RECORD_FIXED_BYTES + strings, CONFIG_BUFFER_ALIGNMENT)
}

/// Groups hot records by module and writes the wire form
///
/// Groups appear in order of first appearance; functions keep registration
/// order inside their group. Module names group by their normalized form
/// (case and `.dll` suffix ignored) and the first spelling seen is the one
/// written.
#[derive(Debug)]
pub struct ConfigBufferBuilder<'a> {
    interceptor_base: Address,
    groups: Vec<GroupEntry<'a>>,
    index: HashMap<String, usize, RandomState>,
}

impl<'a> ConfigBufferBuilder<'a> {
    pub fn new() -> Self {
        Self {
            interceptor_base: 0,
            groups: Vec::new(),
            index: HashMap::with_hasher(RandomState::new()),
        }
    }

    /// Base address symbolic interceptors are resolved against in the target
    pub fn with_interceptor_base(mut self, base: Address) -> Self {
        self.interceptor_base = base;
        self
    }

    pub fn add_function(&mut self, record: &'a InterceptionRecord) {
        let slot = self.group_slot(&record.module);
        self.groups[slot].functions.push(record);
    }

    pub fn add_unload(&mut self, module: &'a str) {
        let slot = self.group_slot(module);
        self.groups[slot].unload = true;
    }

    fn group_slot(&mut self, module: &'a str) -> usize {
        let key = normalize_module(module);
        if let Some(&slot) = self.index.get(&key) {
            return slot;
        }
        self.groups.push(GroupEntry {
            module,
            unload: false,
            functions: Vec::new(),
        });
        let slot = self.groups.len() - 1;
        self.index.insert(key, slot);
        slot
    }

    pub fn dll_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn function_count(&self) -> usize {
        self.groups.iter().map(|g| g.functions.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Exact number of bytes `build` produces
    pub fn required_size(&self) -> usize {
        CONFIG_HEADER_BYTES + self.groups.iter().map(GroupEntry::size).sum::<usize>()
    }

    /// Size the wire form will take, rejected above the reader's limit
    fn checked_size(&self) -> InterceptionResult<usize> {
        let size = self.required_size();
        if size > MAX_CONFIG_BUFFER_BYTES {
            return Err(BufferError::TooLarge {
                size,
                max: MAX_CONFIG_BUFFER_BYTES,
            }
            .into());
        }
        Ok(size)
    }

    pub fn build(&self) -> InterceptionResult<Bytes> {
        let mut out = BytesMut::with_capacity(self.checked_size()?);
        self.encode(&mut out);
        Ok(out.freeze())
    }

    /// Write into a caller-provided buffer; nothing is written if it is too
    /// small or the layout exceeds the reader's limit
    pub fn write_into(&self, buffer: &mut [u8]) -> InterceptionResult<usize> {
        let required = self.checked_size()?;
        if buffer.len() < required {
            return Err(InterceptionError::BufferTooSmall {
                required,
                actual: buffer.len(),
            });
        }

        let mut cursor = &mut buffer[..required];
        self.encode(&mut cursor);
        Ok(required)
    }

    fn encode<B: BufMut>(&self, out: &mut B) {
        out.put_u32_le(self.groups.len() as u32);
        out.put_u32_le(0);
        out.put_u64_le(self.interceptor_base);

        for group in &self.groups {
            let functions_offset = group.functions_offset();
            out.put_u64_le(group.size() as u64);
            out.put_u64_le(functions_offset as u64);
            out.put_u32_le(group.functions.len() as u32);
            out.put_u32_le(if group.unload { DLL_GROUP_UNLOAD } else { 0 });

            let mut name_len = 0;
            for unit in group.module.encode_utf16().chain(std::iter::once(0)) {
                out.put_u16_le(unit);
                name_len += 2;
            }
            out.put_bytes(0, functions_offset - DLL_GROUP_FIXED_BYTES - name_len);

            for record in &group.functions {
                encode_function(record, out);
            }
        }
    }
}

impl Default for ConfigBufferBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_function<B: BufMut>(record: &InterceptionRecord, out: &mut B) {
    let size = function_size(record);
    let name = record.interceptor.wire_name();

    out.put_u64_le(size as u64);
    out.put_u32_le(record.technique.code());
    out.put_u32_le(0);
    out.put_u64_le(record.interceptor.wire_address());
    out.put_slice(record.function.as_bytes());
    out.put_u8(0);
    out.put_slice(name.as_bytes());
    out.put_u8(0);

    let written = FUNCTION_RECORD_FIXED_BYTES + record.function.len() + name.len() + 2;
    out.put_bytes(0, size - written);
}
