/*!
 * Call Parameters
 * Typed, named arguments captured from one intercepted call
 */

use crate::core::data_structures::InlineString;
use crate::core::types::Address;
use serde::{Deserialize, Serialize};

/// Value of one captured argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum ParameterValue {
    U32(u32),
    Pointer(Address),
    /// Wide string argument; `None` for a null string pointer
    WString(Option<String>),
}

impl ParameterValue {
    #[inline]
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            ParameterValue::U32(value) => Some(*value),
            _ => None,
        }
    }

    #[inline]
    pub fn as_pointer(&self) -> Option<Address> {
        match self {
            ParameterValue::Pointer(value) => Some(*value),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::WString(Some(value)) => Some(value.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: InlineString,
    pub value: ParameterValue,
}

/// Ordered arguments of one intercepted call, read-only to the evaluator
///
/// Opcodes address parameters by position; names exist for logging and for
/// building sets in a readable way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSet {
    params: Vec<Parameter>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Append an argument
    pub fn push(&mut self, name: impl Into<InlineString>, value: ParameterValue) {
        self.params.push(Parameter {
            name: name.into(),
            value,
        });
    }

    pub fn with_u32(mut self, name: impl Into<InlineString>, value: u32) -> Self {
        self.push(name, ParameterValue::U32(value));
        self
    }

    pub fn with_pointer(mut self, name: impl Into<InlineString>, value: Address) -> Self {
        self.push(name, ParameterValue::Pointer(value));
        self
    }

    pub fn with_wstring(mut self, name: impl Into<InlineString>, value: impl Into<String>) -> Self {
        self.push(name, ParameterValue::WString(Some(value.into())));
        self
    }

    pub fn with_null_string(mut self, name: impl Into<InlineString>) -> Self {
        self.push(name, ParameterValue::WString(None));
        self
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Parameter> {
        self.params.get(index)
    }

    pub fn by_name(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name.as_str() == name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }
}
