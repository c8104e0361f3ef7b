/*!
 * Policy Opcodes
 * A single compiled policy instruction and how it evaluates against call parameters
 */

use super::context::MatchContext;
use super::params::{ParameterSet, ParameterValue};
use super::types::{EvalResult, MatchPosition, OpcodeOptions, PolicyAction, StringMatchOptions};
use crate::core::types::Address;
use serde::{Deserialize, Serialize};

/// Operand of a numeric equality test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberValue {
    U32(u32),
    Pointer(Address),
}

/// Operation performed by an opcode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpcodeKind {
    AlwaysFalse,
    AlwaysTrue,
    /// Parameter equals `value` (same width)
    NumberMatch { param: usize, value: NumberValue },
    /// `lower <= parameter <= upper`
    NumberMatchRange { param: usize, lower: u32, upper: u32 },
    /// `parameter & mask != 0`
    NumberAndMatch { param: usize, mask: u32 },
    /// Substring match starting at the context cursor
    StringMatch {
        param: usize,
        pattern: String,
        position: MatchPosition,
        options: StringMatchOptions,
    },
    /// Terminal action
    Action(PolicyAction),
}

/// One compiled instruction; immutable once built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opcode {
    pub kind: OpcodeKind,
    #[serde(default)]
    pub options: OpcodeOptions,
}

impl Opcode {
    pub fn new(kind: OpcodeKind, options: OpcodeOptions) -> Self {
        Self { kind, options }
    }

    pub fn always_true(options: OpcodeOptions) -> Self {
        Self::new(OpcodeKind::AlwaysTrue, options)
    }

    pub fn always_false(options: OpcodeOptions) -> Self {
        Self::new(OpcodeKind::AlwaysFalse, options)
    }

    pub fn number_match(param: usize, value: NumberValue, options: OpcodeOptions) -> Self {
        Self::new(OpcodeKind::NumberMatch { param, value }, options)
    }

    pub fn number_match_range(param: usize, lower: u32, upper: u32, options: OpcodeOptions) -> Self {
        Self::new(OpcodeKind::NumberMatchRange { param, lower, upper }, options)
    }

    pub fn number_and_match(param: usize, mask: u32, options: OpcodeOptions) -> Self {
        Self::new(OpcodeKind::NumberAndMatch { param, mask }, options)
    }

    pub fn string_match(
        param: usize,
        pattern: impl Into<String>,
        position: MatchPosition,
        match_options: StringMatchOptions,
        options: OpcodeOptions,
    ) -> Self {
        Self::new(
            OpcodeKind::StringMatch {
                param,
                pattern: pattern.into(),
                position,
                options: match_options,
            },
            options,
        )
    }

    pub fn action(action: PolicyAction) -> Self {
        Self::new(OpcodeKind::Action(action), OpcodeOptions::NONE)
    }

    #[inline]
    pub fn is_action(&self) -> bool {
        matches!(self.kind, OpcodeKind::Action(_))
    }

    /// Index of the parameter this opcode reads, if any
    pub fn parameter(&self) -> Option<usize> {
        match &self.kind {
            OpcodeKind::NumberMatch { param, .. }
            | OpcodeKind::NumberMatchRange { param, .. }
            | OpcodeKind::NumberAndMatch { param, .. }
            | OpcodeKind::StringMatch { param, .. } => Some(*param),
            OpcodeKind::AlwaysFalse | OpcodeKind::AlwaysTrue | OpcodeKind::Action(_) => None,
        }
    }

    /// Evaluate against the call parameters, then apply the generic options
    pub fn evaluate(&self, params: &ParameterSet, ctx: &mut MatchContext) -> EvalResult {
        let selected = match self.parameter() {
            Some(index) => match params.get(index) {
                Some(param) => Some(&param.value),
                None => return EvalResult::Error,
            },
            None => None,
        };

        let mut result = self.evaluate_kind(selected, ctx);

        if self.options.is_empty() {
            return result;
        }

        if self.options.contains(OpcodeOptions::NEGATE_EVAL) {
            result = match result {
                EvalResult::Condition(value) => EvalResult::Condition(!value),
                EvalResult::Error | EvalResult::Action(_) => EvalResult::Error,
            };
        }
        if self.options.contains(OpcodeOptions::CLEAR_CONTEXT) {
            ctx.clear();
        }
        if self.options.contains(OpcodeOptions::USE_OR_EVAL) {
            ctx.options = OpcodeOptions::USE_OR_EVAL;
        }

        result
    }

    fn evaluate_kind(&self, selected: Option<&ParameterValue>, ctx: &mut MatchContext) -> EvalResult {
        match (&self.kind, selected) {
            (OpcodeKind::AlwaysFalse, _) => EvalResult::FALSE,
            (OpcodeKind::AlwaysTrue, _) => EvalResult::TRUE,
            (OpcodeKind::Action(action), _) => EvalResult::Action(*action),

            (OpcodeKind::NumberMatch { value, .. }, Some(param)) => match (value, param) {
                (NumberValue::U32(expected), ParameterValue::U32(actual)) => {
                    EvalResult::from_bool(expected == actual)
                }
                (NumberValue::Pointer(expected), ParameterValue::Pointer(actual)) => {
                    EvalResult::from_bool(expected == actual)
                }
                _ => EvalResult::Error,
            },

            (OpcodeKind::NumberMatchRange { lower, upper, .. }, Some(param)) => {
                match param.as_u32() {
                    Some(actual) => EvalResult::from_bool(*lower <= actual && actual <= *upper),
                    None => EvalResult::Error,
                }
            }

            (OpcodeKind::NumberAndMatch { mask, .. }, Some(param)) => match param.as_u32() {
                Some(actual) => EvalResult::from_bool(actual & mask != 0),
                None => EvalResult::Error,
            },

            (
                OpcodeKind::StringMatch {
                    pattern,
                    position,
                    options,
                    ..
                },
                Some(param),
            ) => match param.as_str() {
                Some(source) => match_string(source, pattern, *position, *options, ctx),
                None => EvalResult::Error,
            },

            // Parameter-reading opcodes always have a selected parameter here
            (_, None) => EvalResult::Error,
        }
    }
}

/// Match `pattern` in `source` relative to the context cursor, advancing the
/// cursor past the match on success so compiled wildcards can chain.
fn match_string(
    source: &str,
    pattern: &str,
    position: MatchPosition,
    options: StringMatchOptions,
    ctx: &mut MatchContext,
) -> EvalResult {
    let case_insensitive = options.contains(StringMatchOptions::CASE_INSENSITIVE);
    let exact_length = options.contains(StringMatchOptions::EXACT_LENGTH);
    // Cursor, offsets and lengths count chars, not bytes
    let source_len = source.chars().count();
    let pattern_len = pattern.chars().count();

    let cursor = ctx.position;
    if cursor > source_len {
        return EvalResult::Error;
    }
    let remaining = source_len - cursor;
    if pattern_len > remaining {
        return EvalResult::FALSE;
    }

    let start = match position {
        MatchPosition::End => {
            if exact_length && pattern_len != remaining {
                return EvalResult::FALSE;
            }
            Some(source_len - pattern_len)
        }
        MatchPosition::At(offset) => {
            let offset = offset as usize;
            if exact_length && offset + pattern_len != remaining {
                return EvalResult::FALSE;
            }
            if offset + pattern_len > remaining {
                return EvalResult::FALSE;
            }
            Some(cursor + offset)
        }
        MatchPosition::SeekForward => None,
    };

    let found = match start {
        Some(start) => char_boundaries(source)
            .nth(start)
            .filter(|&at| starts_with_chars(&source[at..], pattern, case_insensitive))
            .map(|_| start),
        None => char_boundaries(source)
            .enumerate()
            .skip(cursor)
            .take(remaining - pattern_len + 1)
            .find(|&(_, at)| starts_with_chars(&source[at..], pattern, case_insensitive))
            .map(|(ix, _)| ix),
    };

    match found {
        Some(start) => {
            ctx.position = start + pattern_len;
            EvalResult::TRUE
        }
        None => EvalResult::FALSE,
    }
}

/// Byte offset of every char plus the end of the string
#[inline]
fn char_boundaries(text: &str) -> impl Iterator<Item = usize> + '_ {
    text.char_indices()
        .map(|(at, _)| at)
        .chain(std::iter::once(text.len()))
}

#[inline]
fn starts_with_chars(text: &str, pattern: &str, case_insensitive: bool) -> bool {
    if !case_insensitive {
        return text.starts_with(pattern);
    }
    let mut text = text.chars();
    pattern.chars().all(|p| {
        text.next()
            .is_some_and(|t| t == p || t.to_lowercase().eq(p.to_lowercase()))
    })
}
