/*!
 * Match Context
 * Per-evaluation scratch state shared by the opcodes of one group
 */

use super::types::OpcodeOptions;

/// Transient state for a single `evaluate` call
///
/// Lives on the caller's stack; never shared between evaluations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchContext {
    /// Group options accumulated from opcodes (only `USE_OR_EVAL` is sticky)
    pub options: OpcodeOptions,
    /// Cursor into the string parameter being matched, in characters
    pub position: usize,
}

impl MatchContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset at every group boundary
    #[inline]
    pub fn clear(&mut self) {
        self.options = OpcodeOptions::NONE;
        self.position = 0;
    }

    #[inline]
    pub fn is_or_mode(&self) -> bool {
        self.options.contains(OpcodeOptions::USE_OR_EVAL)
    }
}
