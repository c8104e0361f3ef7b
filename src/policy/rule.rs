/*!
 * Policy Rules
 * Validated opcode sequences and a builder standing in for the rule compiler
 */

use super::opcode::{NumberValue, Opcode, OpcodeKind};
use super::types::{MatchPosition, OpcodeOptions, PolicyAction, RuleError, RuleResult, StringMatchOptions};
use crate::core::limits::{MAX_CALL_PARAMETERS, MAX_POLICY_OPCODES};
use serde::{Deserialize, Serialize};

/// Ordered, non-empty opcode sequence for one capability check
///
/// Immutable after construction and `Send + Sync`, so one rule can back any
/// number of concurrent evaluations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyRule {
    opcodes: Vec<Opcode>,
}

impl PolicyRule {
    /// Validate and wrap an opcode sequence
    pub fn new(opcodes: Vec<Opcode>) -> RuleResult<Self> {
        Self::with_limit(opcodes, MAX_POLICY_OPCODES)
    }

    /// Validate with a caller-supplied opcode cap
    pub fn with_limit(opcodes: Vec<Opcode>, max_opcodes: usize) -> RuleResult<Self> {
        validate(&opcodes, max_opcodes)?;
        Ok(Self { opcodes })
    }

    pub fn builder() -> PolicyRuleBuilder {
        PolicyRuleBuilder::new()
    }

    #[inline]
    pub fn opcodes(&self) -> &[Opcode] {
        &self.opcodes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.opcodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.opcodes.is_empty()
    }

    pub fn action_count(&self) -> usize {
        self.opcodes.iter().filter(|op| op.is_action()).count()
    }

    /// Whether the last opcode is an action (the authoring convention)
    pub fn ends_with_action(&self) -> bool {
        self.opcodes.last().is_some_and(Opcode::is_action)
    }

    /// Encode for transfer to the target process
    pub fn to_bincode(&self) -> RuleResult<Vec<u8>> {
        bincode::serialize(&self.opcodes).map_err(|e| RuleError::Encode(e.to_string()))
    }

    /// Decode and re-validate a transferred rule
    pub fn from_bincode(bytes: &[u8]) -> RuleResult<Self> {
        Self::from_bincode_with_limit(bytes, MAX_POLICY_OPCODES)
    }

    pub fn from_bincode_with_limit(bytes: &[u8], max_opcodes: usize) -> RuleResult<Self> {
        let opcodes: Vec<Opcode> =
            bincode::deserialize(bytes).map_err(|e| RuleError::Decode(e.to_string()))?;
        Self::with_limit(opcodes, max_opcodes)
    }
}

impl<'de> Deserialize<'de> for PolicyRule {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            opcodes: Vec<Opcode>,
        }

        let raw = Raw::deserialize(deserializer)?;
        PolicyRule::new(raw.opcodes).map_err(serde::de::Error::custom)
    }
}

fn validate(opcodes: &[Opcode], max_opcodes: usize) -> RuleResult<()> {
    if opcodes.is_empty() {
        return Err(RuleError::Empty);
    }
    if opcodes.len() > max_opcodes {
        return Err(RuleError::TooManyOpcodes {
            count: opcodes.len(),
            max: max_opcodes,
        });
    }

    for (index, opcode) in opcodes.iter().enumerate() {
        if let Some(param) = opcode.parameter() {
            if param >= MAX_CALL_PARAMETERS {
                return Err(RuleError::ParameterOutOfRange {
                    index,
                    param,
                    max: MAX_CALL_PARAMETERS,
                });
            }
        }

        match &opcode.kind {
            OpcodeKind::NumberMatchRange { lower, upper, .. } if lower > upper => {
                return Err(RuleError::InvalidRange {
                    index,
                    lower: *lower,
                    upper: *upper,
                });
            }
            OpcodeKind::StringMatch { pattern, .. } if pattern.is_empty() => {
                return Err(RuleError::EmptyPattern { index });
            }
            OpcodeKind::Action(_) if opcode.options.contains(OpcodeOptions::NEGATE_EVAL) => {
                return Err(RuleError::NegatedAction { index });
            }
            _ => {}
        }
    }

    Ok(())
}

/// Fluent builder for rules
///
/// ```ignore
/// let rule = PolicyRule::builder()
///     .string_match(0, "c:\\temp\\", MatchPosition::At(0), StringMatchOptions::CASE_INSENSITIVE)
///     .number_and_match(1, GENERIC_WRITE)
///     .action(PolicyAction::GiveAllAccess)
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct PolicyRuleBuilder {
    opcodes: Vec<Opcode>,
    pending: OpcodeOptions,
}

impl PolicyRuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options applied to the next condition only
    pub fn with_options(mut self, options: OpcodeOptions) -> Self {
        self.pending |= options;
        self
    }

    /// Negate the next condition
    pub fn not(self) -> Self {
        self.with_options(OpcodeOptions::NEGATE_EVAL)
    }

    /// Switch the current group to OR semantics from the next condition on
    pub fn or(self) -> Self {
        self.with_options(OpcodeOptions::USE_OR_EVAL)
    }

    pub fn opcode(mut self, opcode: Opcode) -> Self {
        self.opcodes.push(opcode);
        self
    }

    fn condition(mut self, kind: OpcodeKind) -> Self {
        let options = std::mem::take(&mut self.pending);
        self.opcodes.push(Opcode::new(kind, options));
        self
    }

    pub fn always_true(self) -> Self {
        self.condition(OpcodeKind::AlwaysTrue)
    }

    pub fn always_false(self) -> Self {
        self.condition(OpcodeKind::AlwaysFalse)
    }

    pub fn number_match(self, param: usize, value: NumberValue) -> Self {
        self.condition(OpcodeKind::NumberMatch { param, value })
    }

    pub fn number_match_range(self, param: usize, lower: u32, upper: u32) -> Self {
        self.condition(OpcodeKind::NumberMatchRange { param, lower, upper })
    }

    pub fn number_and_match(self, param: usize, mask: u32) -> Self {
        self.condition(OpcodeKind::NumberAndMatch { param, mask })
    }

    pub fn string_match(
        self,
        param: usize,
        pattern: impl Into<String>,
        position: MatchPosition,
        options: StringMatchOptions,
    ) -> Self {
        self.condition(OpcodeKind::StringMatch {
            param,
            pattern: pattern.into(),
            position,
            options,
        })
    }

    /// Close the current group with an action
    pub fn action(mut self, action: PolicyAction) -> Self {
        self.pending = OpcodeOptions::NONE;
        self.opcodes.push(Opcode::action(action));
        self
    }

    pub fn build(self) -> RuleResult<PolicyRule> {
        PolicyRule::new(self.opcodes)
    }

    pub fn build_with_limit(self, max_opcodes: usize) -> RuleResult<PolicyRule> {
        PolicyRule::with_limit(self.opcodes, max_opcodes)
    }
}
