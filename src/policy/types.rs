/*!
 * Policy Types
 * Evaluation outcomes, terminal actions and option bitmasks
 */

use crate::core::types::NtStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use thiserror::Error;

/// Rule construction result
///
/// # Must Use
/// A rule that failed validation must never be bound to a processor
#[must_use = "rule construction can fail and must be handled"]
pub type RuleResult<T> = Result<T, RuleError>;

/// Errors raised while building or decoding a compiled rule
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum RuleError {
    #[error("Policy rule has no opcodes")]
    Empty,

    #[error("Policy rule has {count} opcodes, limit is {max}")]
    TooManyOpcodes { count: usize, max: usize },

    #[error("Opcode {index} reads parameter {param}, limit is {max}")]
    ParameterOutOfRange { index: usize, param: usize, max: usize },

    #[error("Opcode {index} has an inverted range [{lower}, {upper}]")]
    InvalidRange { index: usize, lower: u32, upper: u32 },

    #[error("Opcode {index} matches an empty string")]
    EmptyPattern { index: usize },

    #[error("Action opcode {index} cannot be negated")]
    NegatedAction { index: usize },

    #[error("Failed to encode rule: {0}")]
    Encode(String),

    #[error("Failed to decode rule: {0}")]
    Decode(String),
}

/// Outcome of a whole rule evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyResult {
    /// An action opcode was reached; see `PolicyProcessor::get_action`
    PolicyMatch,
    /// No group matched
    NoPolicyMatch,
    /// Misconfiguration or evaluation failure; callers must treat it as deny
    PolicyError,
}

impl PolicyResult {
    #[inline]
    pub fn is_match(self) -> bool {
        matches!(self, PolicyResult::PolicyMatch)
    }
}

/// Terminal enforcement effect carried by an action opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    /// Forward the call to the broker for a decision
    AskBroker,
    /// Deny with a plain access-denied status
    DenyAccess,
    /// Allow, downgraded to read-only access
    GiveReadOnly,
    /// Allow with the requested access
    GiveAllAccess,
    /// Allow from the broker's cached handle
    GiveCached,
    /// Allow only the first request
    GiveFirst,
    /// Allow and raise an alarm
    SignalAlarm,
    /// Pretend the call succeeded
    FakeSuccess,
    /// Fail the call with the given status
    FakeAccessDenied(NtStatus),
    /// Kill the calling process
    TerminateProcess,
}

impl PolicyAction {
    /// Whether the effect lets the intercepted call proceed in some form
    pub fn is_allow(self) -> bool {
        matches!(
            self,
            PolicyAction::GiveReadOnly
                | PolicyAction::GiveAllAccess
                | PolicyAction::GiveCached
                | PolicyAction::GiveFirst
                | PolicyAction::SignalAlarm
        )
    }

    pub fn is_deny(self) -> bool {
        matches!(
            self,
            PolicyAction::DenyAccess
                | PolicyAction::FakeAccessDenied(_)
                | PolicyAction::TerminateProcess
        )
    }
}

impl fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyAction::FakeAccessDenied(status) => {
                write!(f, "fake_access_denied(0x{status:08x})")
            }
            other => write!(f, "{other:?}"),
        }
    }
}

/// Result of evaluating a single opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalResult {
    /// Condition outcome (FALSE/TRUE)
    Condition(bool),
    /// The opcode could not be evaluated against the call parameters
    Error,
    /// Terminal action
    Action(PolicyAction),
}

impl EvalResult {
    pub const TRUE: EvalResult = EvalResult::Condition(true);
    pub const FALSE: EvalResult = EvalResult::Condition(false);

    #[inline]
    pub fn is_action(self) -> bool {
        matches!(self, EvalResult::Action(_))
    }

    #[inline]
    pub fn from_bool(value: bool) -> Self {
        EvalResult::Condition(value)
    }
}

macro_rules! option_bits {
    ($(#[$meta:meta])* $name:ident($repr:ty) { $($(#[$fmeta:meta])* $flag:ident = $value:expr;)* }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name($repr);

        impl $name {
            pub const NONE: $name = $name(0);
            $($(#[$fmeta])* pub const $flag: $name = $name($value);)*

            #[inline]
            pub const fn from_bits(bits: $repr) -> Self {
                $name(bits)
            }

            #[inline]
            pub const fn bits(self) -> $repr {
                self.0
            }

            #[inline]
            pub const fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            #[inline]
            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }
        }

        impl BitOr for $name {
            type Output = $name;

            #[inline]
            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            #[inline]
            fn bitor_assign(&mut self, rhs: $name) {
                self.0 |= rhs.0;
            }
        }
    };
}

option_bits! {
    /// Per-opcode options applied after the opcode-specific evaluation
    OpcodeOptions(u16) {
        /// Flip TRUE/FALSE
        NEGATE_EVAL = 0x1;
        /// Reset the match context
        CLEAR_CONTEXT = 0x2;
        /// Switch the current group to OR semantics
        USE_OR_EVAL = 0x4;
    }
}

option_bits! {
    /// Options for a whole evaluation
    EvalOptions(u32) {
        /// Short-circuit evaluation; the only supported mode
        SHORT_EVAL = 0x1;
        /// Abort on the first opcode error
        STOP_ON_ERRORS = 0x2;
    }
}

impl EvalOptions {
    /// Short-circuit, fail on errors
    pub const STRICT: EvalOptions = EvalOptions(0x1 | 0x2);
}

option_bits! {
    /// String comparison options
    StringMatchOptions(u8) {
        CASE_INSENSITIVE = 0x1;
        /// The match must consume the remainder of the string exactly
        EXACT_LENGTH = 0x2;
    }
}

/// Where a string pattern must be found, relative to the context cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPosition {
    /// Exactly `n` characters past the cursor
    At(u32),
    /// Anywhere at or after the cursor
    SeekForward,
    /// As a suffix of the string
    End,
}
