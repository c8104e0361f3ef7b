/*!
 * Policy Module
 * Compiled policy rules and the bytecode evaluator run at interception time
 *
 * ## Usage
 * ```ignore
 * use sandbox_core::policy::*;
 *
 * let rule = PolicyRule::builder()
 *     .string_match(0, "c:\\temp\\", MatchPosition::At(0), StringMatchOptions::CASE_INSENSITIVE)
 *     .action(PolicyAction::GiveAllAccess)
 *     .build()?;
 *
 * let params = ParameterSet::new().with_wstring("name", "c:\\temp\\file.txt");
 * let mut processor = PolicyProcessor::new(&rule);
 * if processor.evaluate(EvalOptions::STRICT, &params) == PolicyResult::PolicyMatch {
 *     let action = processor.get_action();
 * }
 * ```
 */

mod context;
mod opcode;
mod params;
mod processor;
mod rule;
mod types;

pub use context::MatchContext;
pub use opcode::{NumberValue, Opcode, OpcodeKind};
pub use params::{Parameter, ParameterSet, ParameterValue};
pub use processor::{PolicyProcessor, ProcessorState};
pub use rule::{PolicyRule, PolicyRuleBuilder};
pub use types::{
    EvalOptions, EvalResult, MatchPosition, OpcodeOptions, PolicyAction, PolicyResult, RuleError,
    RuleResult, StringMatchOptions,
};
