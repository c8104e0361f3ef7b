/*!
 * Policy Processor
 * Walks a compiled rule against the parameters of an intercepted call
 *
 * Opcodes form groups, each closed by an action opcode. Within a group the
 * conditions are combined with AND semantics unless an opcode switched the
 * context to OR. Evaluation short-circuits:
 * - AND: the first FALSE condition fails the group; the rest of it, including
 *   its action, is skipped.
 * - OR: the first TRUE condition satisfies the group; the remaining
 *   conditions are skipped and the group's action fires.
 *
 * The processor is created per call and borrows the rule, so concurrent
 * evaluations never share mutable state.
 */

use super::context::MatchContext;
use super::params::ParameterSet;
use super::rule::PolicyRule;
use super::types::{EvalOptions, EvalResult, PolicyAction, PolicyResult};
use tracing::{debug, trace, warn};

/// Processor state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Scanning,
    Skipping,
    Terminated(PolicyResult),
}

/// Why the rest of a group is being skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skip {
    /// An AND condition failed: drop the group's action
    GroupFailed,
    /// An OR condition held: fire the group's action
    GroupSatisfied,
}

/// Condition bookkeeping for the group being scanned
#[derive(Debug, Default)]
struct GroupTally {
    conditions: usize,
    any_true: bool,
}

/// Evaluates one rule; cheap to create, one per intercepted call
#[derive(Debug)]
pub struct PolicyProcessor<'a> {
    policy: &'a PolicyRule,
    state: ProcessorState,
    action: Option<(usize, PolicyAction)>,
    evaluated: usize,
}

impl<'a> PolicyProcessor<'a> {
    pub fn new(policy: &'a PolicyRule) -> Self {
        Self {
            policy,
            state: ProcessorState::Scanning,
            action: None,
            evaluated: 0,
        }
    }

    /// Evaluate the bound rule
    ///
    /// Returns `PolicyError` without evaluating anything if the rule is empty
    /// or `options` lacks `SHORT_EVAL`. Callers must treat `PolicyError` as deny.
    pub fn evaluate(&mut self, options: EvalOptions, params: &ParameterSet) -> PolicyResult {
        self.state = ProcessorState::Scanning;
        self.action = None;
        self.evaluated = 0;

        let opcodes = self.policy.opcodes();
        if opcodes.is_empty() {
            warn!("Refusing to evaluate an empty policy");
            return self.terminate(PolicyResult::PolicyError);
        }
        if !options.contains(EvalOptions::SHORT_EVAL) {
            warn!(options = options.bits(), "Policy evaluation requires short-circuit mode");
            return self.terminate(PolicyResult::PolicyError);
        }

        let stop_on_errors = options.contains(EvalOptions::STOP_ON_ERRORS);
        let mut ctx = MatchContext::new();
        let mut evaluation = false;
        let mut skip: Option<Skip> = None;
        let mut group = GroupTally::default();

        for (index, opcode) in opcodes.iter().enumerate() {
            if let Some(reason) = skip {
                if !opcode.is_action() {
                    continue;
                }
                match reason {
                    Skip::GroupSatisfied => {
                        self.evaluated += 1;
                        if let EvalResult::Action(action) = opcode.evaluate(params, &mut ctx) {
                            return self.matched(index, action);
                        }
                        // Rule validation keeps actions un-negated, so this is unreachable
                        // in practice; treat it as a broken rule.
                        return self.terminate(PolicyResult::PolicyError);
                    }
                    Skip::GroupFailed => {
                        trace!(index, "Skipped action of failed group");
                        skip = None;
                        self.state = ProcessorState::Scanning;
                        ctx.clear();
                        group = GroupTally::default();
                        continue;
                    }
                }
            }

            self.evaluated += 1;
            match opcode.evaluate(params, &mut ctx) {
                EvalResult::Condition(false) => {
                    evaluation = false;
                    group.conditions += 1;
                    if !ctx.is_or_mode() {
                        skip = Some(Skip::GroupFailed);
                        self.state = ProcessorState::Skipping;
                    }
                }
                EvalResult::Condition(true) => {
                    evaluation = true;
                    group.conditions += 1;
                    group.any_true = true;
                    if ctx.is_or_mode() {
                        skip = Some(Skip::GroupSatisfied);
                        self.state = ProcessorState::Skipping;
                    }
                }
                EvalResult::Error => {
                    if stop_on_errors {
                        debug!(index, "Opcode error aborted evaluation");
                        return self.terminate(PolicyResult::PolicyError);
                    }
                    trace!(index, "Ignoring opcode error");
                    group.conditions += 1;
                }
                EvalResult::Action(action) => {
                    if ctx.is_or_mode() && group.conditions > 0 && !group.any_true {
                        // OR group where nothing held
                        evaluation = false;
                        ctx.clear();
                        group = GroupTally::default();
                        continue;
                    }
                    return self.matched(index, action);
                }
            }
        }

        if evaluation {
            // Conditions held but no action closed the group: a rule authoring defect
            warn!(
                opcodes = opcodes.len(),
                "Policy exhausted with a positive evaluation and no action"
            );
            return self.terminate(PolicyResult::PolicyError);
        }

        self.terminate(PolicyResult::NoPolicyMatch)
    }

    /// Terminal action after a `PolicyMatch`
    pub fn get_action(&self) -> Option<PolicyAction> {
        self.action.map(|(_, action)| action)
    }

    /// Index of the opcode that produced the action
    pub fn action_index(&self) -> Option<usize> {
        self.action.map(|(index, _)| index)
    }

    /// Opcodes evaluated by the last `evaluate` call (skipped ones excluded)
    pub fn opcodes_evaluated(&self) -> usize {
        self.evaluated
    }

    pub fn state(&self) -> ProcessorState {
        self.state
    }

    pub fn policy(&self) -> &'a PolicyRule {
        self.policy
    }

    fn matched(&mut self, index: usize, action: PolicyAction) -> PolicyResult {
        debug!(index, action = %action, evaluated = self.evaluated, "Policy matched");
        self.action = Some((index, action));
        self.terminate(PolicyResult::PolicyMatch)
    }

    fn terminate(&mut self, result: PolicyResult) -> PolicyResult {
        self.state = ProcessorState::Terminated(result);
        result
    }
}
