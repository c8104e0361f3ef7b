/*!
 * Policy Processor Tests
 */

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use sandbox_core::policy::*;
use std::sync::Arc;

fn flag(value: bool) -> Opcode {
    if value {
        Opcode::always_true(OpcodeOptions::NONE)
    } else {
        Opcode::always_false(OpcodeOptions::NONE)
    }
}

#[test]
fn test_and_group_concrete_scenario() {
    let params = ParameterSet::new()
        .with_wstring("path", "c:\\temp\\report.txt")
        .with_u32("access", 0x1);

    // A: path under c:\temp, B: read access requested
    let rule = PolicyRule::builder()
        .string_match(0, "c:\\temp\\", MatchPosition::At(0), StringMatchOptions::CASE_INSENSITIVE)
        .number_and_match(1, 0x2)
        .action(PolicyAction::GiveAllAccess)
        .build()
        .unwrap();

    let mut processor = PolicyProcessor::new(&rule);
    assert_eq!(processor.evaluate(EvalOptions::STRICT, &params), PolicyResult::NoPolicyMatch);
    assert_eq!(processor.get_action(), None);

    let params = ParameterSet::new()
        .with_wstring("path", "C:\\TEMP\\report.txt")
        .with_u32("access", 0x3);
    assert_eq!(processor.evaluate(EvalOptions::STRICT, &params), PolicyResult::PolicyMatch);
    assert_eq!(processor.get_action(), Some(PolicyAction::GiveAllAccess));
}

#[test]
fn test_or_group_stops_at_first_true() {
    let rule = PolicyRule::new(vec![
        Opcode::always_false(OpcodeOptions::USE_OR_EVAL),
        Opcode::always_true(OpcodeOptions::NONE),
        Opcode::always_false(OpcodeOptions::NONE),
        Opcode::always_false(OpcodeOptions::NONE),
        Opcode::action(PolicyAction::GiveReadOnly),
        Opcode::action(PolicyAction::DenyAccess),
    ])
    .unwrap();

    let mut processor = PolicyProcessor::new(&rule);
    assert_eq!(
        processor.evaluate(EvalOptions::SHORT_EVAL, &ParameterSet::new()),
        PolicyResult::PolicyMatch
    );
    assert_eq!(processor.get_action(), Some(PolicyAction::GiveReadOnly));
    assert_eq!(processor.action_index(), Some(4));
    // two conditions and the action; the two trailing conditions are skipped
    assert_eq!(processor.opcodes_evaluated(), 3);
}

#[test]
fn test_string_wildcard_chain() {
    // c:\users\*\appdata\* compiled as two chained matches
    let rule = PolicyRule::builder()
        .string_match(0, "c:\\users\\", MatchPosition::At(0), StringMatchOptions::CASE_INSENSITIVE)
        .string_match(0, "\\appdata\\", MatchPosition::SeekForward, StringMatchOptions::CASE_INSENSITIVE)
        .action(PolicyAction::AskBroker)
        .build()
        .unwrap();

    let hit = ParameterSet::new().with_wstring("path", "C:\\Users\\alice\\AppData\\Local\\x");
    let miss = ParameterSet::new().with_wstring("path", "c:\\users\\alice\\documents\\x");
    let null = ParameterSet::new().with_null_string("path");

    let mut processor = PolicyProcessor::new(&rule);
    assert_eq!(processor.evaluate(EvalOptions::STRICT, &hit), PolicyResult::PolicyMatch);
    assert_eq!(processor.evaluate(EvalOptions::STRICT, &miss), PolicyResult::NoPolicyMatch);
    assert_eq!(processor.evaluate(EvalOptions::STRICT, &null), PolicyResult::PolicyError);
}

#[test]
fn test_negated_condition() {
    let rule = PolicyRule::builder()
        .not()
        .number_match(0, NumberValue::U32(0))
        .action(PolicyAction::FakeAccessDenied(0xC000_0022))
        .build()
        .unwrap();

    let mut processor = PolicyProcessor::new(&rule);
    let nonzero = ParameterSet::new().with_u32("flags", 4);
    assert!(processor.evaluate(EvalOptions::STRICT, &nonzero).is_match());
    assert_eq!(processor.get_action(), Some(PolicyAction::FakeAccessDenied(0xC000_0022)));

    let zero = ParameterSet::new().with_u32("flags", 0);
    assert_eq!(processor.evaluate(EvalOptions::STRICT, &zero), PolicyResult::NoPolicyMatch);
}

#[test]
fn test_shared_rule_across_threads() {
    let rule = Arc::new(
        PolicyRule::builder()
            .number_match_range(0, 10, 20)
            .action(PolicyAction::GiveAllAccess)
            .build()
            .unwrap(),
    );

    let handles: Vec<_> = (0..8u32)
        .map(|i| {
            let rule = Arc::clone(&rule);
            std::thread::spawn(move || {
                let params = ParameterSet::new().with_u32("size", i * 4);
                PolicyProcessor::new(&rule).evaluate(EvalOptions::STRICT, &params)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for (i, result) in results.into_iter().enumerate() {
        let expected = if (10..=20).contains(&(i as u32 * 4)) {
            PolicyResult::PolicyMatch
        } else {
            PolicyResult::NoPolicyMatch
        };
        assert_eq!(result, expected, "size {}", i * 4);
    }
}

proptest! {
    #[test]
    fn prop_and_scenario(a in any::<bool>(), b in any::<bool>()) {
        let rule = PolicyRule::new(vec![flag(a), flag(b), Opcode::action(PolicyAction::GiveAllAccess)]).unwrap();
        let mut processor = PolicyProcessor::new(&rule);
        let result = processor.evaluate(EvalOptions::STRICT, &ParameterSet::new());
        if a && b {
            prop_assert_eq!(result, PolicyResult::PolicyMatch);
            prop_assert_eq!(processor.get_action(), Some(PolicyAction::GiveAllAccess));
        } else {
            prop_assert_eq!(result, PolicyResult::NoPolicyMatch);
            prop_assert_eq!(processor.get_action(), None);
            // evaluation stops at the first FALSE
            prop_assert_eq!(processor.opcodes_evaluated(), if a { 2 } else { 1 });
        }
    }

    #[test]
    fn prop_and_groups_match_first_all_true(groups in prop::collection::vec(prop::collection::vec(any::<bool>(), 1..4), 1..6)) {
        let mut opcodes = Vec::new();
        for (index, group) in groups.iter().enumerate() {
            opcodes.extend(group.iter().map(|&v| flag(v)));
            opcodes.push(Opcode::action(PolicyAction::FakeAccessDenied(index as u32)));
        }
        let rule = PolicyRule::new(opcodes).unwrap();
        let mut processor = PolicyProcessor::new(&rule);
        let result = processor.evaluate(EvalOptions::STRICT, &ParameterSet::new());

        match groups.iter().position(|g| g.iter().all(|&v| v)) {
            Some(index) => {
                prop_assert_eq!(result, PolicyResult::PolicyMatch);
                prop_assert_eq!(processor.get_action(), Some(PolicyAction::FakeAccessDenied(index as u32)));
            }
            None => prop_assert_eq!(result, PolicyResult::NoPolicyMatch),
        }
    }

    #[test]
    fn prop_or_group_fires_on_any_true(values in prop::collection::vec(any::<bool>(), 1..8)) {
        let mut opcodes: Vec<Opcode> = values.iter().map(|&v| flag(v)).collect();
        opcodes[0] = Opcode::new(opcodes[0].kind.clone(), OpcodeOptions::USE_OR_EVAL);
        opcodes.push(Opcode::action(PolicyAction::GiveAllAccess));
        let rule = PolicyRule::new(opcodes).unwrap();

        let mut processor = PolicyProcessor::new(&rule);
        let result = processor.evaluate(EvalOptions::STRICT, &ParameterSet::new());
        match values.iter().position(|&v| v) {
            Some(first) => {
                prop_assert_eq!(result, PolicyResult::PolicyMatch);
                prop_assert_eq!(processor.opcodes_evaluated(), first + 2);
            }
            None => prop_assert_eq!(result, PolicyResult::NoPolicyMatch),
        }
    }

    #[test]
    fn prop_evaluation_is_deterministic(
        access in any::<u32>(),
        mask in 1u32..,
        lower in 0u32..1000,
        span in 0u32..1000,
        stop_on_errors in any::<bool>(),
    ) {
        let rule = PolicyRule::builder()
            .number_and_match(0, mask)
            .number_match_range(1, lower, lower + span)
            .action(PolicyAction::GiveReadOnly)
            .always_true()
            .action(PolicyAction::DenyAccess)
            .build()
            .unwrap();
        let params = ParameterSet::new().with_u32("access", access).with_u32("size", access % 2000);
        let options = if stop_on_errors { EvalOptions::STRICT } else { EvalOptions::SHORT_EVAL };

        let mut first = PolicyProcessor::new(&rule);
        let mut second = PolicyProcessor::new(&rule);
        let a = first.evaluate(options, &params);
        let b = second.evaluate(options, &params);
        prop_assert_eq!(a, b);
        prop_assert_eq!(first.get_action(), second.get_action());
        prop_assert_eq!(first.opcodes_evaluated(), second.opcodes_evaluated());
    }
}
