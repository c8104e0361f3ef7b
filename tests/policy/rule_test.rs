/*!
 * Policy Rule Tests
 */

use pretty_assertions::assert_eq;
use sandbox_core::policy::*;

fn file_rule() -> PolicyRule {
    PolicyRule::builder()
        .string_match(0, "\\??\\c:\\windows\\", MatchPosition::At(0), StringMatchOptions::CASE_INSENSITIVE)
        .not()
        .number_and_match(1, 0x4000_0000)
        .action(PolicyAction::GiveReadOnly)
        .or()
        .string_match(0, ".log", MatchPosition::End, StringMatchOptions::CASE_INSENSITIVE)
        .string_match(0, ".tmp", MatchPosition::End, StringMatchOptions::CASE_INSENSITIVE)
        .action(PolicyAction::GiveAllAccess)
        .build()
        .unwrap()
}

#[test]
fn test_builder_shape() {
    let rule = file_rule();
    assert_eq!(rule.len(), 6);
    assert_eq!(rule.action_count(), 2);
    assert!(rule.ends_with_action());
    assert!(rule.opcodes()[1].options.contains(OpcodeOptions::NEGATE_EVAL));
    assert!(rule.opcodes()[3].options.contains(OpcodeOptions::USE_OR_EVAL));
    assert!(rule.opcodes()[4].options.is_empty());
}

#[test]
fn test_bincode_transport_preserves_behavior() {
    let rule = file_rule();
    let bytes = rule.to_bincode().unwrap();
    let decoded = PolicyRule::from_bincode(&bytes).unwrap();
    assert_eq!(decoded, rule);

    let params = ParameterSet::new()
        .with_wstring("name", "\\??\\c:\\data\\trace.LOG")
        .with_u32("access", 0x4000_0000);
    let mut processor = PolicyProcessor::new(&decoded);
    assert_eq!(processor.evaluate(EvalOptions::STRICT, &params), PolicyResult::PolicyMatch);
    assert_eq!(processor.get_action(), Some(PolicyAction::GiveAllAccess));
}

#[test]
fn test_bincode_rejects_garbage() {
    assert!(matches!(
        PolicyRule::from_bincode(&[0xFF; 7]),
        Err(RuleError::Decode(_))
    ));

    // An empty opcode vector decodes but fails validation
    let empty = bincode::serialize(&Vec::<Opcode>::new()).unwrap();
    assert_eq!(PolicyRule::from_bincode(&empty), Err(RuleError::Empty));
}

#[test]
fn test_validation_errors() {
    assert_eq!(
        PolicyRule::builder().number_and_match(9, 1).action(PolicyAction::AskBroker).build(),
        Err(RuleError::ParameterOutOfRange {
            index: 0,
            param: 9,
            max: 9
        })
    );
    assert_eq!(
        PolicyRule::builder().number_match_range(0, 5, 4).action(PolicyAction::AskBroker).build(),
        Err(RuleError::InvalidRange {
            index: 0,
            lower: 5,
            upper: 4
        })
    );
    assert_eq!(
        PolicyRule::builder()
            .string_match(0, "", MatchPosition::SeekForward, StringMatchOptions::NONE)
            .action(PolicyAction::AskBroker)
            .build(),
        Err(RuleError::EmptyPattern { index: 0 })
    );
    assert_eq!(
        PolicyRule::new(vec![Opcode::new(
            OpcodeKind::Action(PolicyAction::GiveAllAccess),
            OpcodeOptions::NEGATE_EVAL
        )]),
        Err(RuleError::NegatedAction { index: 0 })
    );
    assert_eq!(
        PolicyRule::builder().always_true().always_true().always_true().build_with_limit(2),
        Err(RuleError::TooManyOpcodes { count: 3, max: 2 })
    );
}

#[test]
fn test_rule_without_action_is_representable() {
    let rule = PolicyRule::builder().always_false().build().unwrap();
    assert!(!rule.ends_with_action());
    let mut processor = PolicyProcessor::new(&rule);
    assert_eq!(
        processor.evaluate(EvalOptions::STRICT, &ParameterSet::new()),
        PolicyResult::NoPolicyMatch
    );
}

#[test]
fn test_json_deserialize_validates() {
    let rule = file_rule();
    let json = serde_json::to_string(&rule).unwrap();
    let back: PolicyRule = serde_json::from_str(&json).unwrap();
    assert_eq!(back, rule);

    assert!(serde_json::from_str::<PolicyRule>(r#"{"opcodes": []}"#).is_err());
}
