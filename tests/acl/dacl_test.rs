/*!
 * DACL Property Tests
 */

use proptest::prelude::*;
use sandbox_core::acl::*;

fn sid() -> impl Strategy<Value = Sid> {
    (0u64..=6, prop::collection::vec(any::<u32>(), 1..6))
        .prop_map(|(authority, subs)| Sid::new(authority, &subs).unwrap())
}

fn mask() -> impl Strategy<Value = AccessMask> {
    any::<u32>().prop_map(AccessMask::from_bits)
}

fn acl() -> impl Strategy<Value = Acl> {
    prop::collection::vec((sid(), mask()), 0..12).prop_map(|entries| {
        Acl::from_entries(entries.into_iter().map(|(s, m)| Ace::grant(s, m)).collect())
    })
}

proptest! {
    #[test]
    fn prop_append_is_monotonic(base in acl(), sid in sid(), mask in mask()) {
        let widened = add_sid_to_dacl(&sid, Some(&base), AccessMode::Grant, mask).unwrap();
        prop_assert!(widened.extends(&base));
        prop_assert_eq!(widened.len(), base.len() + 1);
        prop_assert!(widened.grants(&sid, mask));
    }

    #[test]
    fn prop_binary_form_round_trips(acl in acl()) {
        let bytes = acl.to_bytes().unwrap();
        prop_assert_eq!(bytes.len(), acl.byte_len());
        prop_assert_eq!(Acl::from_bytes(&bytes).unwrap(), acl);
    }

    #[test]
    fn prop_sid_text_round_trips(sid in sid()) {
        prop_assert_eq!(sid.to_string().parse::<Sid>().unwrap(), sid);
    }

    #[test]
    fn prop_simulated_helper_preserves_prefix(base in acl(), sid in sid()) {
        let api = SimulatedSecurityApi::new();
        let object = api.create_object(ObjectType::WindowObject, Some(&base)).unwrap();
        add_sid_to_object(&api, object, ObjectType::WindowObject, &sid, AccessMask::GENERIC_READ).unwrap();

        let after = api.object_dacl(object, ObjectType::WindowObject).unwrap().unwrap();
        prop_assert!(after.extends(&base));
        prop_assert_eq!(after.len(), base.len() + 1);
    }
}
