/*!
 * ACL Helper Tests
 * Grants are appended once and committed atomically
 */

use mockall::mock;
use mockall::predicate::eq;
use pretty_assertions::assert_eq;
use sandbox_core::acl::*;

mock! {
    pub Security {}

    impl SecurityApi for Security {
        fn token_default_dacl(&self, token: TokenHandle) -> AclResult<Option<Acl>>;
        fn set_token_default_dacl(&self, token: TokenHandle, dacl: &Acl) -> AclResult<()>;
        fn token_user(&self, token: TokenHandle) -> AclResult<Sid>;
        fn object_dacl(&self, object: ObjectHandle, object_type: ObjectType) -> AclResult<Option<Acl>>;
        fn set_object_dacl(&self, object: ObjectHandle, object_type: ObjectType, dacl: &Acl) -> AclResult<()>;
    }
}

fn user() -> Sid {
    "S-1-5-21-1004336348-1177238915-682003330-512".parse().unwrap()
}

#[test]
fn test_failed_read_never_commits() {
    let mut api = MockSecurity::new();
    api.expect_token_default_dacl().returning(|_| {
        Err(AclError::Os {
            operation: SecurityOperation::GetTokenDefaultDacl,
            code: 5,
        })
    });
    api.expect_set_token_default_dacl().never();

    let result = add_sid_to_default_dacl(&api, TokenHandle(4), &user(), AccessMask::GENERIC_ALL);
    assert!(matches!(result, Err(AclError::Os { code: 5, .. })));
}

#[test]
fn test_failed_user_lookup_never_reads_dacl() {
    let mut api = MockSecurity::new();
    api.expect_token_user().returning(|_| {
        Err(AclError::Os {
            operation: SecurityOperation::GetTokenUser,
            code: ERROR_INVALID_HANDLE,
        })
    });
    api.expect_token_default_dacl().never();
    api.expect_set_token_default_dacl().never();

    assert!(add_user_sid_to_default_dacl(&api, TokenHandle(8), AccessMask::GENERIC_ALL).is_err());
}

#[test]
fn test_commit_receives_widened_acl() {
    let system = Sid::well_known(WellKnownSid::LocalSystem);
    let before = Acl::from_entries(vec![Ace::grant(system.clone(), AccessMask::GENERIC_ALL)]);
    let expected = before
        .with_appended(Ace::grant(user(), AccessMask::GENERIC_READ))
        .unwrap();

    let mut api = MockSecurity::new();
    let current = before.clone();
    api.expect_object_dacl()
        .with(eq(ObjectHandle(0x40)), eq(ObjectType::File))
        .times(1)
        .returning(move |_, _| Ok(Some(current.clone())));
    api.expect_set_object_dacl()
        .withf(move |object, object_type, dacl| {
            *object == ObjectHandle(0x40) && *object_type == ObjectType::File && *dacl == expected
        })
        .times(1)
        .returning(|_, _, _| Ok(()));

    add_sid_to_object(&api, ObjectHandle(0x40), ObjectType::File, &user(), AccessMask::GENERIC_READ).unwrap();
}

#[test]
fn test_commit_failure_is_reported() {
    let mut api = MockSecurity::new();
    api.expect_object_dacl().returning(|_, _| Ok(None));
    api.expect_set_object_dacl().times(1).returning(|_, _, _| {
        Err(AclError::Os {
            operation: SecurityOperation::SetObjectDacl,
            code: 5,
        })
    });

    let result = add_known_sid_to_object(
        &api,
        ObjectHandle(0x44),
        ObjectType::RegistryKey,
        WellKnownSid::RestrictedCode,
        AccessMask::GENERIC_READ,
    );
    assert_eq!(
        result,
        Err(AclError::Os {
            operation: SecurityOperation::SetObjectDacl,
            code: 5
        })
    );
}

#[test]
fn test_simulated_token_round_trip() {
    let api = SimulatedSecurityApi::new();
    let token = api.create_token(user(), None).unwrap();

    add_user_sid_to_default_dacl(&api, token, AccessMask::GENERIC_ALL).unwrap();
    add_sid_to_default_dacl(&api, token, &Sid::well_known(WellKnownSid::LocalSystem), AccessMask::GENERIC_ALL).unwrap();

    let dacl = get_default_dacl(&api, token).unwrap().unwrap();
    let sids: Vec<String> = dacl.entries().iter().filter_map(Ace::sid).map(Sid::to_string).collect();
    assert_eq!(sids, vec![user().to_string(), "S-1-5-18".to_string()]);
    assert_eq!(api.commit_count(), 2);
}

#[test]
fn test_simulated_object_type_mismatch() {
    let api = SimulatedSecurityApi::new();
    let object = api.create_object(ObjectType::Service, None).unwrap();

    let result = add_sid_to_object(&api, object, ObjectType::File, &user(), AccessMask::GENERIC_READ);
    assert_eq!(
        result,
        Err(AclError::Os {
            operation: SecurityOperation::GetObjectDacl,
            code: ERROR_INVALID_PARAMETER
        })
    );
    assert_eq!(api.commit_count(), 0);
}

#[test]
fn test_simulated_clear_failures_recovers() {
    let api = SimulatedSecurityApi::new();
    let object = api.create_object(ObjectType::KernelObject, Some(&Acl::new())).unwrap();
    api.fail_on(SecurityOperation::SetObjectDacl, 5);
    assert!(add_known_sid_to_kernel_object(&api, object, &user(), AccessMask::SYNCHRONIZE).is_err());
    assert_eq!(api.object_dacl(object, ObjectType::KernelObject).unwrap(), Some(Acl::new()));

    api.clear_failures();
    add_known_sid_to_kernel_object(&api, object, &user(), AccessMask::SYNCHRONIZE).unwrap();
    let dacl = api.object_dacl(object, ObjectType::KernelObject).unwrap().unwrap();
    assert!(dacl.grants(&user(), AccessMask::SYNCHRONIZE));
}

#[test]
fn test_platform_api_is_usable_as_trait_object() {
    let api: Box<dyn SecurityApi> = platform_security_api();
    assert!(api.token_default_dacl(TokenHandle(0xDEAD)).is_err());
}
