/*!
 * Interception Manager Tests
 */

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use sandbox_core::interception::*;
use sandbox_core::SandboxCoreConfig;
use std::sync::Arc;

fn symbol(name: &str) -> Interceptor {
    Interceptor::symbol(name).unwrap()
}

#[test]
fn test_concrete_partition_scenario() {
    let mut manager = InterceptionManager::new();
    manager
        .add_to_patched_functions("ntdll", "NtCreateFile", InterceptionType::ServiceCall, symbol("TargetNtCreateFile"))
        .unwrap();
    manager
        .add_to_patched_functions("kernel32", "CreateFileEx", InterceptionType::Eat, symbol("TargetCreateFileEx"))
        .unwrap();
    manager
        .add_to_patched_functions("kernel32", "CreateMutex", InterceptionType::Eat, symbol("TargetCreateMutex"))
        .unwrap();

    assert_eq!(manager.cold_interceptions().count(), 1);
    assert_eq!(manager.hot_interceptions().count(), 2);

    let size = manager.get_buffer_size();
    let mut buffer = vec![0u8; size];
    assert_eq!(manager.setup_config_buffer(&mut buffer).unwrap(), size);

    let decoded = ConfigBufferReader::new(&buffer).unwrap().decode();
    assert_eq!(decoded.groups.len(), 1);
    assert_eq!(decoded.groups[0].module, "kernel32");
    let functions: Vec<_> = decoded.groups[0].functions.iter().map(|f| f.function.as_str()).collect();
    assert_eq!(functions, vec!["CreateFileEx", "CreateMutex"]);

    // Hot records were consumed; the cold one stays for the broker
    assert_eq!(manager.len(), 1);
    let cold: Vec<_> = manager.cold_interceptions().map(|r| r.function.as_str()).collect();
    assert_eq!(cold, vec!["NtCreateFile"]);
    assert_eq!(manager.get_buffer_size(), 0);
}

#[test]
fn test_small_buffer_changes_nothing() {
    let mut manager = InterceptionManager::new();
    manager
        .add_to_patched_functions("user32.dll", "MessageBoxW", InterceptionType::Sidestep, symbol("TargetMessageBoxW"))
        .unwrap();
    let size = manager.get_buffer_size();

    let mut small = vec![0x5Au8; size - 8];
    assert_eq!(
        manager.setup_config_buffer(&mut small),
        Err(InterceptionError::BufferTooSmall {
            required: size,
            actual: size - 8
        })
    );
    assert!(small.iter().all(|&b| b == 0x5A));
    assert_eq!(manager.hot_interceptions().count(), 1);
    assert_eq!(manager.get_buffer_size(), size);
}

#[test]
fn test_initialize_with_simulated_target() {
    let mut manager = InterceptionManager::from_config(&SandboxCoreConfig::default());
    manager
        .add_to_patched_functions("ntdll.dll", "NtOpenKey", InterceptionType::Sidestep, symbol("TargetNtOpenKey"))
        .unwrap();
    manager
        .add_to_patched_functions("advapi32.dll", "RegOpenKeyExW", InterceptionType::SmartSidestep, Interceptor::address(0x7ff7_1000).unwrap())
        .unwrap();
    manager.add_to_unload_modules("sbiedll.dll").unwrap();

    let mut target = SimulatedTarget::new(0x1_4000_0000);
    let summary = manager.initialize_interceptions(&mut target).unwrap();
    assert_eq!(summary.cold_functions, 1);
    assert_eq!(summary.hot_functions, 1);
    assert_eq!(summary.dll_groups, 2);
    assert_eq!(summary.remote_address, Some(target.transfers()[0].0));

    let reader = ConfigBufferReader::new(target.last_transfer().unwrap()).unwrap();
    // Only address interceptors are hot, so no base address is needed
    assert_eq!(reader.interceptor_base(), 0);
    assert_eq!(reader.decode().unload_modules(), vec!["sbiedll.dll"]);
}

#[test]
fn test_injected_cold_policy() {
    let policy = Arc::new(LocalModulePolicy::new(["ntdll", "kernelbase"]));
    let mut manager = InterceptionManager::with_policy(policy);
    manager
        .add_to_patched_functions("KernelBase.dll", "CreateFileW", InterceptionType::Eat, symbol("T1"))
        .unwrap();
    manager
        .add_to_patched_functions("kernel32.dll", "CreateFileW", InterceptionType::Eat, symbol("T2"))
        .unwrap();

    assert_eq!(manager.cold_interceptions().count(), 1);
    assert!(manager.names_used());
}

#[test]
fn test_duplicates_are_kept_in_order() {
    let mut manager = InterceptionManager::new();
    for target in ["A", "B"] {
        manager
            .add_to_patched_functions("gdi32.dll", "CreateDCW", InterceptionType::Eat, symbol(target))
            .unwrap();
    }
    let buffer = manager.build_config_buffer().unwrap();
    let records = ConfigBufferReader::new(&buffer).unwrap().decode().records();
    let targets: Vec<_> = records.iter().map(|r| r.interceptor.to_string()).collect();
    assert_eq!(targets, vec!["A", "B"]);
}

#[test]
fn test_nul_in_function_name_never_reaches_the_buffer() {
    let mut manager = InterceptionManager::new();
    assert!(matches!(
        manager.add_to_patched_functions("kernel32.dll", "Create\0File", InterceptionType::Eat, Interceptor::address(0x10).unwrap()),
        Err(InterceptionError::InvalidRecord { .. })
    ));
    assert_eq!(manager.get_buffer_size(), 0);
    assert!(manager.build_config_buffer().unwrap().is_empty());
}

#[test]
fn test_unload_and_patch_spellings_conflict() {
    let mut manager = InterceptionManager::new();
    manager.add_to_unload_modules("evil").unwrap();
    assert_eq!(
        manager.add_to_patched_functions("evil.dll", "Fn", InterceptionType::Eat, symbol("TargetFn")),
        Err(InterceptionError::UnloadConflict { module: "evil.dll".into() })
    );

    let buffer = manager.build_config_buffer().unwrap();
    let decoded = ConfigBufferReader::new(&buffer).unwrap().decode();
    assert_eq!(decoded.groups.len(), 1);
    assert_eq!(decoded.unload_modules(), vec!["evil"]);
}

fn technique() -> impl Strategy<Value = InterceptionType> {
    prop_oneof![
        Just(InterceptionType::ServiceCall),
        Just(InterceptionType::Eat),
        Just(InterceptionType::Sidestep),
        Just(InterceptionType::SmartSidestep),
    ]
}

fn module() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["ntdll.dll", "NTDLL", "kernel32.dll", "user32.dll", "advapi32.dll"])
}

fn record() -> impl Strategy<Value = (&'static str, String, InterceptionType, u64)> {
    (module(), "[A-Za-z]{1,12}", technique(), 1u64..u64::MAX)
}

fn suffix_variant(base: &str) -> impl Strategy<Value = String> {
    let base = base.to_string();
    (any::<bool>(), any::<bool>()).prop_map(move |(upper, suffix)| {
        let name = if upper { base.to_ascii_uppercase() } else { base.clone() };
        if suffix {
            format!("{name}.dll")
        } else {
            name
        }
    })
}

proptest! {
    #[test]
    fn prop_embedded_nul_is_rejected(head in "[A-Za-z]{0,8}", tail in "[A-Za-z.]{0,8}") {
        let name = format!("{head}\0{tail}");
        let mut manager = InterceptionManager::new();

        prop_assert!(Interceptor::symbol(name.as_str()).is_none());
        let is_invalid = |r: Result<(), InterceptionError>| matches!(r, Err(InterceptionError::InvalidRecord { .. }));
        prop_assert!(is_invalid(manager.add_to_patched_functions(name.as_str(), "Fn", InterceptionType::Eat, Interceptor::address(1).unwrap())));
        prop_assert!(is_invalid(manager.add_to_patched_functions("kernel32.dll", name.as_str(), InterceptionType::Eat, Interceptor::address(1).unwrap())));
        prop_assert!(is_invalid(manager.add_to_unload_modules(name.as_str())));
        prop_assert!(manager.is_empty());
    }

    #[test]
    fn prop_unload_conflict_ignores_spelling(
        (unload, patch) in "[a-z]{1,8}".prop_flat_map(|base| (suffix_variant(&base), suffix_variant(&base))),
    ) {
        prop_assume!(unload.to_ascii_lowercase().trim_end_matches(".dll") != "ntdll");

        let mut manager = InterceptionManager::new();
        manager.add_to_unload_modules(unload.as_str()).unwrap();
        let conflict = manager.add_to_patched_functions(patch.as_str(), "Fn", InterceptionType::Eat, Interceptor::address(1).unwrap());
        prop_assert!(matches!(conflict, Err(InterceptionError::UnloadConflict { .. })), "expected UnloadConflict");

        let mut reversed = InterceptionManager::new();
        reversed
            .add_to_patched_functions(patch.as_str(), "Fn", InterceptionType::Eat, Interceptor::address(1).unwrap())
            .unwrap();
        prop_assert!(matches!(reversed.add_to_unload_modules(unload.as_str()), Err(InterceptionError::UnloadConflict { .. })), "expected UnloadConflict");
    }

    #[test]
    fn prop_partition_is_order_independent(records in prop::collection::vec(record(), 0..24)) {
        let mut forward = InterceptionManager::new();
        for (module, function, technique, address) in &records {
            forward
                .add_to_patched_functions(*module, function.as_str(), *technique, Interceptor::address(*address).unwrap())
                .unwrap();
        }
        let mut backward = InterceptionManager::new();
        for (module, function, technique, address) in records.iter().rev() {
            backward
                .add_to_patched_functions(*module, function.as_str(), *technique, Interceptor::address(*address).unwrap())
                .unwrap();
        }

        let mut cold_a: Vec<_> = forward.cold_interceptions().cloned().collect();
        let mut cold_b: Vec<_> = backward.cold_interceptions().cloned().collect();
        cold_a.sort_by(|x, y| x.to_string().cmp(&y.to_string()));
        cold_b.sort_by(|x, y| x.to_string().cmp(&y.to_string()));
        prop_assert_eq!(cold_a, cold_b);
        prop_assert_eq!(forward.hot_interceptions().count(), backward.hot_interceptions().count());
    }

    #[test]
    fn prop_later_registrations_do_not_reclassify(
        first in prop::collection::vec(record(), 1..12),
        later in prop::collection::vec(record(), 0..12),
    ) {
        let mut manager = InterceptionManager::new();
        for (module, function, technique, address) in &first {
            manager
                .add_to_patched_functions(*module, function.as_str(), *technique, Interceptor::address(*address).unwrap())
                .unwrap();
        }
        let before: Vec<_> = manager.cold_interceptions().cloned().collect();

        for (module, function, technique, address) in &later {
            manager
                .add_to_patched_functions(*module, function.as_str(), *technique, Interceptor::address(*address).unwrap())
                .unwrap();
        }
        let after: Vec<_> = manager.cold_interceptions().take(before.len()).cloned().collect();
        prop_assert_eq!(before, after);
    }

    #[test]
    fn prop_buffer_size_is_sufficient(records in prop::collection::vec(record(), 0..24)) {
        let mut manager = InterceptionManager::new();
        for (module, function, technique, address) in &records {
            manager
                .add_to_patched_functions(*module, function.as_str(), *technique, Interceptor::address(*address).unwrap())
                .unwrap();
        }
        let size = manager.get_buffer_size();
        let mut buffer = vec![0u8; size];
        prop_assert_eq!(manager.setup_config_buffer(&mut buffer), Ok(size));
        if size > 0 {
            prop_assert!(ConfigBufferReader::new(&buffer).is_ok());
        }
    }
}
