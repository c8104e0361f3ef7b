/*!
 * Config File Loading Tests
 */

use pretty_assertions::assert_eq;
use sandbox_core::config::{ConfigError, SandboxCoreConfig};
use sandbox_core::interception::{ColdModulePolicy, InterceptionManager, InterceptionType, Interceptor};
use sandbox_core::EvalOptions;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "local_modules": ["ntdll.dll", "kernelbase.dll"],
            "short_circuit": true,
            "max_opcodes_per_rule": 64
        }}"#
    )
    .unwrap();

    let config = SandboxCoreConfig::from_json_file(file.path()).unwrap();
    assert_eq!(config.local_modules.len(), 2);
    assert_eq!(config.max_opcodes_per_rule, 64);
    assert_eq!(config.eval_options(), EvalOptions::STRICT);

    let policy = config.cold_module_policy();
    assert!(policy.is_local_module("KERNELBASE"));
    assert!(!policy.is_local_module("kernel32.dll"));
}

#[test]
fn test_missing_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    match SandboxCoreConfig::from_json_file(&path) {
        Err(ConfigError::Io { path: reported, .. }) => {
            assert!(reported.ends_with("absent.json"));
        }
        other => panic!("expected an io error, got {other:?}"),
    }
}

#[test]
fn test_written_config_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sandbox.json");
    let mut config = SandboxCoreConfig::lenient();
    config.local_modules = vec!["ntdll.dll".into(), "win32u.dll".into()];
    std::fs::write(&path, config.to_json_string().unwrap()).unwrap();

    assert_eq!(SandboxCoreConfig::from_json_file(&path).unwrap(), config);
}

#[test]
fn test_manager_uses_configured_local_modules() {
    let config = SandboxCoreConfig::from_json_str(r#"{"local_modules": ["win32u"]}"#).unwrap();
    let mut manager = InterceptionManager::from_config(&config);
    manager
        .add_to_patched_functions("win32u.dll", "NtUserFindWindowEx", InterceptionType::Eat, Interceptor::address(0x10).unwrap())
        .unwrap();
    manager
        .add_to_patched_functions("ntdll.dll", "NtOpenFile", InterceptionType::Eat, Interceptor::address(0x20).unwrap())
        .unwrap();

    // ntdll is no longer local, so only the win32u patch stays with the broker
    let cold: Vec<_> = manager.cold_interceptions().map(|r| r.function.to_string()).collect();
    assert_eq!(cold, vec!["NtUserFindWindowEx".to_string()]);
}
