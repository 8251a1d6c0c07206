// ABOUTME: Tests for backend lookup by name in the BackendRegistry.
// ABOUTME: Covers built-in backends, unknown names and custom factories.

use relay_agent::backends::mock::MockBackend;
use relay_agent::{BackendConfig, BackendRegistry, TaskClient};
use serde_json::json;
use std::sync::Arc;

#[test]
fn test_registry_creates_mock_backend() {
    let registry = BackendRegistry::default();
    let client = registry.create("mock", &json!({})).unwrap();
    assert_eq!(client.name(), "mock");
}

#[test]
fn test_registry_creates_direct_backend() {
    let registry = BackendRegistry::default();
    let client = registry
        .create("direct", &json!({"binary": "claude"}))
        .unwrap();
    assert_eq!(client.name(), "direct");
}

#[test]
fn test_registry_lists_available_backends() {
    let registry = BackendRegistry::default();
    assert_eq!(registry.available(), vec!["direct", "mock"]);
    assert!(registry.contains("mock"));
    assert!(!registry.contains("acp"));
}

#[test]
fn test_registry_unknown_backend_errors() {
    let registry = BackendRegistry::default();
    match registry.create("nonexistent", &json!({})) {
        Err(err) => {
            let message = err.to_string();
            assert!(message.contains("Unknown backend: nonexistent"));
            assert!(message.contains("direct, mock"));
        }
        Ok(_) => panic!("Expected error for unknown backend"),
    }
}

#[test]
fn test_registry_direct_rejects_bad_binary() {
    let registry = BackendRegistry::default();
    assert!(registry
        .create("direct", &json!({"binary": "../../bin/claude"}))
        .is_err());
}

#[test]
fn test_registry_custom_factory() {
    let registry = BackendRegistry::new().register("custom", |_config| {
        Ok(Arc::new(MockBackend::new()) as Arc<dyn TaskClient>)
    });
    let client = registry.create("custom", &json!({})).unwrap();
    assert_eq!(client.name(), "mock");
}

#[test]
fn test_registry_create_from_config() {
    let registry = BackendRegistry::default();
    let config = BackendConfig::direct("/usr/local/bin/claude");
    let client = registry.create_from_config(&config).unwrap();
    assert_eq!(client.name(), "direct");
}
