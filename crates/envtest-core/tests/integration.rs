use envtest_core::{
    DestroyRequest, EnvironmentRegistry, EnvtestError, Manager,
};
use envtest_runtime::MockBackend;
use envtest_schema::{CredentialBundle, EnvironmentConfig, Kubeconfig};
use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn crd_json(plural: &str) -> String {
    format!(
        r#"{{"apiVersion":"apiextensions.k8s.io/v1","kind":"CustomResourceDefinition","metadata":{{"name":"{plural}.example.com"}},"spec":{{"group":"example.com","names":{{"kind":"Widget","plural":"{plural}"}},"scope":"Namespaced","versions":[{{"name":"v1","served":true,"storage":true}}]}}}}"#
    )
}

fn isolated() -> (Arc<MockBackend>, Manager) {
    let backend = Arc::new(MockBackend::new());
    let manager = Manager::with_registry(backend.clone(), Arc::new(EnvironmentRegistry::new()));
    (backend, manager)
}

#[test]
fn create_then_destroy_starts_and_stops_once() {
    let (backend, manager) = isolated();
    let document = manager.create(&EnvironmentConfig::default()).unwrap();

    manager.destroy(Some(&document)).unwrap();

    assert!(!manager.registry().contains(&document));
    assert_eq!(backend.starts(), 1);
    assert_eq!(backend.stops(), 1);
    assert_eq!(backend.running(), 0);
}

#[test]
fn credential_document_has_one_of_each_entry() {
    let (_, manager) = isolated();
    let document = manager.create(&EnvironmentConfig::default()).unwrap();

    let config: Kubeconfig = serde_json::from_str(&document).unwrap();
    assert_eq!(config.clusters.len(), 1);
    assert_eq!(config.users.len(), 1);
    assert_eq!(config.contexts.len(), 1);

    let identity = &config.users[0].name;
    let expected_context = format!("{identity}@envtest");
    assert_eq!(config.contexts[0].name, expected_context);
    assert_eq!(config.current_context, expected_context);

    let bundle = CredentialBundle::decode(&document).unwrap();
    assert!(!bundle.client_key_data.is_empty());
    assert!(!bundle.certificate_authority_data.is_empty());
}

#[test]
fn destroy_of_unregistered_key_is_noop() {
    let (backend, manager) = isolated();
    let live = manager.create(&EnvironmentConfig::default()).unwrap();
    let gone = manager.create(&EnvironmentConfig::default()).unwrap();
    manager.destroy(Some(&gone)).unwrap();
    let stops = backend.stops();

    for key in [None, Some(""), Some("never issued"), Some(gone.as_str())] {
        manager.destroy(key).unwrap();
    }

    assert_eq!(backend.stops(), stops);
    assert_eq!(manager.len(), 1);
    assert!(manager.registry().contains(&live));
}

#[test]
fn malformed_crd_aborts_before_start() {
    let (backend, manager) = isolated();
    let config = EnvironmentConfig::default()
        .with_crd(crd_json("alphas"))
        .with_crd(r#"{"apiVersion":"apiextensions.k8s.io/v1","kind":"CustomResourceDefinition","metadata":{"name":"broken"}}"#)
        .with_crd("this one is never looked at");

    let errors = manager.create(&config).unwrap_err();

    assert_eq!(errors.len(), 1);
    let message = &errors.messages()[0];
    assert!(message.starts_with("CRD document 1 is invalid"), "{message}");
    assert_eq!(backend.starts(), 0);
    assert!(manager.is_empty());
}

#[test]
fn crds_reach_runtime_in_order() {
    let (backend, manager) = isolated();
    let crd_dir = tempfile::tempdir().unwrap();
    fs::write(crd_dir.path().join("zetas.json"), crd_json("zetas")).unwrap();

    let config = EnvironmentConfig::default()
        .with_crd(crd_json("gammas"))
        .with_crd(crd_json("alphas"))
        .with_crd_path(crd_dir.path());
    manager.create(&config).unwrap();

    assert_eq!(
        backend.installed_crds(),
        vec![
            "gammas.example.com",
            "alphas.example.com",
            "zetas.example.com"
        ]
    );
}

#[test]
fn missing_required_crd_path_fails_create() {
    let (backend, manager) = isolated();
    let dir = tempfile::tempdir().unwrap();
    let mut config = EnvironmentConfig::default().with_crd_path(dir.path().join("missing"));
    config.crd_install_options.error_if_path_missing = true;

    let errors = manager.create(&config).unwrap_err();
    assert!(matches!(errors.iter().next(), Some(EnvtestError::Start(_))));
    assert_eq!(backend.running(), 0);
    assert!(manager.is_empty());
}

#[test]
fn concurrent_creates_yield_distinct_environments() {
    let (backend, manager) = isolated();
    let manager = Arc::new(manager);
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                manager.create(&EnvironmentConfig::default()).unwrap()
            })
        })
        .collect();
    let documents: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let mut unique = documents.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 8);
    assert_eq!(manager.len(), 8);

    let handles: Vec<_> = documents
        .into_iter()
        .map(|document| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || manager.destroy(Some(&document)).unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(manager.is_empty());
    assert_eq!(backend.stops(), 8);
    assert_eq!(backend.running(), 0);
}

#[test]
fn concurrent_destroys_of_one_environment_stop_it_once() {
    let (backend, manager) = isolated();
    backend.set_stop_delay(Duration::from_millis(50));
    let manager = Arc::new(manager);
    let document = manager.create(&EnvironmentConfig::default()).unwrap();
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            let document = document.clone();
            thread::spawn(move || {
                barrier.wait();
                manager.destroy(Some(&document))
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap().is_ok());
    }
    assert_eq!(backend.stops(), 1);
    assert!(manager.is_empty());
}

#[test]
fn destroy_retry_after_stop_failure() {
    let (backend, manager) = isolated();
    let document = manager.create(&EnvironmentConfig::default()).unwrap();
    backend.fail_next_stops(2);

    let request = DestroyRequest::new(document.clone());
    assert!(!manager.handle_destroy(&request).is_success());
    assert!(!manager.handle_destroy(&request).is_success());
    assert!(manager.registry().contains(&document));

    assert!(manager.handle_destroy(&request).is_success());
    assert!(!manager.registry().contains(&document));
    assert_eq!(backend.stops(), 3);
}

#[test]
fn request_response_contract() {
    let (_, manager) = isolated();
    let request: envtest_core::CreateRequest = envtest_schema::parse_config_str(&format!(
        "[crd_install_options]\ncrds = ['{}']\n",
        crd_json("widgets")
    ))
    .unwrap();

    let created = manager.handle_create(&request);
    assert!(created.is_success());
    let kubeconfig = created.kubeconfig.unwrap();

    let destroyed = manager.handle_destroy(&DestroyRequest::new(kubeconfig));
    assert!(destroyed.is_success());

    let failed = manager.handle_create(&EnvironmentConfig::default().with_crd("[]"));
    assert!(failed.kubeconfig.is_none());
    assert_eq!(failed.errors.len(), 1);
}

#[test]
fn default_manager_uses_global_registry() {
    let backend = Arc::new(MockBackend::new());
    let first = Manager::new(backend.clone());
    let second = Manager::new(backend.clone());

    let document = first.create(&EnvironmentConfig::default()).unwrap();
    assert!(EnvironmentRegistry::global().contains(&document));

    second.destroy(Some(&document)).unwrap();
    assert!(!EnvironmentRegistry::global().contains(&document));
    assert_eq!(backend.stops(), 1);
}
