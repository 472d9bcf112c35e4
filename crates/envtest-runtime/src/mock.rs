use crate::backend::{ControlPlane, ControlPlaneBackend, ControlPlaneSpec};
use crate::RuntimeError;
use envtest_schema::{read_crd_paths, CredentialBundle};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

const MOCK_IDENTITY: &str = "envtest-admin";
const FIRST_MOCK_PORT: u16 = 36_443;

/// In-process control plane that records what it was asked to do.
///
/// Each start hands out a fresh loopback endpoint so credential documents stay
/// unique. Failures can be injected for start, stop, and credential minting.
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    next_port: u16,
    starts: usize,
    stops: usize,
    running: HashSet<u16>,
    installed_crds: Vec<String>,
    start_failure: Option<String>,
    stop_failures: usize,
    stop_delay: Option<Duration>,
    blank_server: bool,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                next_port: FIRST_MOCK_PORT,
                ..MockState::default()
            })),
        }
    }
}

fn lock(state: &Mutex<MockState>) -> Result<MutexGuard<'_, MockState>, RuntimeError> {
    state
        .lock()
        .map_err(|e| RuntimeError::Io(std::io::Error::other(format!("mutex poisoned: {e}"))))
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following start fail with `message`.
    pub fn fail_start(&self, message: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.start_failure = Some(message.to_owned());
        }
    }

    pub fn clear_start_failure(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.start_failure = None;
        }
    }

    /// Make the next `count` stop calls fail.
    pub fn fail_next_stops(&self, count: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.stop_failures = count;
        }
    }

    pub fn set_stop_delay(&self, delay: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.stop_delay = Some(delay);
        }
    }

    /// Hand out credentials without a server endpoint, which the kubeconfig
    /// encoder rejects.
    pub fn mint_blank_server(&self, blank: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.blank_server = blank;
        }
    }

    /// Number of start calls, including failed ones.
    pub fn starts(&self) -> usize {
        self.state.lock().map_or(0, |s| s.starts)
    }

    /// Number of stop calls that reached the backend, including failed ones.
    pub fn stops(&self) -> usize {
        self.state.lock().map_or(0, |s| s.stops)
    }

    pub fn running(&self) -> usize {
        self.state.lock().map_or(0, |s| s.running.len())
    }

    /// CRD names installed by the most recent successful start.
    pub fn installed_crds(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.installed_crds.clone())
            .unwrap_or_default()
    }
}

impl ControlPlaneBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn start(&self, spec: &ControlPlaneSpec) -> Result<Box<dyn ControlPlane>, RuntimeError> {
        let mut state = lock(&self.state)?;
        state.starts += 1;

        if let Some(message) = &state.start_failure {
            return Err(RuntimeError::StartFailed(message.clone()));
        }

        let assets = &spec.binary_assets;
        if let Some(dir) = &assets.binary_assets_directory {
            if !assets.download_binary_assets && !dir.exists() {
                return Err(RuntimeError::AssetsNotFound(dir.clone()));
            }
        }

        let from_paths = read_crd_paths(&spec.crd_paths, spec.error_if_crd_path_missing)?;
        let installed: Vec<String> = spec
            .crds
            .iter()
            .chain(from_paths.iter())
            .map(|crd| crd.metadata.name.clone().unwrap_or_default())
            .collect();

        let port = state.next_port;
        state.next_port = state.next_port.wrapping_add(1);
        state.running.insert(port);
        state.installed_crds.clone_from(&installed);

        let server = if state.blank_server {
            String::new()
        } else {
            format!("https://127.0.0.1:{port}")
        };
        debug!(
            "mock control plane started on port {port} with {} CRDs",
            installed.len()
        );

        Ok(Box::new(MockControlPlane {
            port,
            credentials: mock_credentials(server, port),
            state: Arc::clone(&self.state),
            running: true,
        }))
    }
}

fn mock_pem(label: &str, seed: &str) -> Vec<u8> {
    let body = blake3::hash(seed.as_bytes()).to_hex();
    format!("-----BEGIN {label}-----\n{body}\n-----END {label}-----\n").into_bytes()
}

fn mock_credentials(server: String, port: u16) -> CredentialBundle {
    CredentialBundle {
        server,
        certificate_authority_data: mock_pem("CERTIFICATE", &format!("mock-ca:{port}")),
        identity: MOCK_IDENTITY.to_owned(),
        client_key_data: mock_pem("PRIVATE KEY", &format!("mock-key:{port}")),
        client_certificate_data: mock_pem("CERTIFICATE", &format!("mock-cert:{port}")),
    }
}

struct MockControlPlane {
    port: u16,
    credentials: CredentialBundle,
    state: Arc<Mutex<MockState>>,
    running: bool,
}

impl ControlPlane for MockControlPlane {
    fn credentials(&self) -> &CredentialBundle {
        &self.credentials
    }

    fn stop(&mut self) -> Result<(), RuntimeError> {
        if !self.running {
            return Err(RuntimeError::NotRunning(format!("127.0.0.1:{}", self.port)));
        }

        let delay = {
            let mut state = lock(&self.state)?;
            state.stops += 1;
            if state.stop_failures > 0 {
                state.stop_failures -= 1;
                return Err(RuntimeError::StopFailed(format!(
                    "mock control plane on port {} refused to stop",
                    self.port
                )));
            }
            state.stop_delay
        };

        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        lock(&self.state)?.running.remove(&self.port);
        self.running = false;
        debug!("mock control plane on port {} stopped", self.port);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envtest_schema::{decode_crd, EnvironmentConfig};

    fn widget_crd() -> envtest_schema::CustomResourceDefinition {
        decode_crd(
            r#"{"metadata":{"name":"widgets.example.com"},"spec":{"group":"example.com","names":{"kind":"Widget","plural":"widgets"},"scope":"Namespaced","versions":[{"name":"v1","served":true,"storage":true}]}}"#,
        )
        .unwrap()
    }

    #[test]
    fn mock_lifecycle() {
        let backend = MockBackend::new();
        let mut plane = backend.start(&ControlPlaneSpec::default()).unwrap();
        assert_eq!(backend.starts(), 1);
        assert_eq!(backend.running(), 1);
        assert_eq!(plane.credentials().identity, "envtest-admin");
        assert!(plane.credentials().server.starts_with("https://127.0.0.1:"));

        plane.stop().unwrap();
        assert_eq!(backend.stops(), 1);
        assert_eq!(backend.running(), 0);

        assert!(matches!(plane.stop(), Err(RuntimeError::NotRunning(_))));
        assert_eq!(backend.stops(), 1);
    }

    #[test]
    fn each_start_gets_distinct_endpoint() {
        let backend = MockBackend::new();
        let a = backend.start(&ControlPlaneSpec::default()).unwrap();
        let b = backend.start(&ControlPlaneSpec::default()).unwrap();
        assert_ne!(a.credentials().server, b.credentials().server);
        assert_ne!(a.credentials().client_key_data, b.credentials().client_key_data);
    }

    #[test]
    fn injected_start_failure() {
        let backend = MockBackend::new();
        backend.fail_start("etcd exited early");
        let err = backend
            .start(&ControlPlaneSpec::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("etcd exited early"));
        assert_eq!(backend.starts(), 1);
        assert_eq!(backend.running(), 0);

        backend.clear_start_failure();
        assert!(backend.start(&ControlPlaneSpec::default()).is_ok());
    }

    #[test]
    fn failed_stop_can_be_retried() {
        let backend = MockBackend::new();
        let mut plane = backend.start(&ControlPlaneSpec::default()).unwrap();
        backend.fail_next_stops(1);

        assert!(matches!(plane.stop(), Err(RuntimeError::StopFailed(_))));
        assert_eq!(backend.running(), 1);

        plane.stop().unwrap();
        assert_eq!(backend.stops(), 2);
        assert_eq!(backend.running(), 0);
    }

    #[test]
    fn installs_decoded_then_path_crds() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("gadgets.yaml"),
            "apiVersion: apiextensions.k8s.io/v1\nkind: CustomResourceDefinition\nmetadata:\n  name: gadgets.example.com\nspec:\n  group: example.com\n  names:\n    kind: Gadget\n    plural: gadgets\n  scope: Namespaced\n  versions:\n    - name: v1\n      served: true\n      storage: true\n",
        )
        .unwrap();

        let config = EnvironmentConfig::default().with_crd_path(dir.path());
        let mut spec = ControlPlaneSpec::from_config(&config);
        spec.crds.push(widget_crd());

        let backend = MockBackend::new();
        backend.start(&spec).unwrap();
        assert_eq!(
            backend.installed_crds(),
            vec!["widgets.example.com", "gadgets.example.com"]
        );
    }

    #[test]
    fn missing_crd_path_fails_start_when_required() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EnvironmentConfig::default().with_crd_path(dir.path().join("absent"));
        config.crd_install_options.error_if_path_missing = true;

        let backend = MockBackend::new();
        let result = backend.start(&ControlPlaneSpec::from_config(&config));
        assert!(matches!(result, Err(RuntimeError::Crd(_))));
        assert_eq!(backend.running(), 0);
    }

    #[test]
    fn missing_assets_directory_fails_without_download() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EnvironmentConfig::default();
        config.binary_assets_settings.binary_assets_directory = Some(dir.path().join("bin"));

        let backend = MockBackend::new();
        let result = backend.start(&ControlPlaneSpec::from_config(&config));
        assert!(matches!(result, Err(RuntimeError::AssetsNotFound(_))));

        config.binary_assets_settings.download_binary_assets = true;
        assert!(backend.start(&ControlPlaneSpec::from_config(&config)).is_ok());
    }

    #[test]
    fn blank_server_credentials() {
        let backend = MockBackend::new();
        backend.mint_blank_server(true);
        let plane = backend.start(&ControlPlaneSpec::default()).unwrap();
        assert!(plane.credentials().server.is_empty());
        assert!(plane.credentials().encode().is_err());
    }
}
