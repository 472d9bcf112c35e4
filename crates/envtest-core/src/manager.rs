use crate::protocol::{CreateRequest, CreateResponse, DestroyRequest, DestroyResponse};
use crate::registry::{EnvironmentHandle, EnvironmentRegistry, EnvironmentSummary};
use crate::{EnvtestError, ErrorList};
use envtest_runtime::{ControlPlaneBackend, ControlPlaneSpec};
use envtest_schema::{compute_short_id, decode_crds, EnvironmentConfig};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Creates and destroys environments on a control-plane backend.
///
/// Safe to share between threads. Creates and destroys for different
/// environments run in parallel; destroys of the same environment are
/// serialized so its control plane is stopped at most once.
pub struct Manager {
    backend: Arc<dyn ControlPlaneBackend>,
    registry: Arc<EnvironmentRegistry>,
}

impl Manager {
    /// Manager backed by the process-wide registry.
    pub fn new(backend: Arc<dyn ControlPlaneBackend>) -> Self {
        Self::with_registry(backend, EnvironmentRegistry::global())
    }

    pub fn with_registry(
        backend: Arc<dyn ControlPlaneBackend>,
        registry: Arc<EnvironmentRegistry>,
    ) -> Self {
        Self { backend, registry }
    }

    pub fn registry(&self) -> &EnvironmentRegistry {
        &self.registry
    }

    /// Start an environment and return its kubeconfig document.
    ///
    /// On error nothing is registered. If the control plane started but its
    /// kubeconfig could not be built, it is stopped again before returning;
    /// a failure of that stop is reported after the original error.
    pub fn create(&self, config: &EnvironmentConfig) -> Result<String, ErrorList> {
        let mut spec = ControlPlaneSpec::from_config(config);

        let crds = decode_crds(&config.crd_install_options.crds).map_err(|e| {
            warn!("rejecting environment request: {e}");
            EnvtestError::from(e)
        })?;
        spec.crds = crds;

        info!(
            "starting {} control plane with {} CRDs",
            self.backend.name(),
            spec.crds.len()
        );
        let mut control_plane = self.backend.start(&spec).map_err(|e| {
            warn!("control plane failed to start: {e}");
            EnvtestError::Start(e)
        })?;

        let document = match control_plane.credentials().encode() {
            Ok(document) => document,
            Err(e) => {
                warn!("kubeconfig could not be built, stopping control plane: {e}");
                let mut errors = ErrorList::from(EnvtestError::Encode(e));
                if let Err(stop_err) = control_plane.stop() {
                    warn!("control plane may still be running: {stop_err}");
                    errors.push(EnvtestError::Teardown(stop_err));
                }
                return Err(errors);
            }
        };

        let handle = EnvironmentHandle::new(&document, control_plane);
        info!(
            "environment {} ready at {}",
            handle.short_id(),
            handle.server()
        );
        self.registry.store(document.clone(), handle);

        Ok(document)
    }

    /// Stop the environment `kubeconfig` was issued for.
    ///
    /// Absent, empty, unknown, and already destroyed documents are a no-op.
    /// If the stop fails the environment stays registered so the call can be
    /// retried with the same document.
    pub fn destroy(&self, kubeconfig: Option<&str>) -> Result<(), ErrorList> {
        let Some(key) = kubeconfig.filter(|k| !k.is_empty()) else {
            debug!("destroy without kubeconfig, nothing to do");
            return Ok(());
        };

        let Some(entry) = self.registry.load(key) else {
            debug!(
                "no environment registered for {}, nothing to do",
                compute_short_id(key)
            );
            return Ok(());
        };

        let mut handle = entry.lock();
        if handle.is_stopped() {
            debug!("environment {} already destroyed", handle.short_id());
            return Ok(());
        }

        info!("destroying environment {}", handle.short_id());
        if let Err(e) = handle.stop() {
            warn!(
                "environment {} failed to stop, keeping it registered: {e}",
                handle.short_id()
            );
            return Err(EnvtestError::Stop(e).into());
        }
        drop(handle);

        self.registry.remove(key, &entry);
        Ok(())
    }

    pub fn handle_create(&self, request: &CreateRequest) -> CreateResponse {
        self.create(request).into()
    }

    pub fn handle_destroy(&self, request: &DestroyRequest) -> DestroyResponse {
        self.destroy(request.kubeconfig.as_deref()).into()
    }

    /// Environments created and not yet destroyed, oldest first.
    pub fn running(&self) -> Vec<EnvironmentSummary> {
        self.registry.summaries()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}
