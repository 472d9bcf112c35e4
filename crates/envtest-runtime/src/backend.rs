use crate::RuntimeError;
use envtest_schema::{
    BinaryAssetsSettings, CredentialBundle, CustomResourceDefinition, EnvironmentConfig,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a backend needs to bring up one control plane.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlPlaneSpec {
    pub binary_assets: BinaryAssetsSettings,
    /// Decoded CRDs, installed in order before any from `crd_paths`.
    pub crds: Vec<CustomResourceDefinition>,
    pub crd_paths: Vec<PathBuf>,
    pub error_if_crd_path_missing: bool,
}

impl ControlPlaneSpec {
    /// Carry the pass-through parts of a create request. Raw CRD documents
    /// are decoded separately and pushed onto `crds`.
    pub fn from_config(config: &EnvironmentConfig) -> Self {
        Self {
            binary_assets: config.binary_assets_settings.clone(),
            crds: Vec::new(),
            crd_paths: config.crd_install_options.paths.clone(),
            error_if_crd_path_missing: config.crd_install_options.error_if_path_missing,
        }
    }
}

pub trait ControlPlaneBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Start a control plane and block until it serves requests.
    fn start(&self, spec: &ControlPlaneSpec) -> Result<Box<dyn ControlPlane>, RuntimeError>;
}

/// A started control plane.
pub trait ControlPlane: Send {
    /// Endpoint, CA and client identity for the admin user.
    fn credentials(&self) -> &CredentialBundle;

    /// Stop the control plane. A failed stop leaves it stoppable again.
    fn stop(&mut self) -> Result<(), RuntimeError>;
}

pub fn select_backend(name: &str) -> Result<Arc<dyn ControlPlaneBackend>, RuntimeError> {
    match name {
        "mock" => Ok(Arc::new(crate::mock::MockBackend::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}
