//! Control-plane runtime backends for envtest environments.
//!
//! This crate is the boundary to whatever actually supervises the API server
//! and its data store: a `ControlPlaneBackend` starts one control plane per
//! request and hands back a `ControlPlane` that can later be stopped. The
//! in-process `MockBackend` implements the same contract without spawning
//! anything and is what the rest of the workspace is tested against.

pub mod backend;
pub mod mock;

pub use backend::{select_backend, ControlPlane, ControlPlaneBackend, ControlPlaneSpec};
pub use mock::MockBackend;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend '{0}' is not available")]
    BackendUnavailable(String),
    #[error("binary assets directory not found: {}", .0.display())]
    AssetsNotFound(PathBuf),
    #[error("CRD installation failed: {0}")]
    Crd(#[from] envtest_schema::CrdError),
    #[error("control plane failed to start: {0}")]
    StartFailed(String),
    #[error("control plane failed to stop: {0}")]
    StopFailed(String),
    #[error("control plane at {0} is not running")]
    NotRunning(String),
}
