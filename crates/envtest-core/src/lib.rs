//! Lifecycle orchestration for ephemeral Kubernetes test environments.
//!
//! This crate ties together CRD decoding, the control-plane runtime, and the
//! kubeconfig codec into the `Manager`: `create` starts an environment and
//! returns its credential document, `destroy` stops the environment that
//! document refers to. Live environments are tracked in a process-wide
//! `EnvironmentRegistry` keyed by the document itself.

pub mod manager;
pub mod protocol;
pub mod registry;

pub use manager::Manager;
pub use protocol::{CreateRequest, CreateResponse, DestroyRequest, DestroyResponse};
pub use registry::{EnvironmentHandle, EnvironmentRegistry, EnvironmentSummary, SharedHandle};

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvtestError {
    #[error(transparent)]
    Crd(#[from] envtest_schema::CrdError),
    #[error(transparent)]
    Start(envtest_runtime::RuntimeError),
    #[error("failed to build kubeconfig: {0}")]
    Encode(#[from] envtest_schema::KubeconfigError),
    #[error("control plane may still be running after kubeconfig error: {0}")]
    Teardown(#[source] envtest_runtime::RuntimeError),
    #[error(transparent)]
    Stop(envtest_runtime::RuntimeError),
}

/// Ordered failures of a single create or destroy call.
///
/// A create that fails after the control plane started can report both the
/// original failure and the failure to tear it down again.
#[derive(Debug, Default)]
pub struct ErrorList(Vec<EnvtestError>);

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: EnvtestError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EnvtestError> {
        self.0.iter()
    }

    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }

    pub fn into_inner(self) -> Vec<EnvtestError> {
        self.0
    }
}

impl From<EnvtestError> for ErrorList {
    fn from(error: EnvtestError) -> Self {
        Self(vec![error])
    }
}

impl IntoIterator for ErrorList {
    type Item = EnvtestError;
    type IntoIter = std::vec::IntoIter<EnvtestError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ErrorList {
    type Item = &'a EnvtestError;
    type IntoIter = std::slice::Iter<'a, EnvtestError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().join("; "))
    }
}

impl std::error::Error for ErrorList {}

#[cfg(test)]
mod tests {
    use super::*;
    use envtest_runtime::RuntimeError;

    #[test]
    fn error_list_keeps_order() {
        let mut errors = ErrorList::from(EnvtestError::Encode(
            envtest_schema::KubeconfigError::Incomplete("server endpoint"),
        ));
        errors.push(EnvtestError::Teardown(RuntimeError::StopFailed(
            "apiserver hung".to_owned(),
        )));

        assert_eq!(errors.len(), 2);
        let messages = errors.messages();
        assert!(messages[0].contains("missing server endpoint"));
        assert!(messages[1].contains("apiserver hung"));
        assert_eq!(errors.to_string(), messages.join("; "));
    }

    #[test]
    fn crd_errors_display_transparently() {
        let err = EnvtestError::from(envtest_schema::CrdError::PathMissing("crds".into()));
        assert_eq!(err.to_string(), "CRD path does not exist: crds");
    }

    #[test]
    fn runtime_errors_are_not_prefixed_twice() {
        let start = EnvtestError::Start(RuntimeError::StartFailed("etcd exited early".to_owned()));
        assert_eq!(start.to_string(), "control plane failed to start: etcd exited early");

        let stop = EnvtestError::Stop(RuntimeError::StopFailed("timed out".to_owned()));
        assert_eq!(stop.to_string(), "control plane failed to stop: timed out");

        let teardown =
            EnvtestError::Teardown(RuntimeError::StopFailed("apiserver hung".to_owned()));
        assert_eq!(
            teardown.to_string(),
            "control plane may still be running after kubeconfig error: control plane failed to stop: apiserver hung"
        );
    }

    #[test]
    fn empty_list() {
        let errors = ErrorList::new();
        assert!(errors.is_empty());
        assert_eq!(errors.to_string(), "");
    }
}
