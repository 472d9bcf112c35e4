//! Configuration, CRD decoding, and credential documents for envtest.
//!
//! This crate defines the schema layer: the TOML-loadable create request
//! (`EnvironmentConfig`), decoding of raw and on-disk custom resource
//! definitions into structured `k8s_openapi` objects, the kubeconfig-shaped
//! credential document (`CredentialBundle`) handed to clients, and the short
//! identifiers used to refer to a live environment without exposing secrets.

pub mod config;
pub mod crd;
pub mod identity;
pub mod kubeconfig;
pub mod types;

pub use config::{
    parse_config_file, parse_config_str, BinaryAssetsSettings, ConfigError, CrdInstallOptions,
    EnvironmentConfig,
};
pub use crd::{decode_crd, decode_crds, read_crd_paths, CrdError, CRD_API_VERSION, CRD_KIND};
pub use identity::compute_short_id;
pub use kubeconfig::{
    CredentialBundle, Kubeconfig, KubeconfigError, ENVTEST_CLUSTER, ENVTEST_SUFFIX,
};
pub use types::{ContextName, ShortId};

/// Structured custom resource definition, as consumed by the control plane.
pub use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
