//! Request and response shapes for callers that drive the manager remotely.
//!
//! Errors cross this boundary as plain messages, in the order they occurred.

use crate::ErrorList;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type CreateRequest = envtest_schema::EnvironmentConfig;

/// Either a kubeconfig document or a non-empty list of errors.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl CreateResponse {
    pub fn is_success(&self) -> bool {
        self.kubeconfig.is_some() && self.errors.is_empty()
    }
}

impl fmt::Debug for CreateResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateResponse")
            .field("kubeconfig", &self.kubeconfig.as_ref().map(|_| "<redacted>"))
            .field("errors", &self.errors)
            .finish()
    }
}

impl From<Result<String, ErrorList>> for CreateResponse {
    fn from(result: Result<String, ErrorList>) -> Self {
        match result {
            Ok(kubeconfig) => Self {
                kubeconfig: Some(kubeconfig),
                errors: Vec::new(),
            },
            Err(errors) => Self {
                kubeconfig: None,
                errors: errors.messages(),
            },
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DestroyRequest {
    #[serde(default)]
    pub kubeconfig: Option<String>,
}

impl DestroyRequest {
    pub fn new(kubeconfig: impl Into<String>) -> Self {
        Self {
            kubeconfig: Some(kubeconfig.into()),
        }
    }
}

impl fmt::Debug for DestroyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestroyRequest")
            .field("kubeconfig", &self.kubeconfig.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Empty `errors` means the environment is gone.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DestroyResponse {
    #[serde(default)]
    pub errors: Vec<String>,
}

impl DestroyResponse {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

impl From<Result<(), ErrorList>> for DestroyResponse {
    fn from(result: Result<(), ErrorList>) -> Self {
        Self {
            errors: result.err().map(|e| e.messages()).unwrap_or_default(),
        }
    }
}
