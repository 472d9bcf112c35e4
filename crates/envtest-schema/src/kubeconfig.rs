//! Kubeconfig-shaped credential documents.
//!
//! A running environment is exposed to clients as a single kubeconfig document
//! with one cluster (`envtest`), one user, and one context `<user>@envtest`
//! selected as the current context. The document is also the key under which
//! the environment is registered, so it is produced once and never re-derived.

use crate::types::ContextName;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Name of the single cluster entry in every credential document.
pub const ENVTEST_CLUSTER: &str = "envtest";
/// Suffix appended to the client identity to form the context name.
pub const ENVTEST_SUFFIX: &str = "@envtest";

const KUBECONFIG_KIND: &str = "Config";
const KUBECONFIG_API_VERSION: &str = "v1";

#[derive(Debug, Error)]
pub enum KubeconfigError {
    #[error("kubeconfig serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("credential bundle is incomplete: missing {0}")]
    Incomplete(&'static str),
    #[error("malformed kubeconfig: {0}")]
    Malformed(String),
}

/// Everything a client needs to talk to one environment.
///
/// Holds private key material: the `Debug` impl redacts it, and nothing in
/// this workspace formats the raw fields into logs or errors.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialBundle {
    pub server: String,
    pub certificate_authority_data: Vec<u8>,
    pub identity: String,
    pub client_key_data: Vec<u8>,
    pub client_certificate_data: Vec<u8>,
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("server", &self.server)
            .field("identity", &self.identity)
            .field("certificate_authority_data", &Redacted(&self.certificate_authority_data))
            .field("client_key_data", &Redacted(&self.client_key_data))
            .field("client_certificate_data", &Redacted(&self.client_certificate_data))
            .finish()
    }
}

struct Redacted<'a>(&'a [u8]);

impl fmt::Debug for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} bytes>", self.0.len())
    }
}

impl CredentialBundle {
    pub fn context_name(&self) -> ContextName {
        ContextName::new(format!("{}{ENVTEST_SUFFIX}", self.identity))
    }

    pub fn to_kubeconfig(&self) -> Kubeconfig {
        let context_name = self.context_name().into_inner();
        Kubeconfig {
            kind: KUBECONFIG_KIND.to_owned(),
            api_version: KUBECONFIG_API_VERSION.to_owned(),
            preferences: Preferences::default(),
            clusters: vec![NamedCluster {
                name: ENVTEST_CLUSTER.to_owned(),
                cluster: Cluster {
                    server: self.server.clone(),
                    certificate_authority_data: self.certificate_authority_data.clone(),
                },
            }],
            users: vec![NamedUser {
                name: self.identity.clone(),
                user: User {
                    client_certificate_data: self.client_certificate_data.clone(),
                    client_key_data: self.client_key_data.clone(),
                },
            }],
            contexts: vec![NamedContext {
                name: context_name.clone(),
                context: Context {
                    cluster: ENVTEST_CLUSTER.to_owned(),
                    user: self.identity.clone(),
                },
            }],
            current_context: context_name,
        }
    }

    /// Serialize into the transportable document.
    pub fn encode(&self) -> Result<String, KubeconfigError> {
        if self.server.is_empty() {
            return Err(KubeconfigError::Incomplete("server endpoint"));
        }
        if self.identity.is_empty() {
            return Err(KubeconfigError::Incomplete("client identity"));
        }
        Ok(serde_json::to_string(&self.to_kubeconfig())?)
    }

    /// Parse a document produced by [`CredentialBundle::encode`].
    pub fn decode(document: &str) -> Result<Self, KubeconfigError> {
        let config: Kubeconfig = serde_json::from_str(document)?;
        Self::try_from(config)
    }
}

impl TryFrom<Kubeconfig> for CredentialBundle {
    type Error = KubeconfigError;

    fn try_from(config: Kubeconfig) -> Result<Self, Self::Error> {
        if config.kind != KUBECONFIG_KIND {
            return Err(KubeconfigError::Malformed(format!(
                "unexpected kind '{}'",
                config.kind
            )));
        }
        let [cluster] = single("cluster", config.clusters)?;
        let [user] = single("user", config.users)?;
        let [context] = single("context", config.contexts)?;

        let expected_context = format!("{}{ENVTEST_SUFFIX}", user.name);
        if context.name != expected_context {
            return Err(KubeconfigError::Malformed(format!(
                "context '{}' does not match user '{}'",
                context.name, user.name
            )));
        }
        if config.current_context != context.name {
            return Err(KubeconfigError::Malformed(format!(
                "current-context '{}' does not name the context",
                config.current_context
            )));
        }
        if context.context.cluster != cluster.name || context.context.user != user.name {
            return Err(KubeconfigError::Malformed(
                "context does not reference the cluster and user".to_owned(),
            ));
        }

        Ok(Self {
            server: cluster.cluster.server,
            certificate_authority_data: cluster.cluster.certificate_authority_data,
            identity: user.name,
            client_key_data: user.user.client_key_data,
            client_certificate_data: user.user.client_certificate_data,
        })
    }
}

fn single<T>(what: &str, entries: Vec<T>) -> Result<[T; 1], KubeconfigError> {
    let count = entries.len();
    <[T; 1]>::try_from(entries)
        .map_err(|_| KubeconfigError::Malformed(format!("expected exactly one {what}, found {count}")))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Kubeconfig {
    pub kind: String,
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    #[serde(default)]
    pub users: Vec<NamedUser>,
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    #[serde(default)]
    pub current_context: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Preferences {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: Cluster,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Cluster {
    pub server: String,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        with = "base64_bytes"
    )]
    pub certificate_authority_data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamedUser {
    pub name: String,
    pub user: User,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct User {
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        with = "base64_bytes"
    )]
    pub client_certificate_data: Vec<u8>,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        with = "base64_bytes"
    )]
    pub client_key_data: Vec<u8>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("client_certificate_data", &Redacted(&self.client_certificate_data))
            .field("client_key_data", &Redacted(&self.client_key_data))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamedContext {
    pub name: String,
    pub context: Context,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Context {
    pub cluster: String,
    pub user: String,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
