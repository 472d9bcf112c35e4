//! Decoding of custom resource definitions.
//!
//! Raw documents from a create request are JSON and must all be CRDs; the
//! first one that fails aborts the whole batch. Files named by install paths
//! may be JSON or multi-document YAML and may mix in other kinds, which are
//! skipped.

use crate::CustomResourceDefinition;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CRD_API_VERSION: &str = "apiextensions.k8s.io/v1";
pub const CRD_KIND: &str = "CustomResourceDefinition";

const CRD_FILE_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

/// Why a single document could not be turned into a CRD.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("document is not an object")]
    NotAnObject,
    #[error("expected apiextensions.k8s.io/v1 CustomResourceDefinition, got {api_version} {kind}")]
    WrongType { api_version: String, kind: String },
}

#[derive(Debug, Error)]
pub enum CrdError {
    #[error("CRD document {index} is invalid: {source}")]
    Document {
        index: usize,
        #[source]
        source: DocumentError,
    },
    #[error("CRD path does not exist: {0}")]
    PathMissing(PathBuf),
    #[error("failed to read CRD path {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse CRD file {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid CRD in {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },
}

/// Decode one raw JSON document as an `apiextensions.k8s.io/v1` CRD.
///
/// Missing `apiVersion`/`kind` are defaulted; present values must match.
pub fn decode_crd(raw: &str) -> Result<CustomResourceDefinition, DocumentError> {
    let value: Value = serde_json::from_str(raw)?;
    into_crd(value)
}

/// Decode every raw document in order, stopping at the first failure.
pub fn decode_crds(raws: &[String]) -> Result<Vec<CustomResourceDefinition>, CrdError> {
    raws.iter()
        .enumerate()
        .map(|(index, raw)| decode_crd(raw).map_err(|source| CrdError::Document { index, source }))
        .collect()
}

fn into_crd(value: Value) -> Result<CustomResourceDefinition, DocumentError> {
    let Value::Object(mut map) = value else {
        return Err(DocumentError::NotAnObject);
    };

    let api_version = string_field(&map, "apiVersion").unwrap_or(CRD_API_VERSION);
    let kind = string_field(&map, "kind").unwrap_or(CRD_KIND);
    if api_version != CRD_API_VERSION || kind != CRD_KIND {
        return Err(DocumentError::WrongType {
            api_version: api_version.to_owned(),
            kind: kind.to_owned(),
        });
    }

    map.insert("apiVersion".to_owned(), Value::from(CRD_API_VERSION));
    map.insert("kind".to_owned(), Value::from(CRD_KIND));
    Ok(serde_json::from_value(Value::Object(map))?)
}

fn string_field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

fn is_crd(map: &Map<String, Value>) -> bool {
    string_field(map, "apiVersion") == Some(CRD_API_VERSION)
        && string_field(map, "kind") == Some(CRD_KIND)
}

/// Read CRDs from files and directories.
///
/// Directories are read one level deep, in file name order, considering only
/// `.json`, `.yaml` and `.yml` files. A path that does not exist is skipped
/// unless `error_if_missing` is set.
pub fn read_crd_paths(
    paths: &[PathBuf],
    error_if_missing: bool,
) -> Result<Vec<CustomResourceDefinition>, CrdError> {
    let mut crds = Vec::new();
    for path in paths {
        if !path.exists() {
            if error_if_missing {
                return Err(CrdError::PathMissing(path.clone()));
            }
            continue;
        }

        if path.is_dir() {
            for file in crd_files_in(path)? {
                crds.extend(read_crd_file(&file)?);
            }
        } else {
            crds.extend(read_crd_file(path)?);
        }
    }
    Ok(crds)
}

fn crd_files_in(dir: &Path) -> Result<Vec<PathBuf>, CrdError> {
    let io_err = |source| CrdError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let wanted = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| CRD_FILE_EXTENSIONS.contains(&ext));
        if wanted && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn read_crd_file(path: &Path) -> Result<Vec<CustomResourceDefinition>, CrdError> {
    let content = fs::read_to_string(path).map_err(|source| CrdError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut crds = Vec::new();
    for document in serde_yaml::Deserializer::from_str(&content) {
        let value = Value::deserialize(document).map_err(|source| CrdError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;

        match &value {
            Value::Object(map) if is_crd(map) => {}
            _ => continue,
        }

        let crd = into_crd(value).map_err(|source| CrdError::File {
            path: path.to_path_buf(),
            source,
        })?;
        crds.push(crd);
    }
    Ok(crds)
}
