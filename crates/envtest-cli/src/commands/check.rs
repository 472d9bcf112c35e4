use super::{json_pretty, load_config, EXIT_SUCCESS};
use envtest_schema::{decode_crds, read_crd_paths, CustomResourceDefinition};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct CrdInfo {
    name: String,
    group: String,
    kind: String,
    scope: String,
    versions: Vec<String>,
}

impl From<&CustomResourceDefinition> for CrdInfo {
    fn from(crd: &CustomResourceDefinition) -> Self {
        Self {
            name: crd.metadata.name.clone().unwrap_or_default(),
            group: crd.spec.group.clone(),
            kind: crd.spec.names.kind.clone(),
            scope: crd.spec.scope.clone(),
            versions: crd.spec.versions.iter().map(|v| v.name.clone()).collect(),
        }
    }
}

pub fn run(config: Option<&Path>, crd_paths: &[PathBuf], json: bool) -> Result<u8, String> {
    let config = load_config(config, crd_paths)?;
    let options = &config.crd_install_options;

    let mut crds = decode_crds(&options.crds).map_err(|e| e.to_string())?;
    crds.extend(
        read_crd_paths(&options.paths, options.error_if_path_missing)
            .map_err(|e| e.to_string())?,
    );
    let infos: Vec<CrdInfo> = crds.iter().map(CrdInfo::from).collect();

    if json {
        println!("{}", json_pretty(&infos)?);
    } else if infos.is_empty() {
        println!("no CRDs configured");
    } else {
        for info in &infos {
            println!(
                "{:<40} {:<12} {:<10} {}",
                info.name,
                info.kind,
                info.scope,
                info.versions.join(",")
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
