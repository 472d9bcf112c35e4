use super::{json_pretty, load_config, EXIT_SUCCESS};
use crate::signal::{install_signal_handler, wait_for_shutdown};
use envtest_core::{EnvironmentSummary, Manager};
use envtest_runtime::select_backend;
use envtest_schema::compute_short_id;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct UpReport {
    environment: Option<EnvironmentSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kubeconfig_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kubeconfig: Option<String>,
}

pub fn run(
    config: Option<&Path>,
    crd_paths: &[PathBuf],
    backend: &str,
    kubeconfig_out: Option<&Path>,
    no_wait: bool,
    json: bool,
) -> Result<u8, String> {
    let config = load_config(config, crd_paths)?;
    let backend = select_backend(backend).map_err(|e| e.to_string())?;
    let manager = Manager::new(backend);

    install_signal_handler();

    let kubeconfig = manager.create(&config).map_err(|e| e.to_string())?;
    let short_id = compute_short_id(&kubeconfig);

    if let Err(e) = publish(&manager, &kubeconfig, kubeconfig_out, json) {
        return Err(abandon(&manager, &kubeconfig, e));
    }

    if !no_wait {
        wait_for_shutdown();
    }

    manager
        .destroy(Some(&kubeconfig))
        .map_err(|e| format!("environment {short_id} was not destroyed: {e}"))?;
    if let Some(path) = kubeconfig_out {
        let _ = std::fs::remove_file(path);
    }

    if !json {
        eprintln!("environment {short_id} destroyed");
    }
    Ok(EXIT_SUCCESS)
}

/// Hand the kubeconfig to the user: written to `kubeconfig_out`, or printed.
fn publish(
    manager: &Manager,
    kubeconfig: &str,
    kubeconfig_out: Option<&Path>,
    json: bool,
) -> Result<(), String> {
    let short_id = compute_short_id(kubeconfig);
    let summary = manager
        .running()
        .into_iter()
        .find(|env| env.short_id == short_id);

    if let Some(path) = kubeconfig_out {
        write_private(path, kubeconfig)
            .map_err(|e| format!("failed to write kubeconfig to {}: {e}", path.display()))?;
    }

    if json {
        let report = UpReport {
            environment: summary,
            kubeconfig_path: kubeconfig_out.map(Path::to_path_buf),
            kubeconfig: kubeconfig_out.is_none().then(|| kubeconfig.to_owned()),
        };
        println!("{}", json_pretty(&report)?);
    } else {
        if kubeconfig_out.is_none() {
            println!("{kubeconfig}");
        }
        if let Some(env) = &summary {
            eprintln!("environment {} ready at {} ({})", env.short_id, env.server, env.context);
        }
    }
    Ok(())
}

/// Destroy an environment that could not be handed out, keeping `error` first.
fn abandon(manager: &Manager, kubeconfig: &str, error: String) -> String {
    match manager.destroy(Some(kubeconfig)) {
        Ok(()) => error,
        Err(stop) => format!(
            "{error}; environment {} could not be destroyed and may still be running: {stop}",
            compute_short_id(kubeconfig)
        ),
    }
}

/// Write the kubeconfig readable by the owner only; it holds the client key.
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(0o600);
        let mut file = options.open(path)?;
        // mode() only applies on creation
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        file.write_all(contents.as_bytes())
    }
    #[cfg(not(unix))]
    {
        options.open(path)?.write_all(contents.as_bytes())
    }
}
