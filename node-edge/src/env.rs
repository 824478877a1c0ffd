use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::BridgeError;
use crate::manifest::Manifest;

/// The embedded JS runtime script, written as `index.js` in every environment
/// directory. Its internal behavior is out of scope for this crate (spec.md
/// §1): we only need it to speak the wire protocol described in spec.md §6.
const RUNTIME_SCRIPT: &str = include_str!("../runtime/index.js");

/// Writes the manifest and runtime script into a signature-named environment
/// directory and installs dependencies, per spec.md §4.1.
#[derive(Debug, Clone)]
pub struct EnvProvisioner {
    manifest: Manifest,
    installer_bin: String,
    keep_lock: bool,
    candidate_roots: Option<Vec<PathBuf>>,
}

impl EnvProvisioner {
    pub fn new(
        manifest: Manifest,
        installer_bin: String,
        keep_lock: bool,
        candidate_roots: Option<Vec<PathBuf>>,
    ) -> Self {
        Self {
            manifest,
            installer_bin,
            keep_lock,
            candidate_roots,
        }
    }

    /// Iterates the candidate base directories and returns the first one
    /// under which `node_edge/envs/<signature>` can be created.
    pub fn ensure_env_dir(&self) -> Result<PathBuf, BridgeError> {
        let signature = self.manifest.signature();

        for candidate in self.candidate_base_dirs() {
            let full_path = candidate.join("node_edge").join("envs").join(&signature);
            if try_create_dir(&full_path) {
                return Ok(full_path);
            }
        }

        Err(BridgeError::EnvSetup(
            "could not find or create an environment directory".to_string(),
        ))
    }

    fn candidate_base_dirs(&self) -> Vec<PathBuf> {
        if let Some(roots) = &self.candidate_roots {
            return roots.clone();
        }

        let mut roots = Vec::new();
        if let Some(cache) = dirs::cache_dir() {
            roots.push(cache);
        }
        roots.push(std::env::temp_dir());
        roots
    }

    /// Materializes `package.json` and `index.js`, then runs the installer.
    /// Returns the environment directory root.
    pub async fn create_env(&self) -> Result<PathBuf, BridgeError> {
        let root = self.ensure_env_dir()?;

        self.write_package_json(&root)?;
        self.write_runtime(&root)?;
        self.run_installer(&root).await?;

        Ok(root)
    }

    fn write_package_json(&self, root: &Path) -> Result<(), BridgeError> {
        let package = self.manifest.for_package_json();
        let contents = serde_json::to_string_pretty(&package)
            .map_err(|err| BridgeError::EnvSetup(format!("could not encode package.json: {err}")))?;
        std::fs::write(root.join("package.json"), contents)
            .map_err(|err| BridgeError::EnvSetup(format!("could not write package.json: {err}")))
    }

    fn write_runtime(&self, root: &Path) -> Result<(), BridgeError> {
        let index_path = root.join("index.js");
        std::fs::write(&index_path, RUNTIME_SCRIPT)
            .map_err(|err| BridgeError::EnvSetup(format!("could not write index.js: {err}")))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&index_path)
                .map_err(|err| BridgeError::EnvSetup(format!("could not stat index.js: {err}")))?
                .permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&index_path, perms).map_err(|err| {
                BridgeError::EnvSetup(format!("could not chmod index.js: {err}"))
            })?;
        }

        Ok(())
    }

    async fn run_installer(&self, root: &Path) -> Result<(), BridgeError> {
        if !self.keep_lock {
            let lockfile = root.join("package-lock.json");
            if lockfile.exists() {
                std::fs::remove_file(&lockfile).map_err(|err| {
                    BridgeError::EnvSetup(format!("could not remove package-lock.json: {err}"))
                })?;
            }
        }

        debug!(installer = %self.installer_bin, root = %root.display(), "running dependency install");

        let mut child = Command::new(&self.installer_bin)
            .arg("install")
            .current_dir(root)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                BridgeError::EnvSetup(format!("could not spawn {}: {err}", self.installer_bin))
            })?;

        let mut stderr = child.stderr.take().expect("stderr was piped");
        let mut stderr_buf = Vec::new();
        stderr
            .read_to_end(&mut stderr_buf)
            .await
            .map_err(|err| BridgeError::EnvSetup(format!("could not read installer stderr: {err}")))?;

        let status = child
            .wait()
            .await
            .map_err(|err| BridgeError::EnvSetup(format!("could not wait on installer: {err}")))?;

        if !status.success() {
            let tail = tail_bytes(&stderr_buf, 1024);
            return Err(BridgeError::EnvSetup(format!(
                "could not create env: {tail}"
            )));
        }

        Ok(())
    }
}

fn try_create_dir(path: &Path) -> bool {
    std::fs::create_dir_all(path).is_ok()
}

/// The last `limit` bytes of `buf`, decoded lossily, matching the original's
/// `err[-1000:]` (`original_source/_engine.py::_npm_install`).
fn tail_bytes(buf: &[u8], limit: usize) -> String {
    let start = buf.len().saturating_sub(limit);
    String::from_utf8_lossy(&buf[start..]).into_owned()
}
