//! Sandbox isolation backend.
//!
//! The executor never runs user code in its own address space: it writes the
//! program to an isolated container's stdin and reads a JSON envelope back.
//! The container runtime sits behind the narrow [`Sandbox`] trait so the
//! pipeline can be exercised against a stub backend in tests.

use crate::error::Error;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Captured output of one sandbox run.
#[derive(Debug, Clone)]
pub struct SandboxOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// A single-use isolated runtime for one user program.
///
/// Implementations stream `payload` to the sandbox's stdin, enforce
/// `timeout`, and guarantee the sandbox is destroyed on every exit path.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Run one program to completion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExecutionTimeout`] when the deadline passes and
    /// [`Error::Execution`] when the sandbox cannot be driven at all.
    /// A non-zero exit of the program itself is NOT an error here; it is
    /// reported through [`SandboxOutput::exit_code`].
    async fn run(
        &self,
        payload: &str,
        env: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<SandboxOutput, Error>;
}

/// Docker-CLI-backed sandbox.
///
/// Containers run with a read-only root filesystem, a 64 MiB tmpfs scratch
/// area, 256 MiB memory with an equal swap cap, half of one CPU,
/// `no-new-privileges`, the configured network, and no published ports. The
/// compiled-modules directory is mounted read-only at its host path so the
/// payload's path stub can reach it.
pub struct DockerSandbox {
    image: String,
    network_mode: String,
    compiled_dir: PathBuf,
}

impl DockerSandbox {
    #[must_use]
    pub fn new(image: impl Into<String>, network_mode: impl Into<String>, compiled_dir: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            network_mode: network_mode.into(),
            compiled_dir: compiled_dir.into(),
        }
    }

    async fn drive_container(
        &self,
        name: &str,
        payload: &str,
        env: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<SandboxOutput, Error> {
        let mut command = tokio::process::Command::new("docker");
        command
            .arg("run")
            .arg("--interactive")
            .args(["--name", name])
            .arg("--read-only")
            .args(["--tmpfs", "/tmp:rw,size=64m,mode=1777"])
            .args(["--memory", "256m"])
            .args(["--memory-swap", "256m"])
            .args(["--cpus", "0.5"])
            .args(["--security-opt", "no-new-privileges:true"])
            .args(["--network", &self.network_mode]);

        let compiled = self
            .compiled_dir
            .canonicalize()
            .unwrap_or_else(|_| self.compiled_dir.clone());
        command.args([
            "--volume",
            &format!("{}:{}:ro", compiled.display(), compiled.display()),
        ]);

        // Credentials are passed by name only: `-e KEY` forwards the value
        // from the docker client's environment, keeping secrets out of argv.
        for (key, value) in env {
            command.env(key, value);
            command.arg("-e").arg(key);
            if crate::logging::is_secret_env_var(key) {
                debug!(key = %key, value = %crate::logging::redact_value(value), "sandbox env");
            } else {
                debug!(key = %key, value = %value, "sandbox env");
            }
        }

        command.arg(&self.image);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(image = %self.image, container = %name, "sandbox launch");

        let mut child = command
            .spawn()
            .map_err(|e| Error::execution(format!("Failed to launch docker: {e}"), String::new(), 1))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(payload.as_bytes())
                .await
                .map_err(|e| Error::execution(format!("Failed to send code to sandbox: {e}"), String::new(), 1))?;
            stdin
                .shutdown()
                .await
                .map_err(|e| Error::execution(format!("Failed to close sandbox stdin: {e}"), String::new(), 1))?;
        }

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::execution_timeout(timeout.as_secs()))?
            .map_err(|e| Error::execution(format!("Failed to read sandbox output: {e}"), String::new(), 1))?;

        let exit_code = output.status.code().unwrap_or(1);
        let stderr_text = String::from_utf8_lossy(&output.stderr);
        if stderr_text.contains("Unable to find image") || stderr_text.contains("No such image") {
            return Err(Error::execution(
                format!(
                    "Docker image '{}' not found. Run: docker build -t {} sandbox/",
                    self.image, self.image
                ),
                stderr_text.into_owned(),
                exit_code,
            ));
        }

        Ok(SandboxOutput {
            exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    /// Force-remove the container. Safe to call whether or not it is still
    /// running; failures are logged only.
    async fn force_remove(&self, name: &str) {
        let result = tokio::process::Command::new("docker")
            .args(["rm", "-f", name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match result {
            Ok(_) => debug!(container = %name, "sandbox removed"),
            Err(e) => warn!(container = %name, error = %e, "sandbox removal failed"),
        }
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    async fn run(
        &self,
        payload: &str,
        env: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<SandboxOutput, Error> {
        let name = format!("mfp-exec-{:016x}", fastrand::u64(..));

        // Removal runs on every exit path, including timeout.
        let result = self.drive_container(&name, payload, env, timeout).await;
        self.force_remove(&name).await;
        result
    }
}
