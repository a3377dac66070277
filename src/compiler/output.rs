//! Compiled-output directory management.
//!
//! The orchestrator is the sole writer of a compiled tree, but the registry
//! (possibly in another process) reads it at any moment, and two
//! `mfp compile` invocations may race for the same tree. Both problems are
//! handled here: a compile pass *claims* the directory with an advisory lock
//! before writing anything, and each server's files are published as a unit
//! by staging them under hidden names and renaming into place. A reader sees
//! the previous module set or the new one, never a torn write — renames are
//! atomic within one filesystem, which staging as siblings guarantees.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Lock file marking a claimed output directory.
const CLAIM_FILE: &str = ".mfp-compile.lock";

/// How long [`OutputDir::claim`] keeps retrying a contended lock.
const CLAIM_DEADLINE: Duration = Duration::from_secs(60);
const CLAIM_RETRY_DELAY: Duration = Duration::from_millis(100);

/// A compiled-output directory claimed for publishing.
///
/// The advisory lock is held until drop. `fs2` locks coordinate cooperating
/// MFP processes only.
pub struct OutputDir {
    root: PathBuf,
    _claim: std::fs::File,
}

impl OutputDir {
    /// Claim `root` for this compile pass, creating the directory if needed.
    ///
    /// When another process holds the claim, retries for up to a minute
    /// before failing with `TimedOut`.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory or lock file cannot be created,
    /// or the claim stays contended past the deadline.
    pub async fn claim(root: &Path) -> io::Result<Self> {
        tokio::fs::create_dir_all(root).await?;

        let lock_root = root.to_path_buf();
        let claim =
            tokio::task::spawn_blocking(move || acquire_claim(&lock_root, CLAIM_DEADLINE))
                .await
                .map_err(|e| io::Error::other(format!("claim task failed: {e}")))??;

        debug!(root = %root.display(), "output directory claimed");
        Ok(Self {
            root: root.to_path_buf(),
            _claim: claim,
        })
    }

    /// Path of one server's subdirectory under this output tree.
    #[must_use]
    pub fn server_dir(&self, server_name: &str) -> PathBuf {
        self.root.join(server_name)
    }

    /// Publish one server's compiled files as a unit.
    ///
    /// All files are first written under hidden staging names carrying a
    /// per-publish tag, then renamed over their targets. On any failure the
    /// staged files are removed and the previous contents stay in place.
    ///
    /// # Errors
    ///
    /// Returns an error when a staging write or rename fails.
    pub async fn publish(&self, server_name: &str, files: &[(&str, &[u8])]) -> io::Result<()> {
        let server_dir = self.server_dir(server_name);
        tokio::fs::create_dir_all(&server_dir).await?;

        let tag = fastrand::u64(..);
        let staged: Vec<(PathBuf, PathBuf)> = files
            .iter()
            .map(|(file_name, _)| {
                (
                    server_dir.join(format!(".{tag:016x}.{file_name}")),
                    server_dir.join(file_name),
                )
            })
            .collect();

        for ((stage_path, _), (_, content)) in staged.iter().zip(files) {
            if let Err(e) = tokio::fs::write(stage_path, content).await {
                discard_staged(&staged).await;
                return Err(e);
            }
        }

        for (stage_path, final_path) in &staged {
            if let Err(e) = tokio::fs::rename(stage_path, final_path).await {
                discard_staged(&staged).await;
                return Err(e);
            }
        }

        debug!(server = %server_name, files = files.len(), "server published");
        Ok(())
    }
}

/// Best-effort removal of staged files after a failed publish.
async fn discard_staged(staged: &[(PathBuf, PathBuf)]) {
    for (stage_path, _) in staged {
        if tokio::fs::remove_file(stage_path).await.is_ok() {
            warn!(path = %stage_path.display(), "staged file discarded");
        }
    }
}

/// Take the exclusive claim, retrying while another process holds it.
fn acquire_claim(root: &Path, deadline: Duration) -> io::Result<std::fs::File> {
    use fs2::FileExt;

    let file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(root.join(CLAIM_FILE))?;

    let give_up_at = Instant::now() + deadline;
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(file),
            Err(e) if is_contention(&e) => {
                if Instant::now() >= give_up_at {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "output directory is claimed by another compile",
                    ));
                }
                std::thread::sleep(CLAIM_RETRY_DELAY);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Whether a locking error means "held by someone else" on this platform.
fn is_contention(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    #[cfg(unix)]
    {
        // EAGAIN and EWOULDBLOCK share a value on Linux but not everywhere.
        e.raw_os_error() == Some(libc::EAGAIN) || e.raw_os_error() == Some(libc::EWOULDBLOCK)
    }
    #[cfg(windows)]
    {
        // ERROR_LOCK_VIOLATION
        e.raw_os_error() == Some(33)
    }
    #[cfg(not(any(unix, windows)))]
    {
        false
    }
}
