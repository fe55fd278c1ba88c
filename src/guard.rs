//! Single-instance lock backed by a PID file.
//!
//! `acquire` creates the PID file exclusively; while another holder's file
//! is present it backs off by a random increment after every attempt. The
//! returned handle removes the file when dropped. A file left behind by a
//! crash has to be removed by hand.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rand::Rng;
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;
use tracing::{debug, info, warn};

const INITIAL_WAIT: Duration = Duration::from_millis(100);
const MAX_JITTER_MS: u64 = 1000;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("another instance holds {path} (waited {waited:?})")]
    Busy { path: PathBuf, waited: Duration },
    #[error("pid file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Held while the current process owns the PID file.
#[derive(Debug)]
pub struct GuardHandle {
    path: PathBuf,
}

impl GuardHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for GuardHandle {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "pid file removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove pid file"),
        }
    }
}

pub struct ProcessGuard;

impl ProcessGuard {
    /// Waits up to `timeout` for `path` to be free, then claims it.
    ///
    /// A zero timeout checks once.
    pub async fn acquire(path: impl AsRef<Path>, timeout: Duration) -> Result<GuardHandle, GuardError> {
        let path = path.as_ref().to_path_buf();
        let started = Instant::now();
        let mut wait = INITIAL_WAIT;

        loop {
            match claim(&path).await {
                Ok(pid) => {
                    info!(path = %path.display(), pid, "pid file acquired");
                    return Ok(GuardHandle { path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(source) => return Err(GuardError::Io { path, source }),
            }

            let waited = started.elapsed();
            if waited >= timeout {
                return Err(GuardError::Busy { path, waited });
            }

            let pause = wait.min(timeout - waited);
            debug!(path = %path.display(), wait_ms = pause.as_millis() as u64, "pid file present, waiting");
            sleep(pause).await;
            wait += Duration::from_millis(rand::thread_rng().gen_range(0..MAX_JITTER_MS));
        }
    }
}

/// Creates the PID file only if it does not exist yet and writes our PID.
async fn claim(path: &Path) -> io::Result<u32> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;

    let pid = std::process::id();
    let written = async {
        file.write_all(format!("{}\n", pid).as_bytes()).await?;
        file.flush().await
    }
    .await;

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(path).await;
        return Err(e);
    }
    Ok(pid)
}
