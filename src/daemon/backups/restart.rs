//! Ending the process after a committed restore.

use serde::{Deserialize, Serialize};

/// How the server comes back after swapping in restored state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartMode {
    /// Re-execute the current binary in place with the same arguments.
    #[default]
    Exec,
    /// Exit with status 0 and let a supervisor start a fresh process.
    Exit,
}

/// Terminates the serving process. Implementations do not return in
/// production; test doubles do.
pub trait Restarter: Send + Sync + 'static {
    fn restart(&self);
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessRestarter {
    mode: RestartMode,
}

impl ProcessRestarter {
    pub fn new(mode: RestartMode) -> Self {
        Self { mode }
    }
}

impl Restarter for ProcessRestarter {
    fn restart(&self) {
        if self.mode == RestartMode::Exec {
            let err = exec_self();
            tracing::error!(error = %err, "Failed to re-execute after restore, exiting instead");
        }
        tracing::info!("Exiting so the restored state is loaded on next start");
        std::process::exit(0);
    }
}

#[cfg(unix)]
fn exec_self() -> anyhow::Error {
    use anyhow::Context;
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let result = (|| -> anyhow::Result<std::convert::Infallible> {
        let exe = std::env::current_exe().context("Failed to resolve current executable")?;
        let path = CString::new(exe.as_os_str().as_bytes())
            .context("Executable path contains a NUL byte")?;
        let args = std::env::args_os()
            .map(|arg| CString::new(arg.as_bytes()))
            .collect::<Result<Vec<_>, _>>()
            .context("Argument contains a NUL byte")?;

        tracing::info!(exe = %exe.display(), "Re-executing to load restored state");
        nix::unistd::execv(&path, &args).context("execv failed")
    })();

    match result {
        Ok(never) => match never {},
        Err(err) => err,
    }
}

#[cfg(not(unix))]
fn exec_self() -> anyhow::Error {
    anyhow::anyhow!("in-place re-execution is only supported on unix")
}
