//! spdctl apply command implementation.
//!
//! The whole stream goes to the control file in one write call, so the
//! kernel side either accepts every command or stops at the first
//! failing one.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;

use crate::policy::PolicyFile;

/// Default control file.
const DEFAULT_CONTROL_PATH: &str = "/proc/kernelspd";

#[derive(Args)]
pub struct ApplyCmd {
    /// Policy file (YAML, or JSON with a .json extension).
    policy: PathBuf,

    /// Control file to write to.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONTROL_PATH)]
    control: PathBuf,
}

impl ApplyCmd {
    pub async fn run(self) -> Result<()> {
        let stream = PolicyFile::load(&self.policy)?.compile()?;
        let control = self.control;
        let len = stream.len();

        let written = tokio::task::spawn_blocking(move || -> Result<usize> {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .open(&control)
                .with_context(|| format!("failed to open {}", control.display()))?;
            file.write(&stream).with_context(|| {
                format!("{} rejected the command stream", control.display())
            })
        })
        .await??;

        if written != len {
            bail!("short write: {} of {} bytes accepted", written, len);
        }

        tracing::info!(len, "policy applied");
        Ok(())
    }
}
