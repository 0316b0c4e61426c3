//! spdctl encode command implementation.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::policy::PolicyFile;

#[derive(Args)]
pub struct EncodeCmd {
    /// Policy file (YAML, or JSON with a .json extension).
    policy: PathBuf,

    /// Write the stream to FILE instead of stdout.
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

impl EncodeCmd {
    pub async fn run(self) -> Result<()> {
        let stream = PolicyFile::load(&self.policy)?.compile()?;
        tracing::debug!(len = stream.len(), "compiled policy");

        match self.output {
            Some(path) => tokio::fs::write(&path, &stream)
                .await
                .with_context(|| format!("failed to write {}", path.display())),
            None => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(&stream)?;
                stdout.flush()?;
                Ok(())
            }
        }
    }
}
