//! spdctl decode command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use kernelspd::output::{CommandRecord, OutputFormat, OutputOptions, print_all};
use kernelspd::spd::CommandIter;

#[derive(Args)]
pub struct DecodeCmd {
    /// Command stream file.
    file: PathBuf,
}

impl DecodeCmd {
    pub async fn run(self, format: OutputFormat, opts: &OutputOptions) -> Result<()> {
        let data = tokio::fs::read(&self.file)
            .await
            .with_context(|| format!("failed to read {}", self.file.display()))?;

        let mut iter = CommandIter::new(&data);
        let mut records = Vec::new();
        let mut failure = None;
        for item in iter.by_ref() {
            match item {
                Ok((offset, command)) => records.push(CommandRecord::new(offset, command)),
                Err(e) => failure = Some(e),
            }
        }

        let mut stdout = std::io::stdout().lock();
        print_all(&records, &mut stdout, format, opts)?;

        if let Some(e) = failure {
            bail!("malformed command at offset {}: {}", iter.offset(), e);
        }
        Ok(())
    }
}
