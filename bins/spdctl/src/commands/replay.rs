//! spdctl replay command implementation.
//!
//! Runs a stream through an in-process SPD with logging hooks and
//! prints the resulting state.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use kernelspd::output::{OutputFormat, OutputOptions, Printable, print_all};
use kernelspd::spd::{EntrySummary, LoggingHooks, Spd, SpdId};

#[derive(Args)]
pub struct ReplayCmd {
    /// Command stream file.
    file: PathBuf,
}

impl ReplayCmd {
    pub async fn run(self, format: OutputFormat, opts: &OutputOptions) -> Result<()> {
        let data = tokio::fs::read(&self.file)
            .await
            .with_context(|| format!("failed to read {}", self.file.display()))?;

        let spd = Spd::new(LoggingHooks::new());
        let mut channel = spd.open()?;
        let result = channel.write(&data);

        // Entries are drained on close, so print before it.
        let status = spd.status();
        let entries: Vec<EntrySummary> = SpdId::ALL
            .iter()
            .flat_map(|&id| spd.entries(id))
            .collect();

        let mut stdout = std::io::stdout().lock();
        match format {
            OutputFormat::Text => {
                status.print_text(&mut stdout, opts)?;
                print_all(&entries, &mut stdout, format, opts)?;
            }
            OutputFormat::Json => {
                let value = serde_json::json!({
                    "status": status.to_json(),
                    "entries": entries.iter().map(Printable::to_json).collect::<Vec<_>>(),
                });
                if opts.pretty {
                    serde_json::to_writer_pretty(&mut stdout, &value)?;
                } else {
                    serde_json::to_writer(&mut stdout, &value)?;
                }
                writeln!(stdout)?;
            }
        }
        drop(stdout);
        channel.close();

        if let Err(e) = result {
            bail!(
                "stopped after {} of {} bytes ({}): {}",
                e.consumed,
                data.len(),
                e.status(),
                e.error
            );
        }
        Ok(())
    }
}
