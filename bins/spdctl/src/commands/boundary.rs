//! spdctl boundary command implementation.

use std::io::Write;

use anyhow::Result;
use clap::Args;
use kernelspd::output::{OutputFormat, OutputOptions};
use kernelspd::spd::BoundarySpec;

#[derive(Args)]
pub struct BoundaryCmd {
    /// Boundary specification, e.g. "tcp:any,!udp:10.0.0.53".
    spec: String,
}

impl BoundaryCmd {
    pub fn run(self, format: OutputFormat, opts: &OutputOptions) -> Result<()> {
        let spec = BoundarySpec::parse(&self.spec)?;
        let mut stdout = std::io::stdout().lock();

        match format {
            OutputFormat::Text => {
                for clause in spec.clauses() {
                    writeln!(stdout, "{}", clause)?;
                }
            }
            OutputFormat::Json => {
                let clauses: Vec<_> = spec
                    .clauses()
                    .iter()
                    .map(|clause| {
                        serde_json::json!({
                            "negated": clause.negated,
                            "protocol": clause.protocol,
                            "target": clause.target.to_string(),
                        })
                    })
                    .collect();
                let value = serde_json::json!({
                    "boundary": spec.as_str(),
                    "clauses": clauses,
                });
                if opts.pretty {
                    serde_json::to_writer_pretty(&mut stdout, &value)?;
                } else {
                    serde_json::to_writer(&mut stdout, &value)?;
                }
                writeln!(stdout)?;
            }
        }
        Ok(())
    }
}
