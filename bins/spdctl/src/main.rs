//! spdctl command - policy manager tool for the kernel SPD.

mod commands;
mod policy;

use clap::{Parser, Subcommand};
use kernelspd::output::{OutputFormat, OutputOptions};

#[derive(Parser)]
#[command(name = "spdctl", version, about = "Kernel security policy database tool")]
struct Cli {
    /// Output JSON.
    #[arg(short = 'j', long)]
    json: bool,

    /// Pretty print JSON.
    #[arg(short = 'p', long)]
    pretty: bool,

    /// Show details.
    #[arg(short = 'd', long)]
    details: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a policy file into a command stream.
    #[command(visible_alias = "e")]
    Encode(commands::encode::EncodeCmd),

    /// Compile a policy file and write it to the control file.
    #[command(visible_alias = "a")]
    Apply(commands::apply::ApplyCmd),

    /// Print the commands framed in a stream file.
    #[command(visible_alias = "d")]
    Decode(commands::decode::DecodeCmd),

    /// Run a stream through an in-process SPD and print its state.
    #[command(visible_alias = "r")]
    Replay(commands::replay::ReplayCmd),

    /// Validate an IPsec boundary specification.
    #[command(visible_alias = "b")]
    Boundary(commands::boundary::BoundaryCmd),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let opts = OutputOptions {
        details: cli.details,
        pretty: cli.pretty,
    };

    // Execute command
    let result = match cli.command {
        Command::Encode(cmd) => cmd.run().await,
        Command::Apply(cmd) => cmd.run().await,
        Command::Decode(cmd) => cmd.run(format, &opts).await,
        Command::Replay(cmd) => cmd.run(format, &opts).await,
        Command::Boundary(cmd) => cmd.run(format, &opts),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
