//! Output formatting (JSON/text) for SPD state and command streams.

mod printable;

pub use printable::CommandRecord;

use std::io::Write;

/// Output format options.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    /// Show decoded selectors.
    pub details: bool,
    /// Pretty print (for JSON).
    pub pretty: bool,
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text output.
    #[default]
    Text,
    /// JSON output.
    Json,
}

/// Trait for types that can be printed.
pub trait Printable {
    /// Print as plain text.
    fn print_text<W: Write>(&self, w: &mut W, opts: &OutputOptions) -> std::io::Result<()>;

    /// Convert to JSON value.
    fn to_json(&self) -> serde_json::Value;

    /// Print in the specified format.
    fn print<W: Write>(
        &self,
        w: &mut W,
        format: OutputFormat,
        opts: &OutputOptions,
    ) -> std::io::Result<()> {
        match format {
            OutputFormat::Text => self.print_text(w, opts),
            OutputFormat::Json => write_json(w, &self.to_json(), opts),
        }
    }
}

/// Print a list of items, as one JSON array in JSON mode.
pub fn print_all<T: Printable, W: Write>(
    items: &[T],
    w: &mut W,
    format: OutputFormat,
    opts: &OutputOptions,
) -> std::io::Result<()> {
    match format {
        OutputFormat::Text => {
            for item in items {
                item.print_text(w, opts)?;
            }
            Ok(())
        }
        OutputFormat::Json => {
            let array = serde_json::Value::Array(items.iter().map(Printable::to_json).collect());
            write_json(w, &array, opts)
        }
    }
}

fn write_json<W: Write>(
    w: &mut W,
    value: &serde_json::Value,
    opts: &OutputOptions,
) -> std::io::Result<()> {
    if opts.pretty {
        serde_json::to_writer_pretty(&mut *w, value)?;
    } else {
        serde_json::to_writer(&mut *w, value)?;
    }
    writeln!(w)
}
