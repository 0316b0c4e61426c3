//! Printable implementation for SpdStatus.

use std::io::Write;

use crate::output::{OutputOptions, Printable};
use crate::spd::SpdStatus;

fn state_name(status: &SpdStatus) -> &'static str {
    if !status.initialised {
        "uninitialised"
    } else if status.active {
        "active"
    } else {
        "inactive"
    }
}

impl Printable for SpdStatus {
    fn print_text<W: Write>(&self, w: &mut W, _opts: &OutputOptions) -> std::io::Result<()> {
        write!(w, "state {}", state_name(self))?;
        if self.open {
            write!(w, " open")?;
        }
        writeln!(w)?;
        writeln!(
            w,
            "boundary {}",
            self.boundary.as_deref().unwrap_or("none")
        )?;
        writeln!(w, "entries in {} out {}", self.entries_in, self.entries_out)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "state": state_name(self),
            "open": self.open,
            "boundary": self.boundary,
            "entries": {
                "in": self.entries_in,
                "out": self.entries_out,
            },
        })
    }
}
