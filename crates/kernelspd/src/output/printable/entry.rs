//! Printable implementation for EntrySummary.

use std::io::Write;

use super::{group_json, selector_text};
use crate::output::{OutputOptions, Printable};
use crate::spd::EntrySummary;

impl Printable for EntrySummary {
    fn print_text<W: Write>(&self, w: &mut W, opts: &OutputOptions) -> std::io::Result<()> {
        write!(
            w,
            "{} entry {} action {} priority {}",
            self.spd_id.name(),
            self.id,
            self.action.name(),
            self.priority
        )?;
        if self.precedence != 0 {
            write!(w, " precedence {}", self.precedence)?;
        }
        writeln!(w, " selectors {}", self.selectors.selectors().len())?;

        if opts.details {
            for selector in self.selectors.selectors() {
                writeln!(w, "    {}", selector_text(selector))?;
            }
        }
        Ok(())
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "spd": self.spd_id.name(),
            "id": self.id,
            "action": self.action.name(),
            "priority": self.priority,
            "precedence": self.precedence,
            "payload_len": self.payload.len(),
            "selectors": group_json(&self.selectors),
        })
    }
}
