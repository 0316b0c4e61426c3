//! Printable implementation for decoded commands.

use std::io::Write;

use super::{group_json, selector_text};
use crate::output::{OutputOptions, Printable};
use crate::spd::selector::entry_check;
use crate::spd::{Command, SpdId};

/// A command together with its offset in the stream.
#[derive(Debug, Clone, Copy)]
pub struct CommandRecord<'a> {
    pub offset: usize,
    pub command: Command<'a>,
}

impl<'a> CommandRecord<'a> {
    pub fn new(offset: usize, command: Command<'a>) -> Self {
        Self { offset, command }
    }
}

fn spd_name(spd_id: u32) -> String {
    SpdId::from_u32(spd_id)
        .map(|id| id.name().to_string())
        .unwrap_or_else(|| spd_id.to_string())
}

fn version(payload: &[u8]) -> Option<u32> {
    payload.try_into().ok().map(u32::from_ne_bytes)
}

impl Printable for CommandRecord<'_> {
    fn print_text<W: Write>(&self, w: &mut W, opts: &OutputOptions) -> std::io::Result<()> {
        write!(w, "@{} {}", self.offset, self.command.name())?;

        match self.command {
            Command::Activate { boundary } | Command::UpdateBoundary { boundary } => {
                writeln!(w, " boundary {:?}", String::from_utf8_lossy(boundary))?;
            }
            Command::Deactivate => writeln!(w)?,
            Command::InsertEntry {
                spd_id,
                entry_id,
                action,
                priority,
                precedence,
                payload,
            } => {
                write!(
                    w,
                    " spd {} id {} action {} priority {} precedence {}",
                    spd_name(spd_id),
                    entry_id,
                    action.name(),
                    priority,
                    precedence
                )?;
                match entry_check(payload) {
                    Ok(group) => {
                        writeln!(w, " selectors {}", group.selectors().len())?;
                        if opts.details {
                            for selector in group.selectors() {
                                writeln!(w, "    {}", selector_text(selector))?;
                            }
                        }
                    }
                    Err(e) => writeln!(w, " selectors invalid ({})", e)?,
                }
            }
            Command::RemoveEntry { spd_id, entry_id } => {
                writeln!(w, " spd {} id {}", spd_name(spd_id), entry_id)?;
            }
            Command::VersionSync { payload } => match version(payload) {
                Some(v) => writeln!(w, " version {}", v)?,
                None => writeln!(w, " invalid size {}", payload.len())?,
            },
            Command::Unknown {
                command_id,
                payload,
            } => {
                writeln!(w, " id {} len {}", command_id, payload.len())?;
            }
        }
        Ok(())
    }

    fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::json!({
            "offset": self.offset,
            "command": self.command.name(),
            "command_id": self.command.command_id(),
        });

        match self.command {
            Command::Activate { boundary } | Command::UpdateBoundary { boundary } => {
                obj["boundary"] = serde_json::json!(String::from_utf8_lossy(boundary));
            }
            Command::Deactivate => {}
            Command::InsertEntry {
                spd_id,
                entry_id,
                action,
                priority,
                precedence,
                payload,
            } => {
                obj["spd"] = serde_json::json!(spd_name(spd_id));
                obj["id"] = serde_json::json!(entry_id);
                obj["action"] = serde_json::json!(action.name());
                obj["priority"] = serde_json::json!(priority);
                obj["precedence"] = serde_json::json!(precedence);
                match entry_check(payload) {
                    Ok(group) => obj["selectors"] = group_json(&group),
                    Err(e) => obj["error"] = serde_json::json!(e.to_string()),
                }
            }
            Command::RemoveEntry { spd_id, entry_id } => {
                obj["spd"] = serde_json::json!(spd_name(spd_id));
                obj["id"] = serde_json::json!(entry_id);
            }
            Command::VersionSync { payload } => {
                obj["version"] = serde_json::json!(version(payload));
            }
            Command::Unknown { payload, .. } => {
                obj["payload_len"] = serde_json::json!(payload.len());
            }
        }

        obj
    }
}
