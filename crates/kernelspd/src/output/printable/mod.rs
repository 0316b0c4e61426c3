//! Printable implementations for SPD types.

mod command;
mod entry;
mod status;

pub use command::CommandRecord;

use crate::spd::selector::{IpSelector, SelectorGroup};

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn strings<T: ToString>(items: &[T]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

/// One-line text form of a selector, e.g. `remote 10.0.0.0-10.255.255.255 proto 6`.
pub(crate) fn selector_text(selector: &IpSelector) -> String {
    let mut parts = Vec::new();
    if let Some(items) = &selector.local_address {
        parts.push(format!("local {}", join(items)));
    }
    if let Some(items) = &selector.remote_address {
        parts.push(format!("remote {}", join(items)));
    }
    if let Some(items) = &selector.protocol {
        parts.push(format!("proto {}", join(items)));
    }
    if let Some(items) = &selector.local_port {
        parts.push(format!("lport {}", join(items)));
    }
    if let Some(items) = &selector.remote_port {
        parts.push(format!("rport {}", join(items)));
    }
    if parts.is_empty() {
        "any".to_string()
    } else {
        parts.join(" ")
    }
}

pub(crate) fn group_json(group: &SelectorGroup) -> serde_json::Value {
    let selectors: Vec<serde_json::Value> = group
        .selectors()
        .iter()
        .map(|s| {
            let mut obj = serde_json::json!({});
            if let Some(items) = &s.local_address {
                obj["local_address"] = serde_json::json!(strings(items));
            }
            if let Some(items) = &s.remote_address {
                obj["remote_address"] = serde_json::json!(strings(items));
            }
            if let Some(items) = &s.protocol {
                obj["protocol"] = serde_json::json!(strings(items));
            }
            if let Some(items) = &s.local_port {
                obj["local_port"] = serde_json::json!(strings(items));
            }
            if let Some(items) = &s.remote_port {
                obj["remote_port"] = serde_json::json!(strings(items));
            }
            obj
        })
        .collect();
    serde_json::Value::Array(selectors)
}
