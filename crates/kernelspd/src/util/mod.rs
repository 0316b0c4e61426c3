//! Utility modules for address, interface and protocol name handling.

pub mod addr;
pub mod ifname;
pub mod names;

pub use addr::{parse_prefix, parse_range};
