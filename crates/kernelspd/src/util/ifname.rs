//! Interface names for device-scoped boundary clauses.

use std::fmt;
use std::str::FromStr;

/// Longest interface name the kernel accepts.
pub const IFNAME_MAX: usize = 15;

/// Why a name was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IfnameError {
    #[error("interface name is empty")]
    Empty,
    #[error("interface name '{0}' longer than 15 bytes")]
    TooLong(String),
    #[error("interface name '{0}' contains '/', NUL or whitespace")]
    BadCharacter(String),
}

/// A validated Linux interface name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceName(String);

impl InterfaceName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if a flow's interface is this one.
    pub fn matches(&self, interface: Option<&str>) -> bool {
        interface == Some(self.0.as_str())
    }
}

impl FromStr for InterfaceName {
    type Err = IfnameError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        if name.is_empty() {
            return Err(IfnameError::Empty);
        }
        if name.len() > IFNAME_MAX {
            return Err(IfnameError::TooLong(name.to_string()));
        }
        if name.bytes().any(|b| b == b'/' || b == 0 || b.is_ascii_whitespace()) {
            return Err(IfnameError::BadCharacter(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }
}

impl fmt::Display for InterfaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
