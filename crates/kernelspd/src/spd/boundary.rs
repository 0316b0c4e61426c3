//! IPsec boundary specification.
//!
//! The boundary tells the SPD which traffic it governs. It is a comma
//! separated list of `[!]proto:target` clauses:
//!
//! ```text
//! tcp:any
//! any:10.0.0.0/8,!udp:10.0.0.53
//! esp:any,any:dev=rmnet0
//! ```
//!
//! A flow is inside the boundary when a positive clause covers it and no
//! negated clause does. Prefix targets are matched against the remote
//! address of the flow.

use std::fmt;
use std::str::FromStr;

use super::error::{Error, Result};
use super::selector::{AddressRange, Flow};
use crate::util::ifname::{IfnameError, InterfaceName};
use crate::util::{addr, names};

/// Default ceiling for a boundary payload.
pub const BOUNDARY_LENGTH_MAX: usize = 10 * 1024;

/// What a clause applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundaryTarget {
    /// Every address.
    Any,
    /// Remote addresses within a prefix.
    Prefix {
        range: AddressRange,
        prefix_len: u8,
    },
    /// Traffic through one interface.
    Device(InterfaceName),
}

impl BoundaryTarget {
    fn covers(&self, flow: &Flow) -> bool {
        match self {
            Self::Any => true,
            Self::Prefix { range, .. } => range.contains(&flow.remote),
            Self::Device(name) => name.matches(flow.interface.as_deref()),
        }
    }
}

impl fmt::Display for BoundaryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Prefix { range, prefix_len } => write!(f, "{}/{}", range.start(), prefix_len),
            Self::Device(name) => write!(f, "dev={}", name),
        }
    }
}

/// One `[!]proto:target` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryClause {
    /// Clause excludes rather than includes.
    pub negated: bool,
    /// IP protocol, `None` for any.
    pub protocol: Option<u8>,
    /// Address or interface scope.
    pub target: BoundaryTarget,
}

impl BoundaryClause {
    /// Check if the clause applies to the flow, ignoring negation.
    pub fn covers(&self, flow: &Flow) -> bool {
        self.protocol.is_none_or(|p| p == flow.protocol) && self.target.covers(flow)
    }
}

impl fmt::Display for BoundaryClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "!")?;
        }
        match self.protocol {
            None => write!(f, "any")?,
            Some(p) => match names::ip_protocol_name(p) {
                Some(name) => write!(f, "{}", name)?,
                None => write!(f, "{}", p)?,
            },
        }
        write!(f, ":{}", self.target)
    }
}

impl FromStr for BoundaryClause {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (negated, s) = match s.strip_prefix('!') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, s),
        };

        let (proto, target) = s
            .split_once(':')
            .ok_or_else(|| invalid(format!("clause '{}' lacks ':'", s)))?;

        Ok(Self {
            negated,
            protocol: parse_protocol(proto.trim())?,
            target: parse_target(target.trim())?,
        })
    }
}

fn parse_protocol(s: &str) -> Result<Option<u8>> {
    if s == "any" {
        return Ok(None);
    }
    if let Some(number) = names::ip_protocol_id(s) {
        return Ok(Some(number));
    }
    s.parse::<u8>()
        .map(Some)
        .map_err(|_| invalid(format!("unknown protocol '{}'", s)))
}

fn parse_target(s: &str) -> Result<BoundaryTarget> {
    if s == "any" {
        return Ok(BoundaryTarget::Any);
    }
    if let Some(name) = s.strip_prefix("dev=") {
        let name = name.parse().map_err(|e: IfnameError| invalid(e.to_string()))?;
        return Ok(BoundaryTarget::Device(name));
    }
    let (address, prefix_len) = addr::parse_prefix(s).map_err(|e| invalid(e.to_string()))?;
    Ok(BoundaryTarget::Prefix {
        range: AddressRange::from_prefix(address, prefix_len),
        prefix_len,
    })
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidBoundary(message.into())
}

/// A validated boundary specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundarySpec {
    text: String,
    clauses: Vec<BoundaryClause>,
}

impl BoundarySpec {
    /// Parse and validate a boundary string.
    pub fn parse(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Err(invalid("empty boundary"));
        }

        let clauses = s
            .split(',')
            .map(|clause| {
                if clause.trim().is_empty() {
                    Err(invalid("empty clause"))
                } else {
                    clause.parse::<BoundaryClause>()
                }
            })
            .collect::<Result<Vec<_>>>()?;

        if clauses.iter().all(|c| c.negated) {
            return Err(invalid("no positive clause"));
        }

        Ok(Self {
            text: s.to_string(),
            clauses,
        })
    }

    /// Build a boundary from a control-channel payload.
    ///
    /// Rejects an empty payload or one over `length_max`. The copy is
    /// allocated fallibly. Trailing NUL terminators are ignored.
    pub fn from_payload(payload: &[u8], length_max: usize) -> Result<Self> {
        if payload.is_empty() {
            return Err(invalid("boundary is mandatory"));
        }
        if payload.len() > length_max {
            return Err(invalid(format!(
                "length {} exceeds maximum {}",
                payload.len(),
                length_max
            )));
        }

        let mut buf = Vec::new();
        buf.try_reserve_exact(payload.len())
            .map_err(|_| Error::ResourceExhausted(payload.len()))?;
        buf.extend_from_slice(payload);
        while buf.last() == Some(&0) {
            buf.pop();
        }
        if buf.contains(&0) {
            return Err(invalid("embedded NUL"));
        }

        let text = String::from_utf8(buf).map_err(|_| invalid("not valid UTF-8"))?;
        Self::parse(&text)
    }

    /// The boundary string as given.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn clauses(&self) -> &[BoundaryClause] {
        &self.clauses
    }

    /// Check if the flow is inside the boundary.
    pub fn covers(&self, flow: &Flow) -> bool {
        let mut inside = false;
        for clause in &self.clauses {
            if clause.covers(flow) {
                if clause.negated {
                    return false;
                }
                inside = true;
            }
        }
        inside
    }
}

impl FromStr for BoundarySpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for BoundarySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Check a boundary string against the grammar.
pub fn is_valid_spec(s: &str) -> bool {
    BoundarySpec::parse(s).is_ok()
}
