//! Policy files and their compilation to command streams.
//!
//! A policy file is YAML (or JSON when the extension is `.json`):
//!
//! ```yaml
//! boundary: "tcp:any"
//! entries:
//!   - spd: out
//!     id: 5
//!     action: protect
//!     priority: 10
//!     selectors:
//!       - remote_address: ["10.0.0.0/8"]
//!         protocol: [tcp]
//!         remote_port: ["443", "8000-8080"]
//! ```

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result, bail};
use kernelspd::spd::{
    AddressRange, BoundarySpec, CommandBuilder, IpSelector, KERNEL_SPD_VERSION, PortRange,
    ProtocolRange, SelectorGroup, SpdAction, SpdId,
};
use kernelspd::util::names;
use serde::Deserialize;

/// A number or a string in a policy file.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(u64),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Top-level policy file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyFile {
    /// Boundary installed by ACTIVATE.
    pub boundary: String,
    /// Emit DEACTIVATE before ACTIVATE.
    #[serde(default)]
    pub deactivate_first: bool,
    #[serde(default)]
    pub entries: Vec<EntryConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntryConfig {
    pub spd: SpdId,
    pub id: u32,
    pub action: Scalar,
    pub priority: u32,
    #[serde(default)]
    pub precedence: u32,
    #[serde(default)]
    pub selectors: Vec<SelectorConfig>,
}

/// One selector; absent fields match anything.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectorConfig {
    pub local_address: Option<Vec<Scalar>>,
    pub remote_address: Option<Vec<Scalar>>,
    pub protocol: Option<Vec<Scalar>>,
    pub local_port: Option<Vec<Scalar>>,
    pub remote_port: Option<Vec<Scalar>>,
}

impl PolicyFile {
    /// Read a policy file, picking the format from the extension.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&text)
                .with_context(|| format!("failed to parse {}", path.display())),
            _ => Self::from_yaml(&text)
                .with_context(|| format!("failed to parse {}", path.display())),
        }
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Compile to `VERSION_SYNC`, optional `DEACTIVATE`, `ACTIVATE`, then
    /// one `INSERT_ENTRY` per entry in file order.
    pub fn compile(&self) -> Result<Vec<u8>> {
        BoundarySpec::parse(&self.boundary)
            .with_context(|| format!("invalid boundary '{}'", self.boundary))?;

        let mut builder = CommandBuilder::new().version_sync(KERNEL_SPD_VERSION);
        if self.deactivate_first {
            builder = builder.deactivate();
        }
        builder = builder.activate(&self.boundary);

        for entry in &self.entries {
            let payload = entry
                .selector_group()
                .and_then(|group| Ok(group.to_bytes()?))
                .with_context(|| format!("entry {} {}", entry.spd.name(), entry.id))?;
            builder = builder.insert_entry(
                entry.spd,
                entry.id,
                entry.action()?,
                entry.priority,
                entry.precedence,
                &payload,
            );
        }

        Ok(builder.build())
    }
}

impl EntryConfig {
    pub fn action(&self) -> Result<SpdAction> {
        match &self.action {
            Scalar::Number(n) => Ok(SpdAction::from_u32(u32::try_from(*n)?)),
            Scalar::Text(s) => s
                .parse()
                .with_context(|| format!("unknown action '{}'", s)),
        }
    }

    pub fn selector_group(&self) -> Result<SelectorGroup> {
        self.selectors
            .iter()
            .try_fold(SelectorGroup::new(), |group, selector| {
                Ok(group.selector(selector.to_selector()?))
            })
    }
}

impl SelectorConfig {
    pub fn to_selector(&self) -> Result<IpSelector> {
        let mut selector = IpSelector::new();
        selector.local_address = convert(&self.local_address, addresses)?;
        selector.remote_address = convert(&self.remote_address, addresses)?;
        selector.protocol = convert(&self.protocol, protocols)?;
        selector.local_port = convert(&self.local_port, ports)?;
        selector.remote_port = convert(&self.remote_port, ports)?;
        Ok(selector)
    }
}

fn convert<T>(
    values: &Option<Vec<Scalar>>,
    parse: impl Fn(&Scalar) -> Result<Vec<T>>,
) -> Result<Option<Vec<T>>> {
    let Some(values) = values else {
        return Ok(None);
    };
    let mut out = Vec::new();
    for value in values {
        out.extend(parse(value)?);
    }
    Ok(Some(out))
}

fn addresses(value: &Scalar) -> Result<Vec<AddressRange>> {
    match value {
        Scalar::Text(s) if s == "any" => Ok(vec![AddressRange::any_v4(), AddressRange::any_v6()]),
        Scalar::Text(s) => Ok(vec![
            s.parse()
                .with_context(|| format!("invalid address '{}'", s))?,
        ]),
        Scalar::Number(n) => bail!("invalid address '{}'", n),
    }
}

fn protocols(value: &Scalar) -> Result<Vec<ProtocolRange>> {
    match value {
        Scalar::Number(n) => Ok(vec![ProtocolRange::single(u8::try_from(*n).with_context(
            || format!("protocol {} out of range", n),
        )?)]),
        Scalar::Text(s) => match names::ip_protocol_id(s) {
            Some(id) => Ok(vec![ProtocolRange::single(id)]),
            None => Ok(vec![
                s.parse()
                    .with_context(|| format!("invalid protocol '{}'", s))?,
            ]),
        },
    }
}

fn ports(value: &Scalar) -> Result<Vec<PortRange>> {
    match value {
        Scalar::Number(n) => Ok(vec![PortRange::single(
            u16::try_from(*n).with_context(|| format!("port {} out of range", n))?,
        )]),
        Scalar::Text(s) => Ok(vec![
            s.parse().with_context(|| format!("invalid port '{}'", s))?,
        ]),
    }
}
