//! Data model shared by the rule store, compositor, and attack handlers (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of attack kinds this daemon knows how to run (§4.F).
///
/// Adding a kind means adding a variant here, a handler in
/// [`crate::registry`], and registering it in [`crate::registry::AttackRegistry::builtin`] —
/// nowhere else needs to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttackKind {
    /// Network fault: delay/loss/corrupt/duplicate on a device (§4.C).
    Network,
    /// Signal a process (§4.G).
    Process,
    /// Grow a file to a target size (§4.H).
    DiskFill,
    /// Read or write an I/O payload against a path (§4.H).
    DiskPayload,
    /// CPU/memory stressor workers (§4.I).
    Stress,
}

impl AttackKind {
    /// Stable string form persisted in `experiments.kind` and used for routing.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Process => "process",
            Self::DiskFill => "disk-fill",
            Self::DiskPayload => "disk-payload",
            Self::Stress => "stress",
        }
    }
}

impl fmt::Display for AttackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AttackKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "network" => Ok(Self::Network),
            "process" => Ok(Self::Process),
            "disk-fill" => Ok(Self::DiskFill),
            "disk-payload" => Ok(Self::DiskPayload),
            "stress" => Ok(Self::Stress),
            other => Err(format!("unknown attack kind: {other}")),
        }
    }
}

/// Lifecycle status of an [`Experiment`] (§4.D state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ExperimentStatus {
    /// Row written before any side effect has been attempted.
    Created,
    /// All side effects applied; `recover_command` is sufficient to reverse them.
    Success,
    /// A side effect failed; `error` carries the message.
    Error,
    /// The experiment has been recovered. Terminal.
    Destroyed,
}

impl ExperimentStatus {
    /// Terminal statuses admit no further transitions (§3 invariant).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error | Self::Destroyed)
    }

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Success => "Success",
            Self::Error => "Error",
            Self::Destroyed => "Destroyed",
        }
    }
}

impl std::str::FromStr for ExperimentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Created" => Ok(Self::Created),
            "Success" => Ok(Self::Success),
            "Error" => Ok(Self::Error),
            "Destroyed" => Ok(Self::Destroyed),
            other => Err(format!("unknown experiment status: {other}")),
        }
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The persisted record of one attack invocation (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    /// 128-bit random identifier, rendered as a hyphenated UUID string.
    pub uid: String,
    /// The attack kind this experiment was created for.
    pub kind: AttackKind,
    /// Current lifecycle status.
    pub status: ExperimentStatus,
    /// Opaque, self-describing JSON blob the owning attack handler deserializes on recovery.
    pub recover_command: String,
    /// Human-readable failure message, empty unless `status == Error`.
    pub error_message: String,
    /// When the row was first written.
    pub created_at: DateTime<Utc>,
    /// When the row was last transitioned.
    pub updated_at: DateTime<Utc>,
}

/// An address-set rule: a named set of CIDRs referenced by filter chains (§3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressSetRule {
    /// Globally unique, derived as `chaos-<uid[0:16]>`.
    pub name: String,
    /// Comma-joined CIDR list.
    pub cidrs: String,
    /// Owning experiment uid.
    pub experiment: String,
}

impl AddressSetRule {
    /// Split [`Self::cidrs`] back into a list.
    pub fn cidr_list(&self) -> Vec<String> {
        self.cidrs.split(',').filter(|s| !s.is_empty()).map(|s| s.to_string()).collect()
    }
}

/// Packet direction a filter chain is attached to (§3). This system only ever
/// derives egress chains (both `egress_port` and `source_port` are egress-side
/// selectors), but ingress is modeled for completeness of the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ingress,
    Egress,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ingress => "ingress",
            Self::Egress => "egress",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Direction {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ingress" => Ok(Self::Ingress),
            "egress" => Ok(Self::Egress),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

/// A packet-filter chain rule (§3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterChainRule {
    /// Unique chain name.
    pub name: String,
    /// Comma-joined list of referenced address-set names.
    pub address_sets: String,
    /// Traffic direction this chain filters.
    pub direction: Direction,
    /// Owning experiment uid.
    pub experiment: String,
}

/// TC discipline kind (§3/§4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TcType {
    Netem,
    Bandwidth,
}

impl fmt::Display for TcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Netem => "netem",
            Self::Bandwidth => "bandwidth",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TcType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "netem" => Ok(Self::Netem),
            "bandwidth" => Ok(Self::Bandwidth),
            other => Err(format!("unknown tc type: {other}")),
        }
    }
}

/// A single traffic-control rule for one device (§3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TcRule {
    /// Discipline kind.
    pub r#type: TcType,
    /// Network interface name, e.g. `eth0`.
    pub device: String,
    /// JSON-encoded [`crate::compositor::TcParameter`].
    pub tc_json: String,
    /// Address-set this rule is scoped to, if any.
    pub address_set: Option<String>,
    /// IP protocol selector (`tcp`, `udp`, `icmp`, `all`), if any.
    pub protocol: Option<String>,
    /// Source port selector, if any.
    pub source_port: Option<String>,
    /// Egress port selector, if any.
    pub egress_port: Option<String>,
    /// Owning experiment uid.
    pub experiment: String,
}
