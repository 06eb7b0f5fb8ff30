//! The network fault compositor (§4.C): the hardest subcomponent. Decides
//! which of the three kernel facilities (address-set, filter chain, TC) a
//! network attack needs, reconstructs each one's full desired-state snapshot
//! from the rule store, and pushes it to the [`crate::agent::TcAgent`].

use serde::{Deserialize, Serialize};
use std::net::ToSocketAddrs;

use crate::agent::TcAgent;
use crate::error::ChaosError;
use crate::model::{AddressSetRule, Direction, FilterChainRule, TcRule, TcType};
use crate::store::RuleStore;

/// The four network actions the compositor understands (§4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkAction {
    Delay,
    Loss,
    Corrupt,
    Duplicate,
}

impl std::str::FromStr for NetworkAction {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delay" => Ok(Self::Delay),
            "loss" => Ok(Self::Loss),
            "corrupt" => Ok(Self::Corrupt),
            "duplicate" => Ok(Self::Duplicate),
            other => Err(format!("unknown network action: {other}")),
        }
    }
}

/// Caller-supplied description of a network attack (§4.C).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkAttack {
    pub action: String,
    pub device: String,
    pub latency: Option<String>,
    pub jitter: Option<String>,
    pub correlation: Option<String>,
    pub percent: Option<String>,
    pub ip_address: Option<String>,
    pub hostname: Option<String>,
    pub ip_protocol: Option<String>,
    pub egress_port: Option<String>,
    pub source_port: Option<String>,
}

/// The netem parameter blob serialized into `tc_rules.tc_json` (§4.C).
///
/// All four actions serialize here; the source's serializer dropped
/// `corrupt`/`duplicate`, which was a bug (§9), not a deliberate restriction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TcParameter {
    pub delay: Option<String>,
    pub jitter: Option<String>,
    pub correlation: Option<String>,
    pub loss: Option<String>,
    pub corrupt: Option<String>,
    pub duplicate: Option<String>,
}

impl TcParameter {
    fn from_attack(action: NetworkAction, attack: &NetworkAttack) -> Self {
        let mut p = TcParameter::default();
        match action {
            NetworkAction::Delay => {
                p.delay = attack.latency.clone();
                p.jitter = attack.jitter.clone();
                p.correlation = attack.correlation.clone();
            }
            NetworkAction::Loss => {
                p.loss = attack.percent.clone();
                p.correlation = attack.correlation.clone();
            }
            NetworkAction::Corrupt => {
                p.corrupt = attack.percent.clone();
                p.correlation = attack.correlation.clone();
            }
            NetworkAction::Duplicate => {
                p.duplicate = attack.percent.clone();
                p.correlation = attack.correlation.clone();
            }
        }
        p
    }
}

/// What a network attack touched, so recovery knows what to undo (§4.C,
/// serialized into `experiments.recover_command`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkRecoverCommand {
    pub device: String,
    pub address_set: Option<String>,
    pub filter_chain: Option<String>,
    pub has_tc: bool,
}

/// Resolve `ip_address` or `hostname` into CIDR form (§4.C). `ip_address` is
/// already a CIDR-or-bare-address and passes through unchanged; a hostname is
/// resolved once, at apply time, via the system resolver.
fn resolve_cidrs(attack: &NetworkAttack) -> Result<Vec<String>, ChaosError> {
    if let Some(ip) = &attack.ip_address {
        if !ip.is_empty() {
            let cidr = if ip.contains('/') { ip.clone() } else { format!("{ip}/32") };
            return Ok(vec![cidr]);
        }
    }
    if let Some(host) = &attack.hostname {
        if !host.is_empty() {
            let target = format!("{host}:0");
            let addrs: Vec<String> = target
                .to_socket_addrs()
                .map_err(|e| ChaosError::BadArgs(format!("cannot resolve {host}: {e}")))?
                .map(|a| match a.ip() {
                    std::net::IpAddr::V4(v4) => format!("{v4}/32"),
                    std::net::IpAddr::V6(v6) => format!("{v6}/128"),
                })
                .collect();
            if addrs.is_empty() {
                return Err(ChaosError::BadArgs(format!("hostname {host} resolved to no addresses")));
            }
            return Ok(addrs);
        }
    }
    Ok(Vec::new())
}

fn needs_address_set(attack: &NetworkAttack) -> bool {
    attack.ip_address.as_deref().is_some_and(|s| !s.is_empty())
        || attack.hostname.as_deref().is_some_and(|s| !s.is_empty())
}

fn needs_filter_chain(attack: &NetworkAttack, address_set_needed: bool) -> bool {
    address_set_needed
        || attack.egress_port.as_deref().is_some_and(|s| !s.is_empty())
        || attack.source_port.as_deref().is_some_and(|s| !s.is_empty())
        || attack.ip_protocol.as_deref().is_some_and(|s| !s.is_empty())
}

/// Composes and recovers network attacks against the rule store and agent.
pub struct NetworkCompositor<'a> {
    store: &'a RuleStore,
    agent: &'a dyn TcAgent,
}

/// Structural validation a network attack must pass before any ledger row is
/// written (§7: BadArgs errors leave no ledger row). Resolves hostnames so a
/// resolution failure is caught here, per testable property 7.
pub fn validate(attack: &NetworkAttack) -> Result<(), ChaosError> {
    let _action: NetworkAction = attack.action.parse().map_err(ChaosError::BadArgs)?;
    if attack.device.is_empty() {
        return Err(ChaosError::BadArgs("device must not be empty".into()));
    }
    resolve_cidrs(attack)?;
    Ok(())
}

impl<'a> NetworkCompositor<'a> {
    pub fn new(store: &'a RuleStore, agent: &'a dyn TcAgent) -> Self {
        Self { store, agent }
    }

    /// Apply a network attack (§4.C composition algorithm). Returns the
    /// recover command to persist into the experiment row.
    pub async fn apply(
        &self,
        uid: &str,
        attack: &NetworkAttack,
    ) -> Result<NetworkRecoverCommand, ChaosError> {
        let action: NetworkAction = attack
            .action
            .parse()
            .map_err(ChaosError::BadArgs)?;
        if attack.device.is_empty() {
            return Err(ChaosError::BadArgs("device must not be empty".into()));
        }

        let mut recover = NetworkRecoverCommand { device: attack.device.clone(), ..Default::default() };

        // Step 1: address-set. Push the would-be snapshot to the agent
        // first; only persist the row once the agent confirms it (§4.D:
        // a facility is either fully updated or left unchanged).
        let address_set_name = if needs_address_set(attack) {
            let cidrs = resolve_cidrs(attack)?;
            let name = format!("chaos-{}", short_uid(uid));
            let rule = AddressSetRule { name: name.clone(), cidrs: cidrs.join(","), experiment: uid.to_string() };
            let mut prospective = self.store.list_address_sets().await?;
            prospective.push(rule.clone());
            push_address_sets(self.agent, &prospective).await?;
            self.store.set_address_set(&rule).await?;
            recover.address_set = Some(name.clone());
            Some(name)
        } else {
            None
        };

        // Step 2: filter chain. Same push-then-persist ordering.
        if needs_filter_chain(attack, address_set_name.is_some()) {
            let chain_name = format!("chain-{}", short_uid(uid));
            let direction = Direction::Egress;
            let referenced = address_set_name.clone().unwrap_or_default();
            let rule = FilterChainRule {
                name: chain_name.clone(),
                address_sets: referenced,
                direction,
                experiment: uid.to_string(),
            };
            let mut prospective = self.store.list_filter_chains().await?;
            prospective.push(rule.clone());
            push_filter_chains(self.agent, &prospective).await?;
            self.store.set_filter_chain(&rule).await?;
            recover.filter_chain = Some(chain_name);
        }

        // Step 3: TC (always needed). Same push-then-persist ordering.
        let param = TcParameter::from_attack(action, attack);
        let tc_json = serde_json::to_string(&param)
            .map_err(|e| ChaosError::Internal(format!("tc parameter encode: {e}")))?;
        let tc_rule = TcRule {
            r#type: TcType::Netem,
            device: attack.device.clone(),
            tc_json,
            address_set: address_set_name,
            protocol: attack.ip_protocol.clone(),
            source_port: attack.source_port.clone(),
            egress_port: attack.egress_port.clone(),
            experiment: uid.to_string(),
        };
        let mut prospective = self.store.find_tcs_by_device(&attack.device).await?;
        prospective.push(tc_rule.clone());
        push_tcs(self.agent, &attack.device, &prospective).await?;
        self.store.set_tc(&tc_rule).await?;
        recover.has_tc = true;

        Ok(recover)
    }

    /// Reverse a network attack (§4.C recovery algorithm).
    pub async fn recover(&self, uid: &str, cmd: &NetworkRecoverCommand) -> Result<(), ChaosError> {
        // Step 2 first: chains updated before address-sets are forgotten
        // (reverse dependency order).
        if cmd.filter_chain.is_some() {
            self.store.delete_filter_chains_by_experiment(uid).await?;
            let remaining = self.store.list_filter_chains().await?;
            push_filter_chains(self.agent, &remaining).await?;
        }

        if cmd.has_tc {
            self.store.delete_tcs_by_experiment(uid).await?;
            let remaining = self.store.find_tcs_by_device(&cmd.device).await?;
            push_tcs(self.agent, &cmd.device, &remaining).await?;
        }

        // Step 1 last: by design, no updated address-set list is pushed here
        // (§9 open question) — only the owning rows are forgotten.
        if cmd.address_set.is_some() {
            self.store.delete_address_sets_by_experiment(uid).await?;
        }

        Ok(())
    }
}

fn short_uid(uid: &str) -> String {
    uid.chars().filter(|c| *c != '-').take(16).collect()
}

async fn push_address_sets(agent: &dyn TcAgent, rows: &[AddressSetRule]) -> Result<(), ChaosError> {
    let snapshot: Vec<(String, Vec<String>)> =
        rows.iter().map(|r| (r.name.clone(), r.cidr_list())).collect();
    agent.flush_address_sets(&snapshot).await
}

async fn push_filter_chains(agent: &dyn TcAgent, rows: &[FilterChainRule]) -> Result<(), ChaosError> {
    let snapshot: Vec<(String, Vec<String>, Direction)> = rows
        .iter()
        .map(|r| {
            let sets = r.address_sets.split(',').filter(|s| !s.is_empty()).map(String::from).collect();
            (r.name.clone(), sets, r.direction)
        })
        .collect();
    agent.set_filter_chains(&snapshot).await
}

async fn push_tcs(agent: &dyn TcAgent, device: &str, rows: &[TcRule]) -> Result<(), ChaosError> {
    let snapshot: Vec<String> = rows.iter().map(|r| r.tc_json.clone()).collect();
    agent.set_tcs(device, &snapshot).await
}
