//! The attack registry (§4.F): a static map from [`AttackKind`] to the
//! handler pair implementing its apply/recover routines.
//!
//! Grounded on the command/factory/registry split in the resilience control
//! plane this crate grew out of: a closed tag plus a lookup table, rather
//! than open-ended dynamic dispatch.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::agent::TcAgent;
use crate::attacks::disk::{self, DiskAttack};
use crate::attacks::process::{self, ProcessAttack};
use crate::attacks::stress::{StressAttack, StressRunner};
use crate::compositor::{NetworkAttack, NetworkCompositor};
use crate::error::ChaosError;
use crate::model::AttackKind;
use crate::store::RuleStore;

/// Shared collaborators every handler may need (§4.D/§4.F).
pub struct AttackContext<'a> {
    pub store: &'a RuleStore,
    pub agent: &'a dyn TcAgent,
}

/// One attack kind's apply/recover pair (§4.F).
#[async_trait]
pub trait AttackHandler: Send + Sync {
    /// Structural validation that must succeed before the dispatcher writes
    /// any ledger row (§7: BadArgs leaves no row). Must not have side effects.
    async fn validate(&self, args: &serde_json::Value) -> Result<(), ChaosError>;

    /// Apply the attack described by `args`, returning the JSON payload to
    /// be wrapped in a [`crate::attacks::RecoverEnvelope`] and persisted.
    async fn apply(
        &self,
        ctx: &AttackContext<'_>,
        uid: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ChaosError>;

    /// Reverse a previously-applied attack, given its envelope's `data`.
    async fn recover(
        &self,
        ctx: &AttackContext<'_>,
        uid: &str,
        data: serde_json::Value,
    ) -> Result<(), ChaosError>;
}

fn parse<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, ChaosError> {
    serde_json::from_value(value).map_err(|e| ChaosError::BadArgs(format!("invalid attack arguments: {e}")))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, ChaosError> {
    serde_json::to_value(value).map_err(|e| ChaosError::Internal(format!("recover command encode: {e}")))
}

struct NetworkHandler;

#[async_trait]
impl AttackHandler for NetworkHandler {
    async fn validate(&self, args: &serde_json::Value) -> Result<(), ChaosError> {
        let attack: NetworkAttack = parse(args.clone())?;
        crate::compositor::validate(&attack)
    }

    async fn apply(
        &self,
        ctx: &AttackContext<'_>,
        uid: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ChaosError> {
        let attack: NetworkAttack = parse(args)?;
        let compositor = NetworkCompositor::new(ctx.store, ctx.agent);
        let recover = compositor.apply(uid, &attack).await?;
        encode(&recover)
    }

    async fn recover(
        &self,
        ctx: &AttackContext<'_>,
        uid: &str,
        data: serde_json::Value,
    ) -> Result<(), ChaosError> {
        let cmd = parse(data)?;
        let compositor = NetworkCompositor::new(ctx.store, ctx.agent);
        compositor.recover(uid, &cmd).await
    }
}

struct ProcessHandler;

#[async_trait]
impl AttackHandler for ProcessHandler {
    async fn validate(&self, args: &serde_json::Value) -> Result<(), ChaosError> {
        let attack: ProcessAttack = parse(args.clone())?;
        process::validate(&attack).await
    }

    async fn apply(
        &self,
        _ctx: &AttackContext<'_>,
        _uid: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ChaosError> {
        let attack: ProcessAttack = parse(args)?;
        let recover = process::apply(&attack).await?;
        encode(&recover)
    }

    async fn recover(
        &self,
        _ctx: &AttackContext<'_>,
        uid: &str,
        data: serde_json::Value,
    ) -> Result<(), ChaosError> {
        let cmd = parse(data)?;
        process::recover(uid, &cmd).await
    }
}

struct DiskHandler;

#[async_trait]
impl AttackHandler for DiskHandler {
    async fn validate(&self, args: &serde_json::Value) -> Result<(), ChaosError> {
        let attack: DiskAttack = parse(args.clone())?;
        disk::validate(&attack)
    }

    async fn apply(
        &self,
        _ctx: &AttackContext<'_>,
        _uid: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ChaosError> {
        let attack: DiskAttack = parse(args)?;
        let recover = disk::apply(&attack).await?;
        encode(&recover)
    }

    async fn recover(
        &self,
        _ctx: &AttackContext<'_>,
        _uid: &str,
        data: serde_json::Value,
    ) -> Result<(), ChaosError> {
        let cmd = parse(data)?;
        disk::recover(&cmd).await
    }
}

struct StressHandler {
    runner: StressRunner,
}

#[async_trait]
impl AttackHandler for StressHandler {
    async fn validate(&self, args: &serde_json::Value) -> Result<(), ChaosError> {
        let attack: StressAttack = parse(args.clone())?;
        crate::attacks::stress::validate(&attack)
    }

    async fn apply(
        &self,
        _ctx: &AttackContext<'_>,
        uid: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ChaosError> {
        let attack: StressAttack = parse(args)?;
        let recover = self.runner.spawn(uid, &attack).await?;
        encode(&recover)
    }

    async fn recover(
        &self,
        _ctx: &AttackContext<'_>,
        _uid: &str,
        data: serde_json::Value,
    ) -> Result<(), ChaosError> {
        let cmd: crate::attacks::stress::StressRecoverCommand = parse(data)?;
        self.runner.cancel(&cmd.uid).await
    }
}

/// Maps [`AttackKind`] to its handler (§4.F). Adding a kind means adding a
/// variant to [`AttackKind`], a handler here, and an entry in
/// [`AttackRegistry::builtin`] — nowhere else.
pub struct AttackRegistry {
    handlers: HashMap<AttackKind, Box<dyn AttackHandler>>,
}

impl AttackRegistry {
    /// The registry of every attack kind this daemon ships (§4.F).
    pub fn builtin(stress_runner: StressRunner) -> Self {
        let mut handlers: HashMap<AttackKind, Box<dyn AttackHandler>> = HashMap::new();
        handlers.insert(AttackKind::Network, Box::new(NetworkHandler));
        handlers.insert(AttackKind::Process, Box::new(ProcessHandler));
        handlers.insert(AttackKind::DiskFill, Box::new(DiskHandler));
        handlers.insert(AttackKind::DiskPayload, Box::new(DiskHandler));
        handlers.insert(AttackKind::Stress, Box::new(StressHandler { runner: stress_runner }));
        Self { handlers }
    }

    /// Look up the handler for `kind`. Every [`AttackKind`] variant has one;
    /// this only returns `None` if [`AttackRegistry::builtin`] was bypassed.
    pub fn get(&self, kind: AttackKind) -> Option<&dyn AttackHandler> {
        self.handlers.get(&kind).map(|b| b.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registers_every_attack_kind() {
        let registry = AttackRegistry::builtin(StressRunner::new());
        for kind in [
            AttackKind::Network,
            AttackKind::Process,
            AttackKind::DiskFill,
            AttackKind::DiskPayload,
            AttackKind::Stress,
        ] {
            assert!(registry.get(kind).is_some(), "missing handler for {kind}");
        }
    }
}
