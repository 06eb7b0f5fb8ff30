//! The attack dispatcher (§4.D): owns the process-wide attack lock, mints
//! experiment rows, and drives one attack kind through its handler.

use chrono::Utc;
use uuid::Uuid;

use crate::agent::TcAgent;
use crate::attacks::RecoverEnvelope;
use crate::error::ChaosError;
use crate::model::{AttackKind, Experiment, ExperimentStatus};
use crate::registry::{AttackContext, AttackRegistry};
use crate::store::RuleStore;

/// Assembled server core: rule store, agent client, registry, and the single
/// process-wide lock serializing every attack-apply and recovery (§5).
pub struct Dispatcher {
    pub(crate) store: RuleStore,
    pub(crate) agent: Box<dyn TcAgent>,
    pub(crate) registry: AttackRegistry,
    pub(crate) lock: tokio::sync::Mutex<()>,
}

impl Dispatcher {
    pub fn new(store: RuleStore, agent: Box<dyn TcAgent>, registry: AttackRegistry) -> Self {
        Self { store, agent, registry, lock: tokio::sync::Mutex::new(()) }
    }

    /// Run one attack to completion (§4.D). Postconditions per §4.D: on
    /// success the ledger row is `Success` with a sufficient recover
    /// command; on error it is `Error` with the failure message.
    pub async fn execute_attack(
        &self,
        kind: AttackKind,
        args: serde_json::Value,
    ) -> Result<String, ChaosError> {
        let _guard = self.lock.lock().await;

        let handler = self
            .registry
            .get(kind)
            .ok_or_else(|| ChaosError::Internal(format!("no handler registered for {kind}")))?;

        // BadArgs must leave no ledger row (§7), so validation runs before
        // the experiment row is written.
        handler.validate(&args).await?;

        let uid = Uuid::new_v4().to_string();
        let now = Utc::now();
        let experiment = Experiment {
            uid: uid.clone(),
            kind,
            status: ExperimentStatus::Created,
            recover_command: String::new(),
            error_message: String::new(),
            created_at: now,
            updated_at: now,
        };
        self.store.set_experiment(&experiment).await?;

        let ctx = AttackContext { store: &self.store, agent: self.agent.as_ref() };
        match handler.apply(&ctx, &uid, args).await {
            Ok(data) => {
                let envelope = RecoverEnvelope::new(kind, data);
                let recover_command = envelope.encode()?;
                self.store
                    .update_experiment(&uid, ExperimentStatus::Success, "", &recover_command)
                    .await?;
                Ok(uid)
            }
            Err(err) => {
                self.store
                    .update_experiment(&uid, ExperimentStatus::Error, &err.ledger_message(), "")
                    .await?;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::LoggingTcAgent;
    use crate::attacks::stress::StressRunner;

    async fn dispatcher() -> Dispatcher {
        let store = RuleStore::connect_in_memory().await.unwrap();
        Dispatcher::new(store, Box::new(LoggingTcAgent), AttackRegistry::builtin(StressRunner::new()))
    }

    #[tokio::test]
    async fn successful_attack_records_success_with_recover_command() {
        let d = dispatcher().await;
        let args = serde_json::json!({"action": "delay", "device": "eth0", "latency": "10ms"});
        let uid = d.execute_attack(AttackKind::Network, args).await.unwrap();
        let exp = d.store.get_experiment(&uid).await.unwrap();
        assert_eq!(exp.status, ExperimentStatus::Success);
        assert!(!exp.recover_command.is_empty());
    }

    #[tokio::test]
    async fn bad_args_fails_validation_before_any_ledger_row_exists() {
        let d = dispatcher().await;
        let args = serde_json::json!({"action": "delay", "device": ""});
        let err = d.execute_attack(AttackKind::Network, args).await.unwrap_err();
        assert!(err.is_bad_args());
        // No uid was ever minted for this attempt, so there is nothing to
        // look up: validation ran strictly before the experiment row write.
    }

    #[tokio::test]
    async fn unknown_process_is_bad_args_with_no_ledger_row() {
        let d = dispatcher().await;
        let args = serde_json::json!({"process": "nonexistent-binary-xyz", "signal": 15});
        let err = d.execute_attack(AttackKind::Process, args).await.unwrap_err();
        assert!(err.is_bad_args());
    }

    /// Agent that accepts address-sets but fails every filter-chain push,
    /// simulating an agent error partway through network composition.
    struct ChainFailingAgent;

    #[async_trait::async_trait]
    impl TcAgent for ChainFailingAgent {
        async fn flush_address_sets(&self, _sets: &[(String, Vec<String>)]) -> Result<(), ChaosError> {
            Ok(())
        }
        async fn set_filter_chains(
            &self,
            _chains: &[(String, Vec<String>, crate::model::Direction)],
        ) -> Result<(), ChaosError> {
            Err(ChaosError::Agent("simulated agent failure at chains step".into()))
        }
        async fn set_tcs(&self, _device: &str, _tcs: &[String]) -> Result<(), ChaosError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn partial_failure_at_chains_step_leaves_address_set_only() {
        let store = RuleStore::connect_in_memory().await.unwrap();
        let d = Dispatcher::new(
            store,
            Box::new(ChainFailingAgent),
            AttackRegistry::builtin(StressRunner::new()),
        );
        let args = serde_json::json!({"action": "delay", "device": "eth0", "latency": "10ms", "ip_address": "10.0.0.5"});
        let err = d.execute_attack(AttackKind::Network, args).await.unwrap_err();
        assert!(!err.is_bad_args());

        // The address-set push succeeded, so that row is persisted. The
        // chains push failed, so neither the chain row nor the (unreached)
        // TC row exist: a facility is either fully updated or unchanged.
        let address_sets = d.store.list_address_sets().await.unwrap();
        assert_eq!(address_sets.len(), 1);
        assert!(d.store.list_filter_chains().await.unwrap().is_empty());
        assert!(d.store.find_tcs_by_device("eth0").await.unwrap().is_empty());

        let uid = &address_sets[0].experiment;
        let exp = d.store.get_experiment(uid).await.unwrap();
        assert_eq!(exp.status, ExperimentStatus::Error);
    }
}
