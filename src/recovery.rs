//! The recovery engine (§4.E): reverses one experiment's effect and
//! transitions it to `Destroyed`.

use crate::attacks::RecoverEnvelope;
use crate::dispatcher::Dispatcher;
use crate::error::ChaosError;
use crate::model::ExperimentStatus;
use crate::registry::AttackContext;

/// Reverse the experiment identified by `uid` (§4.E).
///
/// Idempotent on already-`Destroyed` experiments per testable property 1:
/// a second call finds the row already `Destroyed` and returns an error
/// rather than re-running side effects.
pub async fn recover(dispatcher: &Dispatcher, uid: &str) -> Result<(), ChaosError> {
    let _guard = dispatcher.lock.lock().await;

    let experiment = dispatcher.store.get_experiment(uid).await?;
    if experiment.status.is_terminal() && experiment.status == ExperimentStatus::Destroyed {
        return Err(ChaosError::Internal(format!("experiment {uid} already recovered")));
    }

    // A failed attack (§4.D `Error`) has nothing coherent to reverse: the
    // dispatcher records no recover command for it, since the facility that
    // failed was never actually applied. Treat that as a no-op rather than
    // failing to decode, so `Error -> Destroyed` stays reachable.
    if experiment.status == ExperimentStatus::Error && experiment.recover_command.is_empty() {
        dispatcher
            .store
            .update_experiment(uid, ExperimentStatus::Destroyed, &experiment.error_message, "")
            .await?;
        return Ok(());
    }

    let envelope = RecoverEnvelope::decode(&experiment.recover_command)?;
    let handler = dispatcher
        .registry
        .get(envelope.kind)
        .ok_or_else(|| ChaosError::Internal(format!("no handler registered for {}", envelope.kind)))?;

    let ctx = AttackContext { store: &dispatcher.store, agent: dispatcher.agent.as_ref() };
    handler.recover(&ctx, uid, envelope.data).await?;

    dispatcher
        .store
        .update_experiment(uid, ExperimentStatus::Destroyed, &experiment.error_message, &experiment.recover_command)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::LoggingTcAgent;
    use crate::attacks::stress::StressRunner;
    use crate::model::AttackKind;
    use crate::registry::AttackRegistry;
    use crate::store::RuleStore;

    async fn dispatcher() -> Dispatcher {
        let store = RuleStore::connect_in_memory().await.unwrap();
        Dispatcher::new(store, Box::new(LoggingTcAgent), AttackRegistry::builtin(StressRunner::new()))
    }

    #[tokio::test]
    async fn recover_after_success_transitions_to_destroyed() {
        let d = dispatcher().await;
        let args = serde_json::json!({"action": "delay", "device": "eth0", "latency": "10ms"});
        let uid = d.execute_attack(AttackKind::Network, args).await.unwrap();
        recover(&d, &uid).await.unwrap();
        let exp = d.store.get_experiment(&uid).await.unwrap();
        assert_eq!(exp.status, ExperimentStatus::Destroyed);
    }

    #[tokio::test]
    async fn recovering_twice_is_idempotent_and_errors_on_the_second_call() {
        let d = dispatcher().await;
        let args = serde_json::json!({"action": "delay", "device": "eth0", "latency": "10ms"});
        let uid = d.execute_attack(AttackKind::Network, args).await.unwrap();
        recover(&d, &uid).await.unwrap();
        let err = recover(&d, &uid).await.unwrap_err();
        assert!(matches!(err, ChaosError::Internal(_)));
        let exp = d.store.get_experiment(&uid).await.unwrap();
        assert_eq!(exp.status, ExperimentStatus::Destroyed);
    }

    /// Agent that accepts address-sets but fails the TC push, leaving an
    /// `Error`-status experiment with an empty recover command.
    struct TcFailingAgent;

    #[async_trait::async_trait]
    impl crate::agent::TcAgent for TcFailingAgent {
        async fn flush_address_sets(&self, _sets: &[(String, Vec<String>)]) -> Result<(), ChaosError> {
            Ok(())
        }
        async fn set_filter_chains(
            &self,
            _chains: &[(String, Vec<String>, crate::model::Direction)],
        ) -> Result<(), ChaosError> {
            Ok(())
        }
        async fn set_tcs(&self, _device: &str, _tcs: &[String]) -> Result<(), ChaosError> {
            Err(ChaosError::Agent("simulated agent failure at tc step".into()))
        }
    }

    #[tokio::test]
    async fn recovering_an_error_status_experiment_is_a_no_op_destroy() {
        let store = RuleStore::connect_in_memory().await.unwrap();
        let d = Dispatcher::new(store, Box::new(TcFailingAgent), AttackRegistry::builtin(StressRunner::new()));
        let args = serde_json::json!({"action": "delay", "device": "eth0", "latency": "10ms", "ip_address": "10.0.0.5"});
        let err = d.execute_attack(AttackKind::Network, args).await.unwrap_err();
        assert!(!err.is_bad_args());

        let address_sets = d.store.list_address_sets().await.unwrap();
        assert_eq!(address_sets.len(), 1);
        let uid = address_sets[0].experiment.clone();
        let exp = d.store.get_experiment(&uid).await.unwrap();
        assert_eq!(exp.status, ExperimentStatus::Error);
        assert!(exp.recover_command.is_empty());

        recover(&d, &uid).await.unwrap();
        let exp = d.store.get_experiment(&uid).await.unwrap();
        assert_eq!(exp.status, ExperimentStatus::Destroyed);
    }

    #[tokio::test]
    async fn recovering_sigkilled_process_is_non_recoverable() {
        let d = dispatcher().await;
        let mut child = tokio::process::Command::new("sleep").arg("5").spawn().unwrap();
        let pid = child.id().unwrap() as i32;
        let args = serde_json::json!({"process": pid.to_string(), "signal": 9});
        let uid = d.execute_attack(AttackKind::Process, args).await.unwrap();
        let err = recover(&d, &uid).await.unwrap_err();
        assert!(err.is_non_recoverable());
        let _ = child.kill().await;
    }
}
