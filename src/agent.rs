//! The TC-agent client (§4.B): the collaborator that actually pushes
//! address-sets, filter chains, and TC rules into the kernel.
//!
//! The real agent is an out-of-process privileged helper reached over RPC
//! (§5 Agent RPC contract); that wire client is out of scope here (§1). What
//! ships is the trait boundary the compositor programs against, plus a
//! logging stub so the daemon runs standalone.

use async_trait::async_trait;

use crate::error::ChaosError;

/// One desired-state push to the kernel-facing agent (§4.B).
///
/// The compositor always sends the full snapshot for a device/experiment,
/// never a delta — see [`crate::compositor`].
#[async_trait]
pub trait TcAgent: Send + Sync {
    /// Replace the full set of address-sets known to the agent.
    async fn flush_address_sets(&self, sets: &[(String, Vec<String>)]) -> Result<(), ChaosError>;

    /// Replace the full set of filter chains known to the agent.
    async fn set_filter_chains(
        &self,
        chains: &[(String, Vec<String>, crate::model::Direction)],
    ) -> Result<(), ChaosError>;

    /// Replace the full set of TC rules for one device.
    async fn set_tcs(&self, device: &str, tcs: &[String]) -> Result<(), ChaosError>;
}

/// Stand-in [`TcAgent`] that logs every call and always succeeds.
///
/// Ships so the daemon is runnable without the privileged RPC agent; a real
/// deployment supplies its own [`TcAgent`] implementation that talks to it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingTcAgent;

#[async_trait]
impl TcAgent for LoggingTcAgent {
    async fn flush_address_sets(&self, sets: &[(String, Vec<String>)]) -> Result<(), ChaosError> {
        tracing::info!(count = sets.len(), "flush_address_sets");
        for (name, cidrs) in sets {
            tracing::debug!(name, ?cidrs, "address-set");
        }
        Ok(())
    }

    async fn set_filter_chains(
        &self,
        chains: &[(String, Vec<String>, crate::model::Direction)],
    ) -> Result<(), ChaosError> {
        tracing::info!(count = chains.len(), "set_filter_chains");
        for (name, sets, direction) in chains {
            tracing::debug!(name, ?sets, %direction, "filter-chain");
        }
        Ok(())
    }

    async fn set_tcs(&self, device: &str, tcs: &[String]) -> Result<(), ChaosError> {
        tracing::info!(device, count = tcs.len(), "set_tcs");
        for tc in tcs {
            tracing::debug!(device, tc, "tc-rule");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Direction;

    #[tokio::test]
    async fn logging_agent_accepts_empty_snapshot() {
        let agent = LoggingTcAgent;
        agent.flush_address_sets(&[]).await.unwrap();
        agent.set_filter_chains(&[]).await.unwrap();
        agent.set_tcs("eth0", &[]).await.unwrap();
    }

    #[tokio::test]
    async fn logging_agent_accepts_populated_snapshot() {
        let agent = LoggingTcAgent;
        agent
            .flush_address_sets(&[("chaos-a".into(), vec!["10.0.0.1/32".into()])])
            .await
            .unwrap();
        agent
            .set_filter_chains(&[("chain-a".into(), vec!["chaos-a".into()], Direction::Egress)])
            .await
            .unwrap();
        agent.set_tcs("eth0", &["{}".into()]).await.unwrap();
    }
}
