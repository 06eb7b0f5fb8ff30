//! Stress attack (§4.I): CPU/memory stressor workers run in-process for the
//! experiment's duration.
//!
//! chaos-mesh shells out to `stress-ng`; that binary is an external
//! collaborator this core does not model (§1), so the workers here are
//! plain tokio tasks that burn CPU or hold memory until cancelled.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::ChaosError;

/// Caller-supplied description of a stress attack (§4.I).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressAttack {
    pub workers: u32,
    /// Which stressor kinds to run: any of `cpu`, `memory`.
    pub stressors: Vec<String>,
}

/// Recorded effect of a stress attack: nothing but the uid is needed since
/// the running workers are tracked in [`StressRunner`] by uid (§4.I).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StressRecoverCommand {
    pub uid: String,
}

fn burn_cpu(stop: Arc<std::sync::atomic::AtomicBool>) {
    use std::sync::atomic::Ordering;
    let mut x: u64 = 0;
    while !stop.load(Ordering::Relaxed) {
        x = x.wrapping_mul(2654435761).wrapping_add(1);
        std::hint::black_box(x);
    }
}

/// Structural validation that must pass before any ledger row is written (§7).
pub fn validate(attack: &StressAttack) -> Result<(), ChaosError> {
    if attack.workers == 0 {
        return Err(ChaosError::BadArgs("workers must be greater than zero".into()));
    }
    for kind in &attack.stressors {
        if kind != "cpu" && kind != "memory" {
            return Err(ChaosError::BadArgs(format!("unknown stressor kind: {kind}")));
        }
    }
    Ok(())
}

async fn hold_memory(stop: Arc<tokio::sync::Notify>) {
    let _buf = vec![0u8; 64 * 1024 * 1024];
    stop.notified().await;
    drop(_buf);
}

/// Tracks running stressor tasks by experiment uid so recovery can cancel
/// them. Lives for the process lifetime of the daemon (§4.I).
#[derive(Clone, Default)]
pub struct StressRunner {
    jobs: Arc<Mutex<HashMap<String, Job>>>,
}

struct Job {
    handles: Vec<JoinHandle<()>>,
    cpu_stop: Arc<std::sync::atomic::AtomicBool>,
    mem_stop: Arc<tokio::sync::Notify>,
}

impl StressRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch `attack.workers` tasks per requested stressor kind (§4.I).
    pub async fn spawn(&self, uid: &str, attack: &StressAttack) -> Result<StressRecoverCommand, ChaosError> {
        validate(attack)?;

        let cpu_stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let mem_stop = Arc::new(tokio::sync::Notify::new());
        let mut handles = Vec::new();

        for kind in &attack.stressors {
            for _ in 0..attack.workers {
                match kind.as_str() {
                    "cpu" => {
                        let stop = cpu_stop.clone();
                        handles.push(tokio::task::spawn_blocking(move || burn_cpu(stop)));
                    }
                    "memory" => {
                        let stop = mem_stop.clone();
                        handles.push(tokio::spawn(hold_memory(stop)));
                    }
                    _ => unreachable!("validated above"),
                }
            }
        }

        let mut jobs = self.jobs.lock().await;
        jobs.insert(uid.to_string(), Job { handles, cpu_stop, mem_stop });
        Ok(StressRecoverCommand { uid: uid.to_string() })
    }

    /// Cancel every worker task recorded for `uid` (§4.I recovery).
    pub async fn cancel(&self, uid: &str) -> Result<(), ChaosError> {
        let job = {
            let mut jobs = self.jobs.lock().await;
            jobs.remove(uid)
        };
        let Some(job) = job else {
            return Ok(());
        };
        job.cpu_stop.store(true, std::sync::atomic::Ordering::Relaxed);
        job.mem_stop.notify_waiters();
        for handle in job.handles {
            let _ = handle.await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_workers_is_bad_args() {
        let runner = StressRunner::new();
        let attack = StressAttack { workers: 0, stressors: vec!["cpu".into()] };
        let err = runner.spawn("uid-1", &attack).await.unwrap_err();
        assert!(err.is_bad_args());
    }

    #[tokio::test]
    async fn unknown_stressor_kind_is_bad_args() {
        let runner = StressRunner::new();
        let attack = StressAttack { workers: 1, stressors: vec!["gpu".into()] };
        let err = runner.spawn("uid-2", &attack).await.unwrap_err();
        assert!(err.is_bad_args());
    }

    #[tokio::test]
    async fn spawn_then_cancel_completes() {
        let runner = StressRunner::new();
        let attack = StressAttack { workers: 2, stressors: vec!["cpu".into(), "memory".into()] };
        runner.spawn("uid-3", &attack).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        runner.cancel("uid-3").await.unwrap();
    }

    #[tokio::test]
    async fn cancelling_unknown_uid_is_a_no_op() {
        let runner = StressRunner::new();
        runner.cancel("does-not-exist").await.unwrap();
    }
}
