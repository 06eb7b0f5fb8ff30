//! Process attack (§4.G): signal every process matching a PID or executable
//! name, recording the matched PIDs so `SIGSTOP` can later be undone with
//! `SIGCONT`.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};

use crate::error::ChaosError;

/// Caller-supplied description of a process attack (§4.G).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessAttack {
    /// Numeric PID (as a string) or executable name to match.
    pub process: String,
    /// POSIX signal number: `SIGKILL` (9), `SIGTERM` (15), or `SIGSTOP` (19).
    pub signal: i32,
}

/// Recorded effect of a process attack, enough to reverse a `SIGSTOP` (§4.G).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessRecoverCommand {
    pub pids: Vec<i32>,
    pub signal: i32,
}

fn signal_for(code: i32) -> Result<Signal, ChaosError> {
    match code {
        9 => Ok(Signal::SIGKILL),
        15 => Ok(Signal::SIGTERM),
        19 => Ok(Signal::SIGSTOP),
        other => Err(ChaosError::BadArgs(format!("signal {other} is not supported"))),
    }
}

/// List `(pid, executable)` for every process currently visible under `/proc`.
fn list_processes() -> std::io::Result<Vec<(i32, String)>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir("/proc")? {
        let entry = entry?;
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<i32>().ok()) else {
            continue;
        };
        let comm_path = entry.path().join("comm");
        if let Ok(comm) = std::fs::read_to_string(comm_path) {
            out.push((pid, comm.trim().to_string()));
        }
    }
    Ok(out)
}

/// Structural validation that must pass before any ledger row is written
/// (§7): checks the signal is supported and at least one process matches.
pub async fn validate(attack: &ProcessAttack) -> Result<(), ChaosError> {
    signal_for(attack.signal)?;
    let target = attack.process.clone();
    let processes = tokio::task::spawn_blocking(list_processes)
        .await
        .map_err(|e| ChaosError::Internal(format!("process enumeration task: {e}")))?
        .map_err(|e| ChaosError::Internal(format!("process enumeration: {e}")))?;
    let matched = processes.iter().any(|(pid, executable)| target == pid.to_string() || target == *executable);
    if !matched {
        return Err(ChaosError::BadArgs(format!("process {target} not found")));
    }
    Ok(())
}

/// Apply a process attack (§4.G): signal every matching process.
pub async fn apply(attack: &ProcessAttack) -> Result<ProcessRecoverCommand, ChaosError> {
    let signal = signal_for(attack.signal)?;
    let target = attack.process.clone();

    let processes = tokio::task::spawn_blocking(list_processes)
        .await
        .map_err(|e| ChaosError::Internal(format!("process enumeration task: {e}")))?
        .map_err(|e| ChaosError::Internal(format!("process enumeration: {e}")))?;

    let mut pids = Vec::new();
    for (pid, executable) in processes {
        if target == pid.to_string() || target == executable {
            kill(Pid::from_raw(pid), signal)
                .map_err(|e| ChaosError::Agent(format!("signal pid {pid}: {e}")))?;
            pids.push(pid);
        }
    }

    if pids.is_empty() {
        return Err(ChaosError::BadArgs(format!("process {target} not found")));
    }

    Ok(ProcessRecoverCommand { pids, signal: attack.signal })
}

/// Reverse a process attack (§4.G): `SIGCONT` every recorded PID if the
/// original signal was `SIGSTOP`; any other signal is non-recoverable.
pub async fn recover(uid: &str, cmd: &ProcessRecoverCommand) -> Result<(), ChaosError> {
    if cmd.signal != 19 {
        return Err(ChaosError::NonRecoverable {
            uid: uid.to_string(),
            reason: format!("original signal {} has no inverse", cmd.signal),
        });
    }
    for pid in &cmd.pids {
        kill(Pid::from_raw(*pid), Signal::SIGCONT)
            .map_err(|e| ChaosError::Agent(format!("SIGCONT pid {pid}: {e}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unsupported_signal_is_bad_args() {
        let attack = ProcessAttack { process: std::process::id().to_string(), signal: 2 };
        let err = apply(&attack).await.unwrap_err();
        assert!(err.is_bad_args());
    }

    #[tokio::test]
    async fn unknown_process_is_bad_args() {
        let attack = ProcessAttack { process: "definitely-not-a-real-process-name".into(), signal: 15 };
        let err = apply(&attack).await.unwrap_err();
        assert!(err.is_bad_args());
    }

    #[tokio::test]
    async fn recovering_non_sigstop_is_non_recoverable() {
        let cmd = ProcessRecoverCommand { pids: vec![1], signal: 9 };
        let err = recover("uid-1", &cmd).await.unwrap_err();
        assert!(err.is_non_recoverable());
    }

    #[tokio::test]
    async fn stop_then_recover_resumes_process() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("1")
            .spawn()
            .expect("spawn sleep");
        let pid = child.id().expect("child pid") as i32;

        let attack = ProcessAttack { process: pid.to_string(), signal: 19 };
        let recover_cmd = apply(&attack).await.unwrap();
        assert_eq!(recover_cmd.pids, vec![pid]);

        recover("uid-2", &recover_cmd).await.unwrap();

        let status = tokio::time::timeout(std::time::Duration::from_secs(5), child.wait())
            .await
            .expect("sleep exited before timeout")
            .unwrap();
        assert!(status.success());
    }
}
