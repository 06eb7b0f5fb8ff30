//! Disk attack (§4.H): grow/create a file to an exact size, or generate
//! transient read/write I/O load against a path.

use serde::{Deserialize, Serialize};
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::ChaosError;

const MIB: u64 = 1024 * 1024;

/// The four disk actions (§4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiskAction {
    DiskFill,
    DiskReadPayload,
    DiskWritePayload,
}

impl std::str::FromStr for DiskAction {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disk-fill" => Ok(Self::DiskFill),
            "disk-read-payload" => Ok(Self::DiskReadPayload),
            "disk-write-payload" => Ok(Self::DiskWritePayload),
            other => Err(format!("unknown disk action: {other}")),
        }
    }
}

/// Caller-supplied description of a disk attack (§4.H).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskAttack {
    pub action: String,
    /// Target size in MiB.
    pub size: u64,
    pub path: String,
    /// `disk-fill` only: use `fallocate` instead of a manual write loop.
    #[serde(default)]
    pub fill_by_fallocate: bool,
}

/// Recorded effect of a disk attack, enough to undo a `disk-fill` (§4.H).
/// Payload actions record nothing (`existed` is `None`): they are transient
/// I/O bursts with no persistent effect to reverse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiskRecoverCommand {
    pub path: String,
    /// `Some(pre_attack_size)` if the file existed before the attack and
    /// should be truncated back; `None` if it should be deleted entirely.
    pub existed: Option<u64>,
}

fn grow_file_fallocate(path: &str, size: u64) -> std::io::Result<()> {
    let file = std::fs::OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
    file.set_len(size)?;
    Ok(())
}

fn grow_file_manual(path: &str, size: u64) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
    const CHUNK: usize = 1024 * 1024;
    let buf = vec![0u8; CHUNK];
    let mut remaining = size;
    while remaining > 0 {
        let n = remaining.min(CHUNK as u64) as usize;
        file.write_all(&buf[..n])?;
        remaining -= n as u64;
    }
    Ok(())
}

fn pre_attack_size(path: &str) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}

/// Structural validation that must pass before any ledger row is written (§7).
pub fn validate(attack: &DiskAttack) -> Result<(), ChaosError> {
    let _action: DiskAction = attack.action.parse().map_err(ChaosError::BadArgs)?;
    if attack.path.is_empty() {
        return Err(ChaosError::BadArgs("path must not be empty".into()));
    }
    if attack.size == 0 {
        return Err(ChaosError::BadArgs("size must be greater than zero".into()));
    }
    Ok(())
}

/// Apply a disk attack (§4.H).
pub async fn apply(attack: &DiskAttack) -> Result<DiskRecoverCommand, ChaosError> {
    let action: DiskAction = attack.action.parse().map_err(ChaosError::BadArgs)?;
    let path = attack.path.clone();
    let size_bytes = attack.size * MIB;
    let fallocate = attack.fill_by_fallocate;

    let existed = pre_attack_size(&path);

    tokio::task::spawn_blocking(move || match action {
        DiskAction::DiskFill => {
            if fallocate {
                grow_file_fallocate(&path, size_bytes)
            } else {
                grow_file_manual(&path, size_bytes)
            }
        }
        DiskAction::DiskWritePayload => {
            let mut file = std::fs::OpenOptions::new().create(true).write(true).truncate(true).open(&path)?;
            const CHUNK: usize = 1024 * 1024;
            let buf = vec![0xA5u8; CHUNK];
            let mut remaining = size_bytes;
            while remaining > 0 {
                let n = remaining.min(CHUNK as u64) as usize;
                file.write_all(&buf[..n])?;
                remaining -= n as u64;
            }
            Ok(())
        }
        DiskAction::DiskReadPayload => {
            let mut file = std::fs::File::open(&path)?;
            const CHUNK: usize = 1024 * 1024;
            let mut buf = vec![0u8; CHUNK];
            let mut remaining = size_bytes;
            file.seek(SeekFrom::Start(0))?;
            while remaining > 0 {
                let n = remaining.min(CHUNK as u64) as usize;
                let _ = file.read(&mut buf[..n])?;
                remaining -= n as u64;
            }
            Ok(())
        }
    })
    .await
    .map_err(|e| ChaosError::Internal(format!("disk attack task: {e}")))?
    .map_err(|e| ChaosError::Agent(format!("disk attack on {}: {e}", attack.path)))?;

    Ok(match action {
        DiskAction::DiskFill => DiskRecoverCommand { path: attack.path.clone(), existed },
        DiskAction::DiskReadPayload | DiskAction::DiskWritePayload => DiskRecoverCommand::default(),
    })
}

/// Reverse a disk attack (§4.H). No-op success for payload actions.
pub async fn recover(cmd: &DiskRecoverCommand) -> Result<(), ChaosError> {
    if cmd.path.is_empty() {
        return Ok(());
    }
    let path = cmd.path.clone();
    let task_path = path.clone();
    let existed = cmd.existed;
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let path = task_path;
        match existed {
            Some(size) => {
                let file = std::fs::OpenOptions::new().write(true).open(&path)?;
                file.set_len(size)?;
                Ok(())
            }
            None => {
                if std::path::Path::new(&path).exists() {
                    std::fs::remove_file(&path)?;
                }
                Ok(())
            }
        }
    })
    .await
    .map_err(|e| ChaosError::Internal(format!("disk recovery task: {e}")))?
    .map_err(|e| ChaosError::Agent(format!("disk recovery on {path}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disk_fill_by_fallocate_is_exact_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp").to_string_lossy().to_string();
        let attack = DiskAttack { action: "disk-fill".into(), size: 1024, path: path.clone(), fill_by_fallocate: true };
        apply(&attack).await.unwrap();
        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.len(), 1024 * 1024 * 1024);
    }

    #[tokio::test]
    async fn disk_fill_manual_is_exact_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp").to_string_lossy().to_string();
        let attack = DiskAttack { action: "disk-fill".into(), size: 24, path: path.clone(), fill_by_fallocate: false };
        apply(&attack).await.unwrap();
        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.len(), 24 * 1024 * 1024);
    }

    #[tokio::test]
    async fn recovery_truncates_preexisting_file_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp").to_string_lossy().to_string();
        std::fs::write(&path, vec![0u8; 10]).unwrap();
        let attack = DiskAttack { action: "disk-fill".into(), size: 1, path: path.clone(), fill_by_fallocate: true };
        let recover_cmd = apply(&attack).await.unwrap();
        assert_eq!(recover_cmd.existed, Some(10));
        recover(&recover_cmd).await.unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 10);
    }

    #[tokio::test]
    async fn recovery_deletes_file_that_did_not_preexist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp").to_string_lossy().to_string();
        let attack = DiskAttack { action: "disk-fill".into(), size: 1, path: path.clone(), fill_by_fallocate: true };
        let recover_cmd = apply(&attack).await.unwrap();
        assert_eq!(recover_cmd.existed, None);
        recover(&recover_cmd).await.unwrap();
        assert!(!std::path::Path::new(&path).exists());
    }

    #[tokio::test]
    async fn write_then_read_payload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp").to_string_lossy().to_string();
        let write_attack =
            DiskAttack { action: "disk-write-payload".into(), size: 4, path: path.clone(), fill_by_fallocate: false };
        let recover_cmd = apply(&write_attack).await.unwrap();
        assert!(recover_cmd.path.is_empty());
        let read_attack = DiskAttack { action: "disk-read-payload".into(), size: 4, path, fill_by_fallocate: false };
        apply(&read_attack).await.unwrap();
    }
}
