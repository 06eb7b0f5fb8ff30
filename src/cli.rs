//! The CLI front-end (§6): `clap` subcommands mirroring the HTTP routes.
//! A thin, mechanical translation layer (out of scope per §1) over
//! [`crate::dispatcher::Dispatcher`] and [`crate::recovery::recover`].

use clap::{Args, Subcommand};

use crate::dispatcher::Dispatcher;
use crate::model::AttackKind;

/// Process exit code for a caller-argument failure (§6).
pub const EXIT_BAD_ARGS: i32 = 2;
/// Process exit code for a runtime failure (§6).
pub const EXIT_ERROR: i32 = 1;

#[derive(Debug, Clone, Subcommand)]
pub enum Cmd {
    /// Run one of the attack kinds.
    Attack {
        #[command(subcommand)]
        kind: AttackCmd,
    },
    /// Reverse a previously-run attack.
    Recover {
        /// Experiment uid returned when the attack was applied.
        uid: String,
    },
    /// Run the HTTP front-end.
    Server,
}

#[derive(Debug, Clone, Subcommand)]
pub enum AttackCmd {
    Network {
        #[command(subcommand)]
        action: NetworkActionCmd,
    },
    Process {
        /// Numeric PID or executable name to match.
        process: String,
        /// POSIX signal number: 9 (SIGKILL), 15 (SIGTERM), 19 (SIGSTOP).
        #[arg(long)]
        signal: i32,
    },
    Disk {
        #[command(subcommand)]
        action: DiskActionCmd,
    },
    Stress {
        #[arg(long, default_value_t = 1)]
        workers: u32,
        #[arg(long, value_delimiter = ',')]
        stressors: Vec<String>,
    },
}

#[derive(Debug, Clone, Args)]
pub struct NetworkSelectors {
    #[arg(long, short = 'd')]
    pub device: String,
    #[arg(long, short = 'i')]
    pub ip: Option<String>,
    #[arg(long, short = 'H')]
    pub hostname: Option<String>,
    #[arg(long, short = 'p')]
    pub protocol: Option<String>,
    #[arg(long, short = 'e')]
    pub egress_port: Option<String>,
    #[arg(long, short = 's')]
    pub source_port: Option<String>,
    #[arg(long, short = 'c', default_value = "0")]
    pub correlation: String,
}

#[derive(Debug, Clone, Subcommand)]
pub enum NetworkActionCmd {
    Delay {
        #[command(flatten)]
        selectors: NetworkSelectors,
        #[arg(long, short = 'l')]
        latency: String,
        #[arg(long, short = 'j')]
        jitter: Option<String>,
    },
    Loss {
        #[command(flatten)]
        selectors: NetworkSelectors,
        #[arg(long, default_value = "1")]
        percent: String,
    },
    Corrupt {
        #[command(flatten)]
        selectors: NetworkSelectors,
        #[arg(long, default_value = "1")]
        percent: String,
    },
    Duplicate {
        #[command(flatten)]
        selectors: NetworkSelectors,
        #[arg(long, default_value = "1")]
        percent: String,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum DiskActionCmd {
    Fill {
        path: String,
        #[arg(long)]
        size: u64,
        #[arg(long, default_value_t = false)]
        fallocate: bool,
    },
    ReadPayload {
        path: String,
        #[arg(long)]
        size: u64,
    },
    WritePayload {
        path: String,
        #[arg(long)]
        size: u64,
    },
}

fn network_args(action: &str, selectors: &NetworkSelectors) -> serde_json::Value {
    serde_json::json!({
        "action": action,
        "device": selectors.device,
        "ip_address": selectors.ip,
        "hostname": selectors.hostname,
        "ip_protocol": selectors.protocol,
        "egress_port": selectors.egress_port,
        "source_port": selectors.source_port,
        "correlation": selectors.correlation,
    })
}

fn merge(mut base: serde_json::Value, extra: serde_json::Value) -> serde_json::Value {
    if let (Some(base_map), Some(extra_map)) = (base.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_map {
            base_map.insert(k.clone(), v.clone());
        }
    }
    base
}

/// Translate a CLI invocation into a dispatcher call, returning the process
/// exit code (§6).
pub async fn run(dispatcher: &Dispatcher, cmd: Cmd) -> i32 {
    match cmd {
        Cmd::Attack { kind } => attack(dispatcher, kind).await,
        Cmd::Recover { uid } => match crate::recovery::recover(dispatcher, &uid).await {
            Ok(()) => {
                println!("Recover attack successfully, uid: {uid}");
                0
            }
            Err(err) => report_error(&err),
        },
        Cmd::Server => 0,
    }
}

async fn attack(dispatcher: &Dispatcher, kind: AttackCmd) -> i32 {
    let (attack_kind, args) = match kind {
        AttackCmd::Network { action } => {
            let args = match action {
                NetworkActionCmd::Delay { selectors, latency, jitter } => merge(
                    network_args("delay", &selectors),
                    serde_json::json!({"latency": latency, "jitter": jitter}),
                ),
                NetworkActionCmd::Loss { selectors, percent } => {
                    merge(network_args("loss", &selectors), serde_json::json!({"percent": percent}))
                }
                NetworkActionCmd::Corrupt { selectors, percent } => {
                    merge(network_args("corrupt", &selectors), serde_json::json!({"percent": percent}))
                }
                NetworkActionCmd::Duplicate { selectors, percent } => {
                    merge(network_args("duplicate", &selectors), serde_json::json!({"percent": percent}))
                }
            };
            (AttackKind::Network, args)
        }
        AttackCmd::Process { process, signal } => {
            (AttackKind::Process, serde_json::json!({"process": process, "signal": signal}))
        }
        AttackCmd::Disk { action } => match action {
            DiskActionCmd::Fill { path, size, fallocate } => (
                AttackKind::DiskFill,
                serde_json::json!({"action": "disk-fill", "path": path, "size": size, "fill_by_fallocate": fallocate}),
            ),
            DiskActionCmd::ReadPayload { path, size } => (
                AttackKind::DiskPayload,
                serde_json::json!({"action": "disk-read-payload", "path": path, "size": size}),
            ),
            DiskActionCmd::WritePayload { path, size } => (
                AttackKind::DiskPayload,
                serde_json::json!({"action": "disk-write-payload", "path": path, "size": size}),
            ),
        },
        AttackCmd::Stress { workers, stressors } => {
            (AttackKind::Stress, serde_json::json!({"workers": workers, "stressors": stressors}))
        }
    };

    match dispatcher.execute_attack(attack_kind, args).await {
        Ok(uid) => {
            println!("Attack {attack_kind} successfully, uid: {uid}");
            0
        }
        Err(err) => report_error(&err),
    }
}

fn report_error(err: &crate::error::ChaosError) -> i32 {
    eprintln!("{err}");
    if err.is_bad_args() {
        EXIT_BAD_ARGS
    } else {
        EXIT_ERROR
    }
}
