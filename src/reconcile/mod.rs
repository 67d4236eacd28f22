//! Converging a device toward its rendered configuration.
//!
//! Per invocation:
//!
//! ```text
//! Idle -> FetchRunning -> FetchFailed
//!                      -> RunningLoaded -> ComputePlan -> DryRunReport
//!                                                      -> Converged
//!                                                      -> Push -> PushFailed
//!                                                              -> Saved
//! ```
//!
//! A push can only be issued from a `PreparedPlan`, which only exists after
//! the running configuration was fetched and a plan computed from it.

use chrono::{DateTime, Utc};
use std::io::Write;
use std::sync::Arc;

use crate::artifacts::ArtifactStore;
use crate::device::DeviceAccess;
use crate::error::{Error, Result};
use crate::models::{CommandSet, ConfigText, ConnectionParams, DeviceRecord};

/// Every desired line that does not appear verbatim anywhere in `running`,
/// in desired order.
///
/// Additive only: running lines missing from `desired` produce no removal,
/// and a line present under a different parent context still counts as present.
pub fn plan(running: &ConfigText, desired: &ConfigText) -> CommandSet {
    let present = running.line_set();
    CommandSet::new(
        desired
            .lines()
            .iter()
            .filter(|line| !present.contains(line.as_str()))
            .cloned()
            .collect(),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    DryRun,
    Execute,
}

impl ExecutionMode {
    pub fn from_deploy_flag(deploy: bool) -> Self {
        if deploy {
            ExecutionMode::Execute
        } else {
            ExecutionMode::DryRun
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    Idle,
    FetchRunning,
    FetchFailed,
    RunningLoaded,
    ComputePlan,
    DryRunReport,
    /// Execute mode with nothing to push
    Converged,
    Push,
    PushFailed,
    Saved,
}

impl ReconcileState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReconcileState::FetchFailed
                | ReconcileState::DryRunReport
                | ReconcileState::Converged
                | ReconcileState::PushFailed
                | ReconcileState::Saved
        )
    }
}

#[derive(Debug, Clone)]
struct StateTrace {
    hostname: String,
    states: Vec<ReconcileState>,
}

impl StateTrace {
    fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            states: vec![ReconcileState::Idle],
        }
    }

    fn enter(&mut self, state: ReconcileState) {
        if state.is_terminal() {
            tracing::info!(device = %self.hostname, ?state, "reconcile finished");
        } else {
            tracing::debug!(device = %self.hostname, ?state, "reconcile state");
        }
        self.states.push(state);
    }
}

/// Running config fetched and plan computed; the only way to reach a push
#[derive(Debug)]
pub struct PreparedPlan {
    params: ConnectionParams,
    commands: CommandSet,
    fetched_at: DateTime<Utc>,
    trace: StateTrace,
}

impl PreparedPlan {
    pub fn hostname(&self) -> &str {
        &self.params.hostname
    }

    pub fn commands(&self) -> &CommandSet {
        &self.commands
    }
}

/// Outcome of one reconcile invocation
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub hostname: String,
    pub mode: ExecutionMode,
    pub commands: CommandSet,
    pub fetched_at: DateTime<Utc>,
    pub trace: Vec<ReconcileState>,
    pub push_output: Option<String>,
}

impl ReconcileReport {
    pub fn final_state(&self) -> ReconcileState {
        self.trace.last().copied().unwrap_or(ReconcileState::Idle)
    }
}

/// Reconciler compares rendered artifacts with live devices and pushes the difference
pub struct Reconciler {
    access: Arc<dyn DeviceAccess>,
    desired: ArtifactStore,
    ssh_port: u16,
}

impl Reconciler {
    pub fn new(access: Arc<dyn DeviceAccess>, desired: ArtifactStore, ssh_port: u16) -> Self {
        Self {
            access,
            desired,
            ssh_port,
        }
    }

    /// Rendered configuration for the device; `NotFound` when never rendered
    pub fn desired_config(&self, device: &DeviceRecord) -> Result<ConfigText> {
        self.desired.read(&device.hostname)
    }

    /// Fetch the device's running configuration
    pub async fn fetch_running(&self, device: &DeviceRecord) -> Result<ConfigText> {
        let params = ConnectionParams::for_device(device, self.ssh_port);
        self.access.fetch_running_config(&params).await
    }

    /// Fetch the running baseline and compute the command set.
    ///
    /// Fails before anything is pushed when the desired artifact is missing
    /// or the device cannot be read.
    pub async fn prepare(&self, device: &DeviceRecord) -> Result<PreparedPlan> {
        let mut trace = StateTrace::new(&device.hostname);
        let desired = self.desired_config(device)?;
        let params = ConnectionParams::for_device(device, self.ssh_port);

        trace.enter(ReconcileState::FetchRunning);
        let running = match self.access.fetch_running_config(&params).await {
            Ok(running) => running,
            Err(e) => {
                trace.enter(ReconcileState::FetchFailed);
                tracing::warn!("{}: fetch failed ({}), nothing pushed", device.hostname, e.kind());
                return Err(e);
            }
        };
        let fetched_at = Utc::now();
        trace.enter(ReconcileState::RunningLoaded);

        trace.enter(ReconcileState::ComputePlan);
        let commands = plan(&running, &desired);
        tracing::info!(
            "{}: {} of {} desired lines missing from running config",
            device.hostname,
            commands.len(),
            desired.len()
        );

        Ok(PreparedPlan {
            params,
            commands,
            fetched_at,
            trace,
        })
    }

    /// Report the plan to `out` and, in execute mode, push and save it
    pub async fn apply(
        &self,
        prepared: PreparedPlan,
        mode: ExecutionMode,
        out: &mut dyn Write,
    ) -> Result<ReconcileReport> {
        let PreparedPlan {
            params,
            commands,
            fetched_at,
            mut trace,
        } = prepared;

        write_plan(out, &commands).map_err(|e| Error::io("<output>", e))?;

        let push_output = match mode {
            ExecutionMode::DryRun => {
                writeln!(out, "\nDry run only.").map_err(|e| Error::io("<output>", e))?;
                trace.enter(ReconcileState::DryRunReport);
                None
            }
            ExecutionMode::Execute if commands.is_empty() => {
                writeln!(out, "\nNothing to push.").map_err(|e| Error::io("<output>", e))?;
                trace.enter(ReconcileState::Converged);
                None
            }
            ExecutionMode::Execute => {
                trace.enter(ReconcileState::Push);
                let result = match self.access.push_commands(&params, &commands).await {
                    Ok(pushed) => self
                        .access
                        .save_config(&params)
                        .await
                        .map(|saved| format!("{}{}", pushed, saved)),
                    Err(e) => Err(e),
                };
                match result {
                    Ok(output) => {
                        trace.enter(ReconcileState::Saved);
                        tracing::info!("{}: pushed {} commands and saved", params.hostname, commands.len());
                        Some(output)
                    }
                    Err(e) => {
                        trace.enter(ReconcileState::PushFailed);
                        tracing::error!("{}: push failed ({})", params.hostname, e.kind());
                        return Err(e);
                    }
                }
            }
        };

        Ok(ReconcileReport {
            hostname: params.hostname,
            mode,
            commands,
            fetched_at,
            trace: trace.states,
            push_output,
        })
    }

    /// Full invocation: prepare, report, and push when `mode` is `Execute`
    pub async fn reconcile(
        &self,
        device: &DeviceRecord,
        mode: ExecutionMode,
        out: &mut dyn Write,
    ) -> Result<ReconcileReport> {
        let prepared = self.prepare(device).await?;
        tracing::debug!(
            "{}: plan ready, {} commands",
            prepared.hostname(),
            prepared.commands().len()
        );
        self.apply(prepared, mode, out).await
    }
}

fn write_plan(out: &mut dyn Write, commands: &CommandSet) -> std::io::Result<()> {
    writeln!(out, "Commands to push:")?;
    for cmd in commands.iter() {
        writeln!(out, "{}", cmd)?;
    }
    Ok(())
}
