//! Command handlers behind the CLI. Each one loads what it needs from
//! `Config`, runs the pipeline for the selected devices and writes the
//! user-facing report to `out`; progress goes to the log.

use std::io::Write;
use std::sync::Arc;

use crate::artifacts::ArtifactStore;
use crate::compare;
use crate::config::Config;
use crate::data::{self, FabricData};
use crate::device::DeviceAccess;
use crate::reconcile::{ExecutionMode, ReconcileReport, Reconciler};
use crate::render::TemplateRenderer;
use crate::utils::truncate_lines;

/// Render one device, or every device in inventory order.
///
/// A failing device is logged and skipped; the command fails at the end
/// if any device did.
pub fn render(config: &Config, hostname: Option<&str>, out: &mut dyn Write) -> anyhow::Result<()> {
    let data = FabricData::load(config)?;
    let renderer = TemplateRenderer::load(config)?;
    let devices = data.select(hostname)?;

    let mut failed = Vec::new();
    for device in &devices {
        match renderer.render_device(&data, device) {
            Ok(rendered) => {
                tracing::debug!("{}: {} lines", rendered.hostname, rendered.config.len());
                writeln!(out, "Rendered {}", rendered.path.display())?;
            }
            Err(e) => {
                tracing::error!("{}: render failed ({}): {}", device.hostname, e.kind(), e);
                failed.push(device.hostname.clone());
            }
        }
    }

    if !failed.is_empty() {
        anyhow::bail!(
            "{} of {} devices failed to render: {}",
            failed.len(),
            devices.len(),
            failed.join(", ")
        );
    }
    Ok(())
}

/// Print the unified diff between the device's running configuration and
/// its rendered artifact
pub async fn diff(
    config: &Config,
    access: Arc<dyn DeviceAccess>,
    hostname: &str,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let devices = data::load_devices(config)?;
    let device = data::find_device(&devices, hostname)?;
    let reconciler = reconciler(config, access);

    let desired = reconciler.desired_config(device)?;
    let running = reconciler.fetch_running(device).await?;

    // Side file only, a failed write does not invalidate the diff
    let backups = ArtifactStore::running(&config.backup_dir);
    match backups.write(hostname, &running) {
        Ok(path) => tracing::info!("Saved running config to {}", path.display()),
        Err(e) => tracing::warn!("{}: could not save running config: {}", hostname, e),
    }

    if running.is_empty() {
        tracing::warn!("{}: running config is empty", hostname);
    }

    let entries = compare::diff(&running, &desired);
    if entries.is_empty() {
        writeln!(out, "No differences")?;
    } else {
        let hunks = compare::hunks(&running, &desired);
        write!(out, "{}", compare::render_unified(&hunks, "running", "desired"))?;
    }

    for entry in entries.iter().filter(|e| e.kind != compare::DiffKind::Context) {
        tracing::debug!(
            "{} {}{} (running line {:?}, desired line {:?})",
            hostname,
            entry.kind.marker(),
            entry.text,
            entry.running_line,
            entry.desired_line
        );
    }

    let summary = compare::summarize(&entries);
    tracing::info!(
        "{}: {} additions, {} deletions",
        hostname,
        summary.additions,
        summary.deletions
    );
    Ok(())
}

/// Compute the plan for one device and, with `deploy`, push and save it
pub async fn push(
    config: &Config,
    access: Arc<dyn DeviceAccess>,
    hostname: &str,
    deploy: bool,
    out: &mut dyn Write,
) -> anyhow::Result<ReconcileReport> {
    let devices = data::load_devices(config)?;
    let device = data::find_device(&devices, hostname)?;
    let mode = ExecutionMode::from_deploy_flag(deploy);

    let report = reconciler(config, access).reconcile(device, mode, out).await?;
    tracing::info!(
        "{}: {:?} finished in {:?} ({} commands, running fetched at {})",
        report.hostname,
        report.mode,
        report.final_state(),
        report.commands.len(),
        report.fetched_at.to_rfc3339()
    );
    if let Some(output) = &report.push_output {
        tracing::debug!("{} device output:\n{}", report.hostname, truncate_lines(output, 40));
    }
    Ok(report)
}

fn reconciler(config: &Config, access: Arc<dyn DeviceAccess>) -> Reconciler {
    Reconciler::new(
        access,
        ArtifactStore::desired(&config.build_dir),
        config.device.ssh_port,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::models::{CommandSet, ConfigText, ConnectionParams};
    use crate::reconcile::ReconcileState;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const DEVICES: &str = "\
devices:
  - hostname: leaf1
    role: leaf
    mgmt_ip: 10.0.0.11
  - hostname: spine1
    role: spine
    mgmt_ip: 10.0.0.1
";

    const FABRIC: &str = "\
asn: 65000
underlay_links:
  - a: leaf1
    a_port: Ethernet1/49
    b: spine1
    b_port: Ethernet1/1
";

    const VLANS: &str = "device,vlan_id,name,vni,ip\nleaf1,100,web,10100,10.0.0.1/24\n";

    const LEAF: &str = "\
hostname {{ hostname }}
{% for vlan in vlans %}
vlan {{ vlan.id }}
  name {{ vlan.name }}
{% endfor %}
";

    fn project(spine_template: &str) -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        std::fs::create_dir_all(&config.data_dir).unwrap();
        std::fs::create_dir_all(config.templates_dir.join("nxos")).unwrap();
        std::fs::write(config.inventory_path(), DEVICES).unwrap();
        std::fs::write(config.fabric_path(), FABRIC).unwrap();
        std::fs::write(config.vlans_path(), VLANS).unwrap();
        std::fs::write(config.templates_dir.join("nxos/leaf.j2"), LEAF).unwrap();
        std::fs::write(config.templates_dir.join("nxos/spine.j2"), spine_template).unwrap();
        (dir, config)
    }

    /// Device serving a fixed running config
    struct StaticDevice {
        running: ConfigText,
        calls: Mutex<Vec<&'static str>>,
    }

    impl StaticDevice {
        fn new(lines: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                running: ConfigText::from_lines(lines.iter().copied()),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl DeviceAccess for StaticDevice {
        async fn fetch_running_config(&self, _params: &ConnectionParams) -> Result<ConfigText> {
            self.calls.lock().unwrap().push("fetch");
            Ok(self.running.clone())
        }

        async fn push_commands(&self, _params: &ConnectionParams, _commands: &CommandSet) -> Result<String> {
            self.calls.lock().unwrap().push("push");
            Ok(String::new())
        }

        async fn save_config(&self, _params: &ConnectionParams) -> Result<String> {
            self.calls.lock().unwrap().push("save");
            Ok(String::new())
        }
    }

    #[test]
    fn test_render_all_devices() {
        let (_dir, config) = project("hostname {{ hostname }}\n");
        let mut out = Vec::new();

        render(&config, None, &mut out).unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert_eq!(printed.lines().count(), 2);
        assert!(printed.starts_with("Rendered "));
        assert_eq!(
            std::fs::read_to_string(config.build_dir.join("leaf1.cfg")).unwrap(),
            "hostname leaf1\nvlan 100\n  name web\n"
        );
        assert_eq!(
            std::fs::read_to_string(config.build_dir.join("spine1.cfg")).unwrap(),
            "hostname spine1\n"
        );
    }

    #[test]
    fn test_render_failure_is_isolated() {
        let (_dir, config) = project("router bgp {{ bgp_asn }}\n");
        let mut out = Vec::new();

        let err = render(&config, None, &mut out).unwrap_err();

        assert!(err.to_string().contains("spine1"));
        assert!(config.build_dir.join("leaf1.cfg").exists());
        assert!(!config.build_dir.join("spine1.cfg").exists());
    }

    #[test]
    fn test_render_unknown_hostname() {
        let (_dir, config) = project("hostname {{ hostname }}\n");
        let err = render(&config, Some("leaf9"), &mut Vec::new()).unwrap_err();
        let err = err.downcast::<Error>().unwrap();
        assert_eq!(err.kind(), "not-found");
    }

    #[tokio::test]
    async fn test_diff_prints_unified_and_saves_running() {
        let (_dir, config) = project("hostname {{ hostname }}\n");
        render(&config, Some("leaf1"), &mut Vec::new()).unwrap();
        let device = StaticDevice::new(&["hostname leaf1", "vlan 100"]);
        let mut out = Vec::new();

        diff(&config, device.clone(), "leaf1", &mut out).await.unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "--- running\n+++ desired\n@@ -1,2 +1,3 @@\n hostname leaf1\n vlan 100\n+  name web\n"
        );
        assert_eq!(
            std::fs::read_to_string(config.backup_dir.join("leaf1-running.cfg")).unwrap(),
            "hostname leaf1\nvlan 100\n"
        );
        assert_eq!(*device.calls.lock().unwrap(), vec!["fetch"]);
    }

    #[tokio::test]
    async fn test_diff_no_differences() {
        let (_dir, config) = project("hostname {{ hostname }}\n");
        render(&config, Some("spine1"), &mut Vec::new()).unwrap();
        let device = StaticDevice::new(&["hostname spine1"]);
        let mut out = Vec::new();

        diff(&config, device, "spine1", &mut out).await.unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "No differences\n");
    }

    #[tokio::test]
    async fn test_diff_without_artifact() {
        let (_dir, config) = project("hostname {{ hostname }}\n");
        let device = StaticDevice::new(&["hostname leaf1"]);

        let err = diff(&config, device.clone(), "leaf1", &mut Vec::new()).await.unwrap_err();

        assert_eq!(err.downcast::<Error>().unwrap().kind(), "not-found");
        assert!(device.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_push_dry_run_by_default() {
        let (_dir, config) = project("hostname {{ hostname }}\n");
        render(&config, Some("leaf1"), &mut Vec::new()).unwrap();
        let device = StaticDevice::new(&["hostname leaf1", "vlan 100"]);
        let mut out = Vec::new();

        let report = push(&config, device.clone(), "leaf1", false, &mut out).await.unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Commands to push:\n  name web\n\nDry run only.\n"
        );
        assert_eq!(report.final_state(), ReconcileState::DryRunReport);
        assert_eq!(*device.calls.lock().unwrap(), vec!["fetch"]);
    }

    #[tokio::test]
    async fn test_push_deploy() {
        let (_dir, config) = project("hostname {{ hostname }}\n");
        render(&config, Some("leaf1"), &mut Vec::new()).unwrap();
        let device = StaticDevice::new(&["hostname leaf1"]);

        let report = push(&config, device.clone(), "leaf1", true, &mut Vec::new()).await.unwrap();

        assert_eq!(report.commands.commands(), &["vlan 100", "  name web"]);
        assert_eq!(report.final_state(), ReconcileState::Saved);
        assert_eq!(*device.calls.lock().unwrap(), vec!["fetch", "push", "save"]);
    }
}
