//! Host checks that must pass before `create` mutates anything.

use std::path::Path;

use crate::error::NodeboxError;
use crate::host::{Host, HostCommand};

/// True when any `flags` line lists `vmx` (Intel) or `svm` (AMD).
pub fn cpu_has_virtualization(cpuinfo: &str) -> bool {
    cpuinfo
        .lines()
        .filter_map(|line| line.split_once(':'))
        .filter(|(key, _)| key.trim() == "flags")
        .any(|(_, flags)| flags.split_whitespace().any(|f| f == "vmx" || f == "svm"))
}

pub async fn check_virtualization(cpuinfo_path: &Path) -> Result<(), NodeboxError> {
    let cpuinfo = tokio::fs::read_to_string(cpuinfo_path)
        .await
        .map_err(|e| NodeboxError::Io {
            context: format!("reading {}", cpuinfo_path.display()),
            source: e,
        })?;

    if !cpu_has_virtualization(&cpuinfo) {
        return Err(NodeboxError::VirtualizationUnsupported {
            path: cpuinfo_path.display().to_string(),
        });
    }
    tracing::debug!("hardware virtualization available");
    Ok(())
}

pub async fn check_firewall(host: &impl Host) -> Result<(), NodeboxError> {
    if !host.probe(&HostCommand::new("firewall-cmd").arg("--state")).await? {
        return Err(NodeboxError::FirewallInactive);
    }
    Ok(())
}
