//! Host-side name resolution for the cluster domain.
//!
//! NetworkManager is switched to its dnsmasq plugin and given a drop-in that
//! forwards the base domain to the libvirt network's resolver and pins the
//! apps wildcard to the VM. Both files are written once and never rewritten.

use std::path::Path;

use tokio::io::AsyncWriteExt;

use crate::config::Config;
use crate::error::NodeboxError;
use crate::paths::HostPaths;

pub const NM_OVERLAY: &str = "[main]\ndns=dnsmasq\n";

pub fn dnsmasq_overlay(config: &Config) -> String {
    let domain = &config.base_domain;
    format!(
        "server=/{domain}/{gateway}\naddress=/apps.{domain}/{ip}\n",
        gateway = config.network.gateway,
        ip = config.network.ip,
    )
}

/// Write `contents` to `path` unless the file already exists.
/// Returns whether the file was written.
pub async fn write_if_absent(path: &Path, contents: &str) -> Result<bool, NodeboxError> {
    let exists = tokio::fs::try_exists(path)
        .await
        .map_err(|e| NodeboxError::Io {
            context: format!("checking {}", path.display()),
            source: e,
        })?;
    if exists {
        tracing::debug!(path = %path.display(), "already present, leaving untouched");
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| NodeboxError::Io {
                context: format!("creating directory {}", parent.display()),
                source: e,
            })?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| NodeboxError::Io {
            context: format!("writing {}", path.display()),
            source: e,
        })?;
    tracing::info!(path = %path.display(), "wrote DNS overlay");
    Ok(true)
}

/// Write both overlay files. True if at least one was new, meaning the DNS
/// service must be restarted.
pub async fn ensure_overlays(config: &Config, paths: &HostPaths) -> Result<bool, NodeboxError> {
    let nm = write_if_absent(&paths.nm_overlay(&config.name), NM_OVERLAY).await?;
    let dnsmasq =
        write_if_absent(&paths.dnsmasq_overlay(&config.name), &dnsmasq_overlay(config)).await?;
    Ok(nm || dnsmasq)
}

pub fn hosts_entry(config: &Config) -> String {
    format!("{} {}", config.network.ip, config.api_hostname())
}

fn has_entry(hosts: &str, entry: &str) -> bool {
    let wanted: Vec<&str> = entry.split_whitespace().collect();
    hosts
        .lines()
        .any(|line| line.split_whitespace().collect::<Vec<_>>() == wanted)
}

/// Append the API entry to the hosts file unless an identical line exists.
/// Returns whether a line was appended.
pub async fn ensure_hosts_entry(config: &Config, hosts_file: &Path) -> Result<bool, NodeboxError> {
    let entry = hosts_entry(config);
    let current = match tokio::fs::read_to_string(hosts_file).await {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(NodeboxError::Io {
                context: format!("reading {}", hosts_file.display()),
                source: e,
            });
        }
    };

    if has_entry(&current, &entry) {
        return Ok(false);
    }

    let mut line = String::new();
    if !current.is_empty() && !current.ends_with('\n') {
        line.push('\n');
    }
    line.push_str(&entry);
    line.push('\n');

    // Appended in place, never truncated
    let write_err = |e: std::io::Error| NodeboxError::Io {
        context: format!("appending to {}", hosts_file.display()),
        source: e,
    };
    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(hosts_file)
        .await
        .map_err(write_err)?;
    file.write_all(line.as_bytes()).await.map_err(write_err)?;
    file.flush().await.map_err(write_err)?;
    tracing::info!(entry = %entry, "appended hosts entry");
    Ok(true)
}
