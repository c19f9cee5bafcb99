use std::path::{Path, PathBuf};

/// Per-VM work directory: `~/.local/share/nodebox/<name>/`
///
/// Resolved from the invoking user's home, so under `sudo` this is
/// `/root/.local/share/nodebox/<name>/`.
pub fn work_dir(name: &str) -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("nodebox")
        .join(name)
}

/// Host file locations touched by the lifecycle commands.
///
/// Production code uses [`HostPaths::system`]; tests point every entry at a
/// temporary directory.
#[derive(Debug, Clone)]
pub struct HostPaths {
    /// CPU feature listing, scanned for `vmx`/`svm`.
    pub cpuinfo: PathBuf,
    /// Static host table that receives the API entry.
    pub hosts_file: PathBuf,
    /// NetworkManager `conf.d` directory (enables the dnsmasq plugin).
    pub nm_conf_dir: PathBuf,
    /// NetworkManager's dnsmasq drop-in directory.
    pub dnsmasq_dir: PathBuf,
    /// Directory for generated XML and the log file.
    pub work_dir: PathBuf,
}

impl HostPaths {
    /// Real host locations. Generated XML and `nodebox.log` go to
    /// [`work_dir`], which is under root's home when run with `sudo`.
    pub fn system(name: &str) -> Self {
        Self {
            cpuinfo: PathBuf::from("/proc/cpuinfo"),
            hosts_file: PathBuf::from("/etc/hosts"),
            nm_conf_dir: PathBuf::from("/etc/NetworkManager/conf.d"),
            dnsmasq_dir: PathBuf::from("/etc/NetworkManager/dnsmasq.d"),
            work_dir: work_dir(name),
        }
    }

    /// Build a set of paths rooted under `root`.
    pub fn under(root: &Path) -> Self {
        Self {
            cpuinfo: root.join("cpuinfo"),
            hosts_file: root.join("hosts"),
            nm_conf_dir: root.join("conf.d"),
            dnsmasq_dir: root.join("dnsmasq.d"),
            work_dir: root.join("work"),
        }
    }

    /// `conf.d/<name>-nm-dnsmasq.conf`, switches NetworkManager to dnsmasq.
    pub fn nm_overlay(&self, name: &str) -> PathBuf {
        self.nm_conf_dir.join(format!("{name}-nm-dnsmasq.conf"))
    }

    /// `dnsmasq.d/<name>.conf`, answers for the cluster domain.
    pub fn dnsmasq_overlay(&self, name: &str) -> PathBuf {
        self.dnsmasq_dir.join(format!("{name}.conf"))
    }

    pub fn network_xml(&self) -> PathBuf {
        self.work_dir.join("network.xml")
    }

    pub fn pool_xml(&self) -> PathBuf {
        self.work_dir.join("pool.xml")
    }

    pub fn domain_xml(&self) -> PathBuf {
        self.work_dir.join("domain.xml")
    }

    pub fn log_file(&self) -> PathBuf {
        self.work_dir.join("nodebox.log")
    }
}
