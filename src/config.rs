use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use facet::Facet;

use crate::error::NodeboxError;
use crate::util;

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct Config {
    #[facet(default = "nodebox")]
    pub name: String,
    #[facet(default = "nodebox.testing")]
    pub base_domain: String,
    #[facet(default)]
    pub image: ImageConfig,
    #[facet(default)]
    pub resources: ResourcesConfig,
    #[facet(default)]
    pub network: NetworkConfig,
    #[facet(default)]
    pub storage: StorageConfig,
    #[facet(default)]
    pub host: HostConfig,
    #[facet(default)]
    pub advanced: AdvancedConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "nodebox".into(),
            base_domain: "nodebox.testing".into(),
            image: ImageConfig::default(),
            resources: ResourcesConfig::default(),
            network: NetworkConfig::default(),
            storage: StorageConfig::default(),
            host: HostConfig::default(),
            advanced: AdvancedConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct ImageConfig {
    #[facet(default = "nodebox.qcow2")]
    pub path: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            path: "nodebox.qcow2".into(),
        }
    }
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct ResourcesConfig {
    #[facet(default = 4)]
    pub cpus: u32,
    #[facet(default = "9G")]
    pub memory: String,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            cpus: 4,
            memory: "9G".into(),
        }
    }
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct NetworkConfig {
    #[facet(default = "nodebox")]
    pub name: String,
    #[facet(default = "nbr0")]
    pub bridge: String,
    #[facet(default = "192.168.130.1")]
    pub gateway: String,
    #[facet(default = "255.255.255.0")]
    pub netmask: String,
    #[facet(default = "192.168.130.2")]
    pub dhcp_start: String,
    #[facet(default = "192.168.130.254")]
    pub dhcp_end: String,
    #[facet(default = "192.168.130.11")]
    pub ip: String,
    #[facet(default = "52:fd:fc:07:21:82")]
    pub mac: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "nodebox".into(),
            bridge: "nbr0".into(),
            gateway: "192.168.130.1".into(),
            netmask: "255.255.255.0".into(),
            dhcp_start: "192.168.130.2".into(),
            dhcp_end: "192.168.130.254".into(),
            ip: "192.168.130.11".into(),
            mac: "52:fd:fc:07:21:82".into(),
        }
    }
}

impl NetworkConfig {
    /// Subnet in CIDR notation, derived from gateway and netmask.
    /// E.g. `192.168.130.1` + `255.255.255.0` → `192.168.130.0/24`
    pub fn cidr(&self) -> Result<String, NodeboxError> {
        let gateway = parse_ip("network.gateway", &self.gateway)?;
        let mask = parse_ip("network.netmask", &self.netmask)?;
        let bits = u32::from(mask);
        let prefix = bits.count_ones();
        let network = Ipv4Addr::from(u32::from(gateway) & bits);
        Ok(format!("{network}/{prefix}"))
    }
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct StorageConfig {
    #[facet(default = "default")]
    pub pool: String,
    #[facet(default = "/var/lib/libvirt/images")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            pool: "default".into(),
            path: "/var/lib/libvirt/images".into(),
        }
    }
}

const DEFAULT_PACKAGES: &[&str] = &["libvirt", "libvirt-daemon-kvm", "qemu-kvm", "NetworkManager"];

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct HostConfig {
    /// Packages to install; `None` installs the libvirt/KVM defaults.
    pub packages: Option<Vec<String>>,
    #[facet(default = "dnf")]
    pub package_manager: String,
    #[facet(default = "16509/tcp")]
    pub firewall_port: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            packages: None,
            package_manager: "dnf".into(),
            firewall_port: "16509/tcp".into(),
        }
    }
}

impl HostConfig {
    pub fn packages(&self) -> Vec<String> {
        match &self.packages {
            Some(p) => p.clone(),
            None => DEFAULT_PACKAGES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct AdvancedConfig {
    #[facet(default = "qemu:///system")]
    pub libvirt_uri: String,
    #[facet(default = "kvm")]
    pub domain_type: String,
    #[facet(default = "q35")]
    pub machine: String,
    #[facet(default = 4)]
    pub ready_minutes: u32,
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            libvirt_uri: "qemu:///system".into(),
            domain_type: "kvm".into(),
            machine: "q35".into(),
            ready_minutes: 4,
        }
    }
}

impl Config {
    /// Name of the QCOW2 volume holding the VM disk inside the pool.
    pub fn volume_name(&self) -> String {
        format!("{}.qcow2", self.name)
    }

    /// API endpoint hostname, also written to the hosts file.
    pub fn api_hostname(&self) -> String {
        format!("api.{}", self.base_domain)
    }

    pub fn memory_kib(&self) -> Result<u64, NodeboxError> {
        Ok(util::parse_size(&self.resources.memory)? / 1024)
    }

    pub fn libvirt_uri(&self) -> &str {
        &self.advanced.libvirt_uri
    }
}

// ── validation ────────────────────────────────────────────

const MIN_MEMORY_KIB: u64 = 1024 * 1024;

fn validate_config(config: &Config) -> Result<(), NodeboxError> {
    validate_name("name", &config.name)?;
    validate_name("network.name", &config.network.name)?;
    validate_name("storage.pool", &config.storage.pool)?;

    if config.base_domain.trim().is_empty() {
        return Err(NodeboxError::Validation {
            message: "base_domain must not be empty".into(),
        });
    }
    if config.image.path.trim().is_empty() {
        return Err(NodeboxError::Validation {
            message: "image.path must not be empty".into(),
        });
    }
    if config.resources.cpus < 1 {
        return Err(NodeboxError::Validation {
            message: "cpus must be at least 1".into(),
        });
    }
    if config.memory_kib()? < MIN_MEMORY_KIB {
        return Err(NodeboxError::Validation {
            message: format!("memory must be at least 1G (got '{}')", config.resources.memory),
        });
    }

    validate_network(&config.network)
}

fn validate_network(net: &NetworkConfig) -> Result<(), NodeboxError> {
    let gateway = u32::from(parse_ip("network.gateway", &net.gateway)?);
    let mask = u32::from(parse_ip("network.netmask", &net.netmask)?);
    let start = u32::from(parse_ip("network.dhcp_start", &net.dhcp_start)?);
    let end = u32::from(parse_ip("network.dhcp_end", &net.dhcp_end)?);
    let ip = u32::from(parse_ip("network.ip", &net.ip)?);

    // Contiguous high bits only: !mask + 1 must be a power of two.
    if mask == 0 || (!mask).wrapping_add(1) & !mask != 0 {
        return Err(NodeboxError::Validation {
            message: format!("network.netmask is not a valid mask (got '{}')", net.netmask),
        });
    }

    let subnet = gateway & mask;
    for (key, addr) in [("dhcp_start", start), ("dhcp_end", end), ("ip", ip)] {
        if addr & mask != subnet {
            return Err(NodeboxError::Validation {
                message: format!("network.{key} is outside the gateway subnet"),
            });
        }
    }
    if start > end {
        return Err(NodeboxError::Validation {
            message: "network.dhcp_start must not be after network.dhcp_end".into(),
        });
    }
    if net.bridge.is_empty() {
        return Err(NodeboxError::Validation {
            message: "network.bridge must not be empty".into(),
        });
    }

    validate_mac(&net.mac)
}

fn validate_name(key: &str, name: &str) -> Result<(), NodeboxError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            first.is_ascii_alphanumeric()
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        }
        None => false,
    };
    if !valid {
        return Err(NodeboxError::Validation {
            message: format!("{key} must match [a-zA-Z0-9][a-zA-Z0-9._-]* (got '{name}')"),
        });
    }
    Ok(())
}

fn validate_mac(mac: &str) -> Result<(), NodeboxError> {
    let octets: Vec<&str> = mac.split(':').collect();
    let valid = octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
    if !valid {
        return Err(NodeboxError::Validation {
            message: format!("network.mac must be six hex octets (got '{mac}')"),
        });
    }
    Ok(())
}

fn parse_ip(key: &str, value: &str) -> Result<Ipv4Addr, NodeboxError> {
    value.parse().map_err(|_| NodeboxError::Validation {
        message: format!("{key} is not an IPv4 address (got '{value}')"),
    })
}

// ── public API ────────────────────────────────────────────

/// Config plus the directory relative paths resolve against.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub base_dir: PathBuf,
}

impl LoadedConfig {
    /// Disk image path, resolved against the config file's directory.
    pub fn image_path(&self) -> PathBuf {
        let p = Path::new(&self.config.image.path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir.join(p)
        }
    }
}

pub fn parse_config(contents: &str, path: &Path) -> Result<Config, NodeboxError> {
    let config: Config = facet_toml::from_str(contents).map_err(|e| NodeboxError::ConfigParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Load and validate the config file.
///
/// When `required` is false a missing file yields the built-in defaults;
/// an explicitly requested file must exist.
pub fn load_config(path: &Path, required: bool) -> Result<LoadedConfig, NodeboxError> {
    let base_dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    if !required && !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        let config = Config::default();
        validate_config(&config)?;
        return Ok(LoadedConfig { config, base_dir });
    }

    let contents = std::fs::read_to_string(path).map_err(|source| NodeboxError::ConfigLoad {
        path: path.display().to_string(),
        source,
    })?;
    let config = parse_config(&contents, path)?;

    Ok(LoadedConfig { config, base_dir })
}
