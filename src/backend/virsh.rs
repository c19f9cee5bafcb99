use std::path::Path;

use crate::config::{Config, LoadedConfig};
use crate::error::NodeboxError;
use crate::host::{Host, HostCommand};
use crate::paths::HostPaths;
use crate::progress::{OutputMode, StepProgress};
use crate::{dns, domain_xml, firewall, network_xml, pool_xml, preflight, qcow2};

const CREATE_STEPS: usize = 11;
const DELETE_STEPS: usize = 4;

/// Lifecycle backend driving `virsh` and the host configuration tools.
pub struct VirshBackend<H> {
    host: H,
    paths: HostPaths,
    mode: OutputMode,
}

impl<H: Host> VirshBackend<H> {
    pub fn new(host: H, paths: HostPaths, mode: OutputMode) -> Self {
        Self { host, paths, mode }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    fn virsh(&self, config: &Config) -> HostCommand {
        HostCommand::new("virsh").args(["-c", config.libvirt_uri()])
    }

    async fn check_prerequisites(&self) -> Result<(), NodeboxError> {
        preflight::check_virtualization(&self.paths.cpuinfo).await?;
        preflight::check_firewall(&self.host).await
    }

    async fn install_packages(&self, config: &Config) -> Result<(), NodeboxError> {
        let cmd = HostCommand::new(config.host.package_manager.as_str())
            .args(["install", "-y"])
            .args(config.host.packages());
        self.host.run(&cmd).await
    }

    async fn enable_ip_forwarding(&self) -> Result<(), NodeboxError> {
        self.host
            .run(&HostCommand::new("sysctl").args(["-w", "net.ipv4.ip_forward=1"]))
            .await
    }

    async fn open_firewall(&self, config: &Config) -> Result<(), NodeboxError> {
        let cidr = config.network.cidr()?;
        let zones = self.host.output(&firewall::active_zones_command()).await?;
        let zone = firewall::zone_from_output(&zones)?;
        tracing::info!(zone = %zone, source = %cidr, "opening firewall zone");
        self.host
            .run(&firewall::open_command(&zone, &cidr, &config.host.firewall_port))
            .await
    }

    async fn create_pool(&self, config: &Config) -> Result<(), NodeboxError> {
        let pool = config.storage.pool.as_str();
        let xml_path = self.paths.pool_xml();
        write_xml(&xml_path, &pool_xml::generate_pool_xml(&config.storage)).await?;

        self.host
            .run(&self.virsh(config).arg("pool-define").arg(path_arg(&xml_path)))
            .await?;
        self.host
            .run(&self.virsh(config).args(["pool-start", pool]))
            .await?;
        self.host
            .run(&self.virsh(config).args(["pool-autostart", pool]))
            .await
    }

    async fn configure_dns(&self, config: &Config) -> Result<(), NodeboxError> {
        if dns::ensure_overlays(config, &self.paths).await? {
            self.host
                .run(&HostCommand::new("systemctl").args(["restart", "NetworkManager"]))
                .await?;
        } else {
            tracing::debug!("DNS overlays unchanged, not restarting NetworkManager");
        }
        Ok(())
    }

    async fn define_network(&self, config: &Config) -> Result<(), NodeboxError> {
        let xml_path = self.paths.network_xml();
        write_xml(&xml_path, &network_xml::generate_network_xml(config)).await?;

        self.host
            .run(&self.virsh(config).arg("net-define").arg(path_arg(&xml_path)))
            .await?;
        self.host
            .run(&self.virsh(config).args(["net-start", config.network.name.as_str()]))
            .await
    }

    async fn upload_volume(
        &self,
        config: &Config,
        image: &Path,
        capacity: u64,
    ) -> Result<(), NodeboxError> {
        let pool = config.storage.pool.as_str();
        let volume = config.volume_name();

        self.host
            .run(
                &self
                    .virsh(config)
                    .args(["vol-create-as", pool, volume.as_str()])
                    .arg(capacity.to_string())
                    .args(["--format", "qcow2"]),
            )
            .await?;
        self.host
            .run(
                &self
                    .virsh(config)
                    .args(["vol-upload", "--pool", pool, volume.as_str()])
                    .arg(path_arg(image)),
            )
            .await
    }

    async fn define_domain(&self, config: &Config, memory_kib: u64) -> Result<(), NodeboxError> {
        let xml_path = self.paths.domain_xml();
        write_xml(&xml_path, &domain_xml::generate_domain_xml(config, memory_kib)).await?;

        self.host
            .run(&self.virsh(config).arg("define").arg(path_arg(&xml_path)))
            .await
    }
}

impl<H: Host> super::Backend for VirshBackend<H> {
    async fn create(&self, loaded: &LoadedConfig) -> Result<(), NodeboxError> {
        let config = &loaded.config;
        let name = config.name.as_str();
        let image = loaded.image_path();
        let memory_kib = config.memory_kib()?;
        let mut progress = StepProgress::new(CREATE_STEPS, self.mode);

        progress
            .run("Checking host prerequisites", self.check_prerequisites())
            .await?;
        let info = progress
            .run("Inspecting disk image", qcow2::inspect(&image))
            .await?;

        progress
            .run("Installing host packages", self.install_packages(config))
            .await?;
        progress
            .run("Enabling IP forwarding", self.enable_ip_forwarding())
            .await?;
        progress
            .run("Opening firewall", self.open_firewall(config))
            .await?;

        let pool = config.storage.pool.as_str();
        let pool_present = self
            .host
            .probe(&self.virsh(config).args(["pool-info", pool]))
            .await?;
        if pool_present {
            progress.skip(&format!("Storage pool '{pool}' already present"));
        } else {
            progress
                .run(
                    &format!("Creating storage pool '{pool}'"),
                    self.create_pool(config),
                )
                .await?;
        }

        progress
            .run("Configuring host DNS", self.configure_dns(config))
            .await?;
        progress
            .run(
                "Adding hosts entry",
                dns::ensure_hosts_entry(config, &self.paths.hosts_file),
            )
            .await?;
        progress
            .run(
                &format!("Defining network '{}'", config.network.name),
                self.define_network(config),
            )
            .await?;
        progress
            .run(
                "Uploading disk image",
                self.upload_volume(config, &image, info.file_size),
            )
            .await?;
        progress
            .run(&format!("Defining VM '{name}'"), self.define_domain(config, memory_kib))
            .await?;

        tracing::info!(name, "VM created");
        progress.println(&format!("VM '{name}' created. Run `nodebox start` to boot it."));
        Ok(())
    }

    async fn start(&self, loaded: &LoadedConfig) -> Result<(), NodeboxError> {
        let config = &loaded.config;
        let name = config.name.as_str();
        let mut progress = StepProgress::new(1, self.mode);

        progress
            .run(
                &format!("Starting VM '{name}'"),
                self.host.run(&self.virsh(config).args(["start", name])),
            )
            .await?;

        tracing::info!(name, "VM started");
        progress.println(&format!(
            "VM '{name}' started. {} should answer in about {} minutes.",
            config.api_hostname(),
            config.advanced.ready_minutes
        ));
        Ok(())
    }

    async fn stop(&self, loaded: &LoadedConfig) -> Result<(), NodeboxError> {
        let config = &loaded.config;
        let name = config.name.as_str();
        let mut progress = StepProgress::new(1, self.mode);

        tracing::info!(name, "sending ACPI shutdown");
        progress
            .run(
                &format!("Requesting shutdown of VM '{name}'"),
                self.host.run(&self.virsh(config).args(["shutdown", name])),
            )
            .await?;

        progress.println(&format!("Shutdown requested for VM '{name}'."));
        Ok(())
    }

    async fn delete(&self, loaded: &LoadedConfig) -> Result<(), NodeboxError> {
        let config = &loaded.config;
        let name = config.name.as_str();
        let pool = config.storage.pool.as_str();
        let volume = config.volume_name();
        let network = config.network.name.as_str();
        let mut progress = StepProgress::new(DELETE_STEPS, self.mode);

        let state = self
            .host
            .output(&self.virsh(config).args(["domstate", name]))
            .await?;
        if state.trim() == "shut off" {
            progress.skip(&format!("VM '{name}' already stopped"));
        } else {
            tracing::info!(name, state = state.trim(), "force stopping VM");
            progress
                .run(
                    &format!("Force stopping VM '{name}'"),
                    self.host.run(&self.virsh(config).args(["destroy", name])),
                )
                .await?;
        }

        progress
            .run(
                &format!("Undefining VM '{name}'"),
                self.host.run(&self.virsh(config).args(["undefine", name])),
            )
            .await?;
        progress
            .run(
                &format!("Deleting volume '{volume}'"),
                self.host.run(
                    &self
                        .virsh(config)
                        .args(["vol-delete", "--pool", pool, volume.as_str()]),
                ),
            )
            .await?;
        progress
            .run(&format!("Removing network '{network}'"), async {
                self.host
                    .run(&self.virsh(config).args(["net-destroy", network]))
                    .await?;
                self.host
                    .run(&self.virsh(config).args(["net-undefine", network]))
                    .await
            })
            .await?;

        tracing::info!(name, "VM deleted");
        progress.println(&format!("VM '{name}' deleted."));
        Ok(())
    }

    async fn status(&self, loaded: &LoadedConfig) -> Result<(), NodeboxError> {
        let config = &loaded.config;
        let name = config.name.as_str();

        if !self
            .host
            .probe(&self.virsh(config).args(["dominfo", name]))
            .await?
        {
            println!("VM '{name}': not defined");
            return Ok(());
        }

        let state = self
            .host
            .output(&self.virsh(config).args(["domstate", name]))
            .await?;
        println!("VM '{name}': {}", state.trim());
        Ok(())
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

async fn write_xml(path: &Path, xml: &str) -> Result<(), NodeboxError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| NodeboxError::Io {
                context: format!("creating directory {}", parent.display()),
                source: e,
            })?;
    }
    tokio::fs::write(path, xml)
        .await
        .map_err(|e| NodeboxError::Io {
            context: format!("saving XML to {}", path.display()),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::*;
    use crate::backend::Backend;
    use crate::dns::NM_OVERLAY;
    use crate::host::testing::RecordingHost;
    use crate::qcow2::tests::fake_image;

    const IMAGE_LEN: usize = 4096;

    struct Fixture {
        _dir: TempDir,
        paths: HostPaths,
        loaded: LoadedConfig,
    }

    fn fixture(cpu_flags: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let paths = HostPaths::under(dir.path());
        std::fs::write(
            &paths.cpuinfo,
            format!("processor\t: 0\nflags\t\t: {cpu_flags}\n"),
        )
        .unwrap();
        std::fs::write(&paths.hosts_file, "127.0.0.1 localhost\n").unwrap();
        std::fs::write(
            dir.path().join("nodebox.qcow2"),
            fake_image(20 << 30, IMAGE_LEN - 72),
        )
        .unwrap();
        let loaded = LoadedConfig {
            config: Config::default(),
            base_dir: dir.path().to_path_buf(),
        };
        Fixture {
            _dir: dir,
            paths,
            loaded,
        }
    }

    fn ready_host() -> RecordingHost {
        RecordingHost::new().with_output(
            "--get-active-zones",
            "libvirt\n  interfaces: virbr0\npublic\n  interfaces: eth0\n",
        )
    }

    fn backend(host: RecordingHost, fx: &Fixture) -> VirshBackend<RecordingHost> {
        VirshBackend::new(host, fx.paths.clone(), OutputMode::Silent)
    }

    fn assert_in_order(host: &RecordingHost, patterns: &[&str]) {
        let mut last = None;
        for p in patterns {
            assert_eq!(host.count(p), 1, "expected exactly one `{p}` in {:#?}", host.calls());
            let pos = host.position(p);
            assert!(pos > last, "`{p}` out of order in {:#?}", host.calls());
            last = pos;
        }
    }

    #[tokio::test]
    async fn create_runs_steps_in_order() {
        let fx = fixture("fpu vmx sse2");
        let host = ready_host().with_probe("pool-info default", false);
        let backend = backend(host, &fx);

        backend.create(&fx.loaded).await.unwrap();

        let volume = format!("vol-create-as default nodebox.qcow2 {IMAGE_LEN} --format qcow2");
        assert_in_order(
            backend.host(),
            &[
                "dnf install -y libvirt libvirt-daemon-kvm qemu-kvm NetworkManager",
                "sysctl -w net.ipv4.ip_forward=1",
                "firewall-cmd --zone=libvirt --add-source=192.168.130.0/24 --add-port=16509/tcp",
                "pool-define",
                "pool-start default",
                "pool-autostart default",
                "net-define",
                "net-start nodebox",
                &volume,
                "vol-upload --pool default nodebox.qcow2",
                "qemu:///system define ",
            ],
        );
        assert!(fx.paths.domain_xml().exists());
        assert!(fx.paths.network_xml().exists());
    }

    #[tokio::test]
    async fn create_keeps_existing_pool() {
        let fx = fixture("svm");
        let backend = backend(ready_host(), &fx);

        backend.create(&fx.loaded).await.unwrap();

        assert_eq!(backend.host().count("pool-info default"), 1);
        assert_eq!(backend.host().count("pool-define"), 0);
        assert_eq!(backend.host().count("pool-start"), 0);
    }

    #[tokio::test]
    async fn create_without_virtualization_touches_nothing() {
        let fx = fixture("fpu sse2");
        let backend = backend(ready_host(), &fx);

        let err = backend.create(&fx.loaded).await.unwrap_err();

        assert!(matches!(err, NodeboxError::VirtualizationUnsupported { .. }));
        assert_eq!(err.exit_code(), 1);
        assert!(backend.host().calls().is_empty());
        assert!(!fx.paths.nm_overlay("nodebox").exists());
    }

    #[tokio::test]
    async fn create_with_inactive_firewall_defines_nothing() {
        let fx = fixture("vmx");
        let host = ready_host().with_probe("firewall-cmd --state", false);
        let backend = backend(host, &fx);

        let err = backend.create(&fx.loaded).await.unwrap_err();

        assert!(matches!(err, NodeboxError::FirewallInactive));
        assert_eq!(err.exit_code(), 1);
        assert_eq!(backend.host().calls(), vec!["firewall-cmd --state".to_string()]);
    }

    #[tokio::test]
    async fn create_rejects_non_qcow2_image_before_installing() {
        let fx = fixture("vmx");
        std::fs::write(fx.loaded.image_path(), vec![0u8; 1024]).unwrap();
        let backend = backend(ready_host(), &fx);

        let err = backend.create(&fx.loaded).await.unwrap_err();

        assert!(matches!(err, NodeboxError::InvalidImage { .. }));
        assert_eq!(backend.host().count("install"), 0);
    }

    #[tokio::test]
    async fn create_leaves_existing_dns_overlays_alone() {
        let fx = fixture("vmx");
        let nm = fx.paths.nm_overlay("nodebox");
        let dnsmasq = fx.paths.dnsmasq_overlay("nodebox");
        std::fs::create_dir_all(&fx.paths.nm_conf_dir).unwrap();
        std::fs::create_dir_all(&fx.paths.dnsmasq_dir).unwrap();
        std::fs::write(&nm, "# keep me\n").unwrap();
        std::fs::write(&dnsmasq, "# keep me too\n").unwrap();
        let backend = backend(ready_host(), &fx);

        backend.create(&fx.loaded).await.unwrap();

        assert_eq!(std::fs::read_to_string(&nm).unwrap(), "# keep me\n");
        assert_eq!(std::fs::read_to_string(&dnsmasq).unwrap(), "# keep me too\n");
        assert_eq!(backend.host().count("restart NetworkManager"), 0);
    }

    #[tokio::test]
    async fn create_writes_dns_overlays_and_restarts_once() {
        let fx = fixture("vmx");
        let backend = backend(ready_host(), &fx);

        backend.create(&fx.loaded).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(fx.paths.nm_overlay("nodebox")).unwrap(),
            NM_OVERLAY
        );
        assert!(fx.paths.dnsmasq_overlay("nodebox").exists());
        assert_eq!(backend.host().count("systemctl restart NetworkManager"), 1);
        assert_eq!(
            std::fs::read_to_string(&fx.paths.hosts_file).unwrap(),
            "127.0.0.1 localhost\n192.168.130.11 api.nodebox.testing\n"
        );
    }

    #[tokio::test]
    async fn create_aborts_on_first_failing_command() {
        let fx = fixture("vmx");
        let host = ready_host().with_failure("net-define", 5);
        let backend = backend(host, &fx);

        let err = backend.create(&fx.loaded).await.unwrap_err();

        assert_eq!(err.exit_code(), 5);
        assert_eq!(backend.host().count("net-start"), 0);
        assert_eq!(backend.host().count("vol-create-as"), 0);
        assert_eq!(backend.host().count("qemu:///system define "), 0);
    }

    #[tokio::test]
    async fn delete_then_create_redefines_network_and_volume() {
        let fx = fixture("vmx");
        let host = ready_host().with_output("domstate", "running\n");
        let backend = backend(host, &fx);

        backend.delete(&fx.loaded).await.unwrap();
        backend.create(&fx.loaded).await.unwrap();

        let host = backend.host();
        assert!(host.position("net-define") > host.position("net-undefine nodebox"));
        assert!(host.position("vol-create-as") > host.position("vol-delete"));
        assert_eq!(host.count("net-define"), 1);
        assert_eq!(host.count("vol-create-as"), 1);
    }

    #[tokio::test]
    async fn delete_force_stops_running_vm() {
        let fx = fixture("vmx");
        let host = RecordingHost::new().with_output("domstate", "running\n");
        let backend = backend(host, &fx);

        backend.delete(&fx.loaded).await.unwrap();

        assert_in_order(
            backend.host(),
            &[
                "domstate nodebox",
                "qemu:///system destroy nodebox",
                "qemu:///system undefine nodebox",
                "vol-delete --pool default nodebox.qcow2",
                "net-destroy nodebox",
                "net-undefine nodebox",
            ],
        );
    }

    #[tokio::test]
    async fn delete_skips_destroy_when_shut_off() {
        let fx = fixture("vmx");
        let host = RecordingHost::new().with_output("domstate", "shut off\n");
        let backend = backend(host, &fx);

        backend.delete(&fx.loaded).await.unwrap();

        assert_eq!(backend.host().count("qemu:///system destroy "), 0);
        assert_eq!(backend.host().count("qemu:///system undefine nodebox"), 1);
    }

    #[tokio::test]
    async fn start_and_stop_issue_single_commands() {
        let fx = fixture("vmx");
        let backend = backend(RecordingHost::new(), &fx);

        backend.start(&fx.loaded).await.unwrap();
        backend.stop(&fx.loaded).await.unwrap();

        assert_eq!(
            backend.host().calls(),
            vec![
                "virsh -c qemu:///system start nodebox".to_string(),
                "virsh -c qemu:///system shutdown nodebox".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn start_failure_propagates_code() {
        let fx = fixture("vmx");
        let host = RecordingHost::new().with_failure("start nodebox", 1);
        let backend = backend(host, &fx);

        let err = backend.start(&fx.loaded).await.unwrap_err();
        assert!(matches!(err, NodeboxError::CommandFailed { code: Some(1), .. }));
    }

    #[tokio::test]
    async fn status_of_undefined_vm() {
        let fx = fixture("vmx");
        let host = RecordingHost::new().with_probe("dominfo", false);
        let backend = backend(host, &fx);

        backend.status(&fx.loaded).await.unwrap();
        assert_eq!(backend.host().count("domstate"), 0);
    }

    #[tokio::test]
    async fn uses_configured_libvirt_uri() {
        let mut fx = fixture("vmx");
        fx.loaded.config.advanced.libvirt_uri = "qemu+ssh://lab/system".into();
        let backend = backend(RecordingHost::new(), &fx);

        backend.start(&fx.loaded).await.unwrap();
        assert_eq!(
            backend.host().calls(),
            vec!["virsh -c qemu+ssh://lab/system start nodebox".to_string()]
        );
    }

    #[test]
    fn path_arg_is_display_form() {
        assert_eq!(path_arg(&PathBuf::from("/tmp/a b.xml")), "/tmp/a b.xml");
    }
}
