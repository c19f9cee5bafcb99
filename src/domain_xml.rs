use crate::config::Config;

/// Generate libvirt domain XML from config.
///
/// The root disk is the uploaded pool volume; the single NIC sits on the
/// cluster network with the MAC that owns the static DHCP lease.
pub fn generate_domain_xml(config: &Config, memory_kib: u64) -> String {
    let name = &config.name;
    let cpus = config.resources.cpus;
    let domain_type = &config.advanced.domain_type;
    let machine = &config.advanced.machine;
    let pool = &config.storage.pool;
    let volume = config.volume_name();
    let network = &config.network.name;
    let mac = &config.network.mac;

    format!(
        r#"<domain type='{domain_type}'>
  <name>{name}</name>
  <memory unit='KiB'>{memory_kib}</memory>
  <vcpu>{cpus}</vcpu>
  <os>
    <type arch='x86_64' machine='{machine}'>hvm</type>
    <boot dev='hd'/>
  </os>
  <features>
    <acpi/>
    <apic/>
  </features>
  <cpu mode='host-passthrough'/>
  <clock offset='utc'/>
  <on_poweroff>destroy</on_poweroff>
  <on_reboot>restart</on_reboot>
  <devices>
    <disk type='volume' device='disk'>
      <driver name='qemu' type='qcow2' cache='none'/>
      <source pool='{pool}' volume='{volume}'/>
      <target dev='vda' bus='virtio'/>
    </disk>
    <interface type='network'>
      <mac address='{mac}'/>
      <source network='{network}'/>
      <model type='virtio'/>
    </interface>
    <serial type='pty'>
      <target port='0'/>
    </serial>
    <console type='pty'>
      <target type='serial' port='0'/>
    </console>
    <rng model='virtio'>
      <backend model='random'>/dev/urandom</backend>
    </rng>
  </devices>
</domain>
"#
    )
}
