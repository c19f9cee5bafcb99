use crate::config::Config;

/// Generate the NAT network definition.
///
/// Besides DHCP, the network's own dnsmasq answers for the API names so the
/// guest and the host overlay resolve them the same way. The VM gets a fixed
/// lease keyed on its MAC.
pub fn generate_network_xml(config: &Config) -> String {
    let net = &config.network;
    let name = &net.name;
    let bridge = &net.bridge;
    let domain = &config.base_domain;
    let vm = &config.name;
    let ip = &net.ip;
    let mac = &net.mac;
    let gateway = &net.gateway;
    let netmask = &net.netmask;
    let start = &net.dhcp_start;
    let end = &net.dhcp_end;

    format!(
        r#"<network>
  <name>{name}</name>
  <forward mode='nat'>
    <nat>
      <port start='1024' end='65535'/>
    </nat>
  </forward>
  <bridge name='{bridge}' stp='on' delay='0'/>
  <domain name='{domain}' localOnly='yes'/>
  <dns>
    <host ip='{ip}'>
      <hostname>api.{domain}</hostname>
      <hostname>api-int.{domain}</hostname>
      <hostname>{vm}.{domain}</hostname>
    </host>
  </dns>
  <ip address='{gateway}' netmask='{netmask}'>
    <dhcp>
      <range start='{start}' end='{end}'/>
      <host mac='{mac}' name='{vm}' ip='{ip}'/>
    </dhcp>
  </ip>
</network>
"#
    )
}
