use crate::error::NodeboxError;
use crate::host::HostCommand;

pub fn active_zones_command() -> HostCommand {
    HostCommand::new("firewall-cmd").arg("--get-active-zones")
}

/// Pick the zone to open from `firewall-cmd --get-active-zones` output.
///
/// Zone names are the unindented lines; the first one listed wins even when
/// several zones are active.
pub fn first_active_zone(output: &str) -> Option<&str> {
    output
        .lines()
        .filter(|line| !line.is_empty() && !line.starts_with(char::is_whitespace))
        .map(str::trim)
        .next()
}

/// One call that admits the VM subnet and opens the port in `zone`.
pub fn open_command(zone: &str, source_cidr: &str, port: &str) -> HostCommand {
    HostCommand::new("firewall-cmd").args([
        format!("--zone={zone}"),
        format!("--add-source={source_cidr}"),
        format!("--add-port={port}"),
    ])
}

pub fn zone_from_output(output: &str) -> Result<String, NodeboxError> {
    first_active_zone(output)
        .map(str::to_string)
        .ok_or(NodeboxError::NoActiveZone)
}
