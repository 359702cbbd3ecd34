//! OpenVSwitch renderer
//!
//! OVS constructs cannot be described to networkd or NetworkManager as
//! files; instead each OVS-backed definition gets a oneshot systemd unit
//! invoking ovs-vsctl, ordered after its dependencies. A single global
//! unit applies the `open_vswitch` table settings.

use super::{Artifacts, Renderer, remove_matching};
use crate::NetplanError;
use crate::names::{Backend, DefType};
use crate::state::State;
use crate::types::ovs::{OVS_BOND_MODES, is_valid_controller_target};
use crate::types::{NetDef, OvsSettings};
use crate::util::systemd_escape;
use std::fmt::Write;
use std::path::Path;

const SYSTEM_DIR: &str = "run/systemd/system";
const WANTS_DIR: &str = "run/systemd/system/systemd-networkd.service.wants";
const OVSCTL: &str = "/usr/bin/ovs-vsctl";

/// OpenVSwitch renderer
pub struct OvsRenderer;

impl Renderer for OvsRenderer {
    fn render(&self, state: &State) -> Result<Artifacts, NetplanError> {
        let mut artifacts = Artifacts::default();
        for def in state.iter_netdefs() {
            if def.backend != Backend::OpenVSwitch {
                continue;
            }
            artifacts.extend(render_netdef(state, def)?);
        }
        artifacts.extend(render_finish(state)?);
        Ok(artifacts)
    }

    fn backend(&self) -> Backend {
        Backend::OpenVSwitch
    }

    fn cleanup(&self, rootdir: &Path) -> Result<(), NetplanError> {
        remove_matching(rootdir, SYSTEM_DIR, "netplan-ovs-", ".service")?;
        remove_matching(
            rootdir,
            "run/systemd/system/systemd-networkd.service.wants",
            "netplan-ovs-",
            ".service",
        )?;
        Ok(())
    }
}

/// Render the systemd unit for one OVS-backed definition.
pub fn render_netdef(state: &State, def: &NetDef) -> Result<Artifacts, NetplanError> {
    validate_ovs(state, def)?;

    let start = start_commands(def);
    if start.is_empty() {
        // Nothing to configure (e.g. a bond member, set up by the bond)
        return Ok(Artifacts::default());
    }

    let mut unit = String::new();
    writeln!(unit, "[Unit]").unwrap();
    writeln!(unit, "Description=OpenVSwitch configuration for {}", def.id).unwrap();
    writeln!(unit, "DefaultDependencies=no").unwrap();
    writeln!(unit, "Wants=ovsdb-server.service").unwrap();
    writeln!(unit, "After=ovsdb-server.service").unwrap();
    if def.is_physical() {
        let device = format!("sys-subsystem-net-devices-{}.device", systemd_escape(&def.id));
        writeln!(unit, "Requires={}", device).unwrap();
        writeln!(unit, "After={}", device).unwrap();
    }
    for dep in ovs_dependencies(def) {
        let dep_unit = format!("netplan-ovs-{}.service", systemd_escape(&dep));
        writeln!(unit, "Requires={}", dep_unit).unwrap();
        writeln!(unit, "After={}", dep_unit).unwrap();
    }
    writeln!(unit, "Before=network.target").unwrap();
    writeln!(unit, "Wants=network.target").unwrap();
    writeln!(unit).unwrap();
    writeln!(unit, "[Service]").unwrap();
    writeln!(unit, "Type=oneshot").unwrap();

    for command in start {
        writeln!(unit, "ExecStart={OVSCTL} {}", command).unwrap();
    }
    for command in stop_commands(def) {
        writeln!(unit, "ExecStop={OVSCTL} {}", command).unwrap();
    }

    let unit_name = format!("netplan-ovs-{}.service", systemd_escape(&def.id));
    let mut artifacts = Artifacts::default();
    artifacts.push_file(format!("{SYSTEM_DIR}/{unit_name}"), unit, 0o640);
    artifacts.push_symlink(format!("{WANTS_DIR}/{unit_name}"), format!("../{unit_name}"));
    Ok(artifacts)
}

/// Other OVS definitions this one must be created after.
fn ovs_dependencies(def: &NetDef) -> Vec<String> {
    let mut deps = Vec::new();
    if let Some(bridge) = &def.bridge {
        deps.push(bridge.clone());
    }
    if let Some(bond) = &def.bond {
        deps.push(bond.clone());
    }
    deps
}

fn validate_ovs(state: &State, def: &NetDef) -> Result<(), NetplanError> {
    match def.def_type() {
        DefType::Bond => {
            let parent_is_ovs_bridge = def
                .bridge
                .as_deref()
                .and_then(|id| state.get_netdef(id))
                .is_some_and(|b| {
                    b.def_type() == DefType::Bridge && b.backend == Backend::OpenVSwitch
                });
            if !parent_is_ovs_bridge {
                return Err(NetplanError::validation(
                    &def.id,
                    "OVS bond must be a member of an OVS bridge",
                ));
            }
            if def.interfaces.len() < 2 {
                return Err(NetplanError::validation(
                    &def.id,
                    "OVS bond needs at least two member interfaces",
                ));
            }
            if let Some(mode) = def.bond_params.as_ref().and_then(|p| p.mode.as_deref()) {
                if !OVS_BOND_MODES.contains(&mode) {
                    return Err(NetplanError::validation(
                        &def.id,
                        format!(
                            "bond mode '{mode}' is not supported by OVS \
                             (expected one of {})",
                            OVS_BOND_MODES.join(", ")
                        ),
                    ));
                }
            }
        }
        DefType::Port => {
            if def.bridge.is_none() && def.bond.is_none() {
                return Err(NetplanError::validation(
                    &def.id,
                    "OVS patch port must be a member of a bridge or bond",
                ));
            }
        }
        _ => {}
    }

    if let Some(controller) = def
        .openvswitch
        .as_ref()
        .and_then(|ovs| ovs.controller.as_ref())
    {
        for target in &controller.addresses {
            if !is_valid_controller_target(target) {
                return Err(NetplanError::validation(
                    &def.id,
                    format!("invalid OVS controller target '{target}'"),
                ));
            }
            if target.starts_with("ssl:") || target.starts_with("pssl:") {
                let ssl_ready = state
                    .global_ovs()
                    .ssl
                    .as_ref()
                    .is_some_and(|ssl| ssl.is_complete());
                if !ssl_ready {
                    return Err(NetplanError::validation(
                        &def.id,
                        "SSL controller targets need global openvswitch.ssl settings",
                    ));
                }
            }
        }
    }
    Ok(())
}

fn start_commands(def: &NetDef) -> Vec<String> {
    let mut commands = Vec::new();
    let ovs = def.openvswitch.clone().unwrap_or_default();

    match def.def_type() {
        DefType::Bridge => {
            commands.push(format!("--may-exist add-br {}", def.id));
            if let Some(mode) = &ovs.fail_mode {
                commands.push(format!("set-fail-mode {} {}", def.id, mode));
            }
            if let Some(snooping) = ovs.mcast_snooping {
                commands.push(format!(
                    "set Bridge {} mcast_snooping_enable={}",
                    def.id, snooping
                ));
            }
            if let Some(rstp) = ovs.rstp {
                commands.push(format!("set Bridge {} rstp_enable={}", def.id, rstp));
            }
            if !ovs.protocols.is_empty() {
                commands.push(format!(
                    "set Bridge {} protocols={}",
                    def.id,
                    ovs.protocols.join(",")
                ));
            }
            if let Some(controller) = &ovs.controller {
                if !controller.addresses.is_empty() {
                    commands.push(format!(
                        "set-controller {} {}",
                        def.id,
                        controller.addresses.join(" ")
                    ));
                }
                if let Some(mode) = &controller.connection_mode {
                    commands.push(format!(
                        "set Controller {} connection-mode={}",
                        def.id, mode
                    ));
                }
            }
            set_table_entries(&mut commands, "Bridge", &def.id, &ovs);
        }
        DefType::Bond => {
            let bridge = def.bridge.as_deref().unwrap_or_default();
            commands.push(format!(
                "--may-exist add-bond {} {} {}",
                bridge,
                def.id,
                def.interfaces.join(" ")
            ));
            if let Some(lacp) = &ovs.lacp {
                commands.push(format!("set Port {} lacp={}", def.id, lacp));
            }
            if let Some(mode) = def.bond_params.as_ref().and_then(|p| p.mode.as_deref()) {
                commands.push(format!("set Port {} bond_mode={}", def.id, mode));
            }
            set_table_entries(&mut commands, "Port", &def.id, &ovs);
        }
        DefType::Port => {
            let parent = def
                .bridge
                .as_deref()
                .or(def.bond.as_deref())
                .unwrap_or_default();
            commands.push(format!(
                "--may-exist add-port {} {} -- set Interface {} type=patch options:peer={}",
                parent,
                def.id,
                def.id,
                def.peer.as_deref().unwrap_or_default()
            ));
            set_table_entries(&mut commands, "Port", &def.id, &ovs);
        }
        // A physical interface plugged into an OVS bridge; bond members
        // are set up by the bond's add-bond instead
        _ => {
            if let Some(bridge) = &def.bridge {
                commands.push(format!("--may-exist add-port {} {}", bridge, def.id));
                set_table_entries(&mut commands, "Port", &def.id, &ovs);
            }
        }
    }
    commands
}

fn set_table_entries(commands: &mut Vec<String>, table: &str, id: &str, ovs: &OvsSettings) {
    for (key, value) in &ovs.external_ids {
        commands.push(format!("set {} {} external-ids:{}={}", table, id, key, value));
    }
    for (key, value) in &ovs.other_config {
        commands.push(format!("set {} {} other-config:{}={}", table, id, key, value));
    }
}

fn stop_commands(def: &NetDef) -> Vec<String> {
    match def.def_type() {
        DefType::Bridge => vec![format!("del-br {}", def.id)],
        _ => match def.bridge.as_deref() {
            Some(bridge) => vec![format!("del-port {} {}", bridge, def.id)],
            None => Vec::new(),
        },
    }
}

/// Global finalization unit applying `open_vswitch` table settings and the
/// SSL configuration.
pub fn render_finish(state: &State) -> Result<Artifacts, NetplanError> {
    let mut artifacts = Artifacts::default();
    let globals = state.global_ovs();
    if !globals.is_nondefault() {
        return Ok(artifacts);
    }

    let mut commands: Vec<String> = Vec::new();
    for (key, value) in &globals.external_ids {
        commands.push(format!("set open_vswitch . external-ids:{}={}", key, value));
    }
    for (key, value) in &globals.other_config {
        commands.push(format!("set open_vswitch . other-config:{}={}", key, value));
    }
    if !globals.protocols.is_empty() {
        for bridge in state.netdefs_by_type(DefType::Bridge) {
            if bridge.backend == Backend::OpenVSwitch && bridge.openvswitch.as_ref().is_none_or(|o| o.protocols.is_empty()) {
                commands.push(format!(
                    "set Bridge {} protocols={}",
                    bridge.id,
                    globals.protocols.join(",")
                ));
            }
        }
    }
    if let Some(ssl) = &globals.ssl {
        if ssl.is_complete() {
            commands.push(format!(
                "set-ssl {} {} {}",
                ssl.private_key.as_deref().unwrap_or_default(),
                ssl.certificate.as_deref().unwrap_or_default(),
                ssl.ca_cert.as_deref().unwrap_or_default()
            ));
        }
    }
    if commands.is_empty() {
        return Ok(artifacts);
    }

    let mut unit = String::new();
    writeln!(unit, "[Unit]").unwrap();
    writeln!(unit, "Description=OpenVSwitch global configuration").unwrap();
    writeln!(unit, "DefaultDependencies=no").unwrap();
    writeln!(unit, "Wants=ovsdb-server.service").unwrap();
    writeln!(unit, "After=ovsdb-server.service").unwrap();
    writeln!(unit, "Before=network.target").unwrap();
    writeln!(unit, "Wants=network.target").unwrap();
    writeln!(unit).unwrap();
    writeln!(unit, "[Service]").unwrap();
    writeln!(unit, "Type=oneshot").unwrap();
    for command in commands {
        writeln!(unit, "ExecStart={OVSCTL} {}", command).unwrap();
    }

    artifacts.push_file(
        format!("{SYSTEM_DIR}/netplan-ovs-global.service"),
        unit,
        0o640,
    );
    artifacts.push_symlink(
        format!("{WANTS_DIR}/netplan-ovs-global.service"),
        "../netplan-ovs-global.service",
    );
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn state_of(yaml: &str) -> State {
        let mut parser = Parser::new();
        parser.load_yaml_from_str("test.yaml", yaml).unwrap();
        State::import(parser).unwrap()
    }

    fn render_all(yaml: &str) -> Artifacts {
        OvsRenderer.render(&state_of(yaml)).unwrap()
    }

    fn file_content<'a>(artifacts: &'a Artifacts, suffix: &str) -> &'a str {
        &artifacts
            .files
            .iter()
            .find(|f| f.path.to_str().unwrap().ends_with(suffix))
            .unwrap_or_else(|| panic!("no file ending in {suffix}"))
            .content
    }

    #[test]
    fn test_bridge_unit() {
        let artifacts = render_all(
            r#"
network:
  version: 2
  bridges:
    br0:
      openvswitch:
        fail-mode: secure
        external-ids: {iface-id: myhost}
      dhcp4: true
"#,
        );
        let unit = file_content(&artifacts, "netplan-ovs-br0.service");
        assert!(unit.contains("ExecStart=/usr/bin/ovs-vsctl --may-exist add-br br0"));
        assert!(unit.contains("ExecStart=/usr/bin/ovs-vsctl set-fail-mode br0 secure"));
        assert!(
            unit.contains("ExecStart=/usr/bin/ovs-vsctl set Bridge br0 external-ids:iface-id=myhost")
        );
        assert!(unit.contains("ExecStop=/usr/bin/ovs-vsctl del-br br0"));
        assert!(unit.contains("Before=network.target"));
        assert!(unit.contains("DefaultDependencies=no"));
    }

    #[test]
    fn test_member_unit_orders_after_bridge() {
        let artifacts = render_all(
            r#"
network:
  version: 2
  ethernets:
    eth0:
      openvswitch: {}
  bridges:
    br0:
      openvswitch: {}
      interfaces: [eth0]
      dhcp4: true
"#,
        );
        let unit = file_content(&artifacts, "netplan-ovs-eth0.service");
        assert!(unit.contains("Requires=netplan-ovs-br0.service"));
        assert!(unit.contains("After=netplan-ovs-br0.service"));
        assert!(unit.contains("Requires=sys-subsystem-net-devices-eth0.device"));
        assert!(unit.contains("ExecStart=/usr/bin/ovs-vsctl --may-exist add-port br0 eth0"));
        assert!(unit.contains("ExecStop=/usr/bin/ovs-vsctl del-port br0 eth0"));
    }

    #[test]
    fn test_bond_unit_and_validation() {
        let artifacts = render_all(
            r#"
network:
  version: 2
  ethernets:
    eth0: {openvswitch: {}}
    eth1: {openvswitch: {}}
  bonds:
    bond0:
      openvswitch: {lacp: active}
      interfaces: [eth0, eth1]
      parameters: {mode: balance-tcp}
  bridges:
    br0:
      openvswitch: {}
      interfaces: [bond0]
      dhcp4: true
"#,
        );
        let unit = file_content(&artifacts, "netplan-ovs-bond0.service");
        assert!(unit.contains("add-bond br0 bond0 eth0 eth1"));
        assert!(unit.contains("set Port bond0 lacp=active"));
        assert!(unit.contains("set Port bond0 bond_mode=balance-tcp"));
    }

    #[test]
    fn test_bond_without_bridge_rejected() {
        let state = state_of(
            r#"
network:
  version: 2
  ethernets:
    eth0: {openvswitch: {}}
    eth1: {openvswitch: {}}
  bonds:
    bond0:
      openvswitch: {}
      interfaces: [eth0, eth1]
"#,
        );
        let def = state.get_netdef("bond0").unwrap();
        let err = render_netdef(&state, def).unwrap_err();
        assert!(err.to_string().contains("OVS bridge"));
    }

    #[test]
    fn test_bad_bond_mode_rejected() {
        let state = state_of(
            r#"
network:
  version: 2
  ethernets:
    eth0: {openvswitch: {}}
    eth1: {openvswitch: {}}
  bonds:
    bond0:
      openvswitch: {}
      interfaces: [eth0, eth1]
      parameters: {mode: balance-rr}
  bridges:
    br0:
      openvswitch: {}
      interfaces: [bond0]
"#,
        );
        let def = state.get_netdef("bond0").unwrap();
        let err = render_netdef(&state, def).unwrap_err();
        assert!(err.to_string().contains("not supported by OVS"));
    }

    #[test]
    fn test_patch_port_pairing() {
        let artifacts = render_all(
            r#"
network:
  version: 2
  _ovs-ports:
    patch0-1:
      peer: patch1-0
  bridges:
    br0:
      openvswitch: {}
      interfaces: [patch0-1]
      dhcp4: true
"#,
        );
        let unit = file_content(&artifacts, "netplan-ovs-patch0\\x2d1.service");
        assert!(unit.contains(
            "add-port br0 patch0-1 -- set Interface patch0-1 type=patch options:peer=patch1-0"
        ));
    }

    #[test]
    fn test_ssl_controller_needs_global_ssl() {
        let state = state_of(
            r#"
network:
  version: 2
  bridges:
    br0:
      openvswitch:
        controller:
          addresses: ["ssl:10.0.0.1:6653"]
      dhcp4: true
"#,
        );
        let def = state.get_netdef("br0").unwrap();
        let err = render_netdef(&state, def).unwrap_err();
        assert!(err.to_string().contains("ssl"));
    }

    #[test]
    fn test_global_unit() {
        let artifacts = render_all(
            r#"
network:
  version: 2
  openvswitch:
    external-ids: {hostname: host1}
    ssl:
      ca-cert: /etc/ssl/ca.pem
      certificate: /etc/ssl/cert.pem
      private-key: /etc/ssl/key.pem
  bridges:
    br0:
      openvswitch: {}
      dhcp4: true
"#,
        );
        let unit = file_content(&artifacts, "netplan-ovs-global.service");
        assert!(unit.contains("set open_vswitch . external-ids:hostname=host1"));
        assert!(unit.contains("set-ssl /etc/ssl/key.pem /etc/ssl/cert.pem /etc/ssl/ca.pem"));
    }
}
