//! SR-IOV renderer
//!
//! SR-IOV virtual functions are allocated at boot by `netplan apply
//! --sriov-only`; this renderer emits the oneshot units ordering that
//! call after every physical function's device unit, plus the optional
//! rebind unit for delayed VF driver binding.

use super::{Artifacts, Renderer, remove_containing, remove_matching};
use crate::NetplanError;
use crate::names::Backend;
use crate::state::State;
use crate::types::NetDef;
use crate::util::systemd_escape;
use std::fmt::Write;
use std::path::Path;

const SYSTEM_DIR: &str = "run/systemd/system";
const WANTS_DIR: &str = "run/systemd/system/multi-user.target.wants";

/// SR-IOV renderer
pub struct SriovRenderer;

impl Renderer for SriovRenderer {
    fn render(&self, state: &State) -> Result<Artifacts, NetplanError> {
        render_finish(state)
    }

    fn backend(&self) -> Backend {
        Backend::None
    }

    fn cleanup(&self, rootdir: &Path) -> Result<(), NetplanError> {
        remove_matching(rootdir, SYSTEM_DIR, "netplan-sriov-", ".service")?;
        remove_matching(rootdir, WANTS_DIR, "netplan-sriov-", ".service")?;
        remove_containing(rootdir, "run/udev/rules.d", "sriov-netplan", ".rules")?;
        Ok(())
    }
}

/// Emit the apply unit (and the rebind unit when requested) if any
/// definition uses SR-IOV features.
pub fn render_finish(state: &State) -> Result<Artifacts, NetplanError> {
    let mut artifacts = Artifacts::default();
    if !state.iter_netdefs().any(NetDef::uses_sriov) {
        return Ok(artifacts);
    }

    let pfs: Vec<&NetDef> = state.iter_netdefs().filter(|d| d.is_sriov_pf).collect();

    let mut unit = String::new();
    writeln!(unit, "[Unit]").unwrap();
    writeln!(unit, "Description=Apply SR-IOV configuration").unwrap();
    writeln!(unit, "DefaultDependencies=no").unwrap();
    writeln!(unit, "Before=network-pre.target").unwrap();
    for pf in &pfs {
        writeln!(
            unit,
            "After=sys-subsystem-net-devices-{}.device",
            systemd_escape(&pf.id)
        )
        .unwrap();
    }
    writeln!(unit).unwrap();
    writeln!(unit, "[Service]").unwrap();
    writeln!(unit, "Type=oneshot").unwrap();
    writeln!(unit, "ExecStart=/usr/sbin/netplan apply --sriov-only").unwrap();

    artifacts.push_file(
        format!("{SYSTEM_DIR}/netplan-sriov-apply.service"),
        unit,
        0o640,
    );
    artifacts.push_symlink(
        format!("{WANTS_DIR}/netplan-sriov-apply.service"),
        "../netplan-sriov-apply.service",
    );

    let delayed: Vec<&str> = pfs
        .iter()
        .filter(|pf| pf.delay_virtual_functions_rebind == Some(true))
        .map(|pf| pf.set_name.as_deref().unwrap_or(&pf.id))
        .collect();
    if !delayed.is_empty() {
        let mut rebind = String::new();
        writeln!(rebind, "[Unit]").unwrap();
        writeln!(rebind, "Description=Rebind delayed SR-IOV virtual functions").unwrap();
        writeln!(rebind, "DefaultDependencies=no").unwrap();
        writeln!(rebind, "After=netplan-sriov-apply.service").unwrap();
        for pf in pfs
            .iter()
            .filter(|pf| pf.delay_virtual_functions_rebind == Some(true))
        {
            writeln!(
                rebind,
                "After=sys-subsystem-net-devices-{}.device",
                systemd_escape(&pf.id)
            )
            .unwrap();
        }
        writeln!(rebind).unwrap();
        writeln!(rebind, "[Service]").unwrap();
        writeln!(rebind, "Type=oneshot").unwrap();
        writeln!(rebind, "ExecStart=/usr/sbin/netplan rebind {}", delayed.join(" ")).unwrap();

        artifacts.push_file(
            format!("{SYSTEM_DIR}/netplan-sriov-rebind.service"),
            rebind,
            0o640,
        );
        artifacts.push_symlink(
            format!("{WANTS_DIR}/netplan-sriov-rebind.service"),
            "../netplan-sriov-rebind.service",
        );
    }
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

    fn file_content<'a>(artifacts: &'a Artifacts, suffix: &str) -> &'a str {
        &artifacts
            .files
            .iter()
            .find(|f| f.path.to_str().unwrap().ends_with(suffix))
            .unwrap_or_else(|| panic!("no file ending in {suffix}"))
            .content
    }

    #[test]
    fn test_no_sriov_no_units() {
        let state = state_of("network: {version: 2, ethernets: {eth0: {dhcp4: true}}}");
        let artifacts = render_finish(&state).unwrap();
        assert!(artifacts.is_empty());
    }

    #[test]
    fn test_apply_unit() {
        let state = state_of(
            r#"
network:
  version: 2
  ethernets:
    enp1:
      virtual-function-count: 4
    enp1v0:
      link: enp1
      dhcp4: true
"#,
        );
        let artifacts = render_finish(&state).unwrap();
        let unit = file_content(&artifacts, "netplan-sriov-apply.service");
        assert!(unit.contains("Before=network-pre.target"));
        assert!(unit.contains("After=sys-subsystem-net-devices-enp1.device"));
        assert!(unit.contains("ExecStart=/usr/sbin/netplan apply --sriov-only"));
        assert!(
            artifacts
                .symlinks
                .iter()
                .any(|s| s.link.to_str().unwrap().contains("multi-user.target.wants"))
        );
        assert!(
            !artifacts
                .files
                .iter()
                .any(|f| f.path.to_str().unwrap().contains("rebind"))
        );
    }

    #[test]
    fn test_rebind_unit() {
        let state = state_of(
            r#"
network:
  version: 2
  ethernets:
    enp1:
      virtual-function-count: 2
      embedded-switch-mode: switchdev
      delay-virtual-functions-rebind: true
    enp2:
      virtual-function-count: 2
"#,
        );
        let artifacts = render_finish(&state).unwrap();
        let rebind = file_content(&artifacts, "netplan-sriov-rebind.service");
        assert!(rebind.contains("After=netplan-sriov-apply.service"));
        assert!(rebind.contains("ExecStart=/usr/sbin/netplan rebind enp1\n"));
        assert!(!rebind.contains("enp2"));
    }
}
