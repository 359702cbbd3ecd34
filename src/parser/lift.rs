//! Lifting the merged YAML document into the typed model.
//!
//! Runs once per import, after all layers are merged. Schema problems
//! (unknown keys, wrong node kinds, bad ranges) surface here with the YAML
//! key path; semantic problems are left to the validator.

use crate::NetplanError;
use crate::names::{Backend, DefType};
use crate::types::ovs::OvsSettings;
use crate::types::{BondParams, BridgeParams, NetDef};
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Result of lifting one merged document.
#[derive(Debug, Default)]
pub struct Lifted {
    pub global_backend: Backend,
    pub global_ovs: OvsSettings,
    /// Definitions in first-seen parse order
    pub defs: Vec<NetDef>,
    /// (referencing id, referenced id) pairs with no definition
    pub missing: Vec<(String, String)>,
}

/// Top-level keys under `network:` that are not definition groups.
const NETWORK_SCALAR_KEYS: &[&str] = &["version", "renderer", "openvswitch"];

pub fn lift_document(
    doc: &Value,
    origins: &HashMap<String, PathBuf>,
    order: &[String],
) -> Result<Lifted, NetplanError> {
    let fallback = Path::new("(merged configuration)");
    let mut lifted = Lifted::default();

    let network = match doc.get("network") {
        Some(Value::Mapping(network)) => network,
        Some(other) if !other.is_null() => {
            return Err(NetplanError::schema(
                fallback,
                "network",
                "expected a mapping",
            ));
        }
        _ => return Ok(lifted),
    };
    if network.is_empty() {
        return Ok(lifted);
    }

    match network.get("version").and_then(Value::as_u64) {
        Some(2) => {}
        Some(_) => {
            return Err(NetplanError::schema(
                fallback,
                "network.version",
                "only version 2 is supported",
            ));
        }
        None => {
            return Err(NetplanError::schema(
                fallback,
                "network.version",
                "missing required 'version'",
            ));
        }
    }

    if let Some(renderer) = network.get("renderer") {
        lifted.global_backend = parse_backend(fallback, "network.renderer", renderer)?;
    }
    if let Some(ovs) = network.get("openvswitch") {
        lifted.global_ovs = serde_yaml::from_value(ovs.clone())
            .map_err(|e| NetplanError::schema(fallback, "network.openvswitch", e))?;
    }

    for (group_key, group) in network {
        let group_name = group_key.as_str().unwrap_or_default();
        if NETWORK_SCALAR_KEYS.contains(&group_name) {
            continue;
        }
        let def_type = DefType::from_group_key(group_name).ok_or_else(|| {
            NetplanError::schema(
                fallback,
                format!("network.{group_name}"),
                "unknown key",
            )
        })?;
        let Value::Mapping(group) = group else {
            return Err(NetplanError::schema(
                fallback,
                format!("network.{group_name}"),
                "expected a mapping of definitions",
            ));
        };

        // A type group may carry its own default renderer
        let group_backend = match group.get("renderer") {
            Some(renderer) => Some(parse_backend(
                fallback,
                format!("network.{group_name}.renderer"),
                renderer,
            )?),
            None => None,
        };

        for (id, body) in group {
            let Some(id) = id.as_str() else {
                return Err(NetplanError::schema(
                    fallback,
                    format!("network.{group_name}"),
                    "definition ids must be strings",
                ));
            };
            if id == "renderer" {
                continue;
            }
            let key_path = format!("network.{group_name}.{id}");
            let origin = origins.get(id).cloned();
            let at = origin.as_deref().unwrap_or(fallback);

            if lifted.defs.iter().any(|d| d.id == id) {
                return Err(NetplanError::schema(
                    at,
                    key_path,
                    "duplicate definition id",
                ));
            }

            let mut def: NetDef = serde_yaml::from_value(body.clone())
                .map_err(|e| NetplanError::schema(at, &key_path, e))?;
            def.id = id.to_string();
            def.def_type = Some(def_type);
            if def.renderer.is_none() {
                def.renderer = group_backend;
            }
            lift_parameters(&mut def, at, &key_path)?;
            if let Some(aps) = def.access_points.as_mut() {
                for (ssid, ap) in aps.iter_mut() {
                    ap.ssid = ssid.clone();
                }
            }
            def.filepath = origin;
            lifted.defs.push(def);
        }
    }

    sort_by_first_seen(&mut lifted.defs, order);
    adopt_members(&mut lifted)?;
    collect_missing_references(&mut lifted);
    Ok(lifted)
}

fn parse_backend(
    path: &Path,
    key_path: impl std::fmt::Display,
    value: &Value,
) -> Result<Backend, NetplanError> {
    value
        .as_str()
        .and_then(Backend::from_hint)
        .ok_or_else(|| {
            NetplanError::schema(
                path,
                key_path,
                "invalid renderer (expected networkd, NetworkManager or OpenVSwitch)",
            )
        })
}

/// `parameters:` is a different block for bonds and bridges; decode it
/// against the definition's type.
fn lift_parameters(def: &mut NetDef, at: &Path, key_path: &str) -> Result<(), NetplanError> {
    let Some(params) = def.parameters.take() else {
        return Ok(());
    };
    let params_path = format!("{key_path}.parameters");
    match def.def_type() {
        DefType::Bond => {
            let parsed: BondParams = serde_yaml::from_value(params)
                .map_err(|e| NetplanError::schema(at, &params_path, e))?;
            def.bond_params = Some(parsed);
        }
        DefType::Bridge => {
            let parsed: BridgeParams = serde_yaml::from_value(params)
                .map_err(|e| NetplanError::schema(at, &params_path, e))?;
            def.bridge_params = Some(parsed);
        }
        _ => {
            return Err(NetplanError::schema(at, params_path, "unknown key"));
        }
    }
    Ok(())
}

fn sort_by_first_seen(defs: &mut [NetDef], order: &[String]) {
    let rank: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    defs.sort_by_key(|def| rank.get(def.id.as_str()).copied().unwrap_or(usize::MAX));
}

/// Turn `interfaces:` declarations on bridges, bonds and VRFs into member
/// backlinks, rejecting double assignment.
fn adopt_members(lifted: &mut Lifted) -> Result<(), NetplanError> {
    let mut assignments: Vec<(String, String, DefType)> = Vec::new();
    for owner in &lifted.defs {
        let owner_type = owner.def_type();
        if !matches!(owner_type, DefType::Bridge | DefType::Bond | DefType::Vrf) {
            continue;
        }
        for member in &owner.interfaces {
            assignments.push((member.clone(), owner.id.clone(), owner_type));
        }
    }

    for (member_id, owner_id, owner_type) in assignments {
        let Some(member) = lifted.defs.iter_mut().find(|d| d.id == member_id) else {
            lifted.missing.push((owner_id, member_id));
            continue;
        };
        let slot = match owner_type {
            DefType::Bridge => &mut member.bridge,
            DefType::Bond => &mut member.bond,
            DefType::Vrf => &mut member.vrf,
            _ => unreachable!(),
        };
        if let Some(previous) = slot.as_deref() {
            if previous != owner_id {
                return Err(NetplanError::validation(
                    &member_id,
                    format!(
                        "interface is assigned to both '{previous}' and '{owner_id}'"
                    ),
                ));
            }
        }
        *slot = Some(owner_id.clone());
        if member.bridge.is_some() && member.bond.is_some() {
            return Err(NetplanError::validation(
                &member_id,
                "interface cannot be both a bridge and a bond member",
            ));
        }
    }
    Ok(())
}

/// Record every id-typed reference with no matching definition.
fn collect_missing_references(lifted: &mut Lifted) {
    let known: Vec<String> = lifted.defs.iter().map(|d| d.id.clone()).collect();
    let mut missing = Vec::new();
    for def in &lifted.defs {
        let mut check = |target: Option<&str>| {
            if let Some(target) = target {
                if !known.iter().any(|id| id == target) {
                    missing.push((def.id.clone(), target.to_string()));
                }
            }
        };
        check(def.vlan_link());
        check(def.sriov_vf_link());
        check(def.peer.as_deref());
        if let Some(params) = &def.bond_params {
            check(params.primary.as_deref());
        }
    }
    lifted.missing.extend(missing);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lift(yaml: &str) -> Result<Lifted, NetplanError> {
        let doc: Value = serde_yaml::from_str(yaml).unwrap();
        lift_document(&doc, &HashMap::new(), &[])
    }

    #[test]
    fn test_lift_minimal() {
        let lifted =
            lift("network: {version: 2, ethernets: {eth0: {dhcp4: true}}}").unwrap();
        assert_eq!(lifted.defs.len(), 1);
        assert_eq!(lifted.defs[0].id, "eth0");
        assert_eq!(lifted.defs[0].def_type(), DefType::Ethernet);
        assert!(lifted.missing.is_empty());
    }

    #[test]
    fn test_missing_version() {
        let err = lift("network: {ethernets: {eth0: {dhcp4: true}}}").unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn test_unknown_group_key() {
        let err = lift("network: {version: 2, ethernet: {eth0: {}}}").unwrap_err();
        assert!(err.to_string().contains("unknown key"));
    }

    #[test]
    fn test_global_and_group_renderer() {
        let lifted = lift(
            r#"
network:
  version: 2
  renderer: NetworkManager
  ethernets:
    renderer: networkd
    eth0: {dhcp4: true}
"#,
        )
        .unwrap();
        assert_eq!(lifted.global_backend, Backend::NetworkManager);
        assert_eq!(lifted.defs[0].renderer, Some(Backend::Networkd));
    }

    #[test]
    fn test_bridge_member_adoption() {
        let lifted = lift(
            r#"
network:
  version: 2
  ethernets:
    eth0: {}
  bridges:
    br0:
      interfaces: [eth0]
      dhcp4: true
"#,
        )
        .unwrap();
        let eth0 = lifted.defs.iter().find(|d| d.id == "eth0").unwrap();
        assert_eq!(eth0.bridge.as_deref(), Some("br0"));
    }

    #[test]
    fn test_double_bridge_assignment_rejected() {
        let err = lift(
            r#"
network:
  version: 2
  ethernets:
    eth0: {}
  bridges:
    br0: {interfaces: [eth0]}
    br1: {interfaces: [eth0]}
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("assigned to both"));
    }

    #[test]
    fn test_vlan_link_missing() {
        let lifted = lift(
            r#"
network:
  version: 2
  vlans:
    vlan10: {id: 10, link: eth9}
"#,
        )
        .unwrap();
        assert_eq!(
            lifted.missing,
            vec![("vlan10".to_string(), "eth9".to_string())]
        );
    }

    #[test]
    fn test_bond_parameters_lift() {
        let lifted = lift(
            r#"
network:
  version: 2
  ethernets:
    eth0: {}
    eth1: {}
  bonds:
    bond0:
      interfaces: [eth0, eth1]
      parameters:
        mode: 802.3ad
        lacp-rate: fast
        mii-monitor-interval: 100
"#,
        )
        .unwrap();
        let bond = lifted.defs.iter().find(|d| d.id == "bond0").unwrap();
        let params = bond.bond_params.as_ref().unwrap();
        assert_eq!(params.mode.as_deref(), Some("802.3ad"));
        assert_eq!(params.mii_monitor_interval.as_deref(), Some("100"));
    }

    #[test]
    fn test_parameters_on_ethernet_rejected() {
        let err = lift(
            "network: {version: 2, ethernets: {eth0: {parameters: {mode: x}}}}",
        )
        .unwrap_err();
        assert!(err.to_string().contains("parameters"));
    }

    #[test]
    fn test_wifi_ssid_filled() {
        let lifted = lift(
            r#"
network:
  version: 2
  wifis:
    wlan0:
      access-points:
        "mySSID": {password: "0123456789ab"}
"#,
        )
        .unwrap();
        let wifi = &lifted.defs[0];
        let ap = &wifi.access_points.as_ref().unwrap()["mySSID"];
        assert_eq!(ap.ssid, "mySSID");
    }
}
