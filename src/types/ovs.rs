//! OpenVSwitch settings, per definition and global.

use super::scalars::yaml_bool_option;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Controller targets for an OVS bridge.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct OvsController {
    #[serde(default)]
    pub connection_mode: Option<String>,
    #[serde(default)]
    pub addresses: Vec<String>,
}

/// SSL client material for `ssl:` controller targets. Global scope only.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct OvsSsl {
    #[serde(default)]
    pub ca_cert: Option<String>,
    #[serde(default)]
    pub certificate: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
}

impl OvsSsl {
    pub fn is_complete(&self) -> bool {
        self.ca_cert.is_some() && self.certificate.is_some() && self.private_key.is_some()
    }
}

/// Per-definition and global `openvswitch:` block.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct OvsSettings {
    #[serde(default)]
    pub external_ids: BTreeMap<String, String>,
    #[serde(default)]
    pub other_config: BTreeMap<String, String>,
    #[serde(default)]
    pub lacp: Option<String>,
    #[serde(default)]
    pub fail_mode: Option<String>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub mcast_snooping: Option<bool>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub rstp: Option<bool>,
    #[serde(default)]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub controller: Option<OvsController>,
    #[serde(default)]
    pub ssl: Option<OvsSsl>,
}

impl OvsSettings {
    /// Whether any field differs from the defaults.
    pub fn is_nondefault(&self) -> bool {
        *self != Self::default()
    }
}

/// Valid OVS bond modes.
pub const OVS_BOND_MODES: &[&str] = &["active-backup", "balance-tcp", "balance-slb"];

/// Check a controller target like `tcp:127.0.0.1:6653` or `punix:/run/x`.
pub fn is_valid_controller_target(target: &str) -> bool {
    let (scheme, rest) = match target.split_once(':') {
        Some(pair) => pair,
        None => return false,
    };
    match scheme {
        "unix" | "punix" => !rest.is_empty(),
        "tcp" | "ssl" | "ptcp" | "pssl" => !rest.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_targets() {
        assert!(is_valid_controller_target("tcp:127.0.0.1:6653"));
        assert!(is_valid_controller_target("ssl:10.0.0.1"));
        assert!(is_valid_controller_target("ptcp:6653"));
        assert!(is_valid_controller_target("punix:/run/ovs.sock"));
        assert!(!is_valid_controller_target("tcp:"));
        assert!(!is_valid_controller_target("6653"));
        assert!(!is_valid_controller_target("http:10.0.0.1"));
    }

    #[test]
    fn test_nondefault_detection() {
        let mut ovs = OvsSettings::default();
        assert!(!ovs.is_nondefault());
        ovs.external_ids
            .insert("iface-id".to_string(), "port1".to_string());
        assert!(ovs.is_nondefault());
    }

    #[test]
    fn test_parse_block() {
        let ovs: OvsSettings = serde_yaml::from_str(
            r#"
external-ids: {iface-id: myhostname}
other-config: {disable-in-band: "true"}
lacp: active
fail-mode: secure
protocols: [OpenFlow13, OpenFlow14]
controller:
  connection-mode: in-band
  addresses: ["tcp:127.0.0.1:6653"]
"#,
        )
        .unwrap();
        assert_eq!(ovs.external_ids["iface-id"], "myhostname");
        assert_eq!(ovs.protocols.len(), 2);
        assert_eq!(
            ovs.controller.unwrap().connection_mode.as_deref(),
            Some("in-band")
        );
    }
}
