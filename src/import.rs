//! NetworkManager keyfile importer.
//!
//! The inverse direction of the NM renderer: a keyfile connection profile
//! becomes one netplan YAML file. Recognized keys are lifted into the
//! typed model; everything else is preserved verbatim in the settings
//! passthrough so a later render reproduces the keyfile.

use crate::NetplanError;
use crate::keyfile::KeyFile;
use crate::names::{Backend, DefType, TunnelMode, WifiMode};
use crate::types::{AccessPoint, MatchConfig, NetDef, NmBackendSettings};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Map a NetworkManager `connection.type` to a definition type. Anything
/// unrecognized becomes an opaque nm-device.
fn def_type_for(connection_type: &str) -> DefType {
    match connection_type {
        "ethernet" | "802-3-ethernet" => DefType::Ethernet,
        "wifi" | "802-11-wireless" => DefType::Wifi,
        "gsm" | "cdma" => DefType::Modem,
        "bridge" => DefType::Bridge,
        "bond" => DefType::Bond,
        "vlan" => DefType::Vlan,
        "vrf" => DefType::Vrf,
        "ip-tunnel" | "wireguard" => DefType::Tunnel,
        "vxlan" => DefType::Vxlan,
        _ => DefType::NmDevice,
    }
}

/// Convert one keyfile into a [`NetDef`]. The definition id is derived
/// from the connection UUID.
pub fn netdef_from_keyfile(content: &str) -> Result<NetDef, NetplanError> {
    let mut kf = KeyFile::parse(content)?;

    let uuid: Uuid = kf
        .get("connection", "uuid")
        .ok_or_else(|| NetplanError::Schema("keyfile has no connection.uuid".to_string()))?
        .parse()
        .map_err(|e| NetplanError::Schema(format!("invalid connection.uuid: {e}")))?;
    let connection_type = kf
        .get("connection", "type")
        .ok_or_else(|| NetplanError::Schema("keyfile has no connection.type".to_string()))?
        .to_string();

    let def_type = def_type_for(&connection_type);
    let mut def = NetDef {
        id: format!("NM-{uuid}"),
        def_type: Some(def_type),
        backend: Backend::NetworkManager,
        renderer: Some(Backend::NetworkManager),
        uuid: Some(uuid),
        ..Default::default()
    };
    if def_type == DefType::Tunnel && connection_type == "wireguard" {
        def.mode = Some(TunnelMode::Wireguard);
    }

    // Lift the recognized keys out of the keyfile
    kf.remove("connection", "uuid");
    if def_type != DefType::NmDevice {
        kf.remove("connection", "type");
    }
    let name = kf.remove("connection", "id");
    if let Some(interface) = kf.remove("connection", "interface-name") {
        def.match_config = Some(MatchConfig {
            name: Some(interface),
            ..Default::default()
        });
    }

    let mut settings = NmBackendSettings {
        name,
        uuid: Some(uuid),
        ..Default::default()
    };

    if def_type == DefType::Wifi {
        let ssid = kf.remove("wifi", "ssid").unwrap_or_default();
        let mode = match kf.remove("wifi", "mode").as_deref() {
            Some("adhoc") => WifiMode::Adhoc,
            Some("ap") => WifiMode::Ap,
            _ => WifiMode::Infrastructure,
        };
        let hidden = kf.remove("wifi", "hidden").as_deref() == Some("true");
        settings.passthrough = remaining_passthrough(&kf);
        let ap = AccessPoint {
            ssid: ssid.clone(),
            mode,
            hidden: if hidden { Some(true) } else { None },
            networkmanager: Some(settings),
            ..Default::default()
        };
        let mut aps = BTreeMap::new();
        aps.insert(ssid, ap);
        def.access_points = Some(aps);
    } else {
        settings.passthrough = remaining_passthrough(&kf);
        def.networkmanager = Some(settings);
    }
    Ok(def)
}

fn remaining_passthrough(kf: &KeyFile) -> BTreeMap<String, String> {
    kf.iter()
        .map(|(group, key, value)| (format!("{group}.{key}"), value.to_string()))
        .collect()
}

/// Import a keyfile and write the resulting YAML under
/// `etc/netplan/90-NM-<uuid>.yaml`. Returns the path written.
pub fn import_keyfile(
    content: &str,
    rootdir: impl AsRef<Path>,
) -> Result<PathBuf, NetplanError> {
    let def = netdef_from_keyfile(content)?;
    let dir = rootdir.as_ref().join("etc/netplan");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("90-{}.yaml", def.id));
    debug!("Importing keyfile as {}", path.display());

    let mut out = Vec::new();
    crate::emit::dump_netdef_document(&def, &mut out)?;
    std::fs::write(&path, out)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ETHERNET: &str = "\
[connection]
id=c1
uuid=626dd384-8b3d-3690-9511-192b2c79b3fd
type=ethernet
interface-name=enp0s3

[ipv4]
method=auto
";

    #[test]
    fn test_lift_recognized_keys() {
        let def = netdef_from_keyfile(ETHERNET).unwrap();
        assert_eq!(def.id, "NM-626dd384-8b3d-3690-9511-192b2c79b3fd");
        assert_eq!(def.def_type(), DefType::Ethernet);
        assert_eq!(def.renderer, Some(Backend::NetworkManager));
        assert_eq!(
            def.match_config.as_ref().unwrap().name.as_deref(),
            Some("enp0s3")
        );
        let nm = def.networkmanager.as_ref().unwrap();
        assert_eq!(nm.name.as_deref(), Some("c1"));
        assert_eq!(
            nm.uuid.unwrap().to_string(),
            "626dd384-8b3d-3690-9511-192b2c79b3fd"
        );
        // Unrecognized keys are preserved verbatim
        assert_eq!(nm.passthrough.get("ipv4.method").map(String::as_str), Some("auto"));
        assert!(!nm.passthrough.contains_key("connection.uuid"));
    }

    #[test]
    fn test_missing_uuid_fails() {
        let err = netdef_from_keyfile("[connection]\ntype=ethernet\n").unwrap_err();
        assert!(err.to_string().contains("uuid"));
    }

    #[test]
    fn test_missing_type_fails() {
        let err = netdef_from_keyfile(
            "[connection]\nuuid=626dd384-8b3d-3690-9511-192b2c79b3fd\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("type"));
    }

    #[test]
    fn test_unknown_type_is_nm_device() {
        let def = netdef_from_keyfile(
            "[connection]\nuuid=626dd384-8b3d-3690-9511-192b2c79b3fd\ntype=dummy\n",
        )
        .unwrap();
        assert_eq!(def.def_type(), DefType::NmDevice);
        // connection.type stays in passthrough for opaque devices
        let nm = def.networkmanager.as_ref().unwrap();
        assert_eq!(
            nm.passthrough.get("connection.type").map(String::as_str),
            Some("dummy")
        );
    }

    #[test]
    fn test_wifi_profile_attaches_to_access_point() {
        let def = netdef_from_keyfile(
            "\
[connection]
id=mywifi
uuid=626dd384-8b3d-3690-9511-192b2c79b3fd
type=wifi

[wifi]
ssid=home
mode=infrastructure
hidden=true

[wifi-security]
key-mgmt=wpa-psk
psk=secret
",
        )
        .unwrap();
        assert_eq!(def.def_type(), DefType::Wifi);
        let aps = def.access_points.as_ref().unwrap();
        let ap = &aps["home"];
        assert_eq!(ap.mode, WifiMode::Infrastructure);
        assert_eq!(ap.hidden, Some(true));
        let nm = ap.networkmanager.as_ref().unwrap();
        assert_eq!(nm.name.as_deref(), Some("mywifi"));
        assert_eq!(
            nm.passthrough.get("wifi-security.psk").map(String::as_str),
            Some("secret")
        );
        assert!(!nm.passthrough.contains_key("wifi.ssid"));
    }

    #[test]
    fn test_import_writes_yaml() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = import_keyfile(ETHERNET, temp.path()).unwrap();
        assert!(
            path.ends_with("etc/netplan/90-NM-626dd384-8b3d-3690-9511-192b2c79b3fd.yaml")
        );
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("NM-626dd384-8b3d-3690-9511-192b2c79b3fd:"));
        assert!(text.contains("renderer: NetworkManager"));
        assert!(text.contains("ipv4.method: \"auto\""));
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
