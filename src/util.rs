//! Escaping and YAML patch utilities shared by the renderers and the
//! library API.

use crate::NetplanError;
use serde_yaml::Value;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

/// systemd-escape transformation for identifiers used in unit names:
/// `/` becomes `-`, and anything outside `[a-zA-Z0-9:_.]` (plus a leading
/// dot) becomes `\xXX`.
pub fn systemd_escape(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, byte) in name.bytes().enumerate() {
        match byte {
            b'/' => out.push('-'),
            b'.' if i == 0 => out.push_str("\\x2e"),
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b':' | b'_' | b'.' => {
                out.push(byte as char)
            }
            other => {
                out.push_str(&format!("\\x{other:02x}"));
            }
        }
    }
    out
}

/// Percent-escape an identifier for use in file names. Unreserved
/// characters (`A-Za-z0-9-._~`) stay as they are.
pub fn uri_escape(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

/// Inverse of [`uri_escape`]. Malformed percent sequences pass through.
pub fn uri_unescape(name: &str) -> String {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3).and_then(|h| {
                std::str::from_utf8(h)
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
            });
            if let Some(byte) = hex {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Build a YAML overlay document assigning `payload` at the tab-separated
/// key path, e.g. `network\tethernets\teth0\tdhcp4` + `true`.
///
/// The payload is parsed as YAML, so `true`, `null`, numbers and flow
/// collections keep their types.
pub fn create_yaml_patch(
    path: &str,
    payload: &str,
    mut writer: impl Write,
) -> Result<(), NetplanError> {
    let mut node: Value = serde_yaml::from_str(payload)?;
    for component in path.split('\t').rev() {
        let mut map = serde_yaml::Mapping::new();
        map.insert(Value::String(component.to_string()), node);
        node = Value::Mapping(map);
    }
    let text = serde_yaml::to_string(&node).map_err(|e| NetplanError::Emitter(e.to_string()))?;
    writer.write_all(text.as_bytes())?;
    Ok(())
}

/// Emit only the YAML subtree rooted at the tab-separated key path.
pub fn dump_yaml_subtree(
    prefix: &str,
    mut reader: impl Read,
    mut writer: impl Write,
) -> Result<(), NetplanError> {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;
    let doc: Value = serde_yaml::from_str(&content)?;

    let mut node = &doc;
    for component in prefix.split('\t').filter(|c| !c.is_empty()) {
        node = node.get(component).ok_or_else(|| {
            NetplanError::Schema(format!("subtree path component '{component}' not found"))
        })?;
    }

    let text = serde_yaml::to_string(node).map_err(|e| NetplanError::Emitter(e.to_string()))?;
    writer.write_all(text.as_bytes())?;
    Ok(())
}

/// Remove one definition from the YAML file that defines it. The file is
/// rewritten without the definition, or deleted when nothing but the
/// version header remains. Returns false when no file defines the id.
pub fn delete_connection(id: &str, rootdir: impl AsRef<Path>) -> Result<bool, NetplanError> {
    let rootdir = rootdir.as_ref();
    let mut parser = crate::Parser::new();
    parser.load_yaml_hierarchy(rootdir)?;
    let sources: Vec<_> = parser.sources().iter().cloned().collect();

    // Walk the contributing files newest-precedence first so we edit the
    // file whose content actually wins.
    for path in sources.iter().rev() {
        let content = std::fs::read_to_string(path)?;
        let mut doc: Value = serde_yaml::from_str(&content)?;
        let Some(network) = doc.get_mut("network").and_then(Value::as_mapping_mut) else {
            continue;
        };

        let mut removed = false;
        let mut emptied_groups = Vec::new();
        for (group_key, group) in network.iter_mut() {
            let Some(group_map) = group.as_mapping_mut() else {
                continue;
            };
            if group_map.remove(id).is_some() {
                removed = true;
                if group_map.is_empty() {
                    emptied_groups.push(group_key.clone());
                }
            }
        }
        if !removed {
            continue;
        }
        for group_key in emptied_groups {
            network.remove(&group_key);
        }

        let only_version = network.len() == 1 && network.contains_key("version");
        if network.is_empty() || only_version {
            debug!("Removing {}", path.display());
            std::fs::remove_file(path)?;
        } else {
            let text =
                serde_yaml::to_string(&doc).map_err(|e| NetplanError::Emitter(e.to_string()))?;
            std::fs::write(path, text)?;
        }
        return Ok(true);
    }
    Ok(false)
}

/// Recover the definition id from a generated NetworkManager keyfile path
/// like `run/NetworkManager/system-connections/netplan-eth0-SSID.nmconnection`.
/// When `ssid` is given, the trailing `-<escaped-ssid>` is stripped first.
pub fn get_id_from_nm_filepath(path: impl AsRef<Path>, ssid: Option<&str>) -> Option<String> {
    let stem = path.as_ref().file_name()?.to_str()?;
    let stem = stem.strip_suffix(".nmconnection").unwrap_or(stem);
    let escaped = stem.strip_prefix("netplan-")?;
    let escaped = match ssid {
        Some(ssid) => escaped
            .strip_suffix(&format!("-{}", uri_escape(ssid)))
            .unwrap_or(escaped),
        None => escaped,
    };
    if escaped.is_empty() {
        return None;
    }
    Some(uri_unescape(escaped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_systemd_escape() {
        assert_eq!(systemd_escape("eth0"), "eth0");
        assert_eq!(systemd_escape("my wifi"), "my\\x20wifi");
        assert_eq!(systemd_escape("a/b"), "a-b");
        assert_eq!(systemd_escape(".hidden"), "\\x2ehidden");
    }

    #[test]
    fn test_uri_escape_round_trip() {
        for name in ["eth0", "my wifi", "päth", "a/b%c"] {
            assert_eq!(uri_unescape(&uri_escape(name)), name);
        }
        assert_eq!(uri_escape("my wifi"), "my%20wifi");
    }

    #[test]
    fn test_create_yaml_patch() {
        let mut out = Vec::new();
        create_yaml_patch("network\tethernets\teth0\tdhcp4", "true", &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let doc: Value = serde_yaml::from_str(&text).unwrap();
        assert_eq!(
            doc["network"]["ethernets"]["eth0"]["dhcp4"],
            Value::Bool(true)
        );
    }

    #[test]
    fn test_create_null_patch() {
        let mut out = Vec::new();
        create_yaml_patch("network\tethernets\teth0", "null", &mut out).unwrap();
        let doc: Value = serde_yaml::from_str(std::str::from_utf8(&out).unwrap()).unwrap();
        assert!(doc["network"]["ethernets"]["eth0"].is_null());
    }

    #[test]
    fn test_dump_yaml_subtree() {
        let input = "network:\n  ethernets:\n    eth0:\n      dhcp4: true\n";
        let mut out = Vec::new();
        dump_yaml_subtree("network\tethernets\teth0", input.as_bytes(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("dhcp4: true"));
        assert!(!text.contains("ethernets"));
    }

    #[test]
    fn test_dump_yaml_subtree_missing_path() {
        let input = "network: {version: 2}";
        let mut out = Vec::new();
        let err =
            dump_yaml_subtree("network\tethernets", input.as_bytes(), &mut out).unwrap_err();
        assert!(err.to_string().contains("ethernets"));
    }

    #[test]
    fn test_delete_connection() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("etc/netplan");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("01.yaml"),
            "network:\n  version: 2\n  ethernets:\n    eth0: {dhcp4: true}\n    eth1: {dhcp4: true}\n",
        )
        .unwrap();

        assert!(delete_connection("eth0", temp.path()).unwrap());
        let remaining = fs::read_to_string(dir.join("01.yaml")).unwrap();
        assert!(!remaining.contains("eth0"));
        assert!(remaining.contains("eth1"));

        // Deleting the last definition removes the file
        assert!(delete_connection("eth1", temp.path()).unwrap());
        assert!(!dir.join("01.yaml").exists());

        assert!(!delete_connection("eth2", temp.path()).unwrap());
    }

    #[test]
    fn test_get_id_from_nm_filepath() {
        assert_eq!(
            get_id_from_nm_filepath(
                "run/NetworkManager/system-connections/netplan-eth0.nmconnection",
                None
            )
            .as_deref(),
            Some("eth0")
        );
        assert_eq!(
            get_id_from_nm_filepath(
                "run/NetworkManager/system-connections/netplan-wlan0-my%20wifi.nmconnection",
                Some("my wifi")
            )
            .as_deref(),
            Some("wlan0")
        );
        assert_eq!(get_id_from_nm_filepath("other.nmconnection", None), None);
    }
}
