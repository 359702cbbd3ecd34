//! Overlay merging of netplan documents.
//!
//! Later files override earlier ones: mappings merge key by key, scalars
//! are last-writer-wins, and sequences are replaced wholesale (listing any
//! part of a sequence under a key path replaces the whole sequence from the
//! earlier layer). An explicit `null` in a later layer deletes the key —
//! or the whole definition — from the merged document.

use serde_yaml::Value;

/// Merge `overlay` into `base`, recording the dotted paths deleted by
/// explicit nulls into `null_paths`.
pub fn merge_yaml_values(base: &mut Value, overlay: Value, null_paths: &mut Vec<String>) {
    merge_at(base, overlay, String::new(), null_paths);
}

fn merge_at(base: &mut Value, overlay: Value, prefix: String, null_paths: &mut Vec<String>) {
    match (base, overlay) {
        // Both are mappings - merge recursively
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let key_text = key.as_str().map(str::to_string).unwrap_or_default();
                let path = if prefix.is_empty() {
                    key_text
                } else {
                    format!("{prefix}.{key_text}")
                };

                if overlay_value.is_null() {
                    // Null override: drop the key entirely
                    if base_map.remove(&key).is_some() {
                        null_paths.push(path);
                    }
                    continue;
                }

                match base_map.get_mut(&key) {
                    Some(base_value) => merge_at(base_value, overlay_value, path, null_paths),
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
        }

        // All other cases (scalars, sequences, kind changes) - overlay wins
        (base_value, overlay_value) => *base_value = overlay_value,
    }
}

/// Apply a null-overlay patch document: every `null` leaf deletes the key
/// at the same path in `base`; non-null leaves are ignored. Returns the
/// deleted paths.
pub fn apply_null_overlay(base: &mut Value, patch: &Value) -> Vec<String> {
    let mut deleted = Vec::new();
    null_overlay_at(base, patch, String::new(), &mut deleted);
    deleted
}

fn null_overlay_at(base: &mut Value, patch: &Value, prefix: String, deleted: &mut Vec<String>) {
    let (Value::Mapping(base_map), Value::Mapping(patch_map)) = (base, patch) else {
        return;
    };
    for (key, patch_value) in patch_map {
        let key_text = key.as_str().map(str::to_string).unwrap_or_default();
        let path = if prefix.is_empty() {
            key_text
        } else {
            format!("{prefix}.{key_text}")
        };
        if patch_value.is_null() {
            if base_map.remove(key).is_some() {
                deleted.push(path);
            }
        } else if let Some(base_value) = base_map.get_mut(key) {
            null_overlay_at(base_value, patch_value, path, deleted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn merged(base: &str, overlay: &str) -> (Value, Vec<String>) {
        let mut base = value(base);
        let mut nulls = Vec::new();
        merge_yaml_values(&mut base, value(overlay), &mut nulls);
        (base, nulls)
    }

    #[test]
    fn test_scalar_last_writer_wins() {
        let (doc, _) = merged(
            "network: {ethernets: {eth0: {dhcp4: true}}}",
            "network: {ethernets: {eth0: {dhcp4: false}}}",
        );
        assert_eq!(
            doc["network"]["ethernets"]["eth0"]["dhcp4"],
            Value::Bool(false)
        );
    }

    #[test]
    fn test_mappings_deep_merge() {
        let (doc, _) = merged(
            "network: {ethernets: {eth0: {dhcp4: true}}}",
            "network: {ethernets: {eth1: {dhcp4: true}}}",
        );
        let eths = doc["network"]["ethernets"].as_mapping().unwrap();
        assert_eq!(eths.len(), 2);
    }

    #[test]
    fn test_sequences_replaced_wholesale() {
        let (doc, _) = merged(
            "network: {ethernets: {eth0: {addresses: [1.2.3.4/24, 5.6.7.8/24]}}}",
            "network: {ethernets: {eth0: {addresses: [9.9.9.9/24]}}}",
        );
        let addrs = doc["network"]["ethernets"]["eth0"]["addresses"]
            .as_sequence()
            .unwrap();
        assert_eq!(addrs.len(), 1);
    }

    #[test]
    fn test_null_deletes_definition() {
        let (doc, nulls) = merged(
            "network: {ethernets: {eth0: {dhcp4: true}, eth1: {dhcp4: true}}}",
            "network: {ethernets: {eth0: null}}",
        );
        let eths = doc["network"]["ethernets"].as_mapping().unwrap();
        assert_eq!(eths.len(), 1);
        assert_eq!(nulls, vec!["network.ethernets.eth0"]);
    }

    #[test]
    fn test_null_deletes_single_field() {
        let (doc, nulls) = merged(
            "network: {ethernets: {eth0: {dhcp4: true, mtu: 9000}}}",
            "network: {ethernets: {eth0: {mtu: null}}}",
        );
        let eth0 = doc["network"]["ethernets"]["eth0"].as_mapping().unwrap();
        assert_eq!(eth0.len(), 1);
        assert_eq!(nulls, vec!["network.ethernets.eth0.mtu"]);
    }

    #[test]
    fn test_null_overlay_patch() {
        let mut base = value("network: {ethernets: {eth0: {dhcp4: true}, eth1: {mtu: 1500}}}");
        let patch = value("network: {ethernets: {eth0: null, eth1: {mtu: null}}}");
        let deleted = apply_null_overlay(&mut base, &patch);
        assert_eq!(
            deleted,
            vec!["network.ethernets.eth0", "network.ethernets.eth1.mtu"]
        );
        assert!(
            base["network"]["ethernets"]
                .as_mapping()
                .unwrap()
                .contains_key("eth1")
        );
    }

    #[test]
    fn test_kind_change_overlay_wins() {
        let (doc, _) = merged(
            "network: {ethernets: {eth0: {nameservers: {addresses: [8.8.8.8]}}}}",
            "network: {ethernets: {eth0: {nameservers: {addresses: [1.1.1.1]}}}}",
        );
        let ns = doc["network"]["ethernets"]["eth0"]["nameservers"]["addresses"]
            .as_sequence()
            .unwrap();
        assert_eq!(ns[0], Value::String("1.1.1.1".into()));
    }
}
