//! Minimal NetworkManager keyfile model.
//!
//! Keyfiles are INI-shaped: `[group]` headers followed by `key=value`
//! lines. Group and key order is preserved so that a parse/serialize
//! round trip only differs where we changed something.

use crate::NetplanError;
use std::fmt::Write;

/// An ordered keyfile: groups of key/value pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyFile {
    groups: Vec<(String, Vec<(String, String)>)>,
}

impl KeyFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse keyfile text. Comments (`#`, `;`) and blank lines are
    /// dropped; anything else that is neither a header nor a `key=value`
    /// pair is an error.
    pub fn parse(content: &str) -> Result<Self, NetplanError> {
        let mut keyfile = Self::new();
        let mut current: Option<usize> = None;
        for (lineno, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                keyfile.groups.push((name.to_string(), Vec::new()));
                current = Some(keyfile.groups.len() - 1);
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(NetplanError::Schema(format!(
                    "keyfile line {}: expected '[group]' or 'key=value', got '{}'",
                    lineno + 1,
                    raw
                )));
            };
            let Some(group) = current else {
                return Err(NetplanError::Schema(format!(
                    "keyfile line {}: key outside of any group",
                    lineno + 1
                )));
            };
            keyfile.groups[group]
                .1
                .push((key.trim().to_string(), value.trim().to_string()));
        }
        Ok(keyfile)
    }

    pub fn get(&self, group: &str, key: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|(name, _)| name == group)?
            .1
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set a key, creating the group if needed and replacing an existing
    /// value in place.
    pub fn set(&mut self, group: &str, key: &str, value: impl Into<String>) {
        let value = value.into();
        let entries = match self.groups.iter_mut().find(|(name, _)| name == group) {
            Some((_, entries)) => entries,
            None => {
                self.groups.push((group.to_string(), Vec::new()));
                &mut self.groups.last_mut().unwrap().1
            }
        };
        match entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => entries.push((key.to_string(), value)),
        }
    }

    /// Remove a key, dropping the group once it is empty. Returns the old
    /// value.
    pub fn remove(&mut self, group: &str, key: &str) -> Option<String> {
        let index = self.groups.iter().position(|(name, _)| name == group)?;
        let entries = &mut self.groups[index].1;
        let at = entries.iter().position(|(k, _)| k == key)?;
        let (_, value) = entries.remove(at);
        if entries.is_empty() {
            self.groups.remove(index);
        }
        Some(value)
    }

    /// Iterate `(group, key, value)` triples in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.groups.iter().flat_map(|(group, entries)| {
            entries
                .iter()
                .map(move |(k, v)| (group.as_str(), k.as_str(), v.as_str()))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Serialize with one blank line between groups.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for (i, (group, entries)) in self.groups.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            writeln!(out, "[{}]", group).unwrap();
            for (key, value) in entries {
                writeln!(out, "{}={}", key, value).unwrap();
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "[connection]\nid=c1\nuuid=1db50bd3\ntype=ethernet\n\n[ipv4]\nmethod=auto\n";

    #[test]
    fn test_parse_and_get() {
        let kf = KeyFile::parse(SAMPLE).unwrap();
        assert_eq!(kf.get("connection", "id"), Some("c1"));
        assert_eq!(kf.get("ipv4", "method"), Some("auto"));
        assert_eq!(kf.get("ipv6", "method"), None);
    }

    #[test]
    fn test_round_trip() {
        let kf = KeyFile::parse(SAMPLE).unwrap();
        assert_eq!(kf.serialize(), SAMPLE);
    }

    #[test]
    fn test_remove_drops_empty_group() {
        let mut kf = KeyFile::parse(SAMPLE).unwrap();
        assert_eq!(kf.remove("ipv4", "method").as_deref(), Some("auto"));
        assert!(kf.get("ipv4", "method").is_none());
        assert!(!kf.serialize().contains("[ipv4]"));
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut kf = KeyFile::parse(SAMPLE).unwrap();
        kf.set("connection", "id", "c2");
        kf.set("wifi", "ssid", "home");
        let text = kf.serialize();
        assert!(text.contains("id=c2"));
        assert!(text.ends_with("[wifi]\nssid=home\n"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(KeyFile::parse("key=value\n").is_err());
        assert!(KeyFile::parse("[connection]\ngarbage\n").is_err());
    }

    #[test]
    fn test_comments_ignored() {
        let kf = KeyFile::parse("# comment\n[connection]\n; other\nid=c1\n").unwrap();
        assert_eq!(kf.get("connection", "id"), Some("c1"));
    }
}
