//! Routes, routing policy rules and WireGuard peers.

use super::scalars::{scalar_string_option, yaml_bool_option};
use serde::Deserialize;

/// Route table number left unset in YAML.
pub const ROUTE_TABLE_UNSPEC: u32 = 0;

/// Route metric left unset in YAML.
pub const ROUTE_METRIC_UNSPEC: u32 = u32::MAX;

/// The main kernel routing table.
pub const ROUTE_TABLE_MAIN: u32 = 254;

/// Address family of a route, rule or tunnel endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    /// Classify a destination or gateway spelling. `default` on its own
    /// stays ambiguous and resolves through the gateway.
    pub fn of_address(addr: &str) -> Option<Self> {
        let host = addr.split('/').next().unwrap_or(addr);
        if host == "default" {
            None
        } else if host.contains(':') {
            Some(Self::V6)
        } else {
            Some(Self::V4)
        }
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V4 => write!(f, "AF_INET"),
            Self::V6 => write!(f, "AF_INET6"),
        }
    }
}

/// A static route attached to a definition.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Route {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub via: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    /// unicast (default), blackhole, unreachable, prohibit or local
    #[serde(default, rename = "type")]
    pub rtype: Option<String>,
    /// global (default), link or host
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub table: Option<u32>,
    #[serde(default)]
    pub metric: Option<u32>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub on_link: Option<bool>,
    #[serde(default)]
    pub mtu: Option<u32>,
    #[serde(default)]
    pub congestion_window: Option<u32>,
    #[serde(default)]
    pub advertised_receive_window: Option<u32>,
}

impl Route {
    pub fn family(&self) -> Option<Family> {
        self.to
            .as_deref()
            .and_then(Family::of_address)
            .or_else(|| self.via.as_deref().and_then(Family::of_address))
            .or_else(|| self.from.as_deref().and_then(Family::of_address))
    }

    /// True for `default`, `0.0.0.0/0` and `::/0` destinations.
    pub fn is_default(&self) -> bool {
        matches!(self.to.as_deref(), Some("default" | "0.0.0.0/0" | "::/0"))
    }

    pub fn table_or_unspec(&self) -> u32 {
        self.table.unwrap_or(ROUTE_TABLE_UNSPEC)
    }

    pub fn metric_or_unspec(&self) -> u32 {
        self.metric.unwrap_or(ROUTE_METRIC_UNSPEC)
    }
}

/// A routing policy rule attached to a definition.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct IpRule {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub table: Option<u32>,
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default)]
    pub mark: Option<u32>,
    #[serde(default)]
    pub type_of_service: Option<u8>,
}

impl IpRule {
    pub fn family(&self) -> Option<Family> {
        self.from
            .as_deref()
            .and_then(Family::of_address)
            .or_else(|| self.to.as_deref().and_then(Family::of_address))
    }
}

/// Key material on a WireGuard peer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct WireguardPeerKeys {
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub public: Option<String>,
    /// Pre-shared key: 44-char base64 or an absolute file path
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub shared: Option<String>,
}

/// One peer of a WireGuard tunnel definition.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct WireguardPeer {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub keys: WireguardPeerKeys,
    #[serde(default)]
    pub allowed_ips: Vec<String>,
    #[serde(default)]
    pub keepalive: Option<u16>,
}

/// Check one WireGuard key: either base64 of 32 bytes (44 chars with
/// padding) or an absolute path to a key file.
pub fn is_valid_wireguard_key(key: &str) -> bool {
    use base64::Engine;
    if key.starts_with('/') {
        return true;
    }
    key.len() == 44
        && base64::engine::general_purpose::STANDARD
            .decode(key)
            .map(|raw| raw.len() == 32)
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_detection() {
        assert_eq!(Family::of_address("10.0.0.0/8"), Some(Family::V4));
        assert_eq!(Family::of_address("fd00::/64"), Some(Family::V6));
        assert_eq!(Family::of_address("default"), None);
    }

    #[test]
    fn test_route_default_spellings() {
        for to in ["default", "0.0.0.0/0", "::/0"] {
            let route = Route {
                to: Some(to.to_string()),
                ..Default::default()
            };
            assert!(route.is_default(), "{to}");
        }
        let route = Route {
            to: Some("10.0.0.0/8".to_string()),
            ..Default::default()
        };
        assert!(!route.is_default());
    }

    #[test]
    fn test_route_family_via_gateway() {
        let route: Route = serde_yaml::from_str("{to: default, via: 10.0.0.1}").unwrap();
        assert_eq!(route.family(), Some(Family::V4));
        let route: Route = serde_yaml::from_str("{to: default, via: \"fe80::1\"}").unwrap();
        assert_eq!(route.family(), Some(Family::V6));
    }

    #[test]
    fn test_wireguard_key_validation() {
        // 32 zero bytes in base64
        let key = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";
        assert_eq!(key.len(), 44);
        assert!(is_valid_wireguard_key(key));
        assert!(is_valid_wireguard_key("/etc/wireguard/private.key"));
        assert!(!is_valid_wireguard_key("not-a-key"));
        assert!(!is_valid_wireguard_key("AAAA"));
    }

    #[test]
    fn test_rule_parse() {
        let rule: IpRule =
            serde_yaml::from_str("{from: 10.0.0.0/8, table: 100, priority: 50}").unwrap();
        assert_eq!(rule.table, Some(100));
        assert_eq!(rule.family(), Some(Family::V4));
    }
}
