//! Bidirectional enum/string tables for the closed token sets of the
//! netplan grammar.
//!
//! Every enum here appears verbatim in YAML input or in rendered output, so
//! each carries both a serde surface and an `as_str` for the renderers.

use serde::{Deserialize, Serialize};

/// Kind of a network definition.
///
/// Types up to and including `Modem` are physical devices; everything after
/// is virtual and gets a `.netdev` (or unit) of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefType {
    Ethernet,
    Wifi,
    Modem,
    Bridge,
    Bond,
    Vlan,
    Vrf,
    Tunnel,
    /// OVS patch port
    Port,
    NmDevice,
    Vxlan,
}

impl DefType {
    /// Physical devices match real hardware; virtual ones are created by us.
    pub fn is_physical(self) -> bool {
        matches!(self, Self::Ethernet | Self::Wifi | Self::Modem)
    }

    pub fn is_virtual(self) -> bool {
        !self.is_physical()
    }

    /// The YAML group key holding definitions of this type.
    pub fn group_key(self) -> &'static str {
        match self {
            Self::Ethernet => "ethernets",
            Self::Wifi => "wifis",
            Self::Modem => "modems",
            Self::Bridge => "bridges",
            Self::Bond => "bonds",
            Self::Vlan => "vlans",
            Self::Vrf => "vrfs",
            Self::Tunnel => "tunnels",
            Self::Port => "_ovs-ports",
            Self::NmDevice => "nm-devices",
            Self::Vxlan => "vxlans",
        }
    }

    /// Inverse of [`DefType::group_key`].
    pub fn from_group_key(key: &str) -> Option<Self> {
        match key {
            "ethernets" => Some(Self::Ethernet),
            "wifis" => Some(Self::Wifi),
            "modems" => Some(Self::Modem),
            "bridges" => Some(Self::Bridge),
            "bonds" => Some(Self::Bond),
            "vlans" => Some(Self::Vlan),
            "vrfs" => Some(Self::Vrf),
            "tunnels" => Some(Self::Tunnel),
            "_ovs-ports" => Some(Self::Port),
            "nm-devices" => Some(Self::NmDevice),
            "vxlans" => Some(Self::Vxlan),
            _ => None,
        }
    }

    /// All groups in canonical emission order.
    pub fn all() -> &'static [DefType] {
        &[
            Self::Ethernet,
            Self::Wifi,
            Self::Modem,
            Self::Bridge,
            Self::Bond,
            Self::Vlan,
            Self::Vrf,
            Self::Tunnel,
            Self::Port,
            Self::NmDevice,
            Self::Vxlan,
        ]
    }

    /// NetworkManager `connection.type` token for this kind.
    pub fn nm_type(self) -> &'static str {
        match self {
            Self::Ethernet => "ethernet",
            Self::Wifi => "wifi",
            Self::Modem => "gsm",
            Self::Bridge => "bridge",
            Self::Bond => "bond",
            Self::Vlan => "vlan",
            Self::Vrf => "vrf",
            Self::Tunnel => "ip-tunnel",
            Self::Port => "ovs-port",
            Self::NmDevice => "",
            Self::Vxlan => "vxlan",
        }
    }
}

impl std::fmt::Display for DefType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ethernet => "ethernet",
            Self::Wifi => "wifi",
            Self::Modem => "modem",
            Self::Bridge => "bridge",
            Self::Bond => "bond",
            Self::Vlan => "vlan",
            Self::Vrf => "vrf",
            Self::Tunnel => "tunnel",
            Self::Port => "port",
            Self::NmDevice => "nm-device",
            Self::Vxlan => "vxlan",
        };
        write!(f, "{}", name)
    }
}

/// Downstream configuration system a definition targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Backend {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "networkd")]
    Networkd,
    #[serde(rename = "NetworkManager")]
    NetworkManager,
    #[serde(rename = "OpenVSwitch")]
    OpenVSwitch,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Networkd => "networkd",
            Self::NetworkManager => "NetworkManager",
            Self::OpenVSwitch => "OpenVSwitch",
        }
    }

    /// Get backend from a renderer hint string
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint {
            "networkd" => Some(Self::Networkd),
            "NetworkManager" => Some(Self::NetworkManager),
            "OpenVSwitch" => Some(Self::OpenVSwitch),
            _ => None,
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tunnel encapsulation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelMode {
    #[default]
    Unknown,
    Ipip,
    Gre,
    Sit,
    Isatap,
    Vti,
    Ip6ip6,
    Ipip6,
    Ip6gre,
    Vti6,
    Gretap,
    Ip6gretap,
    Wireguard,
    Vxlan,
}

impl TunnelMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Ipip => "ipip",
            Self::Gre => "gre",
            Self::Sit => "sit",
            Self::Isatap => "isatap",
            Self::Vti => "vti",
            Self::Ip6ip6 => "ip6ip6",
            Self::Ipip6 => "ipip6",
            Self::Ip6gre => "ip6gre",
            Self::Vti6 => "vti6",
            Self::Gretap => "gretap",
            Self::Ip6gretap => "ip6gretap",
            Self::Wireguard => "wireguard",
            Self::Vxlan => "vxlan",
        }
    }

    /// Modes that accept InputKey/OutputKey material.
    pub fn is_key_bearing(self) -> bool {
        matches!(
            self,
            Self::Gre
                | Self::Ip6gre
                | Self::Vti
                | Self::Vti6
                | Self::Gretap
                | Self::Ip6gretap
                | Self::Wireguard
                | Self::Vxlan
        )
    }

    /// Modes whose local/remote endpoints are IPv6 addresses.
    pub fn is_ipv6_mode(self) -> bool {
        matches!(
            self,
            Self::Ip6ip6 | Self::Ipip6 | Self::Ip6gre | Self::Vti6 | Self::Ip6gretap
        )
    }

    /// The networkd `Kind=` string for a tunnel netdev.
    pub fn networkd_kind(self) -> &'static str {
        match self {
            // ipip6 and ip6ip6 share the ip6tnl kind, distinguished by Mode=
            Self::Ipip6 | Self::Ip6ip6 => "ip6tnl",
            other => other.as_str(),
        }
    }
}

impl std::fmt::Display for TunnelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Wi-Fi station mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WifiMode {
    #[default]
    Infrastructure,
    Adhoc,
    Ap,
    Other,
}

impl WifiMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Infrastructure => "infrastructure",
            Self::Adhoc => "adhoc",
            Self::Ap => "ap",
            Self::Other => "other",
        }
    }

    /// NetworkManager `wifi.mode` token.
    pub fn nm_mode(self) -> &'static str {
        match self {
            Self::Infrastructure | Self::Other => "infrastructure",
            Self::Adhoc => "adhoc",
            Self::Ap => "ap",
        }
    }
}

/// Wi-Fi frequency band selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WifiBand {
    #[default]
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "2.4GHz")]
    Band2_4,
    #[serde(rename = "5GHz")]
    Band5,
}

/// Wi-Fi / 802.1X key management.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthKeyManagement {
    #[default]
    None,
    Psk,
    Eap,
    Sae,
    #[serde(rename = "802.1x")]
    Dot1x,
}

impl AuthKeyManagement {
    /// wpa_supplicant `key_mgmt=` token.
    pub fn wpa_key_mgmt(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Psk => "WPA-PSK",
            Self::Eap | Self::Dot1x => "WPA-EAP",
            Self::Sae => "SAE",
        }
    }
}

/// EAP inner method for 802.1X.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EapMethod {
    Tls,
    Peap,
    Ttls,
}

impl EapMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tls => "TLS",
            Self::Peap => "PEAP",
            Self::Ttls => "TTLS",
        }
    }
}

/// IPv6 interface identifier generation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddrGenMode {
    Eui64,
    StablePrivacy,
}

impl AddrGenMode {
    pub fn networkd_token(self) -> &'static str {
        match self {
            Self::Eui64 => "eui64",
            Self::StablePrivacy => "stable-privacy",
        }
    }

    /// NetworkManager encodes this as a keyfile integer.
    pub fn nm_token(self) -> &'static str {
        match self {
            Self::Eui64 => "0",
            Self::StablePrivacy => "1",
        }
    }
}

/// InfiniBand transport mode (modems and IB devices).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InfinibandMode {
    Datagram,
    Connected,
}

/// Router-advertisement acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcceptRa {
    /// Defer to the kernel default
    #[default]
    Kernel,
    Enabled,
    Disabled,
}

/// Wake-on-LAN trigger flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WowlanFlag {
    Any,
    Disconnect,
    MagicPkt,
    GtkRekeyFailure,
    EapIdentityReq,
    FourWayHandshake,
    RfkillRelease,
    Tcp,
    Default,
}

impl WowlanFlag {
    /// The YAML spelling, which is also the wpa_supplicant
    /// `wowlan_triggers` token.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Disconnect => "disconnect",
            Self::MagicPkt => "magic_pkt",
            Self::GtkRekeyFailure => "gtk_rekey_failure",
            Self::EapIdentityReq => "eap_identity_req",
            Self::FourWayHandshake => "four_way_handshake",
            Self::RfkillRelease => "rfkill_release",
            Self::Tcp => "tcp",
            Self::Default => "default",
        }
    }
}

/// Address classes an interface may omit while still counting as online.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptionalAddressFlag {
    Ipv4Ll,
    Ipv6Ra,
    Dhcp4,
    Dhcp6,
    Static,
}

impl OptionalAddressFlag {
    /// networkd `OptionalAddresses=` token.
    pub fn networkd_token(self) -> &'static str {
        match self {
            Self::Ipv4Ll => "ipv4ll",
            Self::Ipv6Ra => "ipv6ra",
            Self::Dhcp4 => "dhcp4",
            Self::Dhcp6 => "dhcp6",
            Self::Static => "static",
        }
    }

    /// The YAML spelling of the flag.
    pub fn yaml_token(self) -> &'static str {
        match self {
            Self::Ipv4Ll => "ipv4-ll",
            Self::Ipv6Ra => "ipv6-ra",
            Self::Dhcp4 => "dhcp4",
            Self::Dhcp6 => "dhcp6",
            Self::Static => "static",
        }
    }
}

/// A value in {unset, false, true}; unset defers to the backend default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tristate {
    #[default]
    Unset,
    False,
    True,
}

impl Tristate {
    pub fn is_set(self) -> bool {
        self != Self::Unset
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Unset => None,
            Self::False => Some(false),
            Self::True => Some(true),
        }
    }
}

impl From<Option<bool>> for Tristate {
    fn from(v: Option<bool>) -> Self {
        match v {
            None => Self::Unset,
            Some(false) => Self::False,
            Some(true) => Self::True,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_def_type_groups_round_trip() {
        for t in DefType::all() {
            assert_eq!(DefType::from_group_key(t.group_key()), Some(*t));
        }
    }

    #[test]
    fn test_physical_threshold() {
        assert!(DefType::Ethernet.is_physical());
        assert!(DefType::Wifi.is_physical());
        assert!(DefType::Modem.is_physical());
        assert!(DefType::Bridge.is_virtual());
        assert!(DefType::Vxlan.is_virtual());
    }

    #[test]
    fn test_backend_hint() {
        assert_eq!(Backend::from_hint("networkd"), Some(Backend::Networkd));
        assert_eq!(
            Backend::from_hint("NetworkManager"),
            Some(Backend::NetworkManager)
        );
        assert_eq!(Backend::from_hint("networkmanager"), None);
    }

    #[test]
    fn test_tunnel_mode_helpers() {
        assert!(TunnelMode::Gre.is_key_bearing());
        assert!(!TunnelMode::Ipip.is_key_bearing());
        assert!(TunnelMode::Ip6gre.is_ipv6_mode());
        assert_eq!(TunnelMode::Ipip6.networkd_kind(), "ip6tnl");
        assert_eq!(TunnelMode::Gre.networkd_kind(), "gre");
    }

    #[test]
    fn test_tristate_default_unset() {
        assert_eq!(Tristate::default(), Tristate::Unset);
        assert_eq!(Tristate::from(Some(true)).as_bool(), Some(true));
        assert_eq!(Tristate::Unset.as_bool(), None);
    }

    #[test]
    fn test_band_serde_tokens() {
        let band: WifiBand = serde_yaml::from_str("\"2.4GHz\"").unwrap();
        assert_eq!(band, WifiBand::Band2_4);
        let band: WifiBand = serde_yaml::from_str("5GHz").unwrap();
        assert_eq!(band, WifiBand::Band5);
    }
}
