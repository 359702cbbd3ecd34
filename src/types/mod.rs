//! Typed intermediate representation of netplan definitions.
//!
//! A [`NetDef`] is the union of every recognized per-definition key across
//! all definition types. The parser deserializes the merged YAML for one
//! definition straight into this struct and then fills in the metadata
//! fields (`id`, `def_type`, origin); the validator enforces which keys are
//! meaningful for which type.

pub mod ovs;
pub mod route;
pub mod scalars;

pub use ovs::{OVS_BOND_MODES, OvsController, OvsSettings, OvsSsl, is_valid_controller_target};
pub use route::{
    Family, IpRule, ROUTE_METRIC_UNSPEC, ROUTE_TABLE_MAIN, ROUTE_TABLE_UNSPEC, Route,
    WireguardPeer, WireguardPeerKeys, is_valid_wireguard_key,
};

use crate::names::{
    AcceptRa, AddrGenMode, AuthKeyManagement, Backend, DefType, EapMethod, InfinibandMode,
    OptionalAddressFlag, Tristate, TunnelMode, WifiBand, WifiMode, WowlanFlag,
};
use scalars::{scalar_string_option, string_or_seq, yaml_bool_option};
use serde::Deserialize;
use serde::de::{Error as DeError, Visitor};
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

/// Interface matching block for physical devices.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct MatchConfig {
    /// fnmatch-style glob on the kernel interface name
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub macaddress: Option<String>,
    /// One driver glob or a list of driver globs
    #[serde(default, deserialize_with = "string_or_seq")]
    pub driver: Vec<String>,
}

impl MatchConfig {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.macaddress.is_none() && self.driver.is_empty()
    }
}

/// Nameserver configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct NameserverConfig {
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub search: Vec<String>,
}

/// Per-address options for the long address form.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AddressOptions {
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub lifetime: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

/// One entry of the ordered `addresses:` sequence. YAML allows a bare
/// CIDR string or a single-key mapping carrying options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddressEntry {
    pub address: String,
    pub options: Option<AddressOptions>,
}

impl AddressEntry {
    pub fn family(&self) -> Option<Family> {
        Family::of_address(&self.address)
    }
}

impl<'de> Deserialize<'de> for AddressEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct EntryVisitor;

        impl<'de> Visitor<'de> for EntryVisitor {
            type Value = AddressEntry;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("address string or {address: {lifetime, label}}")
            }

            fn visit_str<E: DeError>(self, v: &str) -> Result<Self::Value, E> {
                Ok(AddressEntry {
                    address: v.to_string(),
                    options: None,
                })
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::MapAccess<'de>,
            {
                let (address, options): (String, AddressOptions) = match map.next_entry()? {
                    Some(pair) => pair,
                    None => return Err(DeError::custom("empty address mapping")),
                };
                if map.next_key::<String>()?.is_some() {
                    return Err(DeError::custom(
                        "address mapping must contain exactly one address",
                    ));
                }
                Ok(AddressEntry {
                    address,
                    options: Some(options),
                })
            }
        }

        deserializer.deserialize_any(EntryVisitor)
    }
}

/// `use-domains` accepts a boolean or the string `route`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseDomains {
    Enabled,
    Disabled,
    RouteOnly,
}

impl<'de> Deserialize<'de> for UseDomains {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct UseDomainsVisitor;

        impl Visitor<'_> for UseDomainsVisitor {
            type Value = UseDomains;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("boolean or \"route\"")
            }

            fn visit_bool<E: DeError>(self, v: bool) -> Result<Self::Value, E> {
                Ok(if v {
                    UseDomains::Enabled
                } else {
                    UseDomains::Disabled
                })
            }

            fn visit_str<E: DeError>(self, v: &str) -> Result<Self::Value, E> {
                match v {
                    "route" => Ok(UseDomains::RouteOnly),
                    "true" | "yes" | "on" => Ok(UseDomains::Enabled),
                    "false" | "no" | "off" => Ok(UseDomains::Disabled),
                    other => Err(DeError::custom(format!(
                        "invalid use-domains value '{other}'"
                    ))),
                }
            }
        }

        deserializer.deserialize_any(UseDomainsVisitor)
    }
}

/// Per-family DHCP behavior overrides.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DhcpOverrides {
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub use_dns: Option<bool>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub use_ntp: Option<bool>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub use_mtu: Option<bool>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub use_routes: Option<bool>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub use_hostname: Option<bool>,
    #[serde(default)]
    pub use_domains: Option<UseDomains>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub send_hostname: Option<bool>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub route_metric: Option<u32>,
}

impl DhcpOverrides {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// 802.1X / WPA authentication parameters.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AuthConfig {
    #[serde(default)]
    pub key_management: Option<AuthKeyManagement>,
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub password: Option<String>,
    #[serde(default)]
    pub method: Option<EapMethod>,
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub anonymous_identity: Option<String>,
    #[serde(default)]
    pub ca_certificate: Option<String>,
    #[serde(default)]
    pub client_certificate: Option<String>,
    #[serde(default)]
    pub client_key: Option<String>,
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub client_key_password: Option<String>,
    #[serde(default)]
    pub phase2_auth: Option<String>,
}

impl AuthConfig {
    /// 802.1X involvement beyond a plain PSK.
    pub fn is_eap(&self) -> bool {
        matches!(
            self.key_management,
            Some(AuthKeyManagement::Eap) | Some(AuthKeyManagement::Dot1x)
        ) || self.method.is_some()
    }
}

/// NetworkManager-specific settings of a definition or access point.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct NmBackendSettings {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub uuid: Option<Uuid>,
    #[serde(default)]
    pub stable_id: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
    /// Opaque `<group>.<key>` entries preserved verbatim for the keyfile
    #[serde(default)]
    pub passthrough: BTreeMap<String, String>,
}

impl NmBackendSettings {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// networkd-specific settings of a definition.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct NetworkdBackendSettings {
    #[serde(default)]
    pub unit: Option<String>,
}

/// Per-backend settings union, selected by the definition's effective
/// backend at import time.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendSettings {
    NetworkManager(NmBackendSettings),
    Networkd(NetworkdBackendSettings),
}

/// One Wi-Fi access point, keyed by SSID on the definition.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AccessPoint {
    /// Filled from the mapping key
    #[serde(skip)]
    pub ssid: String,
    #[serde(default)]
    pub bssid: Option<String>,
    #[serde(default)]
    pub band: Option<WifiBand>,
    #[serde(default)]
    pub channel: Option<u32>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub hidden: Option<bool>,
    #[serde(default)]
    pub mode: WifiMode,
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub password: Option<String>,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub networkmanager: Option<NmBackendSettings>,
}

impl AccessPoint {
    /// The effective auth block: an `auth:` mapping, or the shorthand
    /// `password:` which implies WPA-PSK.
    pub fn effective_auth(&self) -> Option<AuthConfig> {
        if let Some(auth) = &self.auth {
            let mut auth = auth.clone();
            if auth.key_management.is_none() {
                auth.key_management = Some(if auth.password.is_some() || self.password.is_some() {
                    AuthKeyManagement::Psk
                } else {
                    AuthKeyManagement::None
                });
            }
            if auth.password.is_none() {
                auth.password = self.password.clone();
            }
            Some(auth)
        } else {
            self.password.as_ref().map(|pw| AuthConfig {
                key_management: Some(AuthKeyManagement::Psk),
                password: Some(pw.clone()),
                ..Default::default()
            })
        }
    }
}

/// Tunnel key material: `keys:` mapping form.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TunnelKeys {
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub input: Option<String>,
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub output: Option<String>,
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub private: Option<String>,
}

/// Bond `parameters:` block.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BondParams {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub lacp_rate: Option<String>,
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub mii_monitor_interval: Option<String>,
    #[serde(default)]
    pub min_links: Option<u32>,
    #[serde(default)]
    pub transmit_hash_policy: Option<String>,
    #[serde(default)]
    pub ad_select: Option<String>,
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub arp_interval: Option<String>,
    #[serde(default)]
    pub arp_ip_targets: Vec<String>,
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub up_delay: Option<String>,
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub down_delay: Option<String>,
    #[serde(default)]
    pub fail_over_mac_policy: Option<String>,
    #[serde(default)]
    pub gratuitous_arp: Option<u32>,
    #[serde(default)]
    pub packets_per_slave: Option<u32>,
    #[serde(default)]
    pub primary_reselect_policy: Option<String>,
    #[serde(default)]
    pub resend_igmp: Option<u32>,
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub learn_packet_interval: Option<String>,
    #[serde(default)]
    pub primary: Option<String>,
}

/// Bridge `parameters:` block.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BridgeParams {
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub ageing_time: Option<String>,
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default)]
    pub port_priority: BTreeMap<String, u8>,
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub forward_delay: Option<String>,
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub hello_time: Option<String>,
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub max_age: Option<String>,
    #[serde(default)]
    pub path_cost: BTreeMap<String, u32>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub stp: Option<bool>,
}

/// One named network definition: the unit of configuration.
///
/// Deserialized from the merged YAML mapping for one id; holds the union of
/// recognized keys. Which keys are valid for which [`DefType`] is enforced
/// by the validator, not the deserializer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct NetDef {
    // Metadata, not part of the YAML mapping
    #[serde(skip)]
    pub id: String,
    #[serde(skip)]
    pub def_type: Option<DefType>,
    /// Effective backend, resolved at import
    #[serde(skip)]
    pub backend: Backend,
    /// Last YAML file that wrote to this definition
    #[serde(skip)]
    pub filepath: Option<PathBuf>,
    /// Stable identifier for NetworkManager, generated or imported
    #[serde(skip)]
    pub uuid: Option<Uuid>,
    /// Set when any VLAN names this definition as its link
    #[serde(skip)]
    pub has_vlans: bool,
    /// Set when this definition is an SR-IOV physical function
    #[serde(skip)]
    pub is_sriov_pf: bool,
    /// Bridge this definition is a member of (adopted from `interfaces:`)
    #[serde(skip)]
    pub bridge: Option<String>,
    /// Bond this definition is a member of
    #[serde(skip)]
    pub bond: Option<String>,
    /// VRF this definition is a member of
    #[serde(skip)]
    pub vrf: Option<String>,
    /// Bond or bridge parameters, lifted from `parameters:` per type
    #[serde(skip)]
    pub bond_params: Option<BondParams>,
    #[serde(skip)]
    pub bridge_params: Option<BridgeParams>,

    // Common keys
    #[serde(default)]
    pub renderer: Option<Backend>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub dhcp4: Option<bool>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub dhcp6: Option<bool>,
    #[serde(default)]
    pub dhcp4_overrides: Option<DhcpOverrides>,
    #[serde(default)]
    pub dhcp6_overrides: Option<DhcpOverrides>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub accept_ra: Option<bool>,
    /// DHCPv4 client identifier kind: `duid` (default) or `mac`
    #[serde(default)]
    pub dhcp_identifier: Option<String>,
    #[serde(default)]
    pub addresses: Vec<AddressEntry>,
    #[serde(default)]
    pub ipv6_address_generation: Option<AddrGenMode>,
    #[serde(default)]
    pub ipv6_address_token: Option<String>,
    #[serde(default)]
    pub gateway4: Option<String>,
    #[serde(default)]
    pub gateway6: Option<String>,
    #[serde(default)]
    pub nameservers: Option<NameserverConfig>,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub routing_policy: Vec<IpRule>,
    #[serde(default)]
    pub mtu: Option<u32>,
    #[serde(default)]
    pub ipv6_mtu: Option<u32>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub ipv6_privacy: Option<bool>,
    #[serde(default)]
    pub link_local: Option<Vec<String>>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub critical: Option<bool>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub optional: Option<bool>,
    #[serde(default)]
    pub optional_addresses: Vec<OptionalAddressFlag>,

    // Physical device keys
    #[serde(default, rename = "match")]
    pub match_config: Option<MatchConfig>,
    #[serde(default)]
    pub set_name: Option<String>,
    #[serde(default)]
    pub macaddress: Option<String>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub wakeonlan: Option<bool>,
    #[serde(default)]
    pub wakeonwlan: Vec<WowlanFlag>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub emit_lldp: Option<bool>,
    #[serde(default)]
    pub regulatory_domain: Option<String>,
    #[serde(default)]
    pub infiniband_mode: Option<InfinibandMode>,

    // Offload tri-states (unset / false / true)
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub receive_checksum_offload: Option<bool>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub transmit_checksum_offload: Option<bool>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub tcp_segmentation_offload: Option<bool>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub tcp6_segmentation_offload: Option<bool>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub generic_segmentation_offload: Option<bool>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub generic_receive_offload: Option<bool>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub large_receive_offload: Option<bool>,

    // SR-IOV
    #[serde(default)]
    pub virtual_function_count: Option<u32>,
    #[serde(default)]
    pub embedded_switch_mode: Option<String>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub delay_virtual_functions_rebind: Option<bool>,

    // Wi-Fi and wired 802.1X
    #[serde(default)]
    pub access_points: Option<BTreeMap<String, AccessPoint>>,
    #[serde(default)]
    pub auth: Option<AuthConfig>,

    // Modem
    #[serde(default)]
    pub apn: Option<String>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub auto_config: Option<bool>,
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub device_id: Option<String>,
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub network_id: Option<String>,
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub number: Option<String>,
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub password: Option<String>,
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub pin: Option<String>,
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub sim_id: Option<String>,
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub sim_operator_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,

    // Virtual device keys
    /// VLAN id or VXLAN VNI
    #[serde(default, rename = "id")]
    pub tag_id: Option<u64>,
    /// VLAN/VXLAN parent or SR-IOV physical function
    #[serde(default)]
    pub link: Option<String>,
    /// Member declarations on bridges, bonds and VRFs
    #[serde(default)]
    pub interfaces: Vec<String>,
    /// Raw bond/bridge parameters; lifted per type after merge
    #[serde(default)]
    pub parameters: Option<serde_yaml::Value>,
    /// OVS patch port peer
    #[serde(default)]
    pub peer: Option<String>,
    /// VRF routing table
    #[serde(default)]
    pub table: Option<u32>,

    // Tunnels
    #[serde(default)]
    pub mode: Option<TunnelMode>,
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub local: Option<String>,
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub remote: Option<String>,
    #[serde(default, deserialize_with = "scalar_string_option")]
    pub key: Option<String>,
    #[serde(default)]
    pub keys: Option<TunnelKeys>,
    #[serde(default)]
    pub ttl: Option<u32>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub flow_label: Option<u32>,
    #[serde(default, deserialize_with = "yaml_bool_option")]
    pub mac_learning: Option<bool>,
    #[serde(default)]
    pub peers: Vec<WireguardPeer>,

    // Backend-specific settings
    #[serde(default)]
    pub openvswitch: Option<OvsSettings>,
    #[serde(default)]
    pub networkmanager: Option<NmBackendSettings>,
    #[serde(default)]
    pub networkd: Option<NetworkdBackendSettings>,
}

impl NetDef {
    /// Definition type; defaults to ethernet until the parser assigns it.
    pub fn def_type(&self) -> DefType {
        self.def_type.unwrap_or(DefType::Ethernet)
    }

    pub fn is_physical(&self) -> bool {
        self.def_type().is_physical()
    }

    /// Whether a match block with content is present.
    pub fn has_match(&self) -> bool {
        self.match_config.as_ref().is_some_and(|m| !m.is_empty())
    }

    /// Router-advertisement tri-mode: kernel default when unset.
    pub fn accept_ra(&self) -> AcceptRa {
        match self.accept_ra {
            None => AcceptRa::Kernel,
            Some(true) => AcceptRa::Enabled,
            Some(false) => AcceptRa::Disabled,
        }
    }

    /// Link-local address families. Without an explicit `link-local:` no
    /// family is requested.
    pub fn linklocal(&self) -> (bool, bool) {
        match &self.link_local {
            None => (false, false),
            Some(families) => (
                families.iter().any(|f| f == "ipv4"),
                families.iter().any(|f| f == "ipv6"),
            ),
        }
    }

    /// Whether this definition is a bridge or bond member.
    pub fn is_member(&self) -> bool {
        self.bridge.is_some() || self.bond.is_some()
    }

    /// Private key of a WireGuard tunnel (`keys.private`, or `key`).
    pub fn wireguard_private_key(&self) -> Option<&str> {
        self.keys
            .as_ref()
            .and_then(|k| k.private.as_deref())
            .or(self.key.as_deref())
    }

    /// Input key for key-bearing tunnels (`keys.input`, or `key`).
    pub fn tunnel_input_key(&self) -> Option<&str> {
        self.keys
            .as_ref()
            .and_then(|k| k.input.as_deref())
            .or(self.key.as_deref())
    }

    /// Output key for key-bearing tunnels (`keys.output`, or `key`).
    pub fn tunnel_output_key(&self) -> Option<&str> {
        self.keys
            .as_ref()
            .and_then(|k| k.output.as_deref())
            .or(self.key.as_deref())
    }

    /// The backend-settings arm matching the effective backend.
    pub fn backend_settings(&self) -> Option<BackendSettings> {
        match self.backend {
            Backend::NetworkManager => self
                .networkmanager
                .clone()
                .map(BackendSettings::NetworkManager),
            Backend::Networkd => self.networkd.clone().map(BackendSettings::Networkd),
            _ => None,
        }
    }

    /// Whether any SR-IOV feature is requested on this definition.
    pub fn uses_sriov(&self) -> bool {
        self.virtual_function_count.is_some()
            || self.embedded_switch_mode.is_some()
            || self.delay_virtual_functions_rebind == Some(true)
            || self.sriov_vf_link().is_some()
    }

    /// `link:` interpreted as an SR-IOV PF reference (physical types only).
    pub fn sriov_vf_link(&self) -> Option<&str> {
        if self.is_physical() {
            self.link.as_deref()
        } else {
            None
        }
    }

    /// `link:` interpreted as a VLAN/VXLAN parent reference.
    pub fn vlan_link(&self) -> Option<&str> {
        if matches!(self.def_type(), DefType::Vlan | DefType::Vxlan) {
            self.link.as_deref()
        } else {
            None
        }
    }

    /// True when any stateless or stateful address acquisition is on.
    pub fn has_addressing(&self) -> bool {
        self.dhcp4 == Some(true)
            || self.dhcp6 == Some(true)
            || !self.addresses.is_empty()
            || self.accept_ra() == AcceptRa::Enabled
    }

    /// The seven offload options, paired with their networkd `[Link]`
    /// keys. Unset entries defer to the driver default.
    pub fn offloads(&self) -> [(&'static str, Tristate); 7] {
        [
            ("ReceiveChecksumOffload", self.receive_checksum_offload.into()),
            ("TransmitChecksumOffload", self.transmit_checksum_offload.into()),
            ("TCPSegmentationOffload", self.tcp_segmentation_offload.into()),
            ("TCP6SegmentationOffload", self.tcp6_segmentation_offload.into()),
            (
                "GenericSegmentationOffload",
                self.generic_segmentation_offload.into(),
            ),
            ("GenericReceiveOffload", self.generic_receive_offload.into()),
            ("LargeReceiveOffload", self.large_receive_offload.into()),
        ]
    }

    /// Whether this definition or any of its access points needs 802.1X.
    pub fn needs_eap(&self) -> bool {
        self.auth.as_ref().is_some_and(AuthConfig::is_eap)
            || self
                .access_points
                .iter()
                .flat_map(|aps| aps.values())
                .any(|ap| ap.effective_auth().is_some_and(|a| a.is_eap()))
    }

    /// Whether wpa_supplicant has to be started for this definition.
    pub fn needs_wpa(&self) -> bool {
        self.def_type() == DefType::Wifi || self.needs_eap()
    }
}
