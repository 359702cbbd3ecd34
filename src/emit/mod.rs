//! Canonical YAML emission.
//!
//! Serializes a [`State`] (or a single definition) back to YAML with a
//! stable layout: block style throughout, a fixed key order per definition
//! type, and a fixed quoting rule — identifiers, enum tokens and numbers
//! are plain; free-form strings (names, passwords, SSIDs, MACs, UUIDs,
//! addresses) are double-quoted. The layout is part of the contract so
//! that repeated dumps diff minimally.

use crate::NetplanError;
use crate::names::{Backend, DefType};
use crate::state::State;
use crate::types::ovs::OvsSettings;
use crate::types::{
    AccessPoint, AuthConfig, BondParams, BridgeParams, DhcpOverrides, NetDef, UseDomains,
};
use std::fmt::Write as _;
use std::io::Write;

/// One node of the canonical output tree. Built by the per-type emitters,
/// which decide quoting; the writer below only handles layout.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Unquoted scalar: identifiers, enum tokens, numbers, booleans
    Plain(String),
    /// Double-quoted scalar: free-form strings
    Quoted(String),
    Seq(Vec<Node>),
    Map(Vec<(String, Node)>),
}

impl Node {
    fn plain(value: impl ToString) -> Self {
        Self::Plain(value.to_string())
    }

    fn quoted(value: impl AsRef<str>) -> Self {
        Self::Quoted(value.as_ref().to_string())
    }

    fn boolean(value: bool) -> Self {
        Self::Plain(value.to_string())
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Seq(items) => items.is_empty(),
            Self::Map(entries) => entries.is_empty(),
            _ => false,
        }
    }
}

/// Helper building a `Node::Map` while skipping unset fields.
#[derive(Debug, Default)]
struct MapBuilder {
    entries: Vec<(String, Node)>,
}

impl MapBuilder {
    fn push(&mut self, key: &str, node: Node) {
        if !node.is_empty() {
            self.entries.push((key.to_string(), node));
        }
    }

    fn push_opt(&mut self, key: &str, node: Option<Node>) {
        if let Some(node) = node {
            self.push(key, node);
        }
    }

    fn push_bool(&mut self, key: &str, value: Option<bool>) {
        self.push_opt(key, value.map(Node::boolean));
    }

    fn push_num<N: ToString>(&mut self, key: &str, value: Option<N>) {
        self.push_opt(key, value.map(Node::plain));
    }

    fn push_plain(&mut self, key: &str, value: Option<&str>) {
        self.push_opt(key, value.map(Node::plain));
    }

    fn push_quoted(&mut self, key: &str, value: Option<&str>) {
        self.push_opt(key, value.map(Node::quoted));
    }

    /// Record a key whose value is an intentionally empty mapping (which
    /// `push` would otherwise drop).
    fn push_empty_map(&mut self, key: &str) {
        self.entries.push((key.to_string(), Node::Map(Vec::new())));
    }

    fn build(self) -> Node {
        Node::Map(self.entries)
    }
}

fn quoted_seq<'a>(items: impl IntoIterator<Item = &'a String>) -> Node {
    Node::Seq(items.into_iter().map(Node::quoted).collect())
}

fn plain_seq<'a>(items: impl IntoIterator<Item = &'a String>) -> Node {
    Node::Seq(items.into_iter().map(Node::plain).collect())
}

/// Serialize a whole state.
pub fn dump_state(state: &State, mut writer: impl Write) -> Result<(), NetplanError> {
    let mut network = MapBuilder::default();
    network.push("version", Node::plain(2));
    if state.backend() != Backend::None {
        network.push("renderer", Node::plain(state.backend()));
    }

    for def_type in DefType::all() {
        let mut group = MapBuilder::default();
        for def in state.netdefs_by_type(*def_type) {
            group.push(&def.id, netdef_node(def));
        }
        let group = group.build();
        if !group.is_empty() {
            network.push(def_type.group_key(), group);
        }
    }

    if state.global_ovs().is_nondefault() {
        network.push("openvswitch", ovs_node(state.global_ovs()));
    }

    let mut root = MapBuilder::default();
    root.push("network", network.build());
    write_document(&root.build(), &mut writer)
}

/// Serialize a single definition as a full `network:` document.
pub fn dump_netdef_document(def: &NetDef, mut writer: impl Write) -> Result<(), NetplanError> {
    let mut group = MapBuilder::default();
    group.push(&def.id, netdef_node(def));
    let mut network = MapBuilder::default();
    network.push("version", Node::plain(2));
    network.push(def.def_type().group_key(), group.build());
    let mut root = MapBuilder::default();
    root.push("network", network.build());
    write_document(&root.build(), &mut writer)
}

/// Canonical mapping for one definition. The key order here is the
/// emission contract.
pub fn netdef_node(def: &NetDef) -> Node {
    let mut map = MapBuilder::default();

    map.push_opt(
        "renderer",
        def.renderer.map(|backend| Node::plain(backend)),
    );

    // Match and identity
    if let Some(match_config) = &def.match_config {
        let mut m = MapBuilder::default();
        m.push_quoted("name", match_config.name.as_deref());
        m.push_quoted("macaddress", match_config.macaddress.as_deref());
        match match_config.driver.len() {
            0 => {}
            1 => m.push("driver", Node::quoted(&match_config.driver[0])),
            _ => m.push("driver", quoted_seq(&match_config.driver)),
        }
        map.push("match", m.build());
    }
    map.push_quoted("set-name", def.set_name.as_deref());
    map.push_quoted("macaddress", def.macaddress.as_deref());
    map.push_bool("wakeonlan", def.wakeonlan);
    if !def.wakeonwlan.is_empty() {
        map.push(
            "wakeonwlan",
            Node::Seq(
                def.wakeonwlan
                    .iter()
                    .map(|f| Node::plain(f.as_str()))
                    .collect(),
            ),
        );
    }
    map.push_bool("emit-lldp", def.emit_lldp);
    map.push_num("mtu", def.mtu);
    map.push_num("ipv6-mtu", def.ipv6_mtu);
    map.push_bool("optional", def.optional);
    if !def.optional_addresses.is_empty() {
        map.push(
            "optional-addresses",
            Node::Seq(
                def.optional_addresses
                    .iter()
                    .map(|f| Node::plain(f.yaml_token()))
                    .collect(),
            ),
        );
    }
    map.push_bool("critical", def.critical);

    // Addressing
    map.push_bool("dhcp4", def.dhcp4);
    map.push_bool("dhcp6", def.dhcp6);
    map.push_opt(
        "dhcp4-overrides",
        def.dhcp4_overrides.as_ref().map(dhcp_overrides_node),
    );
    map.push_opt(
        "dhcp6-overrides",
        def.dhcp6_overrides.as_ref().map(dhcp_overrides_node),
    );
    map.push_bool("accept-ra", def.accept_ra);
    map.push_plain("dhcp-identifier", def.dhcp_identifier.as_deref());
    if let Some(families) = &def.link_local {
        map.push("link-local", plain_seq(families));
    }
    if !def.addresses.is_empty() {
        let items = def
            .addresses
            .iter()
            .map(|entry| match &entry.options {
                None => Node::quoted(&entry.address),
                Some(opts) => {
                    let mut o = MapBuilder::default();
                    o.push_plain("lifetime", opts.lifetime.as_deref());
                    o.push_quoted("label", opts.label.as_deref());
                    Node::Map(vec![(entry.address.clone(), o.build())])
                }
            })
            .collect();
        map.push("addresses", Node::Seq(items));
    }
    map.push_opt(
        "ipv6-address-generation",
        def.ipv6_address_generation
            .map(|mode| Node::plain(mode.networkd_token())),
    );
    map.push_quoted("ipv6-address-token", def.ipv6_address_token.as_deref());
    map.push_quoted("gateway4", def.gateway4.as_deref());
    map.push_quoted("gateway6", def.gateway6.as_deref());
    if let Some(ns) = &def.nameservers {
        let mut n = MapBuilder::default();
        n.push("addresses", quoted_seq(&ns.addresses));
        n.push("search", quoted_seq(&ns.search));
        map.push("nameservers", n.build());
    }
    if !def.routes.is_empty() {
        map.push(
            "routes",
            Node::Seq(def.routes.iter().map(route_node).collect()),
        );
    }
    if !def.routing_policy.is_empty() {
        map.push(
            "routing-policy",
            Node::Seq(def.routing_policy.iter().map(rule_node).collect()),
        );
    }
    map.push_bool("ipv6-privacy", def.ipv6_privacy);

    // Physical extras
    map.push_quoted("regulatory-domain", def.regulatory_domain.as_deref());
    map.push_opt(
        "infiniband-mode",
        def.infiniband_mode.map(|mode| {
            Node::plain(match mode {
                crate::names::InfinibandMode::Datagram => "datagram",
                crate::names::InfinibandMode::Connected => "connected",
            })
        }),
    );
    map.push_bool("receive-checksum-offload", def.receive_checksum_offload);
    map.push_bool("transmit-checksum-offload", def.transmit_checksum_offload);
    map.push_bool("tcp-segmentation-offload", def.tcp_segmentation_offload);
    map.push_bool("tcp6-segmentation-offload", def.tcp6_segmentation_offload);
    map.push_bool(
        "generic-segmentation-offload",
        def.generic_segmentation_offload,
    );
    map.push_bool("generic-receive-offload", def.generic_receive_offload);
    map.push_bool("large-receive-offload", def.large_receive_offload);
    map.push_num("virtual-function-count", def.virtual_function_count);
    map.push_plain("embedded-switch-mode", def.embedded_switch_mode.as_deref());
    map.push_bool(
        "delay-virtual-functions-rebind",
        def.delay_virtual_functions_rebind,
    );

    // Wi-Fi
    if let Some(aps) = &def.access_points {
        let mut group = MapBuilder::default();
        for (ssid, ap) in aps {
            group.entries.push((ssid.clone(), access_point_node(ap)));
        }
        map.push("access-points", group.build());
    }

    if let Some(auth) = &def.auth {
        map.push("auth", auth_node(auth));
    }

    // Modem
    map.push_quoted("apn", def.apn.as_deref());
    map.push_bool("auto-config", def.auto_config);
    map.push_quoted("device-id", def.device_id.as_deref());
    map.push_quoted("network-id", def.network_id.as_deref());
    map.push_quoted("number", def.number.as_deref());
    map.push_quoted("password", def.password.as_deref());
    map.push_quoted("pin", def.pin.as_deref());
    map.push_quoted("sim-id", def.sim_id.as_deref());
    map.push_quoted("sim-operator-id", def.sim_operator_id.as_deref());
    map.push_quoted("username", def.username.as_deref());

    // Virtual device links
    map.push_num("id", def.tag_id);
    map.push_plain("link", def.link.as_deref());
    map.push("interfaces", plain_seq(&def.interfaces));
    if let Some(params) = &def.bond_params {
        map.push("parameters", bond_params_node(params));
    }
    if let Some(params) = &def.bridge_params {
        map.push("parameters", bridge_params_node(params));
    }
    map.push_plain("peer", def.peer.as_deref());
    map.push_num("table", def.table);

    // Tunnels
    map.push_opt("mode", def.mode.map(|mode| Node::plain(mode)));
    map.push_quoted("local", def.local.as_deref());
    map.push_quoted("remote", def.remote.as_deref());
    map.push_quoted("key", def.key.as_deref());
    if let Some(keys) = &def.keys {
        let mut k = MapBuilder::default();
        k.push_quoted("input", keys.input.as_deref());
        k.push_quoted("output", keys.output.as_deref());
        k.push_quoted("private", keys.private.as_deref());
        map.push("keys", k.build());
    }
    map.push_num("ttl", def.ttl);
    map.push_num("port", def.port);
    map.push_num("flow-label", def.flow_label);
    map.push_bool("mac-learning", def.mac_learning);
    if !def.peers.is_empty() {
        let items = def
            .peers
            .iter()
            .map(|peer| {
                let mut p = MapBuilder::default();
                p.push_quoted("endpoint", peer.endpoint.as_deref());
                let mut k = MapBuilder::default();
                k.push_quoted("public", peer.keys.public.as_deref());
                k.push_quoted("shared", peer.keys.shared.as_deref());
                p.push("keys", k.build());
                p.push("allowed-ips", quoted_seq(&peer.allowed_ips));
                p.push_num("keepalive", peer.keepalive);
                p.build()
            })
            .collect();
        map.push("peers", Node::Seq(items));
    }

    // Backend settings
    if let Some(ovs) = &def.openvswitch {
        let node = ovs_node(ovs);
        if node.is_empty() {
            // An empty block is still meaningful: it selects the backend
            map.push_empty_map("openvswitch");
        } else {
            map.push("openvswitch", node);
        }
    }
    if let Some(nm) = &def.networkmanager {
        let mut n = MapBuilder::default();
        n.push_quoted("name", nm.name.as_deref());
        n.push_opt("uuid", nm.uuid.map(|u| Node::quoted(u.to_string())));
        n.push_quoted("stable-id", nm.stable_id.as_deref());
        n.push_quoted("device", nm.device.as_deref());
        if !nm.passthrough.is_empty() {
            let mut p = MapBuilder::default();
            for (key, value) in &nm.passthrough {
                p.push(key, Node::quoted(value));
            }
            n.push("passthrough", p.build());
        }
        map.push("networkmanager", n.build());
    }
    if let Some(networkd) = &def.networkd {
        let mut n = MapBuilder::default();
        n.push_quoted("unit", networkd.unit.as_deref());
        map.push("networkd", n.build());
    }

    map.build()
}

fn dhcp_overrides_node(overrides: &DhcpOverrides) -> Node {
    let mut map = MapBuilder::default();
    map.push_bool("use-dns", overrides.use_dns);
    map.push_bool("use-ntp", overrides.use_ntp);
    map.push_bool("use-mtu", overrides.use_mtu);
    map.push_bool("use-routes", overrides.use_routes);
    map.push_bool("use-hostname", overrides.use_hostname);
    map.push_opt(
        "use-domains",
        overrides.use_domains.map(|d| match d {
            UseDomains::Enabled => Node::boolean(true),
            UseDomains::Disabled => Node::boolean(false),
            UseDomains::RouteOnly => Node::plain("route"),
        }),
    );
    map.push_bool("send-hostname", overrides.send_hostname);
    map.push_quoted("hostname", overrides.hostname.as_deref());
    map.push_num("route-metric", overrides.route_metric);
    map.build()
}

fn route_node(route: &crate::types::Route) -> Node {
    let mut map = MapBuilder::default();
    map.push_quoted("from", route.from.as_deref());
    map.push_quoted("to", route.to.as_deref());
    map.push_quoted("via", route.via.as_deref());
    map.push_plain("type", route.rtype.as_deref());
    map.push_plain("scope", route.scope.as_deref());
    map.push_num("table", route.table);
    map.push_num("metric", route.metric);
    map.push_bool("on-link", route.on_link);
    map.push_num("mtu", route.mtu);
    map.push_num("congestion-window", route.congestion_window);
    map.push_num(
        "advertised-receive-window",
        route.advertised_receive_window,
    );
    map.build()
}

fn rule_node(rule: &crate::types::IpRule) -> Node {
    let mut map = MapBuilder::default();
    map.push_quoted("from", rule.from.as_deref());
    map.push_quoted("to", rule.to.as_deref());
    map.push_num("table", rule.table);
    map.push_num("priority", rule.priority);
    map.push_num("mark", rule.mark);
    map.push_num("type-of-service", rule.type_of_service);
    map.build()
}

fn access_point_node(ap: &AccessPoint) -> Node {
    let mut map = MapBuilder::default();
    map.push_quoted("bssid", ap.bssid.as_deref());
    map.push_opt(
        "band",
        ap.band.and_then(|band| match band {
            crate::names::WifiBand::Default => None,
            crate::names::WifiBand::Band2_4 => Some(Node::quoted("2.4GHz")),
            crate::names::WifiBand::Band5 => Some(Node::quoted("5GHz")),
        }),
    );
    map.push_num("channel", ap.channel);
    map.push_bool("hidden", ap.hidden);
    if ap.mode != crate::names::WifiMode::Infrastructure {
        map.push("mode", Node::plain(ap.mode.as_str()));
    }
    map.push_quoted("password", ap.password.as_deref());
    if let Some(auth) = &ap.auth {
        map.push("auth", auth_node(auth));
    }
    if let Some(nm) = &ap.networkmanager {
        let mut n = MapBuilder::default();
        n.push_quoted("name", nm.name.as_deref());
        n.push_opt("uuid", nm.uuid.map(|u| Node::quoted(u.to_string())));
        if !nm.passthrough.is_empty() {
            let mut p = MapBuilder::default();
            for (key, value) in &nm.passthrough {
                p.push(key, Node::quoted(value));
            }
            n.push("passthrough", p.build());
        }
        map.push("networkmanager", n.build());
    }
    map.build()
}

fn auth_node(auth: &AuthConfig) -> Node {
    let mut map = MapBuilder::default();
    map.push_opt(
        "key-management",
        auth.key_management.map(|km| {
            Node::plain(match km {
                crate::names::AuthKeyManagement::None => "none",
                crate::names::AuthKeyManagement::Psk => "psk",
                crate::names::AuthKeyManagement::Eap => "eap",
                crate::names::AuthKeyManagement::Sae => "sae",
                crate::names::AuthKeyManagement::Dot1x => "802.1x",
            })
        }),
    );
    map.push_quoted("password", auth.password.as_deref());
    map.push_opt(
        "method",
        auth.method.map(|m| {
            Node::plain(match m {
                crate::names::EapMethod::Tls => "tls",
                crate::names::EapMethod::Peap => "peap",
                crate::names::EapMethod::Ttls => "ttls",
            })
        }),
    );
    map.push_quoted("identity", auth.identity.as_deref());
    map.push_quoted("anonymous-identity", auth.anonymous_identity.as_deref());
    map.push_quoted("ca-certificate", auth.ca_certificate.as_deref());
    map.push_quoted("client-certificate", auth.client_certificate.as_deref());
    map.push_quoted("client-key", auth.client_key.as_deref());
    map.push_quoted("client-key-password", auth.client_key_password.as_deref());
    map.push_plain("phase2-auth", auth.phase2_auth.as_deref());
    map.build()
}

fn bond_params_node(params: &BondParams) -> Node {
    let mut map = MapBuilder::default();
    map.push_plain("mode", params.mode.as_deref());
    map.push_plain("lacp-rate", params.lacp_rate.as_deref());
    map.push_plain("mii-monitor-interval", params.mii_monitor_interval.as_deref());
    map.push_num("min-links", params.min_links);
    map.push_plain("transmit-hash-policy", params.transmit_hash_policy.as_deref());
    map.push_plain("ad-select", params.ad_select.as_deref());
    map.push_plain("arp-interval", params.arp_interval.as_deref());
    map.push("arp-ip-targets", quoted_seq(&params.arp_ip_targets));
    map.push_plain("up-delay", params.up_delay.as_deref());
    map.push_plain("down-delay", params.down_delay.as_deref());
    map.push_plain("fail-over-mac-policy", params.fail_over_mac_policy.as_deref());
    map.push_num("gratuitous-arp", params.gratuitous_arp);
    map.push_num("packets-per-slave", params.packets_per_slave);
    map.push_plain(
        "primary-reselect-policy",
        params.primary_reselect_policy.as_deref(),
    );
    map.push_num("resend-igmp", params.resend_igmp);
    map.push_plain("learn-packet-interval", params.learn_packet_interval.as_deref());
    map.push_plain("primary", params.primary.as_deref());
    map.build()
}

fn bridge_params_node(params: &BridgeParams) -> Node {
    let mut map = MapBuilder::default();
    map.push_plain("ageing-time", params.ageing_time.as_deref());
    map.push_num("priority", params.priority);
    if !params.port_priority.is_empty() {
        let mut p = MapBuilder::default();
        for (port, priority) in &params.port_priority {
            p.push(port, Node::plain(priority));
        }
        map.push("port-priority", p.build());
    }
    map.push_plain("forward-delay", params.forward_delay.as_deref());
    map.push_plain("hello-time", params.hello_time.as_deref());
    map.push_plain("max-age", params.max_age.as_deref());
    if !params.path_cost.is_empty() {
        let mut p = MapBuilder::default();
        for (port, cost) in &params.path_cost {
            p.push(port, Node::plain(cost));
        }
        map.push("path-cost", p.build());
    }
    map.push_bool("stp", params.stp);
    map.build()
}

fn ovs_node(ovs: &OvsSettings) -> Node {
    let mut map = MapBuilder::default();
    if !ovs.external_ids.is_empty() {
        let mut e = MapBuilder::default();
        for (key, value) in &ovs.external_ids {
            e.push(key, Node::quoted(value));
        }
        map.push("external-ids", e.build());
    }
    if !ovs.other_config.is_empty() {
        let mut o = MapBuilder::default();
        for (key, value) in &ovs.other_config {
            o.push(key, Node::quoted(value));
        }
        map.push("other-config", o.build());
    }
    map.push_plain("lacp", ovs.lacp.as_deref());
    map.push_plain("fail-mode", ovs.fail_mode.as_deref());
    map.push_bool("mcast-snooping", ovs.mcast_snooping);
    map.push_bool("rstp", ovs.rstp);
    map.push("protocols", plain_seq(&ovs.protocols));
    if let Some(controller) = &ovs.controller {
        let mut c = MapBuilder::default();
        c.push_plain("connection-mode", controller.connection_mode.as_deref());
        c.push("addresses", quoted_seq(&controller.addresses));
        map.push("controller", c.build());
    }
    if let Some(ssl) = &ovs.ssl {
        let mut s = MapBuilder::default();
        s.push_quoted("ca-cert", ssl.ca_cert.as_deref());
        s.push_quoted("certificate", ssl.certificate.as_deref());
        s.push_quoted("private-key", ssl.private_key.as_deref());
        map.push("ssl", s.build());
    }
    map.build()
}

/// Write a node tree as a block-style YAML document.
pub fn write_document(node: &Node, writer: &mut impl Write) -> Result<(), NetplanError> {
    let mut text = String::new();
    write_node(node, 0, false, &mut text);
    writer.write_all(text.as_bytes())?;
    Ok(())
}

fn write_scalar(text: &mut String, node: &Node) {
    match node {
        Node::Plain(value) => text.push_str(value),
        Node::Quoted(value) => {
            text.push('"');
            for c in value.chars() {
                match c {
                    '"' => text.push_str("\\\""),
                    '\\' => text.push_str("\\\\"),
                    '\n' => text.push_str("\\n"),
                    c => text.push(c),
                }
            }
            text.push('"');
        }
        _ => unreachable!("write_scalar called on a collection"),
    }
}

fn write_node(node: &Node, indent: usize, inline_start: bool, text: &mut String) {
    let pad = "  ".repeat(indent);
    match node {
        Node::Plain(_) | Node::Quoted(_) => {
            write_scalar(text, node);
            text.push('\n');
        }
        Node::Seq(items) => {
            if inline_start {
                text.push('\n');
            }
            for item in items {
                match item {
                    Node::Plain(_) | Node::Quoted(_) => {
                        let _ = write!(text, "{pad}- ");
                        write_scalar(text, item);
                        text.push('\n');
                    }
                    Node::Map(entries) => {
                        // First entry shares the dash line; nested
                        // collections indent past the item column
                        let mut first = true;
                        for (key, value) in entries {
                            if first {
                                let _ = write!(text, "{pad}- {key}:");
                                first = false;
                            } else {
                                let _ = write!(text, "{pad}  {key}:");
                            }
                            write_entry_value(value, indent + 2, text);
                        }
                        if entries.is_empty() {
                            let _ = writeln!(text, "{pad}- {{}}");
                        }
                    }
                    Node::Seq(_) => {
                        let _ = writeln!(text, "{pad}-");
                        write_node(item, indent + 1, false, text);
                    }
                }
            }
        }
        Node::Map(entries) => {
            if inline_start {
                text.push('\n');
            }
            if entries.is_empty() {
                let _ = writeln!(text, "{pad}{{}}");
                return;
            }
            for (key, value) in entries {
                let _ = write!(text, "{pad}{key}:");
                write_entry_value(value, indent + 1, text);
            }
        }
    }
}

fn write_entry_value(value: &Node, child_indent: usize, text: &mut String) {
    match value {
        Node::Plain(_) | Node::Quoted(_) => {
            text.push(' ');
            write_scalar(text, value);
            text.push('\n');
        }
        Node::Map(entries) if entries.is_empty() => {
            text.push_str(" {}\n");
        }
        _ => {
            write_node(value, child_indent, true, text);
        }
    }
}
