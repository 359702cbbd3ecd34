//! systemd-networkd renderer
//!
//! Generates .link, .netdev and .network files, udev rename rules,
//! wpa_supplicant configuration and units, the regulatory-domain unit and
//! the systemd-networkd-wait-online override.

use super::{Artifacts, Renderer, remove_matching};
use crate::NetplanError;
use crate::names::{AcceptRa, AuthKeyManagement, Backend, DefType, TunnelMode, WifiMode};
use crate::state::State;
use crate::types::{AuthConfig, DhcpOverrides, NetDef, UseDomains};
use crate::util::{systemd_escape, uri_escape};
use std::fmt::Write;
use std::path::Path;

const NETWORK_DIR: &str = "run/systemd/network";
const SYSTEM_DIR: &str = "run/systemd/system";
const RULES_DIR: &str = "run/udev/rules.d";

/// Default DHCP route metric; Wi-Fi routes are pushed further down.
const DHCP_METRIC_DEFAULT: u32 = 100;
const DHCP_METRIC_WIFI: u32 = 600;

/// systemd-networkd renderer
pub struct NetworkdRenderer;

impl Renderer for NetworkdRenderer {
    fn render(&self, state: &State) -> Result<Artifacts, NetplanError> {
        let mut artifacts = Artifacts::default();
        let mut regdom = None;
        for def in state.iter_netdefs() {
            if def.backend != Backend::Networkd {
                continue;
            }
            artifacts.extend(render_netdef(state, def)?);
            if regdom.is_none() {
                regdom = def.regulatory_domain.as_deref();
            }
        }
        if let Some(domain) = regdom {
            render_regdom(domain, &mut artifacts);
        }
        artifacts.extend(render_wait_online(state));
        Ok(artifacts)
    }

    fn backend(&self) -> Backend {
        Backend::Networkd
    }

    fn cleanup(&self, rootdir: &Path) -> Result<(), NetplanError> {
        remove_matching(rootdir, NETWORK_DIR, "10-netplan-", "")?;
        remove_matching(rootdir, RULES_DIR, "99-netplan-", ".rules")?;
        remove_matching(rootdir, "run/netplan", "wpa-", ".conf")?;
        remove_matching(rootdir, SYSTEM_DIR, "netplan-wpa-", ".service")?;
        remove_matching(
            rootdir,
            "run/systemd/system/systemd-networkd.service.wants",
            "netplan-wpa-",
            ".service",
        )?;
        remove_matching(rootdir, SYSTEM_DIR, "netplan-regdom", ".service")?;
        remove_matching(
            rootdir,
            "run/systemd/system/network.target.wants",
            "netplan-regdom",
            ".service",
        )?;
        remove_matching(
            rootdir,
            "run/systemd/system/systemd-networkd-wait-online.service.d",
            "10-netplan",
            ".conf",
        )?;
        Ok(())
    }
}

/// Render the networkd family files for one definition.
pub fn render_netdef(state: &State, def: &NetDef) -> Result<Artifacts, NetplanError> {
    let mut artifacts = Artifacts::default();
    let path_base = format!("{NETWORK_DIR}/10-netplan-{}", uri_escape(&def.id));

    if let Some(content) = link_file(def) {
        artifacts.push_file(format!("{path_base}.link"), content, 0o640);
    }
    if def.def_type().is_virtual()
        && !matches!(def.def_type(), DefType::Port | DefType::NmDevice)
    {
        artifacts.push_file(format!("{path_base}.netdev"), netdev_file(def), 0o640);
    }
    if let Some(content) = network_file(state, def)? {
        artifacts.push_file(format!("{path_base}.network"), content, 0o640);
    }
    if let Some(content) = udev_rules(def) {
        artifacts.push_file(
            format!("{RULES_DIR}/99-netplan-{}.rules", def.id),
            content,
            0o640,
        );
    }
    if def.needs_wpa() {
        render_wpa(def, &mut artifacts);
    }
    Ok(artifacts)
}

/// `.link` file: physical device properties applied by udev.
fn link_file(def: &NetDef) -> Option<String> {
    if !def.is_physical() {
        return None;
    }
    let offloads = def.offloads();
    let wants_link = def.set_name.is_some()
        || def.wakeonlan.is_some()
        || def.mtu.is_some()
        || def.macaddress.is_some()
        || offloads.iter().any(|(_, tri)| tri.is_set());
    if !wants_link {
        return None;
    }

    let mut content = String::new();
    writeln!(content, "[Match]").unwrap();
    match &def.match_config {
        Some(m) if !m.is_empty() => {
            if !m.driver.is_empty() {
                writeln!(content, "Driver={}", m.driver.join(" ")).unwrap();
            }
            if let Some(mac) = &m.macaddress {
                writeln!(content, "MACAddress={}", mac).unwrap();
            }
            if let Some(name) = &m.name {
                writeln!(content, "OriginalName={}", name).unwrap();
            }
        }
        _ => {
            writeln!(content, "OriginalName={}", def.id).unwrap();
        }
    }
    writeln!(content).unwrap();

    writeln!(content, "[Link]").unwrap();
    if let Some(name) = &def.set_name {
        writeln!(content, "Name={}", name).unwrap();
    }
    writeln!(
        content,
        "WakeOnLan={}",
        if def.wakeonlan == Some(true) {
            "magic"
        } else {
            "off"
        }
    )
    .unwrap();
    if let Some(mtu) = def.mtu {
        writeln!(content, "MTUBytes={}", mtu).unwrap();
    }
    if let Some(mac) = &def.macaddress {
        writeln!(content, "MACAddress={}", mac).unwrap();
    }
    for (key, tri) in offloads {
        if let Some(enabled) = tri.as_bool() {
            writeln!(content, "{}={}", key, enabled).unwrap();
        }
    }
    Some(content)
}

/// `.netdev` file: creation of a virtual device.
fn netdev_file(def: &NetDef) -> String {
    let mut content = String::new();
    writeln!(content, "[NetDev]").unwrap();
    writeln!(content, "Name={}", def.id).unwrap();
    if let Some(mac) = &def.macaddress {
        writeln!(content, "MACAddress={}", mac).unwrap();
    }
    if let Some(mtu) = def.mtu {
        writeln!(content, "MTUBytes={}", mtu).unwrap();
    }

    match def.def_type() {
        DefType::Bridge => {
            writeln!(content, "Kind=bridge").unwrap();
            if let Some(params) = &def.bridge_params {
                writeln!(content).unwrap();
                writeln!(content, "[Bridge]").unwrap();
                if let Some(v) = &params.ageing_time {
                    writeln!(content, "AgeingTimeSec={}", v).unwrap();
                }
                if let Some(v) = params.priority {
                    writeln!(content, "Priority={}", v).unwrap();
                }
                if let Some(v) = &params.forward_delay {
                    writeln!(content, "ForwardDelaySec={}", v).unwrap();
                }
                if let Some(v) = &params.hello_time {
                    writeln!(content, "HelloTimeSec={}", v).unwrap();
                }
                if let Some(v) = &params.max_age {
                    writeln!(content, "MaxAgeSec={}", v).unwrap();
                }
                if let Some(stp) = params.stp {
                    writeln!(content, "STP={}", stp).unwrap();
                }
            }
        }
        DefType::Bond => {
            writeln!(content, "Kind=bond").unwrap();
            if let Some(params) = &def.bond_params {
                writeln!(content).unwrap();
                writeln!(content, "[Bond]").unwrap();
                if let Some(v) = &params.mode {
                    writeln!(content, "Mode={}", v).unwrap();
                }
                if let Some(v) = &params.lacp_rate {
                    writeln!(content, "LACPTransmitRate={}", v).unwrap();
                }
                if let Some(v) = &params.mii_monitor_interval {
                    writeln!(content, "MIIMonitorSec={}", v).unwrap();
                }
                if let Some(v) = params.min_links {
                    writeln!(content, "MinLinks={}", v).unwrap();
                }
                if let Some(v) = &params.transmit_hash_policy {
                    writeln!(content, "TransmitHashPolicy={}", v).unwrap();
                }
                if let Some(v) = &params.ad_select {
                    writeln!(content, "AdSelect={}", v).unwrap();
                }
                if let Some(v) = &params.arp_interval {
                    writeln!(content, "ARPIntervalSec={}", v).unwrap();
                }
                if !params.arp_ip_targets.is_empty() {
                    writeln!(
                        content,
                        "ARPIPTargets={}",
                        params.arp_ip_targets.join(" ")
                    )
                    .unwrap();
                }
                if let Some(v) = &params.up_delay {
                    writeln!(content, "UpDelaySec={}", v).unwrap();
                }
                if let Some(v) = &params.down_delay {
                    writeln!(content, "DownDelaySec={}", v).unwrap();
                }
                if let Some(v) = &params.fail_over_mac_policy {
                    writeln!(content, "FailOverMACPolicy={}", v).unwrap();
                }
                if let Some(v) = params.gratuitous_arp {
                    writeln!(content, "GratuitousARP={}", v).unwrap();
                }
                if let Some(v) = params.packets_per_slave {
                    writeln!(content, "PacketsPerSlave={}", v).unwrap();
                }
                if let Some(v) = &params.primary_reselect_policy {
                    writeln!(content, "PrimaryReselectPolicy={}", v).unwrap();
                }
                if let Some(v) = params.resend_igmp {
                    writeln!(content, "ResendIGMP={}", v).unwrap();
                }
                if let Some(v) = &params.learn_packet_interval {
                    writeln!(content, "LearnPacketIntervalSec={}", v).unwrap();
                }
            }
        }
        DefType::Vlan => {
            writeln!(content, "Kind=vlan").unwrap();
            writeln!(content).unwrap();
            writeln!(content, "[VLAN]").unwrap();
            writeln!(content, "Id={}", def.tag_id.unwrap_or_default()).unwrap();
        }
        DefType::Vrf => {
            writeln!(content, "Kind=vrf").unwrap();
            writeln!(content).unwrap();
            writeln!(content, "[VRF]").unwrap();
            writeln!(content, "Table={}", def.table.unwrap_or_default()).unwrap();
        }
        DefType::Vxlan => {
            writeln!(content, "Kind=vxlan").unwrap();
            writeln!(content).unwrap();
            writeln!(content, "[VXLAN]").unwrap();
            writeln!(content, "VNI={}", def.tag_id.unwrap_or_default()).unwrap();
            if let Some(local) = &def.local {
                writeln!(content, "Local={}", local).unwrap();
            }
            if let Some(remote) = &def.remote {
                writeln!(content, "Remote={}", remote).unwrap();
            }
            if let Some(ttl) = def.ttl {
                writeln!(content, "TTL={}", ttl).unwrap();
            }
            if let Some(port) = def.port {
                writeln!(content, "DestinationPort={}", port).unwrap();
            }
            if let Some(label) = def.flow_label {
                writeln!(content, "FlowLabel={}", label).unwrap();
            }
            if let Some(learning) = def.mac_learning {
                writeln!(content, "MacLearning={}", learning).unwrap();
            }
        }
        DefType::Tunnel => {
            let mode = def.mode.unwrap_or_default();
            if mode == TunnelMode::Wireguard {
                writeln!(content, "Kind=wireguard").unwrap();
                writeln!(content).unwrap();
                writeln!(content, "[WireGuard]").unwrap();
                if let Some(key) = def.wireguard_private_key() {
                    if key.starts_with('/') {
                        writeln!(content, "PrivateKeyFile={}", key).unwrap();
                    } else {
                        writeln!(content, "PrivateKey={}", key).unwrap();
                    }
                }
                if let Some(port) = def.port {
                    writeln!(content, "ListenPort={}", port).unwrap();
                }
                for peer in &def.peers {
                    writeln!(content).unwrap();
                    writeln!(content, "[WireGuardPeer]").unwrap();
                    if let Some(public) = &peer.keys.public {
                        writeln!(content, "PublicKey={}", public).unwrap();
                    }
                    if let Some(shared) = &peer.keys.shared {
                        if shared.starts_with('/') {
                            writeln!(content, "PresharedKeyFile={}", shared).unwrap();
                        } else {
                            writeln!(content, "PresharedKey={}", shared).unwrap();
                        }
                    }
                    writeln!(content, "AllowedIPs={}", peer.allowed_ips.join(",")).unwrap();
                    if let Some(endpoint) = &peer.endpoint {
                        writeln!(content, "Endpoint={}", endpoint).unwrap();
                    }
                    if let Some(keepalive) = peer.keepalive {
                        writeln!(content, "PersistentKeepalive={}", keepalive).unwrap();
                    }
                }
            } else {
                writeln!(content, "Kind={}", mode.networkd_kind()).unwrap();
                writeln!(content).unwrap();
                writeln!(content, "[Tunnel]").unwrap();
                writeln!(content, "Independent=true").unwrap();
                if let Some(local) = &def.local {
                    writeln!(content, "Local={}", local).unwrap();
                }
                if let Some(remote) = &def.remote {
                    writeln!(content, "Remote={}", remote).unwrap();
                }
                if mode.is_key_bearing() {
                    if let Some(key) = def.tunnel_input_key() {
                        writeln!(content, "InputKey={}", key).unwrap();
                    }
                    if let Some(key) = def.tunnel_output_key() {
                        writeln!(content, "OutputKey={}", key).unwrap();
                    }
                }
                if matches!(mode, TunnelMode::Ipip6 | TunnelMode::Ip6ip6) {
                    writeln!(content, "Mode={}", mode).unwrap();
                }
                if let Some(ttl) = def.ttl {
                    writeln!(content, "TTL={}", ttl).unwrap();
                }
            }
        }
        // Physical kinds and OVS constructs have no netdev
        _ => {}
    }
    content
}

/// The `[Match] Name=` priority for the `.network` file.
fn match_name(def: &NetDef) -> Option<&str> {
    if def.def_type().is_virtual() {
        return Some(&def.id);
    }
    if let Some(name) = def.set_name.as_deref() {
        return Some(name);
    }
    match &def.match_config {
        Some(m) if !m.is_empty() => m.name.as_deref(),
        _ => Some(&def.id),
    }
}

/// `.network` file: addressing and per-link network configuration.
fn network_file(state: &State, def: &NetDef) -> Result<Option<String>, NetplanError> {
    // [Link]
    let mut link = String::new();
    if def.optional == Some(true) {
        writeln!(link, "RequiredForOnline=no").unwrap();
    }
    if !def.optional_addresses.is_empty() {
        let tokens: Vec<&str> = def
            .optional_addresses
            .iter()
            .map(|f| f.networkd_token())
            .collect();
        writeln!(link, "OptionalAddresses={}", tokens.join(" ")).unwrap();
    }
    if let Some(mtu) = def.mtu {
        writeln!(link, "MTUBytes={}", mtu).unwrap();
    }

    // [Network]
    let mut network = String::new();
    if def.emit_lldp == Some(true) {
        writeln!(network, "EmitLLDP=true").unwrap();
    }
    let ll = if def.is_member() {
        // Members never carry their own addresses
        (false, false)
    } else {
        def.linklocal()
    };
    writeln!(
        network,
        "LinkLocalAddressing={}",
        match ll {
            (true, true) => "yes",
            (true, false) => "ipv4",
            (false, true) => "ipv6",
            (false, false) => "no",
        }
    )
    .unwrap();
    match (def.dhcp4 == Some(true), def.dhcp6 == Some(true)) {
        (true, true) => writeln!(network, "DHCP=yes").unwrap(),
        (true, false) => writeln!(network, "DHCP=ipv4").unwrap(),
        (false, true) => writeln!(network, "DHCP=ipv6").unwrap(),
        (false, false) => {}
    }
    for entry in def.addresses.iter().filter(|e| e.options.is_none()) {
        writeln!(network, "Address={}", entry.address).unwrap();
    }
    if let Some(gw) = &def.gateway4 {
        writeln!(network, "Gateway={}", gw).unwrap();
    }
    if let Some(gw) = &def.gateway6 {
        writeln!(network, "Gateway={}", gw).unwrap();
    }
    if let Some(ns) = &def.nameservers {
        for dns in &ns.addresses {
            writeln!(network, "DNS={}", dns).unwrap();
        }
        if !ns.search.is_empty() {
            writeln!(network, "Domains={}", ns.search.join(" ")).unwrap();
        }
    }
    match def.accept_ra() {
        AcceptRa::Enabled => writeln!(network, "IPv6AcceptRA=yes").unwrap(),
        AcceptRa::Disabled => writeln!(network, "IPv6AcceptRA=no").unwrap(),
        AcceptRa::Kernel => {}
    }
    if def.ipv6_privacy == Some(true) {
        writeln!(network, "IPv6PrivacyExtensions=yes").unwrap();
    }
    if let Some(mtu) = def.ipv6_mtu {
        writeln!(network, "IPv6MTUBytes={}", mtu).unwrap();
    }
    if let Some(token) = &def.ipv6_address_token {
        writeln!(network, "IPv6Token={}", token).unwrap();
    }
    if let Some(mode) = def.ipv6_address_generation {
        writeln!(
            network,
            "IPv6LinkLocalAddressGenerationMode={}",
            mode.networkd_token()
        )
        .unwrap();
    }
    if def.def_type().is_virtual() {
        writeln!(network, "ConfigureWithoutCarrier=yes").unwrap();
    }
    if let Some(bridge) = &def.bridge {
        writeln!(network, "Bridge={}", bridge).unwrap();
    }
    if let Some(bond) = &def.bond {
        writeln!(network, "Bond={}", bond).unwrap();
    }
    if let Some(vrf) = &def.vrf {
        writeln!(network, "VRF={}", vrf).unwrap();
    }
    if def.has_vlans {
        for vlan in state.netdefs_by_type(DefType::Vlan) {
            if vlan.vlan_link() == Some(def.id.as_str()) {
                writeln!(network, "VLAN={}", vlan.id).unwrap();
            }
        }
    }

    // Trailing sections
    let mut sections = String::new();
    for entry in def.addresses.iter().filter(|e| e.options.is_some()) {
        let opts = entry.options.as_ref().unwrap();
        writeln!(sections).unwrap();
        writeln!(sections, "[Address]").unwrap();
        writeln!(sections, "Address={}", entry.address).unwrap();
        if let Some(label) = &opts.label {
            writeln!(sections, "Label={}", label).unwrap();
        }
        if let Some(lifetime) = &opts.lifetime {
            writeln!(sections, "PreferredLifetime={}", lifetime).unwrap();
        }
    }
    for route in &def.routes {
        writeln!(sections).unwrap();
        writeln!(sections, "[Route]").unwrap();
        if let Some(to) = &route.to {
            if to != "default" {
                writeln!(sections, "Destination={}", to).unwrap();
            }
        }
        if let Some(via) = &route.via {
            writeln!(sections, "Gateway={}", via).unwrap();
        }
        if let Some(from) = &route.from {
            writeln!(sections, "PreferredSource={}", from).unwrap();
        }
        if let Some(rtype) = route.rtype.as_deref() {
            if rtype != "unicast" {
                writeln!(sections, "Type={}", rtype).unwrap();
            }
        }
        if let Some(scope) = route.scope.as_deref() {
            if scope != "global" {
                writeln!(sections, "Scope={}", scope).unwrap();
            }
        }
        if route.on_link == Some(true) {
            writeln!(sections, "GatewayOnLink=true").unwrap();
        }
        if let Some(metric) = route.metric {
            writeln!(sections, "Metric={}", metric).unwrap();
        }
        if let Some(table) = route.table {
            writeln!(sections, "Table={}", table).unwrap();
        }
        if let Some(mtu) = route.mtu {
            writeln!(sections, "MTUBytes={}", mtu).unwrap();
        }
        if let Some(window) = route.congestion_window {
            writeln!(sections, "InitialCongestionWindow={}", window).unwrap();
        }
        if let Some(window) = route.advertised_receive_window {
            writeln!(sections, "InitialAdvertisedReceiveWindow={}", window).unwrap();
        }
    }
    for rule in &def.routing_policy {
        writeln!(sections).unwrap();
        writeln!(sections, "[RoutingPolicyRule]").unwrap();
        if let Some(from) = &rule.from {
            writeln!(sections, "From={}", from).unwrap();
        }
        if let Some(to) = &rule.to {
            writeln!(sections, "To={}", to).unwrap();
        }
        if let Some(table) = rule.table {
            writeln!(sections, "Table={}", table).unwrap();
        }
        if let Some(priority) = rule.priority {
            writeln!(sections, "Priority={}", priority).unwrap();
        }
        if let Some(mark) = rule.mark {
            writeln!(sections, "FirewallMark={}", mark).unwrap();
        }
        if let Some(tos) = rule.type_of_service {
            writeln!(sections, "TypeOfService={}", tos).unwrap();
        }
    }
    if let Some(dhcp) = dhcp_section(def)? {
        sections.push_str(&dhcp);
    }

    // Only LinkLocalAddressing in [Network] and nothing else means the
    // definition carries no network configuration at all
    let network_is_bare = network.lines().count() == 1 && !def.def_type().is_virtual();
    if link.is_empty() && network_is_bare && sections.is_empty() && !def.has_addressing() {
        return Ok(None);
    }

    let mut content = String::new();
    writeln!(content, "[Match]").unwrap();
    if let Some(name) = match_name(def) {
        writeln!(content, "Name={}", name).unwrap();
    }
    if let Some(m) = &def.match_config {
        if let Some(mac) = &m.macaddress {
            writeln!(content, "MACAddress={}", mac).unwrap();
        }
        if !m.driver.is_empty() {
            writeln!(content, "Driver={}", m.driver.join(" ")).unwrap();
        }
        // A MAC match on a member would also match the virtual device that
        // inherits the address
        if def.is_member() && m.macaddress.is_some() {
            writeln!(content, "Type=!vlan bond bridge").unwrap();
        }
    }

    if !link.is_empty() {
        writeln!(content).unwrap();
        writeln!(content, "[Link]").unwrap();
        content.push_str(&link);
    }
    writeln!(content).unwrap();
    writeln!(content, "[Network]").unwrap();
    content.push_str(&network);
    content.push_str(&sections);
    Ok(Some(content))
}

/// `[DHCP]` section, emitted whenever a DHCP family is enabled. The
/// overrides of both families must agree when both are enabled.
fn dhcp_section(def: &NetDef) -> Result<Option<String>, NetplanError> {
    let dhcp4 = def.dhcp4 == Some(true);
    let dhcp6 = def.dhcp6 == Some(true);
    if !dhcp4 && !dhcp6 {
        return Ok(None);
    }

    let combined = match (&def.dhcp4_overrides, &def.dhcp6_overrides) {
        (Some(v4), Some(v6)) if dhcp4 && dhcp6 => {
            check_overrides_match(def, v4, v6)?;
            v4.clone()
        }
        (Some(v4), _) if dhcp4 => v4.clone(),
        (_, Some(v6)) if dhcp6 => v6.clone(),
        _ => DhcpOverrides::default(),
    };

    let mut content = String::new();
    writeln!(content).unwrap();
    writeln!(content, "[DHCP]").unwrap();
    if def.dhcp_identifier.as_deref() == Some("mac") {
        writeln!(content, "ClientIdentifier=mac").unwrap();
    }
    let default_metric = if def.def_type() == DefType::Wifi {
        DHCP_METRIC_WIFI
    } else {
        DHCP_METRIC_DEFAULT
    };
    writeln!(
        content,
        "RouteMetric={}",
        combined.route_metric.unwrap_or(default_metric)
    )
    .unwrap();
    writeln!(
        content,
        "UseMTU={}",
        combined.use_mtu.unwrap_or(false)
    )
    .unwrap();
    if let Some(v) = combined.use_dns {
        writeln!(content, "UseDNS={}", v).unwrap();
    }
    if let Some(v) = combined.use_ntp {
        writeln!(content, "UseNTP={}", v).unwrap();
    }
    if let Some(v) = combined.use_routes {
        writeln!(content, "UseRoutes={}", v).unwrap();
    }
    if let Some(v) = combined.use_hostname {
        writeln!(content, "UseHostname={}", v).unwrap();
    }
    if let Some(v) = combined.send_hostname {
        writeln!(content, "SendHostname={}", v).unwrap();
    }
    if let Some(hostname) = &combined.hostname {
        writeln!(content, "Hostname={}", hostname).unwrap();
    }
    if let Some(v) = combined.use_domains {
        writeln!(
            content,
            "UseDomains={}",
            match v {
                UseDomains::Enabled => "true",
                UseDomains::Disabled => "false",
                UseDomains::RouteOnly => "route",
            }
        )
        .unwrap();
    }
    Ok(Some(content))
}

fn check_overrides_match(
    def: &NetDef,
    v4: &DhcpOverrides,
    v6: &DhcpOverrides,
) -> Result<(), NetplanError> {
    let fields: &[(&str, bool)] = &[
        ("use-dns", v4.use_dns == v6.use_dns),
        ("use-ntp", v4.use_ntp == v6.use_ntp),
        ("use-mtu", v4.use_mtu == v6.use_mtu),
        ("use-routes", v4.use_routes == v6.use_routes),
        ("use-hostname", v4.use_hostname == v6.use_hostname),
        ("use-domains", v4.use_domains == v6.use_domains),
        ("send-hostname", v4.send_hostname == v6.send_hostname),
        ("hostname", v4.hostname == v6.hostname),
        ("route-metric", v4.route_metric == v6.route_metric),
    ];
    for (field, matches) in fields {
        if !matches {
            return Err(NetplanError::validation(
                &def.id,
                format!("networkd requires that '{field}' is the same for dhcp4 and dhcp6"),
            ));
        }
    }
    Ok(())
}

/// udev rename rule: needed when a match by MAC or driver is combined with
/// a new name (networkd alone cannot rename in that case).
fn udev_rules(def: &NetDef) -> Option<String> {
    if !def.is_physical() {
        return None;
    }
    let set_name = def.set_name.as_deref()?;
    let m = def.match_config.as_ref()?;
    if m.macaddress.is_none() && m.driver.is_empty() {
        return None;
    }

    let mut content = String::new();
    let drivers: Vec<&str> = if m.driver.is_empty() {
        vec!["?*"]
    } else {
        m.driver.iter().map(String::as_str).collect()
    };
    for driver in drivers {
        write!(content, "SUBSYSTEM==\"net\", ACTION==\"add\", DRIVERS==\"{driver}\"").unwrap();
        if let Some(mac) = &m.macaddress {
            write!(content, ", ATTR{{address}}==\"{mac}\"").unwrap();
        }
        writeln!(content, ", NAME=\"{set_name}\"").unwrap();
    }
    Some(content)
}

/// wpa_supplicant configuration and service for Wi-Fi / 802.1X.
fn render_wpa(def: &NetDef, artifacts: &mut Artifacts) {
    let mut conf = String::new();
    writeln!(conf, "ctrl_interface=/run/wpa_supplicant").unwrap();
    writeln!(conf).unwrap();
    let triggers: Vec<&str> = def
        .wakeonwlan
        .iter()
        .filter(|f| **f != crate::names::WowlanFlag::Default)
        .map(|f| f.as_str())
        .collect();
    if !triggers.is_empty() {
        writeln!(conf, "wowlan_triggers={}", triggers.join(" ")).unwrap();
        writeln!(conf).unwrap();
    }

    if let Some(aps) = &def.access_points {
        for ap in aps.values() {
            writeln!(conf, "network={{").unwrap();
            writeln!(conf, "  ssid=\"{}\"", ap.ssid).unwrap();
            if ap.hidden == Some(true) {
                writeln!(conf, "  scan_ssid=1").unwrap();
            }
            if let Some(bssid) = &ap.bssid {
                writeln!(conf, "  bssid={}", bssid).unwrap();
            }
            match ap.mode {
                WifiMode::Adhoc => writeln!(conf, "  mode=1").unwrap(),
                WifiMode::Ap => writeln!(conf, "  mode=2").unwrap(),
                _ => {}
            }
            write_wpa_auth(&mut conf, ap.effective_auth().as_ref());
            writeln!(conf, "}}").unwrap();
        }
    } else if def.auth.is_some() {
        // Wired 802.1X
        writeln!(conf, "network={{").unwrap();
        write_wpa_auth(&mut conf, def.auth.as_ref());
        writeln!(conf, "}}").unwrap();
    }

    artifacts.push_file(format!("run/netplan/wpa-{}.conf", def.id), conf, 0o600);

    let escaped = systemd_escape(&def.id);
    let mut unit = String::new();
    writeln!(unit, "[Unit]").unwrap();
    writeln!(unit, "Description=WPA supplicant for netplan {}", def.id).unwrap();
    writeln!(unit, "DefaultDependencies=no").unwrap();
    writeln!(
        unit,
        "Requires=sys-subsystem-net-devices-{escaped}.device"
    )
    .unwrap();
    writeln!(unit, "After=sys-subsystem-net-devices-{escaped}.device").unwrap();
    writeln!(unit, "Before=network.target").unwrap();
    writeln!(unit, "Wants=network.target").unwrap();
    writeln!(unit).unwrap();
    writeln!(unit, "[Service]").unwrap();
    writeln!(unit, "Type=simple").unwrap();
    writeln!(
        unit,
        "ExecStart=/sbin/wpa_supplicant -c /run/netplan/wpa-{}.conf -i{}",
        def.id, def.id
    )
    .unwrap();

    let unit_name = format!("netplan-wpa-{escaped}.service");
    artifacts.push_file(format!("{SYSTEM_DIR}/{unit_name}"), unit, 0o640);
    artifacts.push_symlink(
        format!("{SYSTEM_DIR}/systemd-networkd.service.wants/{unit_name}"),
        format!("../{unit_name}"),
    );
}

fn write_wpa_auth(conf: &mut String, auth: Option<&AuthConfig>) {
    let Some(auth) = auth else {
        writeln!(conf, "  key_mgmt=NONE").unwrap();
        return;
    };
    let key_mgmt = auth.key_management.unwrap_or(AuthKeyManagement::None);
    writeln!(conf, "  key_mgmt={}", key_mgmt.wpa_key_mgmt()).unwrap();
    match key_mgmt {
        AuthKeyManagement::Psk => {
            if let Some(password) = &auth.password {
                // A 64-character hex string is a raw PSK, not a passphrase
                if password.len() == 64 && password.chars().all(|c| c.is_ascii_hexdigit()) {
                    writeln!(conf, "  psk={}", password).unwrap();
                } else {
                    writeln!(conf, "  psk=\"{}\"", password).unwrap();
                }
            }
        }
        AuthKeyManagement::Sae => {
            if let Some(password) = &auth.password {
                writeln!(conf, "  sae_password=\"{}\"", password).unwrap();
            }
        }
        AuthKeyManagement::Eap | AuthKeyManagement::Dot1x => {
            if let Some(method) = auth.method {
                writeln!(conf, "  eap={}", method.as_str()).unwrap();
            }
            if let Some(identity) = &auth.identity {
                writeln!(conf, "  identity=\"{}\"", identity).unwrap();
            }
            if let Some(anonymous) = &auth.anonymous_identity {
                writeln!(conf, "  anonymous_identity=\"{}\"", anonymous).unwrap();
            }
            if let Some(password) = &auth.password {
                writeln!(conf, "  password=\"{}\"", password).unwrap();
            }
            if let Some(ca) = &auth.ca_certificate {
                writeln!(conf, "  ca_cert=\"{}\"", ca).unwrap();
            }
            if let Some(cert) = &auth.client_certificate {
                writeln!(conf, "  client_cert=\"{}\"", cert).unwrap();
            }
            if let Some(key) = &auth.client_key {
                writeln!(conf, "  private_key=\"{}\"", key).unwrap();
            }
            if let Some(password) = &auth.client_key_password {
                writeln!(conf, "  private_key_passwd=\"{}\"", password).unwrap();
            }
            if let Some(phase2) = &auth.phase2_auth {
                writeln!(conf, "  phase2=\"auth={}\"", phase2).unwrap();
            }
        }
        AuthKeyManagement::None => {}
    }
}

/// Regulatory-domain oneshot unit, enabled via network.target.
fn render_regdom(domain: &str, artifacts: &mut Artifacts) {
    let mut unit = String::new();
    writeln!(unit, "[Unit]").unwrap();
    writeln!(unit, "Description=netplan wireless regulatory domain").unwrap();
    writeln!(unit, "After=network.target").unwrap();
    writeln!(unit).unwrap();
    writeln!(unit, "[Service]").unwrap();
    writeln!(unit, "Type=oneshot").unwrap();
    writeln!(unit, "ExecStart=/usr/sbin/iw reg set {}", domain).unwrap();

    artifacts.push_file(format!("{SYSTEM_DIR}/netplan-regdom.service"), unit, 0o640);
    artifacts.push_symlink(
        format!("{SYSTEM_DIR}/network.target.wants/netplan-regdom.service"),
        "../netplan-regdom.service",
    );
}

/// The systemd-networkd-wait-online override, computed from all
/// non-optional networkd-managed interfaces.
pub fn render_wait_online(state: &State) -> Artifacts {
    let mut degraded: Vec<(String, &'static str)> = Vec::new();
    let mut routable: Vec<String> = Vec::new();

    for def in state.iter_netdefs() {
        if def.backend != Backend::Networkd || def.optional == Some(true) {
            continue;
        }
        let Some(name) = concrete_name(def) else {
            continue;
        };
        if def.has_addressing() {
            routable.push(name.to_string());
        }
        let (ll4, ll6) = def.linklocal();
        if def.id == "lo" {
            degraded.push((name.to_string(), "carrier"));
        } else if (ll4 || ll6) && !def.is_member() {
            degraded.push((name.to_string(), "degraded"));
        }
    }

    let mut content = String::new();
    writeln!(content, "[Service]").unwrap();
    writeln!(content, "ExecStart=").unwrap();
    if !degraded.is_empty() {
        let flags: Vec<String> = degraded
            .iter()
            .map(|(name, level)| format!("-i {name}:{level}"))
            .collect();
        writeln!(
            content,
            "ExecStart=/lib/systemd/systemd-networkd-wait-online {}",
            flags.join(" ")
        )
        .unwrap();
    }
    if !routable.is_empty() {
        let flags: Vec<String> = routable.iter().map(|name| format!("-i {name}")).collect();
        writeln!(
            content,
            "ExecStart=/lib/systemd/systemd-networkd-wait-online --any --dns -o routable {}",
            flags.join(" ")
        )
        .unwrap();
    }

    let mut artifacts = Artifacts::default();
    artifacts.push_file(
        format!("{SYSTEM_DIR}/systemd-networkd-wait-online.service.d/10-netplan.conf"),
        content,
        0o640,
    );
    artifacts
}

/// The concrete kernel name of an interface, if one can be known without
/// consulting the system: renamed, exact-matched or named by its id.
fn concrete_name(def: &NetDef) -> Option<&str> {
    let name = match_name(def)?;
    if name.contains(['*', '?', '[']) {
        return None;
    }
    Some(name)
}
