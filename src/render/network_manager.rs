//! NetworkManager renderer
//!
//! Generates one keyfile connection profile per definition (one per SSID
//! for Wi-Fi), the unmanaged-devices configuration, and udev rules for
//! driver-only matches.

use super::{Artifacts, Renderer, remove_matching};
use crate::NetplanError;
use crate::keyfile::KeyFile;
use crate::names::{AcceptRa, AuthKeyManagement, Backend, DefType, WifiBand};
use crate::state::State;
use crate::types::route::Family;
use crate::types::{AccessPoint, AuthConfig, NetDef, NmBackendSettings};
use crate::util::uri_escape;
use std::fmt::Write;
use std::path::Path;

const CONNECTIONS_DIR: &str = "run/NetworkManager/system-connections";
const CONF_DIR: &str = "run/NetworkManager/conf.d";
const RULES_FILE: &str = "run/udev/rules.d/90-netplan.rules";

/// NetworkManager renderer
pub struct NetworkManagerRenderer;

impl Renderer for NetworkManagerRenderer {
    fn render(&self, state: &State) -> Result<Artifacts, NetplanError> {
        let mut artifacts = Artifacts::default();
        for def in state.iter_netdefs() {
            if def.backend != Backend::NetworkManager {
                continue;
            }
            artifacts.extend(render_netdef(state, def)?);
        }
        artifacts.extend(render_finish(state)?);
        Ok(artifacts)
    }

    fn backend(&self) -> Backend {
        Backend::NetworkManager
    }

    fn cleanup(&self, rootdir: &Path) -> Result<(), NetplanError> {
        remove_matching(rootdir, CONNECTIONS_DIR, "netplan-", ".nmconnection")?;
        remove_matching(rootdir, CONF_DIR, "netplan", ".conf")?;
        remove_matching(rootdir, CONF_DIR, "10-globally-managed-devices", ".conf")?;
        remove_matching(rootdir, "run/udev/rules.d", "90-netplan", ".rules")?;
        Ok(())
    }
}

/// Render the keyfile profile(s) for one definition.
pub fn render_netdef(state: &State, def: &NetDef) -> Result<Artifacts, NetplanError> {
    // NM cannot select a device by driver, and cannot glob names
    if let Some(m) = &def.match_config {
        if !m.driver.is_empty() && def.set_name.is_none() {
            return Err(NetplanError::unsupported(
                &def.id,
                "NetworkManager does not support matching by driver",
            ));
        }
        if let Some(name) = m.name.as_deref() {
            if name.contains(['*', '?', '[']) && def.set_name.is_none() {
                return Err(NetplanError::unsupported(
                    &def.id,
                    "NetworkManager does not support wildcard interface names",
                ));
            }
        }
    }

    let mut artifacts = Artifacts::default();
    if def.def_type() == DefType::Wifi {
        for ap in def.access_points.iter().flat_map(|aps| aps.values()) {
            let keyfile = connection_keyfile(state, def, Some(ap))?;
            artifacts.push_file(
                format!(
                    "{CONNECTIONS_DIR}/netplan-{}-{}.nmconnection",
                    def.id,
                    uri_escape(&ap.ssid)
                ),
                keyfile.serialize(),
                0o600,
            );
        }
    } else {
        let keyfile = connection_keyfile(state, def, None)?;
        artifacts.push_file(
            format!("{CONNECTIONS_DIR}/netplan-{}.nmconnection", def.id),
            keyfile.serialize(),
            0o600,
        );
    }
    Ok(artifacts)
}

fn connection_keyfile(
    state: &State,
    def: &NetDef,
    ap: Option<&AccessPoint>,
) -> Result<KeyFile, NetplanError> {
    let mut kf = KeyFile::new();

    // The settings block carrying name/uuid/passthrough: the access point
    // for Wi-Fi, the definition otherwise
    let settings: Option<&NmBackendSettings> = match ap {
        Some(ap) => ap.networkmanager.as_ref().or(def.networkmanager.as_ref()),
        None => def.networkmanager.as_ref(),
    };

    let default_id = match ap {
        Some(ap) => format!("netplan-{}-{}", def.id, ap.ssid),
        None => format!("netplan-{}", def.id),
    };
    let connection_id = settings
        .and_then(|s| s.name.clone())
        .unwrap_or(default_id);
    kf.set("connection", "id", connection_id);

    let explicit_uuid = settings.and_then(|s| s.uuid);
    let needs_uuid = def.has_vlans && def.has_match();
    if let Some(uuid) = explicit_uuid.or(if needs_uuid { def.uuid } else { None }) {
        kf.set("connection", "uuid", uuid.to_string());
    }

    let nm_type = match def.def_type() {
        DefType::NmDevice => def
            .networkmanager
            .as_ref()
            .and_then(|nm| nm.passthrough.get("connection.type").cloned())
            .unwrap_or_default(),
        DefType::Tunnel if def.mode == Some(crate::names::TunnelMode::Wireguard) => {
            "wireguard".to_string()
        }
        other => other.nm_type().to_string(),
    };
    kf.set("connection", "type", nm_type);

    if let Some(name) = interface_name(def) {
        kf.set("connection", "interface-name", name);
    }
    if let Some(bridge) = &def.bridge {
        kf.set("connection", "slave-type", "bridge");
        kf.set("connection", "master", bridge.as_str());
    }
    if let Some(bond) = &def.bond {
        kf.set("connection", "slave-type", "bond");
        kf.set("connection", "master", bond.as_str());
    }

    // Type-specific section
    match def.def_type() {
        DefType::Ethernet => {
            if let Some(mac) = def.match_config.as_ref().and_then(|m| m.macaddress.as_deref()) {
                kf.set("ethernet", "mac-address", mac);
            }
            if let Some(mac) = &def.macaddress {
                kf.set("ethernet", "cloned-mac-address", mac.as_str());
            }
            if let Some(mtu) = def.mtu {
                kf.set("ethernet", "mtu", mtu.to_string());
            }
            if let Some(wol) = def.wakeonlan {
                kf.set("ethernet", "wake-on-lan", if wol { "64" } else { "0" });
            }
        }
        DefType::Wifi => {
            if let Some(ap) = ap {
                kf.set("wifi", "ssid", ap.ssid.as_str());
                kf.set("wifi", "mode", ap.mode.nm_mode());
                if ap.hidden == Some(true) {
                    kf.set("wifi", "hidden", "true");
                }
                if let Some(bssid) = &ap.bssid {
                    kf.set("wifi", "bssid", bssid.as_str());
                }
                match ap.band {
                    Some(WifiBand::Band2_4) => kf.set("wifi", "band", "bg"),
                    Some(WifiBand::Band5) => kf.set("wifi", "band", "a"),
                    _ => {}
                }
                if let Some(channel) = ap.channel {
                    kf.set("wifi", "channel", channel.to_string());
                }
                if let Some(mtu) = def.mtu {
                    kf.set("wifi", "mtu", mtu.to_string());
                }
                if let Some(auth) = ap.effective_auth() {
                    write_wifi_security(&mut kf, &auth);
                }
            }
        }
        DefType::Bridge => {
            if let Some(params) = &def.bridge_params {
                if let Some(stp) = params.stp {
                    kf.set("bridge", "stp", stp.to_string());
                }
                if let Some(priority) = params.priority {
                    kf.set("bridge", "priority", priority.to_string());
                }
                if let Some(delay) = &params.forward_delay {
                    kf.set("bridge", "forward-delay", delay.as_str());
                }
                if let Some(hello) = &params.hello_time {
                    kf.set("bridge", "hello-time", hello.as_str());
                }
                if let Some(age) = &params.max_age {
                    kf.set("bridge", "max-age", age.as_str());
                }
                if let Some(ageing) = &params.ageing_time {
                    kf.set("bridge", "ageing-time", ageing.as_str());
                }
            }
        }
        DefType::Bond => {
            if let Some(params) = &def.bond_params {
                if let Some(mode) = &params.mode {
                    kf.set("bond", "mode", mode.as_str());
                }
                if let Some(v) = &params.mii_monitor_interval {
                    kf.set("bond", "miimon", v.as_str());
                }
                if let Some(v) = &params.lacp_rate {
                    kf.set("bond", "lacp_rate", v.as_str());
                }
                if let Some(v) = &params.transmit_hash_policy {
                    kf.set("bond", "xmit_hash_policy", v.as_str());
                }
                if let Some(v) = &params.primary {
                    kf.set("bond", "primary", v.as_str());
                }
                if let Some(v) = &params.up_delay {
                    kf.set("bond", "updelay", v.as_str());
                }
                if let Some(v) = &params.down_delay {
                    kf.set("bond", "downdelay", v.as_str());
                }
            }
        }
        DefType::Vlan => {
            kf.set("vlan", "id", def.tag_id.unwrap_or_default().to_string());
            if let Some(parent) = def.vlan_link() {
                // Refer to the parent by UUID when it matches by hardware
                // properties and therefore has no stable name
                let by_uuid = state
                    .get_netdef(parent)
                    .filter(|p| p.has_match() && p.set_name.is_none())
                    .and_then(|p| p.uuid);
                match by_uuid {
                    Some(uuid) => kf.set("vlan", "parent", uuid.to_string()),
                    None => kf.set("vlan", "parent", parent),
                }
            }
        }
        DefType::Vrf => {
            kf.set("vrf", "table", def.table.unwrap_or_default().to_string());
        }
        DefType::Tunnel | DefType::Vxlan | DefType::Modem | DefType::NmDevice | DefType::Port => {}
    }

    // Bridge port parameters live on the member profile
    if let Some(bridge) = &def.bridge {
        if let Some(params) = state.get_netdef(bridge).and_then(|b| b.bridge_params.as_ref()) {
            if let Some(cost) = params.path_cost.get(&def.id) {
                kf.set("bridge-port", "path-cost", cost.to_string());
            }
            if let Some(priority) = params.port_priority.get(&def.id) {
                kf.set("bridge-port", "priority", priority.to_string());
            }
        }
    }

    let has_passthrough = settings.is_some_and(|s| !s.passthrough.is_empty());
    write_ip_sections(&mut kf, def, has_passthrough);

    // Splice opaque passthrough last; it may override derived keys
    if let Some(settings) = settings {
        for (path, value) in &settings.passthrough {
            if let Some((group, key)) = path.split_once('.') {
                kf.set(group, key, value.as_str());
            }
        }
    }
    Ok(kf)
}

/// `interface-name=` is only set when the name is concrete.
fn interface_name(def: &NetDef) -> Option<&str> {
    if def.def_type().is_virtual() {
        return Some(&def.id);
    }
    if let Some(name) = def.set_name.as_deref() {
        return Some(name);
    }
    match &def.match_config {
        Some(m) if !m.is_empty() => match m.name.as_deref() {
            Some(name) if !name.contains(['*', '?', '[']) => Some(name),
            _ => None,
        },
        _ => Some(&def.id),
    }
}

fn write_wifi_security(kf: &mut KeyFile, auth: &AuthConfig) {
    match auth.key_management.unwrap_or(AuthKeyManagement::None) {
        AuthKeyManagement::None => {}
        AuthKeyManagement::Psk => {
            kf.set("wifi-security", "key-mgmt", "wpa-psk");
            if let Some(password) = &auth.password {
                kf.set("wifi-security", "psk", password.as_str());
            }
        }
        AuthKeyManagement::Sae => {
            kf.set("wifi-security", "key-mgmt", "sae");
            if let Some(password) = &auth.password {
                kf.set("wifi-security", "psk", password.as_str());
            }
        }
        AuthKeyManagement::Eap | AuthKeyManagement::Dot1x => {
            kf.set("wifi-security", "key-mgmt", "wpa-eap");
            if let Some(method) = auth.method {
                kf.set("802-1x", "eap", method.as_str().to_lowercase());
            }
            if let Some(identity) = &auth.identity {
                kf.set("802-1x", "identity", identity.as_str());
            }
            if let Some(anonymous) = &auth.anonymous_identity {
                kf.set("802-1x", "anonymous-identity", anonymous.as_str());
            }
            if let Some(password) = &auth.password {
                kf.set("802-1x", "password", password.as_str());
            }
            if let Some(ca) = &auth.ca_certificate {
                kf.set("802-1x", "ca-cert", ca.as_str());
            }
            if let Some(cert) = &auth.client_certificate {
                kf.set("802-1x", "client-cert", cert.as_str());
            }
            if let Some(key) = &auth.client_key {
                kf.set("802-1x", "private-key", key.as_str());
            }
            if let Some(password) = &auth.client_key_password {
                kf.set("802-1x", "private-key-password", password.as_str());
            }
            if let Some(phase2) = &auth.phase2_auth {
                kf.set("802-1x", "phase2-auth", phase2.as_str());
            }
        }
    }
}

fn write_ip_sections(kf: &mut KeyFile, def: &NetDef, has_passthrough: bool) {
    let v4_addresses: Vec<&str> = def
        .addresses
        .iter()
        .filter(|e| e.family() == Some(Family::V4))
        .map(|e| e.address.as_str())
        .collect();
    let v6_addresses: Vec<&str> = def
        .addresses
        .iter()
        .filter(|e| e.family() == Some(Family::V6))
        .map(|e| e.address.as_str())
        .collect();
    let (ll4, _) = def.linklocal();

    // [ipv4]
    if def.dhcp4 == Some(true) {
        kf.set("ipv4", "method", "auto");
    } else if !v4_addresses.is_empty() {
        kf.set("ipv4", "method", "manual");
    } else if ll4 || !has_passthrough {
        // No typed configuration and no opaque profile: stay off the
        // network but keep the device manageable
        kf.set("ipv4", "method", "link-local");
    }
    for (i, address) in v4_addresses.iter().enumerate() {
        kf.set("ipv4", &format!("address{}", i + 1), *address);
    }
    if let Some(gw) = &def.gateway4 {
        kf.set("ipv4", "gateway", gw.as_str());
    }
    write_dns(kf, "ipv4", def, Family::V4);
    write_routes(kf, "ipv4", def, Family::V4);
    if let Some(overrides) = &def.dhcp4_overrides {
        if let Some(metric) = overrides.route_metric {
            kf.set("ipv4", "route-metric", metric.to_string());
        }
    }

    // [ipv6]
    let wants_v6 = def.dhcp6 == Some(true)
        || !v6_addresses.is_empty()
        || def.accept_ra() == AcceptRa::Enabled
        || def.gateway6.is_some();
    if !wants_v6 {
        if !has_passthrough {
            kf.set("ipv6", "method", "ignore");
        }
        return;
    }
    if def.dhcp6 == Some(true) || def.accept_ra() == AcceptRa::Enabled {
        kf.set("ipv6", "method", "auto");
    } else {
        kf.set("ipv6", "method", "manual");
    }
    for (i, address) in v6_addresses.iter().enumerate() {
        kf.set("ipv6", &format!("address{}", i + 1), *address);
    }
    if let Some(gw) = &def.gateway6 {
        kf.set("ipv6", "gateway", gw.as_str());
    }
    write_dns(kf, "ipv6", def, Family::V6);
    write_routes(kf, "ipv6", def, Family::V6);
    if let Some(mode) = def.ipv6_address_generation {
        kf.set("ipv6", "addr-gen-mode", mode.nm_token());
    }
    if let Some(token) = &def.ipv6_address_token {
        kf.set("ipv6", "token", token.as_str());
    }
    if def.ipv6_privacy == Some(true) {
        kf.set("ipv6", "ip6-privacy", "2");
    }
}

fn write_dns(kf: &mut KeyFile, group: &str, def: &NetDef, family: Family) {
    let Some(ns) = &def.nameservers else { return };
    let addresses: Vec<&str> = ns
        .addresses
        .iter()
        .filter(|a| Family::of_address(a) == Some(family))
        .map(String::as_str)
        .collect();
    if !addresses.is_empty() {
        kf.set(group, "dns", format!("{};", addresses.join(";")));
    }
    if !ns.search.is_empty() {
        kf.set(group, "dns-search", format!("{};", ns.search.join(";")));
    }
}

fn write_routes(kf: &mut KeyFile, group: &str, def: &NetDef, family: Family) {
    let mut n = 0;
    for route in &def.routes {
        if route.family() != Some(family) {
            continue;
        }
        let Some(to) = &route.to else { continue };
        n += 1;
        let mut value = to.clone();
        if let Some(via) = &route.via {
            let _ = write!(value, ",{}", via);
            if let Some(metric) = route.metric {
                let _ = write!(value, ",{}", metric);
            }
        }
        kf.set(group, &format!("route{}", n), value);
    }
}

/// Global NM configuration: ignore non-NM-managed devices, and restore
/// NM's management of everything else.
pub fn render_finish(state: &State) -> Result<Artifacts, NetplanError> {
    let mut artifacts = Artifacts::default();

    let mut unmanaged: Vec<String> = Vec::new();
    let mut driver_globs: Vec<String> = Vec::new();
    let mut any_nm = false;
    for def in state.iter_netdefs() {
        if def.backend == Backend::NetworkManager {
            any_nm = true;
            continue;
        }
        if !def.is_physical() {
            continue;
        }
        if let Some(spec) = unmanaged_spec(def) {
            unmanaged.push(spec);
        }
        if let Some(m) = &def.match_config {
            driver_globs.extend(m.driver.iter().cloned());
        }
    }

    if !unmanaged.is_empty() {
        let mut conf = String::new();
        writeln!(conf, "[keyfile]").unwrap();
        writeln!(conf, "unmanaged-devices+={}", unmanaged.join(",")).unwrap();
        artifacts.push_file(format!("{CONF_DIR}/netplan.conf"), conf, 0o640);
    }
    if any_nm {
        // Zero-length override re-enabling NM for devices the distro
        // default would leave unmanaged
        artifacts.push_file(
            format!("{CONF_DIR}/10-globally-managed-devices.conf"),
            String::new(),
            0o640,
        );
    }
    if !driver_globs.is_empty() {
        let mut rules = String::new();
        for glob in &driver_globs {
            writeln!(
                rules,
                "ACTION==\"add|change\", SUBSYSTEM==\"net\", \
                 ENV{{ID_NET_DRIVER}}==\"{glob}\", ENV{{NM_UNMANAGED}}=\"1\""
            )
            .unwrap();
        }
        artifacts.push_file(RULES_FILE, rules, 0o640);
    }
    Ok(artifacts)
}

/// NM-style device specifier for the unmanaged-devices list.
fn unmanaged_spec(def: &NetDef) -> Option<String> {
    match &def.match_config {
        Some(m) if !m.is_empty() => {
            if let Some(name) = def.set_name.as_deref().or(m.name.as_deref()) {
                Some(format!("interface-name:{name}"))
            } else {
                m.macaddress.as_ref().map(|mac| format!("mac:{mac}"))
            }
        }
        _ => Some(format!("interface-name:{}", def.id)),
    }
}
