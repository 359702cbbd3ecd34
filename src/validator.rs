//! Semantic validation of lifted definitions.
//!
//! Three passes, run in order during import:
//!
//! 1. per-definition grammar (structure and ranges local to one definition)
//! 2. per-definition backend rules (needs the resolved effective backend)
//! 3. graph-wide consistency (adoption flags, default-route uniqueness)

use crate::NetplanError;
use crate::names::{Backend, DefType, TunnelMode};
use crate::types::route::{Family, ROUTE_METRIC_UNSPEC, ROUTE_TABLE_UNSPEC, Route};
use crate::types::{NetDef, is_valid_wireguard_key};
use std::collections::HashMap;

/// Highest valid VLAN id.
const VLAN_ID_MAX: u64 = 4094;
/// Highest valid VXLAN network identifier.
const VNI_MAX: u64 = 16_777_216;
/// Highest valid IPv6 flow label.
const FLOW_LABEL_MAX: u32 = 1_048_575;

// Kernel bonding modes plus the OVS-only ones; which subset a backend
// accepts is checked at render time.
const BOND_MODES: &[&str] = &[
    "balance-rr",
    "active-backup",
    "balance-xor",
    "broadcast",
    "802.3ad",
    "balance-tlb",
    "balance-alb",
    "balance-tcp",
    "balance-slb",
];

/// Pass 1: structural constraints local to one definition.
pub fn validate_grammar(def: &NetDef) -> Result<(), NetplanError> {
    if def.set_name.is_some() && !def.has_match() {
        return Err(NetplanError::validation(
            &def.id,
            "'set-name' requires a 'match' block",
        ));
    }

    if def.ipv6_address_generation.is_some() && def.ipv6_address_token.is_some() {
        return Err(NetplanError::validation(
            &def.id,
            "'ipv6-address-generation' and 'ipv6-address-token' are mutually exclusive",
        ));
    }

    for entry in &def.addresses {
        if !entry.address.contains('/') {
            return Err(NetplanError::validation(
                &def.id,
                format!("address '{}' is missing the prefix length", entry.address),
            ));
        }
    }

    if let Some(gw) = def.gateway4.as_deref() {
        if Family::of_address(gw) != Some(Family::V4) {
            return Err(NetplanError::validation(
                &def.id,
                format!("gateway4 '{gw}' is not an IPv4 address"),
            ));
        }
    }
    if let Some(gw) = def.gateway6.as_deref() {
        if Family::of_address(gw) != Some(Family::V6) {
            return Err(NetplanError::validation(
                &def.id,
                format!("gateway6 '{gw}' is not an IPv6 address"),
            ));
        }
    }

    for route in &def.routes {
        validate_route(def, route)?;
    }
    for rule in &def.routing_policy {
        if rule.from.is_none() && rule.to.is_none() {
            return Err(NetplanError::validation(
                &def.id,
                "routing policy rule needs a 'from' or 'to' selector",
            ));
        }
    }

    match def.def_type() {
        DefType::Vlan => {
            match def.tag_id {
                Some(id) if id <= VLAN_ID_MAX => {}
                Some(id) => {
                    return Err(NetplanError::validation(
                        &def.id,
                        format!("VLAN id {id} is out of range (0..{VLAN_ID_MAX})"),
                    ));
                }
                None => {
                    return Err(NetplanError::validation(&def.id, "missing VLAN 'id'"));
                }
            }
            if def.link.is_none() {
                return Err(NetplanError::validation(&def.id, "missing VLAN 'link'"));
            }
        }
        DefType::Vxlan => {
            match def.tag_id {
                Some(vni) if vni <= VNI_MAX => {}
                Some(vni) => {
                    return Err(NetplanError::validation(
                        &def.id,
                        format!("VXLAN VNI {vni} is out of range (0..{VNI_MAX})"),
                    ));
                }
                None => {
                    return Err(NetplanError::validation(&def.id, "missing VXLAN 'id'"));
                }
            }
            if let Some(ttl) = def.ttl {
                if ttl > 255 {
                    return Err(NetplanError::validation(
                        &def.id,
                        format!("TTL {ttl} is out of range (0..255)"),
                    ));
                }
            }
            if let Some(label) = def.flow_label {
                if label > FLOW_LABEL_MAX {
                    return Err(NetplanError::validation(
                        &def.id,
                        format!("flow label {label} is out of range (0..{FLOW_LABEL_MAX})"),
                    ));
                }
            }
        }
        DefType::Tunnel => validate_tunnel(def)?,
        DefType::Wifi => {
            if def
                .access_points
                .as_ref()
                .is_none_or(|aps| aps.is_empty())
            {
                return Err(NetplanError::validation(
                    &def.id,
                    "wifi definition needs at least one access point",
                ));
            }
        }
        DefType::NmDevice => {
            let has_connection_type = def
                .networkmanager
                .as_ref()
                .is_some_and(|nm| nm.passthrough.contains_key("connection.type"));
            if !has_connection_type {
                return Err(NetplanError::validation(
                    &def.id,
                    "nm-device passthrough must contain 'connection.type'",
                ));
            }
        }
        DefType::Port => {
            if def.peer.is_none() {
                return Err(NetplanError::validation(
                    &def.id,
                    "OVS patch port needs a 'peer'",
                ));
            }
        }
        _ => {}
    }

    if let Some(params) = &def.bond_params {
        if let Some(mode) = params.mode.as_deref() {
            if !BOND_MODES.contains(&mode) {
                return Err(NetplanError::validation(
                    &def.id,
                    format!("unknown bond mode '{mode}'"),
                ));
            }
        }
    }

    Ok(())
}

fn validate_route(def: &NetDef, route: &Route) -> Result<(), NetplanError> {
    let rtype = route.rtype.as_deref().unwrap_or("unicast");
    match rtype {
        "unicast" => {
            if route.to.is_none() {
                return Err(NetplanError::validation(&def.id, "route is missing 'to'"));
            }
            let scope = route.scope.as_deref().unwrap_or("global");
            if scope == "global" && route.via.is_none() {
                return Err(NetplanError::validation(
                    &def.id,
                    "unicast route is missing 'via'",
                ));
            }
        }
        "blackhole" | "unreachable" | "prohibit" | "local" => {
            if route.to.is_none() {
                return Err(NetplanError::validation(&def.id, "route is missing 'to'"));
            }
            if route.via.is_some() && rtype != "local" {
                return Err(NetplanError::validation(
                    &def.id,
                    format!("{rtype} route cannot have a 'via'"),
                ));
            }
        }
        other => {
            return Err(NetplanError::validation(
                &def.id,
                format!("unknown route type '{other}'"),
            ));
        }
    }
    if let (Some(to), Some(via)) = (route.to.as_deref(), route.via.as_deref()) {
        if let (Some(to_family), Some(via_family)) =
            (Family::of_address(to), Family::of_address(via))
        {
            if to_family != via_family {
                return Err(NetplanError::validation(
                    &def.id,
                    format!("route 'to' ({to}) and 'via' ({via}) are of different families"),
                ));
            }
        }
    }
    Ok(())
}

fn validate_tunnel(def: &NetDef) -> Result<(), NetplanError> {
    let mode = match def.mode {
        Some(TunnelMode::Unknown) | None => {
            return Err(NetplanError::validation(&def.id, "missing tunnel 'mode'"));
        }
        Some(mode) => mode,
    };

    if let Some(ttl) = def.ttl {
        if !(1..=255).contains(&ttl) {
            return Err(NetplanError::validation(
                &def.id,
                format!("TTL {ttl} is out of range (1..255)"),
            ));
        }
    }

    if mode == TunnelMode::Wireguard {
        let key = def.wireguard_private_key().ok_or_else(|| {
            NetplanError::validation(&def.id, "wireguard tunnel is missing a private key")
        })?;
        if !is_valid_wireguard_key(key) {
            return Err(NetplanError::validation(
                &def.id,
                "wireguard private key must be base64 of 32 bytes or a file path",
            ));
        }
        if def.peers.is_empty() {
            return Err(NetplanError::validation(
                &def.id,
                "wireguard tunnel needs at least one peer",
            ));
        }
        for peer in &def.peers {
            let public = peer.keys.public.as_deref().ok_or_else(|| {
                NetplanError::validation(&def.id, "wireguard peer is missing a public key")
            })?;
            if !is_valid_wireguard_key(public) {
                return Err(NetplanError::validation(
                    &def.id,
                    "wireguard peer public key must be base64 of 32 bytes or a file path",
                ));
            }
            if let Some(shared) = peer.keys.shared.as_deref() {
                if !is_valid_wireguard_key(shared) {
                    return Err(NetplanError::validation(
                        &def.id,
                        "wireguard pre-shared key must be base64 of 32 bytes or a file path",
                    ));
                }
            }
            if peer.allowed_ips.is_empty() {
                return Err(NetplanError::validation(
                    &def.id,
                    "wireguard peer needs a non-empty 'allowed-ips'",
                ));
            }
        }
        return Ok(());
    }

    let local = def.local.as_deref().ok_or_else(|| {
        NetplanError::validation(&def.id, "tunnel is missing 'local'")
    })?;
    let remote = def.remote.as_deref().ok_or_else(|| {
        NetplanError::validation(&def.id, "tunnel is missing 'remote'")
    })?;
    let want = if mode.is_ipv6_mode() {
        Family::V6
    } else {
        Family::V4
    };
    for (name, addr) in [("local", local), ("remote", remote)] {
        if Family::of_address(addr) != Some(want) {
            return Err(NetplanError::validation(
                &def.id,
                format!("tunnel mode '{mode}' requires an {want} '{name}' address"),
            ));
        }
    }
    Ok(())
}

/// Pass 2: rules depending on the resolved effective backend.
pub fn validate_backend_rules(def: &NetDef) -> Result<(), NetplanError> {
    if def.def_type() == DefType::Tunnel {
        let mode = def.mode.unwrap_or_default();
        match def.backend {
            Backend::Networkd if mode == TunnelMode::Isatap => {
                return Err(NetplanError::unsupported(
                    &def.id,
                    "networkd does not support ISATAP tunnels",
                ));
            }
            Backend::NetworkManager
                if matches!(mode, TunnelMode::Gretap | TunnelMode::Ip6gretap) =>
            {
                return Err(NetplanError::unsupported(
                    &def.id,
                    format!("NetworkManager does not support {mode} tunnels"),
                ));
            }
            _ => {}
        }

        if !mode.is_key_bearing()
            && (def.key.is_some()
                || def
                    .keys
                    .as_ref()
                    .is_some_and(|k| k.input.is_some() || k.output.is_some()))
        {
            return Err(NetplanError::validation(
                &def.id,
                format!("tunnel mode '{mode}' does not accept input/output keys"),
            ));
        }
    }
    Ok(())
}

/// Pass 3: whole-graph consistency. Mutates adoption flags in place.
pub fn validate_graph(defs: &mut [NetDef]) -> Result<(), NetplanError> {
    adopt_vlans(defs);
    adopt_sriov(defs)?;
    adopt_vrf_routes(defs)?;
    check_default_route_uniqueness(defs)
}

fn adopt_vlans(defs: &mut [NetDef]) {
    let parents: Vec<String> = defs
        .iter()
        .filter_map(|d| d.vlan_link().map(str::to_string))
        .collect();
    for def in defs.iter_mut() {
        if parents.iter().any(|p| *p == def.id) {
            def.has_vlans = true;
        }
    }
}

fn adopt_sriov(defs: &mut [NetDef]) -> Result<(), NetplanError> {
    let pf_targets: Vec<String> = defs
        .iter()
        .filter_map(|d| d.sriov_vf_link().map(str::to_string))
        .collect();
    for def in defs.iter_mut() {
        let is_vf = def.sriov_vf_link().is_some();
        if is_vf && (def.embedded_switch_mode.is_some() || def.delay_virtual_functions_rebind == Some(true)) {
            return Err(NetplanError::validation(
                &def.id,
                "SR-IOV VF cannot set 'embedded-switch-mode' or 'delay-virtual-functions-rebind'",
            ));
        }
        def.is_sriov_pf = !is_vf
            && (def.virtual_function_count.is_some()
                || def.embedded_switch_mode.is_some()
                || pf_targets.iter().any(|t| *t == def.id));
        if let Some(mode) = def.embedded_switch_mode.as_deref() {
            if !matches!(mode, "switchdev" | "legacy") {
                return Err(NetplanError::validation(
                    &def.id,
                    format!("unknown embedded-switch-mode '{mode}'"),
                ));
            }
        }
    }
    Ok(())
}

/// Routes on a VRF's members inherit the VRF table; a route naming a
/// different table is a conflict.
fn adopt_vrf_routes(defs: &mut [NetDef]) -> Result<(), NetplanError> {
    let vrf_tables: HashMap<String, u32> = defs
        .iter()
        .filter(|d| d.def_type() == DefType::Vrf)
        .filter_map(|d| d.table.map(|t| (d.id.clone(), t)))
        .collect();

    for def in defs.iter_mut() {
        let table = match def.vrf.as_deref().and_then(|v| vrf_tables.get(v)) {
            Some(table) => *table,
            None => continue,
        };
        for route in def.routes.iter_mut() {
            match route.table {
                None => route.table = Some(table),
                Some(t) if t == table => {}
                Some(t) => {
                    return Err(NetplanError::validation(
                        &def.id,
                        format!(
                            "route table {t} conflicts with VRF '{}' table {table}",
                            def.vrf.as_deref().unwrap_or_default()
                        ),
                    ));
                }
            }
        }
        for rule in def.routing_policy.iter_mut() {
            if rule.table.is_none() {
                rule.table = Some(table);
            }
        }
    }
    Ok(())
}

/// At most one default route per (family, table, metric) across the graph.
/// Runs after VRF adoption so inherited tables take part.
fn check_default_route_uniqueness(defs: &[NetDef]) -> Result<(), NetplanError> {
    let mut claims: HashMap<(Family, u32, u32), String> = HashMap::new();
    let mut claim = |key: (Family, u32, u32), id: &str| -> Result<(), NetplanError> {
        if let Some(other) = claims.get(&key) {
            let (family, table, metric) = key;
            let table = if table == ROUTE_TABLE_UNSPEC {
                "main".to_string()
            } else {
                table.to_string()
            };
            let metric = if metric == ROUTE_METRIC_UNSPEC {
                "default".to_string()
            } else {
                metric.to_string()
            };
            return Err(NetplanError::validation(
                id,
                format!(
                    "duplicate default route ({family}, table: {table}, metric: {metric}) \
                     also claimed by '{other}'"
                ),
            ));
        }
        claims.insert(key, id.to_string());
        Ok(())
    };

    for def in defs {
        if def.gateway4.is_some() {
            claim((Family::V4, ROUTE_TABLE_UNSPEC, ROUTE_METRIC_UNSPEC), &def.id)?;
        }
        if def.gateway6.is_some() {
            claim((Family::V6, ROUTE_TABLE_UNSPEC, ROUTE_METRIC_UNSPEC), &def.id)?;
        }
        for route in &def.routes {
            if !route.is_default() {
                continue;
            }
            let family = match route.family() {
                Some(family) => family,
                // A bare `to: default` resolves through the gateway
                None => continue,
            };
            claim(
                (family, route.table_or_unspec(), route.metric_or_unspec()),
                &def.id,
            )?;
        }
    }
    Ok(())
}
