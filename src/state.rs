//! The frozen, validated configuration state.
//!
//! [`State::import`] consumes a [`Parser`], lifts the merged document into
//! the typed model, runs the validator passes and resolves cross links.
//! After freezing, the parser scaffolding (origins, dirty set, null set)
//! is gone; renderers only ever see a `State`.

use crate::NetplanError;
use crate::names::{Backend, DefType};
use crate::parser::lift::{Lifted, lift_document};
use crate::parser::{Parser, ParserFlags};
use crate::types::NetDef;
use crate::types::ovs::OvsSettings;
use crate::validator;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A frozen collection of validated definitions plus globals.
#[derive(Debug, Default)]
pub struct State {
    /// Definitions in first-seen parse order; owns the data
    defs: Vec<NetDef>,
    /// id -> index into `defs`
    index: HashMap<String, usize>,
    global_backend: Backend,
    global_ovs: OvsSettings,
    sources: BTreeSet<PathBuf>,
    flags: ParserFlags,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Freeze the parser's accumulated state into a `State`.
    pub fn import(parser: Parser) -> Result<Self, NetplanError> {
        let flags = parser.flags();
        let mut lifted = lift_document(parser.document(), parser.origins(), parser.order())?;

        resolve_missing_references(&mut lifted, flags, parser.origins())?;
        resolve_backends(&mut lifted);

        // Pass 1 + 2, per definition
        let mut kept = Vec::with_capacity(lifted.defs.len());
        for def in lifted.defs {
            let result =
                validator::validate_grammar(&def).and_then(|()| validator::validate_backend_rules(&def));
            match result {
                Ok(()) => kept.push(def),
                Err(e) if flags.ignore_errors && e.is_ignorable() => {
                    warn!("Ignoring definition '{}': {}", def.id, e);
                }
                Err(e) => return Err(e),
            }
        }

        // Pass 3, whole graph; with IGNORE_ERRORS drop offenders and retry
        loop {
            match validator::validate_graph(&mut kept) {
                Ok(()) => break,
                Err(e) if flags.ignore_errors && e.is_ignorable() => {
                    let message = e.to_string();
                    let offender = kept
                        .iter()
                        .position(|d| message.starts_with(&format!("{}:", d.id)));
                    match offender {
                        Some(pos) => {
                            let dropped = kept.remove(pos);
                            warn!("Ignoring definition '{}': {}", dropped.id, message);
                        }
                        None => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }

        assign_uuids(&mut kept);

        let index: HashMap<String, usize> = kept
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id.clone(), i))
            .collect();
        info!("Imported {} network definitions", kept.len());

        Ok(Self {
            defs: kept,
            index,
            global_backend: lifted.global_backend,
            global_ovs: lifted.global_ovs,
            sources: parser.sources().clone(),
            flags,
        })
    }

    /// Iterate definitions in parse order.
    pub fn iter_netdefs(&self) -> impl Iterator<Item = &NetDef> {
        self.defs.iter()
    }

    /// Iterate definitions of one type, in parse order.
    pub fn netdefs_by_type(&self, def_type: DefType) -> impl Iterator<Item = &NetDef> {
        self.defs.iter().filter(move |d| d.def_type() == def_type)
    }

    pub fn get_netdef(&self, id: &str) -> Option<&NetDef> {
        self.index.get(id).map(|&i| &self.defs[i])
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// The global backend selected by `network.renderer`.
    pub fn backend(&self) -> Backend {
        self.global_backend
    }

    /// Global `openvswitch:` settings.
    pub fn global_ovs(&self) -> &OvsSettings {
        &self.global_ovs
    }

    /// Whether any global setting differs from the defaults.
    pub fn has_nondefault_globals(&self) -> bool {
        self.global_backend != Backend::None || self.global_ovs.is_nondefault()
    }

    /// Every file that contributed to this state.
    pub fn sources(&self) -> &BTreeSet<PathBuf> {
        &self.sources
    }

    pub fn flags(&self) -> ParserFlags {
        self.flags
    }

    /// Serialize the whole state as canonical YAML.
    pub fn dump_yaml(&self, writer: impl std::io::Write) -> Result<(), NetplanError> {
        crate::emit::dump_state(self, writer)
    }
}

/// A reference to an id nothing defines is an import error pointing at the
/// referencing definition; with IGNORE_ERRORS the referencing definition is
/// dropped instead.
fn resolve_missing_references(
    lifted: &mut Lifted,
    flags: ParserFlags,
    origins: &HashMap<String, PathBuf>,
) -> Result<(), NetplanError> {
    while let Some((referrer, target)) = lifted.missing.first().cloned() {
        if !flags.ignore_errors {
            let at = origins
                .get(&referrer)
                .map(|p| format!(" (defined in {})", p.display()))
                .unwrap_or_default();
            return Err(NetplanError::Reference {
                netdef_id: format!("{referrer}{at}"),
                reference: target,
            });
        }
        warn!(
            "Ignoring definition '{}': unknown id '{}'",
            referrer, target
        );
        lifted.defs.retain(|d| d.id != referrer);
        lifted.missing.retain(|(r, _)| *r != referrer);
    }
    Ok(())
}

/// Effective backend: explicit renderer > global renderer > type default.
/// Some types only ever work on one backend, regardless of the global
/// choice.
fn resolve_backends(lifted: &mut Lifted) {
    for def in lifted.defs.iter_mut() {
        let global = match lifted.global_backend {
            Backend::None => Backend::Networkd,
            global => global,
        };
        def.backend = def.renderer.unwrap_or(match def.def_type() {
            DefType::Modem | DefType::NmDevice => Backend::NetworkManager,
            DefType::Port => Backend::OpenVSwitch,
            _ if def.openvswitch.is_some() => Backend::OpenVSwitch,
            _ => global,
        });
        debug!("'{}' renders via {}", def.id, def.backend);

        // Only the settings arm matching the backend survives
        if def.backend == Backend::NetworkManager {
            if def.networkd.take().is_some() {
                warn!("'{}': dropping networkd settings (backend is NM)", def.id);
            }
        } else if let Some(nm) = def.networkmanager.take() {
            if !nm.is_empty() {
                warn!(
                    "'{}': dropping NetworkManager settings (backend is {})",
                    def.id, def.backend
                );
            }
        }
    }
}

/// NetworkManager needs a stable identifier per connection. One arriving
/// through parsed settings wins; otherwise generate once at import so a
/// single state renders consistently.
fn assign_uuids(defs: &mut [NetDef]) {
    for def in defs.iter_mut() {
        if def.backend != Backend::NetworkManager {
            continue;
        }
        let parsed = def.networkmanager.as_ref().and_then(|nm| nm.uuid);
        def.uuid = parsed.or(def.uuid).or_else(|| Some(Uuid::new_v4()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn import_str(yaml: &str) -> Result<State, NetplanError> {
        let mut parser = Parser::new();
        parser.load_yaml_from_str("etc/netplan/test.yaml", yaml)?;
        State::import(parser)
    }

    #[test]
    fn test_import_minimal() {
        let state = import_str(
            "network: {version: 2, renderer: networkd, ethernets: {eth0: {dhcp4: true}}}",
        )
        .unwrap();
        assert_eq!(state.len(), 1);
        let def = state.get_netdef("eth0").unwrap();
        assert_eq!(def.backend, Backend::Networkd);
        assert_eq!(state.backend(), Backend::Networkd);
        assert!(state.has_nondefault_globals());
    }

    #[test]
    fn test_map_and_sequence_agree() {
        let state = import_str(
            r#"
network:
  version: 2
  ethernets:
    eth1: {dhcp4: true}
    eth0: {dhcp4: true}
  bridges:
    br0: {interfaces: [eth0]}
"#,
        )
        .unwrap();
        let from_seq: Vec<&str> = state.iter_netdefs().map(|d| d.id.as_str()).collect();
        assert_eq!(from_seq.len(), 3);
        for id in &from_seq {
            assert_eq!(state.get_netdef(id).unwrap().id, **id);
        }
    }

    #[test]
    fn test_default_backend_by_type() {
        let state = import_str(
            r#"
network:
  version: 2
  ethernets:
    eth0: {dhcp4: true}
  modems:
    wwan0: {apn: internet}
"#,
        )
        .unwrap();
        assert_eq!(state.get_netdef("eth0").unwrap().backend, Backend::Networkd);
        assert_eq!(
            state.get_netdef("wwan0").unwrap().backend,
            Backend::NetworkManager
        );
    }

    #[test]
    fn test_modem_keeps_nm_backend_under_global_networkd() {
        let state = import_str(
            r#"
network:
  version: 2
  renderer: networkd
  modems:
    wwan0: {apn: internet}
"#,
        )
        .unwrap();
        assert_eq!(
            state.get_netdef("wwan0").unwrap().backend,
            Backend::NetworkManager
        );
    }

    #[test]
    fn test_unknown_reference_fails_import() {
        let err = import_str(
            "network: {version: 2, vlans: {vlan10: {id: 10, link: eth9}}}",
        )
        .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("vlan10"));
        assert!(text.contains("eth9"));
        assert!(text.contains("etc/netplan/test.yaml"));
    }

    #[test]
    fn test_ignore_errors_drops_offender() {
        let mut parser = Parser::new();
        parser.set_flags(ParserFlags {
            ignore_errors: true,
            validation_only: false,
        });
        parser
            .load_yaml_from_str(
                "test.yaml",
                r#"
network:
  version: 2
  ethernets:
    eth0: {dhcp4: true}
  vlans:
    vlan10: {id: 10, link: eth9}
"#,
            )
            .unwrap();
        let state = State::import(parser).unwrap();
        assert_eq!(state.len(), 1);
        assert!(state.get_netdef("vlan10").is_none());
    }

    #[test]
    fn test_duplicate_default_route_fails() {
        let err = import_str(
            r#"
network:
  version: 2
  ethernets:
    eth0: {gateway4: 10.0.0.1}
    eth1: {gateway4: 10.0.0.1}
"#,
        )
        .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("duplicate default route"));
        assert!(text.contains("AF_INET"));
    }

    #[test]
    fn test_nm_uuid_assigned_and_stable() {
        let state = import_str(
            r#"
network:
  version: 2
  renderer: NetworkManager
  ethernets:
    eth0: {dhcp4: true}
"#,
        )
        .unwrap();
        let uuid = state.get_netdef("eth0").unwrap().uuid;
        assert!(uuid.is_some());
    }

    #[test]
    fn test_parsed_uuid_wins() {
        let state = import_str(
            r#"
network:
  version: 2
  renderer: NetworkManager
  ethernets:
    eth0:
      dhcp4: true
      networkmanager:
        uuid: 626dd384-8b3d-3690-9511-192b2c79b3fd
"#,
        )
        .unwrap();
        assert_eq!(
            state.get_netdef("eth0").unwrap().uuid.unwrap().to_string(),
            "626dd384-8b3d-3690-9511-192b2c79b3fd"
        );
    }

    #[test]
    fn test_ovs_settings_force_ovs_backend() {
        let state = import_str(
            r#"
network:
  version: 2
  renderer: networkd
  bridges:
    br0:
      openvswitch: {}
      dhcp4: true
"#,
        )
        .unwrap();
        assert_eq!(
            state.get_netdef("br0").unwrap().backend,
            Backend::OpenVSwitch
        );
    }
}
