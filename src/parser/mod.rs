//! Layered YAML loading.
//!
//! A [`Parser`] accumulates any number of netplan documents — single files,
//! a whole `{lib,etc,run}/netplan` hierarchy, null-overlay patches — into
//! one merged document. [`crate::State::import`] then lifts the merged
//! document into the typed model and freezes it.

pub mod lift;
pub mod merge;

use crate::NetplanError;
use serde_yaml::Value;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Flags steering import behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserFlags {
    /// Demote per-definition validation errors to warnings and drop the
    /// offending definition instead of failing the import.
    pub ignore_errors: bool,
    /// Run the full pipeline but suppress all file writes.
    pub validation_only: bool,
}

/// Accumulates layered netplan YAML into a single merged document.
#[derive(Debug, Default)]
pub struct Parser {
    /// Merged top-level document (`network: ...`)
    doc: Value,
    /// Every file that contributed
    sources: BTreeSet<PathBuf>,
    /// id -> last file that wrote to the definition
    origins: HashMap<String, PathBuf>,
    /// First-seen order of definition ids
    order: Vec<String>,
    /// Key paths assigned during the current pass
    dirty: BTreeSet<String>,
    /// Key paths removed by null overrides
    null_fields: BTreeSet<String>,
    flags: ParserFlags,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_flags(&mut self, flags: ParserFlags) {
        self.flags = flags;
    }

    pub fn flags(&self) -> ParserFlags {
        self.flags
    }

    /// Ingest one YAML file.
    pub fn load_yaml(&mut self, path: impl AsRef<Path>) -> Result<(), NetplanError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        self.load_document(path, &content)
    }

    /// Ingest YAML from a string, attributed to `name` in error messages
    /// and origin tracking.
    pub fn load_yaml_from_str(
        &mut self,
        name: impl AsRef<Path>,
        content: &str,
    ) -> Result<(), NetplanError> {
        self.load_document(name.as_ref(), content)
    }

    /// Ingest every `*.yaml` under `{lib,etc,run}/netplan/` relative to
    /// `rootdir`. Files are grouped by basename with run > etc > lib
    /// precedence, then processed in ascending byte order of basename.
    pub fn load_yaml_hierarchy(&mut self, rootdir: impl AsRef<Path>) -> Result<(), NetplanError> {
        let rootdir = rootdir.as_ref();
        // Keyed by basename; later directories shadow earlier ones
        let mut by_basename: std::collections::BTreeMap<Vec<u8>, PathBuf> = Default::default();

        for subdir in ["lib/netplan", "etc/netplan", "run/netplan"] {
            let dir = rootdir.join(subdir);
            if !dir.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.extension().is_none_or(|e| e != "yaml") || !path.is_file() {
                    continue;
                }
                let basename = match path.file_name() {
                    Some(name) => name.as_encoded_bytes().to_vec(),
                    None => continue,
                };
                if let Some(shadowed) = by_basename.insert(basename, path.clone()) {
                    debug!("{} shadows {}", path.display(), shadowed.display());
                }
            }
        }

        info!("Loading {} netplan files", by_basename.len());
        for path in by_basename.values() {
            self.load_yaml(path)?;
        }
        Ok(())
    }

    /// Ingest a null-overlay patch: every `null` leaf deletes the key at
    /// the same path from the merged document; the path of a whole
    /// definition deletes the definition.
    pub fn load_nullable_fields(&mut self, reader: impl Read) -> Result<(), NetplanError> {
        let patch: Value = serde_yaml::from_reader(reader)?;
        let deleted = merge::apply_null_overlay(&mut self.doc, &patch);
        for path in deleted {
            debug!("Null overlay removed {}", path);
            self.note_deleted_path(&path);
        }
        Ok(())
    }

    /// Drop all accumulated state, keeping the flags.
    pub fn reset(&mut self) {
        let flags = self.flags;
        *self = Self {
            flags,
            ..Self::default()
        };
    }

    /// Whether a dotted key path was assigned during the current pass.
    pub fn was_written(&self, path: &str) -> bool {
        self.dirty.contains(path)
    }

    pub(crate) fn document(&self) -> &Value {
        &self.doc
    }

    pub(crate) fn sources(&self) -> &BTreeSet<PathBuf> {
        &self.sources
    }

    pub(crate) fn origins(&self) -> &HashMap<String, PathBuf> {
        &self.origins
    }

    pub(crate) fn order(&self) -> &[String] {
        &self.order
    }

    fn load_document(&mut self, path: &Path, content: &str) -> Result<(), NetplanError> {
        debug!("Loading {}", path.display());
        let value: Value = match serde_yaml::from_str(content) {
            Ok(v) => v,
            Err(e) => return Err(syntax_error(path, content, e)),
        };

        let network = match &value {
            Value::Mapping(top) => top.get("network"),
            Value::Null => None,
            _ => {
                return Err(NetplanError::schema(
                    path,
                    "(top level)",
                    "expected a mapping",
                ));
            }
        };
        let network = match network {
            Some(n) => n,
            None => {
                warn!("{} contains no 'network' mapping, ignoring", path.display());
                self.sources.insert(path.to_path_buf());
                return Ok(());
            }
        };

        if let Some(version) = network.get("version") {
            match version.as_u64() {
                Some(2) => {}
                _ => {
                    return Err(NetplanError::schema(
                        path,
                        "network.version",
                        "only version 2 is supported",
                    ));
                }
            }
        }

        self.track_definitions(path, network);

        let mut null_paths = Vec::new();
        merge::merge_yaml_values(&mut self.doc, value, &mut null_paths);
        for null_path in null_paths {
            debug!("{}: null override removed {}", path.display(), null_path);
            self.note_deleted_path(&null_path);
        }

        self.sources.insert(path.to_path_buf());
        Ok(())
    }

    /// Record origin and first-seen order for every definition the file
    /// touches, and the dirty set of assigned key paths.
    fn track_definitions(&mut self, path: &Path, network: &Value) {
        let Value::Mapping(network) = network else {
            return;
        };
        for (group_key, group) in network {
            let group_name = match group_key.as_str() {
                Some(name) if crate::names::DefType::from_group_key(name).is_some() => name,
                _ => continue,
            };
            let Value::Mapping(group) = group else {
                continue;
            };
            for (id, body) in group {
                let Some(id) = id.as_str() else { continue };
                // A group may carry its own default renderer
                if id == "renderer" || body.is_null() {
                    continue;
                }
                self.origins.insert(id.to_string(), path.to_path_buf());
                if !self.order.iter().any(|known| known == id) {
                    self.order.push(id.to_string());
                }
                collect_leaf_paths(
                    body,
                    format!("network.{group_name}.{id}"),
                    &mut self.dirty,
                );
            }
        }
    }

    fn note_deleted_path(&mut self, path: &str) {
        self.null_fields.insert(path.to_string());
        // A three-segment path under a definition group names a whole
        // definition: network.<group>.<id>
        let segments: Vec<&str> = path.split('.').collect();
        if segments.len() == 3
            && segments[0] == "network"
            && crate::names::DefType::from_group_key(segments[1]).is_some()
        {
            let id = segments[2];
            self.order.retain(|known| known != id);
            self.origins.remove(id);
        }
    }
}

fn collect_leaf_paths(value: &Value, prefix: String, out: &mut BTreeSet<String>) {
    match value {
        Value::Mapping(map) => {
            for (key, child) in map {
                let Some(key) = key.as_str() else { continue };
                collect_leaf_paths(child, format!("{prefix}.{key}"), out);
            }
        }
        _ => {
            out.insert(prefix);
        }
    }
}

/// Turn a serde_yaml failure into a `path:line:column` syntax error with a
/// caret excerpt. Tab indentation and alias use get specialized messages.
fn syntax_error(path: &Path, content: &str, err: serde_yaml::Error) -> NetplanError {
    let location = err.location();
    let (line, column) = location
        .map(|l| (l.line(), l.column()))
        .unwrap_or((1, 1));
    let source_line = content.lines().nth(line.saturating_sub(1));

    let raw = err.to_string();
    let message = if source_line.is_some_and(|l| l.starts_with('\t')) {
        "found character '\\t' that cannot start any token".to_string()
    } else if raw.contains("alias") || raw.contains("anchor") {
        "aliases are not supported".to_string()
    } else {
        // serde_yaml appends its own "at line X column Y"; keep the bare text
        match raw.split(" at line ").next() {
            Some(bare) => bare.to_string(),
            None => raw,
        }
    };

    NetplanError::syntax_at(path, line, column, message, source_line)
}
