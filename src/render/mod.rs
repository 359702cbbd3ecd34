//! Configuration renderers.
//!
//! Converts a frozen [`State`] into backend-native configuration files.
//!
//! Supported renderers:
//! - `networkd` - systemd-networkd (*.link/*.netdev/*.network files plus
//!   udev rules, wpa_supplicant units and the wait-online override)
//! - `network_manager` - NetworkManager keyfile profiles
//! - `ovs` - OpenVSwitch systemd units invoking ovs-vsctl
//! - `sriov` - SR-IOV apply/rebind units
//!
//! Every renderer follows the cleanup-then-generate discipline: it first
//! deletes the complete set of files it owns (identified by stable name
//! patterns), then writes new ones. Cleanup is idempotent and never
//! touches files outside those patterns.

pub mod network_manager;
pub mod networkd;
pub mod ovs;
pub mod sriov;

use crate::NetplanError;
use crate::names::Backend;
use crate::state::State;
use crate::types::NetDef;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A rendered configuration file, relative to the output root.
#[derive(Debug, Clone)]
pub struct RenderedFile {
    pub path: PathBuf,
    pub content: String,
    /// File permissions (octal); 0o600 for anything carrying secrets
    pub mode: u32,
}

/// A symlink to create, both ends relative to the output root.
#[derive(Debug, Clone)]
pub struct RenderedSymlink {
    pub link: PathBuf,
    pub target: PathBuf,
}

/// Everything one render pass produces.
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    pub files: Vec<RenderedFile>,
    pub symlinks: Vec<RenderedSymlink>,
}

impl Artifacts {
    pub fn push_file(&mut self, path: impl Into<PathBuf>, content: String, mode: u32) {
        self.files.push(RenderedFile {
            path: path.into(),
            content,
            mode,
        });
    }

    pub fn push_symlink(&mut self, link: impl Into<PathBuf>, target: impl Into<PathBuf>) {
        self.symlinks.push(RenderedSymlink {
            link: link.into(),
            target: target.into(),
        });
    }

    pub fn extend(&mut self, other: Artifacts) {
        self.files.extend(other.files);
        self.symlinks.extend(other.symlinks);
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.symlinks.is_empty()
    }
}

/// Trait for configuration renderers.
pub trait Renderer {
    /// Render every definition this backend owns.
    fn render(&self, state: &State) -> Result<Artifacts, NetplanError>;

    /// The backend this renderer serves.
    fn backend(&self) -> Backend;

    /// Delete all files a previous generation pass produced.
    fn cleanup(&self, rootdir: &Path) -> Result<(), NetplanError>;
}

/// Write artifacts under `rootdir`, creating parent directories with mode
/// 0755 and honoring each file's own mode.
pub fn write_artifacts(artifacts: &Artifacts, rootdir: &Path) -> Result<(), NetplanError> {
    for file in &artifacts.files {
        let full_path = rootdir.join(&file.path);
        debug!("Writing {}", full_path.display());
        if let Some(parent) = file.path.parent() {
            create_dirs(rootdir, parent)?;
        }
        fs::write(&full_path, &file.content)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, fs::Permissions::from_mode(file.mode))?;
        }
    }

    for symlink in &artifacts.symlinks {
        let link = rootdir.join(&symlink.link);
        debug!("Linking {} -> {}", link.display(), symlink.target.display());
        if let Some(parent) = symlink.link.parent() {
            create_dirs(rootdir, parent)?;
        }
        if link.symlink_metadata().is_ok() {
            fs::remove_file(&link)?;
        }
        #[cfg(unix)]
        std::os::unix::fs::symlink(&symlink.target, &link)?;
        #[cfg(not(unix))]
        return Err(NetplanError::Io(std::io::Error::other(
            "symlinks are only supported on unix",
        )));
    }
    Ok(())
}

/// Create `relative` under `rootdir` component by component with mode
/// 0755. Permissions are set explicitly so the process umask does not
/// leak into generated directories.
fn create_dirs(rootdir: &Path, relative: &Path) -> Result<(), NetplanError> {
    let mut current = rootdir.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match fs::create_dir(&current) {
            Ok(()) => {
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    fs::set_permissions(&current, fs::Permissions::from_mode(0o755))?;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Delete every file in `dir` whose name starts with `prefix` and ends
/// with `suffix`. Missing directories are fine; nothing outside `dir` is
/// ever touched.
pub(crate) fn remove_matching(
    rootdir: &Path,
    dir: &str,
    prefix: &str,
    suffix: &str,
) -> Result<(), NetplanError> {
    let dir = rootdir.join(dir);
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with(prefix) && name.ends_with(suffix) {
            debug!("Removing {}", path.display());
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Like [`remove_matching`], but matching an infix anywhere in the name.
pub(crate) fn remove_containing(
    rootdir: &Path,
    dir: &str,
    infix: &str,
    suffix: &str,
) -> Result<(), NetplanError> {
    let dir = rootdir.join(dir);
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.contains(infix) && name.ends_with(suffix) {
            debug!("Removing {}", path.display());
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

fn all_renderers() -> Vec<Box<dyn Renderer>> {
    vec![
        Box::new(networkd::NetworkdRenderer),
        Box::new(network_manager::NetworkManagerRenderer),
        Box::new(ovs::OvsRenderer),
        Box::new(sriov::SriovRenderer),
    ]
}

impl State {
    /// Full generation pass: clean up everything previously generated,
    /// then render and write every backend's files. With the
    /// VALIDATION_ONLY flag nothing is written.
    pub fn generate(&self, rootdir: impl AsRef<Path>) -> Result<(), NetplanError> {
        let rootdir = rootdir.as_ref();
        if self.flags().validation_only {
            info!("Validation-only run, suppressing file writes");
            for renderer in all_renderers() {
                renderer.render(self)?;
            }
            return Ok(());
        }
        for renderer in all_renderers() {
            renderer.cleanup(rootdir)?;
        }
        for renderer in all_renderers() {
            let artifacts = renderer.render(self)?;
            write_artifacts(&artifacts, rootdir)?;
        }
        Ok(())
    }

    /// Write the networkd family files for one definition.
    pub fn write_networkd(
        &self,
        def: &NetDef,
        rootdir: impl AsRef<Path>,
    ) -> Result<(), NetplanError> {
        let artifacts = networkd::render_netdef(self, def)?;
        self.write_unless_validating(&artifacts, rootdir.as_ref())
    }

    /// Write the NetworkManager keyfiles for one definition.
    pub fn write_nm(&self, def: &NetDef, rootdir: impl AsRef<Path>) -> Result<(), NetplanError> {
        let artifacts = network_manager::render_netdef(self, def)?;
        self.write_unless_validating(&artifacts, rootdir.as_ref())
    }

    /// Write the OVS unit for one definition.
    pub fn write_ovs(&self, def: &NetDef, rootdir: impl AsRef<Path>) -> Result<(), NetplanError> {
        let artifacts = ovs::render_netdef(self, def)?;
        self.write_unless_validating(&artifacts, rootdir.as_ref())
    }

    /// Write the systemd-networkd-wait-online override.
    pub fn write_wait_online(&self, rootdir: impl AsRef<Path>) -> Result<(), NetplanError> {
        let artifacts = networkd::render_wait_online(self);
        self.write_unless_validating(&artifacts, rootdir.as_ref())
    }

    /// Write the NetworkManager global configuration (unmanaged devices,
    /// udev rules).
    pub fn write_nm_finish(&self, rootdir: impl AsRef<Path>) -> Result<(), NetplanError> {
        let artifacts = network_manager::render_finish(self)?;
        self.write_unless_validating(&artifacts, rootdir.as_ref())
    }

    /// Write the global OVS finalization unit.
    pub fn write_ovs_finish(&self, rootdir: impl AsRef<Path>) -> Result<(), NetplanError> {
        let artifacts = ovs::render_finish(self)?;
        self.write_unless_validating(&artifacts, rootdir.as_ref())
    }

    /// Write the SR-IOV apply/rebind units.
    pub fn write_sriov_finish(&self, rootdir: impl AsRef<Path>) -> Result<(), NetplanError> {
        let artifacts = sriov::render_finish(self)?;
        self.write_unless_validating(&artifacts, rootdir.as_ref())
    }

    fn write_unless_validating(
        &self,
        artifacts: &Artifacts,
        rootdir: &Path,
    ) -> Result<(), NetplanError> {
        if self.flags().validation_only {
            return Ok(());
        }
        write_artifacts(artifacts, rootdir)
    }
}
