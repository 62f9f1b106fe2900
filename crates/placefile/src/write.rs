//! Atomic placefile publication.

use std::fs::Permissions;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{PlacefileError, PlacefileResult};
use crate::format::Placefile;

/// Write `placefile` to `path` via a temp file in the same directory and a
/// rename, so readers never observe a partially written file.
///
/// An existing file keeps its permissions. A new one is created
/// world-readable (0644 on Unix) so a web server running as another user
/// can serve it.
pub fn write_atomic(placefile: &Placefile, path: &Path) -> PlacefileResult<()> {
    let io_err = |source: std::io::Error| PlacefileError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(placefile.render().as_bytes()).map_err(io_err)?;
    tmp.flush().map_err(io_err)?;
    if let Some(permissions) = published_permissions(path) {
        tmp.as_file().set_permissions(permissions).map_err(io_err)?;
    }
    tmp.persist(path).map_err(|e| io_err(e.error))?;

    debug!(
        path = %path.display(),
        images = placefile.images.len(),
        "Placefile written"
    );
    Ok(())
}

/// Permissions the published file should carry.
fn published_permissions(path: &Path) -> Option<Permissions> {
    match std::fs::metadata(path) {
        Ok(meta) => Some(meta.permissions()),
        Err(_) => default_permissions(),
    }
}

#[cfg(unix)]
fn default_permissions() -> Option<Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<Permissions> {
    None
}
