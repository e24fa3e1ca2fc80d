//! Cache directory resolution and Unix permission checks shared by the CRL
//! and OCSP disk tiers. Grounded in the teacher's existing use of `dirs`
//! for its one cache directory, generalized into the resolution chain and
//! the ownership/mode checks the teacher's own comments describe but never
//! implement.

use std::path::PathBuf;

/// Resolve the base cache directory for a given subsystem component
/// (`"crls"`, `"ocsp"`), trying in order:
/// 1. `SF_TEMPORARY_CREDENTIAL_CACHE_DIR` (explicit override)
/// 2. `XDG_CACHE_DIR` if set, else `dirs::cache_dir()`
/// 3. `$HOME/.cache/snowflake`
pub fn resolve_cache_dir(component: &str) -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("SF_TEMPORARY_CREDENTIAL_CACHE_DIR") {
        let mut p = PathBuf::from(dir);
        p.push(component);
        return Some(p);
    }
    if let Some(mut p) = std::env::var("XDG_CACHE_DIR")
        .ok()
        .map(PathBuf::from)
        .or_else(dirs::cache_dir)
    {
        p.push("snowflake");
        p.push(component);
        return Some(p);
    }
    if let Ok(home) = std::env::var("HOME") {
        let mut p = PathBuf::from(home);
        p.push(".cache");
        p.push("snowflake");
        p.push(component);
        return Some(p);
    }
    None
}

/// Create `dir` with mode 0700 on Unix if it doesn't already exist, and
/// verify an existing directory's mode — callers should treat a mismatch
/// as a reason to skip the disk tier rather than fail outright.
#[cfg(unix)]
pub fn ensure_dir_permissions(dir: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
        return Ok(());
    }
    let meta = std::fs::metadata(dir)?;
    if meta.permissions().mode() & 0o777 != 0o700 {
        tracing::warn!(
            target: "sf_core::config",
            path = %dir.display(),
            "cache directory has unexpected permissions, tightening to 0700"
        );
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn ensure_dir_permissions(dir: &std::path::Path) -> std::io::Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Returns whether `path`'s mode matches the expected 0600 file mode. On
/// non-Unix platforms this always returns `true` (no mode bits to check).
#[cfg(unix)]
pub fn file_mode_matches(path: &std::path::Path, expected: u32) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.permissions().mode() & 0o777 == expected)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn file_mode_matches(_path: &std::path::Path, _expected: u32) -> bool {
    true
}

/// Set a freshly written cache file to mode 0600 on Unix.
#[cfg(unix)]
pub fn set_file_mode_0600(path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
pub fn set_file_mode_0600(_path: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}
