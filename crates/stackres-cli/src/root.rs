use stackres_core::paths;
use std::path::{Path, PathBuf};

/// Resolve the store root directory.
///
/// Priority:
/// 1. `--root` flag / `STACKRES_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.stackres/`
/// 3. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_store(&cwd).unwrap_or(cwd)
}

fn find_store(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(paths::STORE_DIR).is_dir())
        .map(Path::to_path_buf)
}
