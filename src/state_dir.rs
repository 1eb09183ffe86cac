//! Platform-appropriate state directory resolution, shared by the Tracking
//! Store and the Frequency Guard so both land in the same place.
//!
//! Precedence: `$XDG_STATE_HOME/tenangdb/`, then the platform state dir via
//! `dirs` (falling back to `~/.local/state/tenangdb` on Unix), then
//! `std::env::temp_dir().join("tenangdb")` as a last resort for read-only-home
//! or ephemeral container environments.

use std::path::PathBuf;

use anyhow::Context;

pub fn resolve() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        if !xdg.trim().is_empty() {
            return PathBuf::from(xdg).join("tenangdb");
        }
    }

    if let Some(state) = dirs::state_dir() {
        return state.join("tenangdb");
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".local").join("state").join("tenangdb");
    }

    std::env::temp_dir().join("tenangdb")
}

/// Ensures the resolved directory exists, creating it (and parents) if not.
pub fn ensure() -> anyhow::Result<PathBuf> {
    let dir = resolve();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating state directory {}", dir.display()))?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xdg_state_home_takes_precedence() {
        std::env::set_var("XDG_STATE_HOME", "/tmp/xdg-test-state");
        assert_eq!(resolve(), PathBuf::from("/tmp/xdg-test-state/tenangdb"));
        std::env::remove_var("XDG_STATE_HOME");
    }
}
