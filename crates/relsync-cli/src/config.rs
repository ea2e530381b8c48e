//! Runtime settings, resolved flag > environment > default.

use std::env;

/// Dry-run toggle; case-insensitively truthy on `"true"` only.
pub const DRY_RUN_ENV: &str = "RELSYNC_DRY_RUN";
/// Relationship store CLI override.
pub const ZED_BIN_ENV: &str = "RELSYNC_ZED_BIN";
/// Inventory query CLI override.
pub const GABI_BIN_ENV: &str = "RELSYNC_GABI_BIN";

const DEFAULT_ZED_BIN: &str = "zed";
const DEFAULT_GABI_BIN: &str = "gabi";

/// Resolved runtime settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Narrate commands without mutating the store.
    pub dry_run: bool,
    /// Relationship store CLI binary.
    pub zed_bin: String,
    /// Inventory query CLI binary.
    pub gabi_bin: String,
}

impl Settings {
    pub fn resolve(
        dry_run_flag: bool,
        zed_flag: Option<String>,
        gabi_flag: Option<String>,
    ) -> Self {
        Self {
            dry_run: dry_run_flag || env_truthy(DRY_RUN_ENV),
            zed_bin: resolve_bin(zed_flag, ZED_BIN_ENV, DEFAULT_ZED_BIN),
            gabi_bin: resolve_bin(gabi_flag, GABI_BIN_ENV, DEFAULT_GABI_BIN),
        }
    }
}

fn resolve_bin(flag: Option<String>, env_key: &str, default: &str) -> String {
    flag.or_else(|| env::var(env_key).ok().filter(|value| !value.is_empty()))
        .unwrap_or_else(|| default.to_string())
}

fn env_truthy(key: &str) -> bool {
    env::var(key).is_ok_and(|value| value.trim().eq_ignore_ascii_case("true"))
}
