//! Environment variable handling.

use std::env;

/// Gateway URL override.
pub const GATEWAY_URL_VAR: &str = "GATELINK_GATEWAY_URL";

/// Shared gateway token override.
pub const TOKEN_VAR: &str = "GATELINK_TOKEN";

/// Gateway password override.
pub const PASSWORD_VAR: &str = "GATELINK_PASSWORD";

/// Hex-encoded master key used to seal the device private key at rest.
pub const MASTER_KEY_VAR: &str = "GATELINK_MASTER_KEY";

/// Get an environment variable, returning None if not set or empty.
pub fn get_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
pub fn get_var_or(name: &str, default: &str) -> String {
    get_var(name).unwrap_or_else(|| default.to_string())
}

/// Get an environment variable as a boolean.
pub fn get_bool(name: &str) -> bool {
    get_var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// Best-effort BCP-47 locale from the POSIX locale variables.
///
/// `en_US.UTF-8` becomes `en-US`; `C`/`POSIX` and unset fall back to `en-US`.
pub fn locale() -> String {
    let raw = get_var("LC_ALL")
        .or_else(|| get_var("LC_MESSAGES"))
        .or_else(|| get_var("LANG"));
    match raw {
        Some(value) => normalize_locale(&value),
        None => "en-US".to_string(),
    }
}

fn normalize_locale(value: &str) -> String {
    let base = value.split(['.', '@']).next().unwrap_or_default();
    if base.is_empty() || base == "C" || base == "POSIX" {
        return "en-US".to_string();
    }
    base.replace('_', "-")
}
