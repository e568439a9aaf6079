//! Mapping of plugin-style component names onto the names used in history.

use std::sync::LazyLock;

use regex::Regex;

static COMPONENT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid regex"));

/// Legacy storage name of `name`: `core` is `moodle`, `core_x` and `mod_x`
/// are `x`, anything else well formed is kept. `None` for malformed names.
pub fn legacy_component_name(name: &str) -> Option<String> {
    let name = name.trim();
    if !COMPONENT_NAME.is_match(name) {
        return None;
    }
    if name == "core" {
        return Some("moodle".to_string());
    }
    let legacy = name
        .strip_prefix("core_")
        .or_else(|| name.strip_prefix("mod_"))
        .unwrap_or(name);
    if legacy.is_empty() {
        return None;
    }
    Some(legacy.to_string())
}
