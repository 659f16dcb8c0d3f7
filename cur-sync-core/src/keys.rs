//! Key-path rules: pure functions over object keys.
//!
//! Report deliveries write the manifest twice: once at a stable top-level key and once
//! inside the `<start>-<end>/<generation id>/` folder of that delivery. Only the
//! top-level copy may trigger the pipeline.

use std::sync::LazyLock;

use regex::Regex;

const YEAR_MONTH_DAY: &str = r"(20[0-9]{2})(0[1-9]|1[0-2])(0[1-9]|[1-2][0-9]|3[0-1])";

/// 8-4-4-4-12 hex, version nibble `4`, optional braces.
const GENERATION_ID_PATTERN: &str =
    r"\{?[0-9a-f]{8}-?[0-9a-f]{4}-?4[0-9a-f]{3}-?[0-9a-f]{4}-?[0-9a-f]{12}\}?";

// Groups: 1-3 start date, 4-6 end date, 7 generation id.
static DATE_RANGE_AND_GENERATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        "(?i){YEAR_MONTH_DAY}-{YEAR_MONTH_DAY}/({GENERATION_ID_PATTERN})"
    ))
    .expect("valid date range regex")
});

/// True when `key` is a top-level manifest, i.e. it does not sit inside a
/// `<yyyymmdd>-<yyyymmdd>/<generation id>/` delivery folder.
pub fn is_valid_top_level_manifest(key: &str) -> bool {
    !DATE_RANGE_AND_GENERATION_RE.is_match(key)
}

/// The generation id embedded in a delivery-folder key, if any.
pub fn generation_id_in(key: &str) -> Option<&str> {
    DATE_RANGE_AND_GENERATION_RE
        .captures(key)
        .and_then(|c| c.get(7))
        .map(|m| m.as_str())
}

/// Final `/` segment of a key.
pub fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Listing prefix for a destination folder, always terminated by `/`.
pub fn folder_prefix(prefix: &str) -> String {
    if prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    }
}
