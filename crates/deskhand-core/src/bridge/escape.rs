//! AppleScript string literal escaping

/// Escape a string for embedding between double quotes in AppleScript source.
///
/// Backslashes are escaped before quotes; the reverse order would double the
/// backslash inserted in front of each quote. Everything else, including
/// single quotes, tabs and newlines, passes through untouched.
///
/// Not idempotent: escape each literal exactly once.
pub fn escape(input: &str) -> String {
    input.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Escape and wrap in double quotes, ready to interpolate as a literal
pub fn quote(input: &str) -> String {
    format!("\"{}\"", escape(input))
}
