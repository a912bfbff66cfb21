//! Instrumentation fragment injected into every preview document.
//!
//! The fragment is a single inline `<script>` that installs the console bridge
//! (see `instrument.js`) before any user code runs.

use std::sync::LazyLock;

/// Source identifier carried by every boundary message from the shim.
pub const SOURCE_TAG: &str = "livemarkup-console";

const CONSOLE_BRIDGE_JS: &str = include_str!("instrument.js");

static FRAGMENT: LazyLock<String> = LazyLock::new(|| {
    // serde_json gives us a correctly escaped JS string literal
    let tag = serde_json::Value::from(SOURCE_TAG);
    format!("<script>\n({})({});\n</script>", CONSOLE_BRIDGE_JS.trim_end(), tag)
});

/// The `<script>` block that installs the console bridge.
pub fn fragment() -> &'static str {
    FRAGMENT.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_is_one_script_block() {
        let fragment = fragment();
        assert!(fragment.starts_with("<script>"));
        assert!(fragment.ends_with("</script>"));
        assert_eq!(fragment.matches("<script").count(), 1);
        assert_eq!(fragment.matches("</script").count(), 1);
    }

    #[test]
    fn test_fragment_invokes_bridge_with_tag() {
        assert!(fragment().contains(r#"})("livemarkup-console");"#));
    }
}
