//! Deep merge of TOML values with per-field source tracking.
//!
//! The merge operates on raw [`toml::Value`] trees rather than deserialized
//! structs, so a key missing from an overlay never clobbers the base layer.

use std::collections::HashMap;

/// Which configuration layer a value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLayer {
    /// Compiled-in defaults (`defaults.toml`).
    Defaults,
    /// User-level configuration (`<config dir>/nexus/config.toml`).
    User,
    /// File passed with `--config` or `NEXUS_CONFIG`.
    File,
    /// Environment variable fallback.
    Environment,
}

impl ConfigLayer {
    /// Short tag used in `config show` annotations.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Defaults => "defaults",
            Self::User => "user",
            Self::File => "file",
            Self::Environment => "env",
        }
    }
}

impl std::fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Defaults => write!(f, "defaults"),
            Self::User => write!(f, "user (<config dir>/nexus/config.toml)"),
            Self::File => write!(f, "explicit config file"),
            Self::Environment => write!(f, "environment variable"),
        }
    }
}

/// Tracks which layer set each field's value.
pub type FieldSources = HashMap<String, ConfigLayer>;

/// Deep-merge `overlay` into `base`, recording which layer set each leaf
/// field.
///
/// - Tables merge recursively per-field.
/// - Scalars and arrays from the overlay **replace** the base value.
///
/// `prefix` is the dotted path prefix (e.g. `"model"`).
pub fn deep_merge_tracking(
    base: &mut toml::Value,
    overlay: &toml::Value,
    prefix: &str,
    layer: &ConfigLayer,
    sources: &mut FieldSources,
) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let path = join_path(prefix, key);

                if let Some(base_val) = base_table.get_mut(key) {
                    if overlay_val.is_table() {
                        deep_merge_tracking(base_val, overlay_val, &path, layer, sources);
                    } else {
                        *base_val = overlay_val.clone();
                        sources.insert(path, layer.clone());
                    }
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                    record_leaves(overlay_val, &path, layer, sources);
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
            sources.insert(prefix.to_owned(), layer.clone());
        },
    }
}

/// Walk a value tree and record every leaf path with `layer`.
pub fn record_leaves(
    val: &toml::Value,
    prefix: &str,
    layer: &ConfigLayer,
    sources: &mut FieldSources,
) {
    if let toml::Value::Table(table) = val {
        for (key, child) in table {
            record_leaves(child, &join_path(prefix, key), layer, sources);
        }
    } else {
        sources.insert(prefix.to_owned(), layer.clone());
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> toml::Value {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn test_overlay_replaces_scalars_and_keeps_absent_keys() {
        let mut base = parse(
            r#"
            [approval]
            ttl_secs = 3600
            namespace = "nexus:approval"
        "#,
        );
        let overlay = parse(
            r"
            [approval]
            ttl_secs = 60
        ",
        );
        let mut sources = FieldSources::new();
        deep_merge_tracking(&mut base, &overlay, "", &ConfigLayer::File, &mut sources);

        assert_eq!(base["approval"]["ttl_secs"].as_integer(), Some(60));
        assert_eq!(
            base["approval"]["namespace"].as_str(),
            Some("nexus:approval")
        );
        assert_eq!(sources.get("approval.ttl_secs"), Some(&ConfigLayer::File));
        assert!(!sources.contains_key("approval.namespace"));
    }

    #[test]
    fn test_arrays_are_replaced_not_appended() {
        let mut base = parse(r#"approval = { dangerous_tools = ["ban_suspicious_ip"] }"#);
        let overlay = parse(
            r#"approval = { dangerous_tools = ["ban_suspicious_ip", "analyze_attack_patterns"] }"#,
        );
        let mut sources = FieldSources::new();
        deep_merge_tracking(&mut base, &overlay, "", &ConfigLayer::User, &mut sources);

        let tools = base["approval"]["dangerous_tools"].as_array().unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(
            sources.get("approval.dangerous_tools"),
            Some(&ConfigLayer::User)
        );
    }

    #[test]
    fn test_new_section_records_all_leaves() {
        let mut base = parse("[gateway]\nbind_addr = \"127.0.0.1:8082\"");
        let overlay = parse(
            r#"
            [storage]
            backend = "surrealkv"
            path = "/var/lib/nexus"
        "#,
        );
        let mut sources = FieldSources::new();
        deep_merge_tracking(&mut base, &overlay, "", &ConfigLayer::User, &mut sources);

        assert_eq!(sources.get("storage.backend"), Some(&ConfigLayer::User));
        assert_eq!(sources.get("storage.path"), Some(&ConfigLayer::User));
    }

    #[test]
    fn test_layer_tags() {
        assert_eq!(ConfigLayer::Environment.tag(), "env");
        assert_eq!(ConfigLayer::Defaults.to_string(), "defaults");
    }
}
