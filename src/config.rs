//! Engine configuration (spec.md §6's optional environment-inheritance
//! extension, plus the codec's `CodecOverflow` threshold).
//!
//! Loaded the way `lgn-worker/src/config/mod.rs` loads its `Config`: a
//! built-in default overlaid by an optional TOML file overlaid by
//! environment variables, via the `config` crate. This kernel's configurable
//! surface is much smaller than the teacher's, so there is one flat struct
//! rather than a tree of sub-configs.

use serde::Deserialize;

use crate::codec::DEFAULT_MAX_LEN_PREFIX;

const DEFAULT_CONFIG_TOML: &str = r#"
database_path = "b.cache"
max_len_prefix = 16777216
inherit_environment = true
"#;

/// The engine's configurable knobs. Everything the kernel exposes beyond
/// this is either a construction-time argument (the registry, the root
/// question) or not configurable at all (there is no dial for the
/// single-threaded scheduling model of spec.md §5).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the SQLite backing file (spec.md §1, §10.6).
    pub database_path: String,
    /// Ceiling on a single length-prefixed codec read (spec.md §4.1,
    /// `CodecOverflow`).
    pub max_len_prefix: u64,
    /// Whether spawned child processes inherit this process's environment
    /// (spec.md §6, "optional extension, out of scope for core spec" - the
    /// one switch the spec allows).
    pub inherit_environment: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: "b.cache".to_string(),
            max_len_prefix: DEFAULT_MAX_LEN_PREFIX,
            inherit_environment: true,
        }
    }
}

impl EngineConfig {
    /// Loads defaults, then `path` if given, then `B_`-prefixed environment
    /// overrides (`B_DATABASE_PATH`, `B_MAX_LEN_PREFIX`,
    /// `B_INHERIT_ENVIRONMENT`) - mirroring `Config::load`'s
    /// default-then-file-then-environment layering. The separator is `__`,
    /// not `_`, exactly as `lgn-worker/src/config/mod.rs` sets it: the
    /// prefix is stripped on its own single `_`, and only a double
    /// underscore in what remains would introduce nesting, so a single
    /// underscore inside a flat field name like `database_path` survives
    /// intact instead of splitting into a nested table.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG_TOML, config::FileFormat::Toml));

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("B")
                .separator("__")
                .ignore_empty(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_builtin_toml() {
        let loaded = EngineConfig::load(None).unwrap();
        assert_eq!(loaded, EngineConfig::default());
    }

    #[test]
    fn environment_override_wins() {
        std::env::set_var("B_DATABASE_PATH", "override.cache");
        let loaded = EngineConfig::load(None).unwrap();
        std::env::remove_var("B_DATABASE_PATH");
        assert_eq!(loaded.database_path, "override.cache");
    }
}
