//! Server configuration file for `pygmalion serve`.
//!
//! Everything is optional; an absent file means built-in defaults and the
//! built-in scenario catalog.
//!
//! # Example
//!
//! ```toml
//! [server]
//! port = 8080
//! rate_limit = 600
//! flow_ttl_secs = 7200
//!
//! [sink]
//! kind = "supabase"
//! table = "responses"
//!
//! [[scenarios]]
//! id = "produkt"
//! title = "Bewertung eines Produkts"
//! question = "Wie hochwertig schätzt du dieses Produkt ein?"
//! min_value = 1
//! max_value = 10
//! high_label = "Marke: AURORA Pro Audio."
//! low_label = "Marke: SoundMax Basic."
//! image_url = "/images/produkt.jpg"
//! ```
//!
//! A non-empty `[[scenarios]]` list replaces the built-in catalog entirely.

use std::path::Path;

use pygmalion_core::{Catalog, CatalogError, ScenarioDefinition};
use serde::Deserialize;

/// Default per-IP request budget per minute. Seminar audiences often share
/// one NAT address, so this is generous.
pub(crate) const DEFAULT_RATE_LIMIT: u64 = 600;

/// Idle time after which an unfinished flow is dropped.
pub(crate) const DEFAULT_FLOW_TTL_SECS: u64 = 2 * 60 * 60;

pub(crate) const DEFAULT_PORT: u16 = 8080;

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ConfigFile {
    #[serde(default)]
    pub(crate) server: ServerSettings,
    #[serde(default)]
    pub(crate) sink: SinkSettings,
    #[serde(default)]
    pub(crate) scenarios: Vec<ScenarioDefinition>,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ServerSettings {
    pub(crate) port: u16,
    pub(crate) rate_limit: u64,
    pub(crate) flow_ttl_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            port: DEFAULT_PORT,
            rate_limit: DEFAULT_RATE_LIMIT,
            flow_ttl_secs: DEFAULT_FLOW_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum SinkKind {
    #[default]
    Supabase,
    Memory,
}

/// `[sink]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct SinkSettings {
    pub(crate) kind: SinkKind,
    /// Overrides `SUPABASE_RESPONSES_TABLE`.
    pub(crate) table: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("could not read '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("could not parse '{path}': {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid scenario catalog: {0}")]
    Catalog(#[from] CatalogError),
}

// ── Functions ─────────────────────────────────────────────────────────────────

impl ConfigFile {
    /// The catalog this configuration describes.
    pub(crate) fn catalog(&self) -> Result<Catalog, ConfigError> {
        if self.scenarios.is_empty() {
            return Ok(Catalog::builtin());
        }
        Ok(Catalog::new(self.scenarios.clone())?)
    }
}

/// Read and parse a config file.
pub(crate) fn read_config(path: &Path) -> Result<ConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Read `path` if given, otherwise use defaults; then build the catalog.
pub(crate) fn load(path: Option<&Path>) -> Result<(ConfigFile, Catalog), ConfigError> {
    let config = match path {
        Some(p) => read_config(p)?,
        None => ConfigFile::default(),
    };
    let catalog = config.catalog()?;
    Ok((config, catalog))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pygmalion_core::ScenarioId;

    #[test]
    fn empty_file_uses_defaults() {
        let config: ConfigFile = toml::from_str("").unwrap();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.server.rate_limit, DEFAULT_RATE_LIMIT);
        assert_eq!(config.sink.kind, SinkKind::Supabase);
        assert_eq!(config.catalog().unwrap(), Catalog::builtin());
    }

    #[test]
    fn partial_sections_fill_in_defaults() {
        let config: ConfigFile = toml::from_str(
            r#"
[server]
port = 9000

[sink]
kind = "memory"
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.flow_ttl_secs, DEFAULT_FLOW_TTL_SECS);
        assert_eq!(config.sink.kind, SinkKind::Memory);
        assert_eq!(config.sink.table, None);
    }

    #[test]
    fn scenarios_replace_builtin_catalog() {
        let config: ConfigFile = toml::from_str(
            r#"
[[scenarios]]
id = "person"
title = "T"
question = "Q"
min_value = 0
max_value = 4
high_label = "H"
low_label = "L"
"#,
        )
        .unwrap();
        let catalog = config.catalog().unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.at(0).unwrap().id, ScenarioId::Person);
        assert_eq!(catalog.at(0).unwrap().default_rating(), 2);
    }

    #[test]
    fn invalid_scale_is_rejected() {
        let config: ConfigFile = toml::from_str(
            r#"
[[scenarios]]
id = "person"
title = "T"
question = "Q"
min_value = 5
max_value = 5
high_label = "H"
low_label = "L"
"#,
        )
        .unwrap();
        assert!(matches!(
            config.catalog(),
            Err(ConfigError::Catalog(CatalogError::InvalidScale { .. }))
        ));
    }

    #[test]
    fn unknown_scenario_id_fails_to_parse() {
        let result: Result<ConfigFile, _> = toml::from_str(
            r#"
[[scenarios]]
id = "weltraum"
title = "T"
question = "Q"
min_value = 1
max_value = 5
high_label = "H"
low_label = "L"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<ConfigFile, _> = toml::from_str("[server]\nprot = 1\n");
        assert!(result.is_err());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = read_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
