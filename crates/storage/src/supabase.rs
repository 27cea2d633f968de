//! Supabase sink -- inserts records through the PostgREST API.
//!
//! Uses `ureq` (sync) wrapped in `tokio::task::spawn_blocking` to avoid
//! blocking the async runtime. Each append is a single
//! `POST {url}/rest/v1/{table}` with `Prefer: return=minimal`.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::SinkError;
use crate::record::ResponseRecord;
use crate::traits::ResponseSink;

/// Table name used when none is configured.
pub const DEFAULT_RESPONSES_TABLE: &str = "responses";

/// Upper bound for one insert round trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const URL_VARS: [&str; 2] = ["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"];
const KEY_VARS: [&str; 2] = ["SUPABASE_ANON_KEY", "NEXT_PUBLIC_SUPABASE_ANON_KEY"];
const TABLE_VAR: &str = "SUPABASE_RESPONSES_TABLE";

static SHARED: OnceLock<Arc<SupabaseSink>> = OnceLock::new();

// ──────────────────────────────────────────────
// SupabaseConfig
// ──────────────────────────────────────────────

/// Project URL, anon key and target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
    pub table: String,
}

impl SupabaseConfig {
    /// Read credentials from the process environment.
    ///
    /// `SUPABASE_URL` / `SUPABASE_ANON_KEY` win over the
    /// `NEXT_PUBLIC_`-prefixed names. `SUPABASE_RESPONSES_TABLE` overrides
    /// the table.
    pub fn from_env() -> Result<Self, SinkError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) but with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SinkError> {
        let url = first_set(&lookup, &URL_VARS).ok_or_else(|| SinkError::MissingCredentials {
            variable: URL_VARS[0].to_string(),
        })?;
        let anon_key = first_set(&lookup, &KEY_VARS).ok_or_else(|| SinkError::MissingCredentials {
            variable: KEY_VARS[0].to_string(),
        })?;
        let table = first_set(&lookup, &[TABLE_VAR])
            .unwrap_or_else(|| DEFAULT_RESPONSES_TABLE.to_string());

        Ok(SupabaseConfig {
            url,
            anon_key,
            table,
        })
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// `{url}/rest/v1/{table}`
    pub fn insert_url(&self) -> String {
        format!("{}/rest/v1/{}", self.url.trim_end_matches('/'), self.table)
    }
}

/// First non-blank value among `names`.
fn first_set(lookup: &impl Fn(&str) -> Option<String>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| lookup(name).filter(|v| !v.trim().is_empty()))
}

// ──────────────────────────────────────────────
// SupabaseSink
// ──────────────────────────────────────────────

pub struct SupabaseSink {
    config: SupabaseConfig,
    agent: ureq::Agent,
}

impl SupabaseSink {
    pub fn new(config: SupabaseConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build()
            .into();
        SupabaseSink { config, agent }
    }

    /// The process-wide sink, built from the environment on first use.
    ///
    /// Fails with [`SinkError::MissingCredentials`] until the credentials
    /// are present; once built, the same handle is returned forever.
    pub fn shared() -> Result<Arc<SupabaseSink>, SinkError> {
        if let Some(sink) = SHARED.get() {
            return Ok(sink.clone());
        }
        let config = SupabaseConfig::from_env()?;
        Ok(SHARED
            .get_or_init(|| Arc::new(SupabaseSink::new(config)))
            .clone())
    }

    pub fn config(&self) -> &SupabaseConfig {
        &self.config
    }
}

#[async_trait]
impl ResponseSink for SupabaseSink {
    async fn append(&self, record: &ResponseRecord) -> Result<(), SinkError> {
        let url = self.config.insert_url();
        let anon_key = self.config.anon_key.clone();
        let agent = self.agent.clone();
        let body = record.clone();

        let result = tokio::task::spawn_blocking(move || {
            agent
                .post(&url)
                .header("apikey", &anon_key)
                .header("Authorization", &format!("Bearer {}", anon_key))
                .header("Prefer", "return=minimal")
                .send_json(&body)
                .map(|_| ())
                .map_err(|e| match e {
                    ureq::Error::StatusCode(status) => SinkError::Rejected { status },
                    other => SinkError::Transport(other.to_string()),
                })
        })
        .await
        .map_err(|e| SinkError::Backend(format!("task join error: {}", e)))?;

        match &result {
            Ok(()) => tracing::debug!(
                table = %self.config.table,
                session = %record.session_id,
                scenario = %record.scenario,
                "inserted response"
            ),
            Err(e) => tracing::warn!(
                table = %self.config.table,
                session = %record.session_id,
                scenario = %record.scenario,
                error = %e,
                "failed to insert response"
            ),
        }

        result
    }

    fn sink_id(&self) -> &str {
        "supabase"
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pygmalion_core::{Condition, ScenarioId, SessionId};
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn config_reads_primary_names() {
        let config = SupabaseConfig::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://abc.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
        ]))
        .unwrap();
        assert_eq!(config.url, "https://abc.supabase.co");
        assert_eq!(config.anon_key, "anon");
        assert_eq!(config.table, DEFAULT_RESPONSES_TABLE);
    }

    #[test]
    fn config_falls_back_to_next_public_names() {
        let config = SupabaseConfig::from_lookup(lookup(&[
            ("NEXT_PUBLIC_SUPABASE_URL", "https://x.supabase.co"),
            ("NEXT_PUBLIC_SUPABASE_ANON_KEY", "k"),
            ("SUPABASE_RESPONSES_TABLE", "seminar_responses"),
        ]))
        .unwrap();
        assert_eq!(config.url, "https://x.supabase.co");
        assert_eq!(config.table, "seminar_responses");
    }

    #[test]
    fn primary_name_wins_over_fallback() {
        let config = SupabaseConfig::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://primary"),
            ("NEXT_PUBLIC_SUPABASE_URL", "https://fallback"),
            ("SUPABASE_ANON_KEY", "k"),
        ]))
        .unwrap();
        assert_eq!(config.url, "https://primary");
    }

    #[test]
    fn missing_url_is_reported() {
        let err = SupabaseConfig::from_lookup(lookup(&[("SUPABASE_ANON_KEY", "k")])).unwrap_err();
        assert!(
            matches!(err, SinkError::MissingCredentials { ref variable } if variable == "SUPABASE_URL")
        );
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let err = SupabaseConfig::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://x"),
            ("SUPABASE_ANON_KEY", "  "),
        ]))
        .unwrap_err();
        assert!(
            matches!(err, SinkError::MissingCredentials { ref variable } if variable == "SUPABASE_ANON_KEY")
        );
    }

    #[test]
    fn insert_url_trims_trailing_slash() {
        let config = SupabaseConfig {
            url: "https://abc.supabase.co/".into(),
            anon_key: "k".into(),
            table: "responses".into(),
        };
        assert_eq!(config.insert_url(), "https://abc.supabase.co/rest/v1/responses");
        assert_eq!(
            config.with_table("other").insert_url(),
            "https://abc.supabase.co/rest/v1/other"
        );
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        let sink = SupabaseSink::new(SupabaseConfig {
            url: "http://127.0.0.1:1".into(),
            anon_key: "k".into(),
            table: "responses".into(),
        });
        let record = ResponseRecord {
            session_id: SessionId::default(),
            scenario: ScenarioId::Person,
            condition: Condition::High,
            rating: 5,
        };
        let result = sink.append(&record).await;
        assert!(matches!(result, Err(SinkError::Transport(_))), "{:?}", result);
        assert_eq!(sink.sink_id(), "supabase");
    }
}
