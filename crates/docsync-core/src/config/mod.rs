//! Runtime configuration for the editor and the remote document surface.
//!
//! Both structs load from the environment through a lookup closure so
//! parsing can be exercised without touching process state.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_RECOVERY_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_APPEND_BATCH_SIZE: usize = 50;
pub const DEFAULT_APPEND_BATCH_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_CHILD_DEPTH: usize = 5;
pub const DEFAULT_PAGE_SIZE: usize = 500;
pub const DEFAULT_TITLE_PREFIX: &str = "[Editing] ";

const DEFAULT_API_BASE_URL: &str = "https://open.feishu.cn";
const DEFAULT_DOC_URL_BASE: &str = "https://feishu.cn/docx";

/// Tunables of the sync engine and session registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorConfig {
    /// Period of each session's sync timer
    pub sync_interval: Duration,
    /// Persisted `editing` sessions younger than this are restored at startup
    pub recovery_window: Duration,
    /// Blocks per append request when creating a document
    pub append_batch_size: usize,
    /// Pause between append requests
    pub append_batch_delay: Duration,
    /// Recursion cap when walking block children
    pub max_child_depth: usize,
    /// Title prefix of documents created for editing
    pub title_prefix: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            sync_interval: DEFAULT_SYNC_INTERVAL,
            recovery_window: DEFAULT_RECOVERY_WINDOW,
            append_batch_size: DEFAULT_APPEND_BATCH_SIZE,
            append_batch_delay: DEFAULT_APPEND_BATCH_DELAY,
            max_child_depth: DEFAULT_MAX_CHILD_DEPTH,
            title_prefix: DEFAULT_TITLE_PREFIX.to_string(),
        }
    }
}

impl EditorConfig {
    pub fn from_env() -> Result<Self> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let sync_interval_ms = parse_in_range(
            &lookup,
            "DOCSYNC_SYNC_INTERVAL_MS",
            1_000..=86_400_000,
            30_000,
        )?;
        let recovery_window_hours =
            parse_in_range(&lookup, "DOCSYNC_RECOVERY_WINDOW_HOURS", 1..=720, 24)?;
        let append_batch_size = parse_in_range(&lookup, "DOCSYNC_APPEND_BATCH_SIZE", 1..=50, 50)?;
        let append_batch_delay_ms =
            parse_in_range(&lookup, "DOCSYNC_APPEND_BATCH_DELAY_MS", 0..=60_000, 500)?;

        Ok(Self {
            sync_interval: Duration::from_millis(sync_interval_ms),
            recovery_window: Duration::from_secs(recovery_window_hours * 60 * 60),
            append_batch_size: usize::try_from(append_batch_size)
                .map_err(|_| Error::Config("DOCSYNC_APPEND_BATCH_SIZE is too large".into()))?,
            append_batch_delay: Duration::from_millis(append_batch_delay_ms),
            ..defaults
        })
    }

    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }
}

/// Endpoint and credentials of the remote document surface
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub api_base_url: String,
    pub app_id: String,
    pub app_secret: String,
    /// Prefix of user-facing document links; the document id is appended
    pub doc_url_base: String,
    /// Open link sharing on newly created documents
    pub share_publicly: bool,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("api_base_url", &self.api_base_url)
            .field("app_id", &self.app_id)
            .field("app_secret", &"[REDACTED]")
            .field("doc_url_base", &self.doc_url_base)
            .field("share_publicly", &self.share_publicly)
            .finish()
    }
}

impl RemoteConfig {
    /// Load from the environment; `Ok(None)` when no credentials are set
    pub fn from_env() -> Result<Option<Self>> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        let app_id = optional_trimmed(&lookup, "DOCSYNC_APP_ID");
        let app_secret = optional_trimmed(&lookup, "DOCSYNC_APP_SECRET");

        let (app_id, app_secret) = match (app_id, app_secret) {
            (None, None) => return Ok(None),
            (Some(_), None) => {
                return Err(Error::Config(
                    "Missing required environment variable: DOCSYNC_APP_SECRET".into(),
                ))
            }
            (None, Some(_)) => {
                return Err(Error::Config(
                    "Missing required environment variable: DOCSYNC_APP_ID".into(),
                ))
            }
            (Some(id), Some(secret)) => (id, secret),
        };

        let api_base_url = http_url_or_default(&lookup, "DOCSYNC_API_BASE_URL", DEFAULT_API_BASE_URL)?;
        let doc_url_base = http_url_or_default(&lookup, "DOCSYNC_DOC_URL_BASE", DEFAULT_DOC_URL_BASE)?;
        let share_publicly = optional_trimmed(&lookup, "DOCSYNC_SHARE_PUBLICLY").map_or(true, |value| {
            matches!(
                value.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        });

        Ok(Some(Self {
            api_base_url,
            app_id,
            app_secret,
            doc_url_base,
            share_publicly,
        }))
    }

    /// User-facing link of a document
    pub fn document_url(&self, document_id: &str) -> String {
        format!("{}/{document_id}", self.doc_url_base)
    }
}

fn parse_in_range(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    range: std::ops::RangeInclusive<u64>,
    default: u64,
) -> Result<u64> {
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(default);
    };
    let value = raw.parse::<u64>().map_err(|_| {
        Error::Config(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    })?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(Error::Config(format!(
            "{name} must be in [{}, {}]",
            range.start(),
            range.end()
        )))
    }
}

fn http_url_or_default(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
) -> Result<String> {
    let value = optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string());
    if is_http_url(&value) {
        Ok(value.trim_end_matches('/').to_string())
    } else {
        Err(Error::Config(format!(
            "{name} must start with http:// or https://"
        )))
    }
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    normalize_text_option(lookup(name))
}
