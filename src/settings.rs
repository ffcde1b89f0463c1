//! Relay configuration.
//!
//! Settings are read from a JSON file, deep-merged over [`AppSettings::defaults`]
//! and then validated into immutable values.  Validation walks the raw JSON
//! rather than relying on serde's derive so every failure names the exact
//! field that is wrong.
//!
//! Defaults are a merge base only: they deliberately leave `url` and
//! `userAgent` empty, which validation rejects.  A usable configuration always
//! needs a file (or overrides) that supplies both.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::notify;
use crate::source::parse_timestamp;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings file {} is not valid JSON: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("`{field}` {problem}")]
    Invalid { field: String, problem: &'static str },
}

fn invalid(field: impl Into<String>, problem: &'static str) -> SettingsError {
    SettingsError::Invalid {
        field: field.into(),
        problem,
    }
}

fn object<'a>(value: Option<&'a Value>, field: &str) -> Result<&'a Map<String, Value>, SettingsError> {
    value
        .and_then(Value::as_object)
        .ok_or_else(|| invalid(field, "must be an object"))
}

fn string<'a>(map: &'a Map<String, Value>, field: &str, key: &str) -> Result<&'a str, SettingsError> {
    map.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(format!("{field}.{key}"), "must be a string"))
}

fn non_empty_string<'a>(
    map: &'a Map<String, Value>,
    field: &str,
    key: &str,
) -> Result<&'a str, SettingsError> {
    let value = string(map, field, key)?;
    if value.trim().is_empty() {
        return Err(invalid(format!("{field}.{key}"), "must not be empty"));
    }
    Ok(value)
}

fn destinations(map: &Map<String, Value>, field: &str, key: &str) -> Result<Vec<String>, SettingsError> {
    let field = format!("{field}.{key}");
    let entries = map
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| invalid(field.as_str(), "must be an array"))?;

    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| match entry.as_str() {
            Some(id) if !id.trim().is_empty() => Ok(id.to_string()),
            _ => Err(invalid(format!("{field}[{i}]"), "must be a non-empty string")),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Scrapper settings
// ---------------------------------------------------------------------------

/// Destination identifiers per transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChatIds {
    pub telegram: Vec<String>,
    pub discord: Vec<String>,
}

/// Validated settings for the poll loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapperSettings {
    url: String,
    user_agent: String,
    #[serde(rename = "loop")]
    loop_minutes: u64,
    #[serde(rename = "chatID")]
    chat_id: ChatIds,
    start_last_build_date: String,
    #[serde(skip)]
    seed: Option<DateTime<Utc>>,
}

impl ScrapperSettings {
    const SECTION: &'static str = "scrapper";

    /// Validate a raw `scrapper` object.
    pub fn new(raw: &Value) -> Result<Self, SettingsError> {
        let section = Self::SECTION;
        let map = object(Some(raw), section)?;

        let url = non_empty_string(map, section, "url")?;
        let user_agent = non_empty_string(map, section, "userAgent")?;

        let loop_minutes = map
            .get("loop")
            .and_then(Value::as_u64)
            .filter(|minutes| *minutes > 0)
            .ok_or_else(|| invalid(format!("{section}.loop"), "must be an integer greater than 0"))?;

        let chat_field = format!("{section}.chatID");
        let chat = object(map.get("chatID"), &chat_field)?;
        let chat_id = ChatIds {
            telegram: destinations(chat, &chat_field, "telegram")?,
            discord: destinations(chat, &chat_field, "discord")?,
        };

        let start_last_build_date = string(map, section, "startLastBuildDate")?;
        let seed = if start_last_build_date.trim().is_empty() {
            None
        } else {
            Some(parse_timestamp(start_last_build_date).ok_or_else(|| {
                invalid(
                    format!("{section}.startLastBuildDate"),
                    "must be empty or a recognisable timestamp",
                )
            })?)
        };

        Ok(Self {
            url: url.to_string(),
            user_agent: user_agent.to_string(),
            loop_minutes,
            chat_id,
            start_last_build_date: start_last_build_date.to_string(),
            seed,
        })
    }

    /// Baseline values to merge user configuration over.  Not valid on their
    /// own.
    pub fn defaults() -> Value {
        json!({
            "url": "",
            "userAgent": "",
            "chatID": {
                "telegram": [],
                "discord": []
            },
            "loop": 1,
            "startLastBuildDate": ""
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.loop_minutes.saturating_mul(60))
    }

    pub fn chat_id(&self) -> &ChatIds {
        &self.chat_id
    }

    /// Parsed `startLastBuildDate`, if one was configured.
    pub fn seed(&self) -> Option<DateTime<Utc>> {
        self.seed
    }
}

// ---------------------------------------------------------------------------
// Whole-file settings
// ---------------------------------------------------------------------------

/// Credentials and endpoint for one transport.
#[derive(Clone, PartialEq, Eq)]
pub struct TransportSettings {
    pub token: String,
    pub api_url: String,
}

impl TransportSettings {
    fn new(raw: Option<&Value>, section: &str) -> Result<Self, SettingsError> {
        let map = object(raw, section)?;
        Ok(Self {
            token: string(map, section, "token")?.to_string(),
            api_url: non_empty_string(map, section, "apiUrl")?.to_string(),
        })
    }
}

impl fmt::Debug for TransportSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSettings")
            .field("token", &if self.token.is_empty() { "" } else { "<redacted>" })
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSettings {
    pub telegram: TransportSettings,
    pub discord: TransportSettings,
    pub scrapper: ScrapperSettings,
}

impl AppSettings {
    pub fn defaults() -> Value {
        json!({
            "telegram": {
                "token": "",
                "apiUrl": notify::telegram::DEFAULT_API_URL
            },
            "discord": {
                "token": "",
                "apiUrl": notify::discord::DEFAULT_API_URL
            },
            "scrapper": ScrapperSettings::defaults()
        })
    }

    /// Read `path` and merge it over [`AppSettings::defaults`].  The result
    /// still needs [`AppSettings::from_value`].
    pub fn read_raw(path: &Path) -> Result<Value, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: Value = serde_json::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let mut raw = Self::defaults();
        merge(&mut raw, file);
        Ok(raw)
    }

    pub fn from_value(raw: &Value) -> Result<Self, SettingsError> {
        let map = object(Some(raw), "settings")?;

        let settings = Self {
            telegram: TransportSettings::new(map.get("telegram"), "telegram")?,
            discord: TransportSettings::new(map.get("discord"), "discord")?,
            scrapper: ScrapperSettings::new(map.get("scrapper").unwrap_or(&Value::Null))?,
        };

        if !settings.scrapper.chat_id.telegram.is_empty() && settings.telegram.token.is_empty() {
            return Err(invalid(
                "telegram.token",
                "must be set when Telegram destinations are configured",
            ));
        }
        if !settings.scrapper.chat_id.discord.is_empty() && settings.discord.token.is_empty() {
            return Err(invalid(
                "discord.token",
                "must be set when Discord destinations are configured",
            ));
        }

        Ok(settings)
    }
}

/// Deep-merge `overlay` into `base`.  Objects merge key by key; anything else
/// in `overlay` replaces what is in `base`.
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    fn valid_scrapper() -> Value {
        json!({
            "url": "https://example.com/feed.xml",
            "userAgent": "feed-relay/0.1",
            "loop": 5,
            "chatID": {
                "telegram": ["-1001", "@news"],
                "discord": ["9876543210"]
            },
            "startLastBuildDate": "2024-01-01T00:00:00Z"
        })
    }

    fn error_field(raw: Value) -> String {
        match ScrapperSettings::new(&raw) {
            Err(SettingsError::Invalid { field, .. }) => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn valid_settings_round_trip() {
        let raw = valid_scrapper();
        let settings = ScrapperSettings::new(&raw).unwrap();

        assert_eq!(serde_json::to_value(&settings).unwrap(), raw);
    }

    #[test]
    fn exposes_parsed_values() {
        let settings = ScrapperSettings::new(&valid_scrapper()).unwrap();

        assert_eq!(settings.url(), "https://example.com/feed.xml");
        assert_eq!(settings.user_agent(), "feed-relay/0.1");
        assert_eq!(settings.interval(), Duration::from_secs(300));
        assert_eq!(settings.chat_id().telegram, vec!["-1001", "@news"]);
        assert_eq!(settings.chat_id().discord, vec!["9876543210"]);
        assert_eq!(
            settings.seed(),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn empty_seed_means_cold_start() {
        let mut raw = valid_scrapper();
        raw["startLastBuildDate"] = json!("");
        let settings = ScrapperSettings::new(&raw).unwrap();

        assert_eq!(settings.seed(), None);
        assert_eq!(serde_json::to_value(&settings).unwrap(), raw);
    }

    #[test]
    fn empty_destination_lists_are_allowed() {
        let mut raw = valid_scrapper();
        raw["chatID"] = json!({ "telegram": [], "discord": [] });
        let settings = ScrapperSettings::new(&raw).unwrap();

        assert!(settings.chat_id().telegram.is_empty());
        assert!(settings.chat_id().discord.is_empty());
    }

    #[test]
    fn rejects_non_object() {
        assert_eq!(error_field(json!("nope")), "scrapper");
        assert_eq!(error_field(Value::Null), "scrapper");
    }

    #[test]
    fn each_bad_field_is_named() {
        let cases = [
            ("url", json!(42), "scrapper.url"),
            ("url", json!(""), "scrapper.url"),
            ("userAgent", json!(null), "scrapper.userAgent"),
            ("userAgent", json!("  "), "scrapper.userAgent"),
            ("loop", json!(0), "scrapper.loop"),
            ("loop", json!(-3), "scrapper.loop"),
            ("loop", json!(1.5), "scrapper.loop"),
            ("loop", json!("5"), "scrapper.loop"),
            ("chatID", json!([]), "scrapper.chatID"),
            ("startLastBuildDate", json!(0), "scrapper.startLastBuildDate"),
            ("startLastBuildDate", json!("last tuesday"), "scrapper.startLastBuildDate"),
        ];

        for (key, value, expected) in cases {
            let mut raw = valid_scrapper();
            raw[key] = value.clone();
            assert_eq!(error_field(raw), expected, "{key} = {value}");
        }
    }

    #[test]
    fn missing_fields_are_named() {
        for key in ["url", "userAgent", "loop", "chatID", "startLastBuildDate"] {
            let mut raw = valid_scrapper();
            raw.as_object_mut().unwrap().remove(key);
            assert_eq!(error_field(raw), format!("scrapper.{key}"));
        }
    }

    #[test]
    fn destination_lists_must_be_arrays_of_strings() {
        let mut raw = valid_scrapper();
        raw["chatID"]["telegram"] = json!("-1001");
        assert_eq!(error_field(raw), "scrapper.chatID.telegram");

        let mut raw = valid_scrapper();
        raw["chatID"].as_object_mut().unwrap().remove("discord");
        assert_eq!(error_field(raw), "scrapper.chatID.discord");

        let mut raw = valid_scrapper();
        raw["chatID"]["discord"] = json!(["ok", 12]);
        assert_eq!(error_field(raw), "scrapper.chatID.discord[1]");
    }

    #[test]
    fn error_message_names_the_field() {
        let mut raw = valid_scrapper();
        raw["loop"] = json!(0);
        let err = ScrapperSettings::new(&raw).unwrap_err();

        assert_eq!(
            err.to_string(),
            "`scrapper.loop` must be an integer greater than 0"
        );
    }

    #[test]
    fn defaults_are_only_a_merge_base() {
        assert_eq!(error_field(ScrapperSettings::defaults()), "scrapper.url");

        let mut raw = ScrapperSettings::defaults();
        merge(
            &mut raw,
            json!({ "url": "https://example.com/rss", "userAgent": "relay" }),
        );
        let settings = ScrapperSettings::new(&raw).unwrap();
        assert_eq!(settings.interval(), Duration::from_secs(60));
        assert_eq!(settings.seed(), None);
    }

    #[test]
    fn merge_is_deep() {
        let mut base = json!({ "a": { "b": 1, "c": [1, 2] }, "d": "x" });
        merge(&mut base, json!({ "a": { "c": [], "e": true } }));

        assert_eq!(base, json!({ "a": { "b": 1, "c": [], "e": true }, "d": "x" }));
    }

    #[test]
    fn app_settings_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let contents = json!({
            "telegram": { "token": "123:abc" },
            "discord": { "token": "bot-secret" },
            "scrapper": valid_scrapper()
        });
        write!(file, "{contents}").unwrap();

        let raw = AppSettings::read_raw(file.path()).unwrap();
        let settings = AppSettings::from_value(&raw).unwrap();

        assert_eq!(settings.telegram.token, "123:abc");
        assert_eq!(settings.telegram.api_url, notify::telegram::DEFAULT_API_URL);
        assert_eq!(settings.discord.api_url, notify::discord::DEFAULT_API_URL);
        assert_eq!(settings.scrapper.url(), "https://example.com/feed.xml");
    }

    #[test]
    fn unreadable_files_are_reported() {
        let err = AppSettings::read_raw(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = AppSettings::read_raw(file.path()).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
    }

    #[test]
    fn tokens_required_only_for_used_transports() {
        let mut raw = AppSettings::defaults();
        merge(&mut raw, json!({ "scrapper": valid_scrapper() }));
        match AppSettings::from_value(&raw) {
            Err(SettingsError::Invalid { field, .. }) => assert_eq!(field, "telegram.token"),
            other => panic!("expected token error, got {other:?}"),
        }

        merge(
            &mut raw,
            json!({ "telegram": { "token": "t" }, "scrapper": { "chatID": { "discord": [] } } }),
        );
        assert!(AppSettings::from_value(&raw).is_ok());
    }

    #[test]
    fn debug_redacts_tokens() {
        let transport = TransportSettings {
            token: "super-secret".into(),
            api_url: "https://api.telegram.org".into(),
        };
        let printed = format!("{transport:?}");

        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("<redacted>"));
    }
}
