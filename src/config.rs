//! Application-level configuration loading: game policy, rate limits, cache
//! lifetimes and the fallback word list.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationSeconds, serde_as};
use tracing::{info, warn};

use crate::dao::models::WordEntity;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "ALIAS_BACK_CONFIG_PATH";

#[derive(Debug, Clone, Default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Room and game rules.
    pub game: GamePolicy,
    /// Admission control buckets.
    pub rate_limits: RateLimitConfig,
    /// Lifetimes of ephemeral records.
    pub cache: CacheTtls,
    /// Words served when no durable lexicon is connected.
    pub words: FallbackWords,
}

/// Tunable room and game rules.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GamePolicy {
    /// Active players a room accepts.
    pub max_players: usize,
    /// Players needed across both teams to start or keep a game going.
    pub min_players_total: usize,
    /// Players each team needs to start or keep a game going.
    pub min_players_per_team: usize,
    /// Team size difference that triggers moving a player across.
    pub rebalance_gap: usize,
    /// Turns in one game.
    pub max_turns: u32,
    /// Length of a turn.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub turn_duration: Duration,
    /// Minimum delay between two skip requests within a game.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub skip_cooldown: Duration,
    /// Words requested from the lexicon per refill.
    pub word_batch: usize,
}

impl Default for GamePolicy {
    fn default() -> Self {
        Self {
            max_players: 12,
            min_players_total: 4,
            min_players_per_team: 2,
            rebalance_gap: 2,
            max_turns: 2,
            turn_duration: Duration::from_secs(60),
            skip_cooldown: Duration::from_secs(10),
            word_batch: 10,
        }
    }
}

/// Points allowed per fixed window.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BucketLimit {
    /// Calls admitted per window.
    pub points: u64,
    /// Window length.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub window: Duration,
}

impl BucketLimit {
    const fn per_secs(points: u64, secs: u64) -> Self {
        Self {
            points,
            window: Duration::from_secs(secs),
        }
    }
}

/// Limits for each action class.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Every HTTP request, keyed by client IP.
    pub http_global: BucketLimit,
    /// Room endpoints, keyed by path and client IP.
    pub http_rooms: BucketLimit,
    /// WebSocket handshakes, keyed by client IP.
    pub socket_connect: BucketLimit,
    /// Lobby chat messages per connection.
    pub chat_message: BucketLimit,
    /// In-game messages (guesses and clues) per connection.
    pub game_message: BucketLimit,
    /// Team switches per connection.
    pub join_team: BucketLimit,
    /// Skip-word requests per connection.
    pub skip_word: BucketLimit,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            http_global: BucketLimit::per_secs(200, 60),
            http_rooms: BucketLimit::per_secs(15, 60),
            socket_connect: BucketLimit::per_secs(15, 10),
            chat_message: BucketLimit::per_secs(20, 10),
            game_message: BucketLimit::per_secs(20, 10),
            join_team: BucketLimit::per_secs(10, 10),
            skip_word: BucketLimit::per_secs(10, 10),
        }
    }
}

/// Time-to-live of each ephemeral record family.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheTtls {
    /// Live rooms.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub room: Duration,
    /// Live games.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub game: Duration,
    /// User to connection sessions.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub session: Duration,
    /// Rooms copied back from the durable store on a cache miss.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub rehydrate: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        let six_hours = Duration::from_secs(6 * 60 * 60);
        Self {
            room: six_hours,
            game: six_hours,
            session: six_hours,
            rehydrate: Duration::from_secs(60 * 60),
        }
    }
}

/// Built-in lexicon used while degraded.
#[derive(Debug, Clone)]
pub struct FallbackWords(pub Vec<WordEntity>);

impl Default for FallbackWords {
    fn default() -> Self {
        Self(default_words())
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json_str(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        words = app_config.words.0.len(),
                        max_turns = app_config.game.max_turns,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON document; omitted sections keep their defaults.
    pub fn from_json_str(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }
}

#[derive(Debug, Default, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    game: Option<GamePolicy>,
    #[serde(default)]
    rate_limits: Option<RateLimitConfig>,
    #[serde(default)]
    cache: Option<CacheTtls>,
    #[serde(default)]
    words: Option<Vec<RawWord>>,
}

#[derive(Debug, Deserialize)]
/// JSON representation of a single fallback word.
struct RawWord {
    word: String,
    #[serde(default)]
    taboo: Vec<String>,
    #[serde(default)]
    similar: Vec<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let words = match value.words {
            Some(words) if !words.is_empty() => FallbackWords(
                words
                    .into_iter()
                    .enumerate()
                    .map(|(index, raw)| WordEntity {
                        id: format!("cfg-{index}"),
                        word: raw.word,
                        taboo_words: raw.taboo,
                        similar_words: raw.similar,
                    })
                    .collect(),
            ),
            _ => FallbackWords::default(),
        };

        Self {
            game: value.game.unwrap_or_default(),
            rate_limits: value.rate_limits.unwrap_or_default(),
            cache: value.cache.unwrap_or_default(),
            words,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in word list shipped with the binary.
fn default_words() -> Vec<WordEntity> {
    const WORDS: &[(&str, &[&str])] = &[
        ("guitar", &["strings", "music", "instrument", "play"]),
        ("volcano", &["lava", "eruption", "mountain", "magma"]),
        ("library", &["books", "read", "borrow", "quiet"]),
        ("penguin", &["bird", "ice", "antarctica", "fly"]),
        ("umbrella", &["rain", "wet", "open", "cover"]),
        ("astronaut", &["space", "rocket", "moon", "nasa"]),
        ("chocolate", &["sweet", "cocoa", "candy", "brown"]),
        ("passport", &["travel", "country", "border", "document"]),
        ("lighthouse", &["sea", "light", "ship", "coast"]),
        ("dentist", &["teeth", "doctor", "tooth", "mouth"]),
        ("bicycle", &["wheels", "pedal", "ride", "bike"]),
        ("pyramid", &["egypt", "triangle", "pharaoh", "tomb"]),
        ("thunder", &["storm", "lightning", "loud", "rain"]),
        ("keyboard", &["type", "computer", "keys", "piano"]),
        ("honey", &["bee", "sweet", "yellow", "hive"]),
        ("castle", &["king", "queen", "tower", "medieval"]),
        ("camera", &["photo", "picture", "lens", "shoot"]),
        ("desert", &["sand", "hot", "dry", "camel"]),
        ("wedding", &["marriage", "bride", "groom", "ring"]),
        ("snowman", &["snow", "winter", "carrot", "cold"]),
        ("pirate", &["ship", "treasure", "sea", "parrot"]),
        ("orchestra", &["music", "violin", "conductor", "concert"]),
        ("telescope", &["stars", "sky", "lens", "astronomy"]),
        ("marathon", &["run", "race", "kilometers", "athlete"]),
    ];

    WORDS
        .iter()
        .enumerate()
        .map(|(index, (word, taboo))| WordEntity {
            id: format!("builtin-{index}"),
            word: (*word).to_owned(),
            taboo_words: taboo.iter().map(|t| (*t).to_owned()).collect(),
            similar_words: Vec::new(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_keeps_defaults() {
        let config = AppConfig::from_json_str("{}").unwrap();
        assert_eq!(config.game.max_players, 12);
        assert_eq!(config.game.turn_duration, Duration::from_secs(60));
        assert_eq!(config.rate_limits.http_global, BucketLimit::per_secs(200, 60));
        assert_eq!(config.words.0.len(), default_words().len());
    }

    #[test]
    fn sections_override_only_given_fields() {
        let config = AppConfig::from_json_str(
            r#"{
                "game": { "max_turns": 6, "turn_duration": 45 },
                "rate_limits": { "chat_message": { "points": 3, "window": 5 } },
                "words": [ { "word": "kettle", "taboo": ["tea", "boil"], "similar": ["teapot"] } ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.game.max_turns, 6);
        assert_eq!(config.game.turn_duration, Duration::from_secs(45));
        assert_eq!(config.game.min_players_total, 4);
        assert_eq!(config.rate_limits.chat_message, BucketLimit::per_secs(3, 5));
        assert_eq!(config.rate_limits.join_team, BucketLimit::per_secs(10, 10));
        assert_eq!(config.words.0[0].word, "kettle");
        assert_eq!(config.words.0[0].taboo_words, vec!["tea", "boil"]);
        assert_eq!(config.words.0[0].similar_words, vec!["teapot"]);
    }

    #[test]
    fn builtin_words_have_taboo_lists() {
        assert!(default_words().iter().all(|w| !w.taboo_words.is_empty()));
    }
}
