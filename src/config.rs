//! Configuration management for earshot.
//!
//! Values come from environment variables, optionally seeded from a `.env`
//! file in the per-user config directory, and from a small `settings.json`
//! that adapters use for values the user sets once (e.g. a Spotify client id).
//!
//! Lookup order:
//! 1. Environment variables (highest priority)
//! 2. `.env` file in `<config_dir>/earshot/`
//! 3. `settings.json` (adapter settings) or built-in defaults

use std::{collections::BTreeMap, env, path::PathBuf, time::Duration};

use tracing::debug;

use crate::management::write_private_file;

const APP_DIR: &str = "earshot";
const SETTINGS_FILE: &str = "settings.json";

/// Loads environment variables from `<config_dir>/earshot/.env`.
///
/// A missing file is not an error; a file that exists but cannot be parsed is.
/// Variables already present in the environment are left untouched.
///
/// # Example
///
/// ```
/// use earshot::config;
///
/// #[tokio::main]
/// async fn main() {
///     if let Err(e) = config::load_env().await {
///         eprintln!("Configuration error: {}", e);
///     }
/// }
/// ```
pub async fn load_env() -> Result<(), String> {
    let path = config_dir().join(".env");
    if !path.is_file() {
        debug!(path = %path.display(), "no .env file, using process environment only");
        return Ok(());
    }

    dotenv::from_path(&path).map_err(|e| format!("{}: {}", path.display(), e))?;
    debug!(path = %path.display(), "loaded .env file");
    Ok(())
}

/// Root of all earshot files. `EARSHOT_CONFIG_DIR` overrides the platform default:
/// - Linux: `~/.config/earshot`
/// - macOS: `~/Library/Application Support/earshot`
/// - Windows: `%APPDATA%/earshot`
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = env::var("EARSHOT_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_DIR);
    path
}

/// Directory holding one `<provider>.json` credential file per provider.
pub fn credentials_dir() -> PathBuf {
    config_dir().join("credentials")
}

/// How long the redirect listener waits for the browser (default 120s).
pub fn callback_timeout() -> Duration {
    Duration::from_secs(env_u64("EARSHOT_CALLBACK_TIMEOUT_SECS", 120))
}

/// Delay between two QR status checks (default 2s).
pub fn qr_poll_interval() -> Duration {
    Duration::from_secs(env_u64("EARSHOT_QR_POLL_INTERVAL_SECS", 2))
}

/// Number of QR status checks before giving up (default 60, at least 1).
pub fn qr_max_attempts() -> u32 {
    env_u64("EARSHOT_QR_MAX_ATTEMPTS", 60)
        .clamp(1, u64::from(u32::MAX))
        .try_into()
        .unwrap_or(u32::MAX)
}

/// Timeout applied to every outgoing provider request (default 15s).
pub fn http_timeout() -> Duration {
    Duration::from_secs(env_u64("EARSHOT_HTTP_TIMEOUT_SECS", 15))
}

/// Base URL of the NeteaseCloudMusicApi-compatible server used for QR login.
pub fn netease_api_url() -> String {
    env::var("NETEASE_API_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// Spotify application client id: `SPOTIFY_CLIENT_ID`, then `settings.json`.
pub async fn spotify_client_id() -> Option<String> {
    if let Ok(id) = env::var("SPOTIFY_CLIENT_ID") {
        if !id.trim().is_empty() {
            return Some(id);
        }
    }
    load_settings().await.ok()?.remove("spotify_client_id")
}

/// Persists the Spotify client id into `settings.json`.
pub async fn save_spotify_client_id(client_id: &str) -> Result<PathBuf, String> {
    let mut settings = load_settings().await.unwrap_or_default();
    settings.insert("spotify_client_id".to_string(), client_id.to_string());

    let path = settings_path();
    let json = serde_json::to_string_pretty(&settings).map_err(|e| e.to_string())?;
    write_private_file(&path, json.as_bytes())
        .await
        .map_err(|e| e.to_string())?;
    Ok(path)
}

/// Reads `settings.json`; a missing file yields an empty map.
pub async fn load_settings() -> Result<BTreeMap<String, String>, String> {
    let path = settings_path();
    match async_fs::read_to_string(&path).await {
        Ok(content) => serde_json::from_str(&content).map_err(|e| e.to_string()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(e.to_string()),
    }
}

pub fn settings_path() -> PathBuf {
    config_dir().join(SETTINGS_FILE)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
