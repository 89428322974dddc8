//! Configuration loader
//!
//! Loads [`SessionConfig`] from environment variables or files.
//!
//! ## Loading Strategy
//! 1. Loads a `.env` file into the environment, if one exists
//! 2. Attempts to load from environment variables
//! 3. If incomplete, falls back to loading from file
//! 4. Probes multiple paths for config files (JSON or TOML)
//!
//! ## Environment Variables
//! Required:
//! - `SESSIONGATE_SERVER_URL`: identity provider base URL
//! - `SESSIONGATE_CLIENT_ID`: OAuth client id
//! - `SESSIONGATE_APP_ORIGIN`: origin of this application
//!
//! Optional:
//! - `SESSIONGATE_APP_NAME`, `SESSIONGATE_ORGANIZATION_NAME`
//! - `SESSIONGATE_REDIRECT_PATH` (default `/callback`)
//! - `SESSIONGATE_VALIDATE_URL`: authorization API endpoint
//! - `SESSIONGATE_COOKIE_DOMAIN`, `SESSIONGATE_COOKIE_SECURE` (true/false)
//! - `SESSIONGATE_REFRESH_LEAD_SECS`, `SESSIONGATE_PERIODIC_CHECK_SECS`
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.{json,toml}` and `./sessiongate.{json,toml}`
//! 2. `../config.{json,toml}` and `../../config.{json,toml}`
//! 3. The same names next to the executable

use std::path::{Path, PathBuf};

use sessiongate_core::{AuthError, AuthResult, SessionConfig};

const FILE_NAMES: [&str; 4] = ["config.json", "config.toml", "sessiongate.json", "sessiongate.toml"];

/// Load configuration with automatic fallback strategy.
///
/// # Errors
/// Returns `AuthError::Config` if neither source yields a valid
/// configuration.
pub fn load() -> AuthResult<SessionConfig> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "dotenv_loaded");
    }

    let config = match load_from_env() {
        Ok(config) => {
            tracing::info!("config_loaded_from_env");
            config
        }
        Err(e) => {
            tracing::debug!(error = %e, "config_env_incomplete_trying_file");
            load_from_file(None)?
        }
    };
    config.validate()?;
    Ok(config)
}

/// Load configuration from environment variables.
///
/// # Errors
/// Returns `AuthError::Config` if a required variable is missing or a
/// numeric variable does not parse.
pub fn load_from_env() -> AuthResult<SessionConfig> {
    let mut config = SessionConfig::new(
        env_var("SESSIONGATE_SERVER_URL")?,
        env_var("SESSIONGATE_CLIENT_ID")?,
        env_var("SESSIONGATE_APP_ORIGIN")?,
    );

    if let Some(name) = env_opt("SESSIONGATE_APP_NAME") {
        config.app_name = name;
    }
    if let Some(org) = env_opt("SESSIONGATE_ORGANIZATION_NAME") {
        config.organization_name = org;
    }
    if let Some(path) = env_opt("SESSIONGATE_REDIRECT_PATH") {
        config.redirect_path = path;
    }
    config.validate_url = env_opt("SESSIONGATE_VALIDATE_URL");

    config.cookies.domain = env_opt("SESSIONGATE_COOKIE_DOMAIN");
    config.cookies.secure = env_bool("SESSIONGATE_COOKIE_SECURE", config.cookies.secure);

    if let Some(secs) = env_u64("SESSIONGATE_REFRESH_LEAD_SECS")? {
        config.timings.refresh_lead_secs = secs;
    }
    if let Some(secs) = env_u64("SESSIONGATE_PERIODIC_CHECK_SECS")? {
        config.timings.periodic_check_secs = secs;
    }

    Ok(config)
}

/// Load configuration from a file.
///
/// If `path` is `None`, probes the standard locations. Format is picked by
/// extension.
///
/// # Errors
/// Returns `AuthError::Config` if no file is found or it fails to parse.
pub fn load_from_file(path: Option<PathBuf>) -> AuthResult<SessionConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(AuthError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            AuthError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "config_loading_from_file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| AuthError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> AuthResult<SessionConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents).map_err(|e| AuthError::Config(format!("Invalid TOML format: {e}"))),
        "json" => {
            serde_json::from_str(contents).map_err(|e| AuthError::Config(format!("Invalid JSON format: {e}")))
        }
        _ => Err(AuthError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file among the standard locations.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(FILE_NAMES.iter().map(|name| cwd.join(name)));
        for up in ["..", "../.."] {
            candidates.push(cwd.join(up).join("config.json"));
            candidates.push(cwd.join(up).join("config.toml"));
        }
    }

    if let Some(exe_dir) = std::env::current_exe().ok().as_deref().and_then(Path::parent) {
        candidates.extend(FILE_NAMES.iter().map(|name| exe_dir.join(name)));
    }

    candidates.into_iter().find(|path| path.exists())
}

fn env_var(key: &str) -> AuthResult<String> {
    env_opt(key).ok_or_else(|| AuthError::Config(format!("Missing required environment variable: {key}")))
}

/// Set and non-blank.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_u64(key: &str) -> AuthResult<Option<u64>> {
    env_opt(key)
        .map(|raw| raw.trim().parse::<u64>().map_err(|e| AuthError::Config(format!("Invalid {key}: {e}"))))
        .transpose()
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off`
/// (case-insensitive).
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use tempfile::Builder;

    use super::*;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const VARS: [&str; 6] = [
        "SESSIONGATE_SERVER_URL",
        "SESSIONGATE_CLIENT_ID",
        "SESSIONGATE_APP_ORIGIN",
        "SESSIONGATE_VALIDATE_URL",
        "SESSIONGATE_COOKIE_SECURE",
        "SESSIONGATE_REFRESH_LEAD_SECS",
    ];

    fn clear_env() {
        for key in VARS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_env_bool_parsing() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        std::env::set_var("SESSIONGATE_TEST_BOOL_ON", "ON");
        std::env::set_var("SESSIONGATE_TEST_BOOL_OFF", "no");
        assert!(env_bool("SESSIONGATE_TEST_BOOL_ON", false));
        assert!(!env_bool("SESSIONGATE_TEST_BOOL_OFF", true));

        std::env::remove_var("SESSIONGATE_TEST_BOOL_MISSING");
        assert!(env_bool("SESSIONGATE_TEST_BOOL_MISSING", true));

        std::env::remove_var("SESSIONGATE_TEST_BOOL_ON");
        std::env::remove_var("SESSIONGATE_TEST_BOOL_OFF");
    }

    #[test]
    fn test_load_from_env_all_vars_set() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("SESSIONGATE_SERVER_URL", "https://door.example.com");
        std::env::set_var("SESSIONGATE_CLIENT_ID", "portal");
        std::env::set_var("SESSIONGATE_APP_ORIGIN", "https://portal.example.com");
        std::env::set_var("SESSIONGATE_VALIDATE_URL", "https://api.example.com/validate");
        std::env::set_var("SESSIONGATE_COOKIE_SECURE", "false");
        std::env::set_var("SESSIONGATE_REFRESH_LEAD_SECS", "120");

        let result = load_from_env();
        clear_env();

        let config = result.expect("config from env");
        assert_eq!(config.client_id, "portal");
        assert_eq!(config.redirect_uri(), "https://portal.example.com/callback");
        assert_eq!(config.validate_url.as_deref(), Some("https://api.example.com/validate"));
        assert!(!config.cookies.secure);
        assert_eq!(config.timings.refresh_lead_secs, 120);
        assert_eq!(config.timings.refresh_window_secs, 600);
    }

    #[test]
    fn test_load_from_env_missing_or_invalid() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        assert!(matches!(load_from_env(), Err(AuthError::Config(_))));

        std::env::set_var("SESSIONGATE_SERVER_URL", "https://door.example.com");
        std::env::set_var("SESSIONGATE_CLIENT_ID", "portal");
        std::env::set_var("SESSIONGATE_APP_ORIGIN", "https://portal.example.com");
        std::env::set_var("SESSIONGATE_REFRESH_LEAD_SECS", "soon");
        let result = load_from_env();
        clear_env();

        assert!(matches!(result, Err(AuthError::Config(_))));
    }

    #[test]
    fn test_load_from_file_json() {
        let mut file = Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{
                "server_url": "https://door.example.com",
                "client_id": "portal",
                "app_name": "portal",
                "organization_name": "acme",
                "app_origin": "https://portal.example.com",
                "locks": {{ "signin_secs": 30 }}
            }}"#
        )
        .unwrap();

        let config = load_from_file(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.organization_name, "acme");
        assert_eq!(config.locks.signin_secs, 30);
        assert_eq!(config.locks.refresh_secs, 10);
    }

    #[test]
    fn test_load_from_file_toml() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
server_url = "https://door.example.com"
client_id = "portal"
app_name = "portal"
organization_name = "acme"
app_origin = "https://portal.example.com"
redirect_path = "/auth/done"

[cookies]
domain = ".example.com"
same_site = "none"
"#
        )
        .unwrap();

        let config = load_from_file(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.redirect_uri(), "https://portal.example.com/auth/done");
        assert_eq!(config.cookies.domain.as_deref(), Some(".example.com"));
        assert_eq!(config.cookies.same_site, sessiongate_common::SameSite::None);
    }

    #[test]
    fn test_load_from_file_errors() {
        let missing = load_from_file(Some(PathBuf::from("/definitely/not/here.json")));
        assert!(matches!(missing, Err(AuthError::Config(_))));

        let mut file = Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "server_url: x").unwrap();
        let unsupported = load_from_file(Some(file.path().to_path_buf()));
        assert!(matches!(unsupported, Err(AuthError::Config(_))));
    }
}
