// Blobshelf Configuration Module
// Layered settings: built-in defaults < settings.json < .env file < process environment

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::credential_store::ConnectionString;
use crate::providers::transport::DEFAULT_TIMEOUT_SECS;
use crate::providers::{PublicAccess, StorageError};

pub const CONNECTION_STRING_VAR: &str = "AZURE_STORAGE_CONNECTION_STRING";
pub const CONTAINER_VAR: &str = "AZURE_STORAGE_CONTAINER";
pub const PUBLIC_ACCESS_VAR: &str = "AZURE_STORAGE_PUBLIC_ACCESS";
pub const TIMEOUT_VAR: &str = "BLOBSHELF_REQUEST_TIMEOUT_SECS";

/// Variables read from the `.env` file and the process environment
const KNOWN_VARS: &[&str] = &[CONNECTION_STRING_VAR, CONTAINER_VAR, PUBLIC_ACCESS_VAR, TIMEOUT_VAR];

pub const DEFAULT_CONTAINER: &str = "documents";
const DEFAULT_DOTENV: &str = ".env";

/// Persistent, non-secret settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Container holding all objects
    pub container: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Access level requested when the container has to be created
    pub public_access: Option<PublicAccess>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            container: DEFAULT_CONTAINER.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            public_access: None,
        }
    }
}

/// Get the path to the settings file
pub fn settings_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")));
    config_dir.join("blobshelf").join("settings.json")
}

/// Load settings from a file. Missing or unreadable files yield the defaults.
pub fn load_settings_from(path: &Path) -> Settings {
    if path.exists() {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => return settings,
                Err(e) => tracing::warn!("Failed to parse settings {:?}: {}", path, e),
            },
            Err(e) => tracing::warn!("Failed to read settings {:?}: {}", path, e),
        }
    }

    Settings::default()
}

pub fn load_settings() -> Settings {
    load_settings_from(&settings_path())
}

/// Save settings to a file, creating the parent directory
pub fn save_settings_to(path: &Path, settings: &Settings) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(settings)
        .map_err(|e| StorageError::Parse(format!("Failed to serialize settings: {}", e)))?;
    fs::write(path, content)?;

    tracing::info!("Settings saved to {:?}", path);
    Ok(())
}

pub fn save_settings(settings: &Settings) -> Result<PathBuf, StorageError> {
    let path = settings_path();
    save_settings_to(&path, settings)?;
    Ok(path)
}

/// Parse `KEY=VALUE` lines. Blank lines and `#` comments are skipped,
/// an `export ` prefix is accepted and matching surrounding quotes are stripped.
pub fn parse_dotenv(content: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        let value = [('"', '"'), ('\'', '\'')]
            .iter()
            .find_map(|(open, close)| value.strip_prefix(*open).and_then(|v| v.strip_suffix(*close)))
            .unwrap_or(value);
        vars.insert(key.trim().to_string(), value.to_string());
    }
    vars
}

pub fn read_dotenv(path: &Path) -> Result<BTreeMap<String, String>, StorageError> {
    Ok(parse_dotenv(&fs::read_to_string(path)?))
}

/// Overlay environment lookups on top of `.env` values for the known variables
pub fn merge_vars(
    mut dotenv: BTreeMap<String, String>,
    env: impl Fn(&str) -> Option<String>,
) -> BTreeMap<String, String> {
    for key in KNOWN_VARS {
        if let Some(value) = env(key) {
            dotenv.insert(key.to_string(), value);
        }
    }
    dotenv
}

/// Azure container naming rules: 3-63 chars of lowercase letters, digits and
/// single hyphens, starting and ending with a letter or digit
pub fn validate_container_name(name: &str) -> Result<(), StorageError> {
    let valid_chars = name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let valid = (3..=63).contains(&name.len())
        && valid_chars
        && !name.starts_with('-')
        && !name.ends_with('-')
        && !name.contains("--");
    if !valid {
        return Err(StorageError::Configuration(format!("Invalid container name '{}'", name)));
    }
    Ok(())
}

/// Parse an access level; "none", "private", "off" or empty mean no anonymous access
pub fn parse_public_access(value: &str) -> Result<Option<PublicAccess>, StorageError> {
    match value.trim().to_lowercase().as_str() {
        "" | "none" | "private" | "off" => Ok(None),
        other => other.parse().map(Some),
    }
}

/// Fully resolved runtime configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    connection: ConnectionString,
    settings: Settings,
}

impl StorageConfig {
    /// Resolve configuration from variables layered over persisted settings
    pub fn from_sources(vars: &BTreeMap<String, String>, mut settings: Settings) -> Result<Self, StorageError> {
        let connection: ConnectionString = vars.get(CONNECTION_STRING_VAR)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| StorageError::Configuration(format!("{} is not set", CONNECTION_STRING_VAR)))?
            .parse()?;

        if let Some(container) = vars.get(CONTAINER_VAR).map(|v| v.trim()).filter(|v| !v.is_empty()) {
            settings.container = container.to_string();
        }
        if let Some(access) = vars.get(PUBLIC_ACCESS_VAR) {
            settings.public_access = parse_public_access(access)?;
        }
        if let Some(timeout) = vars.get(TIMEOUT_VAR) {
            settings.request_timeout_secs = timeout.trim().parse()
                .map_err(|_| StorageError::Configuration(format!("{} must be a number of seconds, got '{}'", TIMEOUT_VAR, timeout)))?;
        }

        validate_container_name(&settings.container)?;
        if settings.request_timeout_secs == 0 {
            return Err(StorageError::Configuration("Request timeout must be at least 1 second".to_string()));
        }

        Ok(Self { connection, settings })
    }

    /// Load from the settings file, a `.env` file and the process environment.
    /// Without an explicit path, `./.env` is read when present.
    pub fn load(dotenv_path: Option<&Path>) -> Result<Self, StorageError> {
        let dotenv = match dotenv_path {
            Some(path) => read_dotenv(path)?,
            None if Path::new(DEFAULT_DOTENV).exists() => read_dotenv(Path::new(DEFAULT_DOTENV))?,
            None => BTreeMap::new(),
        };
        let vars = merge_vars(dotenv, |key| std::env::var(key).ok());
        Self::from_sources(&vars, load_settings())
    }

    pub fn connection(&self) -> &ConnectionString {
        &self.connection
    }

    pub fn container(&self) -> &str {
        &self.settings.container
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.request_timeout_secs)
    }

    pub fn public_access(&self) -> Option<PublicAccess> {
        self.settings.public_access
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONN: &str = "DefaultEndpointsProtocol=https;AccountName=acme;AccountKey=c2VjcmV0LWtleS1ieXRlcy1mb3ItdGVzdGluZw==;EndpointSuffix=core.windows.net";

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_parse_dotenv() {
        let content = r#"
# storage
AZURE_STORAGE_CONNECTION_STRING="DefaultEndpointsProtocol=https;AccountName=acme;AccountKey=a2V5=="
export AZURE_STORAGE_CONTAINER = 'reports'
not a pair
BLOBSHELF_REQUEST_TIMEOUT_SECS=45
"#;
        let parsed = parse_dotenv(content);
        assert_eq!(
            parsed.get(CONNECTION_STRING_VAR).map(String::as_str),
            Some("DefaultEndpointsProtocol=https;AccountName=acme;AccountKey=a2V5==")
        );
        assert_eq!(parsed.get(CONTAINER_VAR).map(String::as_str), Some("reports"));
        assert_eq!(parsed.get(TIMEOUT_VAR).map(String::as_str), Some("45"));
        assert_eq!(parsed.len(), 3);
    }

    #[test]
    fn test_from_sources_defaults() {
        let config = StorageConfig::from_sources(&vars(&[(CONNECTION_STRING_VAR, CONN)]), Settings::default()).unwrap();
        assert_eq!(config.container(), DEFAULT_CONTAINER);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.public_access(), None);
        assert_eq!(config.connection().account_name(), "acme");
    }

    #[test]
    fn test_variables_override_settings() {
        let settings = Settings {
            container: "archive".to_string(),
            request_timeout_secs: 10,
            public_access: Some(PublicAccess::Container),
        };
        let config = StorageConfig::from_sources(&vars(&[
            (CONNECTION_STRING_VAR, CONN),
            (CONTAINER_VAR, "reports"),
            (PUBLIC_ACCESS_VAR, "none"),
            (TIMEOUT_VAR, "90"),
        ]), settings).unwrap();

        assert_eq!(config.container(), "reports");
        assert_eq!(config.request_timeout(), Duration::from_secs(90));
        assert_eq!(config.public_access(), None);
    }

    #[test]
    fn test_settings_used_when_variables_absent() {
        let settings = Settings {
            container: "archive".to_string(),
            request_timeout_secs: 10,
            public_access: Some(PublicAccess::Blob),
        };
        let config = StorageConfig::from_sources(&vars(&[(CONNECTION_STRING_VAR, CONN)]), settings).unwrap();
        assert_eq!(config.container(), "archive");
        assert_eq!(config.public_access(), Some(PublicAccess::Blob));
    }

    #[test]
    fn test_missing_connection_string() {
        let err = StorageConfig::from_sources(&BTreeMap::new(), Settings::default()).unwrap_err();
        assert!(matches!(err, StorageError::Configuration(ref m) if m.contains(CONNECTION_STRING_VAR)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_timeout = vars(&[(CONNECTION_STRING_VAR, CONN), (TIMEOUT_VAR, "soon")]);
        assert!(matches!(StorageConfig::from_sources(&bad_timeout, Settings::default()), Err(StorageError::Configuration(_))));

        let bad_access = vars(&[(CONNECTION_STRING_VAR, CONN), (PUBLIC_ACCESS_VAR, "everyone")]);
        assert!(StorageConfig::from_sources(&bad_access, Settings::default()).is_err());

        let bad_container = vars(&[(CONNECTION_STRING_VAR, CONN), (CONTAINER_VAR, "My_Docs")]);
        assert!(StorageConfig::from_sources(&bad_container, Settings::default()).is_err());
    }

    #[test]
    fn test_validate_container_name() {
        assert!(validate_container_name("documents").is_ok());
        assert!(validate_container_name("team-2026").is_ok());
        assert!(validate_container_name("ab").is_err());
        assert!(validate_container_name("-docs").is_err());
        assert!(validate_container_name("my--docs").is_err());
        assert!(validate_container_name("Docs").is_err());
    }

    #[test]
    fn test_merge_vars_environment_wins() {
        let dotenv = vars(&[(CONTAINER_VAR, "from-file"), ("UNRELATED", "x")]);
        let merged = merge_vars(dotenv, |key| (key == CONTAINER_VAR).then(|| "from-env".to_string()));
        assert_eq!(merged.get(CONTAINER_VAR).map(String::as_str), Some("from-env"));
        assert_eq!(merged.get("UNRELATED").map(String::as_str), Some("x"));
    }

    #[test]
    fn test_settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings {
            container: "reports".to_string(),
            request_timeout_secs: 12,
            public_access: Some(PublicAccess::Blob),
        };

        save_settings_to(&path, &settings).unwrap();
        assert_eq!(load_settings_from(&path), settings);
    }

    #[test]
    fn test_corrupt_or_partial_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_settings_from(&path), Settings::default());

        fs::write(&path, r#"{"container": "reports"}"#).unwrap();
        let partial = load_settings_from(&path);
        assert_eq!(partial.container, "reports");
        assert_eq!(partial.request_timeout_secs, DEFAULT_TIMEOUT_SECS);

        assert_eq!(load_settings_from(&dir.path().join("missing.json")), Settings::default());
    }

    #[test]
    fn test_read_dotenv_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, format!("{}={}\n", CONNECTION_STRING_VAR, CONN)).unwrap();

        let parsed = read_dotenv(&path).unwrap();
        let config = StorageConfig::from_sources(&parsed, Settings::default()).unwrap();
        assert_eq!(config.connection().account_name(), "acme");

        assert!(matches!(read_dotenv(&dir.path().join("absent.env")), Err(StorageError::Io(_))));
    }
}
