use crate::FitbitError;
use secrecy::SecretString;
use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_BASE_URL: &str = "https://api.fitbit.com";

#[derive(Clone, Debug)]
pub struct Config {
    pub client_id: String,
    pub client_secret: SecretString,
    pub base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, FitbitError> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Testable helper that reads configuration values using the provided
    /// function. This avoids mutating global environment in tests.
    pub fn from_env_with<F>(mut get: F) -> Result<Self, FitbitError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let client_id = get("FITBIT_CLIENT_ID")
            .ok_or_else(|| FitbitError::Config("FITBIT_CLIENT_ID missing".into()))?;
        let client_secret = get("FITBIT_CLIENT_SECRET")
            .ok_or_else(|| FitbitError::Config("FITBIT_CLIENT_SECRET missing".into()))?;
        let base_url = get("FITBIT_API_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());
        Ok(Self {
            client_id,
            client_secret: SecretString::new(client_secret.into()),
            base_url,
        })
    }
}

/// Parse a `KEY=value` credential file into a map.
///
/// A missing file yields an empty map so callers can fall back to the
/// process environment.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>, FitbitError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let iter = dotenvy::from_path_iter(path)
        .map_err(|e| FitbitError::Config(format!("reading {}: {e}", path.display())))?;
    let mut values = HashMap::new();
    for item in iter {
        let (key, value) =
            item.map_err(|e| FitbitError::Config(format!("parsing {}: {e}", path.display())))?;
        values.insert(key, value);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;

    #[test]
    fn from_env_missing_client_id() {
        let get = |k: &str| match k {
            "FITBIT_CLIENT_SECRET" => Some("shh".into()),
            _ => None,
        };
        let res = Config::from_env_with(get);
        assert!(res.is_err());
    }

    #[test]
    fn from_env_reads_values() {
        let get = |k: &str| match k {
            "FITBIT_CLIENT_ID" => Some("ABC123".into()),
            "FITBIT_CLIENT_SECRET" => Some("sekrit".into()),
            "FITBIT_API_BASE_URL" => Some("http://localhost".into()),
            _ => None,
        };
        let cfg = Config::from_env_with(get).expect("cfg");
        assert_eq!(cfg.client_id, "ABC123");
        assert_eq!(cfg.client_secret.expose_secret(), "sekrit");
        assert_eq!(cfg.base_url, "http://localhost");
    }

    #[test]
    fn base_url_defaults_to_fitbit() {
        let get = |k: &str| match k {
            "FITBIT_CLIENT_ID" => Some("ABC123".into()),
            "FITBIT_CLIENT_SECRET" => Some("sekrit".into()),
            _ => None,
        };
        let cfg = Config::from_env_with(get).expect("cfg");
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn read_env_file_parses_quoted_values() {
        let mut file = tempfile::NamedTempFile::new().expect("tmp");
        writeln!(file, "# credentials").unwrap();
        writeln!(file, "FITBIT_CLIENT_ID=ABC123").unwrap();
        writeln!(file, "FITBIT_ACCESS_TOKEN='tok.en'").unwrap();
        let values = read_env_file(file.path()).expect("parse");
        assert_eq!(values.get("FITBIT_CLIENT_ID").map(String::as_str), Some("ABC123"));
        assert_eq!(values.get("FITBIT_ACCESS_TOKEN").map(String::as_str), Some("tok.en"));
    }

    #[test]
    fn read_env_file_missing_is_empty() {
        let dir = tempfile::tempdir().expect("dir");
        let values = read_env_file(&dir.path().join("absent.env")).expect("parse");
        assert!(values.is_empty());
    }
}
