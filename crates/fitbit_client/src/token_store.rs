//! Credential persistence in a flat `KEY=value` file.
//!
//! The same file holds the OAuth client credentials and run settings; only
//! the three token keys are ever rewritten, and only when their value changed.

use crate::config::read_env_file;
use crate::{FitbitError, RefreshObserver, TokenBundle};
use secrecy::ExposeSecret;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const ACCESS_TOKEN_KEY: &str = "FITBIT_ACCESS_TOKEN";
pub const REFRESH_TOKEN_KEY: &str = "FITBIT_REFRESH_TOKEN";
pub const EXPIRES_AT_KEY: &str = "FITBIT_EXPIRES_AT";

/// Result of [`TokenStore::save`]: which keys were written.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SaveOutcome {
    pub changed: Vec<&'static str>,
}

impl SaveOutcome {
    pub fn is_unchanged(&self) -> bool {
        self.changed.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current token bundle.
    ///
    /// Tokens come from the file only, never from the process environment:
    /// refreshes are written back here, so an exported token would shadow
    /// every later refresh. A missing expiry is read as `0.0` so the first
    /// request refreshes.
    pub fn load(&self) -> Result<TokenBundle, FitbitError> {
        let values = read_env_file(&self.path)?;
        let get = |key: &str| {
            values
                .get(key)
                .cloned()
                .ok_or_else(|| FitbitError::Config(format!("{key} missing")))
        };
        let access = get(ACCESS_TOKEN_KEY)?;
        let refresh = get(REFRESH_TOKEN_KEY)?;
        let expires_at = match values.get(EXPIRES_AT_KEY) {
            Some(raw) => raw.trim().parse::<f64>().map_err(|e| {
                FitbitError::Config(format!("{EXPIRES_AT_KEY} is not a number ({raw}): {e}"))
            })?,
            None => 0.0,
        };
        Ok(TokenBundle::new(&access, &refresh, expires_at))
    }

    /// Write the fields of `tokens` that differ from what is stored.
    ///
    /// The file is left untouched when nothing changed. Other lines are kept
    /// verbatim; missing keys are appended.
    pub fn save(&self, tokens: &TokenBundle) -> Result<SaveOutcome, FitbitError> {
        let original = match std::fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(FitbitError::Io(e)),
        };
        let mut lines: Vec<String> = original.lines().map(str::to_owned).collect();

        let updates = [
            (
                ACCESS_TOKEN_KEY,
                tokens.access_token.expose_secret().to_string(),
            ),
            (
                REFRESH_TOKEN_KEY,
                tokens.refresh_token.expose_secret().to_string(),
            ),
            (EXPIRES_AT_KEY, tokens.expires_at.to_string()),
        ];

        let mut outcome = SaveOutcome::default();
        for (key, new_value) in updates {
            let position = lines.iter().position(|l| line_key(l) == Some(key));
            match position {
                Some(idx) => {
                    let current = line_value(&lines[idx]);
                    if same_value(key, &current, &new_value) {
                        continue;
                    }
                    lines[idx] = replace_value(&lines[idx], &new_value);
                }
                None => lines.push(format!("{key}={new_value}")),
            }
            outcome.changed.push(key);
        }

        if outcome.is_unchanged() {
            tracing::debug!(path = %self.path.display(), "tokens unchanged; not rewriting");
            return Ok(outcome);
        }

        let mut contents = lines.join("\n");
        contents.push('\n');
        self.replace_file(contents.as_bytes())?;
        tracing::info!(
            path = %self.path.display(),
            keys = ?outcome.changed,
            "persisted refreshed tokens"
        );
        Ok(outcome)
    }
}

impl TokenStore {
    /// Write into a sibling temporary file, then rename it over the store so
    /// a partial write never replaces the credentials.
    fn replace_file(&self, contents: &[u8]) -> Result<(), FitbitError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| FitbitError::Io(e.error))?;
        Ok(())
    }
}

impl RefreshObserver for TokenStore {
    fn tokens_refreshed(&self, tokens: &TokenBundle) -> Result<(), FitbitError> {
        self.save(tokens).map(|_| ())
    }
}

fn line_key(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        return None;
    }
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    trimmed.split_once('=').map(|(k, _)| k.trim())
}

/// Swap the value of a `KEY=value` line, keeping indentation and any
/// `export ` prefix.
fn replace_value(line: &str, new_value: &str) -> String {
    match line.split_once('=') {
        Some((lhs, _)) => format!("{}={new_value}", lhs.trim_end()),
        None => line.to_string(),
    }
}

fn line_value(line: &str) -> String {
    let value = line.split_once('=').map(|(_, v)| v.trim()).unwrap_or("");
    let unquoted = value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
        .unwrap_or(value);
    unquoted.to_string()
}

fn same_value(key: &str, current: &str, new_value: &str) -> bool {
    if key == EXPIRES_AT_KEY {
        return match (current.parse::<f64>(), new_value.parse::<f64>()) {
            (Ok(a), Ok(b)) => a == b,
            _ => current == new_value,
        };
    }
    current == new_value
}
