//! Bearer-token loading from an operator-supplied token file.
//!
//! Acquiring the token (OAuth browser flow, refresh) is out of scope; this
//! module only reads the JSON file the operator provides. Any problem with
//! the file is fatal and reported before post processing begins.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default token file path, relative to CWD.
pub const DEFAULT_TOKEN_FILE: &str = "token.json";

/// Errors loading the token file. All fatal.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token file not found: {path}. Supply one with --token or place token.json in the working directory.")]
    NotFound { path: PathBuf },

    #[error("Cannot read token file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid token file {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Token file {path} contains no access token.")]
    EmptyToken { path: PathBuf },
}

/// OAuth2 credentials consumed by the API client.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_token: String,
}

/// Accepts both the google-auth layout (`"token"`) and a plain
/// `"access_token"` key.
#[derive(Deserialize)]
struct TokenFile {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Load credentials from `path`. Missing file, unreadable file, invalid
/// JSON, and an empty/absent token are each distinct fatal errors.
pub fn load_credentials(path: &Path) -> Result<Credentials, AuthError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AuthError::NotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(AuthError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    let parsed: TokenFile = serde_json::from_str(&raw).map_err(|e| AuthError::Invalid {
        path: path.to_path_buf(),
        source: e,
    })?;
    let token = parsed
        .token
        .or(parsed.access_token)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::EmptyToken {
            path: path.to_path_buf(),
        })?;
    Ok(Credentials {
        access_token: token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_google_auth_token_layout() {
        let path = write_temp(
            "blogmirror_auth_google.json",
            r#"{"token": "ya29.abc", "refresh_token": "1//xyz", "scopes": ["https://www.googleapis.com/auth/blogger"]}"#,
        );
        let creds = load_credentials(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(creds.access_token, "ya29.abc");
    }

    #[test]
    fn loads_plain_access_token_layout() {
        let path = write_temp(
            "blogmirror_auth_plain.json",
            r#"{"access_token": "tok123"}"#,
        );
        let creds = load_credentials(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(creds.access_token, "tok123");
    }

    #[test]
    fn missing_file_is_not_found() {
        let path = PathBuf::from("/nonexistent_blogmirror_dir/token.json");
        assert!(matches!(
            load_credentials(&path),
            Err(AuthError::NotFound { .. })
        ));
    }

    #[test]
    fn invalid_json_errors() {
        let path = write_temp("blogmirror_auth_bad.json", "{not json");
        let result = load_credentials(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(AuthError::Invalid { .. })));
    }

    #[test]
    fn empty_token_errors() {
        let path = write_temp("blogmirror_auth_empty.json", r#"{"token": "  "}"#);
        let result = load_credentials(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(AuthError::EmptyToken { .. })));
    }
}
