//! Parameter files and endpoint resolution.
//!
//! Each service may have a YAML file at `$HOME/.<service>.yaml` carrying an
//! API key, credentials, or an alternate host. CLI flags win over the file,
//! and the file wins over built-in defaults.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::BioClientsError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParamFile {
    pub api_key: Option<String>,
    pub api_host: Option<String>,
    pub api_base_path: Option<String>,
    #[serde(alias = "user")]
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ParamFile {
    pub fn default_path(service: &str) -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(format!(".{service}.yaml")))
    }

    /// Loads an explicit parameter file, or the service default when none is given.
    ///
    /// A missing default file yields empty parameters; a missing explicit file
    /// is an error.
    pub fn load(explicit: Option<&Path>, service: &str) -> Result<Self, BioClientsError> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path(service) {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if !required && err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No parameter file");
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(BioClientsError::Config {
                    path,
                    message: err.to_string(),
                });
            }
        };

        let params = Self::from_yaml_str(&content).map_err(|err| BioClientsError::Config {
            path: path.clone(),
            message: err.to_string(),
        })?;
        debug!(path = %path.display(), "Loaded parameter file");
        Ok(params)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, BioClientsError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    fn credentials(&self) -> Option<Credentials> {
        let username = clean(self.username.as_deref())?;
        Some(Credentials {
            username,
            password: clean(self.password.as_deref()),
        })
    }
}

fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Built-in endpoint of one API.
#[derive(Debug, Clone, Copy)]
pub struct ApiDefaults {
    pub service: &'static str,
    pub host: &'static str,
    pub base_path: &'static str,
}

/// Endpoint and credentials after applying CLI flags and the parameter file.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub credentials: Option<Credentials>,
}

impl ApiSettings {
    pub fn resolve(
        defaults: ApiDefaults,
        api_host: Option<&str>,
        api_base_path: Option<&str>,
        params: &ParamFile,
    ) -> Self {
        let host = clean(api_host)
            .or_else(|| clean(params.api_host.as_deref()))
            .unwrap_or_else(|| defaults.host.to_string());
        let base_path = api_base_path
            .map(str::trim)
            .map(str::to_string)
            .or_else(|| {
                params
                    .api_base_path
                    .as_deref()
                    .map(str::trim)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| defaults.base_path.to_string());

        Self {
            base_url: join_base_url(&host, &base_path),
            api_key: clean(params.api_key.as_deref()),
            credentials: params.credentials(),
        }
    }

    /// Settings pointing at an explicit base URL, without key or credentials.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            credentials: None,
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn join_base_url(host: &str, base_path: &str) -> String {
    let host = host.trim_end_matches('/');
    let origin = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };
    let path = base_path.trim_matches('/');
    if path.is_empty() {
        origin
    } else {
        format!("{origin}/{path}")
    }
}
