//! Repository transport: HTTP(S) via ureq with basic auth, plus `file://` URLs.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::debug;

use crate::error::UtilError;

/// Username/password for HTTP basic authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_owned(),
            password: password.to_owned(),
        }
    }

    /// Value for the `Authorization` header.
    pub fn basic_header(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {token}")
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Fetches files from remote repositories.
///
/// One agent is shared by all requests so connections are pooled.
#[derive(Debug, Clone)]
pub struct Downloader {
    agent: ureq::Agent,
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Downloader {
    pub fn new() -> Self {
        let agent = ureq::Agent::new_with_config(
            ureq::config::Config::builder()
                .timeout_connect(Some(Duration::from_secs(30)))
                .timeout_global(Some(Duration::from_secs(600)))
                .build(),
        );
        Self { agent }
    }

    /// Download `url` into `dest`, replacing any existing file.
    ///
    /// # Errors
    /// Returns `UtilError::NotFound` when the server answers 404/410 or the
    /// `file://` source does not exist, `UtilError::Download` for any other
    /// transfer failure, and `UtilError::Io` if `dest` cannot be written.
    pub fn download(
        &self,
        url: &str,
        dest: &Path,
        credentials: Option<&Credentials>,
    ) -> Result<(), UtilError> {
        if let Some(source) = local_path(url) {
            if !source.is_file() {
                return Err(UtilError::NotFound {
                    url: url.to_owned(),
                });
            }
            std::fs::copy(&source, dest).map_err(|source_err| UtilError::Io {
                path: dest.display().to_string(),
                source: source_err,
            })?;
            return Ok(());
        }

        let response = self.get(url, credentials)?;
        let mut body = response.into_body();
        let mut file = std::fs::File::create(dest).map_err(|source| UtilError::Io {
            path: dest.display().to_string(),
            source,
        })?;
        std::io::copy(&mut body.as_reader(), &mut file).map_err(|e| UtilError::Download {
            url: url.to_owned(),
            message: e.to_string(),
        })?;
        debug!(url, dest = %dest.display(), "downloaded");
        Ok(())
    }

    /// Fetch a small text resource such as `maven-metadata.xml` or a `.sha256` sidecar.
    ///
    /// # Errors
    /// Same classification as [`Downloader::download`].
    pub fn fetch_text(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<String, UtilError> {
        if let Some(source) = local_path(url) {
            return match std::fs::read_to_string(&source) {
                Ok(text) => Ok(text),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(UtilError::NotFound {
                    url: url.to_owned(),
                }),
                Err(source_err) => Err(UtilError::Io {
                    path: source.display().to_string(),
                    source: source_err,
                }),
            };
        }

        let response = self.get(url, credentials)?;
        let mut text = String::new();
        response
            .into_body()
            .as_reader()
            .read_to_string(&mut text)
            .map_err(|e| UtilError::Download {
                url: url.to_owned(),
                message: e.to_string(),
            })?;
        Ok(text)
    }

    fn get(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<ureq::http::Response<ureq::Body>, UtilError> {
        let mut request = self.agent.get(url);
        if let Some(credentials) = credentials {
            request = request.header("Authorization", &credentials.basic_header());
        }
        request.call().map_err(|e| match e {
            ureq::Error::StatusCode(404 | 410) => UtilError::NotFound {
                url: url.to_owned(),
            },
            other => UtilError::Download {
                url: url.to_owned(),
                message: other.to_string(),
            },
        })
    }
}

/// The filesystem path behind a `file://` URL.
fn local_path(url: &str) -> Option<PathBuf> {
    url.strip_prefix("file://").map(PathBuf::from)
}
