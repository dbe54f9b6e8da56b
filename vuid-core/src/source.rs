//! Spec document acquisition: one online attempt, then the local copy

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read local spec {path:?}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Where the loaded document came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Online(String),
    Local(PathBuf),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Online(url) => write!(f, "online spec at {}", url),
            Origin::Local(path) => write!(f, "local spec {}", path.display()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub html: String,
    pub origin: Origin,
}

/// What to load and how long to wait for the network
#[derive(Debug, Clone)]
pub struct DocumentRequest<'a> {
    pub online: bool,
    pub url: &'a str,
    pub local_path: &'a Path,
    pub timeout: Duration,
}

/// Loads the spec, trying the URL once when `online` and falling back to
/// the local file. No retries; only a local failure is fatal.
pub fn load_document(request: &DocumentRequest<'_>) -> Result<Document, SourceError> {
    if request.online {
        match fetch(request.url, request.timeout) {
            Ok(html) => {
                log::info!("Loaded spec online from {}", request.url);
                return Ok(Document {
                    html,
                    origin: Origin::Online(request.url.to_string()),
                });
            }
            Err(e) => {
                log::warn!(
                    "Could not fetch spec from {} ({}), falling back to {}",
                    request.url,
                    e,
                    request.local_path.display()
                );
            }
        }
    }

    let html = std::fs::read_to_string(request.local_path).map_err(|source| {
        SourceError::Unavailable {
            path: request.local_path.to_path_buf(),
            source,
        }
    })?;
    log::info!("Loaded local spec {}", request.local_path.display());

    Ok(Document {
        html,
        origin: Origin::Local(request.local_path.to_path_buf()),
    })
}

fn fetch(url: &str, timeout: Duration) -> anyhow::Result<String> {
    let agent = ureq::AgentBuilder::new().timeout(timeout).build();
    let body = agent.get(url).call()?.into_string()?;
    Ok(body)
}
