//! Include content fetching
//!
//! Reads the raw bytes behind an absolute include location.

use crate::config::host::HostConfig;
use crate::error::{IncludeError, IncludeResult};
use crate::include::git;
use crate::include::location::{location_kind, LocationKind};
use crate::include::oci;
use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use reqwest::redirect::Policy;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Timeout for a single HTTP request made while fetching an include
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Source of include file contents
pub trait Fetcher {
    /// Fetch the contents of an absolute location
    fn fetch(&self, location: &str) -> IncludeResult<Vec<u8>>;
}

/// Fetcher for local paths, HTTP(S), `git::` and `oci://` locations
#[derive(Debug, Clone, Default)]
pub struct DefaultFetcher {
    auth_tokens: HashMap<String, String>,
    temp_dir: Option<PathBuf>,
    insecure_registries: Vec<String>,
}

impl DefaultFetcher {
    pub fn new(host: &HostConfig) -> Self {
        DefaultFetcher {
            auth_tokens: host.auth_tokens.clone(),
            temp_dir: host.temp_dir.clone(),
            insecure_registries: host.insecure_registries.clone(),
        }
    }

    fn fetch_http(&self, location: &str) -> IncludeResult<Vec<u8>> {
        let url = Url::parse(location).map_err(|e| fetch_error(location, e))?;
        let client = http_client().map_err(|e| fetch_error(location, e))?;

        let mut request = client.get(url.clone());
        if let Some(token) = url
            .host_str()
            .and_then(|host| token_for(&self.auth_tokens, host, url.port_or_known_default()))
        {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().map_err(|e| fetch_error(location, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(location, format!("server returned {}", status)));
        }
        response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|e| fetch_error(location, e))
    }
}

impl Fetcher for DefaultFetcher {
    fn fetch(&self, location: &str) -> IncludeResult<Vec<u8>> {
        debug!(location, "fetching include");
        match location_kind(location) {
            LocationKind::Local => fs::read(location).map_err(|e| fetch_error(location, e)),
            LocationKind::Http => self.fetch_http(location),
            LocationKind::Git => git::fetch(location, self.temp_dir.as_deref(), &self.auth_tokens),
            LocationKind::Oci => oci::fetch(location, &self.auth_tokens, &self.insecure_registries),
        }
    }
}

/// Blocking client shared by HTTP and registry fetches
pub(crate) fn http_client() -> reqwest::Result<Client> {
    Client::builder()
        .timeout(HTTP_TIMEOUT)
        .redirect(Policy::limited(10))
        .user_agent(concat!("maru/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Token for a host, trying `host:port` before `host`
pub(crate) fn token_for<'a>(
    tokens: &'a HashMap<String, String>,
    host: &str,
    port: Option<u16>,
) -> Option<&'a str> {
    port.and_then(|port| tokens.get(&format!("{}:{}", host, port)))
        .or_else(|| tokens.get(host))
        .map(String::as_str)
}

pub(crate) fn fetch_error(location: &str, error: impl ToString) -> IncludeError {
    IncludeError::Fetch {
        location: location.to_string(),
        error: error.to_string(),
    }
}
