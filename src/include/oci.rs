//! `oci://` include sources
//!
//! Pulls a tasks file published as an OCI artifact using the registry v2
//! HTTP API: fetch the manifest, pick the YAML layer, download its blob.

use crate::error::{IncludeError, IncludeResult};
use crate::include::fetch::{fetch_error, http_client, token_for};
use crate::include::location::OCI_PREFIX;
use regex::Regex;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use tracing::debug;

const MANIFEST_MEDIA_TYPES: &str = "application/vnd.oci.image.manifest.v1+json, \
     application/vnd.docker.distribution.manifest.v2+json";

const TITLE_ANNOTATION: &str = "org.opencontainers.image.title";

/// A parsed `oci://registry/repository[:tag|@digest]` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciReference {
    pub registry: String,
    pub repository: String,
    /// Tag or digest, `latest` when unset
    pub reference: String,
}

impl OciReference {
    pub fn parse(location: &str) -> IncludeResult<Self> {
        let invalid = |error: &str| IncludeError::InvalidLocation {
            location: location.to_string(),
            error: error.to_string(),
        };

        let body = location
            .strip_prefix(OCI_PREFIX)
            .ok_or_else(|| invalid("missing oci:// prefix"))?;
        let (registry, rest) = body
            .split_once('/')
            .ok_or_else(|| invalid("missing repository"))?;

        let (repository, reference) = if let Some((repository, digest)) = rest.split_once('@') {
            (repository, digest)
        } else {
            let last_slash = rest.rfind('/').map(|i| i + 1).unwrap_or(0);
            match rest[last_slash..].rfind(':') {
                Some(i) => (&rest[..last_slash + i], &rest[last_slash + i + 1..]),
                None => (rest, "latest"),
            }
        };

        if registry.is_empty() || repository.is_empty() || reference.is_empty() {
            return Err(invalid("expected oci://registry/repository:tag"));
        }

        Ok(OciReference {
            registry: registry.to_string(),
            repository: repository.to_string(),
            reference: reference.to_string(),
        })
    }

    fn host(&self) -> (&str, Option<u16>) {
        match self.registry.rsplit_once(':') {
            Some((host, port)) => match port.parse() {
                Ok(port) => (host, Some(port)),
                Err(_) => (self.registry.as_str(), None),
            },
            None => (self.registry.as_str(), None),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    layers: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
struct Descriptor {
    #[serde(rename = "mediaType", default)]
    media_type: String,
    digest: String,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Registry session holding the bearer token once negotiated
struct Registry<'a> {
    client: Client,
    base: String,
    location: &'a str,
    bearer: Option<String>,
}

impl Registry<'_> {
    fn send(&mut self, build: impl Fn(&Client) -> RequestBuilder) -> IncludeResult<Response> {
        let response = self
            .authorized(build(&self.client))
            .send()
            .map_err(|e| fetch_error(self.location, e))?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| fetch_error(self.location, "registry requires authentication"))?;
        self.bearer = Some(self.negotiate(&challenge)?);

        self.authorized(build(&self.client))
            .send()
            .map_err(|e| fetch_error(self.location, e))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.bearer {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }

    /// Exchange a `Bearer realm=...` challenge for a token
    fn negotiate(&self, challenge: &str) -> IncludeResult<String> {
        let params = challenge_params(challenge);
        let realm = params
            .get("realm")
            .ok_or_else(|| fetch_error(self.location, "authentication challenge has no realm"))?;

        let query: Vec<(&str, &str)> = ["service", "scope"]
            .iter()
            .filter_map(|key| params.get(*key).map(|value| (*key, value.as_str())))
            .collect();

        let response = self
            .authorized(self.client.get(realm.as_str()).query(&query))
            .send()
            .map_err(|e| fetch_error(self.location, e))?;
        let response = check_status(self.location, response)?;
        let body: TokenResponse = response.json().map_err(|e| fetch_error(self.location, e))?;

        body.token
            .or(body.access_token)
            .ok_or_else(|| fetch_error(self.location, "token endpoint returned no token"))
    }
}

fn challenge_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(\w+)="([^"]*)""#).expect("valid challenge regex"))
}

fn challenge_params(challenge: &str) -> HashMap<String, String> {
    challenge_regex()
        .captures_iter(challenge)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

fn check_status(location: &str, response: Response) -> IncludeResult<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(fetch_error(location, format!("registry returned {}", status)))
    }
}

/// The layer holding the tasks file
///
/// Prefers a layer titled `*.yaml`/`*.yml`, then a YAML media type, then the first layer.
fn select_layer(manifest: &Manifest) -> Option<&Descriptor> {
    let is_yaml_name = |name: &str| name.ends_with(".yaml") || name.ends_with(".yml");
    manifest
        .layers
        .iter()
        .find(|layer| {
            layer
                .annotations
                .get(TITLE_ANNOTATION)
                .is_some_and(|title| is_yaml_name(title))
        })
        .or_else(|| {
            manifest
                .layers
                .iter()
                .find(|layer| layer.media_type.contains("yaml"))
        })
        .or_else(|| manifest.layers.first())
}

/// Fetch the tasks file behind an `oci://` location
pub fn fetch(
    location: &str,
    tokens: &HashMap<String, String>,
    insecure_registries: &[String],
) -> IncludeResult<Vec<u8>> {
    let reference = OciReference::parse(location)?;
    let (host, port) = reference.host();
    let scheme = if insecure_registries.iter().any(|r| r == host || *r == reference.registry) {
        "http"
    } else {
        "https"
    };

    let mut registry = Registry {
        client: http_client().map_err(|e| fetch_error(location, e))?,
        base: format!("{}://{}/v2/{}", scheme, reference.registry, reference.repository),
        location,
        bearer: token_for(tokens, host, port).map(str::to_string),
    };

    let manifest_url = format!("{}/manifests/{}", registry.base, reference.reference);
    debug!(url = %manifest_url, "fetching manifest");
    let response = registry.send(|client| {
        client
            .get(&manifest_url)
            .header(ACCEPT, MANIFEST_MEDIA_TYPES)
    })?;
    let manifest: Manifest = check_status(location, response)?
        .json()
        .map_err(|e| fetch_error(location, e))?;

    let layer = select_layer(&manifest)
        .ok_or_else(|| fetch_error(location, "manifest has no layers"))?;

    let blob_url = format!("{}/blobs/{}", registry.base, layer.digest);
    debug!(url = %blob_url, "fetching layer");
    let response = registry.send(|client| client.get(&blob_url))?;
    check_status(location, response)?
        .bytes()
        .map(|bytes| bytes.to_vec())
        .map_err(|e| fetch_error(location, e))
}
