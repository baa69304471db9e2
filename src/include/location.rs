//! Include location resolution
//!
//! Turns an include location, possibly relative, into an absolute one given
//! the location of the file that declared it.

use crate::error::{IncludeError, IncludeResult};
use std::path::{Component, Path, PathBuf};
use url::Url;

/// Prefix marking a VCS include
pub const GIT_PREFIX: &str = "git::";

/// Scheme prefix marking an OCI registry include
pub const OCI_PREFIX: &str = "oci://";

/// The kind of source a location points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationKind {
    Local,
    Http,
    Git,
    Oci,
}

/// Classify a location by its prefix
pub fn location_kind(location: &str) -> LocationKind {
    if location.starts_with(GIT_PREFIX) {
        LocationKind::Git
    } else if location.starts_with(OCI_PREFIX) {
        LocationKind::Oci
    } else if location.starts_with("http://") || location.starts_with("https://") {
        LocationKind::Http
    } else {
        LocationKind::Local
    }
}

/// Whether a location is remote rather than a filesystem path
pub fn is_url(location: &str) -> bool {
    location_kind(location) != LocationKind::Local
}

/// Resolve `include` relative to `current`
pub fn resolve_location(current: &str, include: &str) -> IncludeResult<String> {
    if is_url(include) {
        return Ok(include.to_string());
    }

    match location_kind(current) {
        LocationKind::Local => Ok(resolve_local(current, include)),
        LocationKind::Http => resolve_http(current, include),
        LocationKind::Git => resolve_git(current, include),
        LocationKind::Oci => Err(IncludeError::UnsupportedRelative {
            current: current.to_string(),
            include: include.to_string(),
        }),
    }
}

fn resolve_local(current: &str, include: &str) -> String {
    let include = Path::new(include);
    let joined = if include.is_absolute() {
        include.to_path_buf()
    } else {
        Path::new(current)
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(include)
    };

    joined
        .canonicalize()
        .unwrap_or_else(|_| clean_path(&joined))
        .display()
        .to_string()
}

/// Lexically remove `.` and `..` components
fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !cleaned.pop() {
                    cleaned.push("..");
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

/// Join a relative path onto the directory of a `/`-separated path
fn join_relative(base_file: &str, include: &str) -> String {
    let mut segments: Vec<&str> = base_file.split('/').collect();
    segments.pop();
    for segment in include.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

fn invalid_location(location: &str, error: impl ToString) -> IncludeError {
    IncludeError::InvalidLocation {
        location: location.to_string(),
        error: error.to_string(),
    }
}

fn resolve_http(current: &str, include: &str) -> IncludeResult<String> {
    let url = Url::parse(current).map_err(|e| invalid_location(current, e))?;

    if let Some(resolved) = resolve_gitlab_raw(&url, include) {
        return Ok(resolved);
    }

    url.join(include)
        .map(|url| url.to_string())
        .map_err(|e| invalid_location(include, e))
}

/// GitLab's raw file API embeds the file path as one encoded segment:
/// `/api/v4/projects/<id>/repository/files/<path%2Fto%2Ffile>/raw?ref=main`
fn resolve_gitlab_raw(url: &Url, include: &str) -> Option<String> {
    let path = url.path();
    let start = path.find("/repository/files/")? + "/repository/files/".len();
    let rest = &path[start..];
    let end = rest.rfind("/raw")?;
    if end + "/raw".len() != rest.len() {
        return None;
    }

    let file_path = rest[..end].replace("%2F", "/").replace("%2f", "/");
    let joined = join_relative(&file_path, include).replace('/', "%2F");

    let mut resolved = url.clone();
    resolved.set_path(&format!("{}{}/raw", &path[..start], joined));
    Some(resolved.to_string())
}

/// A parsed `git::<repo>//<subpath>?ref=<ref>` location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitLocation {
    pub repository: String,
    pub subpath: String,
    pub reference: Option<String>,
}

impl GitLocation {
    pub fn parse(location: &str) -> IncludeResult<Self> {
        let body = location
            .strip_prefix(GIT_PREFIX)
            .ok_or_else(|| invalid_location(location, "missing git:: prefix"))?;

        let (body, query) = match body.split_once('?') {
            Some((body, query)) => (body, Some(query)),
            None => (body, None),
        };
        let reference = query.and_then(|query| {
            query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(key, _)| *key == "ref")
                .map(|(_, value)| value.to_string())
        });

        let scheme_end = body.find("://").map(|i| i + 3).unwrap_or(0);
        let split = body[scheme_end..]
            .find("//")
            .map(|i| i + scheme_end)
            .ok_or_else(|| invalid_location(location, "missing // between repository and path"))?;

        let subpath = body[split + 2..].trim_start_matches('/').to_string();
        if subpath.is_empty() {
            return Err(invalid_location(location, "missing path within repository"));
        }

        Ok(GitLocation {
            repository: body[..split].to_string(),
            subpath,
            reference,
        })
    }

    fn render(&self) -> String {
        let mut location = format!("{}{}//{}", GIT_PREFIX, self.repository, self.subpath);
        if let Some(reference) = &self.reference {
            location.push_str("?ref=");
            location.push_str(reference);
        }
        location
    }
}

fn resolve_git(current: &str, include: &str) -> IncludeResult<String> {
    let mut location = GitLocation::parse(current)?;
    location.subpath = join_relative(&location.subpath, include);
    Ok(location.render())
}
