//! `git::` include sources
//!
//! Clones the repository into a scratch directory and reads one file from
//! the requested revision. The scratch directory is removed on return.

use crate::error::IncludeResult;
use crate::include::fetch::{fetch_error, token_for};
use crate::include::location::GitLocation;
use git2::build::RepoBuilder;
use git2::{Cred, FetchOptions, RemoteCallbacks, Repository};
use std::collections::HashMap;
use std::path::Path;
use tempfile::TempDir;
use tracing::debug;
use url::Url;

/// Fetch a file from a `git::<repo>//<path>?ref=<ref>` location
pub fn fetch(
    location: &str,
    temp_parent: Option<&Path>,
    tokens: &HashMap<String, String>,
) -> IncludeResult<Vec<u8>> {
    let source = GitLocation::parse(location)?;

    let scratch = match temp_parent {
        Some(parent) => TempDir::new_in(parent),
        None => TempDir::new(),
    }
    .map_err(|e| fetch_error(location, e))?;

    let token = Url::parse(&source.repository).ok().and_then(|url| {
        url.host_str()
            .and_then(|host| token_for(tokens, host, url.port_or_known_default()))
            .map(str::to_string)
    });

    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, username_from_url, _allowed_types| match &token {
        Some(token) => Cred::userpass_plaintext(username_from_url.unwrap_or("oauth2"), token),
        None => Cred::ssh_key_from_agent(username_from_url.unwrap_or("git")),
    });

    let mut fetch_options = FetchOptions::new();
    fetch_options.remote_callbacks(callbacks);

    let mut builder = RepoBuilder::new();
    builder.fetch_options(fetch_options);

    debug!(repository = %source.repository, "cloning include repository");
    let repo = builder
        .clone(&source.repository, scratch.path())
        .map_err(|e| fetch_error(location, e))?;

    read_file(&repo, source.reference.as_deref(), &source.subpath)
        .map_err(|e| fetch_error(location, e))
}

/// Read a file from a revision without checking it out
fn read_file(repo: &Repository, reference: Option<&str>, path: &str) -> Result<Vec<u8>, git2::Error> {
    let object = match reference {
        Some(reference) => repo
            .revparse_single(reference)
            .or_else(|_| repo.revparse_single(&format!("origin/{}", reference)))?,
        None => repo.revparse_single("HEAD")?,
    };
    let tree = object.peel_to_tree()?;
    let entry = tree.get_path(Path::new(path))?;
    let blob = entry.to_object(repo)?.peel_to_blob()?;
    Ok(blob.content().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Signature;
    use std::fs;

    fn commit_file(dir: &Path, name: &str, contents: &str) -> Repository {
        let repo = Repository::init(dir).unwrap();
        fs::create_dir_all(dir.join(name).parent().unwrap()).unwrap();
        fs::write(dir.join(name), contents).unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        {
            let tree = repo.find_tree(tree_id).unwrap();
            let signature = Signature::now("maru", "maru@example.com").unwrap();
            repo.commit(Some("HEAD"), &signature, &signature, "init", &tree, &[])
                .unwrap();
        }
        repo
    }

    #[test]
    fn test_read_file_from_head() {
        let temp_dir = TempDir::new().unwrap();
        let repo = commit_file(temp_dir.path(), "tasks/lib.yaml", "tasks: []\n");
        let contents = read_file(&repo, None, "tasks/lib.yaml").unwrap();
        assert_eq!(contents, b"tasks: []\n");
        assert!(read_file(&repo, None, "missing.yaml").is_err());
    }

    #[test]
    fn test_fetch_from_local_repository() {
        let origin = TempDir::new().unwrap();
        commit_file(origin.path(), "lib.yaml", "tasks:\n  - name: hi\n");

        let location = format!("git::file://{}//lib.yaml", origin.path().display());
        let contents = fetch(&location, None, &HashMap::new()).unwrap();
        assert_eq!(contents, b"tasks:\n  - name: hi\n");
    }
}
