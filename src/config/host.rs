//! Host configuration
//!
//! Settings owned by the embedding program rather than by a tasks file: the
//! environment prefix, the extra environment overlay, stack limits and
//! credentials for remote includes.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::path::PathBuf;

/// Default prefix for environment variables
pub const DEFAULT_ENV_PREFIX: &str = "MARU";

/// Default bound on nested task references
pub const DEFAULT_MAX_STACK: usize = 2048;

/// Default command used to lower wait actions
pub const DEFAULT_WAIT_COMMAND: &str = "zarf tools wait-for";

/// Configuration supplied by the host program
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Prefix for `<PREFIX>_<VAR>` lookups and the injected env
    pub env_prefix: String,

    /// Environment injected into every command; wins over everything else
    pub extra_env: BTreeMap<String, String>,

    /// Architecture reported as `<PREFIX>_ARCH`
    pub arch: String,

    /// Maximum depth of nested task references
    pub max_stack: usize,

    /// Interpreter used when an action has no shell preference
    pub interpreter: Vec<String>,

    /// Command wait actions are lowered to
    pub wait_command: String,

    /// Parent directory for scratch space used while fetching includes
    pub temp_dir: Option<PathBuf>,

    /// Bearer tokens keyed by `host` or `host:port`
    pub auth_tokens: HashMap<String, String>,

    /// Registries reached over plain HTTP
    pub insecure_registries: Vec<String>,
}

impl HostConfig {
    /// Create a host configuration with defaults
    pub fn new() -> Self {
        let mut config = HostConfig {
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            extra_env: BTreeMap::new(),
            arch: default_arch(),
            max_stack: DEFAULT_MAX_STACK,
            interpreter: default_interpreter(),
            wait_command: DEFAULT_WAIT_COMMAND.to_string(),
            temp_dir: None,
            auth_tokens: HashMap::new(),
            insecure_registries: vec!["localhost".to_string(), "127.0.0.1".to_string()],
        };
        config.refresh_extra_env();
        config
    }

    /// Create a host configuration, applying `<PREFIX>_*` overrides from the environment
    pub fn from_env() -> Self {
        let mut config = Self::new();
        let prefix = config.env_prefix.clone();

        if let Ok(arch) = env::var(format!("{}_ARCH", prefix)) {
            if !arch.is_empty() {
                config = config.with_arch(arch);
            }
        }
        if let Some(max_stack) = env::var(format!("{}_MAX_STACK", prefix))
            .ok()
            .and_then(|value| value.parse().ok())
        {
            config.max_stack = max_stack;
        }
        if let Ok(dir) = env::var(format!("{}_TMP_DIR", prefix)) {
            if !dir.is_empty() {
                config.temp_dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(tokens) = env::var(format!("{}_AUTH_TOKENS", prefix)) {
            config.auth_tokens = parse_auth_tokens(&tokens);
        }
        config
    }

    /// Set the environment prefix
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        let old = self.env_prefix.to_uppercase();
        self.extra_env.remove(&old);
        self.extra_env.remove(&format!("{}_ARCH", old));
        self.env_prefix = prefix.into();
        self.refresh_extra_env();
        self
    }

    /// Set the reported architecture
    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self.refresh_extra_env();
        self
    }

    /// Set the maximum task stack depth
    pub fn with_max_stack(mut self, max_stack: usize) -> Self {
        self.max_stack = max_stack;
        self
    }

    /// Set the default interpreter
    pub fn with_interpreter(mut self, interpreter: Vec<String>) -> Self {
        self.interpreter = interpreter;
        self
    }

    /// Set the command wait actions are lowered to
    pub fn with_wait_command(mut self, command: impl Into<String>) -> Self {
        self.wait_command = command.into();
        self
    }

    /// Add an entry to the extra environment overlay
    pub fn add_extra_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.extra_env.insert(key.into(), value.into());
    }

    /// Remove an entry from the extra environment overlay
    pub fn remove_extra_env(&mut self, key: &str) {
        self.extra_env.remove(key);
    }

    /// Name of the process environment variable backing a declared variable
    pub fn env_var_name(&self, variable: &str) -> String {
        format!("{}_{}", self.env_prefix.to_uppercase(), variable)
    }

    /// Bearer token for a host, trying `host:port` before `host`
    pub fn token_for(&self, host: &str, port: Option<u16>) -> Option<&str> {
        crate::include::fetch::token_for(&self.auth_tokens, host, port)
    }

    fn refresh_extra_env(&mut self) {
        let prefix = self.env_prefix.to_uppercase();
        self.extra_env.insert(prefix.clone(), "true".to_string());
        self.extra_env
            .insert(format!("{}_ARCH", prefix), self.arch.clone());
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `host=token;host2:8443=token2` into a lookup map
pub fn parse_auth_tokens(raw: &str) -> HashMap<String, String> {
    raw.split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(host, token)| (host.trim().to_string(), token.trim().to_string()))
        .filter(|(host, token)| !host.is_empty() && !token.is_empty())
        .collect()
}

fn default_interpreter() -> Vec<String> {
    if cfg!(target_os = "windows") {
        vec!["powershell".to_string(), "-Command".to_string()]
    } else {
        vec!["sh".to_string(), "-c".to_string()]
    }
}

/// Architecture name in the form container tooling expects
fn default_arch() -> String {
    match env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_extra_env() {
        let config = HostConfig::new();
        assert_eq!(config.extra_env.get("MARU"), Some(&"true".to_string()));
        assert!(config.extra_env.contains_key("MARU_ARCH"));
        assert_eq!(config.max_stack, DEFAULT_MAX_STACK);
    }

    #[test]
    fn test_with_env_prefix_replaces_injected_env() {
        let config = HostConfig::new().with_env_prefix("run").with_arch("arm64");
        assert!(!config.extra_env.contains_key("MARU"));
        assert_eq!(config.extra_env.get("RUN"), Some(&"true".to_string()));
        assert_eq!(config.extra_env.get("RUN_ARCH"), Some(&"arm64".to_string()));
        assert_eq!(config.env_var_name("FOO"), "RUN_FOO");
    }

    #[test]
    fn test_parse_auth_tokens() {
        let tokens = parse_auth_tokens("gitlab.example.com=abc; example.com:8443 = def;broken");
        assert_eq!(tokens.len(), 2);

        let config = HostConfig {
            auth_tokens: tokens,
            ..HostConfig::new()
        };
        assert_eq!(config.token_for("gitlab.example.com", Some(443)), Some("abc"));
        assert_eq!(config.token_for("example.com", Some(8443)), Some("def"));
        assert_eq!(config.token_for("example.com", None), None);
    }
}
