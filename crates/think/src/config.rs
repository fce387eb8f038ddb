//! Thought identity and on-disk layout.
//!
//! Everything lives under a single home directory (default
//! `~/.thinkingscript`, overridable with `THINKINGSCRIPT_HOME`):
//!
//! ```text
//! config.json                  # global interpreter config
//! policy.json                  # global policy (read-only from the core)
//! agents/<name>.json           # provider credentials (0600)
//! bin/<name>                   # installed thoughts
//! thoughts/<name>/             # per-thought state (workspace, memories, ...)
//! cache/<cachekey>/fingerprint # content-address marker
//! locks/prompt-<tty>.lock      # advisory prompt locks
//! ```
//!
//! A thought's identity is its content fingerprint: SHA-256 over the script
//! bytes concatenated with the running binary's own bytes. Hashing the
//! interpreter in means every cache (and every remembered approval keyed on
//! it) invalidates when the binary changes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_AGENT: &str = "anthropic";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_MAX_ITERATIONS: u32 = 50;

/// Errors establishing the interpreter's identity or on-disk layout.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("creating directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("writing {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("computing cache dir: {0}")]
    CacheDir(io::Error),
}

/// The interpreter's home directory and the paths derived from it.
#[derive(Debug, Clone)]
pub struct Home {
    root: PathBuf,
}

impl Home {
    /// Resolve the home directory from the environment.
    ///
    /// `THINKINGSCRIPT_HOME` wins; otherwise `~/.thinkingscript`, falling
    /// back to a relative `.thinkingscript` when no home dir is known.
    pub fn resolve() -> Self {
        if let Ok(v) = std::env::var("THINKINGSCRIPT_HOME")
            && !v.is_empty()
        {
            return Self { root: PathBuf::from(v) };
        }
        let root = match dirs::home_dir() {
            Some(home) => home.join(".thinkingscript"),
            None => PathBuf::from(".thinkingscript"),
        };
        Self { root }
    }

    /// Use an explicit root. Primarily for tests.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the home directory skeleton with 0700 permissions.
    pub fn ensure(&self) -> Result<(), ConfigError> {
        for dir in [
            self.root.clone(),
            self.agents_dir(),
            self.bin_dir(),
            self.cache_root(),
            self.thoughts_dir(),
        ] {
            create_private_dir(&dir)?;
        }
        Ok(())
    }

    pub fn agents_dir(&self) -> PathBuf {
        self.root.join("agents")
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    pub fn cache_root(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn thoughts_dir(&self) -> PathBuf {
        self.root.join("thoughts")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    /// The global policy file. Read-only from the core.
    pub fn global_policy_path(&self) -> PathBuf {
        self.root.join("policy.json")
    }

    /// Per-thought data directory for a script reference.
    ///
    /// Keyed by thought name, not content hash, so workspace and memories
    /// survive script edits and binary rebuilds.
    pub fn thought_dir(&self, script_ref: &str) -> PathBuf {
        self.thoughts_dir().join(thought_name(script_ref))
    }

    pub fn workspace_dir(&self, script_ref: &str) -> PathBuf {
        self.thought_dir(script_ref).join("workspace")
    }

    pub fn memories_dir(&self, script_ref: &str) -> PathBuf {
        self.thought_dir(script_ref).join("memories")
    }

    pub fn memory_js_path(&self, script_ref: &str) -> PathBuf {
        self.thought_dir(script_ref).join("memory.js")
    }

    /// Content-addressed cache directory for a fingerprint.
    ///
    /// The fingerprint is already hex, so the key is a truncation rather
    /// than a re-hash: the first 32 chars (128 bits).
    pub fn cache_dir(&self, fingerprint: &str) -> PathBuf {
        let short = if fingerprint.len() > 32 {
            &fingerprint[..32]
        } else {
            fingerprint
        };
        self.cache_root().join(short)
    }

    /// Load global interpreter config, falling back to defaults on any
    /// missing or malformed file.
    pub fn load_config(&self) -> Config {
        let mut cfg = Config::default();
        if let Ok(data) = fs::read(self.root.join("config.json"))
            && let Ok(parsed) = serde_json::from_slice::<Config>(&data)
        {
            cfg = parsed;
        }
        if cfg.agent.is_empty() {
            cfg.agent = DEFAULT_AGENT.to_string();
        }
        if cfg.max_tokens == 0 {
            cfg.max_tokens = DEFAULT_MAX_TOKENS;
        }
        if cfg.max_iterations == 0 {
            cfg.max_iterations = DEFAULT_MAX_ITERATIONS;
        }
        cfg
    }

    /// Load a named agent (provider credential) file, empty on absence.
    pub fn load_agent(&self, name: &str) -> AgentConfig {
        fs::read(self.agents_dir().join(format!("{name}.json")))
            .ok()
            .and_then(|data| serde_json::from_slice(&data).ok())
            .unwrap_or_default()
    }

    /// Write an agent credential file with 0600 permissions.
    pub fn save_agent(&self, name: &str, agent: &AgentConfig) -> Result<(), ConfigError> {
        create_private_dir(&self.agents_dir())?;
        let path = self.agents_dir().join(format!("{name}.json"));
        let data = serde_json::to_vec_pretty(agent).expect("agent config serializes");
        write_private_file(&path, &data).map_err(|source| ConfigError::Write { path, source })
    }
}

/// Global interpreter configuration (`<home>/config.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub max_tokens: u32,
    #[serde(default)]
    pub max_iterations: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            agent: DEFAULT_AGENT.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// Provider credentials (`<home>/agents/<name>.json`, 0600).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_base: String,
    #[serde(default)]
    pub model: String,
}

/// Per-script configuration from YAML frontmatter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptConfig {
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// The merged configuration an invocation actually runs with.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub provider: String,
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub max_tokens: u32,
    pub max_iterations: u32,
}

/// Merge config layers: defaults < config.json < agent file < frontmatter
/// < `THINKINGSCRIPT__*` environment variables.
pub fn resolve(home: &Home, script_cfg: Option<&ScriptConfig>) -> ResolvedConfig {
    let cfg = home.load_config();

    let mut agent_name = cfg.agent.clone();
    if let Some(name) = script_cfg.and_then(|s| s.agent.as_deref())
        && !name.is_empty()
    {
        agent_name = name.to_string();
    }
    if let Some(v) = env_override("AGENT") {
        agent_name = v;
    }

    let agent = home.load_agent(&agent_name);

    let mut resolved = ResolvedConfig {
        provider: agent.provider,
        api_key: agent.api_key,
        api_base: agent.api_base,
        model: agent.model,
        max_tokens: cfg.max_tokens,
        max_iterations: cfg.max_iterations,
    };

    if resolved.provider.is_empty() {
        resolved.provider = DEFAULT_AGENT.to_string();
    }
    if resolved.model.is_empty() {
        resolved.model = DEFAULT_MODEL.to_string();
    }

    if let Some(s) = script_cfg {
        if let Some(model) = s.model.as_deref()
            && !model.is_empty()
        {
            resolved.model = model.to_string();
        }
        if let Some(max_tokens) = s.max_tokens {
            resolved.max_tokens = max_tokens;
        }
    }

    if let Some(v) = env_override("MODEL") {
        resolved.model = v;
    }
    if let Some(n) = env_override("MAX_TOKENS").and_then(|v| v.parse::<u32>().ok())
        && n > 0
    {
        resolved.max_tokens = n;
    }
    if let Some(v) = env_override("ANTHROPIC__API_KEY") {
        resolved.api_key = v;
    }

    resolved
}

/// How cache and memory state persist across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// The default: approvals and memories accumulate across runs.
    Persist,
    /// Cache is used during the run and wiped at exit.
    Ephemeral,
    /// No cache: a fresh dir is created and wiped.
    Off,
}

impl CacheMode {
    /// Read `THINKINGSCRIPT__CACHE`; unrecognized values mean persist.
    pub fn from_env() -> Self {
        match std::env::var("THINKINGSCRIPT__CACHE")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str()
        {
            "off" | "none" | "disable" => CacheMode::Off,
            "ephemeral" | "tmp" => CacheMode::Ephemeral,
            _ => CacheMode::Persist,
        }
    }
}

fn env_override(key: &str) -> Option<String> {
    std::env::var(format!("THINKINGSCRIPT__{key}"))
        .ok()
        .filter(|v| !v.is_empty())
}

/// Derive a human-readable thought name from a script path or URL.
///
/// `examples/weather.md` → `weather`;
/// `https://example.com/weather.md?v=2` → `weather`.
pub fn thought_name(script_ref: &str) -> String {
    let base = if let Some((_, rest)) = script_ref.split_once("://") {
        let path = rest.split(['?', '#']).next().unwrap_or(rest);
        path.rsplit('/').next().unwrap_or(path)
    } else {
        Path::new(script_ref)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(script_ref)
    };
    match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => base.to_string(),
    }
}

/// Content fingerprint: SHA-256 over the script bytes concatenated with the
/// running executable's own bytes, lowercase hex.
pub fn fingerprint(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    if let Ok(exe) = std::env::current_exe()
        && let Ok(bin) = fs::read(&exe)
    {
        hasher.update(&bin);
    }
    format!("{:x}", hasher.finalize())
}

/// True iff `<cache_dir>/fingerprint` matches `current` after trimming.
///
/// A mismatch is not an error; it is the signal to wipe and rebuild the
/// cache directory.
pub fn check_fingerprint(cache_dir: &Path, current: &str) -> bool {
    match fs::read_to_string(cache_dir.join("fingerprint")) {
        Ok(data) => data.trim() == current,
        Err(_) => false,
    }
}

/// Store the fingerprint marker in the cache directory.
pub fn write_fingerprint(cache_dir: &Path, fingerprint: &str) -> Result<(), ConfigError> {
    let path = cache_dir.join("fingerprint");
    fs::write(&path, fingerprint).map_err(|source| ConfigError::Write { path, source })
}

fn create_private_dir(path: &Path) -> Result<(), ConfigError> {
    fs::create_dir_all(path).map_err(|source| ConfigError::CreateDir {
        path: path.to_path_buf(),
        source,
    })?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o700));
    }
    Ok(())
}

pub(crate) fn write_private_file(path: &Path, data: &[u8]) -> io::Result<()> {
    fs::write(path, data)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_thought_name_from_path() {
        assert_eq!(thought_name("weather.md"), "weather");
        assert_eq!(thought_name("examples/weather.thought"), "weather");
        assert_eq!(thought_name("/abs/path/to/report.txt"), "report");
        assert_eq!(thought_name("noext"), "noext");
    }

    #[test]
    fn test_thought_name_from_url() {
        assert_eq!(thought_name("https://example.com/weather.md"), "weather");
        assert_eq!(thought_name("https://example.com/weather.md?v=2"), "weather");
        assert_eq!(
            thought_name("http://example.com/a/b/forecast.thought#frag"),
            "forecast"
        );
    }

    #[test]
    fn test_thought_name_hidden_file_keeps_name() {
        // A leading-dot name has no stem to strip down to.
        assert_eq!(thought_name(".profile"), ".profile");
    }

    #[test]
    fn test_home_dirs() {
        let home = Home::at("/tmp/ts-home");
        assert_eq!(
            home.thought_dir("examples/weather.md"),
            PathBuf::from("/tmp/ts-home/thoughts/weather")
        );
        assert_eq!(
            home.workspace_dir("weather.md"),
            PathBuf::from("/tmp/ts-home/thoughts/weather/workspace")
        );
        assert_eq!(
            home.memories_dir("weather.md"),
            PathBuf::from("/tmp/ts-home/thoughts/weather/memories")
        );
        assert_eq!(
            home.memory_js_path("weather.md"),
            PathBuf::from("/tmp/ts-home/thoughts/weather/memory.js")
        );
    }

    #[test]
    fn test_cache_dir_truncates_fingerprint() {
        let home = Home::at("/tmp/ts-home");
        let fp = "a".repeat(64);
        let dir = home.cache_dir(&fp);
        assert_eq!(
            dir.file_name().and_then(|n| n.to_str()),
            Some("a".repeat(32).as_str())
        );

        // Short fingerprints pass through untouched.
        let dir = home.cache_dir("abcd");
        assert_eq!(dir.file_name().and_then(|n| n.to_str()), Some("abcd"));
    }

    #[test]
    fn test_ensure_creates_layout() {
        let tmp = TempDir::new().expect("tempdir");
        let home = Home::at(tmp.path().join("home"));
        home.ensure().expect("ensure");

        for dir in ["agents", "bin", "cache", "thoughts"] {
            assert!(home.root().join(dir).is_dir(), "missing {dir}");
        }
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let a = fingerprint(b"print hello");
        let b = fingerprint(b"print hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_differs_on_content() {
        assert_ne!(fingerprint(b"one"), fingerprint(b"two"));
    }

    #[test]
    fn test_check_fingerprint() {
        let tmp = TempDir::new().expect("tempdir");
        let fp = fingerprint(b"script");

        // Missing marker.
        assert!(!check_fingerprint(tmp.path(), &fp));

        write_fingerprint(tmp.path(), &fp).expect("write");
        assert!(check_fingerprint(tmp.path(), &fp));
        assert!(!check_fingerprint(tmp.path(), "different"));

        // Trailing newline is tolerated on read.
        fs::write(tmp.path().join("fingerprint"), format!("{fp}\n")).expect("write");
        assert!(check_fingerprint(tmp.path(), &fp));
    }

    #[test]
    fn test_load_config_defaults() {
        let tmp = TempDir::new().expect("tempdir");
        let home = Home::at(tmp.path());
        let cfg = home.load_config();
        assert_eq!(cfg.agent, DEFAULT_AGENT);
        assert_eq!(cfg.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(cfg.max_iterations, DEFAULT_MAX_ITERATIONS);
    }

    #[test]
    fn test_load_config_partial_file_backfills() {
        let tmp = TempDir::new().expect("tempdir");
        fs::write(
            tmp.path().join("config.json"),
            r#"{"version": 1, "agent": "custom"}"#,
        )
        .expect("write");
        let home = Home::at(tmp.path());
        let cfg = home.load_config();
        assert_eq!(cfg.agent, "custom");
        assert_eq!(cfg.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_save_and_load_agent() {
        let tmp = TempDir::new().expect("tempdir");
        let home = Home::at(tmp.path());
        let agent = AgentConfig {
            version: 1,
            provider: "anthropic".into(),
            api_key: "sk-test".into(),
            api_base: String::new(),
            model: "claude-test".into(),
        };
        home.save_agent("anthropic", &agent).expect("save");

        let loaded = home.load_agent("anthropic");
        assert_eq!(loaded.api_key, "sk-test");
        assert_eq!(loaded.model, "claude-test");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let meta = fs::metadata(home.agents_dir().join("anthropic.json")).expect("meta");
            assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        }
    }

    #[test]
    fn test_resolve_frontmatter_overrides() {
        let tmp = TempDir::new().expect("tempdir");
        let home = Home::at(tmp.path());
        let script_cfg = ScriptConfig {
            agent: None,
            model: Some("claude-opus-test".into()),
            max_tokens: Some(1234),
        };
        let resolved = resolve(&home, Some(&script_cfg));
        assert_eq!(resolved.model, "claude-opus-test");
        assert_eq!(resolved.max_tokens, 1234);
        assert_eq!(resolved.provider, "anthropic");
        assert_eq!(resolved.max_iterations, DEFAULT_MAX_ITERATIONS);
    }
}
