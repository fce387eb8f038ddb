//! Thought script parsing.
//!
//! A thought file is: an optional shebang line, an optional YAML frontmatter
//! block delimited by `---` lines, and then the prompt. The prompt is the
//! part the model sees; the frontmatter configures how it is run.

use std::path::Path;

use crate::config::{self, Home, ScriptConfig};
use crate::limits::{MAX_SCRIPT_BYTES, SCRIPT_FETCH_TIMEOUT};

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("reading script {reference}: {source}")]
    Read {
        reference: String,
        source: std::io::Error,
    },
    #[error("fetching {reference}: {detail}")]
    Fetch { reference: String, detail: String },
    #[error("script from {reference} exceeds maximum size ({limit} bytes)")]
    TooLarge { reference: String, limit: u64 },
    #[error("parsing frontmatter: {0}")]
    Frontmatter(#[from] serde_yaml::Error),
    #[error("script {reference} has no prompt content")]
    EmptyPrompt { reference: String },
    #[error(
        "'{name}' is both a local file and an installed thought; \
         run `think ./{name}` for the file or `think {installed}` for the installed copy"
    )]
    Ambiguous {
        name: String,
        installed: String,
    },
}

/// A parsed thought, ready to run.
#[derive(Debug, Clone)]
pub struct ParsedScript {
    pub prompt: String,
    pub config: Option<ScriptConfig>,
    pub fingerprint: String,
    pub reference: String,
    pub is_url: bool,
}

/// Resolve a script reference against the installed-thought bin directory.
///
/// A bare name that exists both as a local file and under `<home>/bin` is
/// ambiguous, and ambiguity is an error that names both ways out rather
/// than a silent preference.
pub fn resolve_ref(home: &Home, script_ref: &str) -> Result<String, ScriptError> {
    if is_url(script_ref) {
        return Ok(script_ref.to_string());
    }

    let local_exists = Path::new(script_ref).exists();
    let is_bare_name = !script_ref.contains(std::path::MAIN_SEPARATOR);
    let installed = home.bin_dir().join(script_ref);

    if is_bare_name && installed.is_file() {
        if local_exists {
            return Err(ScriptError::Ambiguous {
                name: script_ref.to_string(),
                installed: installed.display().to_string(),
            });
        }
        return Ok(installed.display().to_string());
    }

    Ok(script_ref.to_string())
}

/// Parse a thought from a local path or an HTTP(S) URL.
pub async fn parse(script_ref: &str) -> Result<ParsedScript, ScriptError> {
    let is_url = is_url(script_ref);
    let data = if is_url {
        fetch_url(script_ref).await?
    } else {
        std::fs::read(script_ref).map_err(|source| ScriptError::Read {
            reference: script_ref.to_string(),
            source,
        })?
    };
    parse_bytes(script_ref, &data, is_url)
}

pub fn is_url(script_ref: &str) -> bool {
    script_ref.starts_with("http://") || script_ref.starts_with("https://")
}

fn parse_bytes(reference: &str, data: &[u8], is_url: bool) -> Result<ParsedScript, ScriptError> {
    let fingerprint = config::fingerprint(data);
    let mut content = String::from_utf8_lossy(data).into_owned();

    // Strip the shebang line if present.
    if content.starts_with("#!") {
        content = match content.split_once('\n') {
            Some((_, rest)) => rest.to_string(),
            None => String::new(),
        };
    }

    // Optional frontmatter: a `---` line, YAML, a closing `---`. An
    // unclosed block is not frontmatter; it stays in the prompt.
    let mut script_cfg = None;
    let mut content = content.trim_start_matches('\n').to_string();
    if let Some(rest) = content.strip_prefix("---") {
        let rest = match rest.split_once('\n') {
            Some((_, after)) => after,
            None => rest,
        };
        if let Some(end) = rest.find("---") {
            let frontmatter = &rest[..end];
            script_cfg = if frontmatter.trim().is_empty() {
                Some(ScriptConfig::default())
            } else {
                Some(serde_yaml::from_str::<ScriptConfig>(frontmatter)?)
            };
            let mut after = &rest[end + 3..];
            if let Some(stripped) = after.strip_prefix('\n') {
                after = stripped;
            }
            content = after.to_string();
        }
    }

    let prompt = content.trim().to_string();
    if prompt.is_empty() {
        return Err(ScriptError::EmptyPrompt {
            reference: reference.to_string(),
        });
    }

    Ok(ParsedScript {
        prompt,
        config: script_cfg,
        fingerprint,
        reference: reference.to_string(),
        is_url,
    })
}

async fn fetch_url(url: &str) -> Result<Vec<u8>, ScriptError> {
    let client = reqwest::Client::builder()
        .timeout(SCRIPT_FETCH_TIMEOUT)
        .build()
        .map_err(|e| ScriptError::Fetch {
            reference: url.to_string(),
            detail: e.to_string(),
        })?;

    let mut resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| ScriptError::Fetch {
            reference: url.to_string(),
            detail: e.to_string(),
        })?;

    if !resp.status().is_success() {
        return Err(ScriptError::Fetch {
            reference: url.to_string(),
            detail: format!("HTTP {}", resp.status().as_u16()),
        });
    }

    // Read one byte past the cap so an oversized script is an error, not a
    // silent truncation.
    let mut data = Vec::new();
    while let Some(chunk) = resp.chunk().await.map_err(|e| ScriptError::Fetch {
        reference: url.to_string(),
        detail: e.to_string(),
    })? {
        data.extend_from_slice(&chunk);
        if data.len() as u64 > MAX_SCRIPT_BYTES {
            return Err(ScriptError::TooLarge {
                reference: url.to_string(),
                limit: MAX_SCRIPT_BYTES,
            });
        }
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse_str(content: &str) -> Result<ParsedScript, ScriptError> {
        parse_bytes("test.thought", content.as_bytes(), false)
    }

    #[test]
    fn test_parse_simple_script() {
        let parsed = parse_str("Print hello world").expect("parse");
        assert_eq!(parsed.prompt, "Print hello world");
        assert!(parsed.config.is_none());
        assert_eq!(parsed.fingerprint.len(), 64);
        assert!(!parsed.is_url);
    }

    #[test]
    fn test_parse_strips_shebang() {
        let parsed = parse_str("#!/usr/bin/env think\nPrint hello").expect("parse");
        assert_eq!(parsed.prompt, "Print hello");
    }

    #[test]
    fn test_parse_frontmatter() {
        let parsed = parse_str(
            "---\nmodel: claude-test\nmax_tokens: 2048\n---\nDo the thing",
        )
        .expect("parse");
        assert_eq!(parsed.prompt, "Do the thing");
        let cfg = parsed.config.expect("frontmatter");
        assert_eq!(cfg.model.as_deref(), Some("claude-test"));
        assert_eq!(cfg.max_tokens, Some(2048));
    }

    #[test]
    fn test_parse_shebang_and_frontmatter() {
        let parsed = parse_str(
            "#!/usr/bin/env think\n---\nagent: anthropic\n---\nSummarize stdin",
        )
        .expect("parse");
        assert_eq!(parsed.prompt, "Summarize stdin");
        assert_eq!(
            parsed.config.expect("frontmatter").agent.as_deref(),
            Some("anthropic")
        );
    }

    #[test]
    fn test_parse_empty_prompt_is_error() {
        assert!(matches!(
            parse_str("#!/usr/bin/env think\n"),
            Err(ScriptError::EmptyPrompt { .. })
        ));
        assert!(matches!(
            parse_str("---\nmodel: m\n---\n\n"),
            Err(ScriptError::EmptyPrompt { .. })
        ));
    }

    #[test]
    fn test_parse_invalid_frontmatter() {
        let result = parse_str("---\n: [ not yaml\n---\nprompt");
        assert!(matches!(result, Err(ScriptError::Frontmatter(_))));
    }

    #[test]
    fn test_parse_unclosed_frontmatter_stays_in_prompt() {
        let parsed = parse_str("---\nmodel: m\nno closing delimiter").expect("parse");
        assert!(parsed.prompt.contains("model: m"));
        assert!(parsed.config.is_none());
    }

    #[test]
    fn test_parse_multiline_prompt() {
        let parsed = parse_str("Line one\nLine two\n\nLine three\n").expect("parse");
        assert_eq!(parsed.prompt, "Line one\nLine two\n\nLine three");
    }

    #[test]
    fn test_fingerprint_consistency() {
        let a = parse_str("same content").expect("parse");
        let b = parse_str("same content").expect("parse");
        assert_eq!(a.fingerprint, b.fingerprint);

        let c = parse_str("different content").expect("parse");
        assert_ne!(a.fingerprint, c.fingerprint);
    }

    #[test]
    fn test_url_detection() {
        assert!(is_url("https://example.com/x.md"));
        assert!(is_url("http://example.com/x.md"));
        assert!(!is_url("examples/x.md"));
        assert!(!is_url("/abs/x.md"));
    }

    #[test]
    fn test_resolve_ref_prefers_unique_answers() {
        let tmp = TempDir::new().expect("tempdir");
        let home = Home::at(tmp.path());
        std::fs::create_dir_all(home.bin_dir()).expect("mkdir");

        // URL passes through.
        assert_eq!(
            resolve_ref(&home, "https://example.com/w.md").expect("resolve"),
            "https://example.com/w.md"
        );

        // Unknown bare name passes through (read error surfaces later).
        assert_eq!(resolve_ref(&home, "nosuch").expect("resolve"), "nosuch");

        // Installed-only name resolves into bin.
        std::fs::write(home.bin_dir().join("fetch"), "#!/usr/bin/env think\nhi").expect("write");
        let resolved = resolve_ref(&home, "fetch").expect("resolve");
        assert!(resolved.ends_with("bin/fetch"));
    }

    #[test]
    fn test_resolve_ref_ambiguous_name_is_error() {
        let tmp = TempDir::new().expect("tempdir");
        let home = Home::at(tmp.path());
        std::fs::create_dir_all(home.bin_dir()).expect("mkdir");
        std::fs::write(home.bin_dir().join("fetch"), "installed").expect("write");

        let cwd = TempDir::new().expect("tempdir");
        let local = cwd.path().join("fetch");
        std::fs::write(&local, "local").expect("write");

        let prev = std::env::current_dir().expect("cwd");
        std::env::set_current_dir(cwd.path()).expect("chdir");
        let result = resolve_ref(&home, "fetch");
        std::env::set_current_dir(prev).expect("chdir back");

        let err = result.expect_err("ambiguous");
        let msg = err.to_string();
        assert!(msg.contains("./fetch"), "message should offer the local file: {msg}");
        assert!(msg.contains("bin/fetch"), "message should offer the installed copy: {msg}");
    }
}
