//! Policy persistence.
//!
//! Policies are stored as two-space-indented JSON with 0600 permissions.
//! Writes are atomic: serialize to a sibling temp file, then rename over
//! the target so a crash can never leave a half-written policy.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::Policy;

#[derive(Debug, thiserror::Error)]
pub enum PolicyStoreError {
    #[error("reading policy {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("parsing policy {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("writing policy {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Load a policy file. A missing file is not an error; it yields the
/// default policy.
pub fn load_policy(path: &Path) -> Result<Policy, PolicyStoreError> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Policy::default()),
        Err(source) => {
            return Err(PolicyStoreError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    serde_json::from_slice(&data).map_err(|source| PolicyStoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a policy file atomically with 0600 permissions, creating the
/// parent directory if needed.
pub fn save_policy(path: &Path, policy: &Policy) -> Result<(), PolicyStoreError> {
    let write_err = |source: io::Error| PolicyStoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(parent, fs::Permissions::from_mode(0o700));
        }
    }

    let data = serde_json::to_vec_pretty(policy).expect("policy serializes");

    let tmp = path.with_extension("json.tmp");
    crate::config::write_private_file(&tmp, &data).map_err(write_err)?;
    fs::rename(&tmp, path).map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Approval, Source};
    use tempfile::TempDir;

    #[test]
    fn test_save_load_round_trip() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("policy.json");

        let mut policy = Policy::default();
        policy.add_path_entry("/home/user/projects", "rwd", Approval::Allow, Source::Prompt);
        policy.add_env_entry("HOME", Approval::Allow, Source::Config);
        policy.add_host_entry("*.github.com", Approval::Allow, Source::Cli);

        save_policy(&path, &policy).expect("save");
        let loaded = load_policy(&path).expect("load");

        assert_eq!(loaded.paths.entries.len(), 1);
        assert_eq!(loaded.paths.entries[0].path, "/home/user/projects");
        assert_eq!(loaded.paths.entries[0].mode, "rwd");
        assert_eq!(loaded.env.entries.len(), 1);
        assert_eq!(loaded.env.entries[0].name, "HOME");
        assert_eq!(loaded.net.hosts.entries.len(), 1);
        assert_eq!(loaded.net.hosts.entries[0].host, "*.github.com");
    }

    #[test]
    fn test_load_missing_file_yields_default() {
        let policy = load_policy(Path::new("/nonexistent/policy.json")).expect("load");
        assert_eq!(policy.version, crate::policy::POLICY_VERSION);
        assert!(policy.paths.entries.is_empty());
    }

    #[test]
    fn test_load_malformed_file_is_error() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("policy.json");
        std::fs::write(&path, "{not json").expect("write");
        assert!(matches!(
            load_policy(&path),
            Err(PolicyStoreError::Parse { .. })
        ));
    }

    #[test]
    fn test_save_creates_parent_dir() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("deep").join("policy.json");
        save_policy(&path, &Policy::default()).expect("save");
        assert!(path.is_file());
    }

    #[test]
    fn test_save_permissions_and_format() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("policy.json");
        save_policy(&path, &Policy::default()).expect("save");

        let text = std::fs::read_to_string(&path).expect("read");
        // Two-space-indented JSON.
        assert!(text.contains("\n  \"paths\""));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let meta = std::fs::metadata(&path).expect("meta");
            assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        }
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("policy.json");
        save_policy(&path, &Policy::default()).expect("save");

        let names: Vec<_> = std::fs::read_dir(tmp.path())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["policy.json"]);
    }
}
