//! The `thought` binary: management surface for installed thoughts.
//!
//! Where `think` runs scripts, `thought` maintains the state around them:
//! installing scripts into `<home>/bin`, inspecting and resetting a
//! thought's compiled artifact and memories, editing policies, and pruning
//! the content-addressed cache. Status text goes to stderr; stdout carries
//! only data (listings, script bodies, policy JSON) so output stays
//! pipeable.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};

use think::config::{self, Home};
use think::policy::{self, Approval, Source};
use think::script;

#[derive(Debug, Parser)]
#[command(
    name = "thought",
    about = "Manage installed thoughts and their state",
    subcommand_required = true,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List installed thoughts.
    #[command(alias = "list")]
    Ls,
    /// Print an installed thought's prompt body.
    Cat { name: String },
    /// Install a script into the bin directory, shebang included.
    Install { script: String },
    /// Remove an installed thought.
    #[command(alias = "remove")]
    Rm {
        name: String,
        /// Also remove thought data (workspace, memories, policy).
        #[arg(short, long)]
        force: bool,
    },
    /// Reset a thought's compiled state (memory.js and workspace).
    Reset {
        name: String,
        /// Also clear memories/.
        #[arg(long)]
        memories: bool,
        /// Also reset policy.json to defaults.
        #[arg(long)]
        policy: bool,
        /// Reset everything: memory.js, workspace, memories, policy.
        #[arg(short, long)]
        all: bool,
    },
    /// Print a thought's workspace directory path.
    Workspace { name: String },
    /// Inspect thought memories.
    #[command(alias = "mem")]
    Memory {
        #[command(subcommand)]
        command: MemoryCommand,
    },
    /// View and edit policy entries.
    Policy {
        #[command(subcommand)]
        command: PolicyCommand,
    },
    /// Inspect or clear per-script cache directories.
    Cache {
        /// Script path or installed name; omit with --clear-all.
        script: Option<String>,
        /// Clear the cache for the given script.
        #[arg(long)]
        clear: bool,
        /// Clear every script cache.
        #[arg(long)]
        clear_all: bool,
    },
}

#[derive(Debug, Subcommand)]
enum MemoryCommand {
    /// List memory files for a thought, or for all thoughts with no name.
    #[command(alias = "list")]
    Ls { name: Option<String> },
}

#[derive(Debug, Subcommand)]
enum PolicyCommand {
    /// Print a thought's policy, or the global policy with no name.
    #[command(alias = "list")]
    Ls { name: Option<String> },
    /// Add an entry: kind is path, env, or host.
    Add {
        kind: String,
        name: String,
        value: String,
        /// Permission mode for paths (r=read, w=write, d=delete).
        #[arg(long, default_value = "rwd")]
        mode: String,
        /// Approval decision: allow, deny, or prompt.
        #[arg(long, default_value = "allow")]
        approval: String,
    },
    /// Remove an entry: kind is path, env, or host.
    #[command(alias = "remove")]
    Rm {
        kind: String,
        name: String,
        value: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let home = Home::resolve();

    let result = match cli.command {
        Command::Ls => run_ls(&home),
        Command::Cat { name } => run_cat(&home, &name).await,
        Command::Install { script } => run_install(&home, &script),
        Command::Rm { name, force } => run_rm(&home, &name, force),
        Command::Reset {
            name,
            memories,
            policy,
            all,
        } => run_reset(&home, &name, memories || all, policy || all),
        Command::Workspace { name } => run_workspace(&home, &name),
        Command::Memory { command } => run_memory(&home, command),
        Command::Policy { command } => run_policy(&home, command),
        Command::Cache {
            script,
            clear,
            clear_all,
        } => run_cache(&home, script.as_deref(), clear, clear_all).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("thought: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run_ls(home: &Home) -> anyhow::Result<()> {
    let entries = match std::fs::read_dir(home.bin_dir()) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            eprintln!("No thoughts installed.");
            return Ok(());
        }
        Err(e) => return Err(e).context("reading bin directory"),
    };

    let mut names: Vec<String> = entries
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    if names.is_empty() {
        eprintln!("No thoughts installed.");
        return Ok(());
    }
    names.sort();

    for name in names {
        let has_data = home.thoughts_dir().join(&name).is_dir();
        if has_data {
            println!("{name}");
        } else {
            println!("{name} (no data)");
        }
    }
    Ok(())
}

async fn run_cat(home: &Home, name: &str) -> anyhow::Result<()> {
    let path = installed_path(home, name)?;
    let parsed = script::parse(&path.display().to_string()).await?;
    print!("{}", parsed.prompt);
    Ok(())
}

fn run_install(home: &Home, input: &str) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(input).context("reading input file")?;

    const SHEBANG: &str = "#!/usr/bin/env think\n";
    let body = if content.starts_with(SHEBANG) {
        content
    } else {
        format!("{SHEBANG}{content}")
    };

    let bin_dir = home.bin_dir();
    std::fs::create_dir_all(&bin_dir).context("creating bin directory")?;

    let name = config::thought_name(input);
    let out_path = bin_dir.join(&name);
    std::fs::write(&out_path, body).context("writing script")?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(0o755))
            .context("marking executable")?;
    }

    eprintln!("Installed {input} -> {}", out_path.display());
    eprintln!("Make sure this is in your PATH:");
    eprintln!("  export PATH=\"$PATH:{}\"", bin_dir.display());
    Ok(())
}

fn run_rm(home: &Home, name: &str, force: bool) -> anyhow::Result<()> {
    let bin_path = home.bin_dir().join(name);
    let thought_dir = home.thoughts_dir().join(name);

    let bin_exists = bin_path.is_file();
    let data_exists = thought_dir.is_dir();
    if !bin_exists && !data_exists {
        bail!("thought '{name}' not found");
    }

    if bin_exists {
        std::fs::remove_file(&bin_path).context("removing binary")?;
        eprintln!("Removed {}", bin_path.display());
    }

    if data_exists {
        if force {
            std::fs::remove_dir_all(&thought_dir).context("removing thought data")?;
            eprintln!("Removed {}", thought_dir.display());
        } else if bin_exists {
            eprintln!(
                "Note: thought data remains at {} (use --force to remove)",
                thought_dir.display()
            );
        }
    }
    Ok(())
}

fn run_reset(home: &Home, name: &str, memories: bool, policy: bool) -> anyhow::Result<()> {
    let thought_dir = home.thoughts_dir().join(name);
    if !thought_dir.is_dir() {
        bail!("no thought data found for '{name}'");
    }

    let mut cleared = Vec::new();

    let memory_js = thought_dir.join("memory.js");
    if memory_js.exists() {
        std::fs::remove_file(&memory_js).context("removing memory.js")?;
        cleared.push("memory.js");
    }

    let workspace = thought_dir.join("workspace");
    if workspace.is_dir() {
        std::fs::remove_dir_all(&workspace).context("removing workspace/")?;
        cleared.push("workspace/");
    }

    if memories {
        let memories_dir = thought_dir.join("memories");
        if memories_dir.is_dir() {
            std::fs::remove_dir_all(&memories_dir).context("removing memories/")?;
            cleared.push("memories/");
        }
    }

    if policy {
        let policy_json = thought_dir.join("policy.json");
        if policy_json.exists() {
            std::fs::remove_file(&policy_json).context("removing policy.json")?;
            cleared.push("policy.json");
        }
    }

    if cleared.is_empty() {
        eprintln!("Nothing to reset for '{name}'");
    } else {
        eprintln!("Reset '{name}': {}", cleared.join(", "));
    }
    Ok(())
}

fn run_workspace(home: &Home, name: &str) -> anyhow::Result<()> {
    let workspace = home.thoughts_dir().join(name).join("workspace");
    println!("{}", workspace.display());
    Ok(())
}

fn run_memory(home: &Home, command: MemoryCommand) -> anyhow::Result<()> {
    let MemoryCommand::Ls { name } = command;
    match name {
        Some(name) => {
            let listed =
                list_memory_files(&home.thoughts_dir().join(name).join("memories"))?;
            if !listed {
                eprintln!("No memories yet.");
            }
        }
        None => {
            let mut found = false;
            if let Ok(entries) = std::fs::read_dir(home.thoughts_dir()) {
                let mut thoughts: Vec<PathBuf> = entries
                    .flatten()
                    .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
                    .map(|e| e.path())
                    .collect();
                thoughts.sort();
                for thought in thoughts {
                    found |= list_memory_files(&thought.join("memories"))?;
                }
            }
            if !found {
                eprintln!("No memories yet.");
            }
        }
    }
    Ok(())
}

/// Print a memories directory's files, one path per line. Returns whether
/// anything was listed.
fn list_memory_files(memories_dir: &Path) -> anyhow::Result<bool> {
    let entries = match std::fs::read_dir(memories_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e).context("reading memories"),
    };

    let mut names: Vec<_> = entries
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.file_name())
        .collect();
    names.sort();

    for name in &names {
        println!("{}", memories_dir.join(name).display());
    }
    Ok(!names.is_empty())
}

fn run_policy(home: &Home, command: PolicyCommand) -> anyhow::Result<()> {
    match command {
        PolicyCommand::Ls { name } => {
            let path = match name {
                Some(name) => home.thoughts_dir().join(name).join("policy.json"),
                None => home.global_policy_path(),
            };
            let policy = policy::load_policy(&path)?;
            println!("{}", serde_json::to_string_pretty(&policy)?);
            Ok(())
        }
        PolicyCommand::Add {
            kind,
            name,
            value,
            mode,
            approval,
        } => {
            let approval = parse_approval(&approval)?;
            let path = home.thoughts_dir().join(&name).join("policy.json");
            let mut policy = policy::load_policy(&path)?;

            match kind.as_str() {
                "path" => {
                    policy.add_path_entry(&value, &mode, approval, Source::Cli);
                    eprintln!("Added path entry: {value} (mode={mode})");
                }
                "env" => {
                    policy.add_env_entry(&value, approval, Source::Cli);
                    eprintln!("Added env entry: {value}");
                }
                "host" => {
                    policy.add_host_entry(&value, approval, Source::Cli);
                    eprintln!("Added host entry: {value}");
                }
                other => bail!("invalid type: {other} (must be path, env, or host)"),
            }

            policy::save_policy(&path, &policy)?;
            Ok(())
        }
        PolicyCommand::Rm { kind, name, value } => {
            let path = home.thoughts_dir().join(&name).join("policy.json");
            let mut policy = policy::load_policy(&path)?;

            let removed = match kind.as_str() {
                "path" => {
                    let before = policy.paths.entries.len();
                    policy.paths.entries.retain(|e| e.path != value);
                    policy.paths.entries.len() < before
                }
                "env" => {
                    let before = policy.env.entries.len();
                    policy.env.entries.retain(|e| e.name != value);
                    policy.env.entries.len() < before
                }
                "host" => {
                    let before = policy.net.hosts.entries.len();
                    policy.net.hosts.entries.retain(|e| e.host != value);
                    policy.net.hosts.entries.len() < before
                }
                other => bail!("invalid type: {other} (must be path, env, or host)"),
            };

            if !removed {
                bail!("entry not found: {kind} {value}");
            }
            policy::save_policy(&path, &policy)?;
            eprintln!("Removed {kind} entry: {value}");
            Ok(())
        }
    }
}

async fn run_cache(
    home: &Home,
    script_ref: Option<&str>,
    clear: bool,
    clear_all: bool,
) -> anyhow::Result<()> {
    if clear_all {
        let root = home.cache_root();
        let mut count = 0usize;
        if let Ok(entries) = std::fs::read_dir(&root) {
            for entry in entries.flatten() {
                if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    std::fs::remove_dir_all(entry.path()).context("clearing cache entry")?;
                    count += 1;
                }
            }
        }
        eprintln!("Cleared {count} cache entries");
        return Ok(());
    }

    let Some(script_ref) = script_ref else {
        bail!("a script is required unless --clear-all is given");
    };

    // The cache key is content-addressed, so the script must be readable to
    // locate its entry.
    let resolved = script::resolve_ref(home, script_ref)?;
    let parsed = script::parse(&resolved).await?;
    let cache_dir = home.cache_dir(&parsed.fingerprint);

    if clear {
        if cache_dir.is_dir() {
            std::fs::remove_dir_all(&cache_dir).context("clearing cache")?;
            eprintln!("Cleared {}", cache_dir.display());
        } else {
            eprintln!("No cache for {script_ref}");
        }
        return Ok(());
    }

    let status = if config::check_fingerprint(&cache_dir, &parsed.fingerprint) {
        "valid"
    } else if cache_dir.is_dir() {
        "stale"
    } else {
        "absent"
    };
    println!("{} ({status})", cache_dir.display());
    Ok(())
}

fn parse_approval(value: &str) -> anyhow::Result<Approval> {
    match value {
        "allow" => Ok(Approval::Allow),
        "deny" => Ok(Approval::Deny),
        "prompt" => Ok(Approval::Prompt),
        other => bail!("invalid approval value: {other} (must be allow, deny, or prompt)"),
    }
}

fn installed_path(home: &Home, name: &str) -> anyhow::Result<PathBuf> {
    let path = home.bin_dir().join(name);
    if !path.is_file() {
        if Path::new(name).is_file() {
            bail!("'{name}' is a file; use `cat {name}` directly");
        }
        bail!("thought '{name}' not found in {}", home.bin_dir().display());
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn home_in(tmp: &TempDir) -> Home {
        let home = Home::at(tmp.path().join("home"));
        home.ensure().expect("ensure");
        home
    }

    #[test]
    fn test_install_adds_shebang_and_mode() {
        let tmp = TempDir::new().expect("tempdir");
        let home = home_in(&tmp);

        let script = tmp.path().join("weather.md");
        std::fs::write(&script, "Report the weather").expect("write");

        run_install(&home, &script.display().to_string()).expect("install");

        let installed = home.bin_dir().join("weather");
        let body = std::fs::read_to_string(&installed).expect("read");
        assert!(body.starts_with("#!/usr/bin/env think\n"));
        assert!(body.contains("Report the weather"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&installed)
                .expect("meta")
                .permissions()
                .mode();
            assert_eq!(mode & 0o111, 0o111, "should be executable");
        }
    }

    #[test]
    fn test_install_does_not_double_shebang() {
        let tmp = TempDir::new().expect("tempdir");
        let home = home_in(&tmp);

        let script = tmp.path().join("hello.thought");
        std::fs::write(&script, "#!/usr/bin/env think\nSay hello").expect("write");

        run_install(&home, &script.display().to_string()).expect("install");

        let body =
            std::fs::read_to_string(home.bin_dir().join("hello")).expect("read");
        assert_eq!(body.matches("#!/usr/bin/env think").count(), 1);
    }

    #[test]
    fn test_rm_requires_existing_thought() {
        let tmp = TempDir::new().expect("tempdir");
        let home = home_in(&tmp);
        assert!(run_rm(&home, "ghost", false).is_err());
    }

    #[test]
    fn test_rm_keeps_data_without_force() {
        let tmp = TempDir::new().expect("tempdir");
        let home = home_in(&tmp);

        std::fs::write(home.bin_dir().join("keeper"), "body").expect("write");
        let data = home.thoughts_dir().join("keeper");
        std::fs::create_dir_all(&data).expect("mkdir");

        run_rm(&home, "keeper", false).expect("rm");
        assert!(!home.bin_dir().join("keeper").exists());
        assert!(data.is_dir(), "data must survive without --force");

        run_rm(&home, "keeper", true).expect("rm force");
        assert!(!data.exists());
    }

    #[test]
    fn test_reset_clears_compiled_state_only() {
        let tmp = TempDir::new().expect("tempdir");
        let home = home_in(&tmp);

        let thought = home.thoughts_dir().join("weather");
        std::fs::create_dir_all(thought.join("workspace")).expect("mkdir");
        std::fs::create_dir_all(thought.join("memories")).expect("mkdir");
        std::fs::write(thought.join("memory.js"), "1").expect("write");
        std::fs::write(thought.join("memories/tip.md"), "remember").expect("write");

        run_reset(&home, "weather", false, false).expect("reset");
        assert!(!thought.join("memory.js").exists());
        assert!(!thought.join("workspace").exists());
        assert!(thought.join("memories/tip.md").exists(), "memories survive a plain reset");

        run_reset(&home, "weather", true, false).expect("reset memories");
        assert!(!thought.join("memories").exists());
    }

    #[test]
    fn test_memory_ls_lists_files_sorted() {
        let tmp = TempDir::new().expect("tempdir");
        let home = home_in(&tmp);

        let memories = home.thoughts_dir().join("weather/memories");
        std::fs::create_dir_all(&memories).expect("mkdir");
        std::fs::write(memories.join("b-endpoint.md"), "two").expect("write");
        std::fs::write(memories.join("a-units.md"), "one").expect("write");
        // Subdirectories are not memories.
        std::fs::create_dir_all(memories.join("nested")).expect("mkdir");

        assert!(list_memory_files(&memories).expect("list"));

        run_memory(
            &home,
            MemoryCommand::Ls {
                name: Some("weather".into()),
            },
        )
        .expect("memory ls");
    }

    #[test]
    fn test_memory_ls_handles_absent_memories() {
        let tmp = TempDir::new().expect("tempdir");
        let home = home_in(&tmp);

        assert!(!list_memory_files(&home.thoughts_dir().join("ghost/memories")).expect("list"));

        // Neither a missing thought nor an empty home is an error.
        run_memory(
            &home,
            MemoryCommand::Ls {
                name: Some("ghost".into()),
            },
        )
        .expect("memory ls named");
        run_memory(&home, MemoryCommand::Ls { name: None }).expect("memory ls all");
    }

    #[test]
    fn test_policy_add_and_rm_round_trip() {
        let tmp = TempDir::new().expect("tempdir");
        let home = home_in(&tmp);
        std::fs::create_dir_all(home.thoughts_dir().join("weather")).expect("mkdir");

        run_policy(
            &home,
            PolicyCommand::Add {
                kind: "host".into(),
                name: "weather".into(),
                value: "*.weather.gov".into(),
                mode: "rwd".into(),
                approval: "allow".into(),
            },
        )
        .expect("add");

        let path = home.thoughts_dir().join("weather/policy.json");
        let saved = policy::load_policy(&path).expect("load");
        assert_eq!(saved.net.hosts.entries.len(), 1);
        assert_eq!(saved.net.hosts.entries[0].source, Some(Source::Cli));

        run_policy(
            &home,
            PolicyCommand::Rm {
                kind: "host".into(),
                name: "weather".into(),
                value: "*.weather.gov".into(),
            },
        )
        .expect("rm");
        let saved = policy::load_policy(&path).expect("load");
        assert!(saved.net.hosts.entries.is_empty());

        // Removing again is an error.
        assert!(
            run_policy(
                &home,
                PolicyCommand::Rm {
                    kind: "host".into(),
                    name: "weather".into(),
                    value: "*.weather.gov".into(),
                },
            )
            .is_err()
        );
    }

    #[test]
    fn test_policy_rejects_bad_values() {
        let tmp = TempDir::new().expect("tempdir");
        let home = home_in(&tmp);

        assert!(parse_approval("maybe").is_err());
        assert!(
            run_policy(
                &home,
                PolicyCommand::Add {
                    kind: "socket".into(),
                    name: "x".into(),
                    value: "y".into(),
                    mode: "rwd".into(),
                    approval: "allow".into(),
                },
            )
            .is_err()
        );
    }

    #[tokio::test]
    async fn test_cache_status_and_clear() {
        let tmp = TempDir::new().expect("tempdir");
        let home = home_in(&tmp);

        let script = tmp.path().join("job.thought");
        std::fs::write(&script, "Do the job").expect("write");
        let script_ref = script.display().to_string();

        // Absent, then valid once a fingerprint is written.
        run_cache(&home, Some(&script_ref), false, false)
            .await
            .expect("status");

        let parsed = script::parse(&script_ref).await.expect("parse");
        let cache_dir = home.cache_dir(&parsed.fingerprint);
        std::fs::create_dir_all(&cache_dir).expect("mkdir");
        config::write_fingerprint(&cache_dir, &parsed.fingerprint).expect("write");

        run_cache(&home, Some(&script_ref), true, false)
            .await
            .expect("clear");
        assert!(!cache_dir.exists());
    }
}
