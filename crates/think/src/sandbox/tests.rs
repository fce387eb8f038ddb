use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::{Sandbox, SandboxConfig, SandboxError};
use crate::approval::{ApprovalError, PathOp};

fn sandbox_in(dir: &Path) -> Sandbox {
    Sandbox::new(SandboxConfig {
        allowed_paths: vec![dir.to_path_buf()],
        writable_paths: vec![dir.to_path_buf()],
        work_dir: dir.to_path_buf(),
        ..Default::default()
    })
    .expect("sandbox")
}

fn run_in(dir: &Path, code: &str) -> Result<String, SandboxError> {
    sandbox_in(dir).run(code)
}

#[test]
fn test_basic_execution() {
    let tmp = TempDir::new().expect("tempdir");
    assert_eq!(run_in(tmp.path(), "1 + 2").expect("run"), "3");
}

#[test]
fn test_string_result_is_raw() {
    let tmp = TempDir::new().expect("tempdir");
    assert_eq!(run_in(tmp.path(), "'hello ' + 'world'").expect("run"), "hello world");
}

#[test]
fn test_object_result_is_json() {
    let tmp = TempDir::new().expect("tempdir");
    assert_eq!(
        run_in(tmp.path(), "({greeting: 'hi', n: 2})").expect("run"),
        r#"{"greeting":"hi","n":2}"#
    );
}

#[test]
fn test_undefined_and_null_are_empty() {
    let tmp = TempDir::new().expect("tempdir");
    assert_eq!(run_in(tmp.path(), "undefined").expect("run"), "");
    assert_eq!(run_in(tmp.path(), "null").expect("run"), "");
}

#[test]
fn test_console_log_does_not_affect_result() {
    let tmp = TempDir::new().expect("tempdir");
    let result = run_in(tmp.path(), "console.log('hello', {a: 1}); 42").expect("run");
    assert_eq!(result, "42");
}

#[test]
fn test_agent_resume_no_context() {
    let tmp = TempDir::new().expect("tempdir");
    match run_in(tmp.path(), "agent.resume()") {
        Err(SandboxError::Resume(context)) => assert_eq!(context, ""),
        other => panic!("expected Resume, got {other:?}"),
    }
}

#[test]
fn test_agent_resume_with_context() {
    let tmp = TempDir::new().expect("tempdir");
    match run_in(tmp.path(), "agent.resume('no arguments, need help')") {
        Err(SandboxError::Resume(context)) => assert_eq!(context, "no arguments, need help"),
        other => panic!("expected Resume, got {other:?}"),
    }
}

#[test]
fn test_agent_resume_after_work() {
    let tmp = TempDir::new().expect("tempdir");
    let result = run_in(
        tmp.path(),
        "fs.writeFile('progress.txt', 'halfway'); agent.resume('need more data')",
    );
    match result {
        Err(SandboxError::Resume(context)) => assert_eq!(context, "need more data"),
        other => panic!("expected Resume, got {other:?}"),
    }
    let written = std::fs::read_to_string(tmp.path().join("progress.txt")).expect("read");
    assert_eq!(written, "halfway");
}

#[test]
fn test_javascript_exception_message_only() {
    let tmp = TempDir::new().expect("tempdir");
    match run_in(tmp.path(), "throw new Error('boom')") {
        Err(SandboxError::Js(message)) => {
            assert!(message.contains("boom"), "message: {message}");
            assert!(!message.contains("src/sandbox"), "host detail leaked: {message}");
        }
        other => panic!("expected Js error, got {other:?}"),
    }
}

#[test]
fn test_reference_error() {
    let tmp = TempDir::new().expect("tempdir");
    match run_in(tmp.path(), "definitelyNotDefined()") {
        Err(SandboxError::Js(message)) => {
            assert!(message.contains("not defined"), "message: {message}");
        }
        other => panic!("expected Js error, got {other:?}"),
    }
}

#[test]
fn test_process_exit_zero_is_success() {
    let tmp = TempDir::new().expect("tempdir");
    let result = run_in(tmp.path(), "process.exit(0); 'unreachable'").expect("run");
    assert_eq!(result, "");
}

#[test]
fn test_process_exit_default_code_is_zero() {
    let tmp = TempDir::new().expect("tempdir");
    assert_eq!(run_in(tmp.path(), "process.exit()").expect("run"), "");
}

#[test]
fn test_process_exit_nonzero() {
    let tmp = TempDir::new().expect("tempdir");
    match run_in(tmp.path(), "process.exit(3)") {
        Err(SandboxError::Exit(code)) => assert_eq!(code, 3),
        other => panic!("expected Exit, got {other:?}"),
    }
}

#[test]
fn test_process_exit_is_not_catchable() {
    let tmp = TempDir::new().expect("tempdir");
    // Even if the script swallows the unwind exception, the signal wins.
    match run_in(
        tmp.path(),
        "try { process.exit(7) } catch (e) {} 'survived'",
    ) {
        Err(SandboxError::Exit(code)) => assert_eq!(code, 7),
        other => panic!("expected Exit, got {other:?}"),
    }
}

#[test]
fn test_process_cwd_and_args() {
    let tmp = TempDir::new().expect("tempdir");
    let sandbox = Sandbox::new(SandboxConfig {
        allowed_paths: vec![tmp.path().to_path_buf()],
        writable_paths: vec![],
        work_dir: tmp.path().to_path_buf(),
        args: vec!["abc".into(), "def".into()],
        ..Default::default()
    })
    .expect("sandbox");

    let cwd = sandbox.run("process.cwd()").expect("run");
    assert_eq!(PathBuf::from(cwd), tmp.path().canonicalize().expect("canon"));

    assert_eq!(sandbox.run("process.args.length").expect("run"), "2");
    assert_eq!(
        sandbox.run("process.args[0].toUpperCase()").expect("run"),
        "ABC"
    );
}

#[test]
fn test_fs_write_and_read() {
    let tmp = TempDir::new().expect("tempdir");
    let result = run_in(
        tmp.path(),
        "fs.writeFile('out.txt', 'payload'); fs.readFile('out.txt')",
    )
    .expect("run");
    assert_eq!(result, "payload");
}

#[test]
fn test_fs_read_dir() {
    let tmp = TempDir::new().expect("tempdir");
    std::fs::write(tmp.path().join("a.txt"), "aa").expect("write");
    std::fs::create_dir(tmp.path().join("sub")).expect("mkdir");

    let result = run_in(
        tmp.path(),
        "fs.readDir('.').map(e => e.name + ':' + e.isDir).sort().join(',')",
    )
    .expect("run");
    assert_eq!(result, "a.txt:false,sub:true");
}

#[test]
fn test_fs_stat() {
    let tmp = TempDir::new().expect("tempdir");
    std::fs::write(tmp.path().join("data.bin"), "12345").expect("write");

    let result = run_in(
        tmp.path(),
        "const s = fs.stat('data.bin'); s.name + ' ' + s.size + ' ' + s.isDir + ' ' + (s.modTime > 0)",
    )
    .expect("run");
    assert_eq!(result, "data.bin 5 false true");
}

#[test]
fn test_fs_exists() {
    let tmp = TempDir::new().expect("tempdir");
    std::fs::write(tmp.path().join("yes.txt"), "x").expect("write");

    assert_eq!(run_in(tmp.path(), "fs.exists('yes.txt')").expect("run"), "true");
    assert_eq!(run_in(tmp.path(), "fs.exists('no.txt')").expect("run"), "false");
    // Outside the sandbox with no approval, exists reads as false rather
    // than throwing.
    assert_eq!(
        run_in(tmp.path(), "fs.exists('/etc/passwd')").expect("run"),
        "false"
    );
}

#[test]
fn test_fs_append_file() {
    let tmp = TempDir::new().expect("tempdir");
    let result = run_in(
        tmp.path(),
        "fs.appendFile('log.txt', 'one'); fs.appendFile('log.txt', 'two'); fs.readFile('log.txt')",
    )
    .expect("run");
    assert_eq!(result, "onetwo");
}

#[test]
fn test_fs_delete() {
    let tmp = TempDir::new().expect("tempdir");
    std::fs::write(tmp.path().join("doomed.txt"), "x").expect("write");

    run_in(tmp.path(), "fs.delete('doomed.txt')").expect("run");
    assert!(!tmp.path().join("doomed.txt").exists());
}

#[test]
fn test_fs_delete_refuses_sandbox_root() {
    let tmp = TempDir::new().expect("tempdir");
    match run_in(tmp.path(), "fs.delete('.')") {
        Err(SandboxError::Js(message)) => {
            assert!(message.contains("cannot delete sandbox root"), "message: {message}");
        }
        other => panic!("expected Js error, got {other:?}"),
    }
    assert!(tmp.path().exists());
}

#[test]
fn test_fs_mkdir_recursive() {
    let tmp = TempDir::new().expect("tempdir");
    run_in(tmp.path(), "fs.mkdir('a/b/c')").expect("run");
    assert!(tmp.path().join("a/b/c").is_dir());
}

#[test]
fn test_fs_copy() {
    let tmp = TempDir::new().expect("tempdir");
    std::fs::write(tmp.path().join("src.txt"), "copy me").expect("write");

    run_in(tmp.path(), "fs.copy('src.txt', 'dst.txt')").expect("run");
    assert_eq!(
        std::fs::read_to_string(tmp.path().join("dst.txt")).expect("read"),
        "copy me"
    );
    assert!(tmp.path().join("src.txt").exists());
}

#[test]
fn test_fs_move() {
    let tmp = TempDir::new().expect("tempdir");
    std::fs::write(tmp.path().join("src.txt"), "move me").expect("write");

    run_in(tmp.path(), "fs.move('src.txt', 'dst.txt')").expect("run");
    assert!(!tmp.path().join("src.txt").exists());
    assert_eq!(
        std::fs::read_to_string(tmp.path().join("dst.txt")).expect("read"),
        "move me"
    );
}

#[test]
fn test_fs_glob() {
    let tmp = TempDir::new().expect("tempdir");
    std::fs::write(tmp.path().join("one.txt"), "1").expect("write");
    std::fs::write(tmp.path().join("two.txt"), "2").expect("write");
    std::fs::write(tmp.path().join("other.md"), "3").expect("write");
    std::fs::create_dir(tmp.path().join("nested")).expect("mkdir");
    std::fs::write(tmp.path().join("nested/three.txt"), "4").expect("write");

    assert_eq!(run_in(tmp.path(), "fs.glob('*.txt').length").expect("run"), "2");
    // ** recurses.
    assert_eq!(run_in(tmp.path(), "fs.glob('**/*.txt').length").expect("run"), "3");
}

#[test]
fn test_writable_exact_file_match() {
    let tmp = TempDir::new().expect("tempdir");
    let lib = tmp.path().join("lib");
    std::fs::create_dir(&lib).expect("mkdir");
    let memory_js = tmp.path().join("memory.js");

    let sandbox = Sandbox::new(SandboxConfig {
        allowed_paths: vec![tmp.path().to_path_buf()],
        writable_paths: vec![lib.clone(), memory_js.clone()],
        work_dir: tmp.path().to_path_buf(),
        ..Default::default()
    })
    .expect("sandbox");

    // The exact file is writable even though its directory is not.
    sandbox
        .run("fs.writeFile('memory.js', 'process.exit(0)')")
        .expect("write memory.js");
    assert!(memory_js.exists());

    // A sibling in the same directory is not.
    match sandbox.run("fs.writeFile('policy.json', '{}')") {
        Err(SandboxError::Js(message)) => {
            assert!(message.contains("access denied"), "message: {message}");
        }
        other => panic!("expected denial, got {other:?}"),
    }

    // The writable directory covers descendants.
    sandbox
        .run("fs.writeFile('lib/helper.js', 'x')")
        .expect("write into lib");
}

#[test]
fn test_can_read_outside_writable_paths() {
    let tmp = TempDir::new().expect("tempdir");
    std::fs::write(tmp.path().join("readme.txt"), "read-only zone").expect("write");

    let sandbox = Sandbox::new(SandboxConfig {
        allowed_paths: vec![tmp.path().to_path_buf()],
        writable_paths: vec![],
        work_dir: tmp.path().to_path_buf(),
        ..Default::default()
    })
    .expect("sandbox");

    assert_eq!(
        sandbox.run("fs.readFile('readme.txt')").expect("run"),
        "read-only zone"
    );
    assert!(matches!(
        sandbox.run("fs.writeFile('readme.txt', 'scribble')"),
        Err(SandboxError::Js(_))
    ));
}

#[test]
fn test_path_traversal_blocked() {
    let tmp = TempDir::new().expect("tempdir");
    match run_in(tmp.path(), "fs.readFile('../../../../etc/passwd')") {
        Err(SandboxError::Js(message)) => {
            assert!(message.contains("access denied"), "message: {message}");
        }
        other => panic!("expected denial, got {other:?}"),
    }
}

#[cfg(unix)]
#[test]
fn test_symlink_escape_blocked() {
    let outside = TempDir::new().expect("tempdir");
    let secret = outside.path().join("secret.txt");
    std::fs::write(&secret, "keep out").expect("write");

    let tmp = TempDir::new().expect("tempdir");
    std::os::unix::fs::symlink(&secret, tmp.path().join("innocent.txt")).expect("symlink");

    // Symlinks resolve before the containment check, so the link's target
    // decides, not its location.
    match run_in(tmp.path(), "fs.readFile('innocent.txt')") {
        Err(SandboxError::Js(message)) => {
            assert!(message.contains("access denied"), "message: {message}");
        }
        other => panic!("expected denial, got {other:?}"),
    }
}

#[test]
fn test_approve_path_callback_grants_access() {
    let outside = TempDir::new().expect("tempdir");
    std::fs::write(outside.path().join("shared.txt"), "granted").expect("write");
    let shared = outside.path().join("shared.txt");

    let tmp = TempDir::new().expect("tempdir");
    let seen: Arc<Mutex<Vec<(PathOp, PathBuf)>>> = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);

    let sandbox = Sandbox::new(SandboxConfig {
        allowed_paths: vec![tmp.path().to_path_buf()],
        writable_paths: vec![tmp.path().to_path_buf()],
        work_dir: tmp.path().to_path_buf(),
        approve_path: Some(Arc::new(move |op, path| {
            record.lock().expect("lock").push((op, path.to_path_buf()));
            Ok(true)
        })),
        ..Default::default()
    })
    .expect("sandbox");

    let code = format!("fs.readFile('{}')", shared.display());
    assert_eq!(sandbox.run(&code).expect("run"), "granted");

    let calls = seen.lock().expect("lock");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, PathOp::Read);
    assert!(calls[0].1.ends_with("shared.txt"));
}

#[test]
fn test_approve_path_callback_denies_access() {
    let tmp = TempDir::new().expect("tempdir");
    let sandbox = Sandbox::new(SandboxConfig {
        allowed_paths: vec![tmp.path().to_path_buf()],
        writable_paths: vec![],
        work_dir: tmp.path().to_path_buf(),
        approve_path: Some(Arc::new(|_, _| Ok(false))),
        ..Default::default()
    })
    .expect("sandbox");

    assert!(matches!(
        sandbox.run("fs.readFile('/etc/hostname')"),
        Err(SandboxError::Js(_))
    ));
}

#[test]
fn test_interrupted_approval_is_typed() {
    let tmp = TempDir::new().expect("tempdir");
    let sandbox = Sandbox::new(SandboxConfig {
        allowed_paths: vec![tmp.path().to_path_buf()],
        writable_paths: vec![],
        work_dir: tmp.path().to_path_buf(),
        approve_path: Some(Arc::new(|_, _| Err(ApprovalError::Interrupted))),
        ..Default::default()
    })
    .expect("sandbox");

    // The interrupt is typed, and a try/catch in the script can't mask it.
    match sandbox.run("try { fs.readFile('/etc/hostname') } catch (e) {} 'done'") {
        Err(SandboxError::Interrupted) => {}
        other => panic!("expected Interrupted, got {other:?}"),
    }
}

#[test]
fn test_env_approval_required() {
    let tmp = TempDir::new().expect("tempdir");
    let sandbox = Sandbox::new(SandboxConfig {
        allowed_paths: vec![tmp.path().to_path_buf()],
        writable_paths: vec![],
        work_dir: tmp.path().to_path_buf(),
        approve_env: Some(Arc::new(|_| Ok(false))),
        ..Default::default()
    })
    .expect("sandbox");

    match sandbox.run("env.get('SECRET_TOKEN')") {
        Err(SandboxError::Js(message)) => {
            assert!(message.contains("access denied for SECRET_TOKEN"), "message: {message}");
        }
        other => panic!("expected denial, got {other:?}"),
    }
}

#[test]
fn test_env_approved_reads_value() {
    let tmp = TempDir::new().expect("tempdir");
    unsafe { std::env::set_var("THINK_SANDBOX_TEST_VAR", "value-42") };

    let sandbox = Sandbox::new(SandboxConfig {
        allowed_paths: vec![tmp.path().to_path_buf()],
        writable_paths: vec![],
        work_dir: tmp.path().to_path_buf(),
        approve_env: Some(Arc::new(|_| Ok(true))),
        ..Default::default()
    })
    .expect("sandbox");

    assert_eq!(
        sandbox.run("env.get('THINK_SANDBOX_TEST_VAR')").expect("run"),
        "value-42"
    );
}

#[test]
fn test_net_requires_approval_handler() {
    let tmp = TempDir::new().expect("tempdir");
    // `.invalid` never resolves, so this exercises the approval gate.
    match run_in(tmp.path(), "net.fetch('http://nonexistent.invalid/data')") {
        Err(SandboxError::Js(message)) => {
            assert!(
                message.contains("network access denied (no approval handler)"),
                "message: {message}"
            );
        }
        other => panic!("expected denial, got {other:?}"),
    }
}

#[test]
fn test_ssrf_blocks_private_ips_before_approval() {
    let tmp = TempDir::new().expect("tempdir");
    let approvals = Arc::new(Mutex::new(0usize));

    for (url, expect) in [
        ("http://127.0.0.1/x", "access to private IP 127.0.0.1 denied"),
        ("http://10.1.2.3/x", "access to private IP 10.1.2.3 denied"),
        ("http://192.168.0.1/x", "access to private IP 192.168.0.1 denied"),
        (
            "http://169.254.169.254/latest/meta-data",
            "access to private IP 169.254.169.254 denied",
        ),
    ] {
        let count = Arc::clone(&approvals);
        let sandbox = Sandbox::new(SandboxConfig {
            allowed_paths: vec![tmp.path().to_path_buf()],
            writable_paths: vec![],
            work_dir: tmp.path().to_path_buf(),
            approve_net: Some(Arc::new(move |_| {
                *count.lock().expect("lock") += 1;
                Ok(true)
            })),
            ..Default::default()
        })
        .expect("sandbox");

        match sandbox.run(&format!("net.fetch('{url}')")) {
            Err(SandboxError::Js(message)) => {
                assert!(message.contains(expect), "url {url}: message {message}");
            }
            other => panic!("expected SSRF denial for {url}, got {other:?}"),
        }
    }

    assert_eq!(
        *approvals.lock().expect("lock"),
        0,
        "approval callback must not be consulted for private IPs"
    );
}

#[test]
fn test_require_local_module() {
    let tmp = TempDir::new().expect("tempdir");
    std::fs::write(
        tmp.path().join("mathlib.js"),
        "module.exports = { add: function (a, b) { return a + b; } };",
    )
    .expect("write");

    let result = run_in(
        tmp.path(),
        "const lib = require('mathlib.js'); lib.add(2, 3)",
    )
    .expect("run");
    assert_eq!(result, "5");
}

#[test]
fn test_require_caches_modules() {
    let tmp = TempDir::new().expect("tempdir");
    std::fs::write(
        tmp.path().join("counter.js"),
        "module.exports = { loads: (globalThis.__loads = (globalThis.__loads || 0) + 1) };",
    )
    .expect("write");

    let result = run_in(
        tmp.path(),
        "require('counter.js'); require('counter.js').loads",
    )
    .expect("run");
    assert_eq!(result, "1");
}

#[test]
fn test_require_missing_module() {
    let tmp = TempDir::new().expect("tempdir");
    match run_in(tmp.path(), "require('/nope/missing.js')") {
        Err(SandboxError::Js(message)) => {
            assert!(message.contains("does not exist"), "message: {message}");
        }
        other => panic!("expected Js error, got {other:?}"),
    }
}

#[test]
fn test_on_write_callback() {
    let tmp = TempDir::new().expect("tempdir");
    let writes: Arc<Mutex<Vec<(PathBuf, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&writes);

    let sandbox = Sandbox::new(SandboxConfig {
        allowed_paths: vec![tmp.path().to_path_buf()],
        writable_paths: vec![tmp.path().to_path_buf()],
        work_dir: tmp.path().to_path_buf(),
        on_write: Some(Arc::new(move |path, content| {
            record
                .lock()
                .expect("lock")
                .push((path.to_path_buf(), content.to_string()));
        })),
        ..Default::default()
    })
    .expect("sandbox");

    sandbox
        .run("fs.writeFile('note.txt', 'remember this')")
        .expect("run");

    let seen = writes.lock().expect("lock");
    assert_eq!(seen.len(), 1);
    assert!(seen[0].0.ends_with("note.txt"));
    assert_eq!(seen[0].1, "remember this");
}

#[test]
fn test_timeout_interrupts_busy_loop() {
    let tmp = TempDir::new().expect("tempdir");
    let sandbox = Sandbox::new(SandboxConfig {
        allowed_paths: vec![tmp.path().to_path_buf()],
        writable_paths: vec![],
        work_dir: tmp.path().to_path_buf(),
        timeout: Some(Duration::from_millis(100)),
        ..Default::default()
    })
    .expect("sandbox");

    match sandbox.run("while (true) {}") {
        Err(SandboxError::TimedOut) => {}
        other => panic!("expected TimedOut, got {other:?}"),
    }
}

#[test]
fn test_cancellation_interrupts_busy_loop() {
    let tmp = TempDir::new().expect("tempdir");
    let cancel = CancellationToken::new();
    let sandbox = Sandbox::new(SandboxConfig {
        allowed_paths: vec![tmp.path().to_path_buf()],
        writable_paths: vec![],
        work_dir: tmp.path().to_path_buf(),
        cancel: cancel.clone(),
        ..Default::default()
    })
    .expect("sandbox");

    cancel.cancel();
    match sandbox.run("while (true) {}") {
        Err(SandboxError::Cancelled) => {}
        other => panic!("expected Cancelled, got {other:?}"),
    }
}

#[test]
fn test_sleep_respects_cancellation() {
    let tmp = TempDir::new().expect("tempdir");
    let cancel = CancellationToken::new();
    let sandbox = Sandbox::new(SandboxConfig {
        allowed_paths: vec![tmp.path().to_path_buf()],
        writable_paths: vec![],
        work_dir: tmp.path().to_path_buf(),
        cancel: cancel.clone(),
        ..Default::default()
    })
    .expect("sandbox");

    cancel.cancel();
    let start = std::time::Instant::now();
    let result = sandbox.run("process.sleep(60000)");
    assert!(start.elapsed() < Duration::from_secs(5), "sleep did not abort");
    assert!(matches!(result, Err(SandboxError::Cancelled)));
}

#[test]
fn test_sys_platform_and_arch() {
    let tmp = TempDir::new().expect("tempdir");
    assert_eq!(
        run_in(tmp.path(), "sys.platform()").expect("run"),
        std::env::consts::OS
    );
    assert_eq!(
        run_in(tmp.path(), "sys.arch()").expect("run"),
        std::env::consts::ARCH
    );
}

#[test]
fn test_sys_cpus_positive() {
    let tmp = TempDir::new().expect("tempdir");
    let cpus: f64 = run_in(tmp.path(), "sys.cpus()")
        .expect("run")
        .parse()
        .expect("number");
    assert!(cpus >= 1.0);
}

#[cfg(target_os = "linux")]
#[test]
fn test_sys_memory_and_load() {
    let tmp = TempDir::new().expect("tempdir");
    let total: f64 = run_in(tmp.path(), "sys.totalmem()")
        .expect("run")
        .parse()
        .expect("number");
    assert!(total > 0.0);

    assert_eq!(run_in(tmp.path(), "sys.loadavg().length").expect("run"), "3");
}

#[test]
fn test_sys_terminal_shape() {
    let tmp = TempDir::new().expect("tempdir");
    let result = run_in(
        tmp.path(),
        "const t = sys.terminal(); \
         (typeof t.columns) + ' ' + (typeof t.rows) + ' ' + (typeof t.isTTY) + ' ' + (typeof t.color)",
    )
    .expect("run");
    assert_eq!(result, "number number boolean boolean");
}

#[test]
fn test_host_object_is_removed() {
    let tmp = TempDir::new().expect("tempdir");
    assert_eq!(
        run_in(tmp.path(), "typeof globalThis.__host").expect("run"),
        "undefined"
    );
}

#[test]
fn test_write_size_limit() {
    let tmp = TempDir::new().expect("tempdir");
    // An 11 MiB string trips the 10 MiB write cap.
    match run_in(
        tmp.path(),
        "fs.writeFile('big.txt', 'x'.repeat(11 * 1024 * 1024))",
    ) {
        Err(SandboxError::Js(message)) => {
            assert!(message.contains("exceeds"), "message: {message}");
        }
        other => panic!("expected Js error, got {other:?}"),
    }
    assert!(!tmp.path().join("big.txt").exists());
}

#[test]
fn test_script_can_catch_bridge_errors() {
    let tmp = TempDir::new().expect("tempdir");
    // Denials are ordinary JS errors; scripts may handle them and try
    // alternatives.
    let result = run_in(
        tmp.path(),
        "let out; try { fs.readFile('/etc/passwd') } catch (e) { out = 'fallback' } out",
    )
    .expect("run");
    assert_eq!(result, "fallback");
}
