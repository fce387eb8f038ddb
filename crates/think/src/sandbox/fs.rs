//! The `fs` bridge.
//!
//! Every operation routes its path through [`RunState::resolve`], so the
//! containment and approval rules live in exactly one place. Errors reach
//! the script as JS `Error`s with operation-prefixed messages and no host
//! detail. Structured results cross the boundary as JSON and are parsed by
//! the glue layer.

use std::rc::Rc;
use std::time::UNIX_EPOCH;

use rquickjs::function::Func;
use rquickjs::{Ctx, Exception, Object};

use super::RunState;
use crate::approval::PathOp;
use crate::limits::{MAX_COPY_BYTES, MAX_GLOB_MATCHES, MAX_READ_BYTES, MAX_WRITE_BYTES};

pub(super) const PRELUDE: &str = r#"
(function () {
    const h = globalThis.__host;
    globalThis.fs = {
        readFile: (p) => h.fs_readFile(String(p)),
        writeFile: (p, c) => { h.fs_writeFile(String(p), String(c)); },
        appendFile: (p, c) => { h.fs_appendFile(String(p), String(c)); },
        readDir: (p) => JSON.parse(h.fs_readDir(String(p))),
        stat: (p) => JSON.parse(h.fs_stat(String(p))),
        exists: (p) => h.fs_exists(String(p)),
        delete: (p) => { h.fs_delete(String(p)); },
        mkdir: (p) => { h.fs_mkdir(String(p)); },
        copy: (src, dst) => { h.fs_copy(String(src), String(dst)); },
        move: (src, dst) => { h.fs_move(String(src), String(dst)); },
        glob: (pattern) => JSON.parse(h.fs_glob(String(pattern))),
    };
})();
"#;

pub(super) fn register(
    _ctx: &Ctx<'_>,
    host: &Object<'_>,
    state: &Rc<RunState>,
) -> rquickjs::Result<()> {
    let st = Rc::clone(state);
    host.set(
        "fs_readFile",
        Func::from(move |cx: Ctx<'_>, path: String| -> rquickjs::Result<String> {
            let resolved = st
                .resolve(PathOp::Read, &path)
                .map_err(|m| Exception::throw_message(&cx, &m))?;
            let meta = std::fs::metadata(&resolved).map_err(|_| {
                Exception::throw_message(&cx, &format!("fs.readFile: {path} not found"))
            })?;
            if meta.len() > MAX_READ_BYTES {
                return Err(Exception::throw_message(
                    &cx,
                    &format!("fs.readFile: {path} exceeds {}MB limit", MAX_READ_BYTES >> 20),
                ));
            }
            std::fs::read_to_string(&resolved).map_err(|_| {
                Exception::throw_message(&cx, &format!("fs.readFile: {path} not found"))
            })
        }),
    )?;

    let st = Rc::clone(state);
    host.set(
        "fs_writeFile",
        Func::from(
            move |cx: Ctx<'_>, path: String, content: String| -> rquickjs::Result<()> {
                let resolved = st
                    .resolve(PathOp::Write, &path)
                    .map_err(|m| Exception::throw_message(&cx, &m))?;
                if content.len() as u64 > MAX_WRITE_BYTES {
                    return Err(Exception::throw_message(
                        &cx,
                        &format!(
                            "fs.writeFile: content exceeds {}MB limit",
                            MAX_WRITE_BYTES >> 20
                        ),
                    ));
                }
                std::fs::write(&resolved, &content).map_err(|_| {
                    Exception::throw_message(&cx, &format!("fs.writeFile: cannot write {path}"))
                })?;
                st.notify_write(&resolved, &content);
                Ok(())
            },
        ),
    )?;

    let st = Rc::clone(state);
    host.set(
        "fs_appendFile",
        Func::from(
            move |cx: Ctx<'_>, path: String, content: String| -> rquickjs::Result<()> {
                let resolved = st
                    .resolve(PathOp::Write, &path)
                    .map_err(|m| Exception::throw_message(&cx, &m))?;
                if content.len() as u64 > MAX_WRITE_BYTES {
                    return Err(Exception::throw_message(
                        &cx,
                        &format!(
                            "fs.appendFile: content exceeds {}MB limit",
                            MAX_WRITE_BYTES >> 20
                        ),
                    ));
                }
                use std::io::Write;
                let mut file = std::fs::OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(&resolved)
                    .map_err(|_| {
                        Exception::throw_message(&cx, &format!("fs.appendFile: cannot open {path}"))
                    })?;
                file.write_all(content.as_bytes()).map_err(|_| {
                    Exception::throw_message(&cx, &format!("fs.appendFile: cannot write to {path}"))
                })?;
                Ok(())
            },
        ),
    )?;

    let st = Rc::clone(state);
    host.set(
        "fs_readDir",
        Func::from(move |cx: Ctx<'_>, path: String| -> rquickjs::Result<String> {
            let resolved = st
                .resolve(PathOp::Read, &path)
                .map_err(|m| Exception::throw_message(&cx, &m))?;
            let entries = std::fs::read_dir(&resolved).map_err(|_| {
                Exception::throw_message(&cx, &format!("fs.readDir: cannot read {path}"))
            })?;
            let mut listing = Vec::new();
            for entry in entries.flatten() {
                let Ok(meta) = entry.metadata() else { continue };
                listing.push(serde_json::json!({
                    "name": entry.file_name().to_string_lossy(),
                    "isDir": meta.is_dir(),
                    "size": meta.len(),
                }));
            }
            Ok(serde_json::Value::Array(listing).to_string())
        }),
    )?;

    let st = Rc::clone(state);
    host.set(
        "fs_stat",
        Func::from(move |cx: Ctx<'_>, path: String| -> rquickjs::Result<String> {
            let resolved = st
                .resolve(PathOp::Read, &path)
                .map_err(|m| Exception::throw_message(&cx, &m))?;
            let meta = std::fs::metadata(&resolved).map_err(|_| {
                Exception::throw_message(&cx, &format!("fs.stat: {path} not found"))
            })?;
            let mod_time = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);
            let name = resolved
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(serde_json::json!({
                "name": name,
                "isDir": meta.is_dir(),
                "size": meta.len(),
                "modTime": mod_time,
            })
            .to_string())
        }),
    )?;

    let st = Rc::clone(state);
    host.set(
        "fs_exists",
        Func::from(move |path: String| -> bool {
            // Resolve failures (including denied approval) read as absent.
            match st.resolve(PathOp::Read, &path) {
                Ok(resolved) => resolved.exists(),
                Err(_) => false,
            }
        }),
    )?;

    let st = Rc::clone(state);
    host.set(
        "fs_delete",
        Func::from(move |cx: Ctx<'_>, path: String| -> rquickjs::Result<()> {
            let resolved = st
                .resolve(PathOp::Delete, &path)
                .map_err(|m| Exception::throw_message(&cx, &m))?;
            // The sandbox roots themselves are never deletable.
            if st.allowed_roots().iter().any(|root| resolved == *root) {
                return Err(Exception::throw_message(
                    &cx,
                    &format!("fs.delete: cannot delete sandbox root {path}"),
                ));
            }
            let result = match std::fs::symlink_metadata(&resolved) {
                Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(&resolved),
                Ok(_) => std::fs::remove_file(&resolved),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e),
            };
            result.map_err(|_| {
                Exception::throw_message(&cx, &format!("fs.delete: cannot delete {path}"))
            })
        }),
    )?;

    let st = Rc::clone(state);
    host.set(
        "fs_mkdir",
        Func::from(move |cx: Ctx<'_>, path: String| -> rquickjs::Result<()> {
            let resolved = st
                .resolve(PathOp::Write, &path)
                .map_err(|m| Exception::throw_message(&cx, &m))?;
            std::fs::create_dir_all(&resolved).map_err(|_| {
                Exception::throw_message(&cx, &format!("fs.mkdir: cannot create {path}"))
            })
        }),
    )?;

    let st = Rc::clone(state);
    host.set(
        "fs_copy",
        Func::from(
            move |cx: Ctx<'_>, src: String, dst: String| -> rquickjs::Result<()> {
                let resolved_src = st
                    .resolve(PathOp::Read, &src)
                    .map_err(|m| Exception::throw_message(&cx, &m))?;
                let resolved_dst = st
                    .resolve(PathOp::Write, &dst)
                    .map_err(|m| Exception::throw_message(&cx, &m))?;
                let meta = std::fs::metadata(&resolved_src).map_err(|_| {
                    Exception::throw_message(&cx, &format!("fs.copy: cannot read {src}"))
                })?;
                if meta.len() > MAX_COPY_BYTES {
                    return Err(Exception::throw_message(
                        &cx,
                        &format!("fs.copy: {src} exceeds {}MB limit", MAX_COPY_BYTES >> 20),
                    ));
                }
                let mut input = std::fs::File::open(&resolved_src).map_err(|_| {
                    Exception::throw_message(&cx, &format!("fs.copy: cannot read {src}"))
                })?;
                let mut output = std::fs::File::create(&resolved_dst).map_err(|_| {
                    Exception::throw_message(&cx, &format!("fs.copy: cannot write {dst}"))
                })?;
                std::io::copy(&mut input, &mut output).map_err(|_| {
                    Exception::throw_message(
                        &cx,
                        &format!("fs.copy: failed copying {src} to {dst}"),
                    )
                })?;
                // Sync so a crash mid-run can't leave a torn copy.
                output.sync_all().map_err(|_| {
                    Exception::throw_message(&cx, &format!("fs.copy: failed syncing {dst}"))
                })
            },
        ),
    )?;

    let st = Rc::clone(state);
    host.set(
        "fs_move",
        Func::from(
            move |cx: Ctx<'_>, src: String, dst: String| -> rquickjs::Result<()> {
                // Moving consumes the source: delete permission there, write
                // at the destination.
                let resolved_src = st
                    .resolve(PathOp::Delete, &src)
                    .map_err(|m| Exception::throw_message(&cx, &m))?;
                let resolved_dst = st
                    .resolve(PathOp::Write, &dst)
                    .map_err(|m| Exception::throw_message(&cx, &m))?;
                std::fs::rename(&resolved_src, &resolved_dst).map_err(|_| {
                    Exception::throw_message(&cx, &format!("fs.move: cannot move {src} to {dst}"))
                })
            },
        ),
    )?;

    let st = Rc::clone(state);
    host.set(
        "fs_glob",
        Func::from(move |cx: Ctx<'_>, pattern: String| -> rquickjs::Result<String> {
            glob_paths(&cx, &st, &pattern)
        }),
    )?;

    Ok(())
}

fn glob_paths(cx: &Ctx<'_>, st: &Rc<RunState>, pattern: &str) -> rquickjs::Result<String> {
    // The wildcard-free prefix decides which directory must be listable
    // before any matching happens.
    let prefix_end = pattern.find(['*', '?', '[']).unwrap_or(pattern.len());
    let base = match pattern[..prefix_end].rfind('/') {
        Some(0) => "/",
        Some(idx) => &pattern[..idx],
        None => ".",
    };
    st.resolve(PathOp::List, base)
        .map_err(|m| Exception::throw_message(cx, &m))?;

    let abs_pattern = if pattern.starts_with('/') {
        pattern.to_string()
    } else {
        format!("{}/{}", st.work_dir().display(), pattern)
    };

    let walker = glob::glob(&abs_pattern).map_err(|e| {
        Exception::throw_message(cx, &format!("fs.glob: invalid pattern {pattern:?}: {e}"))
    })?;

    let mut matches = Vec::new();
    for entry in walker.flatten() {
        let candidate = entry.to_string_lossy().into_owned();
        // Each hit is re-validated through the chokepoint; anything the
        // sandbox can't read silently drops out.
        if st.resolve(PathOp::Read, &candidate).is_ok() {
            matches.push(serde_json::Value::String(candidate));
        }
        if matches.len() >= MAX_GLOB_MATCHES {
            return Err(Exception::throw_message(
                cx,
                &format!(
                    "fs.glob: pattern {pattern:?} returned too many matches (limit {MAX_GLOB_MATCHES})"
                ),
            ));
        }
    }

    Ok(serde_json::Value::Array(matches).to_string())
}
