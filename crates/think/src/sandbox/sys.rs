//! The `sys` bridge: platform facts and terminal geometry.
//!
//! Memory, uptime, and load figures come from `/proc` and are Linux-only;
//! other platforms raise a JS error from those calls rather than invent
//! numbers.

use rquickjs::function::Func;
use rquickjs::{Ctx, Exception, Object};

pub(super) const PRELUDE: &str = r#"
(function () {
    const h = globalThis.__host;
    globalThis.sys = {
        platform: () => h.sys_platform(),
        arch: () => h.sys_arch(),
        cpus: () => h.sys_cpus(),
        totalmem: () => h.sys_totalmem(),
        freemem: () => h.sys_freemem(),
        uptime: () => h.sys_uptime(),
        loadavg: () => JSON.parse(h.sys_loadavg()),
        terminal: () => JSON.parse(h.sys_terminal()),
    };
})();
"#;

pub(super) fn register(_ctx: &Ctx<'_>, host: &Object<'_>) -> rquickjs::Result<()> {
    host.set(
        "sys_platform",
        Func::from(|| -> String { std::env::consts::OS.to_string() }),
    )?;

    host.set(
        "sys_arch",
        Func::from(|| -> String { std::env::consts::ARCH.to_string() }),
    )?;

    host.set(
        "sys_cpus",
        Func::from(|| -> f64 {
            std::thread::available_parallelism()
                .map(|n| n.get() as f64)
                .unwrap_or(1.0)
        }),
    )?;

    host.set(
        "sys_totalmem",
        Func::from(|cx: Ctx<'_>| -> rquickjs::Result<f64> {
            total_memory().map_err(|e| Exception::throw_message(&cx, &format!("sys.totalmem: {e}")))
        }),
    )?;

    host.set(
        "sys_freemem",
        Func::from(|cx: Ctx<'_>| -> rquickjs::Result<f64> {
            free_memory().map_err(|e| Exception::throw_message(&cx, &format!("sys.freemem: {e}")))
        }),
    )?;

    host.set(
        "sys_uptime",
        Func::from(|cx: Ctx<'_>| -> rquickjs::Result<f64> {
            system_uptime().map_err(|e| Exception::throw_message(&cx, &format!("sys.uptime: {e}")))
        }),
    )?;

    host.set(
        "sys_loadavg",
        Func::from(|cx: Ctx<'_>| -> rquickjs::Result<String> {
            let avg = system_loadavg()
                .map_err(|e| Exception::throw_message(&cx, &format!("sys.loadavg: {e}")))?;
            Ok(serde_json::json!(avg).to_string())
        }),
    )?;

    host.set(
        "sys_terminal",
        Func::from(|| -> String {
            use std::io::IsTerminal;
            let (columns, rows) = stderr_winsize().unwrap_or((80, 24));
            let is_tty = std::io::stdout().is_terminal();
            let color = is_tty && std::env::var_os("NO_COLOR").is_none();
            serde_json::json!({
                "columns": columns,
                "rows": rows,
                "isTTY": is_tty,
                "color": color,
            })
            .to_string()
        }),
    )?;

    Ok(())
}

/// Terminal geometry from stderr. Stdout may be a pipe while stderr still
/// points at the terminal, so the dimensions come from fd 2.
#[cfg(unix)]
fn stderr_winsize() -> Option<(u16, u16)> {
    let mut size = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let result = unsafe { libc::ioctl(libc::STDERR_FILENO, libc::TIOCGWINSZ, &mut size) };
    if result == 0 && size.ws_col > 0 && size.ws_row > 0 {
        Some((size.ws_col, size.ws_row))
    } else {
        None
    }
}

#[cfg(not(unix))]
fn stderr_winsize() -> Option<(u16, u16)> {
    None
}

#[cfg(target_os = "linux")]
fn meminfo_field(field: &str) -> Result<f64, String> {
    let data = std::fs::read_to_string("/proc/meminfo").map_err(|e| e.to_string())?;
    for line in data.lines() {
        if let Some(rest) = line.strip_prefix(field) {
            let kb: f64 = rest
                .trim_start_matches(':')
                .trim()
                .trim_end_matches(" kB")
                .trim()
                .parse()
                .map_err(|_| format!("malformed {field} in /proc/meminfo"))?;
            return Ok(kb * 1024.0);
        }
    }
    Err(format!("{field} not present in /proc/meminfo"))
}

#[cfg(target_os = "linux")]
fn total_memory() -> Result<f64, String> {
    meminfo_field("MemTotal")
}

#[cfg(target_os = "linux")]
fn free_memory() -> Result<f64, String> {
    // MemAvailable is what "free" means in practice; fall back to MemFree
    // on ancient kernels.
    meminfo_field("MemAvailable").or_else(|_| meminfo_field("MemFree"))
}

#[cfg(target_os = "linux")]
fn system_uptime() -> Result<f64, String> {
    let data = std::fs::read_to_string("/proc/uptime").map_err(|e| e.to_string())?;
    data.split_whitespace()
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| "malformed /proc/uptime".to_string())
}

#[cfg(target_os = "linux")]
fn system_loadavg() -> Result<[f64; 3], String> {
    let data = std::fs::read_to_string("/proc/loadavg").map_err(|e| e.to_string())?;
    let mut fields = data.split_whitespace();
    let mut avg = [0.0f64; 3];
    for slot in &mut avg {
        *slot = fields
            .next()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| "malformed /proc/loadavg".to_string())?;
    }
    Ok(avg)
}

#[cfg(not(target_os = "linux"))]
fn total_memory() -> Result<f64, String> {
    Err("unsupported platform".to_string())
}

#[cfg(not(target_os = "linux"))]
fn free_memory() -> Result<f64, String> {
    Err("unsupported platform".to_string())
}

#[cfg(not(target_os = "linux"))]
fn system_uptime() -> Result<f64, String> {
    Err("unsupported platform".to_string())
}

#[cfg(not(target_os = "linux"))]
fn system_loadavg() -> Result<[f64; 3], String> {
    Err("unsupported platform".to_string())
}
