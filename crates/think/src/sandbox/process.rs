//! The `process` bridge.
//!
//! `process.stdout.write` is the only way for sandboxed code to reach real
//! stdout. `process.exit` unwinds the VM through a tagged control signal;
//! `process.sleep` polls the cancellation token so Ctrl-C interrupts a
//! sleeping script promptly.

use std::io::Write;
use std::rc::Rc;
use std::time::Duration;

use rquickjs::function::Func;
use rquickjs::{Ctx, Exception, Object};

use super::{ControlSignal, RunState};

pub(super) const PRELUDE: &str = r#"
(function () {
    const h = globalThis.__host;
    globalThis.process = {
        cwd: () => h.process_cwd(),
        args: JSON.parse(h.process_args()),
        exit: (code) => { h.process_exit(code === undefined ? 0 : Number(code)); },
        sleep: (ms) => { h.process_sleep(Number(ms)); },
        stdout: {
            write: (text) => { h.stdout_write(String(text)); },
        },
    };
})();
"#;

const SLEEP_SLICE: Duration = Duration::from_millis(25);

pub(super) fn register(
    _ctx: &Ctx<'_>,
    host: &Object<'_>,
    state: &Rc<RunState>,
) -> rquickjs::Result<()> {
    let st = Rc::clone(state);
    host.set(
        "process_cwd",
        Func::from(move || -> String { st.work_dir().display().to_string() }),
    )?;

    let st = Rc::clone(state);
    host.set(
        "process_args",
        Func::from(move || -> String {
            serde_json::to_string(st.args()).unwrap_or_else(|_| "[]".to_string())
        }),
    )?;

    let st = Rc::clone(state);
    host.set(
        "process_exit",
        Func::from(move |cx: Ctx<'_>, code: i32| -> rquickjs::Result<()> {
            st.set_signal(ControlSignal::Exit(code));
            Err(Exception::throw_message(&cx, "process.exit"))
        }),
    )?;

    let st = Rc::clone(state);
    host.set(
        "process_sleep",
        Func::from(move |cx: Ctx<'_>, ms: f64| -> rquickjs::Result<()> {
            if !ms.is_finite() || ms <= 0.0 {
                return Ok(());
            }
            let mut remaining = Duration::from_millis(ms as u64);
            while !remaining.is_zero() {
                if st.cancel().is_cancelled() {
                    return Err(Exception::throw_message(&cx, "sleep interrupted"));
                }
                let slice = remaining.min(SLEEP_SLICE);
                std::thread::sleep(slice);
                remaining -= slice;
            }
            Ok(())
        }),
    )?;

    host.set(
        "stdout_write",
        Func::from(move |text: String| {
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(text.as_bytes());
            let _ = stdout.flush();
        }),
    )?;

    Ok(())
}
