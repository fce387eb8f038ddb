//! The `console` bridge.
//!
//! Both `log` and `error` write to stderr: stdout belongs to the script's
//! actual output (`process.stdout.write`). Argument formatting happens in
//! the glue layer so objects arrive JSON-serialized instead of as
//! `[object Object]`.

use std::io::Write;
use std::rc::Rc;

use rquickjs::function::Func;
use rquickjs::{Ctx, Object};

use super::RunState;

pub(super) const PRELUDE: &str = r#"
(function () {
    const h = globalThis.__host;
    const fmt = (a) => {
        if (typeof a === "string") return a;
        if (a === undefined) return "undefined";
        const json = JSON.stringify(a);
        return json === undefined ? String(a) : json;
    };
    const write = (args) => h.console_write(args.map(fmt).join(" "));
    globalThis.console = {
        log: (...args) => write(args),
        error: (...args) => write(args),
    };
})();
"#;

pub(super) fn register(
    _ctx: &Ctx<'_>,
    host: &Object<'_>,
    _state: &Rc<RunState>,
) -> rquickjs::Result<()> {
    host.set(
        "console_write",
        Func::from(move |line: String| {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{line}");
        }),
    )?;
    Ok(())
}
