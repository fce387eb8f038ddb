//! CommonJS `require`.
//!
//! Module paths resolve through the same read chokepoint as every other
//! filesystem access, so `require` cannot load anything `fs.readFile`
//! couldn't. Loaded modules are cached by resolved path for the lifetime
//! of the run.

use std::rc::Rc;

use rquickjs::function::Func;
use rquickjs::{Ctx, Exception, Object};

use super::RunState;
use crate::approval::PathOp;
use crate::limits::MAX_READ_BYTES;

pub(super) const PRELUDE: &str = r#"
(function () {
    const h = globalThis.__host;
    const cache = Object.create(null);
    globalThis.require = function require(path) {
        const resolved = h.require_resolve(String(path));
        if (resolved in cache) {
            return cache[resolved];
        }
        const source = h.require_load(resolved);
        const module = { exports: {} };
        const factory = (0, eval)(
            "(function(module, exports, require){" + source + "\n})"
        );
        factory(module, module.exports, require);
        cache[resolved] = module.exports;
        return module.exports;
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
        "require_resolve",
        Func::from(move |cx: Ctx<'_>, path: String| -> rquickjs::Result<String> {
            match st.resolve(PathOp::Read, &path) {
                Ok(resolved) => Ok(resolved.display().to_string()),
                Err(_) => Err(Exception::throw_message(
                    &cx,
                    &format!("require: module {path:?} does not exist"),
                )),
            }
        }),
    )?;

    let st = Rc::clone(state);
    host.set(
        "require_load",
        Func::from(move |cx: Ctx<'_>, resolved: String| -> rquickjs::Result<String> {
            // Defense against TOCTOU between resolve and load: route
            // through the chokepoint again.
            let path = st
                .resolve(PathOp::Read, &resolved)
                .map_err(|_| {
                    Exception::throw_message(
                        &cx,
                        &format!("require: module {resolved:?} does not exist"),
                    )
                })?;
            let meta = std::fs::metadata(&path).map_err(|_| {
                Exception::throw_message(
                    &cx,
                    &format!("require: module {resolved:?} does not exist"),
                )
            })?;
            if meta.len() > MAX_READ_BYTES {
                return Err(Exception::throw_message(
                    &cx,
                    &format!("require: module {resolved:?} exceeds size limit"),
                ));
            }
            std::fs::read_to_string(&path).map_err(|_| {
                Exception::throw_message(
                    &cx,
                    &format!("require: module {resolved:?} does not exist"),
                )
            })
        }),
    )?;

    Ok(())
}
