//! The `env` bridge. A single gated getter.

use std::rc::Rc;

use rquickjs::function::Func;
use rquickjs::{Ctx, Exception, Object};

use super::RunState;

pub(super) const PRELUDE: &str = r#"
(function () {
    const h = globalThis.__host;
    globalThis.env = {
        get: (name) => h.env_get(String(name)),
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
        "env_get",
        Func::from(move |cx: Ctx<'_>, name: String| -> rquickjs::Result<String> {
            match st.approve_env(&name) {
                Ok(true) => {}
                Ok(false) => {
                    return Err(Exception::throw_message(
                        &cx,
                        &format!("env.get: access denied for {name}"),
                    ));
                }
                Err(msg) => {
                    return Err(Exception::throw_message(&cx, &format!("env.get: {msg}")));
                }
            }
            Ok(std::env::var(&name).unwrap_or_default())
        }),
    )?;
    Ok(())
}
