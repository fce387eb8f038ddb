//! The `agent` bridge.
//!
//! `agent.resume(context?)` is the cooperative escape hatch: sandboxed code
//! that cannot finish on its own hands control back to the agent loop,
//! optionally explaining what it needs. The call never returns.

use std::rc::Rc;

use rquickjs::function::Func;
use rquickjs::{Ctx, Exception, Object};

use super::{ControlSignal, RunState};

pub(super) const PRELUDE: &str = r#"
(function () {
    const h = globalThis.__host;
    globalThis.agent = {
        resume: (context) => {
            h.agent_resume(context === undefined ? "" : String(context));
        },
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
        "agent_resume",
        Func::from(move |cx: Ctx<'_>, context: String| -> rquickjs::Result<()> {
            st.set_signal(ControlSignal::Resume(context));
            Err(Exception::throw_message(&cx, "agent.resume"))
        }),
    )?;
    Ok(())
}
