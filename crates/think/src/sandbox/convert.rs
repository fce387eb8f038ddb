//! Rendering JS values back to the host.
//!
//! The boundary is deliberately narrow: structured data crosses into JS as
//! JSON text parsed by the glue layer, and the only host-side conversion is
//! turning the program's final value into a result string.

use rquickjs::convert::Coerced;
use rquickjs::{Ctx, Value};

/// Render a JS value as a readable string: strings raw, objects and arrays
/// JSON-serialized so callers see actual data instead of
/// `[object Object]`, everything else coerced.
pub(crate) fn stringify<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> String {
    if value.is_undefined() {
        return "undefined".to_string();
    }
    if value.is_null() {
        return "null".to_string();
    }
    if let Some(s) = value.as_string() {
        return s.to_string().unwrap_or_default();
    }
    if value.is_object() || value.is_array() {
        if let Ok(Some(json)) = ctx.json_stringify(value.clone())
            && let Ok(s) = json.to_string()
        {
            return s;
        }
    }
    value
        .clone()
        .get::<Coerced<String>>()
        .map(|c| c.0)
        .unwrap_or_default()
}
