//! The `net` bridge.
//!
//! `net.fetch` is the only network surface. Before any socket opens, the
//! target host is screened against private/loopback/link-local address
//! space (both literal IPs and what the name resolves to), and only then is
//! the approval callback consulted. Transport is bounded by connect and
//! overall timeouts plus a response-body cap.

use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use std::rc::Rc;
use std::sync::OnceLock;

use rquickjs::function::Func;
use rquickjs::{Ctx, Exception, Object};

use super::RunState;
use crate::limits::{MAX_NET_RESPONSE_BYTES, NET_CONNECT_TIMEOUT, NET_REQUEST_TIMEOUT};

pub(super) const PRELUDE: &str = r#"
(function () {
    const h = globalThis.__host;
    globalThis.net = {
        fetch: (url, options) =>
            JSON.parse(h.net_fetch(String(url), JSON.stringify(options || {}))),
    };
})();
"#;

#[derive(Debug, serde::Deserialize)]
struct FetchOptions {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    headers: Option<std::collections::HashMap<String, String>>,
    #[serde(default)]
    body: Option<String>,
}

fn http_client() -> &'static reqwest::blocking::Client {
    static CLIENT: OnceLock<reqwest::blocking::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::blocking::Client::builder()
            .connect_timeout(NET_CONNECT_TIMEOUT)
            .timeout(NET_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default()
    })
}

/// Private/internal address space check for SSRF protection.
fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_link_local()
                || v4.is_private()
                || v4 == Ipv4Addr::UNSPECIFIED
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                // fe80::/10 link-local and fc00::/7 unique-local.
                || (v6.segments()[0] & 0xffc0) == 0xfe80
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || v6.is_unspecified()
        }
    }
}

pub(super) fn register(
    _ctx: &Ctx<'_>,
    host: &Object<'_>,
    state: &Rc<RunState>,
) -> rquickjs::Result<()> {
    let st = Rc::clone(state);
    host.set(
        "net_fetch",
        Func::from(
            move |cx: Ctx<'_>, url: String, options_json: String| -> rquickjs::Result<String> {
                fetch(&cx, &st, &url, &options_json)
            },
        ),
    )?;
    Ok(())
}

fn fetch(
    cx: &Ctx<'_>,
    st: &Rc<RunState>,
    url: &str,
    options_json: &str,
) -> rquickjs::Result<String> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| Exception::throw_message(cx, &format!("net.fetch: invalid URL: {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| Exception::throw_message(cx, "net.fetch: invalid URL: no host"))?
        .to_string();

    // SSRF guard, before the approval callback ever sees the request.
    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_private_ip(ip) {
            return Err(Exception::throw_message(
                cx,
                &format!("net.fetch: access to private IP {host} denied"),
            ));
        }
    } else if let Ok(addrs) = (host.as_str(), 80u16).to_socket_addrs() {
        for addr in addrs {
            if is_private_ip(addr.ip()) {
                return Err(Exception::throw_message(
                    cx,
                    &format!("net.fetch: {host} resolves to private IP, access denied"),
                ));
            }
        }
    }

    match st.approve_net(&host) {
        Ok(Some(true)) => {}
        Ok(Some(false)) => {
            return Err(Exception::throw_message(
                cx,
                &format!("net.fetch: access to {host} denied"),
            ));
        }
        Ok(None) => {
            return Err(Exception::throw_message(
                cx,
                "net.fetch: network access denied (no approval handler)",
            ));
        }
        Err(msg) => {
            return Err(Exception::throw_message(cx, &format!("net.fetch: {msg}")));
        }
    }

    let options: FetchOptions = serde_json::from_str(options_json).unwrap_or(FetchOptions {
        method: None,
        headers: None,
        body: None,
    });

    let method = options
        .method
        .as_deref()
        .unwrap_or("GET")
        .to_ascii_uppercase();
    let method = reqwest::Method::from_bytes(method.as_bytes()).map_err(|_| {
        Exception::throw_message(cx, &format!("net.fetch: invalid method {method}"))
    })?;

    let mut request = http_client().request(method, parsed);
    if let Some(headers) = &options.headers {
        for (key, value) in headers {
            request = request.header(key, value);
        }
    }
    if let Some(body) = options.body {
        request = request.body(body);
    }

    let response = request.send().map_err(|e| {
        Exception::throw_message(cx, &format!("net.fetch: request to {url} failed: {e}"))
    })?;

    let status = response.status().as_u16();
    let mut headers = serde_json::Map::new();
    for (key, value) in response.headers() {
        if let Ok(v) = value.to_str() {
            headers.insert(
                key.as_str().to_ascii_lowercase(),
                serde_json::Value::String(v.to_string()),
            );
        }
    }

    // One byte past the cap distinguishes "too big" from "exactly at the
    // limit".
    let mut body = Vec::new();
    response
        .take(MAX_NET_RESPONSE_BYTES + 1)
        .read_to_end(&mut body)
        .map_err(|_| {
            Exception::throw_message(cx, &format!("net.fetch: error reading response from {url}"))
        })?;
    if body.len() as u64 > MAX_NET_RESPONSE_BYTES {
        return Err(Exception::throw_message(
            cx,
            &format!(
                "net.fetch: response body from {url} exceeds {}MB limit",
                MAX_NET_RESPONSE_BYTES >> 20
            ),
        ));
    }

    Ok(serde_json::json!({
        "status": status,
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    })
    .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_ip_ranges() {
        for ip in [
            "127.0.0.1",
            "10.0.0.1",
            "172.16.0.1",
            "172.31.255.255",
            "192.168.1.1",
            "169.254.169.254",
            "0.0.0.0",
            "::1",
            "fe80::1",
            "fd00::1",
        ] {
            assert!(
                is_private_ip(ip.parse().expect("parse")),
                "{ip} should be private"
            );
        }
    }

    #[test]
    fn test_public_ip_ranges() {
        for ip in ["1.1.1.1", "8.8.8.8", "93.184.216.34", "2606:4700::1111"] {
            assert!(
                !is_private_ip(ip.parse().expect("parse")),
                "{ip} should be public"
            );
        }
    }

    #[test]
    fn test_boundary_of_172_range() {
        assert!(!is_private_ip("172.15.255.255".parse().expect("parse")));
        assert!(is_private_ip("172.16.0.0".parse().expect("parse")));
        assert!(is_private_ip("172.31.255.255".parse().expect("parse")));
        assert!(!is_private_ip("172.32.0.0".parse().expect("parse")));
    }
}
