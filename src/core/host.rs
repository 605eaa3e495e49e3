//! Normalizes host addresses before a run.

use regex::Regex;
use std::sync::OnceLock;

/// The SSH port used when neither the host nor the configuration names one.
pub const DEFAULT_PORT: &str = "22";

/// Appends `:<port>` to `host` unless it already ends with a port.
///
/// An empty `port` means [DEFAULT_PORT].
///
/// ```
/// # use efs2::core::host::normalize;
/// assert_eq!("example.com:2222", normalize("example.com", "2222"));
/// assert_eq!("example.com:2022", normalize("example.com:2022", "2222"));
/// assert_eq!("example.com:22", normalize("example.com", ""));
/// ```
pub fn normalize(host: &str, port: &str) -> String {
    if has_port(host) {
        return host.to_owned();
    }

    let port = match port {
        "" => DEFAULT_PORT,
        port => port,
    };
    format!("{host}:{port}")
}

/// Calls [normalize] on every host, preserving order.
pub fn normalize_all<S: AsRef<str>>(hosts: &[S], port: &str) -> Vec<String> {
    hosts
        .iter()
        .map(|host| normalize(host.as_ref(), port))
        .collect()
}

/// Splits a normalized `host:port` address.
///
/// Returns [None] if `address` has no port.
pub fn split(address: &str) -> Option<(&str, &str)> {
    if !has_port(address) {
        return None;
    }
    address.rsplit_once(':')
}

fn has_port(host: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r":[0-9]+$").unwrap())
        .is_match(host)
}
