//! Validation of client-supplied `ipv4:port` target strings.
//!
//! The gateway forwards HTTP requests and dials stream connections to
//! addresses taken straight from request paths.  This module is the sole
//! defense against forwarding to arbitrary destinations: only literal
//! dotted-quad IPv4 addresses with an explicit non-zero port pass.
//! Hostnames, IPv6 literals, and bare addresses without a port are all
//! rejected, so the check must run before any network call derived from
//! client input.

/// Returns `true` iff `s` is four dot-separated decimal groups, each in
/// [0,255], followed by `:` and a decimal port in [1,65535].
///
/// # Example
///
/// ```rust
/// use devgate_core::host::is_valid_host;
///
/// assert!(is_valid_host("127.0.0.1:8080"));
/// assert!(!is_valid_host("localhost:8080"));
/// assert!(!is_valid_host("10.0.0.1"));
/// ```
pub fn is_valid_host(s: &str) -> bool {
    let Some((address, port)) = s.split_once(':') else {
        return false;
    };
    is_ipv4_literal(address) && is_port(port)
}

/// Checks for exactly four non-empty all-digit groups, each ≤ 255.
///
/// Parsed manually rather than via `Ipv4Addr::from_str`: the accepted
/// grammar is exactly the one documented on [`is_valid_host`], including
/// zero-padded decimal groups.
fn is_ipv4_literal(s: &str) -> bool {
    let mut groups = 0u8;
    for group in s.split('.') {
        if !is_decimal_group(group, 3) {
            return false;
        }
        // 1-3 ASCII digits always fit in u16.
        let value: u16 = group.parse().unwrap_or(u16::MAX);
        if value > 255 {
            return false;
        }
        groups += 1;
        if groups > 4 {
            return false;
        }
    }
    groups == 4
}

/// Checks for a 1-5 digit decimal port in [1,65535].
fn is_port(s: &str) -> bool {
    if !is_decimal_group(s, 5) {
        return false;
    }
    let value: u32 = s.parse().unwrap_or(0);
    (1..=65535).contains(&value)
}

/// `true` iff `s` is 1..=`max_len` ASCII digits.
///
/// `u16::from_str` accepts a leading `+`, so the digit check cannot be
/// delegated to the integer parser.
fn is_decimal_group(s: &str, max_len: usize) -> bool {
    !s.is_empty() && s.len() <= max_len && s.bytes().all(|b| b.is_ascii_digit())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
