//! Hostname normalization
//!
//! Candidates arrive from several upstreams with inconsistent formatting
//! (trailing FQDN root dots, wildcard prefixes, mixed case). Everything
//! that reaches the engine or the store goes through [`normalize_candidate`].

use std::collections::BTreeSet;

/// Normalize one candidate hostname.
///
/// Trims surrounding whitespace, strips a single trailing `.` and lowercases
/// ASCII letters. Returns `None` for empty strings and for strings with
/// embedded whitespace, which are never valid DNS names.
pub fn normalize_candidate(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let stripped = trimmed.strip_suffix('.').unwrap_or(trimmed);

    if stripped.is_empty() || stripped.chars().any(char::is_whitespace) {
        return None;
    }

    Some(stripped.to_ascii_lowercase())
}

/// Normalize and deduplicate a batch of candidates
pub fn normalize_candidates<I, S>(candidates: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    candidates
        .into_iter()
        .filter_map(|c| normalize_candidate(c.as_ref()))
        .collect()
}

/// True when `host` is `domain` itself or a name below it
pub fn is_within_domain(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.');
    let domain = domain.trim_end_matches('.');

    if host.eq_ignore_ascii_case(domain) {
        return true;
    }

    host.len() > domain.len() + 1
        && host
            .get(host.len() - domain.len()..)
            .is_some_and(|tail| tail.eq_ignore_ascii_case(domain))
        && host.as_bytes()[host.len() - domain.len() - 1] == b'.'
}

/// Clean a raw name reported by a discovery source.
///
/// Lowercases, drops wildcard prefixes (`*.`), normalizes, and keeps the
/// name only if it lies within `domain`.
pub fn clean_discovered(raw: &str, domain: &str) -> Option<String> {
    let lowered = raw.trim().to_ascii_lowercase();
    let mut name = lowered.as_str();
    while let Some(rest) = name.strip_prefix("*.") {
        name = rest;
    }

    let name = normalize_candidate(name)?;
    if is_within_domain(&name, domain) {
        Some(name)
    } else {
        None
    }
}
