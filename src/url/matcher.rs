/// Checks if a host matches an allow-list pattern
///
/// `"example.com"` matches only `example.com`; `"*.example.com"` matches the bare
/// domain and any subdomain depth. Comparison ignores ASCII case.
///
/// # Examples
///
/// ```
/// use med_harvest::url::matches_wildcard;
///
/// assert!(matches_wildcard("www.msdmanuals.com", "WWW.MSDMANUALS.COM"));
/// assert!(matches_wildcard("*.msdmanuals.cn", "msdmanuals.cn"));
/// assert!(matches_wildcard("*.msdmanuals.cn", "www.msdmanuals.cn"));
/// assert!(!matches_wildcard("*.msdmanuals.cn", "notmsdmanuals.cn"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    let candidate = candidate.to_ascii_lowercase();
    match pattern.strip_prefix("*.") {
        Some(base) => {
            let base = base.to_ascii_lowercase();
            candidate == base || candidate.ends_with(&format!(".{}", base))
        }
        None => candidate.eq_ignore_ascii_case(pattern),
    }
}

/// Checks a host against a list of patterns
pub fn matches_any<S: AsRef<str>>(patterns: &[S], candidate: &str) -> bool {
    patterns
        .iter()
        .any(|pattern| matches_wildcard(pattern.as_ref(), candidate))
}
