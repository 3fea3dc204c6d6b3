/// Caller-supplied allow-list of path prefixes that bypass the Token
/// Validator entirely (health, metrics, docs, …). The list is a
/// configuration input, not a hardcoded constant (§4.1).
pub fn is_public_path(path: &str, allow_list: &[String]) -> bool {
    allow_list.iter().any(|prefix| path.starts_with(prefix.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_configured_prefix() {
        let list = vec!["/health".to_string(), "/docs".to_string()];
        assert!(is_public_path("/health", &list));
        assert!(is_public_path("/health/live", &list));
        assert!(!is_public_path("/api/v1/conversations", &list));
    }
}
