/// Minimal glob matcher covering the only shape the Resolver ever emits:
/// a literal prefix followed by a trailing `*` (e.g.
/// `auth:permission:{org}:{user}:*`). Falls back to exact match when there
/// is no `*` in the pattern at all.
pub fn glob_matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => pattern == key,
    }
}
