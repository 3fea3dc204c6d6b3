/// Maximum content length accepted after sanitization (§4.5).
pub const MAX_CONTENT_LEN: usize = 10_000;

/// Strip every `<...>` tag-like span and trim surrounding whitespace.
/// Idempotent: `sanitize(sanitize(x)) == sanitize(x)` since the result
/// contains no `<` characters for a second pass to act on.
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}
