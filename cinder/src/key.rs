//! Deterministic cache key derivation.

/// Reduces arbitrary text to a lowercase, hyphen-separated, alphanumeric
/// slug. Runs of non-alphanumeric characters collapse to a single hyphen;
/// leading and trailing separators are dropped.
pub fn slugify(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('-');
            }
            pending_sep = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    slug
}

/// Assembles the final cache key: application namespace, optional bound type
/// name, callable name, then the call-specific fragment, all slugified.
pub fn compose_key(
    namespace: &str,
    class_name: Option<&str>,
    callable: &str,
    fragment: &str,
) -> String {
    let base = match class_name {
        Some(class) => format!("{namespace}-{class}-{callable}"),
        None => format!("{namespace}-{callable}"),
    };
    if fragment.is_empty() {
        slugify(&base)
    } else {
        slugify(&format!("{base}-{fragment}"))
    }
}
