/// Pool names are plain alphanumeric tokens. Object ids need no check of
/// their own: a routed `{soid}` segment can never contain a slash.
pub fn is_valid_pool_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric())
}
