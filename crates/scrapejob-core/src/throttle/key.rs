/// Request-queue key for a URL: its host name, ignoring scheme, port and path.
///
/// Only `http` and `https` URLs have a key; anything else returns `None` and the
/// caller skips throttling.
pub fn queue_key(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.host_str().map(str::to_string)
}
