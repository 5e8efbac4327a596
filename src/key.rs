//! Queue key derivation.
//!
//! All URLs sharing a queue key are rate-limited together. The default
//! policy keys by the lowercased host, falling back to the raw authority
//! for URLs without a host. Callers may always override the key on the
//! item itself.

use url::Url;

/// Derives the queue key for a parsed URL.
///
/// Returns `None` when the URL carries neither a host nor an authority, in
/// which case the item is not schedulable.
pub fn queue_key(url: &Url) -> Option<String> {
    if let Some(host) = url.host_str() {
        return Some(host.to_lowercase());
    }
    let authority = url.authority();
    if authority.is_empty() {
        None
    } else {
        Some(authority.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_of(input: &str) -> Option<String> {
        queue_key(&Url::parse(input).unwrap())
    }

    #[test]
    fn keys_by_host() {
        assert_eq!(key_of("https://example.com/path"), Some("example.com".into()));
    }

    #[test]
    fn host_is_lowercased() {
        assert_eq!(key_of("https://EXAMPLE.COM/"), Some("example.com".into()));
        assert_eq!(key_of("https://Sub.Example.COM/a"), Some("sub.example.com".into()));
    }

    #[test]
    fn port_is_not_part_of_the_key() {
        assert_eq!(key_of("https://example.com:8443/"), Some("example.com".into()));
    }

    #[test]
    fn subdomains_stay_distinct() {
        assert_ne!(key_of("https://a.example.com/"), key_of("https://b.example.com/"));
    }

    #[test]
    fn hostless_urls_have_no_key() {
        assert_eq!(key_of("data:text/plain,hello"), None);
        assert_eq!(key_of("mailto:someone@example.com"), None);
    }

    #[test]
    fn ip_hosts_are_keyed_verbatim() {
        assert_eq!(key_of("http://192.168.0.1:8080/x"), Some("192.168.0.1".into()));
    }
}
