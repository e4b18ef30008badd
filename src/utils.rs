use url::Url;

const PASSTHROUGH_SCHEMES: &[&str] = &["http", "https", "file", "data", "about", "chrome", "chrome-extension"];

/// A first segment ending in one of these is a file, not a host
const PAGE_EXTENSIONS: &[&str] = &["html", "htm", "php", "asp", "aspx", "jsp"];

/// Turn what a model typed into something `Page.navigate` accepts.
///
/// `example.com` gains `https://`, local hosts gain `http://`, and a bare word
/// such as `github` becomes `https://www.github.com`.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();

    if let Ok(parsed) = Url::parse(trimmed)
        && PASSTHROUGH_SCHEMES.contains(&parsed.scheme())
    {
        return trimmed.to_string();
    }

    if is_relative(trimmed) {
        return trimmed.to_string();
    }

    if trimmed.starts_with("localhost") || trimmed.starts_with("127.0.0.1") {
        return format!("http://{}", trimmed);
    }

    if trimmed.contains('.') {
        return format!("https://{}", trimmed);
    }

    format!("https://www.{}.com", trimmed)
}

/// Whether `url` only makes sense against the current page
pub fn is_relative(url: &str) -> bool {
    if url.starts_with(['/', '?', '#']) || url.starts_with("./") || url.starts_with("../") {
        return true;
    }
    if Url::parse(url).is_ok() {
        return false;
    }
    let first = url.split(['/', '?', '#']).next().unwrap_or_default();
    first
        .rsplit_once('.')
        .is_some_and(|(_, ext)| PAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Resolve a relative `url` against `base`; `None` when `base` cannot anchor it
pub fn resolve_url(url: &str, base: &str) -> Option<String> {
    Url::parse(base).ok()?.join(url).ok().map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_complete_urls() {
        assert_eq!(normalize_url("https://example.com/a"), "https://example.com/a");
        assert_eq!(normalize_url("  about:blank "), "about:blank");
        assert_eq!(normalize_url("data:text/html,<p>x</p>"), "data:text/html,<p>x</p>");
        assert_eq!(normalize_url("chrome://settings"), "chrome://settings");
    }

    #[test]
    fn test_fills_in_scheme() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url("localhost:3000/app"), "http://localhost:3000/app");
        assert_eq!(normalize_url("127.0.0.1:8080"), "http://127.0.0.1:8080");
        assert_eq!(normalize_url("github"), "https://www.github.com");
    }

    #[test]
    fn test_relative_paths_untouched() {
        assert_eq!(normalize_url("/search?q=1"), "/search?q=1");
        assert_eq!(normalize_url("../up"), "../up");
        assert_eq!(normalize_url("page2.html"), "page2.html");
        assert!(is_relative("page2.html"));
        assert!(is_relative("?page=2"));
        assert!(!is_relative("example.com"));
        assert!(!is_relative("https://example.com/a.html"));
    }

    #[test]
    fn test_resolve_against_current_page() {
        assert_eq!(resolve_url("/search", "https://example.com/"), Some("https://example.com/search".to_string()));
        assert_eq!(
            resolve_url("page2.html", "https://example.com/docs/page1.html"),
            Some("https://example.com/docs/page2.html".to_string())
        );
        assert_eq!(resolve_url("/search", "about:blank"), None);
    }
}
