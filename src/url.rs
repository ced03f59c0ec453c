//! URL allow-list lookups used when rewriting `<object>` and `<embed>`.

/// Decides whether plugin content loaded from a URL may use the network
/// freely.
///
/// Implementations are called synchronously during filtering and must be
/// cheap and side-effect free; any caching is up to the implementation.
/// Closures `Fn(&str) -> bool` implement this trait.
pub trait UrlAllowList: Send + Sync {
    fn is_allowed(&self, url: &str) -> bool;
}

impl<F> UrlAllowList for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_allowed(&self, url: &str) -> bool {
        self(url)
    }
}

/// Allows nothing. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUrlsAllowed;

impl UrlAllowList for NoUrlsAllowed {
    fn is_allowed(&self, _url: &str) -> bool {
        false
    }
}

/// Allows URLs that start with one of a fixed set of prefixes, ignoring
/// ASCII case and surrounding whitespace.
///
/// ```
/// use xss_guard::url::{PrefixAllowList, UrlAllowList};
///
/// let list = PrefixAllowList::new(["https://video.example.com/"]);
/// assert!(list.is_allowed(" HTTPS://video.example.com/clip.swf"));
/// assert!(!list.is_allowed("https://evil.example/"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PrefixAllowList {
    prefixes: Vec<String>,
}

impl PrefixAllowList {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(|prefix| prefix.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }
}

impl UrlAllowList for PrefixAllowList {
    fn is_allowed(&self, url: &str) -> bool {
        let url = url.trim().to_ascii_lowercase();
        self.prefixes.iter().any(|prefix| url.starts_with(prefix.as_str()))
    }
}
