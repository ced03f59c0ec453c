//! Filter configuration and the builder that produces filters.

use std::sync::Arc;

use crate::filter::{StreamFilter, TreeFilter};
use crate::policy::Policy;
use crate::url::{NoUrlsAllowed, UrlAllowList};

/// Per-filter settings, fixed once the filter is built.
pub struct FilterConfig {
    pub(crate) with_comments: bool,
    pub(crate) blocking_prefix: Option<String>,
    pub(crate) escape_comment_markup: bool,
    pub(crate) protect_objects: bool,
    pub(crate) url_allow_list: Box<dyn UrlAllowList>,
}

impl FilterConfig {
    /// Marker comments are written next to neutralized markup.
    pub fn with_comments(&self) -> bool {
        self.with_comments
    }

    /// Prefix that renames disabled tags instead of escaping them.
    pub fn blocking_prefix(&self) -> Option<&str> {
        self.blocking_prefix.as_deref()
    }

    /// `<` and `>` inside ordinary comments are escaped.
    pub fn escape_comment_markup(&self) -> bool {
        self.escape_comment_markup
    }

    /// `<object>`, `<param>` and `<embed>` get their safety settings forced.
    pub fn protect_objects(&self) -> bool {
        self.protect_objects
    }

    pub fn url_allow_list(&self) -> &dyn UrlAllowList {
        self.url_allow_list.as_ref()
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            with_comments: true,
            blocking_prefix: None,
            escape_comment_markup: true,
            protect_objects: true,
            url_allow_list: Box::new(NoUrlsAllowed),
        }
    }
}

impl std::fmt::Debug for FilterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterConfig")
            .field("with_comments", &self.with_comments)
            .field("blocking_prefix", &self.blocking_prefix)
            .field("escape_comment_markup", &self.escape_comment_markup)
            .field("protect_objects", &self.protect_objects)
            .finish_non_exhaustive()
    }
}

/// Builder for a [`TreeFilter`] or [`StreamFilter`].
///
/// Defaults: marker comments on, no blocking prefix, comment markup escaped,
/// object protection on, no URL allowed to use the network.
///
/// # Example
///
/// ```
/// use xss_guard::{FilterBuilder, Policy};
///
/// let filter = FilterBuilder::new(Policy::baseline())
///     .with_comments(false)
///     .blocking_prefix("blocked_")
///     .build_tree();
/// assert_eq!(filter.filter("<script>x</script>"), "<blocked_script>x</blocked_script>");
/// ```
pub struct FilterBuilder {
    policy: Arc<Policy>,
    config: FilterConfig,
}

impl FilterBuilder {
    pub fn new(policy: impl Into<Arc<Policy>>) -> Self {
        Self {
            policy: policy.into(),
            config: FilterConfig::default(),
        }
    }

    /// Write marker comments next to neutralized markup. With `false` the
    /// same neutralization happens silently.
    pub fn with_comments(mut self, enabled: bool) -> Self {
        self.config.with_comments = enabled;
        self
    }

    /// Rename disabled tags to `prefix` + name instead of escaping them.
    pub fn blocking_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.blocking_prefix = Some(prefix.into());
        self
    }

    /// Escape `<` and `>` inside ordinary comments.
    pub fn escape_comment_markup(mut self, enabled: bool) -> Self {
        self.config.escape_comment_markup = enabled;
        self
    }

    /// Force safety parameters on `<object>`, `<param>` and `<embed>`.
    pub fn protect_objects(mut self, enabled: bool) -> Self {
        self.config.protect_objects = enabled;
        self
    }

    /// Lookup deciding whether plugin URLs get `allowNetworking="all"`.
    pub fn url_allow_list(mut self, list: impl UrlAllowList + 'static) -> Self {
        self.config.url_allow_list = Box::new(list);
        self
    }

    pub fn build_tree(self) -> TreeFilter {
        TreeFilter::new(self.policy, Arc::new(self.config))
    }

    pub fn build_stream(self) -> StreamFilter {
        StreamFilter::new(self.policy, Arc::new(self.config))
    }
}
