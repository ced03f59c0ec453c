//! # xss_guard
//!
//! A policy-driven markup filter that neutralizes cross-site scripting
//! vectors in untrusted HTML fragments while keeping the markup readable.
//!
//! ## Overview
//!
//! Input is tokenized by a small grammar engine ([`grammar`]) into units:
//! text, comments, start and end tags, and IE conditional comments. Each
//! element and attribute is checked against a [`Policy`]. What the policy
//! rejects is neutralized rather than dropped: disabled tags are escaped (or
//! renamed with a blocking prefix), rejected attributes are moved into a
//! marker comment, and removed tags leave only a marker.
//!
//! Two filters produce the same bytes for the same decisions:
//!
//! - [`TreeFilter`] builds a [`Markup`] tree first, resolving crossed tags
//!   like `<p><font>X</p></font>`, and can run subtree listeners.
//! - [`StreamFilter`] decides one unit at a time and writes to any
//!   [`std::io::Write`] sink.
//!
//! Plugin content gets its safety settings forced: every `<object>` that
//! closes normally receives the `<param>`s it did not set, and `<embed>`
//! receives them as attributes.
//!
//! ## Quick start
//!
//! ```rust
//! use xss_guard::{FilterBuilder, Policy, Sanitizer};
//!
//! // One-off, with the built-in policy:
//! assert_eq!(
//!     xss_guard::sanitize("<script></script>"),
//!     "<!-- Not Allowed Tag Filtered -->&lt;script&gt;&lt;/script&gt;"
//! );
//!
//! // Or configure a filter once and reuse it:
//! let filter = FilterBuilder::new(Policy::baseline())
//!     .with_comments(false)
//!     .build_stream();
//! assert_eq!(filter.sanitize("<b onclick=\"x()\">hi</b>"), "<b>hi</b>");
//! ```

pub mod config;
pub mod error;
pub mod escape;
pub mod filter;
pub mod grammar;
pub mod markup;
pub mod policy;
pub mod url;

pub use config::{FilterBuilder, FilterConfig};
pub use error::{Error, GrammarError, Result};
pub use filter::{FilterRegistry, Sanitizer, StreamFilter, TreeFilter};
pub use markup::Markup;
pub use policy::{
    AttributeListener, AttributeRule, ElementListener, ElementRule, ListenerRegistry, Policy,
    PolicyBuilder,
};
pub use url::{NoUrlsAllowed, PrefixAllowList, UrlAllowList};

use std::sync::OnceLock;

static BASELINE: OnceLock<TreeFilter> = OnceLock::new();

/// Sanitize `input` with a tree filter using [`Policy::baseline`] and the
/// default [`FilterConfig`].
///
/// The filter is built on first use and shared by every later call.
pub fn sanitize(input: &str) -> String {
    BASELINE
        .get_or_init(|| FilterBuilder::new(Policy::baseline()).build_tree())
        .filter(input)
}
