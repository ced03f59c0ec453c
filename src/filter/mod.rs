//! Filters that turn untrusted markup into safe markup.
//!
//! Two strategies share one renderer, so the same decisions always produce
//! the same bytes:
//!
//! - [`TreeFilter`] -- parses the whole input into a [`Markup`](crate::markup::Markup)
//!   tree first, which enables subtree listeners and end-tag checks.
//! - [`StreamFilter`] -- decides unit by unit and writes to a sink as it goes.
//!
//! Both implement [`Sanitizer`], and [`FilterRegistry`] keeps named filters
//! built once and shared.

mod object;
mod registry;
mod render;
mod stream;
mod tree;

pub use object::SECURITY_PARAM_NAMES;
pub use registry::FilterRegistry;
pub use stream::StreamFilter;
pub use tree::TreeFilter;

/// What [`TreeFilter`] and [`StreamFilter`] have in common: untrusted markup
/// in, markup fit for embedding out.
///
/// Callers that pick a filter at runtime hold a `Box<dyn Sanitizer>` or an
/// `Arc` of one and share it between threads.
pub trait Sanitizer: Send + Sync {
    /// Filter `input` and return the rewritten markup.
    fn sanitize(&self, html: &str) -> String;
}

impl<S: Sanitizer + ?Sized> Sanitizer for std::sync::Arc<S> {
    fn sanitize(&self, html: &str) -> String {
        (**self).sanitize(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FilterBuilder, Policy};

    #[test]
    fn both_filters_are_interchangeable() {
        let filters: Vec<Box<dyn Sanitizer>> = vec![
            Box::new(FilterBuilder::new(Policy::baseline()).build_tree()),
            Box::new(FilterBuilder::new(Policy::baseline()).build_stream()),
        ];
        for filter in &filters {
            assert_eq!(
                filter.sanitize("<b>ok</b><iframe>"),
                "<b>ok</b><!-- Not Allowed Tag Filtered -->&lt;iframe&gt;"
            );
        }
    }

    #[test]
    fn shared_filter_sanitizes_through_arc() {
        let shared = std::sync::Arc::new(FilterBuilder::new(Policy::baseline()).build_tree());
        assert_eq!(shared.sanitize("<i>x</i>"), "<i>x</i>");
    }
}
