//! Stream filter: filter unit by unit without building a tree.

use std::convert::Infallible;
use std::io::Write;
use std::sync::Arc;

use tracing::trace;

use crate::config::FilterConfig;
use crate::error::Result;
use crate::grammar::html;
use crate::markup::{OpenElements, Unit};
use crate::policy::{ElementDecision, Policy};

use super::Sanitizer;
use super::object::ObjectGuard;
use super::render::Renderer;

/// Filters input in a single pass, writing each unit as soon as it is
/// decided.
///
/// Memory use is bounded by nesting depth rather than input size. Decisions
/// are made at the start tag, so checks that need to see what follows
/// (subtree listeners, `end_tag_required`) never apply here; the allowed
/// children check uses the innermost open element as the parent.
///
/// ```
/// use xss_guard::{FilterBuilder, Policy};
///
/// let filter = FilterBuilder::new(Policy::baseline()).build_stream();
/// let mut out = Vec::new();
/// filter.filter_stream("<script>alert(1)</script>", &mut out)?;
/// assert_eq!(
///     String::from_utf8(out).unwrap(),
///     "<!-- Not Allowed Tag Filtered -->&lt;script&gt;alert(1)&lt;/script&gt;"
/// );
/// # Ok::<(), xss_guard::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct StreamFilter {
    policy: Arc<Policy>,
    config: Arc<FilterConfig>,
}

/// An element waiting for its end tag.
struct Opened {
    name: String,
    decision: ElementDecision,
    object: Option<usize>,
}

impl StreamFilter {
    pub(crate) fn new(policy: Arc<Policy>, config: Arc<FilterConfig>) -> Self {
        Self { policy, config }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Filter `input` into `sink`.
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if writing to the sink fails;
    /// whatever was written before the failure stays written.
    pub fn filter_stream<W: Write>(&self, input: &str, mut sink: W) -> Result<()> {
        self.run(input, |chunk| sink.write_all(chunk.as_bytes()))?;
        sink.flush()?;
        Ok(())
    }

    /// Filter `input` into a string.
    pub fn filter(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let Ok(()) = self.run(input, |chunk| {
            out.push_str(chunk);
            Ok::<(), Infallible>(())
        });
        out
    }

    fn run<E>(
        &self,
        input: &str,
        mut emit: impl FnMut(&str) -> std::result::Result<(), E>,
    ) -> std::result::Result<(), E> {
        let renderer = Renderer::new(&self.policy, &self.config);
        let mut guard = ObjectGuard::new(self.config.url_allow_list());
        let mut open: OpenElements<Opened> = OpenElements::new();
        let mut buf = String::new();

        for token in html().units(input) {
            buf.clear();
            let unit = Unit::from_token(&token, input);
            trace!(
                unit = token.children().first().map_or(token.name(), |inner| inner.name()),
                "stream unit"
            );
            match unit {
                Unit::Text(raw) => renderer.text(raw, &mut buf),
                Unit::Comment(body) => renderer.comment(body, &mut buf),
                Unit::ConditionalStart(mut element) => {
                    let decision = renderer.decide(&mut element, None, false);
                    renderer.start_tag(&element, decision, &mut buf);
                }
                Unit::ConditionalEnd { .. } => renderer.conditional_end(&mut buf),
                Unit::StartTag(mut element) => {
                    let parent = open.current().map(|opened| opened.name.clone());
                    let decision = renderer.decide(&mut element, parent.as_deref(), false);
                    let object = renderer.protect(&mut guard, &mut element, decision);
                    renderer.start_tag(&element, decision, &mut buf);
                    if !element.is_self_closed() {
                        open.push(
                            element.name(),
                            Opened {
                                name: element.name().to_string(),
                                decision,
                                object,
                            },
                        );
                    }
                }
                Unit::EndTag { name, .. } => match open.close(name, |_| {}) {
                    Some((opened, false)) => {
                        let injected = opened
                            .object
                            .map(|key| guard.close(key, true))
                            .unwrap_or_default();
                        renderer.end_tag(&opened.name, opened.decision, &injected, &mut buf);
                    }
                    Some((opened, true)) => {
                        if let Some(key) = opened.object {
                            guard.close(key, false);
                        }
                    }
                    None => renderer.stray_end_tag(name, &mut buf),
                },
            }
            if !buf.is_empty() {
                emit(&buf)?;
            }
        }
        if open.len() > 0 {
            trace!(unclosed = open.len(), "input ended with open elements");
        }
        Ok(())
    }
}

impl Sanitizer for StreamFilter {
    fn sanitize(&self, html: &str) -> String {
        self.filter(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FilterBuilder;
    use crate::policy::ElementRule;

    fn stream(policy: Policy) -> StreamFilter {
        FilterBuilder::new(policy).build_stream()
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("sink closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn passes_allowed_markup_through() {
        let f = stream(Policy::baseline());
        let input = "<div><p>a &amp; b</p><!-- note --></div>";
        assert_eq!(f.filter(input), input);
    }

    #[test]
    fn cross_closed_end_tag_is_dropped() {
        let f = stream(Policy::baseline());
        assert_eq!(f.filter("<p><font>X</p></font>"), "<p><font>X</p>");
    }

    #[test]
    fn end_tag_required_is_not_checked() {
        let policy = Policy::builder()
            .element(ElementRule::new("b").end_tag_required(true))
            .build()
            .unwrap();
        assert_eq!(stream(policy).filter("<b>x"), "<b>x");
    }

    #[test]
    fn allowed_children_use_open_stack() {
        let policy = Policy::builder()
            .element(ElementRule::new("ul").allow_children(["li"]))
            .element(ElementRule::new("li"))
            .element(ElementRule::new("b"))
            .build()
            .unwrap();
        assert_eq!(
            stream(policy).filter("<ul><b>b</b></ul>"),
            "<ul><!-- Not Allowed Tag Filtered -->&lt;b&gt;b&lt;/b&gt;</ul>"
        );
    }

    #[test]
    fn unclosed_object_gets_nothing_injected() {
        let f = stream(Policy::baseline());
        assert_eq!(f.filter("<object><b>x</b>"), "<object><b>x</b>");
    }

    #[test]
    fn sink_errors_surface_as_io() {
        let f = stream(Policy::baseline());
        let err = f.filter_stream("<b>x</b>", FailingSink).unwrap_err();
        assert!(matches!(err, crate::Error::Io(_)));
    }
}
