//! Tree filter: parse the whole input, then filter the tree.

use std::sync::Arc;

use crate::config::FilterConfig;
use crate::markup::{Closing, Content, Markup, NodeId};
use crate::policy::{ElementDecision, ElementListener, Policy};

use super::Sanitizer;
use super::object::ObjectGuard;
use super::render::Renderer;

/// Filters a fully parsed [`Markup`] tree.
///
/// Because the whole tree is available, this filter can also apply the
/// checks that need to see past a start tag: subtree listeners and
/// [`end_tag_required`](crate::policy::ElementRule::end_tag_required).
///
/// ```
/// use xss_guard::{FilterBuilder, Policy};
///
/// let filter = FilterBuilder::new(Policy::baseline()).build_tree();
/// assert_eq!(
///     filter.filter("<b onclick=\"x()\">hi</b>"),
///     "<!-- Not Allowed Attribute Filtered ( onclick=\"x()\") --><b>hi</b>"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct TreeFilter {
    policy: Arc<Policy>,
    config: Arc<FilterConfig>,
}

impl TreeFilter {
    pub(crate) fn new(policy: Arc<Policy>, config: Arc<FilterConfig>) -> Self {
        Self { policy, config }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Parse and filter `input`.
    pub fn filter(&self, input: &str) -> String {
        let mut markup = Markup::parse(input);
        self.filter_markup(&mut markup)
    }

    /// Filter an already parsed tree. Decisions and listener changes are
    /// left on the tree's elements and attributes.
    pub fn filter_markup(&self, markup: &mut Markup) -> String {
        let mut walk = Walk {
            renderer: Renderer::new(&self.policy, &self.config),
            guard: ObjectGuard::new(self.config.url_allow_list()),
            out: String::new(),
        };
        for child in markup.children(markup.root_id()) {
            walk.node(markup, child);
        }
        walk.out
    }
}

impl Sanitizer for TreeFilter {
    fn sanitize(&self, html: &str) -> String {
        self.filter(html)
    }
}

struct Walk<'a> {
    renderer: Renderer<'a>,
    guard: ObjectGuard<'a>,
    out: String,
}

impl Walk<'_> {
    fn node(&mut self, markup: &mut Markup, id: NodeId) {
        let Some(node) = markup.get(id) else {
            return;
        };
        match node.value() {
            Content::Fragment => {}
            Content::Text(text) => match text.closing_kind() {
                None => self.renderer.text(text.raw(), &mut self.out),
                Some(Closing::EndTag(name)) => self.renderer.stray_end_tag(name, &mut self.out),
                Some(Closing::ConditionalEnd) => self.renderer.conditional_end(&mut self.out),
            },
            Content::Comment(body) => self.renderer.comment(body, &mut self.out),
            Content::Element(_) => self.element(markup, id),
        }
    }

    fn element(&mut self, markup: &mut Markup, id: NodeId) {
        let listeners: Vec<Arc<dyn ElementListener>> = markup
            .element(id)
            .and_then(|element| self.renderer.element_rule(element))
            .map(|rule| rule.listeners().to_vec())
            .unwrap_or_default();
        for listener in &listeners {
            listener.handle_subtree(markup, id);
        }

        let parent = markup
            .parent_element(id)
            .map(|parent| parent.name().to_string());
        let renderer = &self.renderer;
        let guard = &mut self.guard;
        let out = &mut self.out;
        let Some((decision, object, name)) = markup.update_element(id, |element| {
            let never_closed =
                !(element.is_closed() || element.is_cross_closed() || element.is_self_closed());
            let decision = renderer.decide(element, parent.as_deref(), never_closed);
            let object = renderer.protect(guard, element, decision);
            renderer.start_tag(element, decision, out);
            (decision, object, element.name().to_string())
        }) else {
            return;
        };

        for child in markup.children(id) {
            self.node(markup, child);
        }

        let Some(element) = markup.element(id) else {
            return;
        };
        self.close(element.is_closed(), element.is_cross_closed(), &name, decision, object);
    }

    fn close(
        &mut self,
        closed: bool,
        cross_closed: bool,
        name: &str,
        decision: ElementDecision,
        object: Option<usize>,
    ) {
        if closed {
            let injected = object
                .map(|key| self.guard.close(key, true))
                .unwrap_or_default();
            self.renderer.end_tag(name, decision, &injected, &mut self.out);
        } else if cross_closed {
            if let Some(key) = object {
                self.guard.close(key, false);
            }
        }
    }
}
