//! Per-unit decisions and output shared by both filters.
//!
//! The tree filter and the stream filter differ only in how they walk the
//! input; every element, attribute and leaf goes through this renderer, so
//! the bytes they write for the same decisions are identical.

use tracing::debug;

use crate::config::FilterConfig;
use crate::markup::{Attribute, Element};
use crate::policy::{
    ElementDecision, ElementRule, IE_HACK_RULE, Policy, attribute_decision, element_decision,
    end_tag_decision,
};

use super::object::ObjectGuard;

const TAG_MARKER: &str = "<!-- Not Allowed Tag Filtered -->";

pub(crate) struct Renderer<'a> {
    policy: &'a Policy,
    config: &'a FilterConfig,
}

impl<'a> Renderer<'a> {
    pub(crate) fn new(policy: &'a Policy, config: &'a FilterConfig) -> Self {
        Self { policy, config }
    }

    pub(crate) fn element_rule(&self, element: &Element) -> Option<&'a ElementRule> {
        if element.is_conditional() {
            self.policy.element_rule(IE_HACK_RULE)
        } else {
            self.policy.element_rule(element.name())
        }
    }

    /// Decide `element` and its attributes.
    ///
    /// `parent` is the name of the element it sits in. `never_closed` is only
    /// ever set by the tree filter, which knows whether an end tag followed.
    pub(crate) fn decide(
        &self,
        element: &mut Element,
        parent: Option<&str>,
        never_closed: bool,
    ) -> ElementDecision {
        let rule = self.element_rule(element);
        let mut decision = element_decision(rule, element);
        if element.is_conditional() {
            return decision;
        }

        if decision == ElementDecision::Allowed {
            if never_closed && rule.is_some_and(ElementRule::requires_end_tag) {
                debug!(element = element.name(), "end tag required but missing");
                decision = ElementDecision::Disabled;
            } else if let Some(parent_rule) = parent.and_then(|name| self.policy.element_rule(name))
            {
                if !parent_rule.allows_child(element.name()) {
                    debug!(
                        element = element.name(),
                        parent = parent_rule.name(),
                        "element not allowed as child"
                    );
                    decision = ElementDecision::Disabled;
                }
            }
            element.set_enabled(decision == ElementDecision::Allowed);
        }

        if decision != ElementDecision::Removed {
            self.decide_attributes(element, rule, decision);
        }
        decision
    }

    fn decide_attributes(
        &self,
        element: &mut Element,
        rule: Option<&ElementRule>,
        decision: ElementDecision,
    ) {
        let owner = element.name().to_string();
        for attribute in element.attributes_mut().iter_mut() {
            let listed = decision != ElementDecision::Allowed
                || rule.is_some_and(|rule| rule.allows_attribute(attribute.name()));
            if listed {
                attribute_decision(self.policy.attribute_rule(attribute.name()), attribute, &owner);
            } else {
                debug!(
                    attribute = attribute.name(),
                    element = %owner,
                    "attribute not allowed on element"
                );
                attribute.set_enabled(false);
            }
        }
    }

    /// Apply object protection to an allowed element. Returns the guard key
    /// when `element` opened an `<object>`.
    pub(crate) fn protect(
        &self,
        guard: &mut ObjectGuard<'_>,
        element: &mut Element,
        decision: ElementDecision,
    ) -> Option<usize> {
        if !self.config.protect_objects || decision != ElementDecision::Allowed {
            return None;
        }
        if element.is("param") {
            guard.param(element);
        } else if element.is("embed") {
            guard.embed(element);
        } else if element.is("object") && !element.is_self_closed() {
            return Some(guard.open());
        }
        None
    }

    pub(crate) fn start_tag(&self, element: &Element, decision: ElementDecision, out: &mut String) {
        if let Some(condition) = element.condition() {
            self.conditional_start(condition, decision, out);
            return;
        }

        match decision {
            ElementDecision::Removed => {
                self.removed_marker(element.name(), out);
            }
            ElementDecision::Disabled => {
                if !self.attribute_marker(element, out) && self.config.with_comments {
                    out.push_str(TAG_MARKER);
                }
                match &self.config.blocking_prefix {
                    Some(prefix) => {
                        out.push('<');
                        out.push_str(prefix);
                        out.push_str(element.name());
                        push_attributes(element, out);
                        out.push_str(if element.is_self_closed() { "/>" } else { ">" });
                    }
                    None => {
                        out.push_str("&lt;");
                        out.push_str(element.name());
                        for attribute in element.attributes().iter().filter(|a| a.is_enabled()) {
                            push_attribute(attribute, attribute.quote(), out);
                        }
                        out.push_str(if element.is_self_closed() { "/&gt;" } else { "&gt;" });
                    }
                }
            }
            ElementDecision::Allowed => {
                self.attribute_marker(element, out);
                out.push('<');
                out.push_str(element.name());
                push_attributes(element, out);
                out.push_str(if element.is_self_closed() { "/>" } else { ">" });
            }
        }
    }

    /// End tag of an element closed by its own end tag. `injected` params go
    /// right before it.
    pub(crate) fn end_tag(
        &self,
        name: &str,
        decision: ElementDecision,
        injected: &[(&str, &str)],
        out: &mut String,
    ) {
        for (param, value) in injected {
            out.push_str("<param name=\"");
            out.push_str(param);
            out.push_str("\" value=\"");
            out.push_str(value);
            out.push_str("\">");
        }
        match decision {
            ElementDecision::Removed => {}
            ElementDecision::Disabled => match &self.config.blocking_prefix {
                Some(prefix) => {
                    out.push_str("</");
                    out.push_str(prefix);
                    out.push_str(name);
                    out.push('>');
                }
                None => {
                    out.push_str("&lt;/");
                    out.push_str(name);
                    out.push_str("&gt;");
                }
            },
            ElementDecision::Allowed => {
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
        }
    }

    /// An end tag that closes nothing.
    pub(crate) fn stray_end_tag(&self, name: &str, out: &mut String) {
        let decision = end_tag_decision(self.policy.element_rule(name));
        self.end_tag(name, decision, &[], out);
    }

    fn conditional_start(&self, condition: &str, decision: ElementDecision, out: &mut String) {
        if decision == ElementDecision::Allowed {
            out.push_str("<!--[");
            out.push_str(condition);
            out.push_str("]>");
        } else {
            debug!(condition, "conditional comment dropped");
            self.removed_marker(IE_HACK_RULE, out);
        }
    }

    pub(crate) fn conditional_end(&self, out: &mut String) {
        if end_tag_decision(self.policy.element_rule(IE_HACK_RULE)) == ElementDecision::Allowed {
            out.push_str("<![endif]-->");
        }
    }

    pub(crate) fn text(&self, raw: &str, out: &mut String) {
        push_escaped_angles(raw, out);
    }

    pub(crate) fn comment(&self, body: &str, out: &mut String) {
        out.push_str("<!--");
        if self.config.escape_comment_markup {
            push_escaped_angles(body, out);
        } else {
            out.push_str(body);
        }
        out.push_str("-->");
    }

    fn removed_marker(&self, name: &str, out: &mut String) {
        if self.config.with_comments {
            out.push_str("<!-- Removed Tag Filtered (");
            push_escaped_angles(name, out);
            out.push_str(") -->");
        }
    }

    /// Writes the attribute marker when `element` has disabled attributes.
    /// Returns whether it had any.
    fn attribute_marker(&self, element: &Element, out: &mut String) -> bool {
        let mut disabled = element.attributes().iter().filter(|a| !a.is_enabled()).peekable();
        if disabled.peek().is_none() {
            return false;
        }
        if self.config.with_comments {
            out.push_str("<!-- Not Allowed Attribute Filtered (");
            for attribute in disabled {
                push_attribute(attribute, Some('"'), out);
            }
            out.push_str(") -->");
        }
        true
    }
}

fn push_attributes(element: &Element, out: &mut String) {
    for attribute in element.attributes().iter().filter(|a| a.is_enabled()) {
        push_attribute(attribute, attribute.quote(), out);
    }
}

/// ` name`, ` name=value` or ` name="value"`. `<` and `>` in the value are
/// always written as references: inside a normalized conditional comment a
/// raw `-->` in a live attribute would end the comment.
fn push_attribute(attribute: &Attribute, quote: Option<char>, out: &mut String) {
    out.push(' ');
    out.push_str(attribute.name());
    let Some(value) = attribute.value() else {
        return;
    };
    out.push('=');
    if let Some(quote) = quote {
        out.push(quote);
    }
    for c in value.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if quote == Some('"') => out.push_str("&quot;"),
            '\'' if quote == Some('\'') => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    if let Some(quote) = quote {
        out.push(quote);
    }
}

fn push_escaped_angles(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::AttributeRule;

    fn policy() -> Policy {
        Policy::builder()
            .element(ElementRule::new("a").allow_attributes(["href", "title"]))
            .element(ElementRule::new("ul").allow_children(["li"]))
            .element(ElementRule::new("li"))
            .element(ElementRule::new("dl").end_tag_required(true))
            .element(ElementRule::new("font").remove_tag(true))
            .attribute(AttributeRule::new("href").deny_pattern("javascript:").unwrap())
            .attribute(AttributeRule::new("title"))
            .build()
            .unwrap()
    }

    fn link(href: &str) -> Element {
        let mut a = Element::new("a");
        a.attributes_mut().push(Attribute::new("href", href));
        a
    }

    #[test]
    fn allowed_element_with_denied_attribute() {
        let (policy, config) = (policy(), FilterConfig::default());
        let renderer = Renderer::new(&policy, &config);
        let mut a = link("javascript:alert(1);");
        let decision = renderer.decide(&mut a, None, false);
        let mut out = String::new();
        renderer.start_tag(&a, decision, &mut out);
        assert_eq!(
            out,
            r#"<!-- Not Allowed Attribute Filtered ( href="javascript:alert(1);") --><a>"#
        );
    }

    #[test]
    fn unlisted_attribute_is_disabled_on_allowed_element() {
        let (policy, config) = (policy(), FilterConfig::default());
        let renderer = Renderer::new(&policy, &config);
        let mut a = link("/x");
        a.attributes_mut().push(Attribute::quoted("onclick", "go()", Some('\'')));
        let decision = renderer.decide(&mut a, None, false);
        let mut out = String::new();
        renderer.start_tag(&a, decision, &mut out);
        assert_eq!(
            out,
            r#"<!-- Not Allowed Attribute Filtered ( onclick="go()") --><a href="/x">"#
        );
    }

    #[test]
    fn disabled_element_is_escaped_with_enabled_attributes() {
        let (policy, config) = (policy(), FilterConfig::default());
        let renderer = Renderer::new(&policy, &config);
        let mut div = Element::new("div");
        div.attributes_mut().push(Attribute::new("title", "a>b"));
        let decision = renderer.decide(&mut div, None, false);
        assert_eq!(decision, ElementDecision::Disabled);
        let mut out = String::new();
        renderer.start_tag(&div, decision, &mut out);
        renderer.end_tag("div", decision, &[], &mut out);
        assert_eq!(
            out,
            r#"<!-- Not Allowed Tag Filtered -->&lt;div title="a&gt;b"&gt;&lt;/div&gt;"#
        );
    }

    #[test]
    fn allowed_attribute_value_cannot_close_a_comment() {
        let (policy, config) = (policy(), FilterConfig::default());
        let renderer = Renderer::new(&policy, &config);
        let mut a = Element::new("a");
        a.attributes_mut().push(Attribute::new("title", "--><script>x</script>"));
        a.attributes_mut().push(Attribute::quoted("href", "/a?b>c", Some('\'')));
        let decision = renderer.decide(&mut a, None, false);
        assert_eq!(decision, ElementDecision::Allowed);
        let mut out = String::new();
        renderer.start_tag(&a, decision, &mut out);
        assert_eq!(
            out,
            r#"<a title="--&gt;&lt;script&gt;x&lt;/script&gt;" href='/a?b&gt;c'>"#
        );
    }

    #[test]
    fn blocking_prefix_renames_instead_of_escaping() {
        let policy = policy();
        let config = FilterConfig {
            with_comments: false,
            blocking_prefix: Some("x_".into()),
            ..FilterConfig::default()
        };
        let renderer = Renderer::new(&policy, &config);
        let mut out = String::new();
        let mut script = Element::new("script");
        let decision = renderer.decide(&mut script, None, false);
        renderer.start_tag(&script, decision, &mut out);
        renderer.end_tag("script", decision, &[], &mut out);
        assert_eq!(out, "<x_script></x_script>");
    }

    #[test]
    fn removed_element_leaves_marker_only() {
        let (policy, config) = (policy(), FilterConfig::default());
        let renderer = Renderer::new(&policy, &config);
        let mut font = Element::new("FONT");
        font.attributes_mut().push(Attribute::new("color", "red"));
        let decision = renderer.decide(&mut font, None, false);
        let mut out = String::new();
        renderer.start_tag(&font, decision, &mut out);
        renderer.end_tag("FONT", decision, &[], &mut out);
        assert_eq!(out, "<!-- Removed Tag Filtered (FONT) -->");
    }

    #[test]
    fn structural_checks() {
        let (policy, config) = (policy(), FilterConfig::default());
        let renderer = Renderer::new(&policy, &config);
        assert_eq!(
            renderer.decide(&mut Element::new("a"), Some("ul"), false),
            ElementDecision::Disabled
        );
        assert_eq!(
            renderer.decide(&mut Element::new("li"), Some("UL"), false),
            ElementDecision::Allowed
        );
        assert_eq!(
            renderer.decide(&mut Element::new("dl"), None, true),
            ElementDecision::Disabled
        );
        assert_eq!(
            renderer.decide(&mut Element::new("dl"), None, false),
            ElementDecision::Allowed
        );
    }

    #[test]
    fn comments_and_text_escape_angles() {
        let (policy, config) = (policy(), FilterConfig::default());
        let renderer = Renderer::new(&policy, &config);
        let mut out = String::new();
        renderer.comment(" --><script> ", &mut out);
        renderer.text("a < b & c", &mut out);
        assert_eq!(out, "<!-- --&gt;&lt;script&gt; -->a &lt; b & c");
    }

    #[test]
    fn conditional_comment_without_rule_is_removed() {
        let (policy, config) = (policy(), FilterConfig::default());
        let renderer = Renderer::new(&policy, &config);
        let mut element = Element::conditional("<!--[if IE]>", "if IE");
        let decision = renderer.decide(&mut element, None, false);
        let mut out = String::new();
        renderer.start_tag(&element, decision, &mut out);
        renderer.conditional_end(&mut out);
        assert_eq!(out, "<!-- Removed Tag Filtered (IEHackExtension) -->");
    }

    #[test]
    fn injected_params_precede_end_tag() {
        let (policy, config) = (policy(), FilterConfig::default());
        let renderer = Renderer::new(&policy, &config);
        let mut out = String::new();
        renderer.end_tag("object", ElementDecision::Allowed, &[("nojava", "true")], &mut out);
        assert_eq!(out, r#"<param name="nojava" value="true"></object>"#);
    }
}
