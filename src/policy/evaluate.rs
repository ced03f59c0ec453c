//! Element and attribute decisions.
//!
//! These functions never touch shared state: everything they change lives
//! on the element or attribute passed in.

use std::borrow::Cow;

use base64::Engine;
use tracing::debug;

use crate::escape::unescape;
use crate::markup::{Attribute, Element};

use super::{AttributeRule, ElementRule};

/// What a filter does with an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementDecision {
    /// Written as live markup.
    Allowed,
    /// Kept in the output but neutralized (escaped or prefixed).
    Disabled,
    /// Tags dropped; content is still filtered and written.
    Removed,
}

/// Decide what happens to `element` under `rule`.
///
/// No rule means [`Disabled`](ElementDecision::Disabled). `remove_tag` wins
/// over `disabled`. Unless the element is removed, the rule's listeners then
/// run on it. The result is also stored in the element's enabled flag.
pub fn element_decision(rule: Option<&ElementRule>, element: &mut Element) -> ElementDecision {
    let Some(rule) = rule else {
        debug!(element = element.name(), "no rule, element disabled");
        element.set_enabled(false);
        return ElementDecision::Disabled;
    };

    let decision = if rule.removes_tag() {
        ElementDecision::Removed
    } else if rule.is_disabled() {
        ElementDecision::Disabled
    } else {
        ElementDecision::Allowed
    };

    match decision {
        ElementDecision::Removed => debug!(element = element.name(), "element removed by rule"),
        ElementDecision::Disabled => debug!(element = element.name(), "element disabled by rule"),
        ElementDecision::Allowed => {}
    }

    if decision != ElementDecision::Removed {
        for listener in rule.listeners() {
            listener.handle_element(element);
        }
    }
    element.set_enabled(decision == ElementDecision::Allowed);
    decision
}

/// Decide an end tag that closes nothing.
pub fn end_tag_decision(rule: Option<&ElementRule>) -> ElementDecision {
    match rule {
        None => ElementDecision::Disabled,
        Some(rule) if rule.removes_tag() => ElementDecision::Removed,
        Some(rule) if rule.is_disabled() => ElementDecision::Disabled,
        Some(_) => ElementDecision::Allowed,
    }
}

/// Decide whether `attribute` may stay on an element named `owner`.
///
/// No rule means disabled. The rule's `disabled` flag is skipped for its
/// exception tags. The value (entity-decoded, and base64-decoded when the
/// rule asks for it) must then fully match one allowed pattern, or, with no
/// allowed patterns, contain no denied pattern. Listeners run last and see
/// the decision on the attribute's enabled flag; the returned value is that
/// flag after they ran.
pub fn attribute_decision(
    rule: Option<&AttributeRule>,
    attribute: &mut Attribute,
    owner: &str,
) -> bool {
    let Some(rule) = rule else {
        debug!(attribute = attribute.name(), element = owner, "no rule, attribute disabled");
        attribute.set_enabled(false);
        return false;
    };

    let allowed = if rule.is_disabled() && !rule.is_exception(owner) {
        false
    } else {
        value_allowed(rule, attribute.value().unwrap_or_default())
    };
    if !allowed {
        debug!(attribute = attribute.name(), element = owner, "attribute disabled by rule");
    }
    attribute.set_enabled(allowed);

    for listener in rule.listeners() {
        listener.handle_attribute(attribute);
    }
    attribute.is_enabled()
}

fn value_allowed(rule: &AttributeRule, value: &str) -> bool {
    let decoded = unescape(value);
    let candidate = if rule.decodes_base64() {
        decode_data_url(&decoded).map_or(decoded, Cow::Owned)
    } else {
        decoded
    };

    if !rule.allowed_patterns().is_empty() {
        rule.allowed_patterns()
            .iter()
            .any(|pattern| pattern.is_match(&candidate))
    } else {
        !rule
            .denied_patterns()
            .iter()
            .any(|pattern| pattern.is_match(&candidate))
    }
}

/// `data:text/html;base64,PHNjcmlwdD4=` becomes `data:text/html;base64,<script>`.
/// Returns `None` when the value is not base64-encoded or does not decode.
fn decode_data_url(value: &str) -> Option<String> {
    let (metadata, payload) = value.split_once(',')?;
    if !metadata.trim_end().to_ascii_lowercase().ends_with("base64") {
        return None;
    }
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .ok()?;
    Some(format!("{metadata},{}", String::from_utf8_lossy(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{AttributeListener, ElementListener};

    struct Marker;

    impl ElementListener for Marker {
        fn handle_element(&self, element: &mut Element) {
            element.attributes_mut().set("data-seen", "1");
        }
    }

    struct Reenable;

    impl AttributeListener for Reenable {
        fn handle_attribute(&self, attribute: &mut Attribute) {
            attribute.set_value("#");
            attribute.set_enabled(true);
        }
    }

    #[test]
    fn missing_rule_disables() {
        let mut element = Element::new("script");
        assert_eq!(element_decision(None, &mut element), ElementDecision::Disabled);
        assert!(!element.is_enabled());

        let mut attribute = Attribute::new("onclick", "x()");
        assert!(!attribute_decision(None, &mut attribute, "a"));
        assert!(!attribute.is_enabled());
    }

    #[test]
    fn removal_takes_precedence_and_skips_listeners() {
        let rule = ElementRule::new("font").disabled(true).remove_tag(true).listener(Marker);
        let mut element = Element::new("font");
        assert_eq!(element_decision(Some(&rule), &mut element), ElementDecision::Removed);
        assert!(element.attributes().is_empty());
    }

    #[test]
    fn listeners_run_on_disabled_and_allowed() {
        let disabled = ElementRule::new("x").disabled(true).listener(Marker);
        let mut element = Element::new("x");
        assert_eq!(element_decision(Some(&disabled), &mut element), ElementDecision::Disabled);
        assert!(element.attributes().contains("data-seen"));

        let allowed = ElementRule::new("x").listener(Marker);
        let mut element = Element::new("x");
        assert_eq!(element_decision(Some(&allowed), &mut element), ElementDecision::Allowed);
        assert!(element.is_enabled());
        assert!(element.attributes().contains("data-seen"));
    }

    #[test]
    fn stray_end_tag_follows_rule_flags() {
        assert_eq!(end_tag_decision(None), ElementDecision::Disabled);
        assert_eq!(
            end_tag_decision(Some(&ElementRule::new("b").remove_tag(true))),
            ElementDecision::Removed
        );
        assert_eq!(end_tag_decision(Some(&ElementRule::new("b"))), ElementDecision::Allowed);
    }

    #[test]
    fn exception_tags_skip_disabled_flag_only() {
        let rule = AttributeRule::new("target")
            .disabled(true)
            .exception_tags(["A"])
            .deny_pattern("_top")
            .unwrap();
        assert!(!attribute_decision(Some(&rule), &mut Attribute::new("target", "_blank"), "div"));
        assert!(attribute_decision(Some(&rule), &mut Attribute::new("target", "_blank"), "a"));
        assert!(!attribute_decision(Some(&rule), &mut Attribute::new("target", "_top"), "a"));
    }

    #[test]
    fn allowed_patterns_must_match_fully() {
        let rule = AttributeRule::new("width").allow_pattern("[0-9]+").unwrap();
        assert!(attribute_decision(Some(&rule), &mut Attribute::new("width", "100"), "img"));
        assert!(!attribute_decision(Some(&rule), &mut Attribute::new("width", "100px"), "img"));
    }

    #[test]
    fn allowed_patterns_take_precedence_over_denied() {
        let rule = AttributeRule::new("href")
            .allow_pattern("https://.*")
            .unwrap()
            .deny_pattern("evil")
            .unwrap();
        assert!(attribute_decision(Some(&rule), &mut Attribute::new("href", "https://evil.test"), "a"));
        assert!(!attribute_decision(Some(&rule), &mut Attribute::new("href", "ftp://ok"), "a"));
    }

    #[test]
    fn denied_patterns_search_substrings() {
        let rule = AttributeRule::new("href").deny_pattern("(?i)javascript:").unwrap();
        assert!(!attribute_decision(Some(&rule), &mut Attribute::new("href", " JavaScript:x"), "a"));
        assert!(attribute_decision(Some(&rule), &mut Attribute::new("href", "/x"), "a"));
    }

    #[test]
    fn entities_are_decoded_before_matching() {
        let rule = AttributeRule::new("href").deny_pattern("javascript:").unwrap();
        let mut attribute = Attribute::new("href", "&#106;avascript&colon;alert(1)");
        assert!(!attribute_decision(Some(&rule), &mut attribute, "a"));
    }

    #[test]
    fn base64_payloads_are_decoded_when_asked() {
        // "<script>alert(1)</script>"
        let value = "data:text/plain;base64,PHNjcmlwdD5hbGVydCgxKTwvc2NyaXB0Pg==";
        let plain = AttributeRule::new("src").deny_pattern("<script").unwrap();
        assert!(attribute_decision(Some(&plain), &mut Attribute::new("src", value), "img"));
        let decoding = plain.base64_decode(true);
        assert!(!attribute_decision(Some(&decoding), &mut Attribute::new("src", value), "img"));
    }

    #[test]
    fn undecodable_payload_matches_as_written() {
        assert_eq!(decode_data_url("data:x;base64,@@@"), None);
        assert_eq!(decode_data_url("data:text/plain,hello"), None);
        assert_eq!(
            decode_data_url("data:x;BASE64,aGk="),
            Some("data:x;BASE64,hi".to_string())
        );
    }

    #[test]
    fn attribute_listeners_see_decision_and_may_override() {
        let rule = AttributeRule::new("href")
            .deny_pattern("javascript:")
            .unwrap()
            .listener(Reenable);
        let mut attribute = Attribute::new("href", "javascript:x");
        assert!(attribute_decision(Some(&rule), &mut attribute, "a"));
        assert_eq!(attribute.value(), Some("#"));
    }
}
