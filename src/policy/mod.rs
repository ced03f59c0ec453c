//! Security policy: which elements and attributes may pass, and how.
//!
//! A [`Policy`] is an immutable set of [`ElementRule`]s and
//! [`AttributeRule`]s keyed by lowercase name. It is built once with a
//! [`PolicyBuilder`], where patterns are compiled and listener names are
//! resolved, and then shared read-only by any number of filters.

mod evaluate;
mod listener;

pub use evaluate::{ElementDecision, attribute_decision, element_decision, end_tag_decision};
pub use listener::{AttributeListener, ElementListener, LinkRelListener, ListenerRegistry};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use regex::Regex;

use crate::error::Result;

/// Rule name that governs conditional comments (`<!--[if IE]>` ... `<![endif]-->`).
pub const IE_HACK_RULE: &str = "IEHackExtension";

/// How an element may appear in the output.
#[derive(Clone)]
pub struct ElementRule {
    name: String,
    disabled: bool,
    remove_tag: bool,
    end_tag_required: bool,
    override_existing: bool,
    allowed_attributes: HashSet<String>,
    allowed_children: HashSet<String>,
    listeners: Vec<Arc<dyn ElementListener>>,
    listener_names: Vec<String>,
}

impl ElementRule {
    /// An enabled rule for `name` that allows no attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            disabled: false,
            remove_tag: false,
            end_tag_required: false,
            override_existing: true,
            allowed_attributes: HashSet::new(),
            allowed_children: HashSet::new(),
            listeners: Vec::new(),
            listener_names: Vec::new(),
        }
    }

    /// Keep the element in the output but neutralize it.
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Drop the element's tags from the output. Takes precedence over
    /// [`disabled`](Self::disabled).
    pub fn remove_tag(mut self, remove: bool) -> Self {
        self.remove_tag = remove;
        self
    }

    /// Disable the element when it never receives an end tag. Only the tree
    /// filter can check this.
    pub fn end_tag_required(mut self, required: bool) -> Self {
        self.end_tag_required = required;
        self
    }

    /// With `false`, a later rule for the same name is merged into an earlier
    /// one instead of replacing it.
    pub fn override_existing(mut self, replace: bool) -> Self {
        self.override_existing = replace;
        self
    }

    pub fn allow_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_attributes
            .extend(names.into_iter().map(|name| name.as_ref().to_ascii_lowercase()));
        self
    }

    /// Restrict which elements may appear directly inside this one.
    /// Unrestricted when empty.
    pub fn allow_children<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_children
            .extend(names.into_iter().map(|name| name.as_ref().to_ascii_lowercase()));
        self
    }

    pub fn listener(mut self, listener: impl ElementListener + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Attach a listener from the [`ListenerRegistry`] by name. Resolved in
    /// [`PolicyBuilder::build`].
    pub fn listener_named(mut self, name: impl Into<String>) -> Self {
        self.listener_names.push(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn removes_tag(&self) -> bool {
        self.remove_tag
    }

    pub fn requires_end_tag(&self) -> bool {
        self.end_tag_required
    }

    pub fn allows_attribute(&self, name: &str) -> bool {
        self.allowed_attributes.contains(&name.to_ascii_lowercase())
    }

    pub fn allows_child(&self, name: &str) -> bool {
        self.allowed_children.is_empty()
            || self.allowed_children.contains(&name.to_ascii_lowercase())
    }

    pub fn listeners(&self) -> &[Arc<dyn ElementListener>] {
        &self.listeners
    }

    fn merge(&mut self, other: ElementRule) {
        self.allowed_attributes.extend(other.allowed_attributes);
        self.allowed_children.extend(other.allowed_children);
        self.listeners.extend(other.listeners);
    }
}

impl std::fmt::Debug for ElementRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementRule")
            .field("name", &self.name)
            .field("disabled", &self.disabled)
            .field("remove_tag", &self.remove_tag)
            .field("end_tag_required", &self.end_tag_required)
            .field("allowed_attributes", &self.allowed_attributes)
            .field("allowed_children", &self.allowed_children)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// How an attribute and its value may appear in the output.
#[derive(Clone)]
pub struct AttributeRule {
    name: String,
    disabled: bool,
    override_existing: bool,
    allowed: Vec<Regex>,
    denied: Vec<Regex>,
    base64_decode: bool,
    exception_tags: HashSet<String>,
    listeners: Vec<Arc<dyn AttributeListener>>,
    listener_names: Vec<String>,
}

impl AttributeRule {
    /// An enabled rule for `name` that accepts any value.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            disabled: false,
            override_existing: true,
            allowed: Vec::new(),
            denied: Vec::new(),
            base64_decode: false,
            exception_tags: HashSet::new(),
            listeners: Vec::new(),
            listener_names: Vec::new(),
        }
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// See [`ElementRule::override_existing`].
    pub fn override_existing(mut self, replace: bool) -> Self {
        self.override_existing = replace;
        self
    }

    /// Accept only values that match one allowed pattern in full.
    ///
    /// Returns an error if `pattern` is not a valid regex.
    pub fn allow_pattern(mut self, pattern: &str) -> Result<Self> {
        self.allowed.push(Regex::new(&format!("^(?:{pattern})$"))?);
        Ok(self)
    }

    /// Reject values that contain a match for `pattern` anywhere. Ignored when
    /// the rule has allowed patterns.
    ///
    /// Returns an error if `pattern` is not a valid regex.
    pub fn deny_pattern(mut self, pattern: &str) -> Result<Self> {
        self.denied.push(Regex::new(pattern)?);
        Ok(self)
    }

    /// Decode `data:...;base64,` payloads before matching.
    pub fn base64_decode(mut self, decode: bool) -> Self {
        self.base64_decode = decode;
        self
    }

    /// Elements on which [`disabled`](Self::disabled) is ignored. Value
    /// patterns still apply.
    pub fn exception_tags<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.exception_tags
            .extend(names.into_iter().map(|name| name.as_ref().to_ascii_lowercase()));
        self
    }

    pub fn listener(mut self, listener: impl AttributeListener + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Attach a listener from the [`ListenerRegistry`] by name.
    pub fn listener_named(mut self, name: impl Into<String>) -> Self {
        self.listener_names.push(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn allowed_patterns(&self) -> &[Regex] {
        &self.allowed
    }

    pub fn denied_patterns(&self) -> &[Regex] {
        &self.denied
    }

    pub fn decodes_base64(&self) -> bool {
        self.base64_decode
    }

    pub fn is_exception(&self, tag: &str) -> bool {
        self.exception_tags.contains(&tag.to_ascii_lowercase())
    }

    pub fn listeners(&self) -> &[Arc<dyn AttributeListener>] {
        &self.listeners
    }

    fn merge(&mut self, other: AttributeRule) {
        self.allowed.extend(other.allowed);
        self.denied.extend(other.denied);
        self.exception_tags.extend(other.exception_tags);
        self.listeners.extend(other.listeners);
    }
}

impl std::fmt::Debug for AttributeRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeRule")
            .field("name", &self.name)
            .field("disabled", &self.disabled)
            .field("allowed", &self.allowed)
            .field("denied", &self.denied)
            .field("base64_decode", &self.base64_decode)
            .field("exception_tags", &self.exception_tags)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// An immutable, case-insensitive rule set.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    elements: HashMap<String, ElementRule>,
    attributes: HashMap<String, AttributeRule>,
}

impl Policy {
    pub fn builder() -> PolicyBuilder {
        PolicyBuilder::new()
    }

    /// The rule for element `name`, ignoring ASCII case.
    pub fn element_rule(&self, name: &str) -> Option<&ElementRule> {
        self.elements.get(&name.to_ascii_lowercase())
    }

    /// The rule for attribute `name`, ignoring ASCII case.
    pub fn attribute_rule(&self, name: &str) -> Option<&AttributeRule> {
        self.attributes.get(&name.to_ascii_lowercase())
    }

    /// A general-purpose policy for user-supplied rich text.
    ///
    /// Allows common structure and formatting elements with presentational
    /// attributes, `<a>` and `<img>` with script-free URLs, `object`/`param`/
    /// `embed` (so the object guard applies), and conditional comments. Has no
    /// rule for `script`, `style`, frames, forms, `meta`/`base`/`link`, or any
    /// event-handler attribute, so those are always neutralized.
    ///
    /// # Panics
    ///
    /// Panics if one of the built-in patterns fails to compile.
    pub fn baseline() -> Self {
        baseline_builder()
            .and_then(PolicyBuilder::build)
            .expect("baseline policy must build")
    }
}

/// Collects rules and resolves them into a [`Policy`].
///
/// Rules for the same name: the later one replaces the earlier, unless it
/// was created with `override_existing(false)`, in which case its sets,
/// patterns and listeners are added to the earlier rule.
///
/// # Example
///
/// ```
/// use xss_guard::policy::{AttributeRule, ElementRule, Policy};
///
/// let policy = Policy::builder()
///     .element(ElementRule::new("a").allow_attributes(["href"]))
///     .attribute(AttributeRule::new("href").deny_pattern("(?i)javascript:")?)
///     .build()?;
/// assert!(policy.element_rule("A").is_some());
/// # Ok::<(), xss_guard::Error>(())
/// ```
#[derive(Debug)]
pub struct PolicyBuilder {
    elements: Vec<ElementRule>,
    attributes: Vec<AttributeRule>,
    registry: ListenerRegistry,
}

impl PolicyBuilder {
    /// An empty builder resolving listener names against
    /// [`ListenerRegistry::with_builtins`].
    pub fn new() -> Self {
        Self {
            elements: Vec::new(),
            attributes: Vec::new(),
            registry: ListenerRegistry::with_builtins(),
        }
    }

    /// Resolve listener names against `registry` instead of the built-ins.
    pub fn listeners(mut self, registry: ListenerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn element(mut self, rule: ElementRule) -> Self {
        self.elements.push(rule);
        self
    }

    pub fn attribute(mut self, rule: AttributeRule) -> Self {
        self.attributes.push(rule);
        self
    }

    /// Resolve listener names and duplicate rules.
    ///
    /// Returns [`Error::UnknownListener`](crate::Error::UnknownListener) if a
    /// rule names a listener the registry does not know.
    pub fn build(self) -> Result<Policy> {
        let mut elements: HashMap<String, ElementRule> = HashMap::new();
        for mut rule in self.elements {
            for name in std::mem::take(&mut rule.listener_names) {
                rule.listeners.push(self.registry.element(&name)?);
            }
            let key = rule.name.to_ascii_lowercase();
            match elements.get_mut(&key) {
                Some(existing) if !rule.override_existing => existing.merge(rule),
                _ => {
                    elements.insert(key, rule);
                }
            }
        }

        let mut attributes: HashMap<String, AttributeRule> = HashMap::new();
        for mut rule in self.attributes {
            for name in std::mem::take(&mut rule.listener_names) {
                rule.listeners.push(self.registry.attribute(&name)?);
            }
            let key = rule.name.to_ascii_lowercase();
            match attributes.get_mut(&key) {
                Some(existing) if !rule.override_existing => existing.merge(rule),
                _ => {
                    attributes.insert(key, rule);
                }
            }
        }

        Ok(Policy {
            elements,
            attributes,
        })
    }
}

impl Default for PolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

const GLOBAL_ATTRIBUTES: &[&str] = &["class", "id", "title", "dir", "lang", "style", "align"];

const TEXT_ELEMENTS: &[&str] = &[
    "abbr", "address", "b", "bdi", "bdo", "big", "blockquote", "br", "caption", "center", "cite",
    "code", "col", "colgroup", "dd", "del", "dfn", "div", "dl", "dt", "em", "figcaption", "figure",
    "font", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "i", "ins", "kbd", "li", "mark", "ol", "p",
    "pre", "q", "s", "samp", "small", "span", "strike", "strong", "sub", "sup", "table", "tbody",
    "td", "tfoot", "th", "thead", "tr", "tt", "u", "ul", "var",
];

const PRESENTATION_ATTRIBUTES: &[&str] = &[
    "width", "height", "border", "cellpadding", "cellspacing", "colspan", "rowspan", "valign",
    "bgcolor", "color", "face", "size", "start", "type", "cite", "datetime", "span",
];

const SCRIPT_URL: &str = r"(?i)^[\x00-\x20]*(?:j\s*a\s*v\s*a|v\s*b|l\s*i\s*v\s*e)\s*s\s*c\s*r\s*i\s*p\s*t\s*:|data:\s*text/html|<\s*script";

fn baseline_builder() -> Result<PolicyBuilder> {
    let mut builder = Policy::builder();
    for name in TEXT_ELEMENTS {
        builder = builder.element(
            ElementRule::new(*name)
                .allow_attributes(GLOBAL_ATTRIBUTES)
                .allow_attributes(PRESENTATION_ATTRIBUTES),
        );
    }
    builder = builder
        .element(
            ElementRule::new("a")
                .allow_attributes(GLOBAL_ATTRIBUTES)
                .allow_attributes(["href", "name", "target", "rel"])
                .listener_named(LinkRelListener::NAME),
        )
        .element(
            ElementRule::new("img")
                .allow_attributes(GLOBAL_ATTRIBUTES)
                .allow_attributes(PRESENTATION_ATTRIBUTES)
                .allow_attributes(["src", "alt"]),
        )
        .element(
            ElementRule::new("object")
                .allow_attributes(GLOBAL_ATTRIBUTES)
                .allow_attributes(["width", "height", "data", "type", "classid"]),
        )
        .element(ElementRule::new("param").allow_attributes(["name", "value"]))
        .element(
            ElementRule::new("embed")
                .allow_attributes(["src", "type", "width", "height"])
                .allow_attributes(crate::filter::SECURITY_PARAM_NAMES),
        )
        .element(ElementRule::new(IE_HACK_RULE));

    let plain = GLOBAL_ATTRIBUTES
        .iter()
        .chain(PRESENTATION_ATTRIBUTES)
        .chain(&["name", "target", "rel", "alt"])
        .chain(crate::filter::SECURITY_PARAM_NAMES)
        .filter(|name| **name != "style");
    for name in plain {
        builder = builder.attribute(AttributeRule::new(*name));
    }
    for name in ["href", "src", "data", "classid", "value"] {
        builder = builder.attribute(
            AttributeRule::new(name)
                .base64_decode(true)
                .deny_pattern(SCRIPT_URL)?,
        );
    }
    Ok(builder.attribute(
        AttributeRule::new("style")
            .deny_pattern(r"(?i)expression\s*\(")?
            .deny_pattern(r"(?i)(?:java|vb)script:")?
            .deny_pattern(r"(?i)url\s*\(")?,
    ))
}
