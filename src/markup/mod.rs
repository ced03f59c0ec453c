//! Markup tree model.
//!
//! A [`Markup`] is an arena of [`Content`] nodes (an `ego_tree::Tree`) whose
//! root is a [`Content::Fragment`]. Nodes are addressed by [`NodeId`]; each
//! node knows its parent, so no owning back-references are needed.

mod nesting;
mod parser;

pub(crate) use nesting::OpenElements;
pub(crate) use parser::Unit;

pub use ego_tree::NodeId;

use ego_tree::{NodeMut, NodeRef, Tree};
use indexmap::IndexMap;

/// Why a text leaf exists instead of a structural node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Closing {
    /// An end tag with no open element to close (the tag name as written).
    EndTag(String),
    /// The closing half of a conditional comment.
    ConditionalEnd,
}

/// A run of character data, or a construct kept as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text {
    raw: String,
    closing: Option<Closing>,
}

impl Text {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            closing: None,
        }
    }

    pub(crate) fn closing(raw: impl Into<String>, closing: Closing) -> Self {
        Self {
            raw: raw.into(),
            closing: Some(closing),
        }
    }

    /// The text exactly as it appeared in the input.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Set when this leaf stands for an end tag the parser could not match.
    pub fn closing_kind(&self) -> Option<&Closing> {
        self.closing.as_ref()
    }
}

/// A single attribute as written in a start tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    value: Option<String>,
    quote: Option<char>,
    enabled: bool,
}

impl Attribute {
    /// A double-quoted attribute.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::quoted(name, value, Some('"'))
    }

    /// An attribute with an explicit quote character, or `None` for an
    /// unquoted value.
    pub fn quoted(name: impl Into<String>, value: impl Into<String>, quote: Option<char>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            quote,
            enabled: true,
        }
    }

    /// A minimized attribute such as `disabled`.
    pub fn minimized(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            quote: None,
            enabled: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Replace the value. Unquoted and minimized attributes become
    /// double-quoted.
    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = Some(value.into());
        if self.quote.is_none() {
            self.quote = Some('"');
        }
    }

    pub fn quote(&self) -> Option<char> {
        self.quote
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

/// Attributes in source order, looked up case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    map: IndexMap<String, Attribute>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parsed attribute. A repeated name keeps the first occurrence.
    pub fn push(&mut self, attribute: Attribute) {
        self.map
            .entry(attribute.name.to_ascii_lowercase())
            .or_insert(attribute);
    }

    /// Insert or replace `name` with a double-quoted `value`, keeping the
    /// position of an existing attribute.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.map.get_mut(&name.to_ascii_lowercase()) {
            Some(existing) => existing.set_value(value),
            None => self.push(Attribute::new(name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.map.get(&name.to_ascii_lowercase())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.map.get_mut(&name.to_ascii_lowercase())
    }

    /// The value of `name`, if present and not minimized.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Attribute::value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(&name.to_ascii_lowercase())
    }

    pub fn remove(&mut self, name: &str) -> Option<Attribute> {
        self.map.shift_remove(&name.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.map.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Attribute> {
        self.map.values_mut()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// What kind of construct an [`Element`] was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    /// An ordinary start tag.
    Tag,
    /// The opening half of a conditional comment, e.g. `<!--[if IE]>`.
    /// `condition` is the text between the brackets (`if IE`).
    Conditional { condition: String },
}

/// An element and its nesting state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    kind: ElementKind,
    attributes: Attributes,
    pub(crate) enabled: bool,
    pub(crate) closed: bool,
    pub(crate) cross_closed: bool,
    pub(crate) cross_open_pending: bool,
    pub(crate) self_closed: bool,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_kind(name.into(), ElementKind::Tag)
    }

    /// A conditional comment opener. `raw` is its original spelling and
    /// becomes the fixed name of the element.
    pub fn conditional(raw: impl Into<String>, condition: impl Into<String>) -> Self {
        Self::with_kind(
            raw.into(),
            ElementKind::Conditional {
                condition: condition.into(),
            },
        )
    }

    fn with_kind(name: String, kind: ElementKind) -> Self {
        Self {
            name,
            kind,
            attributes: Attributes::new(),
            enabled: true,
            closed: false,
            cross_closed: false,
            cross_open_pending: false,
            self_closed: false,
        }
    }

    /// The tag name as written in the input.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the element. Conditional comments keep their name; returns
    /// `false` when the rename was refused.
    pub fn rename(&mut self, name: impl Into<String>) -> bool {
        if self.is_conditional() {
            return false;
        }
        self.name = name.into();
        true
    }

    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self.kind, ElementKind::Conditional { .. })
    }

    /// The bracketed condition of a conditional comment.
    pub fn condition(&self) -> Option<&str> {
        match &self.kind {
            ElementKind::Conditional { condition } => Some(condition),
            ElementKind::Tag => None,
        }
    }

    /// Returns `true` if the element's name equals `name`, ignoring ASCII case.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Closed by its own, properly nested end tag.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Closed by an end tag after an enclosing element had already closed
    /// past it. Serialized without an end tag.
    pub fn is_cross_closed(&self) -> bool {
        self.cross_closed
    }

    pub fn is_cross_open_pending(&self) -> bool {
        self.cross_open_pending
    }

    /// Written as `<name ... />`.
    pub fn is_self_closed(&self) -> bool {
        self.self_closed
    }

    pub fn set_self_closed(&mut self, self_closed: bool) {
        self.self_closed = self_closed;
    }
}

/// A node of the markup tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// The tree root.
    Fragment,
    Text(Text),
    /// An ordinary comment; holds the body between `<!--` and `-->`.
    Comment(String),
    Element(Element),
}

impl Content {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Content::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Content::Element(element) => Some(element),
            _ => None,
        }
    }
}

/// A parsed markup fragment.
///
/// ```
/// use xss_guard::markup::{Content, Markup};
///
/// let markup = Markup::parse("<p>Hello <b>world</b></p>");
/// let p = markup.root().first_child().unwrap();
/// assert_eq!(p.value().as_element().unwrap().name(), "p");
/// assert!(matches!(p.first_child().unwrap().value(), Content::Text(_)));
/// ```
#[derive(Debug, Clone)]
pub struct Markup {
    tree: Tree<Content>,
}

impl Markup {
    /// An empty fragment.
    pub fn new() -> Self {
        Self {
            tree: Tree::new(Content::Fragment),
        }
    }

    /// Parse `input` with the built-in markup grammar, repairing overlapping
    /// end tags. Never fails: unparseable input becomes text.
    pub fn parse(input: &str) -> Self {
        parser::parse(input)
    }

    pub fn tree(&self) -> &Tree<Content> {
        &self.tree
    }

    pub fn root(&self) -> NodeRef<'_, Content> {
        self.tree.root()
    }

    pub fn root_id(&self) -> NodeId {
        self.tree.root().id()
    }

    pub fn get(&self, id: NodeId) -> Option<NodeRef<'_, Content>> {
        self.tree.get(id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<NodeMut<'_, Content>> {
        self.tree.get_mut(id)
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        self.tree.get(id)?.value().as_element()
    }

    /// Run `f` on the element at `id`. Returns `None` if `id` is not an
    /// element.
    pub fn update_element<R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut Element) -> R,
    ) -> Option<R> {
        let mut node = self.tree.get_mut(id)?;
        node.value().as_element_mut().map(f)
    }

    /// The element that contains `id`, if any.
    pub fn parent_element(&self, id: NodeId) -> Option<&Element> {
        self.tree.get(id)?.parent()?.value().as_element()
    }

    /// Child ids of `id`, in order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.tree
            .get(id)
            .map(|node| node.children().map(|child| child.id()).collect())
            .unwrap_or_default()
    }

    /// Append `content` as the last child of `parent`.
    pub fn append(&mut self, parent: NodeId, content: Content) -> Option<NodeId> {
        let mut node = self.tree.get_mut(parent)?;
        Some(node.append(content).id())
    }

    /// Concatenated raw text of every text leaf below `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        let Some(node) = self.tree.get(id) else {
            return String::new();
        };
        node.descendants()
            .filter_map(|node| match node.value() {
                Content::Text(text) if text.closing.is_none() => Some(text.raw()),
                _ => None,
            })
            .collect()
    }
}

impl Default for Markup {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_keep_order_and_first_duplicate() {
        let mut attrs = Attributes::new();
        attrs.push(Attribute::new("HREF", "a"));
        attrs.push(Attribute::minimized("hidden"));
        attrs.push(Attribute::new("href", "b"));
        let names: Vec<_> = attrs.iter().map(Attribute::name).collect();
        assert_eq!(names, vec!["HREF", "hidden"]);
        assert_eq!(attrs.value("Href"), Some("a"));
        assert_eq!(attrs.value("hidden"), None);
        assert!(attrs.contains("HIDDEN"));
    }

    #[test]
    fn set_replaces_in_place() {
        let mut attrs = Attributes::new();
        attrs.push(Attribute::quoted("rel", "x", None));
        attrs.push(Attribute::new("href", "/"));
        attrs.set("REL", "noopener");
        let rel = attrs.iter().next().unwrap();
        assert_eq!(rel.value(), Some("noopener"));
        assert_eq!(rel.quote(), Some('"'));
        attrs.set("title", "t");
        assert_eq!(attrs.len(), 3);
    }

    #[test]
    fn conditional_element_refuses_rename() {
        let mut element = Element::conditional("<!--[if IE]>", "if IE");
        assert!(!element.rename("div"));
        assert_eq!(element.name(), "<!--[if IE]>");
        assert_eq!(element.condition(), Some("if IE"));

        let mut tag = Element::new("b");
        assert!(tag.rename("strong"));
        assert!(tag.is("STRONG"));
    }

    #[test]
    fn arena_tracks_parents() {
        let mut markup = Markup::new();
        let root = markup.root_id();
        let div = markup.append(root, Content::Element(Element::new("div"))).unwrap();
        let text = markup.append(div, Content::Text(Text::new("hi"))).unwrap();
        assert!(markup.parent_element(text).unwrap().is("div"));
        assert!(markup.parent_element(div).is_none());
        assert_eq!(markup.children(root), vec![div]);
        assert_eq!(markup.text_content(root), "hi");
    }

    #[test]
    fn update_element_only_touches_elements() {
        let mut markup = Markup::new();
        let root = markup.root_id();
        let b = markup.append(root, Content::Element(Element::new("b"))).unwrap();
        let t = markup.append(root, Content::Text(Text::new("x"))).unwrap();
        assert_eq!(markup.update_element(b, |e| e.set_enabled(false)), Some(()));
        assert!(!markup.element(b).unwrap().is_enabled());
        assert_eq!(markup.update_element(t, |_| ()), None);
    }
}
