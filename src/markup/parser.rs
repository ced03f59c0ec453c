//! Tree parser: builds a [`Markup`] from the markup grammar's tokens.
//!
//! Nodes are appended flat under the root as they are seen; when an end tag
//! closes an element, every node after it at its level is moved into it. An
//! element that never sees its end tag therefore keeps no children and its
//! would-be content stays at the level it was opened in.

use tracing::trace;

use crate::grammar::{Token, html, names};

use super::{Attribute, Closing, Content, Element, Markup, NodeId, OpenElements, Text};

/// One logical unit of markup, decoded from a `unit` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Unit<'i> {
    Text(&'i str),
    /// Body of an ordinary comment.
    Comment(&'i str),
    StartTag(Element),
    EndTag { name: &'i str, raw: &'i str },
    ConditionalStart(Element),
    ConditionalEnd { raw: &'i str },
}

impl<'i> Unit<'i> {
    /// Decode a `unit` token (or an unmatched remainder) matched against `input`.
    pub(crate) fn from_token(token: &Token<'_>, input: &'i str) -> Self {
        let Some(inner) = token.children().first() else {
            return Unit::Text(token.text(input));
        };
        let raw = inner.text(input);
        match inner.name() {
            names::COMMENT => Unit::Comment(
                inner
                    .child(names::COMMENT_BODY)
                    .map_or("", |body| body.text(input)),
            ),
            names::START_TAG => Unit::StartTag(start_tag(inner, input)),
            names::END_TAG => Unit::EndTag {
                name: inner
                    .child(names::TAG_NAME)
                    .map_or("", |name| name.text(input)),
                raw,
            },
            names::IE_HACK_START => {
                let condition = inner
                    .child(names::IE_CONDITION)
                    .map_or("", |condition| condition.text(input));
                Unit::ConditionalStart(Element::conditional(raw, condition))
            }
            names::IE_HACK_END => Unit::ConditionalEnd { raw },
            _ => Unit::Text(raw),
        }
    }
}

fn start_tag(token: &Token<'_>, input: &str) -> Element {
    let name = token
        .child(names::TAG_NAME)
        .map_or("", |name| name.text(input));
    let mut element = Element::new(name);
    for attribute in token.children_named(names::ATTRIBUTE) {
        let name = attribute
            .child(names::ATTR_NAME)
            .map_or("", |name| name.text(input));
        let value = attribute
            .child(names::ATTR_VALUE)
            .and_then(|value| value.children().first());
        let parsed = match value {
            Some(value) => {
                let quote = match value.name() {
                    names::DOUBLE_QUOTED => Some('"'),
                    names::SINGLE_QUOTED => Some('\''),
                    _ => None,
                };
                Attribute::quoted(name, value.text(input), quote)
            }
            None => Attribute::minimized(name),
        };
        element.attributes_mut().push(parsed);
    }
    element.self_closed = token.child(names::SELF_CLOSE).is_some();
    element
}

pub(super) fn parse(input: &str) -> Markup {
    let mut builder = TreeBuilder::new();
    let document = html().document(input);
    let mut end = 0;
    if let Some(document) = &document {
        for unit in document.children() {
            builder.unit(Unit::from_token(unit, input));
        }
        end = document.span().end();
    }
    if end < input.len() {
        builder.unit(Unit::Text(&input[end..]));
    }
    builder.markup
}

struct TreeBuilder {
    markup: Markup,
    open: OpenElements<NodeId>,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            markup: Markup::new(),
            open: OpenElements::new(),
        }
    }

    fn append(&mut self, content: Content) -> Option<NodeId> {
        let root = self.markup.root_id();
        self.markup.append(root, content)
    }

    fn unit(&mut self, unit: Unit<'_>) {
        match unit {
            Unit::Text(raw) => {
                self.append(Content::Text(Text::new(raw)));
            }
            Unit::Comment(body) => {
                self.append(Content::Comment(body.to_string()));
            }
            Unit::StartTag(element) => {
                let name = element.name().to_string();
                let self_closed = element.is_self_closed();
                if let Some(id) = self.append(Content::Element(element)) {
                    if !self_closed {
                        self.open.push(&name, id);
                    }
                }
            }
            Unit::ConditionalStart(element) => {
                self.append(Content::Element(element));
            }
            Unit::ConditionalEnd { raw } => {
                self.append(Content::Text(Text::closing(raw, Closing::ConditionalEnd)));
            }
            Unit::EndTag { name, raw } => self.end_tag(name, raw),
        }
    }

    fn end_tag(&mut self, name: &str, raw: &str) {
        let mut skipped = Vec::new();
        let Some((id, cross)) = self.open.close(name, |id| skipped.push(*id)) else {
            trace!(element = name, "end tag without open element kept as text");
            self.append(Content::Text(Text::closing(
                raw,
                Closing::EndTag(name.to_string()),
            )));
            return;
        };

        for pending in skipped {
            self.markup
                .update_element(pending, |element| element.cross_open_pending = true);
        }

        let mut following = Vec::new();
        let mut next = self.markup.get(id).and_then(|node| node.next_sibling());
        while let Some(node) = next {
            following.push(node.id());
            next = node.next_sibling();
        }
        if let Some(mut node) = self.markup.get_mut(id) {
            for child in following {
                node.append_id(child);
            }
        }

        self.markup.update_element(id, |element| {
            element.cross_open_pending = false;
            if cross {
                element.cross_closed = true;
            } else {
                element.closed = true;
            }
        });
        trace!(element = name, cross, "closed");
    }
}
