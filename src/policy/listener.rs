//! Listener callbacks attached to policy rules, and the name-to-constructor
//! registry rules use to refer to them.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::markup::{Attribute, Element, Markup, NodeId};

/// Callback run on every element whose rule lists it.
///
/// Implementations must be `Send + Sync`: one policy is shared by every
/// filter invocation.
pub trait ElementListener: Send + Sync {
    /// Inspect or rewrite the element before its attributes are evaluated.
    fn handle_element(&self, element: &mut Element);

    /// Inspect or rewrite the element's subtree. Only the tree filter calls
    /// this, before [`handle_element`](Self::handle_element).
    fn handle_subtree(&self, markup: &mut Markup, node: NodeId) {
        let _ = (markup, node);
    }
}

/// Callback run on every attribute whose rule lists it, after the allow/deny
/// decision has been stored on the attribute.
pub trait AttributeListener: Send + Sync {
    fn handle_attribute(&self, attribute: &mut Attribute);
}

type ElementFactory = Box<dyn Fn() -> Arc<dyn ElementListener> + Send + Sync>;
type AttributeFactory = Box<dyn Fn() -> Arc<dyn AttributeListener> + Send + Sync>;

/// Maps listener names to constructors.
///
/// Names are resolved once, when a [`Policy`](super::Policy) is built.
#[derive(Default)]
pub struct ListenerRegistry {
    elements: HashMap<String, ElementFactory>,
    attributes: HashMap<String, AttributeFactory>,
}

impl ListenerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the listeners shipped with this crate:
    ///
    /// - `link-rel`: [`LinkRelListener`]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_element(LinkRelListener::NAME, || LinkRelListener);
        registry
    }

    pub fn register_element<L, F>(&mut self, name: impl Into<String>, factory: F)
    where
        L: ElementListener + 'static,
        F: Fn() -> L + Send + Sync + 'static,
    {
        self.elements.insert(
            name.into(),
            Box::new(move || Arc::new(factory()) as Arc<dyn ElementListener>),
        );
    }

    pub fn register_attribute<L, F>(&mut self, name: impl Into<String>, factory: F)
    where
        L: AttributeListener + 'static,
        F: Fn() -> L + Send + Sync + 'static,
    {
        self.attributes.insert(
            name.into(),
            Box::new(move || Arc::new(factory()) as Arc<dyn AttributeListener>),
        );
    }

    /// Construct the element listener registered as `name`.
    pub fn element(&self, name: &str) -> Result<Arc<dyn ElementListener>> {
        self.elements
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| Error::UnknownListener(name.to_string()))
    }

    /// Construct the attribute listener registered as `name`.
    pub fn attribute(&self, name: &str) -> Result<Arc<dyn AttributeListener>> {
        self.attributes
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| Error::UnknownListener(name.to_string()))
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("elements", &self.elements.keys().collect::<Vec<_>>())
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Forces `rel="noopener noreferrer"` on `<a>` elements.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkRelListener;

impl LinkRelListener {
    pub const NAME: &'static str = "link-rel";
}

impl ElementListener for LinkRelListener {
    fn handle_element(&self, element: &mut Element) {
        if element.is("a") {
            element.attributes_mut().set("rel", "noopener noreferrer");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl AttributeListener for Upper {
        fn handle_attribute(&self, attribute: &mut Attribute) {
            let value = attribute.value().unwrap_or_default().to_uppercase();
            attribute.set_value(value);
        }
    }

    #[test]
    fn builtins_include_link_rel() {
        let registry = ListenerRegistry::with_builtins();
        let listener = registry.element("link-rel").unwrap();
        let mut a = Element::new("A");
        a.attributes_mut().push(Attribute::new("rel", "opener"));
        listener.handle_element(&mut a);
        assert_eq!(a.attributes().value("rel"), Some("noopener noreferrer"));

        let mut p = Element::new("p");
        listener.handle_element(&mut p);
        assert!(p.attributes().is_empty());
    }

    #[test]
    fn unknown_names_are_errors() {
        let registry = ListenerRegistry::new();
        assert!(matches!(
            registry.element("nope"),
            Err(Error::UnknownListener(name)) if name == "nope"
        ));
        assert!(registry.attribute("nope").is_err());
    }

    #[test]
    fn registered_attribute_factory_builds_listener() {
        let mut registry = ListenerRegistry::new();
        registry.register_attribute("upper", || Upper);
        let listener = registry.attribute("upper").unwrap();
        let mut attribute = Attribute::new("title", "hi");
        listener.handle_attribute(&mut attribute);
        assert_eq!(attribute.value(), Some("HI"));
    }
}
