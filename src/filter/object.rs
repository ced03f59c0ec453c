//! Safety settings for plugin content (`<object>`, `<param>`, `<embed>`).
//!
//! Every open `<object>` gets a frame recording which safety parameters its
//! `<param>` children already set and how `allowNetworking` resolves from the
//! URL-bearing ones. When the object closes normally, the parameters it never
//! set are written out with their safe defaults.

use tracing::debug;

use crate::markup::Element;
use crate::url::UrlAllowList;

/// Parameter names forced on plugin content, in output order.
pub const SECURITY_PARAM_NAMES: &[&str] = &[
    "invokeURLs",
    "autostart",
    "allowScriptAccess",
    "allowNetworking",
    "autoplay",
    "enablehref",
    "enablejavascript",
    "nojava",
    "AllowHtmlPopupwindow",
    "enableHtmlAccess",
];

const NETWORKING: &str = "allowNetworking";

/// Parameters whose value is a URL the plugin will load.
const URL_PARAMS: &[&str] = &["url", "href", "src", "movie"];

fn safe_default(name: &str) -> &'static str {
    match name {
        "allowScriptAccess" => "never",
        "nojava" => "true",
        _ => "false",
    }
}

fn security_index(name: &str) -> Option<usize> {
    SECURITY_PARAM_NAMES
        .iter()
        .position(|known| known.eq_ignore_ascii_case(name))
}

fn is_url_param(name: &str) -> bool {
    URL_PARAMS.iter().any(|known| known.eq_ignore_ascii_case(name))
}

/// Resolved `allowNetworking` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Networking {
    #[default]
    Internal,
    All,
}

impl Networking {
    fn as_str(self) -> &'static str {
        match self {
            Networking::Internal => "internal",
            Networking::All => "all",
        }
    }
}

#[derive(Debug)]
struct Frame {
    key: usize,
    seen: [bool; SECURITY_PARAM_NAMES.len()],
    networking: Networking,
}

/// Per-invocation object state; one per filter call.
pub(crate) struct ObjectGuard<'a> {
    allow_list: &'a dyn UrlAllowList,
    frames: Vec<Frame>,
    next_key: usize,
}

impl<'a> ObjectGuard<'a> {
    pub(crate) fn new(allow_list: &'a dyn UrlAllowList) -> Self {
        Self {
            allow_list,
            frames: Vec::new(),
            next_key: 0,
        }
    }

    fn resolve(&self, url: &str) -> Networking {
        if self.allow_list.is_allowed(url) {
            Networking::All
        } else {
            Networking::Internal
        }
    }

    /// An `<object>` opened. Returns the key to close it with.
    pub(crate) fn open(&mut self) -> usize {
        let key = self.next_key;
        self.next_key += 1;
        self.frames.push(Frame {
            key,
            seen: [false; SECURITY_PARAM_NAMES.len()],
            networking: Networking::default(),
        });
        key
    }

    /// Record a `<param>` in every open object and force its value when it
    /// names a safety parameter.
    pub(crate) fn param(&mut self, element: &mut Element) {
        let Some(name) = element.attributes().value("name").map(str::to_string) else {
            return;
        };

        if is_url_param(&name) {
            if let Some(url) = element.attributes().value("value") {
                let networking = self.resolve(url);
                for frame in &mut self.frames {
                    frame.networking = networking;
                }
            }
        }

        let Some(index) = security_index(&name) else {
            return;
        };
        for frame in &mut self.frames {
            frame.seen[index] = true;
        }
        let canonical = SECURITY_PARAM_NAMES[index];
        let forced = if canonical == NETWORKING {
            self.frames
                .last()
                .map_or(Networking::Internal, |frame| frame.networking)
                .as_str()
        } else {
            safe_default(canonical)
        };
        let attributes = element.attributes_mut();
        attributes.set("value", forced);
        if let Some(value) = attributes.get_mut("value") {
            value.set_enabled(true);
        }
    }

    /// Put every safety setting on an `<embed>` as an attribute.
    pub(crate) fn embed(&self, element: &mut Element) {
        let networking = element
            .attributes()
            .value("src")
            .map_or(Networking::Internal, |src| self.resolve(src));
        let attributes = element.attributes_mut();
        for &name in SECURITY_PARAM_NAMES {
            let value = if name == NETWORKING {
                networking.as_str()
            } else {
                safe_default(name)
            };
            attributes.set(name, value);
            if let Some(attribute) = attributes.get_mut(name) {
                attribute.set_enabled(true);
            }
        }
    }

    /// The object opened as `key` closed. With `inject`, returns the
    /// `(name, value)` pairs of the safety parameters it never set.
    pub(crate) fn close(&mut self, key: usize, inject: bool) -> Vec<(&'static str, &'static str)> {
        let Some(index) = self.frames.iter().rposition(|frame| frame.key == key) else {
            return Vec::new();
        };
        let frame = self.frames.remove(index);
        if !inject {
            return Vec::new();
        }
        let missing: Vec<_> = SECURITY_PARAM_NAMES
            .iter()
            .zip(frame.seen)
            .filter(|(_, seen)| !seen)
            .map(|(&name, _)| {
                let value = if name == NETWORKING {
                    frame.networking.as_str()
                } else {
                    safe_default(name)
                };
                (name, value)
            })
            .collect();
        if !missing.is_empty() {
            debug!(count = missing.len(), "injecting safety params into object");
        }
        missing
    }
}
