//! Open-element stack with cross-tag bookkeeping.
//!
//! Shared by the tree parser and the stream filter so that both resolve end
//! tags the same way.

use tracing::trace;

struct Entry<T> {
    name: String,
    pending: bool,
    item: T,
}

/// Elements that have seen a start tag but no end tag yet, innermost last.
pub(crate) struct OpenElements<T> {
    entries: Vec<Entry<T>>,
}

impl<T> OpenElements<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, name: &str, item: T) {
        self.entries.push(Entry {
            name: name.to_ascii_lowercase(),
            pending: false,
            item,
        });
    }

    /// The innermost open element.
    pub(crate) fn current(&self) -> Option<&T> {
        self.entries.last().map(|entry| &entry.item)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Resolve an end tag for `name`.
    ///
    /// Removes the innermost entry with that name and returns its item plus
    /// `true` if the entry had been skipped by an earlier end tag (a cross
    /// close). Entries opened after it stay open, are marked pending, and are
    /// handed to `on_skip` once. Returns `None` when nothing matches.
    pub(crate) fn close(
        &mut self,
        name: &str,
        mut on_skip: impl FnMut(&mut T),
    ) -> Option<(T, bool)> {
        let index = self
            .entries
            .iter()
            .rposition(|entry| entry.name.eq_ignore_ascii_case(name))?;
        let entry = self.entries.remove(index);
        for skipped in &mut self.entries[index..] {
            if !skipped.pending {
                skipped.pending = true;
                on_skip(&mut skipped.item);
            }
            trace!(element = %skipped.name, closed_by = %entry.name, "left open across end tag");
        }
        Some((entry.item, entry.pending))
    }
}
