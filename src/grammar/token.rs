//! Tokens produced by the grammar engine.
//!
//! Tokens never own input text: a token is a rule name plus a [`Span`] into
//! the buffer it was matched against.

use super::{Grammar, SearchCache};

/// Name given to the token that covers input no unit rule could match.
pub const UNMATCHED: &str = "unmatched";

/// A byte range into the tokenized input.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct Span {
    start: usize,
    end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "span start {start} after end {end}");
        Self { start, end }
    }

    pub fn start(self) -> usize {
        self.start
    }

    pub fn end(self) -> usize {
        self.end
    }

    pub fn len(self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(self) -> bool {
        self.start == self.end
    }

    /// The text this span covers in `s`.
    pub fn of(self, s: &str) -> &str {
        &s[self.start..self.end]
    }
}

/// A matched named rule with the tokens of the named rules it contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'g> {
    name: &'g str,
    span: Span,
    children: Vec<Token<'g>>,
}

impl<'g> Token<'g> {
    pub(crate) fn new(name: &'g str, span: Span, children: Vec<Token<'g>>) -> Self {
        Self {
            name,
            span,
            children,
        }
    }

    /// The rule this token was produced by.
    pub fn name(&self) -> &'g str {
        self.name
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn children(&self) -> &[Token<'g>] {
        &self.children
    }

    /// The matched text, borrowed from the original input.
    pub fn text<'i>(&self, input: &'i str) -> &'i str {
        self.span.of(input)
    }

    /// The first direct child produced by rule `name`.
    pub fn child(&self, name: &str) -> Option<&Token<'g>> {
        self.children.iter().find(|token| token.name == name)
    }

    /// All direct children produced by rule `name`, in input order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Token<'g>> {
        self.children.iter().filter(move |token| token.name == name)
    }
}

/// Incremental tokenizer: yields one unit-rule match at a time.
///
/// Obtained from [`Grammar::cursor`]. Every call to
/// [`next_token`](Self::next_token) matches the unit rule once at the current
/// position and advances past it, so the tokens are exactly the children a
/// bulk `unit*` match would produce. Input the unit rule cannot consume is
/// returned as a single [`UNMATCHED`] token running to the end.
pub struct TokenCursor<'g, 'i> {
    grammar: &'g Grammar,
    rule: &'g str,
    input: &'i str,
    pos: usize,
    cache: SearchCache,
}

impl<'g, 'i> TokenCursor<'g, 'i> {
    pub(crate) fn new(grammar: &'g Grammar, rule: &'g str, input: &'i str) -> Self {
        Self {
            grammar,
            rule,
            input,
            pos: 0,
            cache: SearchCache::default(),
        }
    }

    /// Byte offset of the next unit.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn input(&self) -> &'i str {
        self.input
    }

    /// Match the next logical unit, or `None` at end of input.
    pub fn next_token(&mut self) -> Option<Token<'g>> {
        if self.pos >= self.input.len() {
            return None;
        }
        let start = self.pos;
        let token = match self.grammar.match_with(
            self.rule,
            self.input,
            start,
            self.input.len(),
            &self.cache,
        ) {
            Some(token) if token.span().end() > start => token,
            _ => Token::new(UNMATCHED, Span::new(start, self.input.len()), Vec::new()),
        };
        self.pos = token.span().end();
        Some(token)
    }
}

impl<'g> Iterator for TokenCursor<'g, '_> {
    type Item = Token<'g>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}
