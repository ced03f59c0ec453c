//! Declarative tokenizer.
//!
//! A [`Grammar`] is compiled from a small EBNF-like notation (see
//! [`notation`](self::notation) for the syntax) into a rule graph, and can
//! then tokenize input two ways:
//!
//! - **bulk**, [`Grammar::tokenize`], matches a start rule once over the whole
//!   input and returns a single token tree;
//! - **incremental**, [`Grammar::cursor`], matches a unit rule repeatedly and
//!   hands out one token per call.
//!
//! Matching is ordered choice with backtracking: `|` tries alternatives in
//! declaration order and keeps the first that matches, repetition is greedy,
//! and `a - b` limits `a` to the input before the nearest match of `b`.
//! Named rules produce tokens; names starting with `_` are silent and only
//! contribute their children.

mod html;
mod notation;
mod rule;
mod token;

pub use html::{HtmlGrammar, html, names};
pub use rule::{CharSet, Operator, Quantifier, Rule, Term};
pub use token::{Span, Token, TokenCursor, UNMATCHED};

use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::GrammarError;

/// A compiled, immutable rule graph keyed by rule name.
#[derive(Debug, Clone)]
pub struct Grammar {
    rules: HashMap<String, Rule>,
    order: Vec<String>,
}

impl Grammar {
    /// Compile rule text into a grammar.
    ///
    /// Fails on malformed notation and on references to rules that are never
    /// defined, so a grammar that compiles can always be matched.
    ///
    /// ```
    /// use xss_guard::grammar::Grammar;
    ///
    /// let grammar = Grammar::compile("word ::= [a-z]+").unwrap();
    /// let token = grammar.tokenize("word", "hello world").unwrap().unwrap();
    /// assert_eq!(token.text("hello world"), "hello");
    /// ```
    pub fn compile(text: &str) -> Result<Self, GrammarError> {
        Self::from_rules(notation::parse(text)?)
    }

    /// Build a grammar from already-constructed `(name, rule)` definitions.
    pub fn from_rules(definitions: Vec<(String, Rule)>) -> Result<Self, GrammarError> {
        if definitions.is_empty() {
            return Err(GrammarError::EmptyGrammar);
        }
        let mut rules = HashMap::with_capacity(definitions.len());
        let mut order = Vec::with_capacity(definitions.len());
        for (name, rule) in definitions {
            if rules.contains_key(&name) {
                return Err(GrammarError::DuplicateRule { name });
            }
            order.push(name.clone());
            rules.insert(name, rule);
        }

        for name in &order {
            let mut missing = None;
            rules[name].visit_references(&mut |reference| {
                if missing.is_none() && !rules.contains_key(reference) {
                    missing = Some(reference.to_string());
                }
            });
            if let Some(reference) = missing {
                return Err(GrammarError::UndefinedRule {
                    rule: name.clone(),
                    name: reference,
                });
            }
        }

        Ok(Self { rules, order })
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    /// Rule names in declaration order.
    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Match `start` once at the beginning of `input`.
    ///
    /// Returns the longest token tree the rule's own choices produce, which
    /// may cover only a prefix of `input`. `Ok(None)` means the rule matches
    /// no prefix at all.
    pub fn tokenize<'g>(
        &'g self,
        start: &str,
        input: &str,
    ) -> Result<Option<Token<'g>>, GrammarError> {
        if !self.rules.contains_key(start) {
            return Err(GrammarError::UnknownStartRule {
                name: start.to_string(),
            });
        }
        Ok(self.match_named(start, input, 0, input.len()))
    }

    /// An incremental tokenizer that matches `unit` once per call.
    pub fn cursor<'g, 'i>(
        &'g self,
        unit: &str,
        input: &'i str,
    ) -> Result<TokenCursor<'g, 'i>, GrammarError> {
        let Some((name, _)) = self.rules.get_key_value(unit) else {
            return Err(GrammarError::UnknownStartRule {
                name: unit.to_string(),
            });
        };
        Ok(TokenCursor::new(self, name, input))
    }

    /// Match rule `name` at `pos`, never reading at or past `limit`.
    ///
    /// The result is always a token for `name`, even for silent rules.
    pub(crate) fn match_named<'g>(
        &'g self,
        name: &str,
        input: &str,
        pos: usize,
        limit: usize,
    ) -> Option<Token<'g>> {
        self.match_with(name, input, pos, limit, &SearchCache::default())
    }

    /// [`match_named`](Self::match_named) reusing delimiter searches from
    /// earlier calls over the same `input`.
    pub(crate) fn match_with<'g>(
        &'g self,
        name: &str,
        input: &str,
        pos: usize,
        limit: usize,
        cache: &SearchCache,
    ) -> Option<Token<'g>> {
        let (key, rule) = self.rules.get_key_value(name)?;
        let matcher = Matcher {
            grammar: self,
            input,
            cache,
        };
        let mut children = Vec::new();
        let end = matcher.rule(rule, pos, limit, &mut children)?;
        Some(Token::new(key, Span::new(pos, end), children))
    }
}

/// Results of `a - b` delimiter searches, keyed by the `b` rule and the limit.
///
/// An entry `(from, found)` records that `found` is the first match at or
/// after `from`, so it also answers every later query up to `found`. Without
/// it, each unterminated `<!--` would rescan to the end of the input.
/// Only valid for one grammar and one input.
#[derive(Debug, Default)]
pub(crate) struct SearchCache {
    entries: RefCell<HashMap<(usize, usize), (usize, Option<usize>)>>,
}

impl SearchCache {
    fn get(&self, rule: &Rule, limit: usize, pos: usize) -> Option<Option<usize>> {
        let entries = self.entries.borrow();
        let &(from, found) = entries.get(&(rule_address(rule), limit))?;
        (from <= pos && found.is_none_or(|at| pos <= at)).then_some(found)
    }

    fn put(&self, rule: &Rule, limit: usize, pos: usize, found: Option<usize>) {
        self.entries
            .borrow_mut()
            .insert((rule_address(rule), limit), (pos, found));
    }
}

fn rule_address(rule: &Rule) -> usize {
    rule as *const Rule as usize
}

struct Matcher<'g, 'i, 'c> {
    grammar: &'g Grammar,
    input: &'i str,
    cache: &'c SearchCache,
}

impl<'g> Matcher<'g, '_, '_> {
    fn next_char(&self, pos: usize, limit: usize) -> Option<char> {
        self.input.get(pos..limit)?.chars().next()
    }

    fn rule(
        &self,
        rule: &'g Rule,
        pos: usize,
        limit: usize,
        out: &mut Vec<Token<'g>>,
    ) -> Option<usize> {
        let mark = out.len();
        match rule.quantifier() {
            Quantifier::One => self.term(rule.term(), pos, limit, out),
            Quantifier::Optional => match self.term(rule.term(), pos, limit, out) {
                Some(end) => Some(end),
                None => {
                    out.truncate(mark);
                    Some(pos)
                }
            },
            Quantifier::Repeat0 | Quantifier::Repeat1 => {
                let mut cur = pos;
                let mut count = 0usize;
                loop {
                    let before = out.len();
                    match self.term(rule.term(), cur, limit, out) {
                        Some(end) if end > cur => {
                            cur = end;
                            count += 1;
                        }
                        // An empty match would repeat forever.
                        Some(_) => {
                            count += 1;
                            break;
                        }
                        None => {
                            out.truncate(before);
                            break;
                        }
                    }
                }
                if rule.quantifier() == Quantifier::Repeat1 && count == 0 {
                    out.truncate(mark);
                    None
                } else {
                    Some(cur)
                }
            }
        }
    }

    fn term(
        &self,
        term: &'g Term,
        pos: usize,
        limit: usize,
        out: &mut Vec<Token<'g>>,
    ) -> Option<usize> {
        match term {
            Term::Literal(text) => self
                .input
                .get(pos..limit)?
                .starts_with(text.as_str())
                .then_some(pos + text.len()),
            Term::CharSet(set) => self
                .next_char(pos, limit)
                .filter(|&c| set.contains(c))
                .map(|c| pos + c.len_utf8()),
            Term::CharCode(code) => self
                .next_char(pos, limit)
                .filter(|c| c == code)
                .map(|c| pos + c.len_utf8()),
            Term::Group { operator, children } => match operator {
                Operator::Sequence => {
                    let mark = out.len();
                    let mut cur = pos;
                    for (i, child) in children.iter().enumerate() {
                        if children
                            .get(i + 1)
                            .is_some_and(|next| self.unterminated(child, next, cur, limit))
                        {
                            out.truncate(mark);
                            return None;
                        }
                        match self.rule(child, cur, limit, out) {
                            Some(end) => cur = end,
                            None => {
                                out.truncate(mark);
                                return None;
                            }
                        }
                    }
                    Some(cur)
                }
                Operator::Or => {
                    for child in children {
                        let mark = out.len();
                        if let Some(end) = self.rule(child, pos, limit, out) {
                            return Some(end);
                        }
                        out.truncate(mark);
                    }
                    None
                }
                Operator::Minus => {
                    let [left, right] = children.as_slice() else {
                        return None;
                    };
                    let window = self.nearest(right, pos, limit).unwrap_or(limit);
                    self.rule(left, pos, window, out)
                }
            },
            Term::Reference(name) => self.reference(name, pos, limit, out),
        }
    }

    fn reference(
        &self,
        name: &str,
        pos: usize,
        limit: usize,
        out: &mut Vec<Token<'g>>,
    ) -> Option<usize> {
        let (key, rule) = self.grammar.rules.get_key_value(name)?;
        // Silent rules write straight into the caller's list; `rule` leaves
        // it untouched on failure.
        if key.starts_with('_') {
            return self.rule(rule, pos, limit, out);
        }
        let mut children = Vec::new();
        let end = self.rule(rule, pos, limit, &mut children)?;
        out.push(Token::new(key, Span::new(pos, end), children));
        Some(end)
    }

    /// The `b` of `rule` when it is `a - b`, directly or through a reference.
    fn excluded_operand(&self, rule: &'g Rule) -> Option<&'g Rule> {
        let term = match rule.term() {
            Term::Reference(name) => self.grammar.rules.get(name)?.term(),
            term => term,
        };
        match term {
            Term::Group {
                operator: Operator::Minus,
                children,
            } => children.get(1),
            _ => None,
        }
    }

    /// Whether `child next` must fail at `pos` because `child` is `a - b`,
    /// `next` is that same `b`, and `b` matches nowhere before `limit`.
    ///
    /// `a` ends somewhere in `[pos, limit]`, so only `b` at `limit` is left
    /// to try.
    fn unterminated(&self, child: &'g Rule, next: &'g Rule, pos: usize, limit: usize) -> bool {
        self.excluded_operand(child)
            .is_some_and(|right| right == next && self.nearest(right, pos, limit).is_none())
            && self.rule(next, limit, limit, &mut Vec::new()).is_none()
    }

    /// Offset of the first position in `[pos, limit)` where `right` matches.
    fn nearest(&self, right: &'g Rule, pos: usize, limit: usize) -> Option<usize> {
        if let Some(found) = self.cache.get(right, limit, pos) {
            return found;
        }
        let found = self.scan(right, pos, limit);
        self.cache.put(right, limit, pos, found);
        found
    }

    fn scan(&self, right: &'g Rule, pos: usize, limit: usize) -> Option<usize> {
        if let (Term::Literal(text), Quantifier::One) = (right.term(), right.quantifier()) {
            return self
                .input
                .get(pos..limit)?
                .find(text.as_str())
                .map(|offset| pos + offset);
        }
        let mut scratch = Vec::new();
        let mut p = pos;
        while p < limit {
            if self.rule(right, p, limit, &mut scratch).is_some() {
                return Some(p);
            }
            scratch.clear();
            p += self.next_char(p, limit).map_or(1, char::len_utf8);
        }
        None
    }
}
