//! Rule graph nodes produced by the notation compiler.

/// How many times a rule node may match in a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    /// Exactly once.
    One,
    /// Zero or one time (`?`).
    Optional,
    /// Zero or more times, greedily (`*`).
    Repeat0,
    /// One or more times, greedily (`+`).
    Repeat1,
}

/// How the children of a group combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Every child in order.
    Sequence,
    /// The first child that matches, in declaration order.
    Or,
    /// The left child, constrained to end where the right child first matches.
    Minus,
}

/// A set of character ranges, optionally negated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharSet {
    ranges: Vec<(char, char)>,
    negated: bool,
}

impl CharSet {
    /// Build a set from inclusive `(low, high)` ranges.
    pub fn new(ranges: Vec<(char, char)>, negated: bool) -> Self {
        Self { ranges, negated }
    }

    /// Returns `true` if `c` belongs to the set.
    pub fn contains(&self, c: char) -> bool {
        let listed = self
            .ranges
            .iter()
            .any(|&(low, high)| low <= c && c <= high);
        listed != self.negated
    }

    /// The inclusive ranges, as written.
    pub fn ranges(&self) -> &[(char, char)] {
        &self.ranges
    }

    /// Returns `true` for a `[^...]` set.
    pub fn is_negated(&self) -> bool {
        self.negated
    }
}

/// The matching behaviour of a rule node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// An exact string.
    Literal(String),
    /// One character from a set.
    CharSet(CharSet),
    /// One specific code point (`#x3C`).
    CharCode(char),
    /// Children combined by an operator.
    Group {
        operator: Operator,
        children: Vec<Rule>,
    },
    /// A named rule, resolved through the grammar's symbol table at match time.
    Reference(String),
}

/// A node of the rule graph: a term plus its quantifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    term: Term,
    quantifier: Quantifier,
}

impl Rule {
    fn new(term: Term) -> Self {
        Self {
            term,
            quantifier: Quantifier::One,
        }
    }

    /// A literal string node.
    pub fn literal(text: impl Into<String>) -> Self {
        Self::new(Term::Literal(text.into()))
    }

    /// A character-class node.
    pub fn char_set(set: CharSet) -> Self {
        Self::new(Term::CharSet(set))
    }

    /// A single code point node.
    pub fn char_code(code: char) -> Self {
        Self::new(Term::CharCode(code))
    }

    /// A reference to another named rule.
    pub fn reference(name: impl Into<String>) -> Self {
        Self::new(Term::Reference(name.into()))
    }

    /// A sequence of children.
    pub fn sequence(children: Vec<Rule>) -> Self {
        Self::new(Term::Group {
            operator: Operator::Sequence,
            children,
        })
    }

    /// An ordered choice between children.
    pub fn choice(children: Vec<Rule>) -> Self {
        Self::new(Term::Group {
            operator: Operator::Or,
            children,
        })
    }

    /// `left - right`: always exactly two children.
    pub fn minus(left: Rule, right: Rule) -> Self {
        Self::new(Term::Group {
            operator: Operator::Minus,
            children: vec![left, right],
        })
    }

    /// Replace the quantifier of this node.
    pub fn with_quantifier(mut self, quantifier: Quantifier) -> Self {
        self.quantifier = quantifier;
        self
    }

    pub fn term(&self) -> &Term {
        &self.term
    }

    pub fn quantifier(&self) -> Quantifier {
        self.quantifier
    }

    /// Visit every rule name referenced anywhere below this node.
    pub(crate) fn visit_references<'a>(&'a self, visit: &mut impl FnMut(&'a str)) {
        match &self.term {
            Term::Reference(name) => visit(name),
            Term::Group { children, .. } => {
                for child in children {
                    child.visit_references(visit);
                }
            }
            Term::Literal(_) | Term::CharSet(_) | Term::CharCode(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negated_set_excludes_listed_ranges() {
        let set = CharSet::new(vec![('<', '<'), ('>', '>')], true);
        assert!(set.contains('a'));
        assert!(!set.contains('<'));
        assert!(!set.contains('>'));
    }

    #[test]
    fn empty_negated_set_matches_anything() {
        let set = CharSet::new(vec![], true);
        assert!(set.contains('\0'));
        assert!(set.contains('한'));
    }

    #[test]
    fn minus_always_has_two_children() {
        let rule = Rule::minus(Rule::literal("a"), Rule::literal("b"));
        match rule.term() {
            Term::Group { operator, children } => {
                assert_eq!(*operator, Operator::Minus);
                assert_eq!(children.len(), 2);
            }
            other => panic!("unexpected term {other:?}"),
        }
    }

    #[test]
    fn references_are_collected_through_groups() {
        let rule = Rule::sequence(vec![
            Rule::reference("tag"),
            Rule::choice(vec![Rule::reference("attr"), Rule::literal(">")]),
        ]);
        let mut names = Vec::new();
        rule.visit_references(&mut |name| names.push(name));
        assert_eq!(names, vec!["tag", "attr"]);
    }
}
