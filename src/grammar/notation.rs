//! Parser for the rule notation.
//!
//! ```text
//! definition ::= name '::=' expression
//! expression ::= sequence ('|' sequence)*
//! sequence   ::= difference+
//! difference ::= postfix ('-' postfix)?
//! postfix    ::= primary ('?' | '*' | '+')?
//! primary    ::= '(' expression ')' | 'text' | "text" | [class] | #xHEX | name
//! ```
//!
//! A definition ends where the next `name ::=` begins. Classes accept single
//! characters, `#xHEX` code points and `low-high` ranges; a leading `^`
//! negates. `/* ... */` is a comment.

use crate::error::GrammarError;

use super::rule::{CharSet, Quantifier, Rule};

#[derive(Debug, Clone, PartialEq)]
enum Lexeme {
    Ident(String),
    Define,
    Literal(String),
    Class(CharSet),
    Code(char),
    Open,
    Close,
    Bar,
    Minus,
    Question,
    Star,
    Plus,
}

impl Lexeme {
    fn describe(&self) -> String {
        match self {
            Lexeme::Ident(name) => format!("rule name `{name}`"),
            Lexeme::Define => "`::=`".to_string(),
            Lexeme::Literal(text) => format!("literal {text:?}"),
            Lexeme::Class(_) => "character class".to_string(),
            Lexeme::Code(c) => format!("character code {:#x}", u32::from(*c)),
            Lexeme::Open => "`(`".to_string(),
            Lexeme::Close => "`)`".to_string(),
            Lexeme::Bar => "`|`".to_string(),
            Lexeme::Minus => "`-`".to_string(),
            Lexeme::Question => "`?`".to_string(),
            Lexeme::Star => "`*`".to_string(),
            Lexeme::Plus => "`+`".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Lexed {
    lexeme: Lexeme,
    offset: usize,
}

struct Lexer {
    chars: Vec<(usize, char)>,
    i: usize,
    len: usize,
}

impl Lexer {
    fn new(text: &str) -> Self {
        Self {
            chars: text.char_indices().collect(),
            i: 0,
            len: text.len(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.i).map(|&(_, c)| c)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.i + ahead).map(|&(_, c)| c)
    }

    fn offset(&self) -> usize {
        self.chars.get(self.i).map_or(self.len, |&(offset, _)| offset)
    }

    fn lex(mut self) -> Result<Vec<Lexed>, GrammarError> {
        let mut out = Vec::new();
        while let Some(c) = self.peek() {
            let offset = self.offset();
            let lexeme = match c {
                c if c.is_whitespace() => {
                    self.i += 1;
                    continue;
                }
                '/' if self.peek_at(1) == Some('*') => {
                    self.skip_comment(offset)?;
                    continue;
                }
                ':' if self.peek_at(1) == Some(':') && self.peek_at(2) == Some('=') => {
                    self.i += 3;
                    Lexeme::Define
                }
                '\'' | '"' => self.literal(c, offset)?,
                '[' => self.class(offset)?,
                '#' if self.peek_at(1) == Some('x') => {
                    self.i += 2;
                    Lexeme::Code(self.hex(offset)?)
                }
                '(' => self.single(Lexeme::Open),
                ')' => self.single(Lexeme::Close),
                '|' => self.single(Lexeme::Bar),
                '-' => self.single(Lexeme::Minus),
                '?' => self.single(Lexeme::Question),
                '*' => self.single(Lexeme::Star),
                '+' => self.single(Lexeme::Plus),
                c if c.is_ascii_alphabetic() || c == '_' => self.ident(),
                other => {
                    return Err(GrammarError::UnknownOperator {
                        found: other,
                        offset,
                    });
                }
            };
            out.push(Lexed { lexeme, offset });
        }
        Ok(out)
    }

    fn single(&mut self, lexeme: Lexeme) -> Lexeme {
        self.i += 1;
        lexeme
    }

    fn skip_comment(&mut self, offset: usize) -> Result<(), GrammarError> {
        self.i += 2;
        while let Some(c) = self.peek() {
            if c == '*' && self.peek_at(1) == Some('/') {
                self.i += 2;
                return Ok(());
            }
            self.i += 1;
        }
        Err(GrammarError::UnexpectedToken {
            found: "unterminated comment".to_string(),
            offset,
        })
    }

    fn ident(&mut self) -> Lexeme {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }
            name.push(c);
            self.i += 1;
        }
        Lexeme::Ident(name)
    }

    fn literal(&mut self, quote: char, offset: usize) -> Result<Lexeme, GrammarError> {
        self.i += 1;
        let mut text = String::new();
        while let Some(c) = self.peek() {
            self.i += 1;
            if c == quote {
                return Ok(Lexeme::Literal(text));
            }
            text.push(c);
        }
        Err(GrammarError::UnterminatedLiteral { offset })
    }

    /// Reads the hex digits after `#x`.
    fn hex(&mut self, offset: usize) -> Result<char, GrammarError> {
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if !c.is_ascii_hexdigit() {
                break;
            }
            digits.push(c);
            self.i += 1;
        }
        u32::from_str_radix(&digits, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or(GrammarError::InvalidCharCode { offset })
    }

    fn class_item(&mut self, offset: usize) -> Result<char, GrammarError> {
        match self.peek() {
            Some('#') if self.peek_at(1) == Some('x') => {
                self.i += 2;
                self.hex(self.offset())
            }
            Some(c) => {
                self.i += 1;
                Ok(c)
            }
            None => Err(GrammarError::UnterminatedCharClass { offset }),
        }
    }

    fn class(&mut self, offset: usize) -> Result<Lexeme, GrammarError> {
        self.i += 1;
        let negated = self.peek() == Some('^');
        if negated {
            self.i += 1;
        }
        let mut ranges = Vec::new();
        loop {
            match self.peek() {
                None => return Err(GrammarError::UnterminatedCharClass { offset }),
                Some(']') => {
                    self.i += 1;
                    return Ok(Lexeme::Class(CharSet::new(ranges, negated)));
                }
                Some(_) => {
                    let low = self.class_item(offset)?;
                    let is_range = self.peek() == Some('-')
                        && !matches!(self.peek_at(1), Some(']') | None);
                    if is_range {
                        self.i += 1;
                        let high = self.class_item(offset)?;
                        ranges.push((low, high));
                    } else {
                        ranges.push((low, low));
                    }
                }
            }
        }
    }
}

struct Parser {
    lexemes: Vec<Lexed>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Lexed> {
        self.lexemes.get(self.pos)
    }

    fn next(&mut self) -> Option<Lexed> {
        let lexed = self.lexemes.get(self.pos).cloned();
        if lexed.is_some() {
            self.pos += 1;
        }
        lexed
    }

    fn eat(&mut self, lexeme: &Lexeme) -> bool {
        if self.peek().is_some_and(|l| &l.lexeme == lexeme) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self) -> GrammarError {
        match self.peek() {
            Some(lexed) => GrammarError::UnexpectedToken {
                found: lexed.lexeme.describe(),
                offset: lexed.offset,
            },
            None => GrammarError::UnexpectedToken {
                found: "end of input".to_string(),
                offset: self.end,
            },
        }
    }

    /// `name ::=` ahead: the current definition ends here.
    fn at_definition(&self) -> bool {
        matches!(
            (
                self.lexemes.get(self.pos).map(|l| &l.lexeme),
                self.lexemes.get(self.pos + 1).map(|l| &l.lexeme),
            ),
            (Some(Lexeme::Ident(_)), Some(Lexeme::Define))
        )
    }

    fn starts_item(&self) -> bool {
        match self.peek().map(|l| &l.lexeme) {
            Some(Lexeme::Ident(_)) => !self.at_definition(),
            Some(Lexeme::Literal(_) | Lexeme::Class(_) | Lexeme::Code(_) | Lexeme::Open) => true,
            _ => false,
        }
    }

    fn definitions(&mut self) -> Result<Vec<(String, Rule)>, GrammarError> {
        let mut rules = Vec::new();
        while let Some(lexed) = self.next() {
            let Lexeme::Ident(name) = lexed.lexeme else {
                return Err(GrammarError::UnexpectedToken {
                    found: lexed.lexeme.describe(),
                    offset: lexed.offset,
                });
            };
            if !self.eat(&Lexeme::Define) {
                return Err(GrammarError::MissingDefinition { name });
            }
            let rule = self.expression()?;
            rules.push((name, rule));
        }
        if rules.is_empty() {
            return Err(GrammarError::EmptyGrammar);
        }
        Ok(rules)
    }

    fn expression(&mut self) -> Result<Rule, GrammarError> {
        let mut alternatives = vec![self.sequence()?];
        while self.eat(&Lexeme::Bar) {
            alternatives.push(self.sequence()?);
        }
        Ok(if alternatives.len() == 1 {
            alternatives.remove(0)
        } else {
            Rule::choice(alternatives)
        })
    }

    fn sequence(&mut self) -> Result<Rule, GrammarError> {
        let mut items = Vec::new();
        while self.starts_item() {
            items.push(self.difference()?);
        }
        match items.len() {
            0 => Err(self.unexpected()),
            1 => Ok(items.remove(0)),
            _ => Ok(Rule::sequence(items)),
        }
    }

    fn difference(&mut self) -> Result<Rule, GrammarError> {
        let left = self.postfix()?;
        if self.eat(&Lexeme::Minus) {
            if !self.starts_item() {
                return Err(self.unexpected());
            }
            let right = self.postfix()?;
            return Ok(Rule::minus(left, right));
        }
        Ok(left)
    }

    fn postfix(&mut self) -> Result<Rule, GrammarError> {
        let rule = self.primary()?;
        let quantifier = match self.peek().map(|l| &l.lexeme) {
            Some(Lexeme::Question) => Quantifier::Optional,
            Some(Lexeme::Star) => Quantifier::Repeat0,
            Some(Lexeme::Plus) => Quantifier::Repeat1,
            _ => return Ok(rule),
        };
        self.pos += 1;
        if matches!(
            self.peek().map(|l| &l.lexeme),
            Some(Lexeme::Question | Lexeme::Star | Lexeme::Plus)
        ) {
            return Err(self.unexpected());
        }
        let rule = if rule.quantifier() == Quantifier::One {
            rule
        } else {
            // `(a*)?`: quantify the parenthesized node as a whole
            Rule::sequence(vec![rule])
        };
        Ok(rule.with_quantifier(quantifier))
    }

    fn primary(&mut self) -> Result<Rule, GrammarError> {
        let Some(lexed) = self.next() else {
            return Err(self.unexpected());
        };
        match lexed.lexeme {
            Lexeme::Open => {
                let inner = self.expression()?;
                if !self.eat(&Lexeme::Close) {
                    return Err(GrammarError::UnterminatedGroup {
                        offset: lexed.offset,
                    });
                }
                Ok(inner)
            }
            Lexeme::Literal(text) => Ok(Rule::literal(text)),
            Lexeme::Class(set) => Ok(Rule::char_set(set)),
            Lexeme::Code(code) => Ok(Rule::char_code(code)),
            Lexeme::Ident(name) => Ok(Rule::reference(name)),
            other => Err(GrammarError::UnexpectedToken {
                found: other.describe(),
                offset: lexed.offset,
            }),
        }
    }
}

/// Parse rule text into `(name, rule)` definitions, in declaration order.
pub(crate) fn parse(text: &str) -> Result<Vec<(String, Rule)>, GrammarError> {
    let lexemes = Lexer::new(text).lex()?;
    Parser {
        lexemes,
        pos: 0,
        end: text.len(),
    }
    .definitions()
}
