//! The built-in markup grammar.

use std::sync::OnceLock;

use super::{Grammar, Token, TokenCursor};

/// Rule names of the markup grammar.
pub mod names {
    pub const DOCUMENT: &str = "document";
    pub const UNIT: &str = "unit";
    pub const IE_HACK_START: &str = "ieHackStart";
    pub const IE_CONDITION: &str = "ieCondition";
    pub const IE_HACK_END: &str = "ieHackEnd";
    pub const COMMENT: &str = "comment";
    pub const COMMENT_BODY: &str = "commentBody";
    pub const START_TAG: &str = "startTag";
    pub const SELF_CLOSE: &str = "selfClose";
    pub const END_TAG: &str = "endTag";
    pub const TAG_NAME: &str = "tagName";
    pub const ATTRIBUTE: &str = "attribute";
    pub const ATTR_NAME: &str = "attrName";
    pub const ATTR_VALUE: &str = "attrValue";
    pub const DOUBLE_QUOTED: &str = "doubleQuoted";
    pub const SINGLE_QUOTED: &str = "singleQuoted";
    pub const UNQUOTED: &str = "unquoted";
    pub const TEXT: &str = "text";
}

// Alternatives that share a prefix list the longer one first.
const RULES: &str = r#"
document     ::= unit*
unit         ::= ieHackStart | ieHackEnd | comment | endTag | startTag | text

/* <!--[if IE]>, <![if IE]>, and the broken <!--[if IE]--> spelling */
ieHackStart  ::= ('<!--[' | '<![') ieCondition (']><!-->' | ']-->' | ']>')
ieCondition  ::= 'if' [^#x5D<>]+
ieHackEnd    ::= ('<!--<![' | '<!--[' | '<![') 'endif' _space* (']-->' | ']>')

comment      ::= '<!--' commentBody '-->'
commentBody  ::= _char* - '-->'

startTag     ::= '<' tagName (_space* attribute)* _space* selfClose? '>'
selfClose    ::= '/'
endTag       ::= '</' tagName _space* '>'
tagName      ::= [a-zA-Z] [a-zA-Z0-9:_.#x2D]*

attribute    ::= attrName (_space* '=' _space* attrValue)?
attrName     ::= [^#x20#x9#xA#xD#xC/>=<"']+
attrValue    ::= '"' doubleQuoted '"' | "'" singleQuoted "'" | unquoted
doubleQuoted ::= [^"]*
singleQuoted ::= [^']*
unquoted     ::= [^#x20#x9#xA#xD#xC>"'`=<] [^#x20#x9#xA#xD#xC><]*

text         ::= [^<]+ | '<'

_space       ::= [#x20#x9#xA#xD#xC]
_char        ::= [#x0-#x10FFFF]
"#;

/// The compiled markup grammar shared by the tree parser and the stream filter.
#[derive(Debug)]
pub struct HtmlGrammar {
    grammar: Grammar,
}

impl HtmlGrammar {
    /// The rule text the grammar is compiled from.
    pub const RULES: &'static str = RULES;

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// Tokenize `input` in one pass: a `document` token whose children are
    /// `unit` tokens.
    pub fn document<'g>(&'g self, input: &str) -> Option<Token<'g>> {
        self.grammar
            .match_named(names::DOCUMENT, input, 0, input.len())
    }

    /// Tokenize `input` one `unit` at a time.
    pub fn units<'g, 'i>(&'g self, input: &'i str) -> TokenCursor<'g, 'i> {
        TokenCursor::new(&self.grammar, names::UNIT, input)
    }
}

/// The shared markup grammar, compiled on first use.
///
/// # Panics
///
/// Panics if the built-in rule text fails to compile.
pub fn html() -> &'static HtmlGrammar {
    static GRAMMAR: OnceLock<HtmlGrammar> = OnceLock::new();
    GRAMMAR.get_or_init(|| HtmlGrammar {
        grammar: Grammar::compile(RULES).expect("built-in markup grammar must compile"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn unit_names(input: &str) -> Vec<&'static str> {
        html()
            .units(input)
            .map(|unit| unit.children()[0].name())
            .collect()
    }

    #[test]
    fn compiles_with_every_named_rule() {
        let grammar = html().grammar();
        for name in [
            names::DOCUMENT,
            names::IE_HACK_START,
            names::COMMENT_BODY,
            names::ATTR_VALUE,
            names::UNQUOTED,
            names::TEXT,
        ] {
            assert!(grammar.rule(name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn splits_document_into_units() {
        assert_eq!(
            unit_names(r#"<p class="x">hi<!-- c --></p>"#),
            vec![names::START_TAG, names::TEXT, names::COMMENT, names::END_TAG]
        );
    }

    #[test]
    fn start_tag_attributes_and_quotes() {
        let input = r#"<img src='a.png' alt="" hidden data-x=1 />"#;
        let unit = html().units(input).next().unwrap();
        let tag = &unit.children()[0];
        assert_eq!(tag.name(), names::START_TAG);
        assert!(tag.child(names::SELF_CLOSE).is_some());
        let attrs: Vec<_> = tag.children_named(names::ATTRIBUTE).collect();
        assert_eq!(attrs.len(), 4);
        let value = attrs[0].child(names::ATTR_VALUE).unwrap();
        assert_eq!(value.children()[0].name(), names::SINGLE_QUOTED);
        assert_eq!(value.children()[0].text(input), "a.png");
        assert!(attrs[2].child(names::ATTR_VALUE).is_none());
        let unquoted = attrs[3].child(names::ATTR_VALUE).unwrap();
        assert_eq!(unquoted.children()[0].text(input), "1");
    }

    #[test]
    fn comment_body_stops_at_first_close() {
        let input = "<!-- a --> b -->";
        let unit = html().units(input).next().unwrap();
        let comment = &unit.children()[0];
        assert_eq!(comment.text(input), "<!-- a -->");
        assert_eq!(comment.child(names::COMMENT_BODY).unwrap().text(input), " a ");
    }

    #[test]
    fn conditional_comment_variants() {
        for input in ["<!--[if IE]>", "<![if !IE]>", "<!--[if !mso]-->", "<!--[if gte mso 9]><!-->"] {
            assert_eq!(unit_names(input), vec![names::IE_HACK_START], "{input}");
        }
        for input in ["<![endif]-->", "<!--[endif]-->", "<![endif]>", "<!--<![endif]-->"] {
            assert_eq!(unit_names(input), vec![names::IE_HACK_END], "{input}");
        }
        assert_eq!(unit_names("<!--[foo]-->"), vec![names::COMMENT]);
    }

    #[test]
    fn malformed_markup_degrades_to_text() {
        assert_eq!(
            unit_names("<a href=\"x"),
            vec![names::TEXT, names::TEXT]
        );
        assert_eq!(unit_names("a < b"), vec![names::TEXT, names::TEXT, names::TEXT]);
        assert_eq!(unit_names("<!-- open"), vec![names::TEXT, names::TEXT]);
        assert_eq!(
            unit_names("<b title=a<i>"),
            vec![names::TEXT, names::TEXT, names::START_TAG]
        );
    }

    #[test]
    fn unterminated_openers_tokenize_in_linear_time() {
        // Each opener used to rescan the rest of the input.
        for opener in ["<!--", "<p a=x", "<!--[if IE]"] {
            let input = opener.repeat(50_000);
            let started = Instant::now();
            let units = html().units(&input).count();
            let document = html().document(&input).unwrap();
            assert_eq!(document.children().len(), units, "{opener}");
            assert_eq!(document.span().len(), input.len(), "{opener}");
            assert!(
                started.elapsed() < Duration::from_secs(10),
                "{opener} took {:?}",
                started.elapsed()
            );
        }
    }

    #[test]
    fn bulk_and_incremental_units_agree() {
        let input = "<div><b>x</div></b><!--[if IE]><i>y</i><![endif]--><a b='c'>";
        let document = html().document(input).unwrap();
        let units: Vec<_> = html().units(input).collect();
        assert_eq!(document.children(), units.as_slice());
        assert_eq!(document.span().len(), input.len());
    }
}
