// crates/constraint-logic/src/text.rs
// ============================================================================
// Module: Text Constraint Language
// Description: Lexer and recursive-descent parser for the built-in grammar.
// Purpose: Turn `prop == value && (a < 3 || b in "x,y")` into an Expression.
// Dependencies: crate::ast, crate::registry, crate::version
// ============================================================================

//! ## Overview
//! The text grammar is the default constraint language. A constraint is a
//! sequence of `property op value` comparisons joined by `AND`/`&&` and
//! `OR`/`||`, optionally grouped with parentheses. `AND` binds tighter than
//! `OR`. Constraint text is untrusted; input size and nesting are bounded.
//!
//! ### Grammar (informal)
//! - `expr := and ( OR and )*`
//! - `and := primary ( AND primary )*`
//! - `primary := '(' expr ')' | property op value`
//! - `op := = | == | != | < | > | <= | >= | in`
//! - `value := word | number | "quoted text" | "a,b,c" | [1.0.0,2.0.0)`
//!
//! ### Value rules
//! - Ordering operators need a numeric value.
//! - `in` needs a quoted list or a version range.
//! - Equality operators reject quoted lists and version ranges.

use crate::ast::Comparison;
use crate::ast::ComparisonOp;
use crate::ast::Expression;
use crate::ast::Literal;
use crate::error::LanguageError;
use crate::registry::ConstraintLanguage;
use crate::version::INFINITY;
use crate::version::VersionRange;
use crate::version::is_version_string;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum constraint string size in bytes.
const MAX_CONSTRAINT_BYTES: usize = 64 * 1024;
/// Maximum parenthesis nesting depth.
const MAX_NESTING: usize = 32;

/// Registry name of the text grammar.
pub const TEXT_LANGUAGE_NAME: &str = "text";

/// Message used for every unbalanced parenthesis case.
const UNMATCHED_PARENS: &str = "The constraint expression contains unmatched parentheses.";

// ============================================================================
// SECTION: Public API
// ============================================================================

/// The built-in text constraint language.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextLanguage;

impl ConstraintLanguage for TextLanguage {
    fn name(&self) -> &str {
        TEXT_LANGUAGE_NAME
    }

    fn parse(&self, constraint: &str) -> Result<Expression, LanguageError> {
        parse_constraint(constraint)
    }
}

/// Parses one constraint string with the text grammar.
///
/// # Errors
/// Returns [`LanguageError::Parse`] naming the offending fragment when the
/// input is empty, too large, too deeply nested, or malformed.
pub fn parse_constraint(input: &str) -> Result<Expression, LanguageError> {
    if input.len() > MAX_CONSTRAINT_BYTES {
        return Err(LanguageError::Parse(format!(
            "Constraint expression exceeds size limit: {} bytes (max {MAX_CONSTRAINT_BYTES}).",
            input.len()
        )));
    }
    if input.trim().is_empty() {
        return Err(LanguageError::Parse("Constraint expression is empty.".to_string()));
    }
    let tokens = Lexer::new(input).lex()?;
    let mut parser = Parser::new(tokens);
    let expression = parser.parse_or()?;
    parser.expect_eof()?;
    Ok(expression)
}

// ============================================================================
// SECTION: Lexer
// ============================================================================

/// Lexer token produced from constraint text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    /// Bare word: property name or unquoted value.
    Word(&'a str),
    /// Double-quoted string, quotes included.
    Quoted(&'a str),
    /// Version range expression, brackets included.
    Range(&'a str),
    /// Comparison operator.
    Op(ComparisonOp),
    /// Logical AND.
    And,
    /// Logical OR.
    Or,
    /// Left parenthesis.
    LParen,
    /// Right parenthesis.
    RParen,
    /// End of input.
    Eof,
}

impl Token<'_> {
    /// Describes the token for diagnostics.
    fn describe(&self) -> String {
        match self {
            Self::Word(text) | Self::Quoted(text) | Self::Range(text) => (*text).to_string(),
            Self::Op(op) => op.as_str().to_string(),
            Self::And => "AND".to_string(),
            Self::Or => "OR".to_string(),
            Self::LParen => "(".to_string(),
            Self::RParen => ")".to_string(),
            Self::Eof => "end of input".to_string(),
        }
    }
}

/// Token paired with its byte offset.
#[derive(Debug, Clone, Copy)]
struct SpannedToken<'a> {
    /// Token value.
    token: Token<'a>,
    /// Byte offset into the input.
    position: usize,
}

/// Lexer for the text grammar.
struct Lexer<'a> {
    /// Source input being tokenized.
    input: &'a str,
    /// Current byte offset.
    offset: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer over `input`.
    const fn new(input: &'a str) -> Self {
        Self {
            input,
            offset: 0,
        }
    }

    /// Lexes the whole input.
    fn lex(mut self) -> Result<Vec<SpannedToken<'a>>, LanguageError> {
        let mut tokens = Vec::new();
        let bytes = self.input.as_bytes();
        while let Some(&ch) = bytes.get(self.offset) {
            let start = self.offset;
            let token = match ch {
                b' ' | b'\t' | b'\n' | b'\r' => {
                    self.offset += 1;
                    continue;
                }
                b'(' => {
                    if let Some(end) = self.range_end(start) {
                        self.offset = end;
                        Token::Range(&self.input[start .. end])
                    } else {
                        self.offset += 1;
                        Token::LParen
                    }
                }
                b'[' => {
                    let end = self.range_end(start).ok_or_else(|| {
                        LanguageError::Parse(format!(
                            "Version range starting at {start} in '{}' is not terminated.",
                            self.input
                        ))
                    })?;
                    self.offset = end;
                    Token::Range(&self.input[start .. end])
                }
                b')' => {
                    self.offset += 1;
                    Token::RParen
                }
                b'"' => {
                    let close = self.input[start + 1 ..].find('"').ok_or_else(|| {
                        LanguageError::Parse(format!(
                            "Quoted string starting at {start} in '{}' is not terminated.",
                            self.input
                        ))
                    })?;
                    self.offset = start + close + 2;
                    Token::Quoted(&self.input[start .. self.offset])
                }
                b'&' | b'|' => {
                    if bytes.get(start + 1) != Some(&ch) {
                        return Err(LanguageError::Parse(format!(
                            "Logical operator '{}' is not supported.",
                            char::from(ch)
                        )));
                    }
                    self.offset += 2;
                    if ch == b'&' { Token::And } else { Token::Or }
                }
                b'=' if matches!(bytes.get(start + 1), Some(b'<' | b'>')) => {
                    self.offset += 2;
                    if bytes.get(start + 1) == Some(&b'<') {
                        Token::Op(ComparisonOp::Le)
                    } else {
                        Token::Op(ComparisonOp::Ge)
                    }
                }
                b'=' | b'<' | b'>' => {
                    let double = bytes.get(start + 1) == Some(&b'=');
                    self.offset += if double { 2 } else { 1 };
                    let op = match (ch, double) {
                        (b'=', false) => ComparisonOp::Eq,
                        (b'=', true) => ComparisonOp::EqEq,
                        (b'<', false) => ComparisonOp::Lt,
                        (b'<', true) => ComparisonOp::Le,
                        (b'>', false) => ComparisonOp::Gt,
                        _ => ComparisonOp::Ge,
                    };
                    Token::Op(op)
                }
                b'!' if bytes.get(start + 1) == Some(&b'=') => {
                    self.offset += 2;
                    Token::Op(ComparisonOp::NotEq)
                }
                _ => {
                    self.consume_word(bytes);
                    keyword_or_word(&self.input[start .. self.offset])
                }
            };
            tokens.push(SpannedToken {
                token,
                position: start,
            });
        }
        tokens.push(SpannedToken {
            token: Token::Eof,
            position: self.offset,
        });
        Ok(tokens)
    }

    /// Returns the offset just past a version range beginning at `start`.
    ///
    /// A range is a bracket, two comma separated bounds, and a closing `)` or
    /// `]`. A `(` that does not introduce a range is a grouping parenthesis.
    fn range_end(&self, start: usize) -> Option<usize> {
        let rest = &self.input[start + 1 ..];
        let close = rest.find([')', ']'])?;
        let inner = &rest[.. close];
        let (low, high) = inner.split_once(',')?;
        let bounds_ok = low != INFINITY
            && is_version_string(low)
            && is_version_string(high)
            && !high.contains(',');
        bounds_ok.then_some(start + close + 2)
    }

    /// Advances over a bare word.
    fn consume_word(&mut self, bytes: &[u8]) {
        while let Some(&b) = bytes.get(self.offset) {
            let stops = match b {
                b' ' | b'\t' | b'\n' | b'\r' | b'(' | b')' | b'"' | b'=' | b'<' | b'>' | b'&'
                | b'|' => true,
                b'!' => bytes.get(self.offset + 1) == Some(&b'='),
                _ => false,
            };
            if stops {
                break;
            }
            self.offset += 1;
        }
    }
}

/// Maps a word to a keyword token or a plain word.
fn keyword_or_word(word: &str) -> Token<'_> {
    match word {
        "AND" => Token::And,
        "OR" => Token::Or,
        "in" => Token::Op(ComparisonOp::In),
        _ => Token::Word(word),
    }
}

// ============================================================================
// SECTION: Parser
// ============================================================================

/// Recursive-descent parser for the text grammar.
struct Parser<'a> {
    /// Token stream with positions, terminated by `Eof`.
    tokens: Vec<SpannedToken<'a>>,
    /// Current token index.
    index: usize,
    /// Current parenthesis depth.
    nesting: usize,
}

impl<'a> Parser<'a> {
    /// Creates a parser over the token stream.
    const fn new(tokens: Vec<SpannedToken<'a>>) -> Self {
        Self {
            tokens,
            index: 0,
            nesting: 0,
        }
    }

    /// Parses OR groups.
    fn parse_or(&mut self) -> Result<Expression, LanguageError> {
        let mut parts = vec![self.parse_and()?];
        while self.matches(Token::Or) {
            parts.push(self.parse_and()?);
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { Expression::Any(parts) })
    }

    /// Parses AND groups.
    fn parse_and(&mut self) -> Result<Expression, LanguageError> {
        let mut parts = vec![self.parse_primary()?];
        while self.matches(Token::And) {
            parts.push(self.parse_primary()?);
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { Expression::All(parts) })
    }

    /// Parses a parenthesized group or a comparison.
    fn parse_primary(&mut self) -> Result<Expression, LanguageError> {
        let current = self.current();
        match current.token {
            Token::LParen => {
                self.advance();
                self.nesting += 1;
                if self.nesting > MAX_NESTING {
                    return Err(LanguageError::Parse(format!(
                        "Constraint expression nesting exceeds limit of {MAX_NESTING} at {}.",
                        current.position
                    )));
                }
                let inner = self.parse_or()?;
                if !self.matches(Token::RParen) {
                    return Err(LanguageError::Parse(UNMATCHED_PARENS.to_string()));
                }
                self.nesting -= 1;
                Ok(inner)
            }
            Token::RParen => Err(LanguageError::Parse(UNMATCHED_PARENS.to_string())),
            Token::Word(property) => {
                self.advance();
                self.parse_comparison(property)
            }
            other => Err(LanguageError::Parse(format!(
                "Expected a property name at {} but found '{}'.",
                current.position,
                other.describe()
            ))),
        }
    }

    /// Parses the operator and value following `property`.
    fn parse_comparison(&mut self, property: &str) -> Result<Expression, LanguageError> {
        let op = match self.current().token {
            Token::Op(op) => op,
            Token::Word(word) | Token::Quoted(word) | Token::Range(word) => {
                return Err(LanguageError::Parse(format!(
                    "Comparison operator '{word}' in expression '{property} {word}' is not \
                     supported."
                )));
            }
            _ => return Err(incomplete(property, None)),
        };
        self.advance();
        let value = match self.current().token {
            Token::Word(word) => Literal::classify_word(word),
            Token::Quoted(quoted) => Literal::classify_quoted(quoted),
            Token::Range(range) => Literal::VersionRange(range.to_string()),
            _ => return Err(incomplete(property, Some(op))),
        };
        self.advance();
        check_operator_value(op, &value)?;
        Ok(Expression::Compare(Comparison {
            property: property.to_string(),
            op,
            value,
        }))
    }

    /// Ensures every token was consumed.
    fn expect_eof(&self) -> Result<(), LanguageError> {
        let current = self.current();
        match current.token {
            Token::Eof => Ok(()),
            Token::RParen => Err(LanguageError::Parse(UNMATCHED_PARENS.to_string())),
            Token::Word(word) => Err(LanguageError::Parse(format!(
                "Logical operator '{word}' is not supported."
            ))),
            other => Err(LanguageError::Parse(format!(
                "Unexpected '{}' at {} after a complete expression.",
                other.describe(),
                current.position
            ))),
        }
    }

    /// Returns the current token.
    fn current(&self) -> SpannedToken<'a> {
        self.tokens.get(self.index).copied().unwrap_or(SpannedToken {
            token: Token::Eof,
            position: 0,
        })
    }

    /// Moves to the next token.
    const fn advance(&mut self) {
        self.index += 1;
    }

    /// Consumes the current token when it equals `token`.
    fn matches(&mut self, token: Token<'_>) -> bool {
        if self.current().token == token {
            self.advance();
            true
        } else {
            false
        }
    }
}

/// Error for a comparison with fewer than three tokens.
fn incomplete(property: &str, op: Option<ComparisonOp>) -> LanguageError {
    let fragment = op.map_or_else(|| property.to_string(), |op| format!("{property} {op}"));
    LanguageError::Parse(format!(
        "Expression '{fragment}' is incomplete; a comparison needs a property, an operator and \
         a value."
    ))
}

/// Applies the operator/value compatibility rules.
fn check_operator_value(op: ComparisonOp, value: &Literal) -> Result<(), LanguageError> {
    if op.is_ordering() {
        return match value {
            Literal::Number(_) => Ok(()),
            other => Err(LanguageError::Parse(format!(
                "Cannot use numerical comparison operator {op} with value {other}."
            ))),
        };
    }
    match (op, value) {
        (ComparisonOp::In, Literal::List(_) | Literal::Quoted(_)) => Ok(()),
        (ComparisonOp::In, Literal::VersionRange(range) | Literal::Version(range)) => {
            VersionRange::parse(range).map(|_| ()).map_err(|err| {
                LanguageError::Parse(format!("Version range {range} is not valid. {err}"))
            })
        }
        (ComparisonOp::In, _) => Err(LanguageError::Parse(
            "The 'in' operator can only be used for types version and list of strings".to_string(),
        )),
        (_, Literal::VersionRange(_)) => Err(LanguageError::Parse(
            "Version range can only use operator 'in'.".to_string(),
        )),
        (_, Literal::List(_)) => Err(LanguageError::Parse(
            "Property type list of strings can only use operator 'in'.".to_string(),
        )),
        _ => Ok(()),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use super::*;

    /// Builds a single comparison.
    fn compare(property: &str, op: ComparisonOp, value: Literal) -> Expression {
        Expression::Compare(Comparison {
            property: property.to_string(),
            op,
            value,
        })
    }

    /// Tests AND binds tighter than OR.
    #[test]
    fn and_binds_tighter_than_or() {
        let parsed = parse_constraint("a == 1 || b == 2 AND c == 3").unwrap();
        let expected = Expression::Any(vec![
            compare("a", ComparisonOp::EqEq, Literal::Number("1".to_string())),
            Expression::All(vec![
                compare("b", ComparisonOp::EqEq, Literal::Number("2".to_string())),
                compare("c", ComparisonOp::EqEq, Literal::Number("3".to_string())),
            ]),
        ]);
        assert_eq!(parsed, expected);
    }

    /// Tests parentheses group while version ranges stay values.
    #[test]
    fn parentheses_group_and_ranges_are_not_groups() {
        let parsed = parse_constraint("(a = x || b = y) && v in (1.0.0,INFINITY]").unwrap();
        let Expression::All(parts) = parsed else { panic!("expected All") };
        assert!(matches!(parts[0], Expression::Any(_)));
        assert_eq!(
            parts[1],
            compare("v", ComparisonOp::In, Literal::VersionRange("(1.0.0,INFINITY]".to_string()))
        );
    }

    /// Tests operators parse without surrounding spaces.
    #[test]
    fn operators_need_no_surrounding_spaces() {
        let parsed = parse_constraint("memory>=512&&arch!=arm").unwrap();
        assert_eq!(parsed.comparisons().len(), 2);
        assert_eq!(parsed.comparisons()[1].op, ComparisonOp::NotEq);
    }

    /// Tests `=<` and `=>` read as `<=` and `>=`.
    #[test]
    fn reversed_ordering_operators_are_accepted() {
        let parsed = parse_constraint("memory =< 512 && cpus=>2").unwrap();
        let ops: Vec<ComparisonOp> = parsed.comparisons().iter().map(|comparison| comparison.op).collect();
        assert_eq!(ops, vec![ComparisonOp::Le, ComparisonOp::Ge]);
        let message = parse_constraint("a =< b").unwrap_err().to_string();
        assert_eq!(message, "Cannot use numerical comparison operator <= with value b.");
    }

    /// Tests `in` accepts a quoted single value.
    #[test]
    fn in_accepts_single_quoted_value() {
        let parsed = parse_constraint("purpose in \"storage\"").unwrap();
        assert_eq!(parsed, compare("purpose", ComparisonOp::In, Literal::Quoted("\"storage\"".to_string())));
    }

    /// Tests quoted values keep their spaces.
    #[test]
    fn quoted_values_keep_spaces() {
        let parsed = parse_constraint("prop4 == \"some value\"").unwrap();
        assert_eq!(
            parsed,
            compare("prop4", ComparisonOp::EqEq, Literal::Quoted("\"some value\"".to_string()))
        );
    }

    /// Tests operator and value type rules.
    #[test]
    fn value_rules_are_enforced() {
        let cases = [
            ("a < abc", "Cannot use numerical comparison operator < with value abc."),
            ("a == \"x, y\"", "Property type list of strings can only use operator 'in'."),
            ("a = [1.0.0,2.0.0)", "Version range can only use operator 'in'."),
            ("a in abc", "The 'in' operator can only be used for types version and list of strings"),
        ];
        for (input, message) in cases {
            assert_eq!(parse_constraint(input).unwrap_err().to_string(), message, "{input}");
        }
    }

    /// Tests structural errors quote the offending fragment.
    #[test]
    fn structural_errors_name_the_fragment() {
        let unmatched = parse_constraint("(a == b").unwrap_err().to_string();
        assert_eq!(unmatched, UNMATCHED_PARENS);
        let extra = parse_constraint("a == b)").unwrap_err().to_string();
        assert_eq!(extra, UNMATCHED_PARENS);
        let logical = parse_constraint("a == b XOR c == d").unwrap_err().to_string();
        assert!(logical.contains("'XOR'"), "{logical}");
        let short = parse_constraint("a ==").unwrap_err().to_string();
        assert!(short.contains("'a =='"), "{short}");
        let bad_op = parse_constraint("a is b").unwrap_err().to_string();
        assert!(bad_op.contains("'is'"), "{bad_op}");
        assert!(parse_constraint("a == \"open").is_err());
        assert!(parse_constraint("   ").is_err());
    }

    /// Tests deep nesting is refused.
    #[test]
    fn nesting_is_bounded() {
        let deep = format!("{}a == b{}", "(".repeat(40), ")".repeat(40));
        let message = parse_constraint(&deep).unwrap_err().to_string();
        assert!(message.contains("nesting exceeds limit"), "{message}");
    }
}
