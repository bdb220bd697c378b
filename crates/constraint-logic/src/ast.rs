// crates/constraint-logic/src/ast.rs
// ============================================================================
// Module: Constraint Expression Tree
// Description: Typed tree produced by constraint language parsers.
// Purpose: Give evaluators a grammar-independent view of a constraint.
// Dependencies: none
// ============================================================================

//! ## Overview
//! Parsers produce an [`Expression`]: nested `All`/`Any` groups whose leaves
//! are [`Comparison`]s of a property name against a [`Literal`]. Literals keep
//! the exact source text so evaluators can apply their own typing rules.

use std::fmt;

// ============================================================================
// SECTION: Operators
// ============================================================================

/// Comparison operator between a property and a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComparisonOp {
    /// `=`
    Eq,
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `in`
    In,
}

impl ComparisonOp {
    /// Every operator, in source-text order.
    pub const ALL: [Self; 8] =
        [Self::Eq, Self::EqEq, Self::NotEq, Self::Lt, Self::Gt, Self::Le, Self::Ge, Self::In];

    /// Returns the operator as written in constraint text.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::EqEq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::In => "in",
        }
    }

    /// Parses an operator from its source text.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == text)
    }

    /// Returns true for `<`, `>`, `<=` and `>=`.
    #[must_use]
    pub const fn is_ordering(self) -> bool {
        matches!(self, Self::Lt | Self::Gt | Self::Le | Self::Ge)
    }

    /// Returns true for `=` and `==`.
    #[must_use]
    pub const fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::EqEq)
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Literals
// ============================================================================

/// Right-hand side of a comparison, classified by shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    /// Bare word such as `true` or `x86_64`.
    Word(String),
    /// Integer or decimal number.
    Number(String),
    /// Bare three part version such as `1.2.3`.
    Version(String),
    /// Interval expression such as `[1.0.0,2.0.0)`.
    VersionRange(String),
    /// Double-quoted string without commas, quotes included.
    Quoted(String),
    /// Double-quoted comma separated list, quotes included.
    List(String),
}

impl Literal {
    /// Classifies a bare word.
    #[must_use]
    pub fn classify_word(word: &str) -> Self {
        if is_number(word) {
            Self::Number(word.to_string())
        } else if is_three_part_version(word) {
            Self::Version(word.to_string())
        } else {
            Self::Word(word.to_string())
        }
    }

    /// Classifies a quoted string, quotes included.
    #[must_use]
    pub fn classify_quoted(quoted: &str) -> Self {
        if quoted.contains(',') {
            Self::List(quoted.to_string())
        } else {
            Self::Quoted(quoted.to_string())
        }
    }

    /// Returns the literal exactly as written.
    #[must_use]
    pub fn raw(&self) -> &str {
        match self {
            Self::Word(raw)
            | Self::Number(raw)
            | Self::Version(raw)
            | Self::VersionRange(raw)
            | Self::Quoted(raw)
            | Self::List(raw) => raw,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw())
    }
}

/// Matches `-?\d+(\.\d+)?`.
fn is_number(word: &str) -> bool {
    let digits = word.strip_prefix('-').unwrap_or(word);
    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (digits, None),
    };
    let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    all_digits(whole) && fraction.is_none_or(all_digits)
}

/// Matches `\d+\.\d+\.\d+`.
fn is_three_part_version(word: &str) -> bool {
    let parts: Vec<&str> = word.split('.').collect();
    parts.len() == 3
        && parts.iter().all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
}

// ============================================================================
// SECTION: Expressions
// ============================================================================

/// Single `property op value` comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    /// Property name on the left-hand side.
    pub property: String,
    /// Comparison operator.
    pub op: ComparisonOp,
    /// Value on the right-hand side.
    pub value: Literal,
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.property, self.op, self.value)
    }
}

/// Boolean expression over comparisons.
///
/// # Invariants
/// - `All` and `Any` hold at least two children when produced by a parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// Every child must hold.
    All(Vec<Self>),
    /// At least one child must hold.
    Any(Vec<Self>),
    /// Leaf comparison.
    Compare(Comparison),
}

impl Expression {
    /// Returns every comparison in the tree, left to right.
    #[must_use]
    pub fn comparisons(&self) -> Vec<&Comparison> {
        let mut out = Vec::new();
        self.collect_comparisons(&mut out);
        out
    }

    /// Appends the comparisons under this node to `out`.
    fn collect_comparisons<'a>(&'a self, out: &mut Vec<&'a Comparison>) {
        match self {
            Self::All(children) | Self::Any(children) => {
                for child in children {
                    child.collect_comparisons(out);
                }
            }
            Self::Compare(comparison) => out.push(comparison),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare(comparison) => write!(f, "{comparison}"),
            Self::All(children) | Self::Any(children) => {
                let joiner = if matches!(self, Self::All(_)) { " && " } else { " || " };
                f.write_str("(")?;
                for (index, child) in children.iter().enumerate() {
                    if index > 0 {
                        f.write_str(joiner)?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests literal words are typed by their shape.
    #[test]
    fn words_are_classified_by_shape() {
        assert_eq!(Literal::classify_word("42"), Literal::Number("42".to_string()));
        assert_eq!(Literal::classify_word("-1.5"), Literal::Number("-1.5".to_string()));
        assert_eq!(Literal::classify_word("1.2.3"), Literal::Version("1.2.3".to_string()));
        assert_eq!(Literal::classify_word("1."), Literal::Word("1.".to_string()));
        assert_eq!(Literal::classify_word("amd64"), Literal::Word("amd64".to_string()));
    }

    /// Tests commas inside quotes form a string list.
    #[test]
    fn quoted_commas_make_lists() {
        assert!(matches!(Literal::classify_quoted("\"a,b\""), Literal::List(_)));
        assert!(matches!(Literal::classify_quoted("\"a b\""), Literal::Quoted(_)));
    }

    /// Tests operator text maps back to the same operator.
    #[test]
    fn operators_round_trip_through_text() {
        for op in ComparisonOp::ALL {
            assert_eq!(ComparisonOp::parse(op.as_str()), Some(op));
        }
        assert_eq!(ComparisonOp::parse("=>"), None);
    }
}
