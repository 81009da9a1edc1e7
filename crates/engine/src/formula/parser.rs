// Formula parser - converts formula text into an expression tree
// Supports: numbers, strings, booleans, cell refs (A1, $A$1), ranges (A1:B5), labels,
// functions (SUM), arithmetic (+, -, *, /, ^, %), comparison (<, >, =, <=, >=, <>)
// and concatenation (&)
//
// Text that does not start with '=' is a literal: empty, a number, TRUE/FALSE or text.

use thiserror::Error;

use super::value::{format_number, FormulaError};
use crate::label::LabelName;
use crate::reference::{parse_cell_ref, CellRange, CellRef};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Boolean(bool),
    Cell(CellRef),
    Range(CellRange),
    Label(LabelName),
    Function {
        name: String,
        args: Vec<Expr>,
    },
    BinaryOp {
        op: Op,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Negate(Box<Expr>),
    /// Parenthesized sub-expression, kept so printing preserves grouping
    Group(Box<Expr>),
    /// Empty/omitted argument (e.g. the trailing slot in `=IF(a,b,)`)
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    // Comparison
    Lt,
    Gt,
    Eq,
    LtEq,
    GtEq,
    NotEq,
    // String
    Concat,
}

impl Op {
    pub fn symbol(&self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Pow => "^",
            Op::Lt => "<",
            Op::Gt => ">",
            Op::Eq => "=",
            Op::LtEq => "<=",
            Op::GtEq => ">=",
            Op::NotEq => "<>",
            Op::Concat => "&",
        }
    }
}

/// Why formula text did not produce an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    /// A complete expression was read but text was left over.
    #[error("Unexpected \"{unconsumed}\"")]
    Partial { unconsumed: String },
    /// The text is not a formula at all.
    #[error("{message}")]
    Invalid { text: String, message: String },
}

impl ParseFailure {
    fn invalid(text: &str, message: &str) -> Self {
        let text = text.trim_end().to_string();
        let message = if text.is_empty() {
            message.to_string()
        } else {
            format!("{} at \"{}\"", message, text)
        };
        ParseFailure::Invalid { text, message }
    }

    /// The offending text: what was left over, or where parsing stopped.
    pub fn text(&self) -> &str {
        match self {
            ParseFailure::Partial { unconsumed } => unconsumed,
            ParseFailure::Invalid { text, .. } => text,
        }
    }

    pub fn to_formula_error(&self) -> FormulaError {
        FormulaError::syntax(self.to_string())
    }
}

/// Turns formula text into an expression and back.
pub trait FormulaParser {
    fn parse(&self, text: &str) -> Result<Expr, ParseFailure>;

    /// Canonical text for a parsed expression.
    fn format(&self, expr: &Expr) -> String {
        formula_text(expr)
    }
}

/// Parser for A1-style formulas.
#[derive(Debug, Clone, Copy, Default)]
pub struct A1Parser;

impl FormulaParser for A1Parser {
    fn parse(&self, text: &str) -> Result<Expr, ParseFailure> {
        parse_formula(text)
    }
}

pub fn parse_formula(text: &str) -> Result<Expr, ParseFailure> {
    match text.trim_start().strip_prefix('=') {
        Some(body) => parse_expression(body),
        None => Ok(parse_literal(text)),
    }
}

fn parse_literal(text: &str) -> Expr {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Expr::Empty;
    }
    if let Some(n) = trimmed.parse::<f64>().ok().filter(|n| n.is_finite()) {
        return Expr::Number(n);
    }
    if trimmed.eq_ignore_ascii_case("TRUE") {
        return Expr::Boolean(true);
    }
    if trimmed.eq_ignore_ascii_case("FALSE") {
        return Expr::Boolean(false);
    }
    Expr::Text(text.to_string())
}

fn parse_expression(body: &str) -> Result<Expr, ParseFailure> {
    let tokens = tokenize(body)?;
    if tokens.is_empty() {
        return Err(ParseFailure::invalid("", "Empty formula"));
    }
    let parser = Parser { source: body, tokens };
    let (expr, pos) = parser.parse_comparison(0)?;
    if pos < parser.tokens.len() {
        return Err(ParseFailure::Partial { unconsumed: parser.rest(pos) });
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    StringLit(String),
    Cell(CellRef),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Colon,
    Comma,
    // Comparison operators
    Lt,
    Gt,
    Eq,
    LtEq,
    GtEq,
    NotEq,
    // String concatenation
    Ampersand,
    // Exponentiation and percent
    Caret,
    Percent,
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    /// Byte offset of the token in the formula body
    start: usize,
}

fn tokenize(input: &str) -> Result<Vec<Spanned>, ParseFailure> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        let single = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ':' => Some(Token::Colon),
            ',' => Some(Token::Comma),
            '&' => Some(Token::Ampersand),
            '^' => Some(Token::Caret),
            '%' => Some(Token::Percent),
            '=' => Some(Token::Eq),
            _ => None,
        };
        if let Some(token) = single {
            tokens.push(Spanned { token, start });
            chars.next();
            continue;
        }

        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '<' => {
                chars.next();
                let token = match chars.peek() {
                    Some(&(_, '=')) => {
                        chars.next();
                        Token::LtEq
                    }
                    Some(&(_, '>')) => {
                        chars.next();
                        Token::NotEq
                    }
                    _ => Token::Lt,
                };
                tokens.push(Spanned { token, start });
            }
            '>' => {
                chars.next();
                let token = if let Some(&(_, '=')) = chars.peek() {
                    chars.next();
                    Token::GtEq
                } else {
                    Token::Gt
                };
                tokens.push(Spanned { token, start });
            }
            '"' => {
                // String literal; "" inside is an escaped quote
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some((_, '"')) => {
                            if let Some(&(_, '"')) = chars.peek() {
                                chars.next();
                                s.push('"');
                            } else {
                                break;
                            }
                        }
                        Some((_, ch)) => s.push(ch),
                        None => {
                            return Err(ParseFailure::invalid(
                                &input[start..],
                                "Unterminated string literal",
                            ))
                        }
                    }
                }
                tokens.push(Spanned { token: Token::StringLit(s), start });
            }
            'A'..='Z' | 'a'..='z' | '_' | '$' => {
                // Cell reference (A1, $B$2), function name (SUM), boolean or label
                let mut end = start;
                while let Some(&(i, ch)) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' || ch == '$' || ch == '.' {
                        end = i + ch.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let ident = &input[start..end];
                let token = if let Some(cell) = parse_cell_ref(ident) {
                    Token::Cell(cell)
                } else if ident.contains('$') {
                    return Err(ParseFailure::invalid(&input[start..], "Invalid cell reference"));
                } else {
                    Token::Ident(ident.to_string())
                };
                tokens.push(Spanned { token, start });
            }
            '0'..='9' | '.' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        end = i + 1;
                        chars.next();
                    } else {
                        break;
                    }
                }
                let text = &input[start..end];
                let n: f64 = text
                    .parse()
                    .map_err(|_| ParseFailure::invalid(&input[start..], "Invalid number"))?;
                tokens.push(Spanned { token: Token::Number(n), start });
            }
            _ => return Err(ParseFailure::invalid(&input[start..], "Unexpected character")),
        }
    }

    Ok(tokens)
}

type Step = Result<(Expr, usize), ParseFailure>;

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Spanned>,
}

impl Parser<'_> {
    fn token(&self, pos: usize) -> Option<&Token> {
        self.tokens.get(pos).map(|t| &t.token)
    }

    /// Source text from token `pos` to the end.
    fn rest(&self, pos: usize) -> String {
        self.tokens
            .get(pos)
            .map(|t| self.source[t.start..].trim_end().to_string())
            .unwrap_or_default()
    }

    fn unexpected(&self, pos: usize, message: &str) -> ParseFailure {
        ParseFailure::invalid(&self.rest(pos), message)
    }

    fn binary(op: Op, left: Expr, right: Expr) -> Expr {
        Expr::BinaryOp { op, left: Box::new(left), right: Box::new(right) }
    }

    // Lowest precedence: comparison operators
    fn parse_comparison(&self, pos: usize) -> Step {
        let (mut left, mut pos) = self.parse_concat(pos)?;

        while let Some(token) = self.token(pos) {
            let op = match token {
                Token::Lt => Op::Lt,
                Token::Gt => Op::Gt,
                Token::Eq => Op::Eq,
                Token::LtEq => Op::LtEq,
                Token::GtEq => Op::GtEq,
                Token::NotEq => Op::NotEq,
                _ => break,
            };
            let (right, new_pos) = self.parse_concat(pos + 1)?;
            left = Self::binary(op, left, right);
            pos = new_pos;
        }

        Ok((left, pos))
    }

    // String concatenation (&)
    fn parse_concat(&self, pos: usize) -> Step {
        let (mut left, mut pos) = self.parse_add_sub(pos)?;

        while let Some(Token::Ampersand) = self.token(pos) {
            let (right, new_pos) = self.parse_add_sub(pos + 1)?;
            left = Self::binary(Op::Concat, left, right);
            pos = new_pos;
        }

        Ok((left, pos))
    }

    fn parse_add_sub(&self, pos: usize) -> Step {
        let (mut left, mut pos) = self.parse_mul_div(pos)?;

        while let Some(token) = self.token(pos) {
            let op = match token {
                Token::Plus => Op::Add,
                Token::Minus => Op::Sub,
                _ => break,
            };
            let (right, new_pos) = self.parse_mul_div(pos + 1)?;
            left = Self::binary(op, left, right);
            pos = new_pos;
        }

        Ok((left, pos))
    }

    fn parse_mul_div(&self, pos: usize) -> Step {
        let (mut left, mut pos) = self.parse_power(pos)?;

        while let Some(token) = self.token(pos) {
            let op = match token {
                Token::Star => Op::Mul,
                Token::Slash => Op::Div,
                _ => break,
            };
            let (right, new_pos) = self.parse_power(pos + 1)?;
            left = Self::binary(op, left, right);
            pos = new_pos;
        }

        Ok((left, pos))
    }

    // Exponentiation (^) - right-associative, higher precedence than * /
    fn parse_power(&self, pos: usize) -> Step {
        let (base, pos) = self.parse_percent(pos)?;

        if let Some(Token::Caret) = self.token(pos) {
            let (exponent, new_pos) = self.parse_power(pos + 1)?;
            return Ok((Self::binary(Op::Pow, base, exponent), new_pos));
        }

        Ok((base, pos))
    }

    // Percent postfix (%) - desugars to * 0.01
    fn parse_percent(&self, pos: usize) -> Step {
        let (mut expr, mut pos) = self.parse_primary(pos)?;

        while let Some(Token::Percent) = self.token(pos) {
            expr = Self::binary(Op::Mul, expr, Expr::Number(0.01));
            pos += 1;
        }

        Ok((expr, pos))
    }

    fn parse_primary(&self, pos: usize) -> Step {
        let Some(token) = self.token(pos) else {
            return Err(ParseFailure::invalid("", "Unexpected end of formula"));
        };

        match token {
            Token::Number(n) => Ok((Expr::Number(*n), pos + 1)),
            Token::StringLit(s) => Ok((Expr::Text(s.clone()), pos + 1)),
            Token::Cell(begin) => {
                if let (Some(Token::Colon), Some(Token::Cell(end))) =
                    (self.token(pos + 1), self.token(pos + 2))
                {
                    return Ok((Expr::Range(CellRange::new(*begin, *end)), pos + 3));
                }
                Ok((Expr::Cell(*begin), pos + 1))
            }
            Token::Ident(name) => {
                if let Some(Token::LParen) = self.token(pos + 1) {
                    let (args, new_pos) = self.parse_function_args(pos + 2)?;
                    return Ok((Expr::Function { name: name.to_ascii_uppercase(), args }, new_pos));
                }
                if name.eq_ignore_ascii_case("TRUE") {
                    return Ok((Expr::Boolean(true), pos + 1));
                }
                if name.eq_ignore_ascii_case("FALSE") {
                    return Ok((Expr::Boolean(false), pos + 1));
                }
                // Not a function call - a label, resolved at evaluation time
                let label = LabelName::new(name).map_err(|_| self.unexpected(pos, "Invalid name"))?;
                Ok((Expr::Label(label), pos + 1))
            }
            Token::LParen => {
                let (expr, pos) = self.parse_comparison(pos + 1)?;
                match self.token(pos) {
                    Some(Token::RParen) => Ok((Expr::Group(Box::new(expr)), pos + 1)),
                    Some(_) => Err(self.unexpected(pos, "Expected closing parenthesis")),
                    None => Err(ParseFailure::invalid("", "Missing closing parenthesis")),
                }
            }
            // Unary plus is a no-op
            Token::Plus => self.parse_primary(pos + 1),
            Token::Minus => {
                let (expr, pos) = self.parse_primary(pos + 1)?;
                Ok((Expr::Negate(Box::new(expr)), pos))
            }
            _ => Err(self.unexpected(pos, "Unexpected token")),
        }
    }

    fn parse_function_args(&self, pos: usize) -> Result<(Vec<Expr>, usize), ParseFailure> {
        let mut args = Vec::new();
        let mut pos = pos;

        // Handle empty function call SUM()
        if let Some(Token::RParen) = self.token(pos) {
            return Ok((args, pos + 1));
        }

        loop {
            // Empty argument: next token is , or ) immediately
            match self.token(pos) {
                Some(Token::RParen) => {
                    args.push(Expr::Empty);
                    return Ok((args, pos + 1));
                }
                Some(Token::Comma) => {
                    args.push(Expr::Empty);
                    pos += 1;
                    continue;
                }
                _ => {}
            }

            let (arg, new_pos) = self.parse_comparison(pos)?;
            args.push(arg);
            pos = new_pos;

            match self.token(pos) {
                Some(Token::RParen) => return Ok((args, pos + 1)),
                Some(Token::Comma) => pos += 1,
                Some(_) => return Err(self.unexpected(pos, "Expected comma or closing parenthesis")),
                None => {
                    return Err(ParseFailure::invalid("", "Missing closing parenthesis in function call"))
                }
            }
        }
    }
}

// =============================================================================
// Formula Printing
// =============================================================================

/// Canonical formula text for an expression, as stored on a cell.
///
/// Top-level literals print bare (`5`, `TRUE`, `hello`) unless reading the
/// bare text back would give a different literal; everything else prints as
/// `=` followed by [`format_expr`].
pub fn formula_text(expr: &Expr) -> String {
    match expr {
        Expr::Empty => String::new(),
        Expr::Number(n) => format_number(*n),
        Expr::Boolean(b) => if *b { "TRUE".to_string() } else { "FALSE".to_string() },
        Expr::Text(s) if !s.trim_start().starts_with('=') && parse_literal(s) == *expr => s.clone(),
        _ => format!("={}", format_expr(expr)),
    }
}

/// Format an expression without the leading '='.
pub fn format_expr(expr: &Expr) -> String {
    match expr {
        Expr::Empty => String::new(),
        Expr::Number(n) => format_number(*n),
        Expr::Text(s) => format!("\"{}\"", s.replace('"', "\"\"")),
        Expr::Boolean(b) => if *b { "TRUE".to_string() } else { "FALSE".to_string() },
        Expr::Cell(cell) => cell.to_string(),
        Expr::Range(range) => range.to_string(),
        Expr::Label(label) => label.to_string(),
        Expr::Function { name, args } => {
            let args: Vec<String> = args.iter().map(format_expr).collect();
            format!("{}({})", name, args.join(","))
        }
        Expr::BinaryOp { op, left, right } => {
            format!("{}{}{}", format_expr(left), op.symbol(), format_expr(right))
        }
        Expr::Negate(inner) => format!("-{}", format_expr(inner)),
        Expr::Group(inner) => format!("({})", format_expr(inner)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{ColumnRef, RowRef};

    fn parse(text: &str) -> Expr {
        parse_formula(text).unwrap()
    }

    fn roundtrip(text: &str) -> String {
        formula_text(&parse(text))
    }

    // =========================================================================
    // References
    // =========================================================================

    #[test]
    fn test_parse_absolute_both() {
        match parse("=$A$1") {
            Expr::Cell(cell) => {
                assert_eq!(cell.column, ColumnRef::absolute(0));
                assert_eq!(cell.row, RowRef::absolute(0));
            }
            other => panic!("Expected Cell, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_mixed_range() {
        match parse("=$A1:B$5") {
            Expr::Range(range) => {
                assert!(range.begin().column.is_absolute());
                assert!(!range.begin().row.is_absolute());
                assert!(!range.end().column.is_absolute());
                assert!(range.end().row.is_absolute());
            }
            other => panic!("Expected Range, got {:?}", other),
        }
    }

    #[test]
    fn test_lowercase_reference_is_canonicalized() {
        assert_eq!(roundtrip("=a1*2"), "=A1*2");
        assert_eq!(roundtrip("= $b$2 + c3"), "=$B$2+C3");
    }

    #[test]
    fn test_label_keeps_case() {
        match parse("=Revenue*2") {
            Expr::BinaryOp { left, .. } => match *left {
                Expr::Label(label) => assert_eq!(label.as_str(), "Revenue"),
                other => panic!("Expected Label, got {:?}", other),
            },
            other => panic!("Expected BinaryOp, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_dollar_reference() {
        let err = parse_formula("=$$A1").unwrap_err();
        assert!(matches!(err, ParseFailure::Invalid { .. }));
        assert_eq!(err.text(), "$$A1");
    }

    // =========================================================================
    // Operators and grouping
    // =========================================================================

    #[test]
    fn test_parse_power_right_associative() {
        match parse("=2^3^2") {
            Expr::BinaryOp { op: Op::Pow, right, .. } => {
                assert!(matches!(*right, Expr::BinaryOp { op: Op::Pow, .. }));
            }
            other => panic!("Expected Pow, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_percent() {
        assert_eq!(roundtrip("=50%"), "=50*0.01");
    }

    #[test]
    fn test_grouping_survives_printing() {
        assert_eq!(roundtrip("=(A1+1)*2"), "=(A1+1)*2");
        assert_eq!(roundtrip("=-(B2-C2)"), "=-(B2-C2)");
    }

    #[test]
    fn test_unary_plus_roundtrip_drops_plus() {
        assert_eq!(roundtrip("=+A1"), "=A1");
    }

    #[test]
    fn test_comparison_and_concat() {
        assert_eq!(roundtrip("=A1&\"x\"<>B1"), "=A1&\"x\"<>B1");
    }

    // =========================================================================
    // Functions
    // =========================================================================

    #[test]
    fn test_function_name_uppercased() {
        assert_eq!(roundtrip("=sum(A1:B2, 3)"), "=SUM(A1:B2,3)");
    }

    #[test]
    fn test_empty_arg_trailing() {
        match parse("=IF(A1,1,)") {
            Expr::Function { args, .. } => {
                assert_eq!(args.len(), 3);
                assert_eq!(args[2], Expr::Empty);
            }
            other => panic!("Expected Function, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_arg_roundtrip() {
        assert_eq!(roundtrip("=IF(,1,)"), "=IF(,1,)");
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(parse("=\"say \"\"hi\"\"\""), Expr::Text("say \"hi\"".to_string()));
        assert_eq!(roundtrip("=\"a\"\"b\"&C1"), "=\"a\"\"b\"&C1");
    }

    #[test]
    fn test_invalid_cell_reference_marker_parses() {
        assert_eq!(
            roundtrip("=INVALIDCELLREFERENCE(\"B1\")*2"),
            "=INVALIDCELLREFERENCE(\"B1\")*2"
        );
    }

    // =========================================================================
    // Failures
    // =========================================================================

    #[test]
    fn test_partial_parse_names_leftover() {
        let err = parse_formula("=A1 B1+2").unwrap_err();
        assert_eq!(err, ParseFailure::Partial { unconsumed: "B1+2".to_string() });
        assert_eq!(err.to_formula_error().message, "Unexpected \"B1+2\"");
    }

    #[test]
    fn test_unexpected_end() {
        let err = parse_formula("=1+").unwrap_err();
        assert_eq!(err.to_string(), "Unexpected end of formula");
    }

    #[test]
    fn test_unclosed_function() {
        let err = parse_formula("=SUM(1,2").unwrap_err();
        assert!(matches!(err, ParseFailure::Invalid { .. }));
    }

    #[test]
    fn test_unexpected_character() {
        let err = parse_formula("=1+#").unwrap_err();
        assert_eq!(err.text(), "#");
        assert_eq!(err.to_string(), "Unexpected character at \"#\"");
    }

    #[test]
    fn test_empty_formula() {
        assert!(parse_formula("=").is_err());
        assert!(parse_formula("=   ").is_err());
    }

    #[test]
    fn test_reserved_word_is_not_a_label() {
        // SUM without parentheses cannot be a label
        let err = parse_formula("=SUM+1").unwrap_err();
        assert_eq!(err.text(), "SUM+1");
    }

    // =========================================================================
    // Literals
    // =========================================================================

    #[test]
    fn test_literals() {
        assert_eq!(parse(""), Expr::Empty);
        assert_eq!(parse("42"), Expr::Number(42.0));
        assert_eq!(parse(" 1.5 "), Expr::Number(1.5));
        assert_eq!(parse("true"), Expr::Boolean(true));
        assert_eq!(parse("hello"), Expr::Text("hello".to_string()));
        assert_eq!(parse("NaN"), Expr::Text("NaN".to_string()));
    }

    #[test]
    fn test_literal_text_keeps_expression_form_when_ambiguous() {
        assert_eq!(roundtrip("=\"5\""), "=\"5\"");
        assert_eq!(roundtrip("=\"=A1\""), "=\"=A1\"");
        assert_eq!(roundtrip("=\"abc\""), "abc");
        assert_eq!(roundtrip("=1.50"), "1.5");
    }

    #[test]
    fn test_decimal_numbers_not_broken() {
        assert_eq!(roundtrip("=.5*A1"), "=0.5*A1");
        assert!(parse_formula("=1.2.3").is_err());
    }
}
