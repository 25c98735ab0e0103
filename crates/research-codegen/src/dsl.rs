//! Tier-2 expression language.
//!
//! A small, non-Turing-complete language over indicators and price series:
//!
//! ```text
//! expr  := or
//! or    := and ("or" and)*
//! and   := not ("and" not)*
//! not   := "not" not | cmp
//! cmp   := sum (("<" | ">" | "<=" | ">=" | "==" | "!=") sum)?
//! sum   := term (("+" | "-") term)*
//! term  := atom (("*" | "/") atom)*
//! atom  := number | series | call | "(" expr ")"
//! call  := fn "(" expr ("," expr)* ")"
//! ```
//!
//! Functions: `sma, ema, roc, rsi, std, max, min, cross_above, cross_below`.
//! Series: `close, open, high, low, volume`. Anything else is an error, so
//! a definition cannot smuggle arbitrary code through the expression.

use std::collections::BTreeSet;

/// Recognized indicator/combinator functions with their arities.
pub const FUNCTIONS: &[(&str, usize)] = &[
    ("sma", 2),
    ("ema", 2),
    ("roc", 2),
    ("rsi", 2),
    ("std", 2),
    ("max", 2),
    ("min", 2),
    ("cross_above", 2),
    ("cross_below", 2),
];

/// Recognized price series.
pub const SERIES: &[&str] = &["close", "open", "high", "low", "volume"];

/// DSL failures.
#[derive(Debug, thiserror::Error)]
pub enum DslError {
    #[error("unexpected character '{0}' at byte {1}")]
    UnexpectedChar(char, usize),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),

    #[error("unknown identifier '{0}' (not a series or function)")]
    UnknownIdentifier(String),

    #[error("{0} takes {1} arguments, got {2}")]
    Arity(String, usize, usize),

    #[error("trailing input after expression: '{0}'")]
    TrailingInput(String),
}

// =============================================================================
// Tokens
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    NotEq,
}

fn tokenize(input: &str) -> Result<Vec<Token>, DslError> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '<' | '>' | '=' | '!' => {
                let two = bytes.get(i + 1).map(|&b| b as char) == Some('=');
                tokens.push(match (c, two) {
                    ('<', true) => Token::Le,
                    ('<', false) => Token::Lt,
                    ('>', true) => Token::Ge,
                    ('>', false) => Token::Gt,
                    ('=', true) => Token::EqEq,
                    ('!', true) => Token::NotEq,
                    _ => return Err(DslError::UnexpectedChar(c, i)),
                });
                i += if two { 2 } else { 1 };
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < bytes.len()
                    && ((bytes[i] as char).is_ascii_digit() || bytes[i] == b'.')
                {
                    i += 1;
                }
                let text = &input[start..i];
                let value = text
                    .parse::<f64>()
                    .map_err(|_| DslError::UnexpectedToken(text.to_string()))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < bytes.len()
                    && ((bytes[i] as char).is_ascii_alphanumeric() || bytes[i] == b'_')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(input[start..i].to_string()));
            }
            other => return Err(DslError::UnexpectedChar(other, i)),
        }
    }
    Ok(tokens)
}

// =============================================================================
// AST
// =============================================================================

/// Comparison and arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinOp {
    fn python(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

/// Parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// A price series reference.
    Series(String),
    /// `fn(args...)` over the known function set.
    Call { name: String, args: Vec<Expr> },
    Unary { negate: bool, inner: Box<Expr> },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    /// All indicator functions referenced, for the logic fingerprint.
    pub fn indicators(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_indicators(&mut out);
        out
    }

    fn collect_indicators(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Call { name, args } => {
                out.insert(name.clone());
                for arg in args {
                    arg.collect_indicators(out);
                }
            }
            Expr::Unary { inner, .. } => inner.collect_indicators(out),
            Expr::Binary { left, right, .. } => {
                left.collect_indicators(out);
                right.collect_indicators(out);
            }
            Expr::Number(_) | Expr::Series(_) => {}
        }
    }
}

// =============================================================================
// Parser
// =============================================================================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, token: Token) -> Result<(), DslError> {
        match self.next() {
            Some(found) if found == token => Ok(()),
            Some(found) => Err(DslError::UnexpectedToken(format!("{found:?}"))),
            None => Err(DslError::UnexpectedEnd),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, DslError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Ident(s)) if s == "or") {
            self.next();
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: BinOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, DslError> {
        let mut left = self.parse_not()?;
        while matches!(self.peek(), Some(Token::Ident(s)) if s == "and") {
            self.next();
            let right = self.parse_not()?;
            left = Expr::Binary {
                op: BinOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, DslError> {
        if matches!(self.peek(), Some(Token::Ident(s)) if s == "not") {
            self.next();
            let inner = self.parse_not()?;
            return Ok(Expr::Unary {
                negate: true,
                inner: Box::new(inner),
            });
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Expr, DslError> {
        let left = self.parse_sum()?;
        let op = match self.peek() {
            Some(Token::Lt) => Some(BinOp::Lt),
            Some(Token::Gt) => Some(BinOp::Gt),
            Some(Token::Le) => Some(BinOp::Le),
            Some(Token::Ge) => Some(BinOp::Ge),
            Some(Token::EqEq) => Some(BinOp::Eq),
            Some(Token::NotEq) => Some(BinOp::Ne),
            _ => None,
        };
        if let Some(op) = op {
            self.next();
            let right = self.parse_sum()?;
            return Ok(Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn parse_sum(&mut self) -> Result<Expr, DslError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.next();
            let right = self.parse_term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, DslError> {
        let mut left = self.parse_atom()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.next();
            let right = self.parse_atom()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_atom(&mut self) -> Result<Expr, DslError> {
        match self.next() {
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Minus) => {
                // Negative literal only; general unary minus stays out of
                // the language.
                match self.next() {
                    Some(Token::Number(value)) => Ok(Expr::Number(-value)),
                    other => Err(DslError::UnexpectedToken(format!("{other:?}"))),
                }
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.next();
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        loop {
                            args.push(self.parse_or()?);
                            match self.peek() {
                                Some(Token::Comma) => {
                                    self.next();
                                }
                                _ => break,
                            }
                        }
                    }
                    self.expect(Token::RParen)?;

                    let Some(&(_, arity)) =
                        FUNCTIONS.iter().find(|(fn_name, _)| *fn_name == name)
                    else {
                        return Err(DslError::UnknownIdentifier(name));
                    };
                    if args.len() != arity {
                        return Err(DslError::Arity(name, arity, args.len()));
                    }
                    Ok(Expr::Call { name, args })
                } else {
                    if !SERIES.contains(&name.as_str()) {
                        return Err(DslError::UnknownIdentifier(name));
                    }
                    Ok(Expr::Series(name))
                }
            }
            Some(other) => Err(DslError::UnexpectedToken(format!("{other:?}"))),
            None => Err(DslError::UnexpectedEnd),
        }
    }
}

/// Parse and validate an expression.
pub fn parse_expr(input: &str) -> Result<Expr, DslError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        let rest: Vec<String> = parser.tokens[parser.pos..]
            .iter()
            .map(|t| format!("{t:?}"))
            .collect();
        return Err(DslError::TrailingInput(rest.join(" ")));
    }
    Ok(expr)
}

// =============================================================================
// Compilation
// =============================================================================

/// Deterministic variable name for an indicator call over a series.
fn slot_name(name: &str, args: &[Expr]) -> String {
    let mut parts = vec![name.to_string()];
    for arg in args {
        match arg {
            Expr::Series(series) => parts.push(series.clone()),
            Expr::Number(value) => parts.push(format_number(*value).replace('.', "_")),
            _ => parts.push("x".into()),
        }
    }
    parts.join("_")
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Compiled expression: a python condition plus the indicator slots it needs.
#[derive(Debug, Clone)]
pub struct Compiled {
    /// Python boolean expression over `self.slots[...]` values.
    pub condition: String,
    /// `(slot, indicator, period)` registrations, sorted.
    pub slots: Vec<(String, String, u32)>,
}

/// Compile an expression to python against the emitted runtime helpers.
pub fn compile_expr(expr: &Expr) -> Compiled {
    let mut slots = BTreeSet::new();
    let condition = emit(expr, &mut slots);
    Compiled {
        condition,
        slots: slots.into_iter().collect(),
    }
}

fn emit(expr: &Expr, slots: &mut BTreeSet<(String, String, u32)>) -> String {
    match expr {
        Expr::Number(value) => format_number(*value),
        Expr::Series(series) => format!("self.series_value(\"{series}\")"),
        Expr::Unary { negate, inner } => {
            let inner = emit(inner, slots);
            if *negate {
                format!("(not {inner})")
            } else {
                inner
            }
        }
        Expr::Binary { op, left, right } => {
            format!(
                "({} {} {})",
                emit(left, slots),
                op.python(),
                emit(right, slots)
            )
        }
        Expr::Call { name, args } => match name.as_str() {
            "cross_above" | "cross_below" => {
                let a = emit(&args[0], slots);
                let b = emit(&args[1], slots);
                let prev_a = previous(&args[0], slots);
                let prev_b = previous(&args[1], slots);
                if name == "cross_above" {
                    format!("({a} > {b} and {prev_a} <= {prev_b})")
                } else {
                    format!("({a} < {b} and {prev_a} >= {prev_b})")
                }
            }
            _ => {
                let slot = register(name, args, slots);
                format!("self.slot_value(\"{slot}\")")
            }
        },
    }
}

/// Previous-bar value of a subexpression (indicator slots and series only).
fn previous(expr: &Expr, slots: &mut BTreeSet<(String, String, u32)>) -> String {
    match expr {
        Expr::Call { name, args } if name != "cross_above" && name != "cross_below" => {
            let slot = register(name, args, slots);
            format!("self.slot_previous(\"{slot}\")")
        }
        Expr::Series(series) => format!("self.series_previous(\"{series}\")"),
        other => emit(other, slots),
    }
}

fn register(name: &str, args: &[Expr], slots: &mut BTreeSet<(String, String, u32)>) -> String {
    let slot = slot_name(name, args);
    let period = args
        .iter()
        .find_map(|arg| match arg {
            Expr::Number(value) => Some(*value as u32),
            _ => None,
        })
        .unwrap_or(14);
    slots.insert((slot.clone(), name.to_string(), period));
    slot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_golden_cross() {
        let expr = parse_expr("cross_above(sma(close, 50), sma(close, 200))").unwrap();
        let indicators = expr.indicators();
        assert!(indicators.contains("cross_above"));
        assert!(indicators.contains("sma"));
    }

    #[test]
    fn test_unknown_identifier_rejected() {
        assert!(matches!(
            parse_expr("evil_function(close, 10)"),
            Err(DslError::UnknownIdentifier(_))
        ));
        assert!(matches!(
            parse_expr("portfolio"),
            Err(DslError::UnknownIdentifier(_))
        ));
    }

    #[test]
    fn test_arity_enforced() {
        assert!(matches!(
            parse_expr("sma(close)"),
            Err(DslError::Arity(_, 2, 1))
        ));
    }

    #[test]
    fn test_precedence_and_parens() {
        let expr = parse_expr("rsi(close, 14) < 30 and close > sma(close, 200)").unwrap();
        match expr {
            Expr::Binary { op: BinOp::And, .. } => {}
            other => panic!("expected top-level and, got {other:?}"),
        }
    }

    #[test]
    fn test_trailing_input_rejected() {
        assert!(matches!(
            parse_expr("close > 10 close"),
            Err(DslError::TrailingInput(_))
        ));
    }

    #[test]
    fn test_compile_is_deterministic() {
        let expr = parse_expr("sma(close, 50) > sma(close, 200) and rsi(close, 14) < 70").unwrap();
        let a = compile_expr(&expr);
        let b = compile_expr(&expr);
        assert_eq!(a.condition, b.condition);
        assert_eq!(a.slots, b.slots);
        // Slots are sorted for stable emission order.
        assert_eq!(
            a.slots.iter().map(|s| s.0.as_str()).collect::<Vec<_>>(),
            vec!["rsi_close_14", "sma_close_200", "sma_close_50"]
        );
    }

    #[test]
    fn test_arithmetic_compiles() {
        let expr = parse_expr("(sma(close, 10) - sma(close, 20)) / std(close, 20) > 1.5").unwrap();
        let compiled = compile_expr(&expr);
        assert!(compiled.condition.contains("/"));
        assert_eq!(compiled.slots.len(), 3);
    }
}
