//! Local arithmetic for numbers-only questions
//!
//! Pulls the arithmetic sub-expression out of free text and evaluates it
//! with a small recursive-descent parser. Only `+ - * /`, unary minus,
//! parentheses and decimal numbers are understood.

use std::sync::OnceLock;

use regex::Regex;

use crate::intent;

/// Longest run of characters still considered an expression
const MAX_EXPRESSION_LEN: usize = 256;

/// Deepest nesting of parentheses and unary signs the parser follows
const MAX_DEPTH: usize = 64;

/// Extract and evaluate the arithmetic in `text`
///
/// Returns the formatted result, or `None` when no expression is found or it
/// cannot be evaluated (for example division by zero).
pub fn answer(text: &str) -> Option<String> {
    let expression = extract(text)?;
    let value = evaluate(&expression)?;
    Some(format_number(value))
}

/// Longest run of arithmetic characters that contains an operator between
/// two operands
///
/// Hyphenated digit groups such as dates, phone numbers and version ranges
/// are not expressions. A lone `a-b` pair only counts when the text also
/// asks for a calculation.
pub fn extract(text: &str) -> Option<String> {
    let normalized = text.replace('×', "*").replace('÷', "/");
    let cued = calculation_cue().is_match(&normalized) || intent::asks_for_number(&normalized);

    let mut best: Option<String> = None;
    let mut current = String::new();
    let mut before: Option<char> = None;

    for ch in normalized.chars().chain(std::iter::once('\n')) {
        if is_expression_char(ch) && ch != '\n' {
            current.push(ch);
            continue;
        }

        let neighbours = Neighbours {
            before: before.filter(|_| !current.starts_with(char::is_whitespace)),
            after: Some(ch).filter(|_| !current.ends_with(char::is_whitespace)),
        };
        let candidate = current.trim();
        if is_candidate(candidate, neighbours, cued) && best.as_ref().is_none_or(|b| candidate.len() > b.len()) {
            best = Some(candidate.to_owned());
        }
        current.clear();
        before = Some(ch);
    }

    best
}

fn calculation_cue() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)=|\bwhat(?:'s|\s+is)\b|\b(?:calculate|compute|evaluate|solve|minus)\b|\bhow\s+much\b|等于|多少|计算|計算")
            .expect("valid regex")
    })
}

/// Characters touching a run on either side, `None` when it is spaced off
#[derive(Debug, Clone, Copy)]
struct Neighbours {
    before: Option<char>,
    after: Option<char>,
}

impl Neighbours {
    fn glued_to_word(self) -> bool {
        self.before.is_some_and(char::is_alphanumeric) || self.after.is_some_and(char::is_alphanumeric)
    }
}

const fn is_expression_char(ch: char) -> bool {
    ch.is_ascii_digit() || matches!(ch, '+' | '-' | '*' | '/' | '(' | ')' | '.' | ' ' | '\t')
}

fn is_candidate(candidate: &str, neighbours: Neighbours, cued: bool) -> bool {
    if candidate.len() > MAX_EXPRESSION_LEN {
        return false;
    }

    let digits = candidate.chars().filter(char::is_ascii_digit).count();
    let has_binary_operator = candidate
        .char_indices()
        .skip(1)
        .any(|(_, ch)| matches!(ch, '+' | '-' | '*' | '/'));

    if digits < 2 || !has_binary_operator {
        return false;
    }

    if is_hyphen_chain(candidate) {
        let groups: Vec<&str> = candidate.split('-').collect();
        return groups.len() == 2
            && groups.iter().all(|group| group.matches('.').count() <= 1)
            && !neighbours.glued_to_word()
            && cued;
    }

    true
}

/// Digit groups joined only by `-` with no spacing, like `2024-10-17`
fn is_hyphen_chain(candidate: &str) -> bool {
    candidate.contains('-')
        && candidate
            .split('-')
            .all(|group| !group.is_empty() && group.chars().all(|ch| ch.is_ascii_digit() || ch == '.'))
}

/// Evaluate an arithmetic expression
pub fn evaluate(expression: &str) -> Option<f64> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser {
        tokens,
        position: 0,
        depth: 0,
    };

    let value = parser.expression()?;
    if parser.position != parser.tokens.len() {
        return None;
    }

    value.is_finite().then_some(value)
}

/// Integers print without decimals, everything else with trailing zeros
/// trimmed
pub fn format_number(value: f64) -> String {
    // -0.0 would print as "-0"
    let value = if value == 0.0 { 0.0 } else { value };

    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{value:.0}");
    }

    let text = format!("{value:.10}");
    match text.trim_end_matches('0').trim_end_matches('.') {
        "-0" => "0".to_owned(),
        trimmed => trimmed.to_owned(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Open,
    Close,
}

fn tokenize(expression: &str) -> Option<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            ' ' | '\t' => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&digit) = chars.peek() {
                    if digit.is_ascii_digit() || digit == '.' {
                        literal.push(digit);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(literal.parse().ok()?));
            }
            _ => {
                let token = match ch {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '(' => Token::Open,
                    ')' => Token::Close,
                    _ => return None,
                };
                tokens.push(token);
                chars.next();
            }
        }
    }

    Some(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.position).copied()
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.peek()?;
        self.position += 1;
        Some(token)
    }

    // expression := term (('+' | '-') term)*
    fn expression(&mut self) -> Option<f64> {
        let mut value = self.term()?;

        while let Some(token @ (Token::Plus | Token::Minus)) = self.peek() {
            self.position += 1;
            let rhs = self.term()?;
            value = if token == Token::Plus { value + rhs } else { value - rhs };
        }

        Some(value)
    }

    // term := factor (('*' | '/') factor)*
    fn term(&mut self) -> Option<f64> {
        let mut value = self.factor()?;

        while let Some(token @ (Token::Star | Token::Slash)) = self.peek() {
            self.position += 1;
            let rhs = self.factor()?;

            value = if token == Token::Star {
                value * rhs
            } else {
                if rhs == 0.0 {
                    return None;
                }
                value / rhs
            };
        }

        Some(value)
    }

    // factor := '-' factor | '+' factor | number | '(' expression ')'
    fn factor(&mut self) -> Option<f64> {
        if self.depth >= MAX_DEPTH {
            return None;
        }

        self.depth += 1;
        let value = self.primary();
        self.depth -= 1;
        value
    }

    fn primary(&mut self) -> Option<f64> {
        match self.advance()? {
            Token::Minus => self.factor().map(|v| -v),
            Token::Plus => self.factor(),
            Token::Number(value) => Some(value),
            Token::Open => {
                let value = self.expression()?;
                match self.advance()? {
                    Token::Close => Some(value),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_simple_questions() {
        assert_eq!(answer("2+2=?").as_deref(), Some("4"));
        assert_eq!(answer("What is 12 * (3 + 4)? Numbers only.").as_deref(), Some("84"));
        assert_eq!(answer("10 ÷ 4").as_deref(), Some("2.5"));
        assert_eq!(answer("7×6").as_deref(), Some("42"));
    }

    #[test]
    fn precedence_and_unary_minus() {
        assert_eq!(evaluate("2 + 3 * 4"), Some(14.0));
        assert_eq!(evaluate("(2 + 3) * 4"), Some(20.0));
        assert_eq!(evaluate("-3 + 5"), Some(2.0));
        assert_eq!(evaluate("2 * -3"), Some(-6.0));
        assert_eq!(evaluate("8 / 2 / 2"), Some(2.0));
        assert_eq!(evaluate("10 - 4 - 3"), Some(3.0));
    }

    #[test]
    fn division_by_zero_fails() {
        assert_eq!(evaluate("1 / 0"), None);
        assert_eq!(answer("5/(2-2)"), None);
    }

    #[test]
    fn malformed_expressions_fail() {
        assert_eq!(evaluate("2 +"), None);
        assert_eq!(evaluate("(2 + 3"), None);
        assert_eq!(evaluate("2 3"), None);
        assert_eq!(evaluate("1..2 + 1"), None);
    }

    #[test]
    fn text_without_arithmetic_has_no_answer() {
        assert_eq!(answer("hello there"), None);
        assert_eq!(answer("the year 2024"), None);
        assert_eq!(answer("numbers only please"), None);
    }

    #[test]
    fn extract_picks_the_longest_expression() {
        assert_eq!(extract("first 1+1, then (3 + 4) * 2").as_deref(), Some("(3 + 4) * 2"));
    }

    #[test]
    fn formats_numbers() {
        assert_eq!(format_number(4.0), "4");
        assert_eq!(format_number(-12.0), "-12");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(1.0 / 3.0), "0.3333333333");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(-1e-12), "0");
        assert_eq!(answer("what is 0 * -1").as_deref(), Some("0"));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let parens = format!("{}1+1{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(evaluate(&parens), None);

        let signs = format!("{}1+1", "-".repeat(100));
        assert_eq!(evaluate(&signs), None);

        let shallow = format!("{}1+1{}", "(".repeat(10), ")".repeat(10));
        assert_eq!(evaluate(&shallow), Some(2.0));
    }

    #[test]
    fn huge_runs_are_not_expressions() {
        let text = format!("what is {}1+1", "(".repeat(200_000));
        assert_eq!(answer(&text), None);

        let text = format!("{}1+1", "-".repeat(1_000_000));
        assert_eq!(answer(&text), None);
    }

    #[test]
    fn hyphenated_numbers_are_not_arithmetic() {
        assert_eq!(answer("Do you remember what happened on 2024-10-17 at the harbor?"), None);
        assert_eq!(answer("Call me at 555-123-4567 tonight."), None);
        assert_eq!(answer("Works on versions 1.2.0-1.4.3"), None);
        assert_eq!(answer("Runs on v1.2-1.4 only"), None);
        assert_eq!(answer("I read pages 10-20 yesterday."), None);
    }

    #[test]
    fn cued_subtraction_still_counts() {
        assert_eq!(answer("what is 10-4").as_deref(), Some("6"));
        assert_eq!(answer("10-4=?").as_deref(), Some("6"));
        assert_eq!(answer("10 - 4").as_deref(), Some("6"));
        assert_eq!(answer("On 2024-10-17 she asked: what is 2+3?").as_deref(), Some("5"));
    }
}
