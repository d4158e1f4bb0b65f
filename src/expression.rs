//! Lexer for inline template directives.
//!
//! A string scalar is split into literal text interleaved with directive
//! tokens:
//!
//! - `@snowflake` - a fresh identifier
//! - `@gen:<category>.<method>` or `@gen:<category>.<method>(<args>)` - a
//!   synthesized value
//!
//! Arrays use a separate `@repeat(min[,max])` head element, parsed by
//! [`parse_repeat`].

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

static DIRECTIVE_REGEX: OnceLock<Regex> = OnceLock::new();
static REPEAT_REGEX: OnceLock<Regex> = OnceLock::new();
static NUMBER_REGEX: OnceLock<Regex> = OnceLock::new();

fn directive_regex() -> &'static Regex {
    DIRECTIVE_REGEX.get_or_init(|| {
        Regex::new(
            r"@snowflake|@gen:([A-Za-z][A-Za-z0-9_]*)\.([A-Za-z][A-Za-z0-9_]*)(?:\(([^)]*)\))?",
        )
        .unwrap()
    })
}

fn repeat_regex() -> &'static Regex {
    REPEAT_REGEX.get_or_init(|| Regex::new(r"^@repeat\((\d+)(?:,(\d+))?\)$").unwrap())
}

fn number_regex() -> &'static Regex {
    NUMBER_REGEX.get_or_init(|| Regex::new(r"^-?\d+(\.\d+)?$").unwrap())
}

/// One piece of a lexed string.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Plain text copied to the output
    Literal(String),
    /// `@snowflake`
    Snowflake,
    /// `@gen:...`
    Generator(GeneratorCall),
}

/// A parsed `@gen:` expression.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorCall {
    /// Source text, substituted back when the call cannot be resolved
    pub raw: String,
    pub category: String,
    pub method: String,
    pub args: Vec<Arg>,
}

/// Positional generator argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    /// Unrecognized token, passed through as written
    Raw(String),
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Int(n) => write!(f, "{n}"),
            Arg::Float(n) => write!(f, "{n}"),
            Arg::Str(s) | Arg::Raw(s) => f.write_str(s),
            Arg::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Split a string into literal and directive tokens.
///
/// Returns a single literal token when the input holds no directives.
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut last = 0;

    for caps in directive_regex().captures_iter(input) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if whole.start() > last {
            tokens.push(Token::Literal(input[last..whole.start()].to_string()));
        }
        last = whole.end();

        match (caps.get(1), caps.get(2)) {
            (Some(category), Some(method)) => tokens.push(Token::Generator(GeneratorCall {
                raw: whole.as_str().to_string(),
                category: category.as_str().to_string(),
                method: method.as_str().to_string(),
                args: caps.get(3).map(|a| parse_args(a.as_str())).unwrap_or_default(),
            })),
            _ => tokens.push(Token::Snowflake),
        }
    }

    if last < input.len() || tokens.is_empty() {
        tokens.push(Token::Literal(input[last..].to_string()));
    }
    tokens
}

/// Whether a token stream contains any directive.
pub fn has_directives(tokens: &[Token]) -> bool {
    tokens.iter().any(|t| !matches!(t, Token::Literal(_)))
}

/// Parse a comma-separated argument list (without parentheses).
pub fn parse_args(args: &str) -> Vec<Arg> {
    let args = args.trim();
    if args.is_empty() {
        return Vec::new();
    }
    args.split(',').map(|a| parse_arg(a.trim())).collect()
}

fn parse_arg(arg: &str) -> Arg {
    if number_regex().is_match(arg) {
        if arg.contains('.') {
            if let Ok(n) = arg.parse::<f64>() {
                return Arg::Float(n);
            }
        } else if let Ok(n) = arg.parse::<i64>() {
            return Arg::Int(n);
        } else if let Ok(n) = arg.parse::<f64>() {
            return Arg::Float(n);
        }
    }

    let quoted = arg.len() >= 2
        && ((arg.starts_with('"') && arg.ends_with('"'))
            || (arg.starts_with('\'') && arg.ends_with('\'')));
    if quoted {
        return Arg::Str(arg[1..arg.len() - 1].to_string());
    }

    match arg {
        "true" => Arg::Bool(true),
        "false" => Arg::Bool(false),
        _ => Arg::Raw(arg.to_string()),
    }
}

/// Parse a `@repeat(min[,max])` head into inclusive bounds.
///
/// Bounds given in reverse order are swapped.
pub fn parse_repeat(head: &str) -> Option<(u64, u64)> {
    let caps = repeat_regex().captures(head)?;
    let min: u64 = caps.get(1)?.as_str().parse().ok()?;
    let max: u64 = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => min,
    };
    Some((min.min(max), min.max(max)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(tokens: &[Token], idx: usize) -> &GeneratorCall {
        match &tokens[idx] {
            Token::Generator(call) => call,
            other => panic!("expected generator, got {other:?}"),
        }
    }

    #[test]
    fn test_plain_string() {
        let tokens = tokenize("hello world");
        assert_eq!(tokens, vec![Token::Literal("hello world".to_string())]);
        assert!(!has_directives(&tokens));

        assert_eq!(tokenize(""), vec![Token::Literal(String::new())]);
    }

    #[test]
    fn test_lone_snowflake() {
        assert_eq!(tokenize("@snowflake"), vec![Token::Snowflake]);
    }

    #[test]
    fn test_mixed_tokens() {
        let tokens = tokenize("user-@snowflake: @gen:person.firstName!");
        assert_eq!(tokens.len(), 5);
        assert_eq!(tokens[0], Token::Literal("user-".to_string()));
        assert_eq!(tokens[1], Token::Snowflake);
        assert_eq!(tokens[2], Token::Literal(": ".to_string()));
        let call = generator(&tokens, 3);
        assert_eq!(call.category, "person");
        assert_eq!(call.method, "firstName");
        assert!(call.args.is_empty());
        assert_eq!(tokens[4], Token::Literal("!".to_string()));
        assert!(has_directives(&tokens));
    }

    #[test]
    fn test_generator_with_args() {
        let tokens = tokenize(r#"@gen:number.float(0, 100.5, 2) @gen:lorem.words('a', "b", true, x)"#);
        let float = generator(&tokens, 0);
        assert_eq!(float.raw, "@gen:number.float(0, 100.5, 2)");
        assert_eq!(float.args, vec![Arg::Int(0), Arg::Float(100.5), Arg::Int(2)]);

        let words = generator(&tokens, 2);
        assert_eq!(
            words.args,
            vec![
                Arg::Str("a".to_string()),
                Arg::Str("b".to_string()),
                Arg::Bool(true),
                Arg::Raw("x".to_string()),
            ]
        );
    }

    #[test]
    fn test_negative_and_empty_args() {
        let tokens = tokenize("@gen:number.int(-5,-1)");
        assert_eq!(generator(&tokens, 0).args, vec![Arg::Int(-5), Arg::Int(-1)]);

        let tokens = tokenize("@gen:string.uuid()");
        assert!(generator(&tokens, 0).args.is_empty());
    }

    #[test]
    fn test_incomplete_directive_is_literal() {
        let tokens = tokenize("@gen:person and @gen:.x");
        assert!(!has_directives(&tokens));
    }

    #[test]
    fn test_unclosed_args_leave_text() {
        let tokens = tokenize("@gen:number.int(1,2");
        let call = generator(&tokens, 0);
        assert_eq!(call.raw, "@gen:number.int");
        assert_eq!(tokens[1], Token::Literal("(1,2".to_string()));
    }

    #[test]
    fn test_parse_repeat() {
        assert_eq!(parse_repeat("@repeat(3)"), Some((3, 3)));
        assert_eq!(parse_repeat("@repeat(2,5)"), Some((2, 5)));
        assert_eq!(parse_repeat("@repeat(5,2)"), Some((2, 5)));
        assert_eq!(parse_repeat("@repeat( 2 )"), None);
        assert_eq!(parse_repeat("x@repeat(2)"), None);
        assert_eq!(parse_repeat("@repeat(2,)"), None);
        assert_eq!(parse_repeat("@repeat(99999999999999999999999)"), None);
    }
}
