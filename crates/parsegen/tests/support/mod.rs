//! A small longest-match tokenizer for the integration tests.
//!
//! Real deployments pair the engine with a dedicated lexer crate; the tests
//! only need literal keywords plus a handful of variable-terminal matchers,
//! so a hand-rolled scanner keeps the fixtures self-contained.

#![allow(dead_code)]

use parsegen::{SyntaxError, Token};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tok {
    pub kind: String,
    pub text: String,
    pub line: u32,
}

impl Token for Tok {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn line(&self) -> Option<u32> {
        Some(self.line)
    }
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Returns the byte length of a match at the start of the input, if any.
pub type Matcher = fn(&str) -> Option<usize>;

pub struct Lexer {
    literals: Vec<String>,
    variables: Vec<(String, Matcher)>,
    newline_tokens: bool,
}

impl Lexer {
    /// `literals` is a whitespace-separated list of fixed tokens.
    pub fn new(literals: &str) -> Self {
        Self {
            literals: literals.split_whitespace().map(str::to_owned).collect(),
            variables: Vec::new(),
            newline_tokens: false,
        }
    }

    /// Register a variable terminal. On equal match lengths, literals win
    /// over variables and earlier registrations win over later ones.
    pub fn variable(mut self, name: &str, matcher: Matcher) -> Self {
        self.variables.push((name.to_owned(), matcher));
        self
    }

    /// Emit an `NL` token for each newline instead of skipping it.
    pub fn newline_tokens(mut self) -> Self {
        self.newline_tokens = true;
        self
    }

    pub fn tokenize(&self, input: &str) -> Vec<Result<Tok, SyntaxError>> {
        let mut out = Vec::new();
        let mut rest = input;
        let mut line = 1u32;
        while let Some(c) = rest.chars().next() {
            if c == '\n' {
                if self.newline_tokens {
                    out.push(Ok(Tok {
                        kind: "NL".to_owned(),
                        text: "\n".to_owned(),
                        line,
                    }));
                }
                line += 1;
                rest = &rest[1..];
                continue;
            }
            if c.is_whitespace() {
                rest = &rest[c.len_utf8()..];
                continue;
            }

            let mut best: Option<(usize, &str)> = None;
            for lit in &self.literals {
                if rest.starts_with(lit.as_str())
                    && best.map_or(true, |(len, _)| lit.len() > len)
                {
                    best = Some((lit.len(), lit));
                }
            }
            for (name, matcher) in &self.variables {
                if let Some(len) = matcher(rest) {
                    if len > 0 && best.map_or(true, |(best_len, _)| len > best_len) {
                        best = Some((len, name));
                    }
                }
            }

            match best {
                Some((len, kind)) => {
                    out.push(Ok(Tok {
                        kind: kind.to_owned(),
                        text: rest[..len].to_owned(),
                        line,
                    }));
                    rest = &rest[len..];
                }
                None => {
                    out.push(Err(SyntaxError::InvalidToken {
                        text: c.to_string(),
                        line: Some(line),
                    }));
                    break;
                }
            }
        }
        out
    }
}

fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn run_len(s: &str, first: fn(char) -> bool, rest: fn(char) -> bool) -> Option<usize> {
    let mut chars = s.chars();
    let c = chars.next()?;
    if !first(c) {
        return None;
    }
    let mut len = c.len_utf8();
    for c in chars {
        if !rest(c) {
            break;
        }
        len += c.len_utf8();
    }
    Some(len)
}

/// `[0-9]\w*`
pub fn m_num(s: &str) -> Option<usize> {
    run_len(s, |c| c.is_ascii_digit(), is_word)
}

/// `[A-Za-z]\w*`
pub fn m_var(s: &str) -> Option<usize> {
    run_len(s, |c| c.is_ascii_alphabetic(), is_word)
}

/// `\w+`
pub fn m_word(s: &str) -> Option<usize> {
    run_len(s, is_word, is_word)
}

/// `[a-z]+\b`
pub fn m_lower(s: &str) -> Option<usize> {
    let len = run_len(s, |c| c.is_ascii_lowercase(), |c| c.is_ascii_lowercase())?;
    at_boundary(s, len).then_some(len)
}

/// `public\b`
pub fn m_public(s: &str) -> Option<usize> {
    (s.starts_with("public") && at_boundary(s, 6)).then_some(6)
}

/// `[0-9]\b`
pub fn m_digit(s: &str) -> Option<usize> {
    (s.starts_with(|c: char| c.is_ascii_digit()) && at_boundary(s, 1)).then_some(1)
}

/// The symbol class of the little lisp grammars.
pub fn m_lisp_symbol(s: &str) -> Option<usize> {
    let in_class = |c: char| {
        matches!(c,
            '!' | '%' | '&' | '*' | '+' | ':' | '<' | '=' | '>' | '?' | '@'
            | '^' | '_' | '~' | 'A'..='Z' | 'a'..='z')
    };
    run_len(s, in_class, in_class)
}

/// `:+`
pub fn m_colons(s: &str) -> Option<usize> {
    run_len(s, |c| c == ':', |c| c == ':')
}

/// A terminal quoted in backticks.
pub fn m_backtick(s: &str) -> Option<usize> {
    let body = s.strip_prefix('`')?;
    let end = body.find('`')?;
    Some(end + 2)
}

/// `[A-Z]\w*`
pub fn m_caps(s: &str) -> Option<usize> {
    run_len(s, |c| c.is_ascii_uppercase(), is_word)
}

/// `[A-Z]\w*` immediately followed by `[`.
pub fn m_caps_call(s: &str) -> Option<usize> {
    let len = m_caps(s)?;
    s[len..].starts_with('[').then_some(len)
}

fn at_boundary(s: &str, at: usize) -> bool {
    !s[at..].starts_with(is_word)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build a tagged node's display form the way `ParseTree` renders one.
pub fn n(tag: &str, children: &[&str]) -> String {
    let mut out = format!("({}", tag);
    for c in children {
        out.push(' ');
        out.push_str(c);
    }
    out.push(')');
    out
}
