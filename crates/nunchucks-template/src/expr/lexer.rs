//! Expression tokenizer.
//!
//! Splits the text inside `{{ }}` or a tag argument into [`Token`]s.
//! Word operators (`and`, `or`, `not`, `in`, `is`, `if`, `else`) get their
//! own tokens; literals such as `true` stay identifiers and are resolved by
//! the parser.

/// A token produced by the expression lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A numeric literal.
    Number(f64),
    /// A string literal with escapes already processed.
    Str(String),
    /// A name.
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Pipe,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    If,
    Else,
    Is,
    In,
}

/// Tokenizes an expression.
///
/// # Errors
///
/// Returns a description of the problem for an unterminated string or a
/// character that cannot start any token.
pub fn tokenize(src: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::with_capacity(chars.len() / 2);
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        // After a dot only an integer may follow, so `items.0.name` indexes.
        let after_dot = tokens.last() == Some(&Token::Dot);

        if ch.is_ascii_digit() || (ch == '.' && !after_dot && next_is_digit(&chars, i)) {
            let start = i;
            let mut seen_dot = false;
            while i < chars.len() {
                let c = chars[i];
                if c.is_ascii_digit() {
                    i += 1;
                } else if c == '.' && !seen_dot && !after_dot && next_is_digit(&chars, i) {
                    seen_dot = true;
                    i += 1;
                } else {
                    break;
                }
            }
            let text: String = chars[start..i].iter().collect();
            let n = text
                .parse::<f64>()
                .map_err(|_| format!("invalid number: {text}"))?;
            tokens.push(Token::Number(n));
            continue;
        }

        if ch == '"' || ch == '\'' {
            let (s, next) = lex_string(&chars, i)?;
            tokens.push(Token::Str(s));
            i = next;
            continue;
        }

        if ch.is_alphabetic() || ch == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            tokens.push(keyword(word));
            continue;
        }

        let next = chars.get(i + 1).copied();
        let two = match (ch, next) {
            ('=', Some('=')) => Some(Token::Eq),
            ('!', Some('=')) => Some(Token::Ne),
            ('<', Some('=')) => Some(Token::Le),
            ('>', Some('=')) => Some(Token::Ge),
            ('&', Some('&')) => Some(Token::And),
            ('|', Some('|')) => Some(Token::Or),
            _ => None,
        };
        if let Some(tok) = two {
            tokens.push(tok);
            i += 2;
            continue;
        }

        let tok = match ch {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            ',' => Token::Comma,
            ':' => Token::Colon,
            '.' => Token::Dot,
            '|' => Token::Pipe,
            '=' => Token::Assign,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '<' => Token::Lt,
            '>' => Token::Gt,
            '!' => Token::Not,
            other => return Err(format!("unexpected character: {other:?}")),
        };
        tokens.push(tok);
        i += 1;
    }

    Ok(tokens)
}

fn next_is_digit(chars: &[char], i: usize) -> bool {
    chars.get(i + 1).is_some_and(char::is_ascii_digit)
}

fn keyword(word: String) -> Token {
    match word.as_str() {
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "in" => Token::In,
        "is" => Token::Is,
        "if" => Token::If,
        "else" => Token::Else,
        _ => Token::Ident(word),
    }
}

/// Lexes a quoted string starting at `start`, returning its value and the
/// index just past the closing quote.
fn lex_string(chars: &[char], start: usize) -> Result<(String, usize), String> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                match chars[i + 1] {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '\\' => out.push('\\'),
                    '\'' => out.push('\''),
                    '"' => out.push('"'),
                    other => {
                        out.push('\\');
                        out.push(other);
                    }
                }
                i += 2;
            }
            c if c == quote => return Ok((out, i + 1)),
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err("unterminated string".to_string())
}
