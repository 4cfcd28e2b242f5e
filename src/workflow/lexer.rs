//! Tokenizer for the workflow dialect.
//!
//! Line-oriented scanner producing an INDENT/DEDENT token stream.
//! Blank and comment-only lines are skipped; newlines inside brackets
//! are joined implicitly. F-string bodies are captured raw here and
//! sub-parsed by the parser.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Newline,
    Indent,
    Dedent,
    EndOfFile,

    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    FString(Vec<RawFsPart>),

    // keywords
    From,
    Import,
    As,
    Async,
    Def,
    Return,
    If,
    Elif,
    Else,
    For,
    In,
    Break,
    Continue,
    Pass,
    Await,
    Not,
    And,
    Or,
    True,
    False,
    NoneLit,

    // punctuation
    Assign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Colon,
    Comma,
    Dot,
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(n) => write!(f, "name '{n}'"),
            Self::Str(_) => write!(f, "string literal"),
            Self::FString(_) => write!(f, "f-string literal"),
            Self::Int(i) => write!(f, "integer {i}"),
            Self::Float(x) => write!(f, "float {x}"),
            Self::Newline => write!(f, "newline"),
            Self::Indent => write!(f, "indent"),
            Self::Dedent => write!(f, "dedent"),
            Self::EndOfFile => write!(f, "end of input"),
            other => write!(f, "'{other:?}'"),
        }
    }
}

/// Raw f-string fragment; expression fragments keep their source text
/// for the parser to sub-parse.
#[derive(Debug, Clone, PartialEq)]
pub enum RawFsPart {
    Text(String),
    Expr(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: Tok,
    pub line: usize,
}

/// Tokenizer error, surfaced as a parsing-stage workflow error.
#[derive(Debug, Clone)]
pub struct SyntaxError {
    pub line: usize,
    pub message: String,
}

impl SyntaxError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

fn keyword(name: &str) -> Option<Tok> {
    Some(match name {
        "from" => Tok::From,
        "import" => Tok::Import,
        "as" => Tok::As,
        "async" => Tok::Async,
        "def" => Tok::Def,
        "return" => Tok::Return,
        "if" => Tok::If,
        "elif" => Tok::Elif,
        "else" => Tok::Else,
        "for" => Tok::For,
        "in" => Tok::In,
        "break" => Tok::Break,
        "continue" => Tok::Continue,
        "pass" => Tok::Pass,
        "await" => Tok::Await,
        "not" => Tok::Not,
        "and" => Tok::And,
        "or" => Tok::Or,
        "True" => Tok::True,
        "False" => Tok::False,
        "None" => Tok::NoneLit,
        _ => return None,
    })
}

/// Tokenizes a full program.
pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut tokens = Vec::new();
    let mut indents: Vec<usize> = vec![0];
    let mut depth = 0usize; // bracket nesting; newlines inside are joined

    for (idx, raw_line) in source.lines().enumerate() {
        let line_no = idx + 1;
        let mut chars = raw_line.chars().peekable();

        if depth == 0 {
            // Measure indentation (tabs normalize to 4 columns)
            let mut width = 0usize;
            while let Some(&c) = chars.peek() {
                match c {
                    ' ' => width += 1,
                    '\t' => width += 4,
                    _ => break,
                }
                chars.next();
            }

            // Skip blank and comment-only lines entirely
            match chars.peek() {
                None => continue,
                Some('#') => continue,
                Some(_) => {}
            }

            let current = *indents.last().unwrap_or(&0);
            if width > current {
                indents.push(width);
                tokens.push(Token {
                    kind: Tok::Indent,
                    line: line_no,
                });
            } else {
                while width < *indents.last().unwrap_or(&0) {
                    indents.pop();
                    tokens.push(Token {
                        kind: Tok::Dedent,
                        line: line_no,
                    });
                }
                if width != *indents.last().unwrap_or(&0) {
                    return Err(SyntaxError::new(line_no, "unindent does not match any outer indentation level"));
                }
            }
        } else {
            // Continuation line inside brackets: indentation is free-form
            while matches!(chars.peek(), Some(' ' | '\t')) {
                chars.next();
            }
        }

        let had_tokens_before = tokens.len();
        scan_line(&mut chars, line_no, &mut tokens, &mut depth)?;

        if depth == 0 && tokens.len() > had_tokens_before {
            tokens.push(Token {
                kind: Tok::Newline,
                line: line_no,
            });
        }
    }

    if depth > 0 {
        return Err(SyntaxError::new(
            source.lines().count(),
            "unexpected end of input inside brackets",
        ));
    }

    let last_line = source.lines().count().max(1);
    while indents.len() > 1 {
        indents.pop();
        tokens.push(Token {
            kind: Tok::Dedent,
            line: last_line,
        });
    }
    tokens.push(Token {
        kind: Tok::EndOfFile,
        line: last_line,
    });

    Ok(tokens)
}

fn scan_line(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    line: usize,
    tokens: &mut Vec<Token>,
    depth: &mut usize,
) -> Result<(), SyntaxError> {
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '#' => break,
            '"' | '\'' => {
                chars.next();
                let text = scan_string(chars, c, line)?;
                tokens.push(Token {
                    kind: Tok::Str(text),
                    line,
                });
            }
            '0'..='9' => {
                tokens.push(Token {
                    kind: scan_number(chars, line)?,
                    line,
                });
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                // f-string prefix directly followed by a quote
                if name == "f" {
                    if let Some(&q @ ('"' | '\'')) = chars.peek() {
                        chars.next();
                        let parts = scan_fstring(chars, q, line)?;
                        tokens.push(Token {
                            kind: Tok::FString(parts),
                            line,
                        });
                        continue;
                    }
                }
                let kind = keyword(&name).unwrap_or(Tok::Name(name));
                tokens.push(Token { kind, line });
            }
            _ => {
                chars.next();
                let kind = match c {
                    '(' => {
                        *depth += 1;
                        Tok::LParen
                    }
                    ')' => {
                        *depth = depth.saturating_sub(1);
                        Tok::RParen
                    }
                    '[' => {
                        *depth += 1;
                        Tok::LBracket
                    }
                    ']' => {
                        *depth = depth.saturating_sub(1);
                        Tok::RBracket
                    }
                    '{' => {
                        *depth += 1;
                        Tok::LBrace
                    }
                    '}' => {
                        *depth = depth.saturating_sub(1);
                        Tok::RBrace
                    }
                    ':' => Tok::Colon,
                    ',' => Tok::Comma,
                    '.' => Tok::Dot,
                    '+' => Tok::Plus,
                    '-' => Tok::Minus,
                    '*' => Tok::Star,
                    '%' => Tok::Percent,
                    '/' => {
                        if chars.peek() == Some(&'/') {
                            chars.next();
                            Tok::DoubleSlash
                        } else {
                            Tok::Slash
                        }
                    }
                    '=' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            Tok::Eq
                        } else {
                            Tok::Assign
                        }
                    }
                    '!' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            Tok::Ne
                        } else {
                            return Err(SyntaxError::new(line, "unexpected character '!'"));
                        }
                    }
                    '<' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            Tok::Le
                        } else {
                            Tok::Lt
                        }
                    }
                    '>' => {
                        if chars.peek() == Some(&'=') {
                            chars.next();
                            Tok::Ge
                        } else {
                            Tok::Gt
                        }
                    }
                    other => {
                        return Err(SyntaxError::new(
                            line,
                            format!("unexpected character '{other}'"),
                        ))
                    }
                };
                tokens.push(Token { kind, line });
            }
        }
    }
    Ok(())
}

fn scan_number(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    line: usize,
) -> Result<Tok, SyntaxError> {
    let mut text = String::new();
    let mut is_float = false;
    while let Some(&c) = chars.peek() {
        match c {
            '0'..='9' => {
                text.push(c);
                chars.next();
            }
            '_' => {
                chars.next();
            }
            '.' if !is_float => {
                is_float = true;
                text.push(c);
                chars.next();
            }
            _ => break,
        }
    }
    if is_float {
        text.parse::<f64>()
            .map(Tok::Float)
            .map_err(|_| SyntaxError::new(line, format!("invalid float literal '{text}'")))
    } else {
        text.parse::<i64>()
            .map(Tok::Int)
            .map_err(|_| SyntaxError::new(line, format!("invalid integer literal '{text}'")))
    }
}

fn scan_string(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    quote: char,
    line: usize,
) -> Result<String, SyntaxError> {
    let mut text = String::new();
    loop {
        match chars.next() {
            None => return Err(SyntaxError::new(line, "unterminated string literal")),
            Some(c) if c == quote => return Ok(text),
            Some('\\') => match chars.next() {
                Some('n') => text.push('\n'),
                Some('t') => text.push('\t'),
                Some('\\') => text.push('\\'),
                Some('\'') => text.push('\''),
                Some('"') => text.push('"'),
                Some(other) => {
                    text.push('\\');
                    text.push(other);
                }
                None => return Err(SyntaxError::new(line, "unterminated string literal")),
            },
            Some(other) => text.push(other),
        }
    }
}

fn scan_fstring(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    quote: char,
    line: usize,
) -> Result<Vec<RawFsPart>, SyntaxError> {
    let mut parts = Vec::new();
    let mut text = String::new();
    loop {
        match chars.next() {
            None => return Err(SyntaxError::new(line, "unterminated f-string literal")),
            Some(c) if c == quote => {
                if !text.is_empty() {
                    parts.push(RawFsPart::Text(text));
                }
                return Ok(parts);
            }
            Some('{') => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    text.push('{');
                    continue;
                }
                if !text.is_empty() {
                    parts.push(RawFsPart::Text(std::mem::take(&mut text)));
                }
                parts.push(RawFsPart::Expr(scan_fstring_expr(chars, quote, line)?));
            }
            Some('}') => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                    text.push('}');
                    continue;
                }
                return Err(SyntaxError::new(line, "single '}' in f-string"));
            }
            Some('\\') => match chars.next() {
                Some('n') => text.push('\n'),
                Some('t') => text.push('\t'),
                Some('\\') => text.push('\\'),
                Some('\'') => text.push('\''),
                Some('"') => text.push('"'),
                Some(other) => {
                    text.push('\\');
                    text.push(other);
                }
                None => return Err(SyntaxError::new(line, "unterminated f-string literal")),
            },
            Some(other) => text.push(other),
        }
    }
}

/// Captures the source text of one `{expression}` fragment, honoring
/// nested brackets and string literals (which may contain braces).
fn scan_fstring_expr(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    outer_quote: char,
    line: usize,
) -> Result<String, SyntaxError> {
    let mut src = String::new();
    let mut depth = 0usize;
    loop {
        match chars.next() {
            None => return Err(SyntaxError::new(line, "unterminated expression in f-string")),
            Some('}') if depth == 0 => {
                if src.trim().is_empty() {
                    return Err(SyntaxError::new(line, "empty expression in f-string"));
                }
                return Ok(src);
            }
            Some(c @ ('{' | '[' | '(')) => {
                depth += 1;
                src.push(c);
            }
            Some(c @ ('}' | ']' | ')')) => {
                depth = depth.saturating_sub(1);
                src.push(c);
            }
            Some(q @ ('"' | '\'')) => {
                if q == outer_quote {
                    return Err(SyntaxError::new(
                        line,
                        "f-string expression cannot reuse the enclosing quote",
                    ));
                }
                src.push(q);
                loop {
                    match chars.next() {
                        None => {
                            return Err(SyntaxError::new(line, "unterminated string in f-string"))
                        }
                        Some(c) if c == q => {
                            src.push(c);
                            break;
                        }
                        Some('\\') => {
                            src.push('\\');
                            if let Some(next) = chars.next() {
                                src.push(next);
                            }
                        }
                        Some(other) => src.push(other),
                    }
                }
            }
            Some(other) => src.push(other),
        }
    }
}
