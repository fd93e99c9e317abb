use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Eof,
    Def,
    Extern,
    Ident(String),
    Number(f64),
    Punct(char),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Eof => write!(f, "end of input"),
            Token::Def => write!(f, "'def'"),
            Token::Extern => write!(f, "'extern'"),
            Token::Ident(name) => write!(f, "identifier '{}'", name),
            Token::Number(value) => write!(f, "number {}", value),
            Token::Punct(c) => write!(f, "'{}'", c),
        }
    }
}

/// Streaming tokenizer - one token per call, one character of lookahead.
pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    /// Skip whitespace and `#` line comments, then produce the next token.
    /// Once the input is drained every call returns [`Token::Eof`].
    pub fn next_token(&mut self) -> Token {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }

        match self.chars.peek().copied() {
            None => Token::Eof,
            Some(c) if c.is_alphabetic() => self.lex_word(),
            Some(c) if c.is_ascii_digit() || c == '.' => self.lex_number(),
            Some('#') => {
                while let Some(c) = self.chars.next() {
                    if c == '\n' || c == '\r' {
                        break;
                    }
                }
                self.next_token()
            }
            Some(c) => {
                self.chars.next();
                Token::Punct(c)
            }
        }
    }

    fn lex_word(&mut self) -> Token {
        let mut word = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() {
                word.push(c);
                self.chars.next();
            } else {
                break;
            }
        }

        match word.as_str() {
            "def" => Token::Def,
            "extern" => Token::Extern,
            _ => Token::Ident(word),
        }
    }

    fn lex_number(&mut self) -> Token {
        let mut text = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                text.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        Token::Number(lenient_parse(&text))
    }
}

/// `strtod`-style conversion of a run of digits and dots: the longest
/// leading prefix that forms a float wins, and no usable prefix yields 0.0,
/// so `1.2.3` is the number 1.2 rather than a lexical error.
fn lenient_parse(text: &str) -> f64 {
    if let Ok(value) = text.parse() {
        return value;
    }
    let cut = match text.match_indices('.').nth(1) {
        Some((second_dot, _)) => &text[..second_dot],
        None => text,
    };
    cut.parse().unwrap_or(0.0)
}
