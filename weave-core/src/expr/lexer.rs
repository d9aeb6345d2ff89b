//! Tokenizer for the expression language.

use crate::error::ParseError;

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    String(String),
    Ident(String),

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,
    Semicolon,
    Question,
    Ellipsis,
    Arrow,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Assign,
    PlusAssign,
    MinusAssign,
    StrictEq,
    StrictNe,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
    Nullish,
}

impl Token {
    /// Source-like rendering used in error messages.
    pub fn describe(&self) -> String {
        let text = match self {
            Token::Number(n) => return crate::value::format_number(*n),
            Token::String(s) => return format!("{s:?}"),
            Token::Ident(name) => return name.clone(),
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Comma => ",",
            Token::Dot => ".",
            Token::Colon => ":",
            Token::Semicolon => ";",
            Token::Question => "?",
            Token::Ellipsis => "...",
            Token::Arrow => "=>",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Bang => "!",
            Token::Assign => "=",
            Token::PlusAssign => "+=",
            Token::MinusAssign => "-=",
            Token::StrictEq => "===",
            Token::StrictNe => "!==",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::Le => "<=",
            Token::Ge => ">=",
            Token::And => "&&",
            Token::Or => "||",
            Token::Nullish => "??",
        };
        text.to_string()
    }
}

/// A token with the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// Split `source` into tokens.
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ParseError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    tokens: Vec<Spanned>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Spanned>, ParseError> {
        while let Some(c) = self.peek_char() {
            let start = self.pos;
            if c.is_whitespace() {
                self.pos += c.len_utf8();
                continue;
            }
            let token = match c {
                '0'..='9' => self.number()?,
                '.' if self.byte_at(1).is_some_and(|b| b.is_ascii_digit()) => self.number()?,
                '"' | '\'' => self.string(c)?,
                c if is_ident_start(c) => self.ident(),
                _ => self.punct(c)?,
            };
            self.tokens.push(Spanned { token, offset: start });
        }
        Ok(self.tokens)
    }

    fn peek_char(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn byte_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn starts_with(&self, text: &str) -> bool {
        self.source[self.pos..].starts_with(text)
    }

    fn ident(&mut self) -> Token {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if is_ident_start(c) || c.is_ascii_digit() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        Token::Ident(self.source[start..self.pos].to_string())
    }

    fn number(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        let digits = |lexer: &mut Self| {
            while lexer.byte_at(0).is_some_and(|b| b.is_ascii_digit()) {
                lexer.pos += 1;
            }
        };

        digits(self);
        if self.byte_at(0) == Some(b'.') && self.byte_at(1).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
            digits(self);
        } else if self.byte_at(0) == Some(b'.') && !self.byte_at(1).is_some_and(is_ident_byte) {
            // "1." is a complete number; "1.toFixed" is not valid anyway.
            self.pos += 1;
        }

        if matches!(self.byte_at(0), Some(b'e' | b'E')) {
            let mut ahead = 1;
            if matches!(self.byte_at(1), Some(b'+' | b'-')) {
                ahead = 2;
            }
            if !self.byte_at(ahead).is_some_and(|b| b.is_ascii_digit()) {
                return Err(ParseError::InvalidNumber { offset: start });
            }
            self.pos += ahead;
            digits(self);
        }

        if self.peek_char().is_some_and(is_ident_start) {
            return Err(ParseError::InvalidNumber { offset: start });
        }

        self.source[start..self.pos]
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| ParseError::InvalidNumber { offset: start })
    }

    fn string(&mut self, quote: char) -> Result<Token, ParseError> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();

        loop {
            let Some(c) = self.peek_char() else {
                return Err(ParseError::UnterminatedString { offset: start });
            };
            self.pos += c.len_utf8();
            match c {
                c if c == quote => return Ok(Token::String(out)),
                '\\' => {
                    let escape_at = self.pos - 1;
                    let Some(e) = self.peek_char() else {
                        return Err(ParseError::UnterminatedString { offset: start });
                    };
                    self.pos += e.len_utf8();
                    match e {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        'b' => out.push('\u{8}'),
                        'f' => out.push('\u{c}'),
                        '0' => out.push('\0'),
                        '"' | '\'' | '\\' | '/' => out.push(e),
                        'u' => out.push(self.unicode_escape(escape_at)?),
                        _ => return Err(ParseError::InvalidEscape { offset: escape_at }),
                    }
                }
                c => out.push(c),
            }
        }
    }

    /// Decode the hex digits after `\u`, joining surrogate pairs.
    fn unicode_escape(&mut self, offset: usize) -> Result<char, ParseError> {
        let high = self.hex4(offset)?;
        if !(0xD800..0xDC00).contains(&high) {
            return char::from_u32(high).ok_or(ParseError::InvalidEscape { offset });
        }
        if !self.starts_with("\\u") {
            return Err(ParseError::InvalidEscape { offset });
        }
        self.pos += 2;
        let low = self.hex4(offset)?;
        if !(0xDC00..0xE000).contains(&low) {
            return Err(ParseError::InvalidEscape { offset });
        }
        let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
        char::from_u32(code).ok_or(ParseError::InvalidEscape { offset })
    }

    fn hex4(&mut self, offset: usize) -> Result<u32, ParseError> {
        let hex = self
            .source
            .get(self.pos..self.pos + 4)
            .ok_or(ParseError::InvalidEscape { offset })?;
        let code = u32::from_str_radix(hex, 16).map_err(|_| ParseError::InvalidEscape { offset })?;
        self.pos += 4;
        Ok(code)
    }

    fn punct(&mut self, c: char) -> Result<Token, ParseError> {
        const MULTI: [(&str, Token); 11] = [
            ("===", Token::StrictEq),
            ("!==", Token::StrictNe),
            ("...", Token::Ellipsis),
            ("=>", Token::Arrow),
            ("<=", Token::Le),
            (">=", Token::Ge),
            ("&&", Token::And),
            ("||", Token::Or),
            ("??", Token::Nullish),
            ("+=", Token::PlusAssign),
            ("-=", Token::MinusAssign),
        ];
        for (text, token) in MULTI {
            if self.starts_with(text) {
                self.pos += text.len();
                return Ok(token);
            }
        }

        // Loose equality is not part of the language.
        if self.starts_with("==") || self.starts_with("!=") {
            return Err(ParseError::UnexpectedChar { found: c, offset: self.pos });
        }

        let token = match c {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            ',' => Token::Comma,
            '.' => Token::Dot,
            ':' => Token::Colon,
            ';' => Token::Semicolon,
            '?' => Token::Question,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '!' => Token::Bang,
            '=' => Token::Assign,
            '<' => Token::Lt,
            '>' => Token::Gt,
            _ => return Err(ParseError::UnexpectedChar { found: c, offset: self.pos }),
        };
        self.pos += 1;
        Ok(token)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn operators_and_punctuation() {
        assert_eq!(
            tokens("a === b !== c && d || e ?? f"),
            vec![
                Token::Ident("a".into()),
                Token::StrictEq,
                Token::Ident("b".into()),
                Token::StrictNe,
                Token::Ident("c".into()),
                Token::And,
                Token::Ident("d".into()),
                Token::Or,
                Token::Ident("e".into()),
                Token::Nullish,
                Token::Ident("f".into()),
            ]
        );
        assert_eq!(
            tokens("x => [...y]"),
            vec![
                Token::Ident("x".into()),
                Token::Arrow,
                Token::LBracket,
                Token::Ellipsis,
                Token::Ident("y".into()),
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(tokens("42 3.5 .5 1e3 2E-2"), vec![
            Token::Number(42.0),
            Token::Number(3.5),
            Token::Number(0.5),
            Token::Number(1000.0),
            Token::Number(0.02),
        ]);
        assert!(matches!(tokenize("1e"), Err(ParseError::InvalidNumber { offset: 0 })));
        assert!(matches!(tokenize("12abc"), Err(ParseError::InvalidNumber { .. })));
    }

    #[test]
    fn strings_with_escapes() {
        assert_eq!(tokens(r#""a\"b""#), vec![Token::String("a\"b".into())]);
        assert_eq!(tokens(r"'it\'s'"), vec![Token::String("it's".into())]);
        assert_eq!(tokens(r#""\u00e9\n""#), vec![Token::String("é\n".into())]);
        assert_eq!(tokens(r#""\ud83d\ude00""#), vec![Token::String("😀".into())]);
        assert!(matches!(tokenize(r#""\ud83d""#), Err(ParseError::InvalidEscape { .. })));
        assert!(matches!(tokenize(r#""\q""#), Err(ParseError::InvalidEscape { offset: 1 })));
        assert!(matches!(tokenize("'open"), Err(ParseError::UnterminatedString { offset: 0 })));
    }

    #[test]
    fn loose_equality_is_rejected() {
        assert!(matches!(tokenize("a == b"), Err(ParseError::UnexpectedChar { found: '=', offset: 2 })));
        assert!(matches!(tokenize("a != b"), Err(ParseError::UnexpectedChar { found: '!', .. })));
    }

    #[test]
    fn offsets_are_byte_positions() {
        let spanned = tokenize("ab + 'c'").unwrap();
        let offsets: Vec<_> = spanned.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![0, 3, 5]);
    }
}
