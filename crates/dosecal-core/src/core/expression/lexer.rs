use super::error::ParseError;
use std::iter::Peekable;
use std::str::CharIndices;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Ident(String),
    Str(String),

    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    At,
    Amp,
    Pipe,
    Caret,
    Tilde,
    ShiftLeft,
    ShiftRight,

    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Assign,

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

pub struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        self.chars.next()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        while matches!(self.peek_char(), Some(c) if c.is_whitespace()) {
            self.advance();
        }

        let Some((position, c)) = self.advance() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                position: self.source.len(),
            });
        };

        let kind = match c {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' if self.eat('*') => TokenKind::DoubleStar,
            '*' => TokenKind::Star,
            '/' if self.eat('/') => TokenKind::DoubleSlash,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '@' => TokenKind::At,
            '&' => TokenKind::Amp,
            '|' => TokenKind::Pipe,
            '^' => TokenKind::Caret,
            '~' => TokenKind::Tilde,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '=' if self.eat('=') => TokenKind::Eq,
            '=' => TokenKind::Assign,
            '!' if self.eat('=') => TokenKind::Ne,
            '<' if self.eat('<') => TokenKind::ShiftLeft,
            '<' if self.eat('=') => TokenKind::Le,
            '<' => TokenKind::Lt,
            '>' if self.eat('>') => TokenKind::ShiftRight,
            '>' if self.eat('=') => TokenKind::Ge,
            '>' => TokenKind::Gt,
            '\'' | '"' => self.scan_string(position, c)?,
            '.' if matches!(self.peek_char(), Some(d) if d.is_ascii_digit()) => {
                self.scan_number(position)?
            }
            '.' => TokenKind::Dot,
            d if d.is_ascii_digit() => self.scan_number(position)?,
            a if a.is_alphabetic() || a == '_' => self.scan_ident(position),
            other => {
                return Err(ParseError::new(
                    format!("unexpected character '{}'", other),
                    position,
                ));
            }
        };

        Ok(Token { kind, position })
    }

    fn scan_ident(&mut self, start: usize) -> TokenKind {
        let mut end = start + self.source[start..].chars().next().map_or(0, char::len_utf8);
        while let Some(&(idx, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                end = idx + c.len_utf8();
                self.advance();
            } else {
                break;
            }
        }
        TokenKind::Ident(self.source[start..end].to_string())
    }

    fn scan_number(&mut self, start: usize) -> Result<TokenKind, ParseError> {
        let mut end = start + 1;
        let mut seen_dot = self.source[start..].starts_with('.');
        let mut seen_exponent = false;

        while let Some(&(idx, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                end = idx + 1;
                self.advance();
            } else if c == '.' && !seen_dot && !seen_exponent {
                seen_dot = true;
                end = idx + 1;
                self.advance();
            } else if (c == 'e' || c == 'E') && !seen_exponent {
                seen_exponent = true;
                end = idx + 1;
                self.advance();
                if let Some(&(sign_idx, sign)) = self.chars.peek() {
                    if sign == '+' || sign == '-' {
                        end = sign_idx + 1;
                        self.advance();
                    }
                }
                if !matches!(self.peek_char(), Some(d) if d.is_ascii_digit()) {
                    return Err(ParseError::new("malformed exponent in number", start));
                }
            } else {
                break;
            }
        }

        let literal = &self.source[start..end];
        literal
            .parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| ParseError::new(format!("invalid number '{}'", literal), start))
    }

    fn scan_string(&mut self, start: usize, quote: char) -> Result<TokenKind, ParseError> {
        let mut value = String::new();
        loop {
            match self.advance() {
                Some((_, c)) if c == quote => return Ok(TokenKind::Str(value)),
                Some((_, '\\')) => {
                    if let Some((_, escaped)) = self.advance() {
                        value.push(escaped);
                    }
                }
                Some((_, c)) => value.push(c),
                None => return Err(ParseError::new("unterminated string literal", start)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_arithmetic_with_power_operator() {
        assert_eq!(
            kinds("M_Q * 2 ** -1"),
            vec![
                TokenKind::Ident("M_Q".to_string()),
                TokenKind::Star,
                TokenKind::Number(2.0),
                TokenKind::DoubleStar,
                TokenKind::Minus,
                TokenKind::Number(1.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn tokenizes_scientific_and_fractional_numbers() {
        assert_eq!(
            kinds("1e-8 5.233E7 .5 3."),
            vec![
                TokenKind::Number(1e-8),
                TokenKind::Number(5.233e7),
                TokenKind::Number(0.5),
                TokenKind::Number(3.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn distinguishes_double_character_operators() {
        assert_eq!(
            kinds("a // b == c"),
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::DoubleSlash,
                TokenKind::Ident("b".to_string()),
                TokenKind::Eq,
                TokenKind::Ident("c".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn rejects_unknown_characters() {
        let err = Lexer::new("a $ b").tokenize().unwrap_err();
        assert_eq!(err.position, 2);
    }

    #[test]
    fn rejects_malformed_exponent() {
        assert!(Lexer::new("1e+").tokenize().is_err());
    }

    #[test]
    fn rejects_unterminated_strings() {
        assert!(Lexer::new("'abc").tokenize().is_err());
    }
}
