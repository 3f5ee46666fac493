use super::ast::{BinaryOp, Expr, SyntaxElement, UnaryOp};
use super::error::ParseError;
use super::lexer::{Lexer, Token, TokenKind};
use phf::phf_set;

static RESERVED_WORDS: phf::Set<&'static str> = phf_set! {
    "and", "or", "not", "in", "is", "if", "elif", "else", "for", "while", "lambda",
    "import", "from", "def", "class", "return", "yield", "with", "as", "assert", "del",
    "global", "nonlocal", "pass", "raise", "try", "except", "finally", "async", "await",
    "break", "continue",
};

/// Deepest syntax tree the parser builds. Every nested group, unary operator and chained
/// binary operator adds a level.
pub const MAX_DEPTH: usize = 100;

/// Parses a formula expression into its syntax tree.
///
/// Operator precedence, lowest first: `or`, `and`, `not`, comparisons, bitwise operators,
/// `+ -`, `* / // % @`, unary `+ - ~`, `**` (right-associative, binding tighter than a unary
/// operator on its left), then calls, attribute access and subscripts.
pub fn parse(source: &str) -> Result<Expr, ParseError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };

    if parser.check(&TokenKind::Eof) {
        return Err(ParseError::new("expression is empty", 0));
    }

    let expr = parser.parse_expression()?;
    if !parser.check(&TokenKind::Eof) {
        let token = parser.peek();
        return Err(ParseError::new(
            format!("unexpected {}", describe(&token.kind)),
            token.position,
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // The token stream always ends with `Eof`, which is never consumed.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_ahead(&self, offset: usize) -> &TokenKind {
        let index = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), ParseError> {
        if self.eat(kind) {
            Ok(())
        } else {
            let token = self.peek();
            Err(ParseError::new(
                format!("expected {}, found {}", describe(kind), describe(&token.kind)),
                token.position,
            ))
        }
    }

    fn check_keyword(&self, word: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(name) if name == word)
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.check_keyword(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn descend(&mut self) -> Result<(), ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError::new(
                "expression nests too deeply",
                self.peek().position,
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        let depth = self.depth;
        self.descend()?;
        let expr = self.parse_or()?;
        self.depth = depth;
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let depth = self.depth;
        let mut left = self.parse_and()?;
        while self.eat_keyword("or") {
            self.descend()?;
            let right = self.parse_and()?;
            left = Expr::unsupported(SyntaxElement::BooleanOperator, vec![left, right]);
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let depth = self.depth;
        let mut left = self.parse_not()?;
        while self.eat_keyword("and") {
            self.descend()?;
            let right = self.parse_not()?;
            left = Expr::unsupported(SyntaxElement::BooleanOperator, vec![left, right]);
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.eat_keyword("not") {
            let depth = self.depth;
            self.descend()?;
            let operand = self.parse_not()?;
            self.depth = depth;
            return Ok(Expr::unsupported(
                SyntaxElement::BooleanOperator,
                vec![operand],
            ));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let depth = self.depth;
        let mut left = self.parse_bitwise()?;
        while self.eat_comparison_operator() {
            self.descend()?;
            let right = self.parse_bitwise()?;
            left = Expr::unsupported(SyntaxElement::Comparison, vec![left, right]);
        }
        self.depth = depth;
        Ok(left)
    }

    fn eat_comparison_operator(&mut self) -> bool {
        match &self.peek().kind {
            TokenKind::Eq
            | TokenKind::Ne
            | TokenKind::Lt
            | TokenKind::Le
            | TokenKind::Gt
            | TokenKind::Ge => {
                self.advance();
                true
            }
            TokenKind::Ident(word) if word == "in" => {
                self.advance();
                true
            }
            TokenKind::Ident(word) if word == "is" => {
                self.advance();
                self.eat_keyword("not");
                true
            }
            TokenKind::Ident(word)
                if word == "not"
                    && matches!(self.peek_ahead(1), TokenKind::Ident(next) if next == "in") =>
            {
                self.advance();
                self.advance();
                true
            }
            _ => false,
        }
    }

    fn parse_bitwise(&mut self) -> Result<Expr, ParseError> {
        let depth = self.depth;
        let mut left = self.parse_additive()?;
        while matches!(
            self.peek().kind,
            TokenKind::Pipe
                | TokenKind::Caret
                | TokenKind::Amp
                | TokenKind::ShiftLeft
                | TokenKind::ShiftRight
        ) {
            self.advance();
            self.descend()?;
            let right = self.parse_additive()?;
            left = Expr::unsupported(SyntaxElement::BitwiseOperator, vec![left, right]);
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let depth = self.depth;
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.descend()?;
            let right = self.parse_multiplicative()?;
            left = Expr::binary(op, left, right);
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let depth = self.depth;
        let mut left = self.parse_unary()?;
        loop {
            let kind = self.peek().kind.clone();
            let op = match kind {
                TokenKind::Star => Some(BinaryOp::Mul),
                TokenKind::Slash => Some(BinaryOp::Div),
                TokenKind::Percent => Some(BinaryOp::Mod),
                TokenKind::DoubleSlash | TokenKind::At => None,
                _ => break,
            };
            self.advance();
            self.descend()?;
            let right = self.parse_unary()?;
            left = match op {
                Some(op) => Expr::binary(op, left, right),
                None if kind == TokenKind::DoubleSlash => {
                    Expr::unsupported(SyntaxElement::FloorDivision, vec![left, right])
                }
                None => Expr::unsupported(SyntaxElement::MatrixMultiplication, vec![left, right]),
            };
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek().kind {
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Minus => Some(UnaryOp::Minus),
            TokenKind::Tilde => None,
            _ => return self.parse_power(),
        };
        self.advance();
        let depth = self.depth;
        self.descend()?;
        let operand = self.parse_unary()?;
        self.depth = depth;
        let Some(op) = op else {
            return Ok(Expr::unsupported(
                SyntaxElement::BitwiseInversion,
                vec![operand],
            ));
        };
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_postfix()?;
        if self.eat(&TokenKind::DoubleStar) {
            let depth = self.depth;
            self.descend()?;
            let exponent = self.parse_unary()?;
            self.depth = depth;
            return Ok(Expr::binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let depth = self.depth;
        let mut expr = self.parse_atom()?;
        loop {
            if matches!(
                self.peek().kind,
                TokenKind::LParen | TokenKind::Dot | TokenKind::LBracket
            ) {
                self.descend()?;
            }
            if self.eat(&TokenKind::LParen) {
                let (args, keywords) = self.parse_call_arguments()?;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                    keywords,
                };
            } else if self.eat(&TokenKind::Dot) {
                let token = self.advance();
                match token.kind {
                    TokenKind::Ident(attr) => {
                        expr = Expr::Attribute {
                            value: Box::new(expr),
                            attr,
                        };
                    }
                    other => {
                        return Err(ParseError::new(
                            format!("expected attribute name, found {}", describe(&other)),
                            token.position,
                        ));
                    }
                }
            } else if self.eat(&TokenKind::LBracket) {
                let (mut operands, _) = self.parse_items(&TokenKind::RBracket)?;
                operands.insert(0, expr);
                expr = Expr::unsupported(SyntaxElement::Subscript, operands);
            } else {
                self.depth = depth;
                return Ok(expr);
            }
        }
    }

    fn parse_call_arguments(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), ParseError> {
        let mut args = Vec::new();
        let mut keywords = Vec::new();

        while !self.eat(&TokenKind::RParen) {
            let keyword = match (&self.peek().kind, self.peek_ahead(1)) {
                (TokenKind::Ident(name), TokenKind::Assign) => Some(name.clone()),
                _ => None,
            };

            if let Some(name) = keyword {
                self.advance();
                self.advance();
                keywords.push((name, self.parse_expression()?));
            } else {
                args.push(self.parse_expression()?);
            }

            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RParen)?;
                break;
            }
        }

        Ok((args, keywords))
    }

    /// Parses comma or colon separated items up to `closing`. Returns the items and whether a
    /// colon separator was seen.
    fn parse_items(&mut self, closing: &TokenKind) -> Result<(Vec<Expr>, bool), ParseError> {
        let mut items = Vec::new();
        let mut saw_colon = false;

        while !self.eat(closing) {
            items.push(self.parse_expression()?);
            if self.eat(&TokenKind::Colon) {
                saw_colon = true;
                continue;
            }
            if !self.eat(&TokenKind::Comma) {
                self.expect(closing)?;
                break;
            }
        }

        Ok((items, saw_colon))
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(value) => Ok(Expr::Number(value)),
            TokenKind::Str(_) => Ok(Expr::unsupported(SyntaxElement::StringLiteral, Vec::new())),
            TokenKind::Ident(name) if RESERVED_WORDS.contains(name.as_str()) => Err(
                ParseError::new(format!("unexpected keyword '{}'", name), token.position),
            ),
            TokenKind::Ident(name) => Ok(Expr::Name(name)),
            TokenKind::LParen => self.parse_parenthesized(),
            TokenKind::LBracket => {
                let (items, _) = self.parse_items(&TokenKind::RBracket)?;
                Ok(Expr::unsupported(SyntaxElement::List, items))
            }
            TokenKind::LBrace => {
                let empty = self.check(&TokenKind::RBrace);
                let (items, saw_colon) = self.parse_items(&TokenKind::RBrace)?;
                let element = if saw_colon || empty {
                    SyntaxElement::Dict
                } else {
                    SyntaxElement::Set
                };
                Ok(Expr::unsupported(element, items))
            }
            other => Err(ParseError::new(
                format!("unexpected {}", describe(&other)),
                token.position,
            )),
        }
    }

    fn parse_parenthesized(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&TokenKind::RParen) {
            return Ok(Expr::unsupported(SyntaxElement::Tuple, Vec::new()));
        }

        let first = self.parse_expression()?;
        if !self.eat(&TokenKind::Comma) {
            self.expect(&TokenKind::RParen)?;
            return Ok(first);
        }

        let mut items = vec![first];
        while !self.eat(&TokenKind::RParen) {
            items.push(self.parse_expression()?);
            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RParen)?;
                break;
            }
        }
        Ok(Expr::unsupported(SyntaxElement::Tuple, items))
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Number(value) => format!("number {}", value),
        TokenKind::Ident(name) => format!("name '{}'", name),
        TokenKind::Str(_) => "string literal".to_string(),
        TokenKind::Eof => "end of expression".to_string(),
        other => format!("'{}'", symbol(other)),
    }
}

fn symbol(kind: &TokenKind) -> &'static str {
    match kind {
        TokenKind::Plus => "+",
        TokenKind::Minus => "-",
        TokenKind::Star => "*",
        TokenKind::DoubleStar => "**",
        TokenKind::Slash => "/",
        TokenKind::DoubleSlash => "//",
        TokenKind::Percent => "%",
        TokenKind::At => "@",
        TokenKind::Amp => "&",
        TokenKind::Pipe => "|",
        TokenKind::Caret => "^",
        TokenKind::Tilde => "~",
        TokenKind::ShiftLeft => "<<",
        TokenKind::ShiftRight => ">>",
        TokenKind::Eq => "==",
        TokenKind::Ne => "!=",
        TokenKind::Lt => "<",
        TokenKind::Le => "<=",
        TokenKind::Gt => ">",
        TokenKind::Ge => ">=",
        TokenKind::Assign => "=",
        TokenKind::LParen => "(",
        TokenKind::RParen => ")",
        TokenKind::LBracket => "[",
        TokenKind::RBracket => "]",
        TokenKind::LBrace => "{",
        TokenKind::RBrace => "}",
        TokenKind::Comma => ",",
        TokenKind::Dot => ".",
        TokenKind::Colon => ":",
        TokenKind::Number(_) | TokenKind::Ident(_) | TokenKind::Str(_) | TokenKind::Eof => "",
    }
}
