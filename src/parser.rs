use std::str::Chars;

use crate::{
    ast::{ASTNode, Expression, Function, Prototype},
    lexer::{Lexer, Position, Token},
    precedence::PrecedenceTable,
};

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum ParserError {
    #[error("{position}: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: &'static str,
        found: Token,
        position: Position,
    },
    #[error("{position}: expected an expression, found {found}")]
    ExpectedExpression { found: Token, position: Position },
    #[error("{position}: duplicate parameter `{name}` in prototype of `{function}`")]
    DuplicateParameter {
        function: String,
        name: String,
        position: Position,
    },
}

impl ParserError {
    /// Whether parsing failed only because the input ran out.
    pub fn at_end_of_input(&self) -> bool {
        match self {
            ParserError::UnexpectedToken { found, .. }
            | ParserError::ExpectedExpression { found, .. } => *found == Token::Eof,
            ParserError::DuplicateParameter { .. } => false,
        }
    }
}

pub type PartialParseResult = Result<Expression, ParserError>;

/// One parse session. Owns the lexer and the current token, so separate
/// parsers never observe each other's state.
pub struct Parser<I: Iterator<Item = char>> {
    lexer: Lexer<I>,
    current: Token,
    position: Position,
    precedence: PrecedenceTable,
}

impl<'a> Parser<Chars<'a>> {
    pub fn from_source(source: &'a str) -> Self {
        Self::new(source.chars())
    }
}

impl<I: Iterator<Item = char>> Parser<I> {
    pub fn new(chars: I) -> Self {
        Self::with_precedence(chars, PrecedenceTable::default())
    }

    pub fn with_precedence(chars: I, precedence: PrecedenceTable) -> Self {
        let mut lexer = Lexer::new(chars);
        let current = lexer.next_token();
        let position = lexer.position();
        Self {
            lexer,
            current,
            position,
            precedence,
        }
    }

    pub fn current_token(&self) -> &Token {
        &self.current
    }

    pub fn position(&self) -> Position {
        self.position
    }

    fn advance(&mut self) {
        self.current = self.lexer.next_token();
        self.position = self.lexer.position();
    }

    fn at_char(&self, c: char) -> bool {
        self.current == Token::Char(c)
    }

    fn unexpected(&self, expected: &'static str) -> ParserError {
        ParserError::UnexpectedToken {
            expected,
            found: self.current.clone(),
            position: self.position,
        }
    }

    fn expect_char(&mut self, c: char, expected: &'static str) -> Result<(), ParserError> {
        if !self.at_char(c) {
            return Err(self.unexpected(expected));
        }
        self.advance();
        Ok(())
    }

    /// The current token as a binary operator with its precedence, if it is one.
    fn current_operator(&self) -> Option<(char, i32)> {
        match self.current {
            Token::Char(op) if self.precedence.is_binary_operator(op) => {
                Some((op, self.precedence.precedence_of(op)))
            }
            _ => None,
        }
    }

    fn parse_number(&mut self, value: f64) -> PartialParseResult {
        self.advance();
        Ok(Expression::Literal(value))
    }

    /// identifierexpr ::= identifier | identifier '(' (expression (',' expression)*)? ')'
    pub fn parse_identifier_expr(&mut self) -> PartialParseResult {
        let name = match &self.current {
            Token::Ident(name) => name.clone(),
            _ => return Err(self.unexpected("identifier")),
        };
        self.advance();

        if !self.at_char('(') {
            return Ok(Expression::Variable(name));
        }
        self.advance();

        let mut args = Vec::new();
        if !self.at_char(')') {
            loop {
                args.push(self.parse_expression()?);
                match self.current {
                    Token::Char(')') => break,
                    Token::Char(',') => {
                        self.advance();
                    }
                    _ => return Err(self.unexpected("',' or ')' in argument list")),
                }
            }
        }
        self.advance();

        Ok(Expression::Call { callee: name, args })
    }

    /// parenexpr ::= '(' expression ')'
    pub fn parse_paren_expr(&mut self) -> PartialParseResult {
        self.expect_char('(', "'('")?;
        let expr = self.parse_expression()?;
        self.expect_char(')', "')'")?;
        Ok(expr)
    }

    /// Parse a primary, or `Ok(None)` when the current token cannot start one.
    pub fn try_parse_primary(&mut self) -> Result<Option<Expression>, ParserError> {
        let expr = match self.current {
            Token::Ident(_) => self.parse_identifier_expr()?,
            Token::Number(value) => self.parse_number(value)?,
            Token::Char('(') => self.parse_paren_expr()?,
            _ => return Ok(None),
        };
        Ok(Some(expr))
    }

    pub fn parse_primary(&mut self) -> PartialParseResult {
        match self.try_parse_primary()? {
            Some(expr) => Ok(expr),
            None => Err(ParserError::ExpectedExpression {
                found: self.current.clone(),
                position: self.position,
            }),
        }
    }

    /// Precedence climbing: fold operators binding at least as tightly as
    /// `min_precedence` onto `lhs`.
    fn parse_binary_rhs(&mut self, min_precedence: i32, mut lhs: Expression) -> PartialParseResult {
        loop {
            let (op, precedence) = match self.current_operator() {
                Some((op, precedence)) if precedence >= min_precedence => (op, precedence),
                _ => return Ok(lhs),
            };
            self.advance();

            let mut rhs = self.parse_primary()?;

            if let Some((_, next_precedence)) = self.current_operator() {
                if precedence < next_precedence {
                    rhs = self.parse_binary_rhs(precedence + 1, rhs)?;
                }
            }

            lhs = Expression::binary(op, lhs, rhs);
        }
    }

    pub fn parse_expression(&mut self) -> PartialParseResult {
        let lhs = self.parse_primary()?;
        self.parse_binary_rhs(0, lhs)
    }

    /// prototype ::= identifier '(' identifier* ')'
    pub fn parse_prototype(&mut self) -> Result<Prototype, ParserError> {
        let name = match &self.current {
            Token::Ident(name) => name.clone(),
            _ => return Err(self.unexpected("function name in prototype")),
        };
        self.advance();

        self.expect_char('(', "'(' in prototype")?;

        let mut args: Vec<String> = Vec::new();
        while let Token::Ident(arg) = &self.current {
            if args.contains(arg) {
                return Err(ParserError::DuplicateParameter {
                    function: name,
                    name: arg.clone(),
                    position: self.position,
                });
            }
            args.push(arg.clone());
            self.advance();
        }

        self.expect_char(')', "')' in prototype")?;

        Ok(Prototype { name, args })
    }

    /// definition ::= 'def' prototype expression
    pub fn parse_definition(&mut self) -> Result<Function, ParserError> {
        if self.current != Token::Def {
            return Err(self.unexpected("'def'"));
        }
        self.advance();
        let prototype = self.parse_prototype()?;
        let body = self.parse_expression()?;
        Ok(Function { prototype, body })
    }

    /// external ::= 'extern' prototype
    pub fn parse_extern(&mut self) -> Result<Prototype, ParserError> {
        if self.current != Token::Extern {
            return Err(self.unexpected("'extern'"));
        }
        self.advance();
        self.parse_prototype()
    }

    pub fn parse_top_level_expr(&mut self) -> Result<Function, ParserError> {
        let body = self.parse_expression()?;
        Ok(Function::anonymous(body))
    }

    /// top ::= definition | external | expression | ';'
    ///
    /// Returns the next top-level unit, or `None` once the input is exhausted.
    pub fn parse_top_level(&mut self) -> Result<Option<ASTNode>, ParserError> {
        loop {
            let node = match self.current {
                Token::Eof => return Ok(None),
                Token::Char(';') => {
                    self.advance();
                    continue;
                }
                Token::Def => ASTNode::Function(self.parse_definition()?),
                Token::Extern => ASTNode::Extern(self.parse_extern()?),
                _ => ASTNode::Function(self.parse_top_level_expr()?),
            };
            return Ok(Some(node));
        }
    }

    /// Discard tokens up to the next `;` or end of input so parsing can
    /// resume after a failed unit.
    pub fn synchronize(&mut self) {
        while !matches!(self.current, Token::Eof | Token::Char(';')) {
            self.advance();
        }
    }

    /// Parse every remaining unit, stopping at the first error.
    pub fn parse_program(&mut self) -> Result<Vec<ASTNode>, ParserError> {
        let mut ast = Vec::new();
        while let Some(node) = self.parse_top_level()? {
            ast.push(node);
        }
        Ok(ast)
    }
}

pub fn parse_str(source: &str) -> Result<Vec<ASTNode>, ParserError> {
    Parser::from_source(source).parse_program()
}
