//! JavaScript parser.
//!
//! Recursive descent with precedence climbing for binary expressions.

use crate::ast::*;
use crate::error::{JsError, JsResult};
use crate::lexer::Lexer;
use crate::token::{Span, Token, TokenKind};

/// Parse a source string into a program.
pub fn parse(source: &str) -> JsResult<Program> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse_program()
}

/// Token stream parser.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// Create a parser over a token stream.
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    /// Parse the whole program.
    pub fn parse_program(&mut self) -> JsResult<Program> {
        let mut body = Vec::new();
        while !self.is_eof() {
            body.push(self.parse_statement()?);
        }
        Ok(Program { body })
    }

    fn parse_statement(&mut self) -> JsResult<Statement> {
        match self.current() {
            TokenKind::Semicolon => {
                self.advance();
                Ok(Statement::Empty)
            }
            TokenKind::LBrace => self.parse_block_statement(),
            TokenKind::Var => self.parse_variable_declaration(DeclKind::Var),
            TokenKind::Let => self.parse_variable_declaration(DeclKind::Let),
            TokenKind::Const => self.parse_variable_declaration(DeclKind::Const),
            TokenKind::Function => self.parse_function_declaration(),
            TokenKind::If => self.parse_if_statement(),
            TokenKind::While => self.parse_while_statement(),
            TokenKind::Do => self.parse_do_while_statement(),
            TokenKind::For => self.parse_for_statement(),
            TokenKind::Break => {
                self.advance();
                self.consume_semicolon();
                Ok(Statement::Break)
            }
            TokenKind::Continue => {
                self.advance();
                self.consume_semicolon();
                Ok(Statement::Continue)
            }
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::Throw => self.parse_throw_statement(),
            TokenKind::Try => self.parse_try_statement(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_block_statement(&mut self) -> JsResult<Statement> {
        Ok(Statement::Block(self.parse_block()?))
    }

    fn parse_block(&mut self) -> JsResult<Vec<Statement>> {
        self.expect(&TokenKind::LBrace)?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.is_eof() {
                return Err(self.unexpected("'}'"));
            }
            body.push(self.parse_statement()?);
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(body)
    }

    fn parse_variable_declaration(&mut self, kind: DeclKind) -> JsResult<Statement> {
        self.advance();
        let declarations = self.parse_declarators()?;
        self.consume_semicolon();
        Ok(Statement::Var { kind, declarations })
    }

    fn parse_declarators(&mut self) -> JsResult<Vec<VarDeclarator>> {
        let mut declarations = Vec::new();
        loop {
            let name = self.parse_identifier_name()?;
            let init = if self.eat(&TokenKind::Assign) {
                Some(self.parse_assignment_expression()?)
            } else {
                None
            };
            declarations.push(VarDeclarator { name, init });
            if !self.eat(&TokenKind::Comma) {
                return Ok(declarations);
            }
        }
    }

    fn parse_function_declaration(&mut self) -> JsResult<Statement> {
        self.advance();
        let name = self.parse_identifier_name()?;
        let params = self.parse_function_params()?;
        let body = self.parse_block()?;
        Ok(Statement::Function { name, params, body })
    }

    fn parse_function_params(&mut self) -> JsResult<Vec<String>> {
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(params);
        }
        loop {
            params.push(self.parse_identifier_name()?);
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            self.expect(&TokenKind::RParen)?;
            return Ok(params);
        }
    }

    fn parse_if_statement(&mut self) -> JsResult<Statement> {
        self.advance();
        self.expect(&TokenKind::LParen)?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.eat(&TokenKind::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Statement::If {
            test,
            consequent,
            alternate,
        })
    }

    fn parse_while_statement(&mut self) -> JsResult<Statement> {
        self.advance();
        self.expect(&TokenKind::LParen)?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Statement::While { test, body })
    }

    fn parse_do_while_statement(&mut self) -> JsResult<Statement> {
        self.advance();
        let body = Box::new(self.parse_statement()?);
        self.expect(&TokenKind::While)?;
        self.expect(&TokenKind::LParen)?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        self.consume_semicolon();
        Ok(Statement::DoWhile { body, test })
    }

    fn parse_for_statement(&mut self) -> JsResult<Statement> {
        self.advance();
        self.expect(&TokenKind::LParen)?;

        // for (binding in object)
        if let Some(stmt) = self.try_parse_for_in()? {
            return Ok(stmt);
        }

        let init = if self.eat(&TokenKind::Semicolon) {
            None
        } else if matches!(
            self.current(),
            TokenKind::Var | TokenKind::Let | TokenKind::Const
        ) {
            let kind = match self.current() {
                TokenKind::Var => DeclKind::Var,
                TokenKind::Let => DeclKind::Let,
                _ => DeclKind::Const,
            };
            self.advance();
            let declarations = self.parse_declarators()?;
            self.expect(&TokenKind::Semicolon)?;
            Some(Box::new(Statement::Var { kind, declarations }))
        } else {
            let expr = self.parse_expression()?;
            self.expect(&TokenKind::Semicolon)?;
            Some(Box::new(Statement::Expression(expr)))
        };

        let test = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::Semicolon)?;

        let update = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::RParen)?;

        let body = Box::new(self.parse_statement()?);
        Ok(Statement::For {
            init,
            test,
            update,
            body,
        })
    }

    /// Recognize `for (var k in obj)` and `for (k in obj)` headers by
    /// lookahead, leaving the stream untouched for C-style headers.
    fn try_parse_for_in(&mut self) -> JsResult<Option<Statement>> {
        let decl = match self.current() {
            TokenKind::Var => Some(DeclKind::Var),
            TokenKind::Let => Some(DeclKind::Let),
            TokenKind::Const => Some(DeclKind::Const),
            _ => None,
        };
        let offset = if decl.is_some() { 1 } else { 0 };
        let is_for_in = matches!(self.peek_kind(offset), TokenKind::Identifier(_))
            && self.peek_kind(offset + 1) == &TokenKind::In;
        if !is_for_in {
            return Ok(None);
        }
        if decl.is_some() {
            self.advance();
        }
        let binding = self.parse_identifier_name()?;
        self.expect(&TokenKind::In)?;
        let object = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Some(Statement::ForIn {
            decl,
            binding,
            object,
            body,
        }))
    }

    fn parse_return_statement(&mut self) -> JsResult<Statement> {
        self.advance();
        if self.check(&TokenKind::Semicolon) || self.check(&TokenKind::RBrace) || self.is_eof() {
            self.consume_semicolon();
            return Ok(Statement::Return(None));
        }
        let argument = self.parse_expression()?;
        self.consume_semicolon();
        Ok(Statement::Return(Some(argument)))
    }

    fn parse_throw_statement(&mut self) -> JsResult<Statement> {
        self.advance();
        let argument = self.parse_expression()?;
        self.consume_semicolon();
        Ok(Statement::Throw(argument))
    }

    fn parse_try_statement(&mut self) -> JsResult<Statement> {
        self.advance();
        let block = self.parse_block()?;
        let mut param = None;
        let handler = if self.eat(&TokenKind::Catch) {
            if self.eat(&TokenKind::LParen) {
                param = Some(self.parse_identifier_name()?);
                self.expect(&TokenKind::RParen)?;
            }
            Some(self.parse_block()?)
        } else {
            None
        };
        let finalizer = if self.eat(&TokenKind::Finally) {
            Some(self.parse_block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(JsError::syntax("missing catch or finally after try"));
        }
        Ok(Statement::Try {
            block,
            param,
            handler,
            finalizer,
        })
    }

    fn parse_expression_statement(&mut self) -> JsResult<Statement> {
        let expr = self.parse_expression()?;
        self.consume_semicolon();
        Ok(Statement::Expression(expr))
    }

    /// Parse an expression.
    pub fn parse_expression(&mut self) -> JsResult<Expression> {
        self.parse_assignment_expression()
    }

    fn parse_assignment_expression(&mut self) -> JsResult<Expression> {
        let left = self.parse_conditional_expression()?;
        let op = match self.current() {
            TokenKind::Assign => AssignOp::Assign,
            TokenKind::PlusAssign => AssignOp::AddAssign,
            TokenKind::MinusAssign => AssignOp::SubAssign,
            _ => return Ok(left),
        };
        if !matches!(
            left,
            Expression::Identifier(_) | Expression::Member { .. } | Expression::Index { .. }
        ) {
            return Err(JsError::syntax("invalid assignment target"));
        }
        self.advance();
        let value = self.parse_assignment_expression()?;
        Ok(Expression::Assign {
            op,
            target: Box::new(left),
            value: Box::new(value),
        })
    }

    fn parse_conditional_expression(&mut self) -> JsResult<Expression> {
        let test = self.parse_binary_expression(1)?;
        if !self.eat(&TokenKind::Question) {
            return Ok(test);
        }
        let consequent = self.parse_assignment_expression()?;
        self.expect(&TokenKind::Colon)?;
        let alternate = self.parse_assignment_expression()?;
        Ok(Expression::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn parse_binary_expression(&mut self, min_prec: u8) -> JsResult<Expression> {
        let mut left = self.parse_unary_expression()?;
        loop {
            let Some(prec) = binary_precedence(self.current()) else {
                return Ok(left);
            };
            if prec < min_prec {
                return Ok(left);
            }
            let token = self.current().clone();
            self.advance();
            let right = self.parse_binary_expression(prec + 1)?;
            left = combine_binary(&token, left, right);
        }
    }

    fn parse_unary_expression(&mut self) -> JsResult<Expression> {
        let op = match self.current() {
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Minus),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Typeof => Some(UnaryOp::Typeof),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let argument = self.parse_unary_expression()?;
            return Ok(Expression::Unary {
                op,
                argument: Box::new(argument),
            });
        }
        let update = match self.current() {
            TokenKind::PlusPlus => Some(UpdateOp::Increment),
            TokenKind::MinusMinus => Some(UpdateOp::Decrement),
            _ => None,
        };
        if let Some(op) = update {
            self.advance();
            let argument = self.parse_unary_expression()?;
            return Ok(Expression::Update {
                op,
                prefix: true,
                argument: Box::new(argument),
            });
        }
        self.parse_postfix_expression()
    }

    fn parse_postfix_expression(&mut self) -> JsResult<Expression> {
        let expr = self.parse_left_hand_side_expression()?;
        let op = match self.current() {
            TokenKind::PlusPlus => Some(UpdateOp::Increment),
            TokenKind::MinusMinus => Some(UpdateOp::Decrement),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            return Ok(Expression::Update {
                op,
                prefix: false,
                argument: Box::new(expr),
            });
        }
        Ok(expr)
    }

    fn parse_left_hand_side_expression(&mut self) -> JsResult<Expression> {
        let mut expr = if self.check(&TokenKind::New) {
            self.parse_new_expression()?
        } else {
            self.parse_primary_expression()?
        };
        loop {
            expr = match self.current() {
                TokenKind::Dot => {
                    self.advance();
                    let property = self.parse_identifier_name()?;
                    Expression::Member {
                        object: Box::new(expr),
                        property,
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(&TokenKind::RBracket)?;
                    Expression::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    }
                }
                TokenKind::LParen => {
                    let arguments = self.parse_arguments()?;
                    Expression::Call {
                        callee: Box::new(expr),
                        arguments,
                    }
                }
                _ => return Ok(expr),
            };
        }
    }

    fn parse_new_expression(&mut self) -> JsResult<Expression> {
        self.expect(&TokenKind::New)?;
        let mut callee = self.parse_primary_expression()?;
        loop {
            callee = match self.current() {
                TokenKind::Dot => {
                    self.advance();
                    let property = self.parse_identifier_name()?;
                    Expression::Member {
                        object: Box::new(callee),
                        property,
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(&TokenKind::RBracket)?;
                    Expression::Index {
                        object: Box::new(callee),
                        index: Box::new(index),
                    }
                }
                _ => break,
            };
        }
        let arguments = if self.check(&TokenKind::LParen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        Ok(Expression::New {
            callee: Box::new(callee),
            arguments,
        })
    }

    fn parse_primary_expression(&mut self) -> JsResult<Expression> {
        let expr = match self.current().clone() {
            TokenKind::Number(n) => {
                self.advance();
                Expression::Number(n)
            }
            TokenKind::String(s) => {
                self.advance();
                Expression::String(s)
            }
            TokenKind::True => {
                self.advance();
                Expression::Boolean(true)
            }
            TokenKind::False => {
                self.advance();
                Expression::Boolean(false)
            }
            TokenKind::Null => {
                self.advance();
                Expression::Null
            }
            TokenKind::This => {
                self.advance();
                Expression::This
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Expression::Identifier(name)
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RParen)?;
                expr
            }
            TokenKind::LBracket => self.parse_array_expression()?,
            TokenKind::LBrace => self.parse_object_expression()?,
            TokenKind::Function => self.parse_function_expression()?,
            _ => return Err(self.unexpected("an expression")),
        };
        Ok(expr)
    }

    fn parse_array_expression(&mut self) -> JsResult<Expression> {
        self.expect(&TokenKind::LBracket)?;
        let mut elements = Vec::new();
        if self.eat(&TokenKind::RBracket) {
            return Ok(Expression::Array(elements));
        }
        loop {
            elements.push(self.parse_assignment_expression()?);
            if self.eat(&TokenKind::Comma) {
                if self.eat(&TokenKind::RBracket) {
                    return Ok(Expression::Array(elements));
                }
                continue;
            }
            self.expect(&TokenKind::RBracket)?;
            return Ok(Expression::Array(elements));
        }
    }

    fn parse_object_expression(&mut self) -> JsResult<Expression> {
        self.expect(&TokenKind::LBrace)?;
        let mut properties = Vec::new();
        if self.eat(&TokenKind::RBrace) {
            return Ok(Expression::Object(properties));
        }
        loop {
            let name = self.parse_property_name()?;
            self.expect(&TokenKind::Colon)?;
            let value = self.parse_assignment_expression()?;
            properties.push((name, value));
            if self.eat(&TokenKind::Comma) {
                if self.eat(&TokenKind::RBrace) {
                    return Ok(Expression::Object(properties));
                }
                continue;
            }
            self.expect(&TokenKind::RBrace)?;
            return Ok(Expression::Object(properties));
        }
    }

    fn parse_property_name(&mut self) -> JsResult<PropName> {
        let name = match self.current().clone() {
            TokenKind::Identifier(s) => PropName::Identifier(s),
            TokenKind::String(s) => PropName::String(s),
            TokenKind::Number(n) => PropName::Number(n),
            _ => return Err(self.unexpected("a property name")),
        };
        self.advance();
        Ok(name)
    }

    fn parse_function_expression(&mut self) -> JsResult<Expression> {
        self.expect(&TokenKind::Function)?;
        let name = if let TokenKind::Identifier(name) = self.current().clone() {
            self.advance();
            Some(name)
        } else {
            None
        };
        let params = self.parse_function_params()?;
        let body = self.parse_block()?;
        Ok(Expression::Function { name, params, body })
    }

    fn parse_arguments(&mut self) -> JsResult<Vec<Expression>> {
        self.expect(&TokenKind::LParen)?;
        let mut arguments = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(arguments);
        }
        loop {
            arguments.push(self.parse_assignment_expression()?);
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            self.expect(&TokenKind::RParen)?;
            return Ok(arguments);
        }
    }

    fn parse_identifier_name(&mut self) -> JsResult<String> {
        if let TokenKind::Identifier(name) = self.current().clone() {
            self.advance();
            return Ok(name);
        }
        Err(self.unexpected("an identifier"))
    }

    fn current(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn current_span(&self) -> Span {
        self.tokens[self.pos].span
    }

    fn peek_kind(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn is_eof(&self) -> bool {
        self.current() == &TokenKind::Eof
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.current() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> JsResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(JsError::syntax(format!(
                "expected {:?}, found {:?} at {}",
                kind,
                self.current(),
                self.current_span()
            )))
        }
    }

    fn consume_semicolon(&mut self) {
        self.eat(&TokenKind::Semicolon);
    }

    fn unexpected(&self, expected: &str) -> JsError {
        JsError::syntax(format!(
            "expected {}, found {:?} at {}",
            expected,
            self.current(),
            self.current_span()
        ))
    }
}

fn binary_precedence(kind: &TokenKind) -> Option<u8> {
    let prec = match kind {
        TokenKind::OrOr => 1,
        TokenKind::AndAnd => 2,
        TokenKind::EqEq | TokenKind::NotEq | TokenKind::EqEqEq | TokenKind::NotEqEq => 3,
        TokenKind::Lt | TokenKind::LtEq | TokenKind::Gt | TokenKind::GtEq | TokenKind::In => 4,
        TokenKind::Plus | TokenKind::Minus => 5,
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => 6,
        _ => return None,
    };
    Some(prec)
}

fn combine_binary(token: &TokenKind, left: Expression, right: Expression) -> Expression {
    let logical = match token {
        TokenKind::AndAnd => Some(LogicalOp::And),
        TokenKind::OrOr => Some(LogicalOp::Or),
        _ => None,
    };
    if let Some(op) = logical {
        return Expression::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
    }
    let op = match token {
        TokenKind::EqEq => BinaryOp::Eq,
        TokenKind::NotEq => BinaryOp::NotEq,
        TokenKind::EqEqEq => BinaryOp::StrictEq,
        TokenKind::NotEqEq => BinaryOp::StrictNotEq,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::LtEq => BinaryOp::LtEq,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::GtEq => BinaryOp::GtEq,
        TokenKind::In => BinaryOp::In,
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Rem,
        _ => BinaryOp::Add,
    };
    Expression::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_expression_statements() {
        let program = parse("1 + 2 * 3;").expect("parse");
        assert_eq!(program.body.len(), 1);
        let Statement::Expression(Expression::Binary { op, .. }) = &program.body[0] else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, BinaryOp::Add);
    }

    #[test]
    fn parses_nested_literals() {
        let program = parse("[1, 2, 3, [4, 5]]").expect("parse");
        let Statement::Expression(Expression::Array(elements)) = &program.body[0] else {
            panic!("expected array literal");
        };
        assert_eq!(elements.len(), 4);
        assert!(matches!(elements[3], Expression::Array(_)));

        let program = parse("({a: 1, b: 2, c: {d: 4}})").expect("parse");
        let Statement::Expression(Expression::Object(props)) = &program.body[0] else {
            panic!("expected object literal");
        };
        assert_eq!(props.len(), 3);
    }

    #[test]
    fn parses_for_in_and_c_style_for() {
        let program = parse("for (var k in obj) { k; }").expect("parse");
        assert!(matches!(program.body[0], Statement::ForIn { .. }));

        let program = parse("for (var i = 0; i < 10; i++) { i; }").expect("parse");
        assert!(matches!(program.body[0], Statement::For { .. }));
    }

    #[test]
    fn parses_functions_and_calls() {
        let program = parse("function add(a, b) { return a + b; } add(1, 2);").expect("parse");
        assert!(matches!(program.body[0], Statement::Function { .. }));
        let Statement::Expression(Expression::Call { arguments, .. }) = &program.body[1] else {
            panic!("expected call");
        };
        assert_eq!(arguments.len(), 2);
    }

    #[test]
    fn parses_new_with_member_chain() {
        let program = parse("new lib.Point(1, 2)").expect("parse");
        let Statement::Expression(Expression::New { callee, arguments }) = &program.body[0] else {
            panic!("expected new expression");
        };
        assert!(matches!(**callee, Expression::Member { .. }));
        assert_eq!(arguments.len(), 2);
    }

    #[test]
    fn rejects_invalid_assignment_target() {
        assert!(parse("1 = 2").is_err());
    }

    #[test]
    fn rejects_unbalanced_braces() {
        assert!(parse("function f() { return 1;").is_err());
    }
}
