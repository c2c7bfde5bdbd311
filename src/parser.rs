use std::{rc::Rc, str::FromStr};

use rust_decimal::Decimal;

use crate::{
    ast::{
        Argument, BinaryOp, CatchClause, ClassDecl, EnumDecl, Expr, ExprKind, FunctionDecl,
        FunctionParam, ImportForm, InterpolationPart, Literal, Modifiers, Module, Stmt, StmtKind,
        SwitchCase, TypeExpr, UnaryOp,
    },
    diagnostics::{Diagnostic, DiagnosticKind, SourceSpan},
    lexer::{self, Keyword, Lexer, Token, TokenKind},
    scope::Accessibility,
};

pub fn parse_module(source: &str) -> Result<Module, Diagnostic> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse_module()
}

/// Parses a single expression embedded at `line`, e.g. an interpolation hole.
pub fn parse_expression_at(source: &str, line: usize) -> Result<Expr, Diagnostic> {
    let tokens = Lexer::starting_at_line(source, line).tokenize()?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expression()?;
    if !parser.check(TokenKind::Eof) {
        let token = parser.peek_token();
        return Err(parser.error(&token, "unexpected token after interpolated expression"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

/// Where a declaration appears; class bodies accept properties and fields only.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Context {
    Block,
    ClassBody,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    fn parse_module(&mut self) -> Result<Module, Diagnostic> {
        let mut items = Vec::new();
        while !self.check(TokenKind::Eof) {
            items.push(self.parse_statement()?);
        }
        Ok(Module { items })
    }

    fn parse_block_items(&mut self, terminator: TokenKind) -> Result<Vec<Stmt>, Diagnostic> {
        let mut items = Vec::new();
        while !self.check(terminator) && !self.check(TokenKind::Eof) {
            items.push(self.parse_statement()?);
        }
        self.consume(terminator, "expected block terminator")?;
        Ok(items)
    }

    fn parse_block(&mut self) -> Result<(Vec<Stmt>, SourceSpan), Diagnostic> {
        let lbrace = self.consume(TokenKind::LBrace, "expected `{` to start block")?;
        let items = self.parse_block_items(TokenKind::RBrace)?;
        let end = self.previous().span;
        Ok((items, lbrace.span.to(end)))
    }

    fn parse_statement(&mut self) -> Result<Stmt, Diagnostic> {
        self.parse_statement_in(Context::Block)
    }

    fn parse_statement_in(&mut self, context: Context) -> Result<Stmt, Diagnostic> {
        let start = self.peek_token().span;
        let modifiers = self.parse_modifiers()?;
        let has_modifiers = modifiers != Modifiers::default();
        let token = self.peek_token();
        match token.kind {
            TokenKind::Keyword(Keyword::Var) => return self.parse_var_decl(start, modifiers, context),
            TokenKind::Keyword(Keyword::Const) => return self.parse_const_decl(start, modifiers),
            TokenKind::Keyword(Keyword::Fn) if self.peek_kind_at(1) != Some(TokenKind::LParen) => {
                return self.parse_function(start, modifiers);
            }
            TokenKind::Keyword(Keyword::Class) => return self.parse_class(start, modifiers),
            TokenKind::Keyword(Keyword::Enum) => return self.parse_enum(start, modifiers),
            _ => {}
        }
        if has_modifiers {
            return Err(self.error(&token, "expected a declaration after modifiers"));
        }
        if context == Context::ClassBody {
            return Err(self.error(&token, "expected a member declaration in class body"));
        }
        match token.kind {
            TokenKind::Keyword(Keyword::Import) => self.parse_import(),
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::While) => self.parse_while(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Keyword(Keyword::Switch) => self.parse_switch(),
            TokenKind::Keyword(Keyword::Try) => self.parse_try(),
            TokenKind::Keyword(Keyword::Throw) => self.parse_throw(),
            TokenKind::Keyword(Keyword::Return) => self.parse_return(),
            TokenKind::Keyword(Keyword::Break) => {
                let token = self.advance();
                self.consume_optional_semicolon();
                Ok(Stmt {
                    kind: StmtKind::Break,
                    span: token.span,
                })
            }
            TokenKind::Keyword(Keyword::Continue) => {
                let token = self.advance();
                self.consume_optional_semicolon();
                Ok(Stmt {
                    kind: StmtKind::Continue,
                    span: token.span,
                })
            }
            TokenKind::LBrace => {
                let (items, span) = self.parse_block()?;
                Ok(Stmt {
                    kind: StmtKind::Block(items),
                    span,
                })
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_modifiers(&mut self) -> Result<Modifiers, Diagnostic> {
        let mut modifiers = Modifiers::default();
        loop {
            let token = self.peek_token();
            let accessibility = match token.kind {
                TokenKind::Keyword(Keyword::Public) => Accessibility::Public,
                TokenKind::Keyword(Keyword::Internal) => Accessibility::Internal,
                TokenKind::Keyword(Keyword::Protected) => Accessibility::Protected,
                TokenKind::Keyword(Keyword::Private) => Accessibility::Private,
                TokenKind::Keyword(Keyword::Static) => {
                    self.advance();
                    modifiers.is_static = true;
                    continue;
                }
                _ => return Ok(modifiers),
            };
            if modifiers.accessibility.is_some() {
                return Err(self.error(&token, "duplicate accessibility modifier"));
            }
            self.advance();
            modifiers.accessibility = Some(accessibility);
        }
    }

    fn parse_var_decl(
        &mut self,
        start: SourceSpan,
        modifiers: Modifiers,
        context: Context,
    ) -> Result<Stmt, Diagnostic> {
        self.consume_keyword(Keyword::Var)?;
        let name_token = self.consume_identifier("expected variable name")?;
        let annotation = if self.matches(TokenKind::Colon) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        if context == Context::ClassBody && self.check(TokenKind::LBrace) {
            return self.parse_property(start, name_token.lexeme, modifiers);
        }
        let initializer = if self.matches(TokenKind::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.consume_optional_semicolon();
        Ok(Stmt {
            kind: StmtKind::VarDecl {
                name: name_token.lexeme,
                is_const: false,
                annotation,
                initializer,
                modifiers,
            },
            span: start.to(self.previous().span),
        })
    }

    /// `var Name { get { ... } set { ... } }`
    fn parse_property(
        &mut self,
        start: SourceSpan,
        name: String,
        modifiers: Modifiers,
    ) -> Result<Stmt, Diagnostic> {
        self.consume(TokenKind::LBrace, "expected `{` to start property")?;
        let mut getter = None;
        let mut setter = None;
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            let accessor = self.consume_identifier("expected `get` or `set`")?;
            let (body, _) = self.parse_block()?;
            let slot = match accessor.lexeme.as_str() {
                "get" => &mut getter,
                "set" => &mut setter,
                _ => return Err(self.error(&accessor, "expected `get` or `set`")),
            };
            if slot.is_some() {
                return Err(self.error(&accessor, "duplicate property accessor"));
            }
            *slot = Some(Rc::from(body));
        }
        let end = self.consume(TokenKind::RBrace, "expected `}` after property")?;
        Ok(Stmt {
            kind: StmtKind::Property {
                name,
                getter,
                setter,
                modifiers,
            },
            span: start.to(end.span),
        })
    }

    fn parse_const_decl(&mut self, start: SourceSpan, modifiers: Modifiers) -> Result<Stmt, Diagnostic> {
        self.consume_keyword(Keyword::Const)?;
        let name_token = self.consume_identifier("expected constant name")?;
        let annotation = if self.matches(TokenKind::Colon) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        self.consume(TokenKind::Assign, "expected `=` in constant declaration")?;
        let value = self.parse_expression()?;
        self.consume_optional_semicolon();
        Ok(Stmt {
            span: start.to(value.span),
            kind: StmtKind::VarDecl {
                name: name_token.lexeme,
                is_const: true,
                annotation,
                initializer: Some(value),
                modifiers,
            },
        })
    }

    fn parse_function(&mut self, start: SourceSpan, modifiers: Modifiers) -> Result<Stmt, Diagnostic> {
        self.consume_keyword(Keyword::Fn)?;
        let name = self.parse_function_name()?;
        let decl = self.parse_function_rest(start, name, modifiers)?;
        Ok(Stmt {
            span: decl.span,
            kind: StmtKind::Function(Rc::new(decl)),
        })
    }

    /// A plain identifier, an operator symbol, or the indexer names `[]`/`[]=`.
    fn parse_function_name(&mut self) -> Result<String, Diagnostic> {
        let token = self.advance();
        let name = match token.kind {
            TokenKind::Identifier => token.lexeme,
            TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Star
            | TokenKind::Slash
            | TokenKind::Percent
            | TokenKind::EqualEqual
            | TokenKind::BangEqual
            | TokenKind::Less
            | TokenKind::LessEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::DoubleAmpersand
            | TokenKind::DoublePipe
            | TokenKind::Bang => token.lexeme,
            TokenKind::LBracket => {
                self.consume(TokenKind::RBracket, "expected `]` in indexer name")?;
                if self.matches(TokenKind::Assign) {
                    "[]=".to_string()
                } else {
                    "[]".to_string()
                }
            }
            _ => return Err(self.error(&token, "expected function name")),
        };
        Ok(name)
    }

    fn parse_function_rest(
        &mut self,
        start: SourceSpan,
        name: String,
        modifiers: Modifiers,
    ) -> Result<FunctionDecl, Diagnostic> {
        self.consume(TokenKind::LParen, "expected `(` after function name")?;
        let mut params: Vec<FunctionParam> = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let variadic = self.matches(TokenKind::Ellipsis);
                let param_name = self.consume_identifier("expected parameter name")?;
                if params.last().is_some_and(|param| param.variadic) {
                    return Err(self.error(&param_name, "variadic parameter must be last"));
                }
                let annotation = if self.matches(TokenKind::Colon) {
                    Some(self.parse_type_expr()?)
                } else {
                    None
                };
                let default = if self.matches(TokenKind::Assign) {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                params.push(FunctionParam {
                    name: param_name.lexeme.clone(),
                    annotation,
                    default,
                    variadic,
                    span: param_name.span,
                });
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "expected `)` after parameters")?;
        let (body, span) = self.parse_block()?;
        Ok(FunctionDecl {
            name,
            params,
            body: Rc::from(body),
            modifiers,
            span: start.to(span),
        })
    }

    fn parse_class(&mut self, start: SourceSpan, modifiers: Modifiers) -> Result<Stmt, Diagnostic> {
        self.consume_keyword(Keyword::Class)?;
        let name = self.consume_identifier("expected class name")?.lexeme;
        let mut supers = Vec::new();
        if self.matches(TokenKind::Colon) {
            loop {
                supers.push(self.consume_identifier("expected super class name")?.lexeme);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::LBrace, "expected `{` to start class body")?;
        let mut body = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            body.push(self.parse_statement_in(Context::ClassBody)?);
        }
        let end = self.consume(TokenKind::RBrace, "expected `}` after class body")?;
        let decl = ClassDecl {
            name,
            supers,
            body,
            modifiers,
            span: start.to(end.span),
        };
        Ok(Stmt {
            span: decl.span,
            kind: StmtKind::Class(Rc::new(decl)),
        })
    }

    fn parse_enum(&mut self, start: SourceSpan, modifiers: Modifiers) -> Result<Stmt, Diagnostic> {
        self.consume_keyword(Keyword::Enum)?;
        let name = self.consume_identifier("expected enum name")?.lexeme;
        self.consume(TokenKind::LBrace, "expected `{` to start enum body")?;
        let mut variants = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            let variant = self.consume_identifier("expected enum variant")?.lexeme;
            let value = if self.matches(TokenKind::Assign) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            variants.push((variant, value));
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        let end = self.consume(TokenKind::RBrace, "expected `}` after enum body")?;
        let decl = EnumDecl {
            name,
            variants,
            modifiers,
            span: start.to(end.span),
        };
        Ok(Stmt {
            span: decl.span,
            kind: StmtKind::Enum(Rc::new(decl)),
        })
    }

    /// `import "path";`, `import "path" as Name;`, `import { A, B } from "path";`
    fn parse_import(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.consume_keyword(Keyword::Import)?.span;
        let (path, form) = if self.matches(TokenKind::LBrace) {
            let mut names = Vec::new();
            loop {
                names.push(self.consume_identifier("expected imported name")?.lexeme);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
            self.consume(TokenKind::RBrace, "expected `}` after imported names")?;
            self.consume_keyword(Keyword::From)?;
            let path = self.consume(TokenKind::String, "expected module path")?.lexeme;
            (path, ImportForm::Names(names))
        } else {
            let path = self.consume(TokenKind::String, "expected module path")?.lexeme;
            let alias = if self.matches_keyword(Keyword::As) {
                Some(self.consume_identifier("expected alias after `as`")?.lexeme)
            } else {
                None
            };
            (path, ImportForm::Whole { alias })
        };
        self.consume_optional_semicolon();
        Ok(Stmt {
            span: start.to(self.previous().span),
            kind: StmtKind::Import { path, form },
        })
    }

    fn parse_if(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.consume_keyword(Keyword::If)?.span;
        let condition = self.parse_expression()?;
        let (then_branch, then_span) = self.parse_block()?;
        let mut end = then_span;
        let else_branch = if self.matches_keyword(Keyword::Else) {
            if self.check(TokenKind::Keyword(Keyword::If)) {
                let else_stmt = self.parse_if()?;
                end = else_stmt.span;
                Some(vec![else_stmt])
            } else {
                let (branch, span) = self.parse_block()?;
                end = span;
                Some(branch)
            }
        } else {
            None
        };
        Ok(Stmt {
            span: start.to(end),
            kind: StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.consume_keyword(Keyword::While)?.span;
        let condition = self.parse_expression()?;
        let (body, span) = self.parse_block()?;
        Ok(Stmt {
            span: start.to(span),
            kind: StmtKind::While { condition, body },
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.consume_keyword(Keyword::For)?.span;
        let parenthesized = self.matches(TokenKind::LParen);
        if self.check(TokenKind::Keyword(Keyword::Var)) {
            self.advance();
        }
        let binding = self.consume_identifier("expected loop binding")?;
        self.consume_keyword(Keyword::In)?;
        let iterable = self.parse_expression()?;
        if parenthesized {
            self.consume(TokenKind::RParen, "expected `)` after for header")?;
        }
        let (body, span) = self.parse_block()?;
        Ok(Stmt {
            span: start.to(span),
            kind: StmtKind::For {
                binding: binding.lexeme,
                iterable,
                body,
            },
        })
    }

    /// `switch x { case 1, 2 { ... } default { ... } }`
    fn parse_switch(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.consume_keyword(Keyword::Switch)?.span;
        let subject = self.parse_expression()?;
        self.consume(TokenKind::LBrace, "expected `{` after switch subject")?;
        let mut cases = Vec::new();
        let mut default = None;
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            let token = self.peek_token();
            match token.kind {
                TokenKind::Keyword(Keyword::Case) => {
                    self.advance();
                    let mut values = Vec::new();
                    loop {
                        values.push(self.parse_expression()?);
                        if !self.matches(TokenKind::Comma) {
                            break;
                        }
                    }
                    self.matches(TokenKind::Colon);
                    let (body, span) = self.parse_block()?;
                    cases.push(SwitchCase {
                        values,
                        body,
                        span: token.span.to(span),
                    });
                }
                TokenKind::Keyword(Keyword::Default) => {
                    self.advance();
                    if default.is_some() {
                        return Err(self.error(&token, "duplicate `default` in switch"));
                    }
                    self.matches(TokenKind::Colon);
                    let (body, _) = self.parse_block()?;
                    default = Some(body);
                }
                _ => return Err(self.error(&token, "expected `case` or `default`")),
            }
        }
        let end = self.consume(TokenKind::RBrace, "expected `}` after switch")?;
        Ok(Stmt {
            span: start.to(end.span),
            kind: StmtKind::Switch {
                subject,
                cases,
                default,
            },
        })
    }

    /// `try { } catch (e: Type) { } catch { } finally { }`
    fn parse_try(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.consume_keyword(Keyword::Try)?.span;
        let (body, mut end) = self.parse_block()?;
        let mut catches = Vec::new();
        while self.check(TokenKind::Keyword(Keyword::Catch)) {
            let catch_token = self.advance();
            let mut binding = None;
            let mut class = None;
            if self.matches(TokenKind::LParen) {
                binding = Some(self.consume_identifier("expected catch binding")?.lexeme);
                if self.matches(TokenKind::Colon) {
                    class = Some(self.parse_type_expr()?);
                }
                self.consume(TokenKind::RParen, "expected `)` after catch clause")?;
            }
            let (clause_body, span) = self.parse_block()?;
            end = span;
            catches.push(CatchClause {
                binding,
                class,
                body: clause_body,
                span: catch_token.span.to(span),
            });
        }
        let finally = if self.matches_keyword(Keyword::Finally) {
            let (block, span) = self.parse_block()?;
            end = span;
            Some(block)
        } else {
            None
        };
        if catches.is_empty() && finally.is_none() {
            let token = self.peek_token();
            return Err(self.error(&token, "expected `catch` or `finally` after `try` block"));
        }
        Ok(Stmt {
            span: start.to(end),
            kind: StmtKind::Try {
                body,
                catches,
                finally,
            },
        })
    }

    fn parse_throw(&mut self) -> Result<Stmt, Diagnostic> {
        let token = self.consume_keyword(Keyword::Throw)?;
        let value = self.parse_expression()?;
        self.consume_optional_semicolon();
        Ok(Stmt {
            span: token.span.to(value.span),
            kind: StmtKind::Throw(value),
        })
    }

    fn parse_return(&mut self) -> Result<Stmt, Diagnostic> {
        let token = self.consume_keyword(Keyword::Return)?;
        let expr = if self.check(TokenKind::Semicolon)
            || self.check(TokenKind::RBrace)
            || self.check(TokenKind::Eof)
        {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume_optional_semicolon();
        let end = expr.as_ref().map(|e| e.span).unwrap_or(token.span);
        Ok(Stmt {
            span: token.span.to(end),
            kind: StmtKind::Return(expr),
        })
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let expr = self.parse_expression()?;
        self.consume_optional_semicolon();
        Ok(Stmt {
            span: expr.span,
            kind: StmtKind::Expr(expr),
        })
    }

    fn parse_expression(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, Diagnostic> {
        let expr = self.parse_or()?;
        let op = match self.peek_token().kind {
            TokenKind::Assign => None,
            TokenKind::PlusAssign => Some(BinaryOp::Add),
            TokenKind::MinusAssign => Some(BinaryOp::Sub),
            TokenKind::StarAssign => Some(BinaryOp::Mul),
            TokenKind::SlashAssign => Some(BinaryOp::Div),
            TokenKind::PercentAssign => Some(BinaryOp::Mod),
            _ => return Ok(expr),
        };
        let equals = self.advance();
        let value = self.parse_assignment()?;
        match expr.kind {
            ExprKind::Variable(_) | ExprKind::Index { .. } | ExprKind::Member { .. } => Ok(Expr {
                span: expr.span.to(value.span),
                kind: ExprKind::Assign {
                    target: Box::new(expr),
                    op,
                    value: Box::new(value),
                },
            }),
            _ => Err(Diagnostic::new(DiagnosticKind::Parser, "invalid assignment target")
                .with_span(equals.span)),
        }
    }

    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr {
            span: left.span.to(right.span),
            kind: ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        }
    }

    fn parse_or(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_and()?;
        while self.matches(TokenKind::DoublePipe) {
            let right = self.parse_and()?;
            expr = Self::binary(BinaryOp::Or, expr, right);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_equality()?;
        while self.matches(TokenKind::DoubleAmpersand) {
            let right = self.parse_equality()?;
            expr = Self::binary(BinaryOp::And, expr, right);
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_comparison()?;
        loop {
            let op = if self.matches(TokenKind::EqualEqual) {
                BinaryOp::Equal
            } else if self.matches(TokenKind::BangEqual) {
                BinaryOp::NotEqual
            } else {
                break;
            };
            let right = self.parse_comparison()?;
            expr = Self::binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_range()?;
        loop {
            let op = if self.matches(TokenKind::LessEqual) {
                BinaryOp::LessEqual
            } else if self.matches(TokenKind::GreaterEqual) {
                BinaryOp::GreaterEqual
            } else if self.matches(TokenKind::Less) {
                BinaryOp::Less
            } else if self.matches(TokenKind::Greater) {
                BinaryOp::Greater
            } else {
                break;
            };
            let right = self.parse_range()?;
            expr = Self::binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_range(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.parse_term()?;
        if self.matches(TokenKind::DotDot) {
            let end = self.parse_term()?;
            return Ok(Expr {
                span: start.span.to(end.span),
                kind: ExprKind::Range {
                    start: Box::new(start),
                    end: Box::new(end),
                },
            });
        }
        Ok(start)
    }

    fn parse_term(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_factor()?;
        loop {
            let op = if self.matches(TokenKind::Plus) {
                BinaryOp::Add
            } else if self.matches(TokenKind::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.parse_factor()?;
            expr = Self::binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_factor(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = if self.matches(TokenKind::Star) {
                BinaryOp::Mul
            } else if self.matches(TokenKind::Slash) {
                BinaryOp::Div
            } else if self.matches(TokenKind::Percent) {
                BinaryOp::Mod
            } else {
                break;
            };
            let right = self.parse_unary()?;
            expr = Self::binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, Diagnostic> {
        let op = if self.matches(TokenKind::Minus) {
            UnaryOp::Negate
        } else if self.matches(TokenKind::Plus) {
            UnaryOp::Plus
        } else if self.matches(TokenKind::Bang) {
            UnaryOp::Not
        } else {
            return self.parse_call();
        };
        let operator = self.previous().span;
        let right = self.parse_unary()?;
        Ok(Expr {
            span: operator.to(right.span),
            kind: ExprKind::Unary {
                op,
                expr: Box::new(right),
            },
        })
    }

    fn parse_call(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_primary()?;
        loop {
            // `(` or `[` on a new line starts the next statement.
            let continues = self.peek_token().span.line == self.previous().span.line;
            if continues && self.matches(TokenKind::LParen) {
                let args = self.parse_arguments()?;
                let paren = self.consume(TokenKind::RParen, "expected `)` after arguments")?;
                expr = Expr {
                    span: expr.span.to(paren.span),
                    kind: ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                };
            } else if continues && self.matches(TokenKind::LBracket) {
                let index = self.parse_expression()?;
                let bracket = self.consume(TokenKind::RBracket, "expected `]` after index")?;
                expr = Expr {
                    span: expr.span.to(bracket.span),
                    kind: ExprKind::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    },
                };
            } else if self.matches(TokenKind::Dot) {
                let ident = self.consume_identifier("expected member name after `.`")?;
                expr = Expr {
                    span: expr.span.to(ident.span),
                    kind: ExprKind::Member {
                        target: Box::new(expr),
                        name: ident.lexeme,
                    },
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// Positional arguments first; once a named argument (`name: value`)
    /// appears, every following argument must be named too.
    fn parse_arguments(&mut self) -> Result<Vec<Argument>, Diagnostic> {
        let mut args: Vec<Argument> = Vec::new();
        if self.check(TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            let is_named = self.check(TokenKind::Identifier)
                && self.peek_kind_at(1) == Some(TokenKind::Colon);
            if is_named {
                let name = self.advance();
                self.advance();
                if args.iter().any(|arg| arg.name.as_deref() == Some(name.lexeme.as_str())) {
                    return Err(self.error(&name, "duplicate named argument"));
                }
                let value = self.parse_expression()?;
                args.push(Argument {
                    name: Some(name.lexeme),
                    value,
                });
            } else {
                let token = self.peek_token();
                if args.iter().any(|arg| arg.name.is_some()) {
                    return Err(self.error(
                        &token,
                        "positional argument cannot follow a named argument",
                    ));
                }
                let value = self.parse_expression()?;
                args.push(Argument { name: None, value });
            }
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        let token = self.peek_token();
        let literal = |kind| Expr {
            span: token.span,
            kind: ExprKind::Literal(kind),
        };
        match token.kind {
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(literal(Literal::Bool(true)))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(literal(Literal::Bool(false)))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(literal(Literal::Null))
            }
            TokenKind::Keyword(Keyword::This) => {
                self.advance();
                Ok(Expr {
                    span: token.span,
                    kind: ExprKind::This,
                })
            }
            TokenKind::Keyword(Keyword::Super) => {
                self.advance();
                self.consume(TokenKind::Dot, "expected `.` after `super`")?;
                let name = self.consume_identifier("expected member name after `super.`")?;
                Ok(Expr {
                    span: token.span.to(name.span),
                    kind: ExprKind::Super(name.lexeme),
                })
            }
            TokenKind::Keyword(Keyword::Fn) => {
                self.advance();
                let decl = self.parse_function_rest(token.span, "<lambda>".into(), Modifiers::default())?;
                Ok(Expr {
                    span: decl.span,
                    kind: ExprKind::Lambda(Rc::new(decl)),
                })
            }
            TokenKind::Number => {
                self.advance();
                let value = parse_number(&token.lexeme).ok_or_else(|| {
                    self.error(&token, &format!("invalid number literal `{}`", token.lexeme))
                })?;
                Ok(literal(value))
            }
            TokenKind::String => {
                self.advance();
                Ok(literal(Literal::String(token.lexeme)))
            }
            TokenKind::InterpolatedString => {
                self.advance();
                let parts = parse_interpolation(&token.lexeme, token.span)?;
                Ok(Expr {
                    span: token.span,
                    kind: ExprKind::Interpolated(parts),
                })
            }
            TokenKind::Identifier => {
                self.advance();
                Ok(Expr {
                    span: token.span,
                    kind: ExprKind::Variable(token.lexeme),
                })
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                let rparen = self.consume(TokenKind::RParen, "expected `)` after expression")?;
                Ok(Expr {
                    span: token.span.to(rparen.span),
                    kind: ExprKind::Group(Box::new(inner)),
                })
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                while !self.check(TokenKind::RBracket) && !self.check(TokenKind::Eof) {
                    elements.push(self.parse_expression()?);
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
                let rbracket =
                    self.consume(TokenKind::RBracket, "expected `]` after list literal")?;
                Ok(Expr {
                    span: token.span.to(rbracket.span),
                    kind: ExprKind::ListLiteral(elements),
                })
            }
            TokenKind::LBrace => self.parse_dict_literal(),
            TokenKind::Eof => Err(self.error_eof("unexpected end of expression")),
            _ => Err(self.error(&token, "unexpected token in expression")),
        }
    }

    fn parse_dict_literal(&mut self) -> Result<Expr, Diagnostic> {
        let lbrace = self.advance();
        let mut entries = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            let key = self.parse_expression()?;
            self.consume(TokenKind::Colon, "expected `:` in dict literal")?;
            let value = self.parse_expression()?;
            entries.push((key, value));
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        let rbrace = self.consume(TokenKind::RBrace, "expected `}` after dict literal")?;
        Ok(Expr {
            span: lbrace.span.to(rbrace.span),
            kind: ExprKind::DictLiteral(entries),
        })
    }

    fn parse_type_expr(&mut self) -> Result<TypeExpr, Diagnostic> {
        let mut names = vec![self.consume_type_name()?];
        while self.matches(TokenKind::Pipe) {
            names.push(self.consume_type_name()?);
        }
        Ok(TypeExpr { names })
    }

    /// Type names are identifiers, plus `null` so that `x: int|null` works.
    fn consume_type_name(&mut self) -> Result<String, Diagnostic> {
        if self.matches_keyword(Keyword::Null) {
            return Ok("null".into());
        }
        Ok(self.consume_identifier("expected type name")?.lexeme)
    }

    fn consume_optional_semicolon(&mut self) {
        let _ = self.matches(TokenKind::Semicolon);
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn matches_keyword(&mut self, keyword: Keyword) -> bool {
        self.matches(TokenKind::Keyword(keyword))
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<Token, Diagnostic> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            let token = self.peek_token();
            Err(self.error(&token, message))
        }
    }

    fn consume_keyword(&mut self, keyword: Keyword) -> Result<Token, Diagnostic> {
        let message = format!("expected keyword `{}`", format!("{keyword:?}").to_lowercase());
        self.consume(TokenKind::Keyword(keyword), &message)
    }

    fn consume_identifier(&mut self, message: &str) -> Result<Token, Diagnostic> {
        self.consume(TokenKind::Identifier, message)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.tokens
            .get(self.current)
            .is_some_and(|token| token.kind == kind)
    }

    fn peek_kind_at(&self, offset: usize) -> Option<TokenKind> {
        self.tokens.get(self.current + offset).map(|token| token.kind)
    }

    /// The current token; the token stream always ends with `Eof`.
    fn peek_token(&self) -> Token {
        self.tokens
            .get(self.current)
            .or_else(|| self.tokens.last())
            .cloned()
            .unwrap_or(Token {
                kind: TokenKind::Eof,
                lexeme: String::new(),
                span: SourceSpan::default(),
            })
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn previous(&self) -> Token {
        let index = self.current.saturating_sub(1);
        self.tokens.get(index).cloned().unwrap_or_else(|| self.peek_token())
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek_kind_at(0), Some(TokenKind::Eof) | None)
    }

    fn error(&self, token: &Token, message: &str) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::Parser, message.to_string()).with_span(token.span)
    }

    fn error_eof(&self, message: &str) -> Diagnostic {
        let span = self.peek_token().span;
        Diagnostic::new(DiagnosticKind::Parser, message.to_string()).with_span(span)
    }
}

/// Parses a number lexeme, honouring the `d` (decimal) and `f` (float) suffixes.
fn parse_number(lexeme: &str) -> Option<Literal> {
    let cleaned = lexeme.replace('_', "");
    if let Some(body) = cleaned.strip_suffix(['d', 'D']) {
        return Decimal::from_str(body)
            .or_else(|_| Decimal::from_scientific(body))
            .ok()
            .map(Literal::Decimal);
    }
    if let Some(body) = cleaned.strip_suffix(['f', 'F']) {
        return body.parse().ok().map(Literal::Float);
    }
    if cleaned.contains(['.', 'e', 'E']) {
        cleaned.parse().ok().map(Literal::Float)
    } else {
        cleaned.parse().ok().map(Literal::Int)
    }
}

/// Splits the raw body of `$"..."` into text runs and `{expr}` holes.
/// `{{` and `}}` are literal braces.
fn parse_interpolation(raw: &str, span: SourceSpan) -> Result<Vec<InterpolationPart>, Diagnostic> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(esc) = chars.next() {
                    text.push(lexer::unescape_char(esc));
                }
            }
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                text.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                text.push('}');
            }
            '{' => {
                let mut source = String::new();
                let mut depth = 1usize;
                let mut in_string = false;
                for inner in chars.by_ref() {
                    match inner {
                        '"' => in_string = !in_string,
                        '{' if !in_string => depth += 1,
                        '}' if !in_string => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    source.push(inner);
                }
                if depth != 0 {
                    return Err(Diagnostic::new(
                        DiagnosticKind::Parser,
                        "unterminated `{` in interpolated string",
                    )
                    .with_span(span));
                }
                if !text.is_empty() {
                    parts.push(InterpolationPart::Text(std::mem::take(&mut text)));
                }
                let expr = parse_expression_at(&source, span.line)
                    .map_err(|diag| diag.with_span(span))?;
                parts.push(InterpolationPart::Expr(expr));
            }
            _ => text.push(ch),
        }
    }
    if !text.is_empty() {
        parts.push(InterpolationPart::Text(text));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Module {
        parse_module(source).expect("parse")
    }

    #[test]
    fn parses_class_with_supers_and_members() {
        let module = parse(
            r#"
            class Dog : Animal, Pet {
                private var name = "rex"
                static fn Create() { return Dog(); }
                fn +(other) { return this; }
                var Name { get { return name; } set { name = value; } }
            }
            "#,
        );
        let StmtKind::Class(decl) = &module.items[0].kind else {
            panic!("expected class");
        };
        assert_eq!(decl.supers, vec!["Animal".to_string(), "Pet".to_string()]);
        assert_eq!(decl.body.len(), 4);
        assert!(matches!(
            decl.body[0].kind,
            StmtKind::VarDecl {
                modifiers: Modifiers {
                    accessibility: Some(Accessibility::Private),
                    ..
                },
                ..
            }
        ));
        assert!(matches!(decl.body[3].kind, StmtKind::Property { .. }));
    }

    #[test]
    fn named_arguments_must_trail() {
        let err = parse_module("f(a: 1, 2)").expect_err("should reject");
        assert!(err.message.contains("positional argument"), "{}", err.message);
    }

    #[test]
    fn parses_decimal_and_range() {
        let module = parse("var r = 1..3\nvar d = 2.5d");
        let StmtKind::VarDecl {
            initializer: Some(expr),
            ..
        } = &module.items[1].kind
        else {
            panic!("expected var");
        };
        assert!(matches!(
            expr.kind,
            ExprKind::Literal(Literal::Decimal(_))
        ));
        assert_eq!(module.items[1].span.line, 2);
    }

    #[test]
    fn parses_interpolation_parts() {
        let module = parse(r#"$"a{1 + 2}b""#);
        let StmtKind::Expr(Expr {
            kind: ExprKind::Interpolated(parts),
            ..
        }) = &module.items[0].kind
        else {
            panic!("expected interpolation");
        };
        assert_eq!(parts.len(), 3);
    }

    #[test]
    fn try_requires_handler() {
        assert!(parse_module("try { }").is_err());
    }
}
