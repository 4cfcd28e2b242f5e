//! Recursive-descent parser for the workflow dialect.
//!
//! Produces a [`Program`] whose import declarations are collected
//! separately from the body, so the engine can whitelist them and
//! evaluate the rest without import machinery in scope.

use super::ast::{
    BinOp, BoolOp, CmpOp, Expr, FStringPart, ImportName, ImportStmt, Program, Stmt, UnaryOp,
};
use super::lexer::{tokenize, RawFsPart, SyntaxError, Tok, Token};
use crate::error::WorkflowError;

/// Parses a full program source.
pub fn parse_program(source: &str) -> Result<Program, WorkflowError> {
    let tokens = tokenize(source).map_err(syntax)?;
    let mut parser = Parser::new(tokens);
    parser.program().map_err(syntax)
}

/// Parses a single expression (used for f-string fragments).
fn parse_expression(source: &str, line: usize) -> Result<Expr, SyntaxError> {
    let mut tokens = tokenize(source)?;
    // Sub-parses inherit the enclosing line for error reporting
    for token in &mut tokens {
        token.line = line;
    }
    let mut parser = Parser::new(tokens);
    let expr = parser.expr()?;
    parser.eat_newlines();
    parser.expect_kind(&Tok::EndOfFile, "end of expression")?;
    Ok(expr)
}

fn syntax(err: SyntaxError) -> WorkflowError {
    WorkflowError::Syntax {
        line: err.line,
        message: err.message,
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Tok {
        self.tokens
            .get(self.pos)
            .map_or(&Tok::EndOfFile, |t| &t.kind)
    }

    fn line(&self) -> usize {
        self.tokens.get(self.pos).map_or(0, |t| t.line)
    }

    fn bump(&mut self) -> Token {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .unwrap_or(Token {
                kind: Tok::EndOfFile,
                line: 0,
            });
        self.pos += 1;
        token
    }

    fn eat(&mut self, kind: &Tok) -> bool {
        if self.peek() == kind {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_newlines(&mut self) {
        while self.eat(&Tok::Newline) {}
    }

    fn expect_kind(&mut self, kind: &Tok, what: &str) -> Result<(), SyntaxError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_name(&mut self, what: &str) -> Result<String, SyntaxError> {
        match self.peek().clone() {
            Tok::Name(name) => {
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn unexpected(&self, what: &str) -> SyntaxError {
        SyntaxError {
            line: self.line(),
            message: format!("expected {what}, found {}", self.peek()),
        }
    }

    // ── module level ────────────────────────────────────────────────

    fn program(&mut self) -> Result<Program, SyntaxError> {
        let mut imports = Vec::new();
        let mut body = Vec::new();

        loop {
            self.eat_newlines();
            match self.peek() {
                Tok::EndOfFile => break,
                Tok::From => imports.push(self.import_from()?),
                Tok::Import => imports.push(self.import_plain()?),
                _ => body.push(self.statement()?),
            }
        }

        Ok(Program { imports, body })
    }

    fn dotted_name(&mut self) -> Result<String, SyntaxError> {
        let mut module = self.expect_name("module name")?;
        while self.eat(&Tok::Dot) {
            module.push('.');
            module.push_str(&self.expect_name("module name")?);
        }
        Ok(module)
    }

    fn import_from(&mut self) -> Result<ImportStmt, SyntaxError> {
        let line = self.line();
        self.expect_kind(&Tok::From, "'from'")?;
        let module = self.dotted_name()?;
        self.expect_kind(&Tok::Import, "'import'")?;

        let mut names = Vec::new();
        loop {
            let name = self.expect_name("imported tool name")?;
            let alias = if self.eat(&Tok::As) {
                Some(self.expect_name("import alias")?)
            } else {
                None
            };
            names.push(ImportName { name, alias });
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect_kind(&Tok::Newline, "newline after import")?;
        Ok(ImportStmt::From {
            module,
            names,
            line,
        })
    }

    fn import_plain(&mut self) -> Result<ImportStmt, SyntaxError> {
        let line = self.line();
        self.expect_kind(&Tok::Import, "'import'")?;
        let module = self.dotted_name()?;
        self.expect_kind(&Tok::Newline, "newline after import")?;
        Ok(ImportStmt::Plain { module, line })
    }

    // ── statements ──────────────────────────────────────────────────

    fn statement(&mut self) -> Result<Stmt, SyntaxError> {
        match self.peek() {
            Tok::Async | Tok::Def => self.func_def(),
            Tok::If => self.if_stmt(),
            Tok::For => self.for_stmt(),
            Tok::Return => self.return_stmt(),
            Tok::Break => {
                let line = self.line();
                self.bump();
                self.expect_kind(&Tok::Newline, "newline")?;
                Ok(Stmt::Break { line })
            }
            Tok::Continue => {
                let line = self.line();
                self.bump();
                self.expect_kind(&Tok::Newline, "newline")?;
                Ok(Stmt::Continue { line })
            }
            Tok::Pass => {
                let line = self.line();
                self.bump();
                self.expect_kind(&Tok::Newline, "newline")?;
                Ok(Stmt::Pass { line })
            }
            Tok::From | Tok::Import => Err(SyntaxError {
                line: self.line(),
                message: "imports are only allowed at the top of the program".to_string(),
            }),
            _ => self.assign_or_expr(),
        }
    }

    fn func_def(&mut self) -> Result<Stmt, SyntaxError> {
        let line = self.line();
        let is_async = self.eat(&Tok::Async);
        self.expect_kind(&Tok::Def, "'def'")?;
        let name = self.expect_name("function name")?;
        self.expect_kind(&Tok::LParen, "'('")?;
        if self.peek() != &Tok::RParen {
            return Err(SyntaxError {
                line: self.line(),
                message: "the entry routine takes no parameters".to_string(),
            });
        }
        self.expect_kind(&Tok::RParen, "')'")?;
        self.expect_kind(&Tok::Colon, "':'")?;
        let body = self.block()?;
        Ok(Stmt::FuncDef {
            name,
            is_async,
            body,
            line,
        })
    }

    fn if_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        let line = self.line();
        self.expect_kind(&Tok::If, "'if'")?;
        let mut branches = Vec::new();
        let cond = self.expr()?;
        self.expect_kind(&Tok::Colon, "':'")?;
        branches.push((cond, self.block()?));

        let mut orelse = Vec::new();
        loop {
            if self.eat(&Tok::Elif) {
                let cond = self.expr()?;
                self.expect_kind(&Tok::Colon, "':'")?;
                branches.push((cond, self.block()?));
            } else if self.eat(&Tok::Else) {
                self.expect_kind(&Tok::Colon, "':'")?;
                orelse = self.block()?;
                break;
            } else {
                break;
            }
        }

        Ok(Stmt::If {
            branches,
            orelse,
            line,
        })
    }

    fn for_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        let line = self.line();
        self.expect_kind(&Tok::For, "'for'")?;
        let target = self.expect_name("loop variable")?;
        self.expect_kind(&Tok::In, "'in'")?;
        let iter = self.expr()?;
        self.expect_kind(&Tok::Colon, "':'")?;
        let body = self.block()?;
        Ok(Stmt::For {
            target,
            iter,
            body,
            line,
        })
    }

    fn return_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        let line = self.line();
        self.expect_kind(&Tok::Return, "'return'")?;
        let value = if self.peek() == &Tok::Newline {
            None
        } else {
            Some(self.expr()?)
        };
        self.expect_kind(&Tok::Newline, "newline after return")?;
        Ok(Stmt::Return { value, line })
    }

    fn assign_or_expr(&mut self) -> Result<Stmt, SyntaxError> {
        let line = self.line();

        // Lookahead for `name = ...` (a single-name assignment target)
        if let Tok::Name(name) = self.peek().clone() {
            if self.tokens.get(self.pos + 1).map(|t| &t.kind) == Some(&Tok::Assign) {
                self.pos += 2;
                let value = self.expr()?;
                self.expect_kind(&Tok::Newline, "newline after assignment")?;
                return Ok(Stmt::Assign {
                    target: name,
                    value,
                    line,
                });
            }
        }

        let value = self.expr()?;
        if self.eat(&Tok::Assign) {
            return Err(SyntaxError {
                line,
                message: "only single-name assignment targets are supported".to_string(),
            });
        }
        self.expect_kind(&Tok::Newline, "newline after expression")?;
        Ok(Stmt::Expr { value, line })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        self.expect_kind(&Tok::Newline, "newline before block")?;
        self.expect_kind(&Tok::Indent, "an indented block")?;
        let mut body = Vec::new();
        loop {
            self.eat_newlines();
            if self.eat(&Tok::Dedent) {
                break;
            }
            if self.peek() == &Tok::EndOfFile {
                break;
            }
            body.push(self.statement()?);
        }
        if body.is_empty() {
            return Err(SyntaxError {
                line: self.line(),
                message: "expected an indented block".to_string(),
            });
        }
        Ok(body)
    }

    // ── expressions (precedence climbing) ───────────────────────────

    fn expr(&mut self) -> Result<Expr, SyntaxError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.and_expr()?;
        while self.eat(&Tok::Or) {
            let rhs = self.and_expr()?;
            lhs = Expr::BoolChain {
                op: BoolOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.not_expr()?;
        while self.eat(&Tok::And) {
            let rhs = self.not_expr()?;
            lhs = Expr::BoolChain {
                op: BoolOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Expr, SyntaxError> {
        if self.eat(&Tok::Not) {
            let operand = self.not_expr()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, SyntaxError> {
        let lhs = self.arith()?;
        let op = match self.peek() {
            Tok::Eq => CmpOp::Eq,
            Tok::Ne => CmpOp::Ne,
            Tok::Lt => CmpOp::Lt,
            Tok::Le => CmpOp::Le,
            Tok::Gt => CmpOp::Gt,
            Tok::Ge => CmpOp::Ge,
            Tok::In => CmpOp::In,
            Tok::Not => {
                // `not in` is the only postfix use of `not`
                if self.tokens.get(self.pos + 1).map(|t| &t.kind) == Some(&Tok::In) {
                    self.pos += 2;
                    let rhs = self.arith()?;
                    return Ok(Expr::Compare {
                        op: CmpOp::NotIn,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    });
                }
                return Ok(lhs);
            }
            _ => return Ok(lhs),
        };
        self.bump();
        let rhs = self.arith()?;
        Ok(Expr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn arith(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Tok::Plus => BinOp::Add,
                Tok::Minus => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek() {
                Tok::Star => BinOp::Mul,
                Tok::Slash => BinOp::Div,
                Tok::DoubleSlash => BinOp::FloorDiv,
                Tok::Percent => BinOp::Mod,
                _ => break,
            };
            self.bump();
            let rhs = self.factor()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<Expr, SyntaxError> {
        match self.peek() {
            Tok::Minus => {
                self.bump();
                let operand = self.factor()?;
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                })
            }
            Tok::Plus => {
                self.bump();
                self.factor()
            }
            Tok::Await => {
                self.bump();
                let operand = self.factor()?;
                Ok(Expr::Await(Box::new(operand)))
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.atom()?;
        loop {
            match self.peek() {
                Tok::LParen => {
                    self.bump();
                    let (args, kwargs) = self.call_args()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        kwargs,
                    };
                }
                Tok::LBracket => {
                    self.bump();
                    let key = self.expr()?;
                    self.expect_kind(&Tok::RBracket, "']'")?;
                    expr = Expr::Index {
                        base: Box::new(expr),
                        key: Box::new(key),
                    };
                }
                Tok::Dot => {
                    self.bump();
                    let name = self.expect_name("attribute name")?;
                    expr = Expr::Attr {
                        base: Box::new(expr),
                        name,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    #[allow(clippy::type_complexity)]
    fn call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), SyntaxError> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();

        if self.eat(&Tok::RParen) {
            return Ok((args, kwargs));
        }

        loop {
            // `name=expr` keyword argument lookahead
            if let Tok::Name(name) = self.peek().clone() {
                if self.tokens.get(self.pos + 1).map(|t| &t.kind) == Some(&Tok::Assign) {
                    self.pos += 2;
                    let value = self.expr()?;
                    kwargs.push((name, value));
                    if self.eat(&Tok::Comma) {
                        if self.eat(&Tok::RParen) {
                            break;
                        }
                        continue;
                    }
                    self.expect_kind(&Tok::RParen, "')'")?;
                    break;
                }
            }

            if !kwargs.is_empty() {
                return Err(SyntaxError {
                    line: self.line(),
                    message: "positional argument follows keyword argument".to_string(),
                });
            }
            args.push(self.expr()?);
            if self.eat(&Tok::Comma) {
                if self.eat(&Tok::RParen) {
                    break;
                }
                continue;
            }
            self.expect_kind(&Tok::RParen, "')'")?;
            break;
        }

        Ok((args, kwargs))
    }

    fn atom(&mut self) -> Result<Expr, SyntaxError> {
        let line = self.line();
        match self.bump().kind {
            Tok::Int(i) => Ok(Expr::Int(i)),
            Tok::Float(f) => Ok(Expr::Float(f)),
            Tok::Str(s) => Ok(Expr::Str(s)),
            Tok::FString(parts) => {
                let mut rendered = Vec::new();
                for part in parts {
                    match part {
                        RawFsPart::Text(text) => rendered.push(FStringPart::Text(text)),
                        RawFsPart::Expr(src) => {
                            rendered.push(FStringPart::Expr(parse_expression(&src, line)?));
                        }
                    }
                }
                Ok(Expr::FString(rendered))
            }
            Tok::Name(name) => Ok(Expr::Name(name)),
            Tok::True => Ok(Expr::Bool(true)),
            Tok::False => Ok(Expr::Bool(false)),
            Tok::NoneLit => Ok(Expr::None),
            Tok::LParen => {
                let inner = self.expr()?;
                self.expect_kind(&Tok::RParen, "')'")?;
                Ok(inner)
            }
            Tok::LBracket => {
                let mut items = Vec::new();
                if self.eat(&Tok::RBracket) {
                    return Ok(Expr::List(items));
                }
                loop {
                    items.push(self.expr()?);
                    if self.eat(&Tok::Comma) {
                        if self.eat(&Tok::RBracket) {
                            break;
                        }
                        continue;
                    }
                    self.expect_kind(&Tok::RBracket, "']'")?;
                    break;
                }
                Ok(Expr::List(items))
            }
            Tok::LBrace => {
                let mut entries = Vec::new();
                if self.eat(&Tok::RBrace) {
                    return Ok(Expr::Dict(entries));
                }
                loop {
                    let key = self.expr()?;
                    self.expect_kind(&Tok::Colon, "':'")?;
                    let value = self.expr()?;
                    entries.push((key, value));
                    if self.eat(&Tok::Comma) {
                        if self.eat(&Tok::RBrace) {
                            break;
                        }
                        continue;
                    }
                    self.expect_kind(&Tok::RBrace, "'}'")?;
                    break;
                }
                Ok(Expr::Dict(entries))
            }
            other => Err(SyntaxError {
                line,
                message: format!("unexpected {other}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Program {
        parse_program(source).unwrap()
    }

    #[test]
    fn test_imports_collected_and_stripped() {
        let program = parse(
            "from toolgate.functions import search, fetch as get\n\
             async def workflow():\n    return 1\n",
        );
        assert_eq!(program.imports.len(), 1);
        match &program.imports[0] {
            ImportStmt::From { module, names, .. } => {
                assert_eq!(module, "toolgate.functions");
                assert_eq!(names[0].binding(), "search");
                assert_eq!(names[1].binding(), "get");
            }
            ImportStmt::Plain { .. } => panic!("expected from-import"),
        }
        assert_eq!(program.body.len(), 1);
    }

    #[test]
    fn test_plain_import_parsed_for_rejection() {
        let program = parse("import os\nasync def workflow():\n    pass\n");
        assert!(matches!(program.imports[0], ImportStmt::Plain { .. }));
    }

    #[test]
    fn test_workflow_with_calls() {
        let program = parse(
            "async def workflow():\n    a = await toolA()\n    b = await toolB(x=a.x)\n    return b\n",
        );
        let Stmt::FuncDef { name, body, .. } = &program.body[0] else {
            panic!("expected funcdef");
        };
        assert_eq!(name, "workflow");
        assert_eq!(body.len(), 3);
        let Stmt::Assign { value, .. } = &body[1] else {
            panic!("expected assign");
        };
        let Expr::Await(call) = value else {
            panic!("expected await");
        };
        let Expr::Call { kwargs, .. } = call.as_ref() else {
            panic!("expected call");
        };
        assert_eq!(kwargs[0].0, "x");
    }

    #[test]
    fn test_operator_precedence() {
        let program = parse("x = 1 + 2 * 3\n");
        let Stmt::Assign { value, .. } = &program.body[0] else {
            panic!()
        };
        let Expr::Binary { op: BinOp::Add, rhs, .. } = value else {
            panic!("expected + at the top");
        };
        assert!(matches!(rhs.as_ref(), Expr::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn test_if_elif_else() {
        let program = parse(
            "async def workflow():\n    if x > 1:\n        return 1\n    elif x > 0:\n        return 2\n    else:\n        return 3\n",
        );
        let Stmt::FuncDef { body, .. } = &program.body[0] else {
            panic!()
        };
        let Stmt::If { branches, orelse, .. } = &body[0] else {
            panic!()
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(orelse.len(), 1);
    }

    #[test]
    fn test_imports_inside_function_rejected() {
        let err = parse_program("async def workflow():\n    from os import path\n").unwrap_err();
        assert!(matches!(err, WorkflowError::Syntax { .. }));
    }

    #[test]
    fn test_fstring_subparse() {
        let program = parse("s = f\"v={a + 1}\"\n");
        let Stmt::Assign { value, .. } = &program.body[0] else {
            panic!()
        };
        let Expr::FString(parts) = value else {
            panic!("expected f-string")
        };
        assert!(matches!(parts[1], FStringPart::Expr(_)));
    }

    #[test]
    fn test_trailing_comma_in_call() {
        let program = parse("x = tool(\n    a=1,\n    b=2,\n)\n");
        let Stmt::Assign { value, .. } = &program.body[0] else {
            panic!()
        };
        let Expr::Call { kwargs, .. } = value else {
            panic!()
        };
        assert_eq!(kwargs.len(), 2);
    }

    #[test]
    fn test_tuple_assignment_rejected() {
        assert!(parse_program("a[0] = 1\n").is_err());
    }
}
