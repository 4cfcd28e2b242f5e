//! Abstract syntax tree for the restricted workflow dialect.
//!
//! The tree is produced by [`crate::workflow::parser`], optionally
//! rewritten by the instrumented tracking strategy, and walked by the
//! evaluator. `unparse` renders a tree back to source so transformed
//! programs stay observable.

use std::collections::BTreeSet;
use std::fmt::Write as _;

/// A parsed program: import declarations plus the remaining body.
///
/// Imports are collected separately so the engine can whitelist them
/// and execute the body without any import machinery in scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub imports: Vec<ImportStmt>,
    pub body: Vec<Stmt>,
}

/// One `from <module> import name [as alias], ...` declaration, or a
/// plain `import <module>` (always rejected downstream).
#[derive(Debug, Clone, PartialEq)]
pub enum ImportStmt {
    From {
        module: String,
        names: Vec<ImportName>,
        line: usize,
    },
    Plain {
        module: String,
        line: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportName {
    pub name: String,
    pub alias: Option<String>,
}

impl ImportName {
    /// The name the tool binds to inside the restricted namespace.
    #[must_use]
    pub fn binding(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    FuncDef {
        name: String,
        is_async: bool,
        body: Vec<Stmt>,
        line: usize,
    },
    Assign {
        target: String,
        value: Expr,
        line: usize,
    },
    Expr {
        value: Expr,
        line: usize,
    },
    Return {
        value: Option<Expr>,
        line: usize,
    },
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        orelse: Vec<Stmt>,
        line: usize,
    },
    For {
        target: String,
        iter: Expr,
        body: Vec<Stmt>,
        line: usize,
    },
    Break {
        line: usize,
    },
    Continue {
        line: usize,
    },
    Pass {
        line: usize,
    },
}

impl Stmt {
    #[must_use]
    pub fn line(&self) -> usize {
        match self {
            Self::FuncDef { line, .. }
            | Self::Assign { line, .. }
            | Self::Expr { line, .. }
            | Self::Return { line, .. }
            | Self::If { line, .. }
            | Self::For { line, .. }
            | Self::Break { line }
            | Self::Continue { line }
            | Self::Pass { line } => *line,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Interpolated string: literal chunks and embedded expressions.
    FString(Vec<FStringPart>),
    Name(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Attr {
        base: Box<Expr>,
        name: String,
    },
    Index {
        base: Box<Expr>,
        key: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Await(Box<Expr>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Compare {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    BoolChain {
        op: BoolOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
}

impl BinOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

impl CmpOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "in",
            Self::NotIn => "not in",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

/// Collects every name read by an expression.
///
/// The instrumented strategy uses this to associate an assignment
/// target with the variables its right-hand side was derived from.
#[must_use]
pub fn free_names(expr: &Expr) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    collect_names(expr, &mut names);
    names
}

fn collect_names(expr: &Expr, names: &mut BTreeSet<String>) {
    match expr {
        Expr::Name(name) => {
            names.insert(name.clone());
        }
        Expr::FString(parts) => {
            for part in parts {
                if let FStringPart::Expr(e) = part {
                    collect_names(e, names);
                }
            }
        }
        Expr::List(items) => {
            for item in items {
                collect_names(item, names);
            }
        }
        Expr::Dict(entries) => {
            for (k, v) in entries {
                collect_names(k, names);
                collect_names(v, names);
            }
        }
        Expr::Attr { base, .. } => collect_names(base, names),
        Expr::Index { base, key } => {
            collect_names(base, names);
            collect_names(key, names);
        }
        Expr::Call {
            callee,
            args,
            kwargs,
        } => {
            // The callee name itself is not a data source
            if !matches!(callee.as_ref(), Expr::Name(_)) {
                collect_names(callee, names);
            }
            for arg in args {
                collect_names(arg, names);
            }
            for (_, arg) in kwargs {
                collect_names(arg, names);
            }
        }
        Expr::Await(inner) | Expr::Unary { operand: inner, .. } => collect_names(inner, names),
        Expr::Binary { lhs, rhs, .. }
        | Expr::Compare { lhs, rhs, .. }
        | Expr::BoolChain { lhs, rhs, .. } => {
            collect_names(lhs, names);
            collect_names(rhs, names);
        }
        Expr::None | Expr::Bool(_) | Expr::Int(_) | Expr::Float(_) | Expr::Str(_) => {}
    }
}

/// Renders a program body back to source.
#[must_use]
pub fn unparse(body: &[Stmt]) -> String {
    let mut out = String::new();
    for stmt in body {
        unparse_stmt(stmt, 0, &mut out);
    }
    out
}

fn indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str("    ");
    }
}

fn unparse_stmt(stmt: &Stmt, level: usize, out: &mut String) {
    match stmt {
        Stmt::FuncDef {
            name,
            is_async,
            body,
            ..
        } => {
            indent(out, level);
            if *is_async {
                out.push_str("async ");
            }
            let _ = writeln!(out, "def {name}():");
            for inner in body {
                unparse_stmt(inner, level + 1, out);
            }
        }
        Stmt::Assign { target, value, .. } => {
            indent(out, level);
            let _ = writeln!(out, "{target} = {}", unparse_expr(value));
        }
        Stmt::Expr { value, .. } => {
            indent(out, level);
            let _ = writeln!(out, "{}", unparse_expr(value));
        }
        Stmt::Return { value, .. } => {
            indent(out, level);
            match value {
                Some(v) => {
                    let _ = writeln!(out, "return {}", unparse_expr(v));
                }
                None => out.push_str("return\n"),
            }
        }
        Stmt::If {
            branches, orelse, ..
        } => {
            for (i, (cond, body)) in branches.iter().enumerate() {
                indent(out, level);
                let kw = if i == 0 { "if" } else { "elif" };
                let _ = writeln!(out, "{kw} {}:", unparse_expr(cond));
                for inner in body {
                    unparse_stmt(inner, level + 1, out);
                }
            }
            if !orelse.is_empty() {
                indent(out, level);
                out.push_str("else:\n");
                for inner in orelse {
                    unparse_stmt(inner, level + 1, out);
                }
            }
        }
        Stmt::For {
            target, iter, body, ..
        } => {
            indent(out, level);
            let _ = writeln!(out, "for {target} in {}:", unparse_expr(iter));
            for inner in body {
                unparse_stmt(inner, level + 1, out);
            }
        }
        Stmt::Break { .. } => {
            indent(out, level);
            out.push_str("break\n");
        }
        Stmt::Continue { .. } => {
            indent(out, level);
            out.push_str("continue\n");
        }
        Stmt::Pass { .. } => {
            indent(out, level);
            out.push_str("pass\n");
        }
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

#[must_use]
pub fn unparse_expr(expr: &Expr) -> String {
    match expr {
        Expr::None => "None".to_string(),
        Expr::Bool(true) => "True".to_string(),
        Expr::Bool(false) => "False".to_string(),
        Expr::Int(i) => i.to_string(),
        Expr::Float(f) => {
            if f.fract() == 0.0 && f.is_finite() {
                format!("{f:.1}")
            } else {
                f.to_string()
            }
        }
        Expr::Str(s) => quote(s),
        Expr::FString(parts) => {
            let mut body = String::new();
            for part in parts {
                match part {
                    FStringPart::Text(text) => {
                        body.push_str(&text.replace('{', "{{").replace('}', "}}"))
                    }
                    FStringPart::Expr(e) => {
                        let _ = write!(body, "{{{}}}", unparse_expr(e));
                    }
                }
            }
            format!("f{}", quote(&body).replace("\\\"", "\""))
        }
        Expr::Name(name) => name.clone(),
        Expr::List(items) => {
            let rendered: Vec<String> = items.iter().map(unparse_expr).collect();
            format!("[{}]", rendered.join(", "))
        }
        Expr::Dict(entries) => {
            let rendered: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}: {}", unparse_expr(k), unparse_expr(v)))
                .collect();
            format!("{{{}}}", rendered.join(", "))
        }
        Expr::Attr { base, name } => format!("{}.{name}", unparse_expr(base)),
        Expr::Index { base, key } => format!("{}[{}]", unparse_expr(base), unparse_expr(key)),
        Expr::Call {
            callee,
            args,
            kwargs,
        } => {
            let mut rendered: Vec<String> = args.iter().map(unparse_expr).collect();
            rendered.extend(
                kwargs
                    .iter()
                    .map(|(name, value)| format!("{name}={}", unparse_expr(value))),
            );
            format!("{}({})", unparse_expr(callee), rendered.join(", "))
        }
        Expr::Await(inner) => format!("await {}", unparse_expr(inner)),
        Expr::Unary { op, operand } => match op {
            UnaryOp::Neg => format!("-{}", unparse_expr(operand)),
            UnaryOp::Not => format!("not {}", unparse_expr(operand)),
        },
        Expr::Binary { op, lhs, rhs } => format!(
            "({} {} {})",
            unparse_expr(lhs),
            op.symbol(),
            unparse_expr(rhs)
        ),
        Expr::Compare { op, lhs, rhs } => format!(
            "({} {} {})",
            unparse_expr(lhs),
            op.symbol(),
            unparse_expr(rhs)
        ),
        Expr::BoolChain { op, lhs, rhs } => {
            let kw = match op {
                BoolOp::And => "and",
                BoolOp::Or => "or",
            };
            format!("({} {kw} {})", unparse_expr(lhs), unparse_expr(rhs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_names_skip_callee() {
        let expr = Expr::Call {
            callee: Box::new(Expr::Name("tool".into())),
            args: vec![],
            kwargs: vec![("x".into(), Expr::Name("a".into()))],
        };
        let names = free_names(&expr);
        assert!(names.contains("a"));
        assert!(!names.contains("tool"));
    }

    #[test]
    fn test_free_names_binary() {
        let expr = Expr::Binary {
            op: BinOp::Add,
            lhs: Box::new(Expr::Name("p".into())),
            rhs: Box::new(Expr::Name("t".into())),
        };
        assert_eq!(
            free_names(&expr).into_iter().collect::<Vec<_>>(),
            vec!["p".to_string(), "t".to_string()]
        );
    }

    #[test]
    fn test_unparse_assign_roundtrip_shape() {
        let body = vec![Stmt::FuncDef {
            name: "workflow".into(),
            is_async: true,
            line: 1,
            body: vec![Stmt::Return {
                value: Some(Expr::Int(1)),
                line: 2,
            }],
        }];
        let src = unparse(&body);
        assert_eq!(src, "async def workflow():\n    return 1\n");
    }

    #[test]
    fn test_unparse_string_escapes() {
        assert_eq!(unparse_expr(&Expr::Str("a\"b\n".into())), "\"a\\\"b\\n\"");
    }
}
