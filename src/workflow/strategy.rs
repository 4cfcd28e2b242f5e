//! Data-flow tracking strategies.
//!
//! Three interchangeable implementations of the tracked-value lattice:
//!
//! - **Transparent**: every interpreter operation unions operand
//!   origins into its result. No program rewriting.
//! - **Instrumented**: the program is rewritten before execution so
//!   assignments, subscripts and attribute reads route through three
//!   injected helpers backed by a per-run [`OriginMap`]. The carrier
//!   stays thin (raw value + static origin snapshot); the map recovers
//!   origins that expression-level evaluation drops, e.g. through
//!   formatted-string computations.
//! - **None**: origins are always empty; call records still append,
//!   with empty `input_origins`.
//!
//! On programs limited to indexing, iteration, arithmetic and passing
//! carriers between tools, transparent and instrumented must produce
//! identical data-flow graphs.

use super::ast::{free_names, Expr, FStringPart, Stmt};
use super::value::{OriginSet, TrackedValue, Value};
use crate::provenance::Origin;

/// Injected helper names for the instrumented strategy.
pub const TRACK_ASSIGN: &str = "__track_assign__";
pub const TRACK_SUBSCRIPT: &str = "__track_subscript__";
pub const TRACK_ATTR: &str = "__track_attr__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingStrategy {
    #[default]
    Transparent,
    Instrumented,
    None,
}

impl TrackingStrategy {
    /// Wraps a fresh tool output. The none strategy discards the origin.
    #[must_use]
    pub fn wrap(self, raw: Value, origin: &Origin) -> TrackedValue {
        match self {
            Self::Transparent | Self::Instrumented => {
                TrackedValue::from_tool(raw, origin.call_id.clone())
            }
            Self::None => TrackedValue::literal(raw),
        }
    }

    /// Wraps a literal value: always empty origins.
    #[must_use]
    pub fn literal(self, raw: Value) -> TrackedValue {
        TrackedValue::literal(raw)
    }

    /// Builds a derived value from composition, unioning the origin
    /// sets of the operands that produced it.
    #[must_use]
    pub fn propagate(self, raw: Value, sources: &[&OriginSet]) -> TrackedValue {
        match self {
            Self::Transparent | Self::Instrumented => {
                let mut origins = OriginSet::new();
                for source in sources {
                    origins.extend((*source).iter().cloned());
                }
                TrackedValue::with_origins(raw, origins)
            }
            Self::None => TrackedValue::literal(raw),
        }
    }

    /// Whether the engine must rewrite the program before execution.
    #[must_use]
    pub fn instruments(self) -> bool {
        matches!(self, Self::Instrumented)
    }
}

impl std::str::FromStr for TrackingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "transparent" => Ok(Self::Transparent),
            "instrumented" => Ok(Self::Instrumented),
            "none" => Ok(Self::None),
            other => Err(format!(
                "Invalid tracking strategy: '{other}'. Valid: transparent, instrumented, none"
            )),
        }
    }
}

impl std::fmt::Display for TrackingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transparent => write!(f, "transparent"),
            Self::Instrumented => write!(f, "instrumented"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Variable-name to origin-set map maintained by the instrumented
/// helpers during one run.
#[derive(Debug, Default)]
pub struct OriginMap {
    map: ahash::AHashMap<String, OriginSet>,
}

impl OriginMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, name: &str, origins: OriginSet) {
        self.map.insert(name.to_string(), origins);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> OriginSet {
        self.map.get(name).cloned().unwrap_or_default()
    }

    /// Union of the map entries for the given names.
    #[must_use]
    pub fn merge<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> OriginSet {
        let mut merged = OriginSet::new();
        for name in names {
            if let Some(origins) = self.map.get(name) {
                merged.extend(origins.iter().cloned());
            }
        }
        merged
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

/// Rewrites a program body for the instrumented strategy.
///
/// - `x = expr` becomes `x = __track_assign__("x", [<rhs names>], expr)`
/// - load-context `obj[key]` becomes `__track_subscript__(obj, key)`
/// - load-context `obj.attr` becomes `__track_attr__(obj, "attr")`,
///   except when the attribute is a method-call callee
pub fn instrument(body: &mut [Stmt]) {
    for stmt in body {
        instrument_stmt(stmt);
    }
}

fn instrument_stmt(stmt: &mut Stmt) {
    match stmt {
        Stmt::FuncDef { body, .. } => instrument(body),
        Stmt::Assign { target, value, .. } => {
            let rhs_names: Vec<Expr> = free_names(value)
                .into_iter()
                .map(Expr::Str)
                .collect();
            instrument_expr(value);
            let inner = std::mem::replace(value, Expr::None);
            *value = Expr::Call {
                callee: Box::new(Expr::Name(TRACK_ASSIGN.to_string())),
                args: vec![Expr::Str(target.clone()), Expr::List(rhs_names), inner],
                kwargs: vec![],
            };
        }
        Stmt::Expr { value, .. } => instrument_expr(value),
        Stmt::Return { value, .. } => {
            if let Some(value) = value {
                instrument_expr(value);
            }
        }
        Stmt::If {
            branches, orelse, ..
        } => {
            for (cond, body) in branches {
                instrument_expr(cond);
                instrument(body);
            }
            instrument(orelse);
        }
        Stmt::For { iter, body, .. } => {
            instrument_expr(iter);
            instrument(body);
        }
        Stmt::Break { .. } | Stmt::Continue { .. } | Stmt::Pass { .. } => {}
    }
}

fn instrument_expr(expr: &mut Expr) {
    match expr {
        Expr::Index { base, key } => {
            instrument_expr(base);
            instrument_expr(key);
            let base = std::mem::replace(base.as_mut(), Expr::None);
            let key = std::mem::replace(key.as_mut(), Expr::None);
            *expr = Expr::Call {
                callee: Box::new(Expr::Name(TRACK_SUBSCRIPT.to_string())),
                args: vec![base, key],
                kwargs: vec![],
            };
        }
        Expr::Attr { base, name } => {
            instrument_expr(base);
            let base = std::mem::replace(base.as_mut(), Expr::None);
            let name = std::mem::take(name);
            *expr = Expr::Call {
                callee: Box::new(Expr::Name(TRACK_ATTR.to_string())),
                args: vec![base, Expr::Str(name)],
                kwargs: vec![],
            };
        }
        Expr::Call {
            callee,
            args,
            kwargs,
        } => {
            // Method-call callees keep their attribute shape so bound
            // dispatch still works; only the receiver is rewritten.
            if let Expr::Attr { base, .. } = callee.as_mut() {
                instrument_expr(base);
            } else if !matches!(callee.as_ref(), Expr::Name(_)) {
                instrument_expr(callee);
            }
            for arg in args {
                instrument_expr(arg);
            }
            for (_, arg) in kwargs {
                instrument_expr(arg);
            }
        }
        Expr::Await(inner) | Expr::Unary { operand: inner, .. } => instrument_expr(inner),
        Expr::Binary { lhs, rhs, .. }
        | Expr::Compare { lhs, rhs, .. }
        | Expr::BoolChain { lhs, rhs, .. } => {
            instrument_expr(lhs);
            instrument_expr(rhs);
        }
        Expr::List(items) => {
            for item in items {
                instrument_expr(item);
            }
        }
        Expr::Dict(entries) => {
            for (k, v) in entries {
                instrument_expr(k);
                instrument_expr(v);
            }
        }
        Expr::FString(parts) => {
            for part in parts {
                if let FStringPart::Expr(e) = part {
                    instrument_expr(e);
                }
            }
        }
        Expr::None
        | Expr::Bool(_)
        | Expr::Int(_)
        | Expr::Float(_)
        | Expr::Str(_)
        | Expr::Name(_) => {}
    }
}
