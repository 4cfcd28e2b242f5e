//! Tree-walking evaluator for the workflow dialect.
//!
//! Runs the restricted program against a prepared namespace: one proxy
//! per imported tool, the `elicit` builtin when a capability is
//! present, and the tracking helpers in instrumented mode. Proxy calls
//! perform the provenance-tracked dispatch: per-argument origin
//! extraction, call-id minting at entry, raw resolution, manager
//! dispatch, record append on success, and a freshly-tagged result.

use super::ast::{BinOp, BoolOp, CmpOp, Expr, FStringPart, Stmt, UnaryOp};
use super::strategy::{
    OriginMap, TrackingStrategy, TRACK_ASSIGN, TRACK_ATTR, TRACK_SUBSCRIPT,
};
use super::value::{
    arith, call_method, value_attr, value_contains, value_index, value_iter, values_compare,
    values_equal, ArithOp, ElicitKind, OriginSet, TrackedValue, Value,
};
use super::{ElicitCapability, ToolDispatch};
use crate::error::{ToolExecutionError, WorkflowError, WorkflowResult};
use crate::provenance::{extract_per_arg, Origin, ProvenanceStore, ToolCallRecord};
use crate::types::unix_now;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Map as JsonMap;
use std::sync::Arc;

/// What a name resolves to inside the restricted namespace.
#[derive(Clone)]
pub(crate) enum Binding {
    /// A bound variable.
    Value(TrackedValue),
    /// Proxy for an imported tool; calls dispatch with provenance.
    Tool(String),
    /// The `elicit` builtin.
    Elicit,
    /// Response-type token for `elicit`.
    Kind(ElicitKind),
    /// Instrumentation helper.
    Helper(Helper),
    /// A routine defined by the program itself.
    Func { body: Arc<Vec<Stmt>> },
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Helper {
    Assign,
    Subscript,
    Attr,
}

/// Statement outcome for control flow.
enum Flow {
    Normal,
    Return(TrackedValue),
    Break,
    Continue,
}

pub(crate) struct Interp<'run> {
    env: ahash::AHashMap<String, Binding>,
    dispatch: &'run dyn ToolDispatch,
    elicit: Option<&'run dyn ElicitCapability>,
    strategy: TrackingStrategy,
    origin_map: OriginMap,
    pub(crate) store: ProvenanceStore,
}

impl<'run> Interp<'run> {
    pub(crate) fn new(
        bindings: ahash::AHashMap<String, Binding>,
        dispatch: &'run dyn ToolDispatch,
        elicit: Option<&'run dyn ElicitCapability>,
        strategy: TrackingStrategy,
    ) -> Self {
        Self {
            env: bindings,
            dispatch,
            elicit,
            strategy,
            origin_map: OriginMap::new(),
            store: ProvenanceStore::new(),
        }
    }

    /// Executes the module body, then invokes the entry routine.
    pub(crate) async fn run(&mut self, body: &[Stmt]) -> WorkflowResult<TrackedValue> {
        // Module-level statements run first: they define the entry
        // routine and any constants it closes over.
        match self.exec_stmts(body).await? {
            Flow::Normal => {}
            Flow::Return(_) => {
                return Err(WorkflowError::failure("'return' outside function"));
            }
            Flow::Break | Flow::Continue => {
                return Err(WorkflowError::failure("'break' or 'continue' outside loop"));
            }
        }

        let entry = match self.env.get("workflow") {
            Some(Binding::Func { body }) => Arc::clone(body),
            _ => return Err(WorkflowError::MissingEntry),
        };

        match self.exec_stmts(&entry).await? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(TrackedValue::literal(Value::Null)),
            Flow::Break | Flow::Continue => {
                Err(WorkflowError::failure("'break' or 'continue' outside loop"))
            }
        }
    }

    fn exec_stmts<'s>(&'s mut self, stmts: &'s [Stmt]) -> BoxFuture<'s, WorkflowResult<Flow>> {
        async move {
            for stmt in stmts {
                match self.exec_stmt(stmt).await? {
                    Flow::Normal => {}
                    flow => return Ok(flow),
                }
            }
            Ok(Flow::Normal)
        }
        .boxed()
    }

    async fn exec_stmt(&mut self, stmt: &Stmt) -> WorkflowResult<Flow> {
        match stmt {
            Stmt::FuncDef { name, body, .. } => {
                self.env.insert(
                    name.clone(),
                    Binding::Func {
                        body: Arc::new(body.clone()),
                    },
                );
                Ok(Flow::Normal)
            }
            Stmt::Assign { target, value, .. } => {
                let value = self.eval(value).await?;
                self.env.insert(target.clone(), Binding::Value(value));
                Ok(Flow::Normal)
            }
            Stmt::Expr { value, .. } => {
                self.eval(value).await?;
                Ok(Flow::Normal)
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.eval(expr).await?,
                    None => TrackedValue::literal(Value::Null),
                };
                Ok(Flow::Return(value))
            }
            Stmt::If {
                branches, orelse, ..
            } => {
                for (cond, body) in branches {
                    let cond = self.eval(cond).await?;
                    if cond.raw.truthy() {
                        return self.exec_stmts(body).await;
                    }
                }
                self.exec_stmts(orelse).await
            }
            Stmt::For {
                target, iter, body, ..
            } => {
                let iterable = self.eval(iter).await?;
                let items = value_iter(&iterable.raw).map_err(WorkflowError::failure)?;
                for item in items {
                    let bound = self
                        .strategy
                        .propagate(item.raw.clone(), &[&item.origins, &iterable.origins]);
                    self.env.insert(target.clone(), Binding::Value(bound));
                    match self.exec_stmts(body).await? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        Flow::Continue => continue,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Break { .. } => Ok(Flow::Break),
            Stmt::Continue { .. } => Ok(Flow::Continue),
            Stmt::Pass { .. } => Ok(Flow::Normal),
        }
    }

    fn eval<'s>(&'s mut self, expr: &'s Expr) -> BoxFuture<'s, WorkflowResult<TrackedValue>> {
        async move {
            match expr {
                Expr::None => Ok(TrackedValue::literal(Value::Null)),
                Expr::Bool(b) => Ok(TrackedValue::literal(Value::Bool(*b))),
                Expr::Int(i) => Ok(TrackedValue::literal(Value::Int(*i))),
                Expr::Float(f) => Ok(TrackedValue::literal(Value::Float(*f))),
                Expr::Str(s) => Ok(TrackedValue::literal(Value::Str(s.clone()))),
                Expr::Name(name) => self.load_name(name),
                Expr::FString(parts) => {
                    let mut rendered = String::new();
                    for part in parts {
                        match part {
                            FStringPart::Text(text) => rendered.push_str(text),
                            FStringPart::Expr(e) => {
                                let value = self.eval(e).await?;
                                rendered.push_str(&value.raw.render());
                            }
                        }
                    }
                    // Formatting yields a plain string; in instrumented
                    // mode the assignment helper recovers the origins.
                    Ok(TrackedValue::literal(Value::Str(rendered)))
                }
                Expr::List(items) => {
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        values.push(self.eval(item).await?);
                    }
                    Ok(TrackedValue::literal(Value::List(values)))
                }
                Expr::Dict(entries) => {
                    let mut map = std::collections::BTreeMap::new();
                    for (key, value) in entries {
                        let key = self.eval(key).await?;
                        let Value::Str(key) = key.raw else {
                            return Err(WorkflowError::failure(format!(
                                "dict keys must be strings, not {}",
                                key.raw.type_name()
                            )));
                        };
                        map.insert(key, self.eval(value).await?);
                    }
                    Ok(TrackedValue::literal(Value::Map(map)))
                }
                Expr::Attr { base, name } => {
                    let base = self.eval(base).await?;
                    self.attr_access(&base, name)
                }
                Expr::Index { base, key } => {
                    let base = self.eval(base).await?;
                    let key = self.eval(key).await?;
                    self.index_access(&base, &key)
                }
                Expr::Await(inner) => self.eval(inner).await,
                Expr::Unary { op, operand } => {
                    let value = self.eval(operand).await?;
                    match op {
                        UnaryOp::Not => {
                            Ok(TrackedValue::literal(Value::Bool(!value.raw.truthy())))
                        }
                        UnaryOp::Neg => {
                            let raw = match &value.raw {
                                Value::Int(i) => Value::Int(-i),
                                Value::Float(f) => Value::Float(-f),
                                other => {
                                    return Err(WorkflowError::failure(format!(
                                        "bad operand type for unary -: '{}'",
                                        other.type_name()
                                    )))
                                }
                            };
                            Ok(self.strategy.propagate(raw, &[&value.origins]))
                        }
                    }
                }
                Expr::Binary { op, lhs, rhs } => {
                    let lhs = self.eval(lhs).await?;
                    let rhs = self.eval(rhs).await?;
                    let op = match op {
                        BinOp::Add => ArithOp::Add,
                        BinOp::Sub => ArithOp::Sub,
                        BinOp::Mul => ArithOp::Mul,
                        BinOp::Div => ArithOp::Div,
                        BinOp::FloorDiv => ArithOp::FloorDiv,
                        BinOp::Mod => ArithOp::Mod,
                    };
                    let raw = arith(op, &lhs.raw, &rhs.raw).map_err(WorkflowError::failure)?;
                    Ok(self
                        .strategy
                        .propagate(raw, &[&lhs.origins, &rhs.origins]))
                }
                Expr::Compare { op, lhs, rhs } => {
                    let lhs = self.eval(lhs).await?;
                    let rhs = self.eval(rhs).await?;
                    let result = match op {
                        CmpOp::Eq => values_equal(&lhs.raw, &rhs.raw),
                        CmpOp::Ne => !values_equal(&lhs.raw, &rhs.raw),
                        CmpOp::In => {
                            value_contains(&rhs.raw, &lhs.raw).map_err(WorkflowError::failure)?
                        }
                        CmpOp::NotIn => {
                            !value_contains(&rhs.raw, &lhs.raw).map_err(WorkflowError::failure)?
                        }
                        ordered => {
                            let ord = values_compare(&lhs.raw, &rhs.raw)
                                .map_err(WorkflowError::failure)?;
                            match ordered {
                                CmpOp::Lt => ord.is_lt(),
                                CmpOp::Le => ord.is_le(),
                                CmpOp::Gt => ord.is_gt(),
                                CmpOp::Ge => ord.is_ge(),
                                _ => unreachable!(),
                            }
                        }
                    };
                    // Comparisons produce raw booleans, not carriers
                    Ok(TrackedValue::literal(Value::Bool(result)))
                }
                Expr::BoolChain { op, lhs, rhs } => {
                    let lhs = self.eval(lhs).await?;
                    let take_lhs = match op {
                        BoolOp::Or => lhs.raw.truthy(),
                        BoolOp::And => !lhs.raw.truthy(),
                    };
                    if take_lhs {
                        Ok(lhs)
                    } else {
                        self.eval(rhs).await
                    }
                }
                Expr::Call {
                    callee,
                    args,
                    kwargs,
                } => self.eval_call(callee, args, kwargs).await,
            }
        }
        .boxed()
    }

    fn load_name(&self, name: &str) -> WorkflowResult<TrackedValue> {
        match self.env.get(name) {
            Some(Binding::Value(value)) => Ok(value.clone()),
            Some(Binding::Kind(kind)) => Ok(TrackedValue::literal(Value::Kind(*kind))),
            Some(Binding::Tool(_) | Binding::Elicit | Binding::Helper(_) | Binding::Func { .. }) => {
                Err(WorkflowError::failure(format!(
                    "'{name}' is callable and cannot be used as a value"
                )))
            }
            None => Err(WorkflowError::failure(format!(
                "name '{name}' is not defined"
            ))),
        }
    }

    fn attr_access(&self, base: &TrackedValue, name: &str) -> WorkflowResult<TrackedValue> {
        let elem = value_attr(&base.raw, name).map_err(WorkflowError::failure)?;
        Ok(self
            .strategy
            .propagate(elem.raw, &[&elem.origins, &base.origins]))
    }

    fn index_access(&self, base: &TrackedValue, key: &TrackedValue) -> WorkflowResult<TrackedValue> {
        let elem = value_index(&base.raw, &key.raw).map_err(WorkflowError::failure)?;
        Ok(self
            .strategy
            .propagate(elem.raw, &[&elem.origins, &base.origins]))
    }

    async fn eval_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> WorkflowResult<TrackedValue> {
        // Method call on a value: `recv.method(args)`
        if let Expr::Attr { base, name } = callee {
            let recv = self.eval(base).await?;
            let mut raw_args = Vec::with_capacity(args.len());
            let mut sources: Vec<OriginSet> = vec![recv.origins.clone()];
            for arg in args {
                let value = self.eval(arg).await?;
                sources.push(value.origins.clone());
                raw_args.push(value.raw);
            }
            if !kwargs.is_empty() {
                return Err(WorkflowError::failure(format!(
                    "{name}() does not accept keyword arguments"
                )));
            }
            let raw = call_method(&recv.raw, name, &raw_args).map_err(WorkflowError::failure)?;
            let refs: Vec<&OriginSet> = sources.iter().collect();
            return Ok(self.strategy.propagate(raw, &refs));
        }

        let Expr::Name(name) = callee else {
            return Err(WorkflowError::failure("expression is not callable"));
        };

        match self.env.get(name).cloned() {
            Some(Binding::Tool(tool_name)) => {
                if !args.is_empty() {
                    return Err(WorkflowError::failure(format!(
                        "tool '{tool_name}' accepts keyword arguments only"
                    )));
                }
                let mut evaluated = Vec::with_capacity(kwargs.len());
                for (key, value) in kwargs {
                    evaluated.push((key.clone(), self.eval(value).await?));
                }
                self.call_tool(&tool_name, evaluated).await
            }
            Some(Binding::Elicit) => self.call_elicit(args, kwargs).await,
            Some(Binding::Helper(helper)) => self.call_helper(helper, args).await,
            Some(Binding::Func { body }) => {
                if !args.is_empty() || !kwargs.is_empty() {
                    return Err(WorkflowError::failure(format!(
                        "{name}() takes no arguments"
                    )));
                }
                match self.exec_stmts(&body).await? {
                    Flow::Return(value) => Ok(value),
                    Flow::Normal => Ok(TrackedValue::literal(Value::Null)),
                    Flow::Break | Flow::Continue => {
                        Err(WorkflowError::failure("'break' or 'continue' outside loop"))
                    }
                }
            }
            Some(Binding::Value(_) | Binding::Kind(_)) => Err(WorkflowError::failure(format!(
                "'{name}' object is not callable"
            ))),
            None => Err(WorkflowError::failure(format!(
                "name '{name}' is not defined"
            ))),
        }
    }

    /// Provenance-tracked dispatch for one proxy invocation.
    async fn call_tool(
        &mut self,
        tool_name: &str,
        kwargs: Vec<(String, TrackedValue)>,
    ) -> WorkflowResult<TrackedValue> {
        // 1. Per-argument origins, extracted before unwrapping
        let input_origins = extract_per_arg(&kwargs);

        // 2. Call id minted at proxy entry; timestamp recorded with it
        let call_id = self.store.next_call_id(tool_name);
        let timestamp = unix_now();

        // 3. Resolve carriers away so the tool sees plain data
        let mut resolved = JsonMap::new();
        for (key, value) in &kwargs {
            resolved.insert(key.clone(), crate::provenance::resolve_value(value));
        }

        tracing::info!(
            call_id = %call_id,
            tool = tool_name,
            "executing tool"
        );

        // 4. Dispatch via the manager and time the call
        let start = std::time::Instant::now();
        let result = self.dispatch.call(tool_name, resolved.clone()).await;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        let output = match result {
            Ok(output) => output,
            Err(source) => {
                tracing::warn!(
                    call_id = %call_id,
                    tool = tool_name,
                    duration_ms,
                    error = %source,
                    "tool failed"
                );
                return Err(WorkflowError::Tool(ToolExecutionError {
                    tool_name: tool_name.to_string(),
                    source,
                }));
            }
        };

        tracing::info!(
            call_id = %call_id,
            tool = tool_name,
            duration_ms,
            "tool completed"
        );

        // 5. Append the audit record
        self.store.record(ToolCallRecord {
            call_id: call_id.clone(),
            tool_name: tool_name.to_string(),
            input_value: resolved,
            input_origins,
            output_value: output.clone(),
            timestamp,
            duration_ms,
        });

        // 6. Fresh carrier tagged with the new call's origin
        let origin = Origin {
            call_id,
            tool_name: tool_name.to_string(),
            timestamp,
        };
        Ok(self.strategy.wrap(Value::from_json(&output), &origin))
    }

    async fn call_elicit(
        &mut self,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> WorkflowResult<TrackedValue> {
        let Some(capability) = self.elicit else {
            // Unreachable through the namespace, kept as a guard
            return Err(WorkflowError::failure("'elicit' is not defined"));
        };

        let mut message: Option<String> = None;
        let mut kind: Option<ElicitKind> = None;

        let mut positional = args.iter();
        let mut named: Vec<(&str, &Expr)> = kwargs
            .iter()
            .map(|(k, v)| (k.as_str(), v))
            .collect();

        let message_expr = positional.next().or_else(|| take_kwarg(&mut named, "message"));
        if let Some(expr) = message_expr {
            let value = self.eval(expr).await?;
            match value.raw {
                Value::Str(s) => message = Some(s),
                other => {
                    return Err(WorkflowError::failure(format!(
                        "elicit() message must be a string, not {}",
                        other.type_name()
                    )))
                }
            }
        }

        let kind_expr = positional
            .next()
            .or_else(|| take_kwarg(&mut named, "response_type"));
        if let Some(expr) = kind_expr {
            let value = self.eval(expr).await?;
            match value.raw {
                Value::Kind(k) => kind = Some(k),
                other => {
                    return Err(WorkflowError::failure(format!(
                        "elicit() response_type must be a type, not {}",
                        other.type_name()
                    )))
                }
            }
        }

        if positional.next().is_some() || !named.is_empty() {
            return Err(WorkflowError::failure(
                "elicit() accepts (message, response_type)",
            ));
        }
        let Some(message) = message else {
            return Err(WorkflowError::failure("elicit() requires a message"));
        };

        let response = capability
            .elicit(&message, kind.unwrap_or(ElicitKind::Str))
            .await
            .map_err(WorkflowError::Elicit)?;

        // Elicited values are literals: empty origins
        Ok(TrackedValue::literal(Value::from_json(&response)))
    }

    async fn call_helper(
        &mut self,
        helper: Helper,
        args: &[Expr],
    ) -> WorkflowResult<TrackedValue> {
        match helper {
            Helper::Assign => {
                let [Expr::Str(target), Expr::List(names), value_expr] = args else {
                    return Err(WorkflowError::failure(format!(
                        "{TRACK_ASSIGN} expects (name, rhs_names, value)"
                    )));
                };
                let value = self.eval(value_expr).await?;
                let rhs_names = names.iter().filter_map(|n| match n {
                    Expr::Str(s) => Some(s.as_str()),
                    _ => None,
                });
                let mut origins = self.origin_map.merge(rhs_names);
                origins.extend(value.origins.iter().cloned());
                self.origin_map.assign(target, origins.clone());
                Ok(TrackedValue::with_origins(value.raw, origins))
            }
            Helper::Subscript => {
                let [base_expr, key_expr] = args else {
                    return Err(WorkflowError::failure(format!(
                        "{TRACK_SUBSCRIPT} expects (base, key)"
                    )));
                };
                let base = self.eval(base_expr).await?;
                let key = self.eval(key_expr).await?;
                self.index_access(&base, &key)
            }
            Helper::Attr => {
                let [base_expr, Expr::Str(name)] = args else {
                    return Err(WorkflowError::failure(format!(
                        "{TRACK_ATTR} expects (base, attr)"
                    )));
                };
                let base = self.eval(base_expr).await?;
                self.attr_access(&base, name)
            }
        }
    }
}

fn take_kwarg<'e>(named: &mut Vec<(&str, &'e Expr)>, key: &str) -> Option<&'e Expr> {
    named
        .iter()
        .position(|(k, _)| *k == key)
        .map(|idx| named.remove(idx).1)
}
