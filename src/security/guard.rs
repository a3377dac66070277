//! AST-level security guard for LLM-submitted programs.
//!
//! Submitted code is parsed to a Python AST and walked in pre-order. Every
//! import, call, attribute access, and scope declaration is checked against
//! the literal policy sets in [`crate::security::policies`]. The first
//! violation in walk order is the one surfaced, so rejection messages are
//! deterministic for identical input.

use crate::error::Error;
use crate::security::policies;
use rustpython_parser::{ast, Parse};
use tracing::warn;

/// Static code analyzer that blocks unsafe patterns before execution.
#[derive(Debug, Default)]
pub struct AstGuard;

impl AstGuard {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validate Python code for security violations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Security`] for syntactically invalid code or on the
    /// first blocked construct found.
    pub fn validate(&self, code: &str, context: &str) -> Result<(), Error> {
        let suite = ast::Suite::parse(code, "<mfp>")
            .map_err(|e| Error::security(format!("Invalid Python syntax: {e}")))?;

        let mut visitor = SecurityVisitor::default();
        visitor.visit_body(&suite);

        if let Some(violation) = visitor.violations.first() {
            warn!(
                context = %context,
                violation_type = violation.kind,
                detail = %violation.detail,
                "security violation blocked"
            );
            return Err(Error::security(format!(
                "{}: {}",
                violation.kind, violation.detail
            )));
        }

        Ok(())
    }
}

struct Violation {
    kind: &'static str,
    detail: String,
}

#[derive(Default)]
struct SecurityVisitor {
    violations: Vec<Violation>,
}

impl SecurityVisitor {
    fn add(&mut self, kind: &'static str, detail: String) {
        self.violations.push(Violation { kind, detail });
    }

    fn visit_body(&mut self, body: &[ast::Stmt]) {
        for stmt in body {
            self.visit_stmt(stmt);
        }
    }

    fn visit_stmt(&mut self, stmt: &ast::Stmt) {
        match stmt {
            ast::Stmt::Import(node) => {
                for alias in &node.names {
                    let top_level = alias.name.split('.').next().unwrap_or_default();
                    if policies::is_blocked_module(top_level) {
                        self.add("blocked_import", format!("import {}", alias.name.as_str()));
                    }
                }
            }
            ast::Stmt::ImportFrom(node) => {
                let module = node
                    .module
                    .as_ref()
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                let top_level = module.split('.').next().unwrap_or_default();
                if policies::is_blocked_module(top_level) {
                    self.add("blocked_import", format!("from {module} import ..."));
                }
            }
            ast::Stmt::Global(_) => {
                self.add("blocked_global", "global statement not allowed".to_string());
            }
            ast::Stmt::Nonlocal(_) => {
                self.add(
                    "blocked_nonlocal",
                    "nonlocal statement not allowed".to_string(),
                );
            }
            ast::Stmt::FunctionDef(node) => {
                self.visit_arguments(&node.args);
                for dec in &node.decorator_list {
                    self.visit_expr(dec);
                }
                if let Some(returns) = &node.returns {
                    self.visit_expr(returns);
                }
                self.visit_body(&node.body);
            }
            ast::Stmt::AsyncFunctionDef(node) => {
                self.visit_arguments(&node.args);
                for dec in &node.decorator_list {
                    self.visit_expr(dec);
                }
                if let Some(returns) = &node.returns {
                    self.visit_expr(returns);
                }
                self.visit_body(&node.body);
            }
            ast::Stmt::ClassDef(node) => {
                for base in &node.bases {
                    self.visit_expr(base);
                }
                for keyword in &node.keywords {
                    self.visit_expr(&keyword.value);
                }
                for dec in &node.decorator_list {
                    self.visit_expr(dec);
                }
                self.visit_body(&node.body);
            }
            ast::Stmt::Return(node) => {
                if let Some(value) = &node.value {
                    self.visit_expr(value);
                }
            }
            ast::Stmt::Delete(node) => {
                for target in &node.targets {
                    self.visit_expr(target);
                }
            }
            ast::Stmt::Assign(node) => {
                for target in &node.targets {
                    self.visit_expr(target);
                }
                self.visit_expr(&node.value);
            }
            ast::Stmt::AugAssign(node) => {
                self.visit_expr(&node.target);
                self.visit_expr(&node.value);
            }
            ast::Stmt::AnnAssign(node) => {
                self.visit_expr(&node.target);
                self.visit_expr(&node.annotation);
                if let Some(value) = &node.value {
                    self.visit_expr(value);
                }
            }
            ast::Stmt::For(node) => {
                self.visit_expr(&node.target);
                self.visit_expr(&node.iter);
                self.visit_body(&node.body);
                self.visit_body(&node.orelse);
            }
            ast::Stmt::AsyncFor(node) => {
                self.visit_expr(&node.target);
                self.visit_expr(&node.iter);
                self.visit_body(&node.body);
                self.visit_body(&node.orelse);
            }
            ast::Stmt::While(node) => {
                self.visit_expr(&node.test);
                self.visit_body(&node.body);
                self.visit_body(&node.orelse);
            }
            ast::Stmt::If(node) => {
                self.visit_expr(&node.test);
                self.visit_body(&node.body);
                self.visit_body(&node.orelse);
            }
            ast::Stmt::With(node) => {
                for item in &node.items {
                    self.visit_expr(&item.context_expr);
                    if let Some(vars) = &item.optional_vars {
                        self.visit_expr(vars);
                    }
                }
                self.visit_body(&node.body);
            }
            ast::Stmt::AsyncWith(node) => {
                for item in &node.items {
                    self.visit_expr(&item.context_expr);
                    if let Some(vars) = &item.optional_vars {
                        self.visit_expr(vars);
                    }
                }
                self.visit_body(&node.body);
            }
            ast::Stmt::Match(node) => {
                self.visit_expr(&node.subject);
                for case in &node.cases {
                    if let Some(guard) = &case.guard {
                        self.visit_expr(guard);
                    }
                    self.visit_body(&case.body);
                }
            }
            ast::Stmt::Raise(node) => {
                if let Some(exc) = &node.exc {
                    self.visit_expr(exc);
                }
                if let Some(cause) = &node.cause {
                    self.visit_expr(cause);
                }
            }
            ast::Stmt::Try(node) => {
                self.visit_body(&node.body);
                for handler in &node.handlers {
                    let ast::ExceptHandler::ExceptHandler(h) = handler;
                    if let Some(type_) = &h.type_ {
                        self.visit_expr(type_);
                    }
                    self.visit_body(&h.body);
                }
                self.visit_body(&node.orelse);
                self.visit_body(&node.finalbody);
            }
            ast::Stmt::TryStar(node) => {
                self.visit_body(&node.body);
                for handler in &node.handlers {
                    let ast::ExceptHandler::ExceptHandler(h) = handler;
                    if let Some(type_) = &h.type_ {
                        self.visit_expr(type_);
                    }
                    self.visit_body(&h.body);
                }
                self.visit_body(&node.orelse);
                self.visit_body(&node.finalbody);
            }
            ast::Stmt::Assert(node) => {
                self.visit_expr(&node.test);
                if let Some(msg) = &node.msg {
                    self.visit_expr(msg);
                }
            }
            ast::Stmt::Expr(node) => self.visit_expr(&node.value),
            _ => {}
        }
    }

    fn visit_expr(&mut self, expr: &ast::Expr) {
        match expr {
            ast::Expr::Call(node) => {
                // Direct calls to blocked builtins: eval(), open(), ...
                if let ast::Expr::Name(name) = node.func.as_ref() {
                    if policies::is_blocked_call(name.id.as_str()) {
                        self.add("blocked_call", format!("call to {}()", name.id.as_str()));
                    }
                }
                // Method calls through blocked attributes: obj.system(), ...
                if let ast::Expr::Attribute(attr) = node.func.as_ref() {
                    if policies::is_blocked_attribute(attr.attr.as_str()) {
                        self.add(
                            "blocked_attribute_call",
                            format!("call to .{}()", attr.attr.as_str()),
                        );
                    }
                }
                self.visit_expr(&node.func);
                for arg in &node.args {
                    self.visit_expr(arg);
                }
                for keyword in &node.keywords {
                    self.visit_expr(&keyword.value);
                }
            }
            ast::Expr::Attribute(node) => {
                if policies::is_blocked_attribute(node.attr.as_str()) {
                    self.add(
                        "blocked_attribute",
                        format!("access to .{}", node.attr.as_str()),
                    );
                }
                self.visit_expr(&node.value);
            }
            ast::Expr::BoolOp(node) => {
                for value in &node.values {
                    self.visit_expr(value);
                }
            }
            ast::Expr::NamedExpr(node) => {
                self.visit_expr(&node.target);
                self.visit_expr(&node.value);
            }
            ast::Expr::BinOp(node) => {
                self.visit_expr(&node.left);
                self.visit_expr(&node.right);
            }
            ast::Expr::UnaryOp(node) => self.visit_expr(&node.operand),
            ast::Expr::Lambda(node) => {
                self.visit_arguments(&node.args);
                self.visit_expr(&node.body);
            }
            ast::Expr::IfExp(node) => {
                self.visit_expr(&node.test);
                self.visit_expr(&node.body);
                self.visit_expr(&node.orelse);
            }
            ast::Expr::Dict(node) => {
                for key in node.keys.iter().flatten() {
                    self.visit_expr(key);
                }
                for value in &node.values {
                    self.visit_expr(value);
                }
            }
            ast::Expr::Set(node) => {
                for elt in &node.elts {
                    self.visit_expr(elt);
                }
            }
            ast::Expr::ListComp(node) => {
                self.visit_expr(&node.elt);
                self.visit_comprehensions(&node.generators);
            }
            ast::Expr::SetComp(node) => {
                self.visit_expr(&node.elt);
                self.visit_comprehensions(&node.generators);
            }
            ast::Expr::DictComp(node) => {
                self.visit_expr(&node.key);
                self.visit_expr(&node.value);
                self.visit_comprehensions(&node.generators);
            }
            ast::Expr::GeneratorExp(node) => {
                self.visit_expr(&node.elt);
                self.visit_comprehensions(&node.generators);
            }
            ast::Expr::Await(node) => self.visit_expr(&node.value),
            ast::Expr::Yield(node) => {
                if let Some(value) = &node.value {
                    self.visit_expr(value);
                }
            }
            ast::Expr::YieldFrom(node) => self.visit_expr(&node.value),
            ast::Expr::Compare(node) => {
                self.visit_expr(&node.left);
                for comparator in &node.comparators {
                    self.visit_expr(comparator);
                }
            }
            ast::Expr::FormattedValue(node) => {
                self.visit_expr(&node.value);
                if let Some(spec) = &node.format_spec {
                    self.visit_expr(spec);
                }
            }
            ast::Expr::JoinedStr(node) => {
                for value in &node.values {
                    self.visit_expr(value);
                }
            }
            ast::Expr::Subscript(node) => {
                self.visit_expr(&node.value);
                self.visit_expr(&node.slice);
            }
            ast::Expr::Starred(node) => self.visit_expr(&node.value),
            ast::Expr::List(node) => {
                for elt in &node.elts {
                    self.visit_expr(elt);
                }
            }
            ast::Expr::Tuple(node) => {
                for elt in &node.elts {
                    self.visit_expr(elt);
                }
            }
            ast::Expr::Slice(node) => {
                if let Some(lower) = &node.lower {
                    self.visit_expr(lower);
                }
                if let Some(upper) = &node.upper {
                    self.visit_expr(upper);
                }
                if let Some(step) = &node.step {
                    self.visit_expr(step);
                }
            }
            _ => {}
        }
    }

    fn visit_comprehensions(&mut self, generators: &[ast::Comprehension]) {
        for comp in generators {
            self.visit_expr(&comp.target);
            self.visit_expr(&comp.iter);
            for cond in &comp.ifs {
                self.visit_expr(cond);
            }
        }
    }

    fn visit_arguments(&mut self, args: &ast::Arguments) {
        for arg in args
            .posonlyargs
            .iter()
            .chain(&args.args)
            .chain(&args.kwonlyargs)
        {
            if let Some(default) = &arg.default {
                self.visit_expr(default);
            }
        }
    }
}
