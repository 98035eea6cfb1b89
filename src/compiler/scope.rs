//! Scope analysis: classifies every symbol reference as GLOBAL, LOCAL
//! or CELL, and propagates captured names outward so enclosing
//! functions know which cells to thread through as free variables.
//!
//! This is a pre-pass over the AST run before bytecode emission. The
//! compiler (`compiler.rs`) re-walks the same tree in lockstep and
//! reads the classifications recorded here instead of re-deriving
//! them; see `ScopeForm` below for how the two passes stay in sync.
use std::collections::HashMap;

use indexmap::IndexSet;

use crate::ast::Ast;

use super::result::{CompileErr, CompileErrKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Function,
    Block,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Alloc {
    Global,
    Local,
    Cell,
}

#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<usize>,
    pub alloc_info: HashMap<String, Alloc>,
    pub free: IndexSet<String>,
    pub cells: IndexSet<String>,
}

impl Scope {
    fn new(kind: ScopeKind, parent: Option<usize>) -> Self {
        Self { kind, parent, alloc_info: HashMap::new(), free: IndexSet::new(), cells: IndexSet::new() }
    }

    /// Registers a name declared directly in this scope (a `var`, a
    /// function parameter, or a function's own name for recursion).
    fn add_local(&mut self, name: &str) {
        let alloc = if self.kind == ScopeKind::Global { Alloc::Global } else { Alloc::Local };
        self.alloc_info.insert(name.to_owned(), alloc);
    }
}

/// A node shape that introduces a new lexical scope. Shared between
/// the analyzer and the compiler so both passes agree, node for node,
/// on when a new scope begins — the compiler never re-derives
/// classifications, it only needs to stay aligned on *which* scope it
/// is currently in.
pub enum ScopeForm<'a> {
    Begin,
    Def { name: &'a str, params: &'a [Ast], body: &'a [Ast] },
    Lambda { params: &'a [Ast], body: &'a [Ast] },
    NamedLambda { name: &'a str, params: &'a [Ast], body: &'a [Ast] },
}

/// Returns `Some` when `items` (the elements of a `List`) is one of the
/// forms that introduces a new scope, in its dissected parts.
pub fn scope_form(items: &[Ast]) -> Option<ScopeForm<'_>> {
    let head = items.first()?.symbol_name()?;
    match head {
        "begin" => Some(ScopeForm::Begin),
        "def" => {
            let name = items.get(1)?.symbol_name()?;
            let params = items.get(2)?.as_list()?;
            Some(ScopeForm::Def { name, params, body: &items[3..] })
        }
        "lambda" => {
            let params = items.get(1)?.as_list()?;
            Some(ScopeForm::Lambda { params, body: &items[2..] })
        }
        "var" => {
            let init = items.get(2)?;
            let lambda_items = init.as_list()?;
            if lambda_items.first()?.symbol_name()? != "lambda" {
                return None;
            }
            let name = items.get(1)?.symbol_name()?;
            let params = lambda_items.get(1)?.as_list()?;
            Some(ScopeForm::NamedLambda { name, params, body: &lambda_items[2..] })
        }
        _ => None,
    }
}

pub struct ScopeAnalyzer {
    pub scopes: Vec<Scope>,
}

impl ScopeAnalyzer {
    /// Analyze `program` (already wrapped in a top-level `begin` by the
    /// caller) and return the flat, pre-order list of scopes. Index 0
    /// is always the global scope.
    pub fn analyze(program: &Ast) -> Result<Vec<Scope>, CompileErr> {
        let mut analyzer = Self { scopes: vec![] };
        let root = analyzer.push_scope(ScopeKind::Global, None);
        // `program` is always `(begin ...)` (the caller wraps the
        // top-level expression sequence). Its body runs directly in
        // the global scope rather than a nested Block, since entering
        // `begin` creates a BLOCK scope that is GLOBAL "if it is the
        // outermost" — every other `begin` encountered while walking
        // `items` below does push a genuine nested Block.
        let items =
            program.as_list().expect("top-level program must be a begin-wrapped list");
        for expr in &items[1..] {
            analyzer.analyze_node(root, expr)?;
        }
        Ok(analyzer.scopes)
    }

    fn push_scope(&mut self, kind: ScopeKind, parent: Option<usize>) -> usize {
        self.scopes.push(Scope::new(kind, parent));
        self.scopes.len() - 1
    }

    fn analyze_node(&mut self, scope_idx: usize, node: &Ast) -> Result<(), CompileErr> {
        match node {
            Ast::Number(_) | Ast::String(_) | Ast::Boolean(_) => Ok(()),
            Ast::Symbol(name) => self.maybe_promote(scope_idx, name),
            Ast::List(items) => self.analyze_list(scope_idx, items),
        }
    }

    fn analyze_list(&mut self, scope_idx: usize, items: &[Ast]) -> Result<(), CompileErr> {
        if items.is_empty() {
            return Ok(());
        }
        match scope_form(items) {
            Some(ScopeForm::Begin) => {
                // Every `begin` reached through this generic dispatch
                // is a nested block; the single outermost `begin` is
                // handled directly by `analyze`, never recursing back
                // into this arm.
                let body_scope = self.push_scope(ScopeKind::Block, Some(scope_idx));
                for expr in &items[1..] {
                    self.analyze_node(body_scope, expr)?;
                }
                Ok(())
            }
            Some(ScopeForm::Def { name, params, body }) => {
                self.scopes[scope_idx].add_local(name);
                self.analyze_function(scope_idx, Some(name), params, body)
            }
            Some(ScopeForm::NamedLambda { name, params, body }) => {
                self.scopes[scope_idx].add_local(name);
                self.analyze_function(scope_idx, Some(name), params, body)
            }
            Some(ScopeForm::Lambda { params, body }) => {
                self.analyze_function(scope_idx, None, params, body)
            }
            None => {
                let head = items[0].symbol_name();
                match head {
                    Some("var") => {
                        let name = items[1].symbol_name().ok_or_else(|| {
                            CompileErr::new(CompileErrKind::MalformedForm("var"))
                        })?;
                        self.scopes[scope_idx].add_local(name);
                        self.analyze_node(scope_idx, &items[2])
                    }
                    Some("set") => {
                        let name = items[1].symbol_name().ok_or_else(|| {
                            CompileErr::new(CompileErrKind::MalformedForm("set"))
                        })?;
                        self.maybe_promote(scope_idx, name)?;
                        self.analyze_node(scope_idx, &items[2])
                    }
                    // `if`, `while`, binary operators, comparisons and
                    // function calls all just recurse into every
                    // sub-expression; none of them introduce a scope
                    // or need special handling of their own.
                    _ => {
                        for expr in items {
                            self.analyze_node(scope_idx, expr)?;
                        }
                        Ok(())
                    }
                }
            }
        }
    }

    fn analyze_function(
        &mut self,
        enclosing: usize,
        self_name: Option<&str>,
        params: &[Ast],
        body: &[Ast],
    ) -> Result<(), CompileErr> {
        let func_idx = self.push_scope(ScopeKind::Function, Some(enclosing));
        if let Some(name) = self_name {
            self.scopes[func_idx].add_local(name);
        }
        for param in params {
            let name = param
                .symbol_name()
                .ok_or_else(|| CompileErr::new(CompileErrKind::MalformedForm("lambda")))?;
            self.scopes[func_idx].add_local(name);
        }
        for expr in body {
            self.analyze_node(func_idx, expr)?;
        }
        Ok(())
    }

    /// Classify a symbol reference occurring in `scope_idx`, recording
    /// the result there, and promote it to a cell (threading `free`
    /// through every intermediate scope) if resolution crosses a
    /// function boundary.
    fn maybe_promote(&mut self, scope_idx: usize, name: &str) -> Result<(), CompileErr> {
        let scope = &self.scopes[scope_idx];
        let mut init_alloc =
            if scope.kind == ScopeKind::Global { Alloc::Global } else { Alloc::Local };
        if let Some(alloc) = scope.alloc_info.get(name) {
            init_alloc = *alloc;
        }
        let (owner_idx, alloc) = self.resolve(scope_idx, name, init_alloc)?;
        self.scopes[scope_idx].alloc_info.insert(name.to_owned(), alloc);
        if alloc == Alloc::Cell {
            self.promote(scope_idx, owner_idx, name);
        }
        Ok(())
    }

    /// Walk the scope chain starting at `scope_idx` looking for where
    /// `name` is declared, flipping the tentative allocation to CELL
    /// the first time a function boundary is crossed and to GLOBAL
    /// once the walk reaches a child of the global scope.
    fn resolve(
        &self,
        mut scope_idx: usize,
        name: &str,
        mut alloc: Alloc,
    ) -> Result<(usize, Alloc), CompileErr> {
        loop {
            let scope = &self.scopes[scope_idx];
            if scope.alloc_info.contains_key(name) {
                return Ok((scope_idx, alloc));
            }
            if scope.kind == ScopeKind::Function {
                alloc = Alloc::Cell;
            }
            let parent_idx = scope.parent.ok_or_else(|| CompileErr::reference(name))?;
            if self.scopes[parent_idx].kind == ScopeKind::Global {
                alloc = Alloc::Global;
            }
            scope_idx = parent_idx;
        }
    }

    /// Register `name` as an owned cell on `owner_idx`, and thread it
    /// through every scope between `start_idx` and `owner_idx` as a
    /// free variable those intermediate functions must also capture
    /// and pass down.
    fn promote(&mut self, start_idx: usize, owner_idx: usize, name: &str) {
        {
            let owner = &mut self.scopes[owner_idx];
            owner.cells.insert(name.to_owned());
            owner.alloc_info.insert(name.to_owned(), Alloc::Cell);
        }
        let mut idx = start_idx;
        while idx != owner_idx {
            let scope = &mut self.scopes[idx];
            scope.free.insert(name.to_owned());
            scope.alloc_info.insert(name.to_owned(), Alloc::Cell);
            idx = scope.parent.expect("owner scope must be an ancestor");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_optimistic;

    fn analyze_source(text: &str) -> Vec<Scope> {
        let mut exprs = parse_optimistic(text);
        exprs.insert(0, Ast::Symbol("begin".to_owned()));
        ScopeAnalyzer::analyze(&Ast::List(exprs)).unwrap()
    }

    #[test]
    fn global_var_is_global() {
        let scopes = analyze_source(r#"(var x 10) x"#);
        assert_eq!(scopes[0].alloc_info.get("x"), Some(&Alloc::Global));
    }

    #[test]
    fn function_param_is_local() {
        let scopes = analyze_source("(def square (x) (* x x))");
        // scope 0: global (declares `square`); scope 1: the function.
        assert_eq!(scopes[1].alloc_info.get("x"), Some(&Alloc::Local));
    }

    #[test]
    fn captured_global_is_not_promoted_to_cell() {
        // Globals are never captured as cells; a function referencing
        // a global resolves straight to GLOBAL regardless of nesting.
        let scopes = analyze_source("(var x 10) (def foo () x)");
        let func_scope = &scopes[1];
        assert_eq!(func_scope.alloc_info.get("x"), Some(&Alloc::Global));
        assert!(func_scope.free.is_empty());
    }

    #[test]
    fn captured_local_is_promoted_to_cell() {
        let scopes = analyze_source(
            "(begin (var y 100) (def bar () y))",
        );
        // scope 0: global/outer begin; scope 1: the nested `begin`
        // block declaring `y`; scope 2: `bar`'s function scope.
        let block_scope = scopes.iter().find(|s| s.kind == ScopeKind::Block).unwrap();
        assert_eq!(block_scope.alloc_info.get("y"), Some(&Alloc::Cell));
        assert!(block_scope.cells.contains("y"));
        let func_scope = scopes.iter().find(|s| s.kind == ScopeKind::Function).unwrap();
        assert_eq!(func_scope.alloc_info.get("y"), Some(&Alloc::Cell));
        assert!(func_scope.free.contains("y"));
    }

    #[test]
    fn unresolved_name_is_reference_error() {
        let mut exprs = parse_optimistic("undefined_name");
        exprs.insert(0, Ast::Symbol("begin".to_owned()));
        let result = ScopeAnalyzer::analyze(&Ast::List(exprs));
        assert!(matches!(
            result,
            Err(CompileErr { kind: CompileErrKind::ReferenceError(_) })
        ));
    }

    #[test]
    fn recursive_function_self_reference_is_local() {
        let scopes = analyze_source(
            "(def factorial (x) (if (== x 1) 1 (* x (factorial (- x 1)))))",
        );
        let func_scope = scopes.iter().find(|s| s.kind == ScopeKind::Function).unwrap();
        assert_eq!(func_scope.alloc_info.get("factorial"), Some(&Alloc::Local));
    }
}
