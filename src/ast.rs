//! Abstract syntax tree produced by the parser and consumed by the
//! scope analyzer and compiler.

/// A single S-expression node. `List` is the only recursive form; every
/// special form (`var`, `if`, `def`, ...) and every function call is
/// just a `List` whose first element is a `Symbol`.
#[derive(Clone, Debug, PartialEq)]
pub enum Ast {
    Number(f64),
    String(String),
    Boolean(bool),
    Symbol(String),
    List(Vec<Ast>),
}

impl Ast {
    pub fn symbol_name(&self) -> Option<&str> {
        match self {
            Ast::Symbol(name) => Some(name.as_str()),
            _ => None,
        }
    }

    /// True for `(var ...)` and `(def ...)` forms, the two forms whose
    /// compiled result must be kept on the stack (no trailing `POP`)
    /// when they appear as a non-last expression inside a `begin`.
    pub fn is_declaration(&self) -> bool {
        match self {
            Ast::List(items) => {
                matches!(items.first().and_then(Ast::symbol_name), Some("var" | "def"))
            }
            _ => false,
        }
    }

    pub fn as_list(&self) -> Option<&[Ast]> {
        match self {
            Ast::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }
}
