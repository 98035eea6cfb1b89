mod compiler;
mod result;
mod scope;

pub use compiler::compile;
pub use result::{CompileErr, CompileErrKind};
