//! One call-stack entry: which function is running, where to resume it,
//! and where its locals start on the value stack.
use std::rc::Rc;

use crate::value::Function;

pub struct Frame {
    pub function: Rc<Function>,
    pub ip: usize,
    /// Index into the VM's value stack of this frame's reserved slot 0
    /// (the callee itself). Locals/params are addressed as
    /// `stack[base_pointer + slot]`.
    pub base_pointer: usize,
}

impl Frame {
    pub fn new(function: Rc<Function>, base_pointer: usize) -> Self {
        Self { function, ip: 0, base_pointer }
    }
}
