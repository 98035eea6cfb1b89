//! Default native bindings, installed into a fresh `Globals` table
//! before a program runs. These mirror the small set of host functions
//! used to exercise native calls end to end: a couple of arithmetic
//! helpers plus a plain numeric constant.
use crate::value::Value;
use crate::vm::Globals;

pub fn install_defaults(globals: &mut Globals) {
    globals.define_with(
        "native-square",
        Value::new_native("native-square", 1, |args| {
            Value::Number(args[0].as_number().unwrap_or(0.0).powi(2))
        }),
    );
    globals.define_with(
        "native-sum",
        Value::new_native("native-sum", 2, |args| {
            let a = args[0].as_number().unwrap_or(0.0);
            let b = args[1].as_number().unwrap_or(0.0);
            Value::Number(a + b)
        }),
    );
    globals.define_with("y", Value::Number(20.0));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installs_expected_names() {
        let mut globals = Globals::new();
        install_defaults(&mut globals);
        assert!(globals.exists("native-square"));
        assert!(globals.exists("native-sum"));
        assert!(globals.exists("y"));
    }
}
