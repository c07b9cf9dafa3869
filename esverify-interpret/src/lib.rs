#![forbid(unsafe_code)]
#![allow(unused_assignments)]

mod value;
mod vm;

pub use value::{
    less_than, loose_equals, number_to_string, strict_equals, Closure, FuncRef, Value,
};
pub use vm::{
    replay, run_program, Entry, InterpConfig, InterpretError, Site, Verdict, DEFAULT_FUEL,
    DEFAULT_MAX_CALL_DEPTH,
};
