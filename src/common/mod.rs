mod temp;

pub use temp::{Label, NameGen, Variable, FRAME_POINTER, STACK_POINTER};
