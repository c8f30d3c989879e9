use std::fmt::Display;

/// Name of the pseudo-variable bound to the stack pointer.
pub const STACK_POINTER: &str = "@stack";
/// Name of the pseudo-variable bound to the frame pointer.
pub const FRAME_POINTER: &str = "@frame";

/// A named virtual register.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Hash)]
pub struct Variable {
    name: String,
}

impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        Variable { name: name.into() }
    }

    pub fn stack() -> Self {
        Self::new(STACK_POINTER)
    }

    pub fn frame() -> Self {
        Self::new(FRAME_POINTER)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pseudo-variables are pre-bound to machine registers and never take
    /// part in liveliness.
    pub fn is_pseudo(&self) -> bool {
        self.name == STACK_POINTER || self.name == FRAME_POINTER
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl From<&str> for Variable {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label {
    name: String,
}

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Label { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl From<&str> for Label {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Fresh temporaries and labels for one program.
///
/// Temporaries and labels share a single counter, so a name handed out by
/// lowering never collides with one created later by the allocator.
#[derive(Debug, Default)]
pub struct NameGen {
    counter: u32,
}

impl NameGen {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> u32 {
        let n = self.counter;
        self.counter += 1;
        n
    }

    pub fn new_var(&mut self) -> Variable {
        Variable::new(format!("@{}", self.next()))
    }

    pub fn new_label(&mut self, suffix: &str) -> Label {
        Label::new(format!("l_{}_{}", self.next(), suffix))
    }
}
