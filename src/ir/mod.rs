use std::{
    collections::HashSet,
    fmt::{self, Display},
    rc::Rc,
};

use itertools::Itertools;
use thiserror::Error;

use crate::{
    common::{Label, NameGen, Variable},
    frame::{Register, RegisterMap},
};

mod block;
mod program;

pub use block::{BasicBlock, BlockId};
pub use program::Program;

pub type LiveSet = HashSet<Variable>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("constant {0} used where a destination variable is required")]
    ConstantDestination(i32),

    #[error("`{old}` is not {role} by `{instruction}`")]
    RenameMissing {
        old: Variable,
        role: &'static str,
        instruction: String,
    },

    #[error("reference to block {0} which does not exist")]
    DanglingBlock(BlockId),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    Constant(i32),
    Variable(Variable),
}

impl Operand {
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Operand::Variable(v) => Some(v),
            Operand::Constant(_) => None,
        }
    }
}

impl From<Variable> for Operand {
    fn from(v: Variable) -> Self {
        Operand::Variable(v)
    }
}

impl From<&Variable> for Operand {
    fn from(v: &Variable) -> Self {
        Operand::Variable(v.clone())
    }
}

impl From<i32> for Operand {
    fn from(n: i32) -> Self {
        Operand::Constant(n)
    }
}

impl TryFrom<Operand> for Variable {
    type Error = Error;

    fn try_from(operand: Operand) -> Result<Self, Self::Error> {
        match operand {
            Operand::Variable(v) => Ok(v),
            Operand::Constant(n) => Err(Error::ConstantDestination(n)),
        }
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Constant(n) => write!(f, "{}", n),
            Operand::Variable(v) => write!(f, "{}", v),
        }
    }
}

/// Memory operand of a load or store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Global(Label),
    Indexed { label: Label, index: Variable },
    Offset { base: Variable, offset: i32 },
    Indirect(Variable),
    /// Array element; the first word of an array holds its length.
    Element { base: Operand, elem: Operand },
}

impl Address {
    /// Spill slot `offset` bytes above the stack pointer.
    pub fn stack(offset: i32) -> Self {
        Address::Offset {
            base: Variable::stack(),
            offset,
        }
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Global(label) => write!(f, "{}", label),
            Address::Indexed { label, index } => write!(f, "{}[{}]", label, index),
            Address::Offset { base, offset } => write!(f, "{}[{}]", base, offset),
            Address::Indirect(v) => write!(f, "*{}", v),
            Address::Element { base, elem } => write!(f, "{}[{}]", base, elem),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum BinaryOperator {
    #[strum(to_string = "+")]
    Add,
    #[strum(to_string = "-")]
    Sub,
    #[strum(to_string = "*")]
    Mul,
    #[strum(to_string = "/")]
    Div,
    #[strum(to_string = "%")]
    Rem,
    #[strum(to_string = "&&")]
    And,
    #[strum(to_string = "||")]
    Or,
    #[strum(to_string = "==")]
    Eq,
    #[strum(to_string = "!=")]
    Ne,
    #[strum(to_string = "<")]
    Lt,
    #[strum(to_string = "<=")]
    Le,
    #[strum(to_string = ">")]
    Gt,
    #[strum(to_string = ">=")]
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum UnaryOperator {
    #[strum(to_string = "-")]
    Neg,
    #[strum(to_string = "!")]
    Not,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionKind {
    Assign {
        dest: Variable,
        src: Operand,
    },
    BinaryOp {
        dest: Variable,
        lhs: Operand,
        rhs: Operand,
        op: BinaryOperator,
    },
    UnaryOp {
        dest: Variable,
        arg: Operand,
        op: UnaryOperator,
    },
    Load {
        dest: Variable,
        address: Address,
    },
    Store {
        src: Operand,
        address: Address,
    },
    If {
        condition: Operand,
        then_block: BlockId,
        else_block: Option<BlockId>,
        end_block: BlockId,
    },
    While {
        condition: Operand,
        cond_block: BlockId,
        end_block: BlockId,
        next_block: BlockId,
    },
    For {
        condition: Operand,
        cond_block: BlockId,
        end_block: BlockId,
        next_block: BlockId,
    },
    DoWhile {
        do_block: BlockId,
        condition: Operand,
        while_block: BlockId,
        next_block: BlockId,
    },
    Call {
        dest: Variable,
        name: String,
        args: Vec<Operand>,
    },
    Return {
        value: Option<Operand>,
    },
    ArgumentLoad {
        dest: Variable,
        index: usize,
    },
    ArgumentSave {
        src: Operand,
        index: usize,
    },
    FunctionDeclare {
        name: String,
        body_block: BlockId,
    },
    Print {
        arg: Operand,
    },
    Input {
        dest: Variable,
    },
    AllocMemory {
        dest: Variable,
        length: Operand,
    },
    BoundCheck {
        base: Variable,
        elem: Operand,
    },
}

/// A place inside an instruction that holds a read variable.
enum UseSlot<'a> {
    Operand(&'a mut Operand),
    Variable(&'a mut Variable),
}

impl<'a> UseSlot<'a> {
    fn rename(self, old: &Variable, new: &Variable) {
        let v = match self {
            UseSlot::Operand(Operand::Variable(v)) => v,
            UseSlot::Variable(v) => v,
            UseSlot::Operand(Operand::Constant(_)) => return,
        };
        if *v == *old {
            *v = new.clone();
        }
    }
}

fn operand_slot(operand: &mut Operand) -> UseSlot<'_> {
    UseSlot::Operand(operand)
}

fn address_slots(address: &mut Address) -> Vec<UseSlot<'_>> {
    match address {
        Address::Global(_) => vec![],
        Address::Indexed { index, .. } => vec![UseSlot::Variable(index)],
        Address::Offset { base, .. } => vec![UseSlot::Variable(base)],
        Address::Indirect(v) => vec![UseSlot::Variable(v)],
        Address::Element { base, elem } => vec![operand_slot(base), operand_slot(elem)],
    }
}

fn address_uses(address: &Address) -> Vec<&Variable> {
    match address {
        Address::Global(_) => vec![],
        Address::Indexed { index, .. } => vec![index],
        Address::Offset { base, .. } => vec![base],
        Address::Indirect(v) => vec![v],
        Address::Element { base, elem } => {
            base.as_variable().into_iter().chain(elem.as_variable()).collect()
        }
    }
}

impl InstructionKind {
    fn def(&self) -> Option<&Variable> {
        use InstructionKind::*;
        match self {
            Assign { dest, .. }
            | BinaryOp { dest, .. }
            | UnaryOp { dest, .. }
            | Load { dest, .. }
            | Call { dest, .. }
            | ArgumentLoad { dest, .. }
            | Input { dest }
            | AllocMemory { dest, .. } => Some(dest),
            Store { .. }
            | If { .. }
            | While { .. }
            | For { .. }
            | DoWhile { .. }
            | Return { .. }
            | ArgumentSave { .. }
            | FunctionDeclare { .. }
            | Print { .. }
            | BoundCheck { .. } => None,
        }
    }

    fn def_mut(&mut self) -> Option<&mut Variable> {
        use InstructionKind::*;
        match self {
            Assign { dest, .. }
            | BinaryOp { dest, .. }
            | UnaryOp { dest, .. }
            | Load { dest, .. }
            | Call { dest, .. }
            | ArgumentLoad { dest, .. }
            | Input { dest }
            | AllocMemory { dest, .. } => Some(dest),
            Store { .. }
            | If { .. }
            | While { .. }
            | For { .. }
            | DoWhile { .. }
            | Return { .. }
            | ArgumentSave { .. }
            | FunctionDeclare { .. }
            | Print { .. }
            | BoundCheck { .. } => None,
        }
    }

    fn uses(&self) -> Vec<&Variable> {
        use InstructionKind::*;
        let operands: Vec<&Operand> = match self {
            Assign { src, .. } => vec![src],
            BinaryOp { lhs, rhs, .. } => vec![lhs, rhs],
            UnaryOp { arg, .. } => vec![arg],
            Load { address, .. } => return address_uses(address),
            Store { src, address } => {
                let mut uses: Vec<_> = src.as_variable().into_iter().collect();
                uses.extend(address_uses(address));
                return uses;
            }
            If { condition, .. }
            | While { condition, .. }
            | For { condition, .. }
            | DoWhile { condition, .. } => vec![condition],
            Call { args, .. } => args.iter().collect(),
            Return { value } => value.iter().collect(),
            ArgumentSave { src, .. } => vec![src],
            Print { arg } => vec![arg],
            AllocMemory { length, .. } => vec![length],
            BoundCheck { base, elem } => {
                return std::iter::once(base).chain(elem.as_variable()).collect()
            }
            ArgumentLoad { .. } | FunctionDeclare { .. } | Input { .. } => vec![],
        };
        operands.into_iter().filter_map(Operand::as_variable).collect()
    }

    fn use_slots(&mut self) -> Vec<UseSlot<'_>> {
        use InstructionKind::*;
        match self {
            Assign { src, .. } => vec![operand_slot(src)],
            BinaryOp { lhs, rhs, .. } => vec![operand_slot(lhs), operand_slot(rhs)],
            UnaryOp { arg, .. } => vec![operand_slot(arg)],
            Load { address, .. } => address_slots(address),
            Store { src, address } => {
                let mut slots = vec![operand_slot(src)];
                slots.extend(address_slots(address));
                slots
            }
            If { condition, .. }
            | While { condition, .. }
            | For { condition, .. }
            | DoWhile { condition, .. } => vec![operand_slot(condition)],
            Call { args, .. } => args.iter_mut().map(operand_slot).collect(),
            Return { value } => value.iter_mut().map(operand_slot).collect(),
            ArgumentSave { src, .. } => vec![operand_slot(src)],
            Print { arg } => vec![operand_slot(arg)],
            AllocMemory { length, .. } => vec![operand_slot(length)],
            BoundCheck { base, elem } => vec![UseSlot::Variable(base), operand_slot(elem)],
            ArgumentLoad { .. } | FunctionDeclare { .. } | Input { .. } => vec![],
        }
    }

    /// Blocks this instruction refers to.
    pub fn blocks(&self) -> Vec<BlockId> {
        use InstructionKind::*;
        match self {
            If {
                then_block,
                else_block,
                end_block,
                ..
            } => std::iter::once(*then_block)
                .chain(*else_block)
                .chain(std::iter::once(*end_block))
                .collect(),
            While {
                cond_block,
                end_block,
                next_block,
                ..
            }
            | For {
                cond_block,
                end_block,
                next_block,
                ..
            } => vec![*cond_block, *end_block, *next_block],
            DoWhile {
                do_block,
                while_block,
                next_block,
                ..
            } => vec![*do_block, *while_block, *next_block],
            FunctionDeclare { body_block, .. } => vec![*body_block],
            _ => vec![],
        }
    }
}

/// A three-address instruction together with its liveliness sets.
#[derive(Debug, Clone)]
pub struct Instruction {
    kind: InstructionKind,
    defined: LiveSet,
    used: LiveSet,
    live_in: LiveSet,
    live_out: LiveSet,
    register_map: Option<Rc<RegisterMap>>,
}

impl Instruction {
    pub fn new(kind: InstructionKind) -> Self {
        let mut instruction = Instruction {
            kind,
            defined: LiveSet::new(),
            used: LiveSet::new(),
            live_in: LiveSet::new(),
            live_out: LiveSet::new(),
            register_map: None,
        };
        instruction.refresh_sets();
        instruction
    }

    pub fn assign(dest: Variable, src: impl Into<Operand>) -> Self {
        Self::new(InstructionKind::Assign {
            dest,
            src: src.into(),
        })
    }

    pub fn binary(
        dest: Variable,
        lhs: impl Into<Operand>,
        op: BinaryOperator,
        rhs: impl Into<Operand>,
    ) -> Self {
        Self::new(InstructionKind::BinaryOp {
            dest,
            lhs: lhs.into(),
            rhs: rhs.into(),
            op,
        })
    }

    pub fn unary(dest: Variable, op: UnaryOperator, arg: impl Into<Operand>) -> Self {
        Self::new(InstructionKind::UnaryOp {
            dest,
            arg: arg.into(),
            op,
        })
    }

    pub fn load(dest: Variable, address: Address) -> Self {
        Self::new(InstructionKind::Load { dest, address })
    }

    pub fn store(src: impl Into<Operand>, address: Address) -> Self {
        Self::new(InstructionKind::Store {
            src: src.into(),
            address,
        })
    }

    pub fn call(dest: Variable, name: impl Into<String>, args: Vec<Operand>) -> Self {
        Self::new(InstructionKind::Call {
            dest,
            name: name.into(),
            args,
        })
    }

    pub fn ret(value: Option<Operand>) -> Self {
        Self::new(InstructionKind::Return { value })
    }

    pub fn argument_load(dest: Variable, index: usize) -> Self {
        Self::new(InstructionKind::ArgumentLoad { dest, index })
    }

    pub fn argument_save(src: impl Into<Operand>, index: usize) -> Self {
        Self::new(InstructionKind::ArgumentSave {
            src: src.into(),
            index,
        })
    }

    pub fn print(arg: impl Into<Operand>) -> Self {
        Self::new(InstructionKind::Print { arg: arg.into() })
    }

    pub fn input(dest: Variable) -> Self {
        Self::new(InstructionKind::Input { dest })
    }

    pub fn kind(&self) -> &InstructionKind {
        &self.kind
    }

    pub fn defined(&self) -> &LiveSet {
        &self.defined
    }

    pub fn used(&self) -> &LiveSet {
        &self.used
    }

    pub fn live_in(&self) -> &LiveSet {
        &self.live_in
    }

    pub fn live_out(&self) -> &LiveSet {
        &self.live_out
    }

    /// Rebuilds `defined` and `used` from the operands.
    fn refresh_sets(&mut self) {
        self.defined = self
            .kind
            .def()
            .filter(|v| !v.is_pseudo())
            .cloned()
            .into_iter()
            .collect();
        self.used = self
            .kind
            .uses()
            .into_iter()
            .filter(|v| !v.is_pseudo())
            .cloned()
            .collect();
    }

    pub fn rename_used(&mut self, old: &Variable, new: Variable) -> Result<(), Error> {
        if !self.used.contains(old) {
            return Err(Error::RenameMissing {
                old: old.clone(),
                role: "used",
                instruction: self.to_string(),
            });
        }
        for slot in self.kind.use_slots() {
            slot.rename(old, &new);
        }
        self.refresh_sets();
        Ok(())
    }

    pub fn rename_defined(&mut self, old: &Variable, new: Variable) -> Result<(), Error> {
        if !self.defined.contains(old) {
            return Err(Error::RenameMissing {
                old: old.clone(),
                role: "defined",
                instruction: self.to_string(),
            });
        }
        if let Some(dest) = self.kind.def_mut() {
            *dest = new;
        }
        self.refresh_sets();
        Ok(())
    }

    /// Moves constant operands of a binary operation into fresh temporaries.
    /// Returns the assignments that must run right before this instruction.
    pub fn hoist_binary_constants(&mut self, names: &mut NameGen) -> Vec<Instruction> {
        let mut hoisted = Vec::new();
        if let InstructionKind::BinaryOp { lhs, rhs, .. } = &mut self.kind {
            for operand in [lhs, rhs] {
                if let Operand::Constant(n) = *operand {
                    let temp = names.new_var();
                    hoisted.push(Instruction::assign(temp.clone(), n));
                    *operand = Operand::Variable(temp);
                }
            }
        }
        if !hoisted.is_empty() {
            self.refresh_sets();
        }
        hoisted
    }

    /// Applies one step of the dataflow equations given the union of the
    /// successors' live-in sets. Returns whether either set changed.
    pub(crate) fn update_liveness(&mut self, live_out: LiveSet) -> bool {
        let live_in: LiveSet = self
            .used
            .union(&(&live_out - &self.defined))
            .cloned()
            .collect();
        let changed = live_in != self.live_in || live_out != self.live_out;
        self.live_in = live_in;
        self.live_out = live_out;
        changed
    }

    pub(crate) fn clear_liveness(&mut self) {
        self.live_in.clear();
        self.live_out.clear();
    }

    pub(crate) fn set_register_map(&mut self, register_map: Rc<RegisterMap>) {
        self.register_map = Some(register_map);
    }

    pub fn register_map(&self) -> Option<&RegisterMap> {
        self.register_map.as_deref()
    }

    /// Physical register of `variable` once allocation has run.
    pub fn register(&self, variable: &Variable) -> Option<Register> {
        self.register_map.as_ref()?.get(variable)
    }

    /// Bytes of stack the enclosing function reserves for spills.
    pub fn frame_size(&self) -> u32 {
        self.register_map
            .as_ref()
            .map_or(0, |register_map| register_map.frame_size())
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use InstructionKind::*;
        match &self.kind {
            Assign { dest, src } => write!(f, "{} = {}", dest, src),
            BinaryOp { dest, lhs, rhs, op } => write!(f, "{} = {} {} {}", dest, lhs, op, rhs),
            UnaryOp { dest, arg, op } => write!(f, "{} = {} {}", dest, op, arg),
            Load { dest, address } => write!(f, "{} = {}", dest, address),
            Store { src, address } => write!(f, "{} = {}", address, src),
            If {
                condition,
                else_block,
                ..
            } => {
                let else_part = if else_block.is_some() { "else..." } else { "" };
                write!(f, "if {} then...{}", condition, else_part)
            }
            While { condition, .. } => write!(f, "while {} do...", condition),
            For { condition, .. } => write!(f, "for... {}", condition),
            DoWhile { condition, .. } => write!(f, "do...while {}", condition),
            Call { dest, name, args } => {
                write!(f, "{} = {}({})", dest, name, args.iter().join(", "))
            }
            Return { value: Some(value) } => write!(f, "return {}", value),
            Return { value: None } => write!(f, "return"),
            ArgumentLoad { dest, index } => write!(f, "{} = arg{}", dest, index),
            ArgumentSave { src, index } => write!(f, "arg{} = {}", index, src),
            FunctionDeclare { name, .. } => write!(f, "function: {}", name),
            Print { arg } => write!(f, "print({})", arg),
            Input { dest } => write!(f, "{} = input()", dest),
            AllocMemory { dest, length } => write!(f, "{} = AllocMemory({})", dest, length),
            BoundCheck { base, elem } => write!(f, "array_bound_check({}, {})", base, elem),
        }
    }
}
