use std::fmt::{self, Debug, Display, Formatter};
use std::rc::Rc;
use std::str::FromStr;

use hashbrown::HashMap;
use indexmap::IndexMap;
use smallvec::{smallvec, SmallVec};

mod icfg;
mod parser;
#[cfg(test)]
mod tests;

pub use icfg::{Icfg, Reversed};

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Method(Rc<str>);

impl Method {
    pub fn new(name: &str) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Class declaring this method, for names of the form `Type.name`.
    pub fn declaring_type(&self) -> Option<Type> {
        self.0.split_once('.').map(|(ty, _)| Type::new(ty))
    }

    pub fn simple_name(&self) -> &str {
        self.0.split_once('.').map_or(&*self.0, |(_, name)| name)
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Debug for Method {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        <Self as Display>::fmt(self, f)
    }
}

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Type(Rc<str>);

impl Type {
    pub fn new(name: &str) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Debug for Type {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        <Self as Display>::fmt(self, f)
    }
}

/// Heap field label. `Epsilon` is the empty access path.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Named(Rc<str>),
    Epsilon,
}

impl Field {
    pub fn new(name: &str) -> Self {
        Self::Named(name.into())
    }

    pub fn epsilon() -> Self {
        Self::Epsilon
    }

    pub fn is_epsilon(&self) -> bool {
        matches!(self, Self::Epsilon)
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{name}"),
            Self::Epsilon => write!(f, "ε"),
        }
    }
}

impl Debug for Field {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        <Self as Display>::fmt(self, f)
    }
}

/// A local variable of a method.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value {
    pub name: Rc<str>,
    pub method: Method,
}

impl Value {
    pub fn new(name: &str, method: &Method) -> Self {
        Self {
            name: name.into(),
            method: method.clone(),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.method)
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        <Self as Display>::fmt(self, f)
    }
}

/// Program point. A statement without index is a synthetic boundary point
/// that carries no instruction.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Statement {
    pub method: Method,
    pub index: Option<usize>,
}

impl Statement {
    pub fn new(method: &Method, index: usize) -> Self {
        Self {
            method: method.clone(),
            index: Some(index),
        }
    }

    pub fn synthetic(method: &Method) -> Self {
        Self {
            method: method.clone(),
            index: None,
        }
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}[{index}]", self.method),
            None => write!(f, "{}[-]", self.method),
        }
    }
}

impl Debug for Statement {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        <Self as Display>::fmt(self, f)
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Callee {
    Static(Method),
    /// Dispatched on the first argument
    Virtual(Rc<str>),
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Instruction {
    New {
        dest: Value,
        ty: Type,
    },
    Null {
        dest: Value,
    },
    Assign {
        dest: Value,
        value: Value,
    },
    Store {
        base: Value,
        field: Field,
        value: Value,
    },
    Load {
        dest: Value,
        base: Value,
        field: Field,
    },
    Call {
        dest: Option<Value>,
        callee: Callee,
        args: Vec<Value>,
    },
    Return {
        value: Option<Value>,
    },
    Nop,
}

impl Instruction {
    /// Variable written by this instruction, if any.
    pub fn defined_value(&self) -> Option<&Value> {
        match self {
            Self::New { dest, .. }
            | Self::Null { dest }
            | Self::Assign { dest, .. }
            | Self::Load { dest, .. } => Some(dest),
            Self::Call { dest, .. } => dest.as_ref(),
            _ => None,
        }
    }

    pub fn is_allocation(&self) -> bool {
        matches!(self, Self::New { .. } | Self::Null { .. })
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::New { dest, ty } => write!(f, "{} = new {ty}", dest.name),
            Self::Null { dest } => write!(f, "{} = null", dest.name),
            Self::Assign { dest, value } => write!(f, "{} = {}", dest.name, value.name),
            Self::Store { base, field, value } => {
                write!(f, "{}.{field} = {}", base.name, value.name)
            }
            Self::Load { dest, base, field } => {
                write!(f, "{} = {}.{field}", dest.name, base.name)
            }
            Self::Call { dest, callee, args } => {
                if let Some(dest) = dest {
                    write!(f, "{} = ", dest.name)?;
                }
                let names: Vec<&str> = args.iter().map(|a| &*a.name).collect();
                match callee {
                    Callee::Static(method) => write!(f, "call {method}({})", names.join(", ")),
                    Callee::Virtual(name) => match names.split_first() {
                        Some((receiver, rest)) => {
                            write!(f, "vcall {receiver}.{name}({})", rest.join(", "))
                        }
                        None => write!(f, "vcall ?.{name}()"),
                    },
                }
            }
            Self::Return { value: Some(value) } => write!(f, "return {}", value.name),
            Self::Return { value: None } => write!(f, "return"),
            Self::Nop => write!(f, "nop"),
        }
    }
}

/// How control leaves a parsed line.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Jump {
    Next,
    Goto(Rc<str>),
    Branch(Rc<str>),
}

#[derive(Clone, Debug)]
pub struct Line {
    pub label: Option<Rc<str>>,
    pub instruction: Instruction,
    pub jump: Jump,
}

pub struct MethodBody {
    pub method: Method,
    pub parameters: Vec<Value>,
    pub instructions: Vec<Instruction>,
    successors: Vec<SmallVec<[usize; 2]>>,
    predecessors: Vec<SmallVec<[usize; 2]>>,
    labels: IndexMap<Rc<str>, usize>,
}

impl MethodBody {
    /// Builds the control-flow graph of a method. Index 0 is an entry `nop`
    /// and a `return` is appended when the last line falls through.
    pub fn new(method: Method, parameters: Vec<Value>, lines: Vec<Line>) -> Result<Self, String> {
        let mut instructions = vec![Instruction::Nop];
        let mut jumps = vec![Jump::Next];
        let mut labels = IndexMap::new();
        labels.insert(Rc::from("entry"), 0);

        for line in lines {
            if let Some(label) = line.label {
                if labels.insert(label.clone(), instructions.len()).is_some() {
                    return Err(format!("Duplicate label '{label}' in method {method}"));
                }
            }
            instructions.push(line.instruction);
            jumps.push(line.jump);
        }

        let falls_through = !matches!(instructions.last(), Some(Instruction::Return { .. }))
            && !matches!(jumps.last(), Some(Jump::Goto(_)));
        if falls_through {
            instructions.push(Instruction::Return { value: None });
            jumps.push(Jump::Next);
        }

        let lookup = |label: &Rc<str>| {
            labels
                .get(label)
                .copied()
                .ok_or_else(|| format!("Unknown label '{label}' in method {method}"))
        };

        let mut successors = Vec::with_capacity(instructions.len());
        for (i, (instr, jump)) in instructions.iter().zip(&jumps).enumerate() {
            let succs: SmallVec<[usize; 2]> = match (instr, jump) {
                (Instruction::Return { .. }, _) => SmallVec::new(),
                (_, Jump::Next) => smallvec![i + 1],
                (_, Jump::Goto(label)) => smallvec![lookup(label)?],
                (_, Jump::Branch(label)) => {
                    let target = lookup(label)?;
                    if target == i + 1 {
                        smallvec![i + 1]
                    } else {
                        smallvec![i + 1, target]
                    }
                }
            };
            successors.push(succs);
        }

        let mut predecessors = vec![SmallVec::new(); instructions.len()];
        for (i, succs) in successors.iter().enumerate() {
            for &s in succs {
                predecessors[s].push(i);
            }
        }

        Ok(Self {
            method,
            parameters,
            instructions,
            successors,
            predecessors,
            labels,
        })
    }

    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.labels.get(label).copied()
    }

    pub fn label_of(&self, index: usize) -> Option<&str> {
        // Later labels win so that user labels shadow the implicit entry label
        self.labels
            .iter()
            .rev()
            .find(|(_, i)| **i == index)
            .map(|(label, _)| &**label)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// A whole program: method bodies plus a precomputed call graph.
pub struct Program {
    methods: IndexMap<Method, MethodBody>,
    callers: HashMap<Method, Vec<Statement>>,
}

impl Program {
    pub fn new(bodies: Vec<MethodBody>) -> Result<Self, String> {
        let mut methods = IndexMap::new();
        for body in bodies {
            let method = body.method.clone();
            if methods.insert(method.clone(), body).is_some() {
                return Err(format!("Duplicate method {method}"));
            }
        }

        let mut program = Self {
            methods,
            callers: HashMap::new(),
        };

        let mut callers: HashMap<Method, Vec<Statement>> = HashMap::new();
        for body in program.methods.values() {
            for (i, instr) in body.instructions.iter().enumerate() {
                if let Instruction::Call { callee, .. } = instr {
                    for target in program.resolve(callee) {
                        callers
                            .entry(target)
                            .or_default()
                            .push(Statement::new(&body.method, i));
                    }
                }
            }
        }
        program.callers = callers;

        Ok(program)
    }

    fn resolve(&self, callee: &Callee) -> Vec<Method> {
        match callee {
            Callee::Static(method) => self
                .methods
                .contains_key(method)
                .then(|| method.clone())
                .into_iter()
                .collect(),
            Callee::Virtual(name) => self
                .methods
                .keys()
                .filter(|m| m.declaring_type().is_some() && m.simple_name() == &**name)
                .cloned()
                .collect(),
        }
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodBody> {
        self.methods.values()
    }

    pub fn body(&self, method: &Method) -> Option<&MethodBody> {
        self.methods.get(method)
    }

    /// Looks up the statement carrying `label` in `method`.
    pub fn statement(&self, method: &str, label: &str) -> Option<Statement> {
        let method = Method::new(method);
        let index = self.methods.get(&method)?.label_index(label)?;
        Some(Statement::new(&method, index))
    }

    pub fn value(&self, method: &str, name: &str) -> Value {
        Value::new(name, &Method::new(method))
    }

    /// Renders a statement as `method:label` when it is labelled.
    pub fn describe(&self, stmt: &Statement) -> String {
        stmt.index
            .and_then(|i| Some((i, self.methods.get(&stmt.method)?)))
            .and_then(|(i, body)| body.label_of(i))
            .map_or_else(|| stmt.to_string(), |label| format!("{}:{label}", stmt.method))
    }

    fn indices(&self, stmt: &Statement) -> Option<(&MethodBody, usize)> {
        let body = self.methods.get(&stmt.method)?;
        let index = stmt.index?;
        (index < body.len()).then_some((body, index))
    }
}

impl FromStr for Program {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parser::parse_program(s)
    }
}

impl Icfg for Program {
    fn successors_of(&self, stmt: &Statement) -> Vec<Statement> {
        self.indices(stmt).map_or_else(Vec::new, |(body, i)| {
            body.successors[i]
                .iter()
                .map(|&s| Statement::new(&body.method, s))
                .collect()
        })
    }

    fn predecessors_of(&self, stmt: &Statement) -> Vec<Statement> {
        self.indices(stmt).map_or_else(Vec::new, |(body, i)| {
            body.predecessors[i]
                .iter()
                .map(|&s| Statement::new(&body.method, s))
                .collect()
        })
    }

    fn method_of(&self, stmt: &Statement) -> Method {
        stmt.method.clone()
    }

    fn instruction_at(&self, stmt: &Statement) -> Option<&Instruction> {
        self.indices(stmt).map(|(body, i)| &body.instructions[i])
    }

    fn start_points_of(&self, method: &Method) -> Vec<Statement> {
        match self.methods.get(method) {
            Some(body) if !body.is_empty() => vec![Statement::new(method, 0)],
            _ => vec![],
        }
    }

    fn end_points_of(&self, method: &Method) -> Vec<Statement> {
        self.methods.get(method).map_or_else(Vec::new, |body| {
            body.instructions
                .iter()
                .enumerate()
                .filter(|(_, instr)| matches!(instr, Instruction::Return { .. }))
                .map(|(i, _)| Statement::new(method, i))
                .collect()
        })
    }

    fn callees_of(&self, call_site: &Statement) -> Vec<Method> {
        match self.instruction_at(call_site) {
            Some(Instruction::Call { callee, .. }) => self.resolve(callee),
            _ => vec![],
        }
    }

    fn callers_of(&self, method: &Method) -> Vec<Statement> {
        self.callers.get(method).cloned().unwrap_or_default()
    }

    fn parameters_of(&self, method: &Method) -> Vec<Value> {
        self.methods
            .get(method)
            .map_or_else(Vec::new, |body| body.parameters.clone())
    }
}
