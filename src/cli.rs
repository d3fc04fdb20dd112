use std::fmt::Display;
use std::str::FromStr;

use clap::Parser;
use clap::ValueEnum;

use crate::analysis::{ReadBaseRule, WitnessPolicy};
use crate::program::Program;
use crate::solver::Node;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the program file
    pub file_path: String,
    /// Backward queries, as METHOD:LABEL:VALUE
    #[arg(short, long)]
    pub backward: Vec<QuerySpec>,
    /// Forward queries from allocation sites, as METHOD:LABEL:VALUE
    #[arg(short, long)]
    pub forward: Vec<QuerySpec>,
    #[arg(short, long, default_value_t = WitnessPolicyArg::Ignore)]
    pub witness_policy: WitnessPolicyArg,
    /// When a forward query counts as the base allocation of a field read
    #[arg(short, long, default_value_t = ReadBaseArg::SeedTransition)]
    pub read_base: ReadBaseArg,
    /// Print the access paths of every reached node
    #[arg(short, long, default_value_t = false)]
    pub paths: bool,
    /// Visualize the field automata after solving (creates a Graphviz DOT file at given path)
    #[arg(short = 'g', long)]
    pub visualize: Option<String>,
    /// Dump every automaton at debug level
    #[arg(short, long, default_value_t = false)]
    pub debug: bool,
    /// Don't print warnings
    #[arg(short = 'q', long, default_value_t = false)]
    pub quiet: bool,
    /// Increase log verbosity
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// `METHOD:LABEL:VALUE`, a value next to a labelled statement.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct QuerySpec {
    pub method: String,
    pub label: String,
    pub value: String,
}

impl QuerySpec {
    pub fn resolve(&self, program: &Program) -> Result<Node, String> {
        let stmt = program
            .statement(&self.method, &self.label)
            .ok_or_else(|| format!("No statement labelled {}:{}", self.method, self.label))?;
        Ok(Node::new(stmt, program.value(&self.method, &self.value)))
    }
}

impl FromStr for QuerySpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split(':').collect::<Vec<_>>()[..] {
            [method, label, value] if [method, label, value].iter().all(|p| !p.is_empty()) => {
                Ok(Self {
                    method: method.to_string(),
                    label: label.to_string(),
                    value: value.to_string(),
                })
            }
            _ => Err(format!("Expected METHOD:LABEL:VALUE, found '{s}'")),
        }
    }
}

impl Display for QuerySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.method, self.label, self.value)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum WitnessPolicyArg {
    /// Drop witnesses of internal backward queries
    Ignore,
    /// Keep them in the witness set
    Record,
}

impl Display for WitnessPolicyArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WitnessPolicyArg::Ignore => write!(f, "ignore"),
            WitnessPolicyArg::Record => write!(f, "record"),
        }
    }
}

impl From<WitnessPolicyArg> for WitnessPolicy {
    fn from(arg: WitnessPolicyArg) -> Self {
        match arg {
            WitnessPolicyArg::Ignore => WitnessPolicy::Ignore,
            WitnessPolicyArg::Record => WitnessPolicy::Record,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum ReadBaseArg {
    /// Any transition into the seed
    SeedTransition,
    /// Only epsilon transitions into the seed
    EmptyField,
}

impl Display for ReadBaseArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadBaseArg::SeedTransition => write!(f, "seed-transition"),
            ReadBaseArg::EmptyField => write!(f, "empty-field"),
        }
    }
}

impl From<ReadBaseArg> for ReadBaseRule {
    fn from(arg: ReadBaseArg) -> Self {
        match arg {
            ReadBaseArg::SeedTransition => ReadBaseRule::SeedTransition,
            ReadBaseArg::EmptyField => ReadBaseRule::EmptyFieldOnly,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Args, QuerySpec, ReadBaseArg, WitnessPolicyArg};

    #[test]
    fn query_specs_need_three_parts() {
        let spec: QuerySpec = "main:end:r".parse().unwrap();
        assert_eq!(spec.to_string(), "main:end:r");
        assert!("main:end".parse::<QuerySpec>().is_err());
        assert!("main::r".parse::<QuerySpec>().is_err());
    }

    #[test]
    fn arguments_parse() {
        let args = Args::parse_from([
            "demand-alias",
            "prog.ir",
            "-b",
            "main:end:r",
            "--forward",
            "main:a1:o",
            "--read-base",
            "empty-field",
            "-vv",
        ]);
        assert_eq!(args.backward.len(), 1);
        assert_eq!(args.forward[0].label, "a1");
        assert_eq!(args.read_base, ReadBaseArg::EmptyField);
        assert_eq!(args.witness_policy, WitnessPolicyArg::Ignore);
        assert_eq!(args.verbose, 2);
    }
}
