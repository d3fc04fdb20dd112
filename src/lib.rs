pub mod analysis;
pub mod cli;
pub mod path_expression;
pub mod program;
pub mod solver;
pub mod visualizer;
