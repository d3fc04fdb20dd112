use std::fs;
use std::io;
use std::rc::Rc;

use clap::Parser;
use log::info;

use demand_alias::analysis::{AliasAnalysis, Config, Query};
use demand_alias::cli::Args;
use demand_alias::program::Program;
use demand_alias::solver::Node;
use demand_alias::visualizer;

fn describe(program: &Program, node: &Node) -> String {
    format!("{}:{}", program.describe(&node.stmt), node.value.name)
}

fn invalid(err: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, err)
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    stderrlog::new()
        .module(module_path!())
        .module("demand_alias")
        .quiet(args.quiet)
        .verbosity(args.verbose as usize + 1)
        .init()
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;

    let source = fs::read_to_string(&args.file_path)?;
    let program: Rc<Program> = Rc::new(source.parse().map_err(invalid)?);
    let config = Config {
        witness_policy: args.witness_policy.into(),
        read_base_rule: args.read_base.into(),
        debug: args.debug,
    };
    let mut analysis = AliasAnalysis::new(program.clone(), config);

    for spec in &args.backward {
        let query = Query::backward(spec.resolve(&program).map_err(invalid)?);
        analysis.solve(query.clone());
        let sites: Vec<String> = analysis
            .allocation_sites(&query)
            .iter()
            .map(|q| describe(&program, q.node()))
            .collect();
        println!("{spec} <- {}", sites.join(", "));
    }

    for spec in &args.forward {
        let query = Query::allocation(&program, spec.resolve(&program).map_err(invalid)?);
        analysis.solve(query.clone());
        let Some(solver) = analysis.solver(&query) else {
            continue;
        };
        let reached: Vec<String> = solver
            .reached_states()
            .iter()
            .map(|node| describe(&program, node))
            .collect();
        println!("{spec} -> {}", reached.join(", "));
        if args.paths {
            for node in solver.reached_states() {
                if let Some(path) = analysis.access_path(&query, node) {
                    println!("  {}: {path}", describe(&program, node));
                }
            }
        }
    }

    analysis.debug_output();
    info!("Statistics:\n{}", analysis.stats());

    if let Some(path) = &args.visualize {
        visualizer::visualize(&analysis, path)?;
    }

    Ok(())
}
