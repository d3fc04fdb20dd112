use std::fmt::Write;
use std::fs;
use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use demand_alias::analysis::{AliasAnalysis, Config, Query};
use demand_alias::program::Program;
use demand_alias::solver::Node;

fn parse(source: &str) -> Rc<Program> {
    Rc::new(source.parse().unwrap_or_else(|err| panic!("{err}")))
}

fn solve_backward(program: &Rc<Program>, node: &Node) -> usize {
    let mut analysis = AliasAnalysis::new(program.clone(), Config::default());
    let query = Query::backward(node.clone());
    analysis.solve(query.clone());
    analysis.allocation_sites(&query).len()
}

/// Backward queries at `main:end` of every fixture.
fn fixtures(c: &mut Criterion) {
    for entry in glob::glob("res/analysis/*/program.ir").unwrap() {
        let entry = entry.expect("Error in path");
        let name = entry
            .parent()
            .and_then(|f| f.file_name())
            .unwrap()
            .to_string_lossy()
            .to_string();
        let program = parse(&fs::read_to_string(&entry).expect("Error reading program"));
        let Some(end) = program.statement("main", "end") else {
            continue;
        };
        let values: Vec<Node> = ["r", "c", "a"]
            .iter()
            .map(|v| Node::new(end.clone(), program.value("main", v)))
            .collect();
        c.bench_function(&name, |b| {
            b.iter(|| {
                for node in &values {
                    black_box(solve_backward(&program, node));
                }
            })
        });
    }
}

/// A chain of `n` nodes built in a loop and read back through `next`.
fn field_loop_program(n: usize) -> String {
    let mut source = String::from("method main() {\n  a0: x = new N\n");
    for i in 0..n {
        writeln!(source, "  head{i}:\n    if * goto done{i}").unwrap();
        writeln!(source, "  n{i}: y = new N\n    y.next = x\n    x = y").unwrap();
        writeln!(source, "    goto head{i}\n  done{i}:\n    z = x.next").unwrap();
    }
    source.push_str("  end: nop\n}\n");
    source
}

fn field_loop(c: &mut Criterion) {
    let program = parse(&field_loop_program(20));
    let end = program.statement("main", "end").unwrap();
    let node = Node::new(end, program.value("main", "z"));
    c.bench_function("field loop", |b| {
        b.iter(|| black_box(solve_backward(&program, &node)))
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = fixtures,
    field_loop,
}
criterion_main!(benches);
