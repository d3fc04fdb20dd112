use std::rc::Rc;

use super::{Callee, Field, Icfg, Instruction, Method, Program, Reversed, Statement, Type, Value};

const SOURCE: &str = "
# allocation, branch and call
method main() {
    x = new A
    y = null
  head:
    if * goto done
    x.f = y
    y = x.f
    goto head
  done:
    r = call id(x)
    vcall r.touch()
}

method id(p) {
    return p
}

method A.touch(this) {
    t = this.f
}
";

fn program() -> Program {
    SOURCE.parse().unwrap_or_else(|err| panic!("{err}"))
}

fn stmt(p: &Program, method: &str, label: &str) -> Statement {
    p.statement(method, label)
        .unwrap_or_else(|| panic!("No statement {method}:{label}"))
}

#[test]
fn entry_nop_and_implicit_return() {
    let p = program();
    let main = p.body(&Method::new("main")).unwrap();
    assert_eq!(main.instructions.first(), Some(&Instruction::Nop));
    assert_eq!(
        main.instructions.last(),
        Some(&Instruction::Return { value: None })
    );
    let id = p.body(&Method::new("id")).unwrap();
    assert_eq!(id.len(), 2);
}

#[test]
fn instructions_are_parsed() {
    let p = program();
    let m = Method::new("main");
    let x = Value::new("x", &m);
    let y = Value::new("y", &m);
    assert_eq!(
        p.instruction_at(&Statement::new(&m, 1)),
        Some(&Instruction::New {
            dest: x.clone(),
            ty: Type::new("A")
        })
    );
    assert_eq!(
        p.instruction_at(&Statement::new(&m, 4)),
        Some(&Instruction::Store {
            base: x.clone(),
            field: Field::new("f"),
            value: y.clone()
        })
    );
    assert_eq!(
        p.instruction_at(&Statement::new(&m, 5)),
        Some(&Instruction::Load {
            dest: y,
            base: x.clone(),
            field: Field::new("f")
        })
    );
    assert_eq!(
        p.instruction_at(&stmt(&p, "main", "done")),
        Some(&Instruction::Call {
            dest: Some(Value::new("r", &m)),
            callee: Callee::Static(Method::new("id")),
            args: vec![x]
        })
    );
}

#[test]
fn branches_and_loops() {
    let p = program();
    let m = Method::new("main");
    let head = stmt(&p, "main", "head");
    let done = stmt(&p, "main", "done");
    assert_eq!(
        p.successors_of(&head),
        vec![Statement::new(&m, 4), done.clone()]
    );
    let goto = Statement::new(&m, 6);
    assert_eq!(p.successors_of(&goto), vec![head.clone()]);
    assert_eq!(
        p.predecessors_of(&head),
        vec![Statement::new(&m, 2), goto]
    );
}

#[test]
fn reversed_view_swaps_directions() {
    let p = Rc::new(program());
    let reversed = Reversed::new(p.clone());
    let m = Method::new("main");
    let head = stmt(&p, "main", "head");
    assert_eq!(reversed.successors_of(&head), p.predecessors_of(&head));
    assert_eq!(reversed.start_points_of(&m), p.end_points_of(&m));
    assert_eq!(reversed.end_points_of(&m), vec![Statement::new(&m, 0)]);
    assert!(reversed.is_end_point(&Statement::new(&m, 0)));
}

#[test]
fn call_graph() {
    let p = program();
    let done = stmt(&p, "main", "done");
    assert_eq!(p.callees_of(&done), vec![Method::new("id")]);
    assert_eq!(p.callers_of(&Method::new("id")), vec![done.clone()]);

    let touch = Method::new("A.touch");
    let virtual_call = p.successors_of(&done)[0].clone();
    assert_eq!(p.callees_of(&virtual_call), vec![touch.clone()]);
    assert_eq!(p.callers_of(&touch), vec![virtual_call]);
    assert_eq!(touch.declaring_type(), Some(Type::new("A")));
    assert_eq!(touch.simple_name(), "touch");
    assert_eq!(
        p.parameters_of(&touch),
        vec![Value::new("this", &touch)]
    );
}

#[test]
fn synthetic_statements_have_no_edges() {
    let p = program();
    let synthetic = Statement::synthetic(&Method::new("main"));
    assert!(p.instruction_at(&synthetic).is_none());
    assert!(p.successors_of(&synthetic).is_empty());
    assert!(p.predecessors_of(&synthetic).is_empty());
}

#[test]
fn describe_uses_labels() {
    let p = program();
    assert_eq!(p.describe(&stmt(&p, "main", "head")), "main:head");
    assert_eq!(p.describe(&Statement::new(&Method::new("main"), 1)), "main[1]");
}

#[test]
fn parse_errors_carry_line_numbers() {
    let unknown_label = "method main() {\n  goto nowhere\n}";
    let err = unknown_label.parse::<Program>().err().unwrap();
    assert!(err.contains("nowhere"), "{err}");

    let bad_statement = "method main() {\n  x = \n}";
    let err = bad_statement.parse::<Program>().err().unwrap();
    assert!(err.starts_with("line 2"), "{err}");

    let unclosed = "method main() {\n  nop\n";
    assert!(unclosed.parse::<Program>().is_err());

    let keyword = "method main() {\n  new = null\n}";
    assert!(keyword.parse::<Program>().is_err());
}
