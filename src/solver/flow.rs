use log::warn;

use super::{Direction, Node, SolverEvent, SyncSolver};
use crate::program::{Callee, Field, Instruction, Method, Statement, Value};

/// Effect of a flow edge on the field stack.
#[derive(Clone, PartialEq, Eq, Debug)]
pub(super) enum FieldOp {
    Normal,
    Push(Field),
    Pop(Field),
}

/// Effect of a flow edge on the call stack.
#[derive(Clone, PartialEq, Eq, Debug)]
pub(super) enum CallOp {
    Normal,
    /// Enter a callee frame from `call_site`
    Push { call_site: Statement },
    /// Leave the current frame towards `call_site`
    Exit { call_site: Statement },
}

#[derive(Clone, Debug)]
pub(super) struct Rule {
    pub to: Node,
    pub field: FieldOp,
    pub call: CallOp,
}

impl Rule {
    fn normal(to: Node, field: FieldOp) -> Self {
        Self {
            to,
            field,
            call: CallOp::Normal,
        }
    }
}

impl SyncSolver {
    /// Computes the flow edges leaving `node`. Called once per node, when it
    /// is first reached in the call automaton.
    pub(super) fn compute_rules(&mut self, node: &Node) -> Vec<Rule> {
        let icfg = self.icfg.clone();
        let Some(instruction) = icfg.instruction_at(&node.stmt).cloned() else {
            return vec![];
        };

        let mut kept: Vec<(Value, FieldOp)> = vec![];
        let mut rules = vec![];
        match self.direction {
            Direction::Forward => self.forward_flow(node, &instruction, &mut kept, &mut rules),
            Direction::Backward => self.backward_flow(node, &instruction, &mut kept, &mut rules),
        }

        if icfg.is_end_point(&node.stmt) {
            for (value, op) in kept {
                let exits = self.exit_rules(node, &instruction, &value, &op);
                rules.extend(exits);
            }
        } else {
            for succ in icfg.successors_of(&node.stmt) {
                for (value, op) in &kept {
                    rules.push(Rule::normal(
                        Node::new(succ.clone(), value.clone()),
                        op.clone(),
                    ));
                }
            }
        }
        rules
    }

    fn forward_flow(
        &mut self,
        node: &Node,
        instruction: &Instruction,
        kept: &mut Vec<(Value, FieldOp)>,
        rules: &mut Vec<Rule>,
    ) {
        let v = &node.value;
        match instruction {
            Instruction::New { dest, .. } | Instruction::Null { dest } => {
                if v != dest {
                    kept.push((v.clone(), FieldOp::Normal));
                }
            }
            Instruction::Assign { dest, value } => {
                if v == value {
                    kept.push((dest.clone(), FieldOp::Normal));
                }
                if v != dest {
                    kept.push((v.clone(), FieldOp::Normal));
                }
            }
            Instruction::Store { base, field, value } => {
                kept.push((v.clone(), FieldOp::Normal));
                if v == value {
                    kept.push((base.clone(), FieldOp::Push(field.clone())));
                }
            }
            Instruction::Load { dest, base, field } => {
                if v == base {
                    kept.push((dest.clone(), FieldOp::Pop(field.clone())));
                }
                if v != dest {
                    kept.push((v.clone(), FieldOp::Normal));
                }
            }
            Instruction::Call { dest, callee, args } => {
                let callees = self.resolve_callees(&node.stmt, callee);
                if callees.is_empty() {
                    warn!("No reachable callee at {}, {v} flows around it", node.stmt);
                } else {
                    for (i, _) in args.iter().enumerate().filter(|(_, arg)| *arg == v) {
                        self.enter_parameter(node, &callees, i, rules);
                    }
                }

                if dest.as_ref() == Some(v) {
                    return;
                }
                kept.push((v.clone(), FieldOp::Normal));
                if !callees.is_empty() && !args.contains(v) {
                    for return_site in self.icfg.successors_of(&node.stmt) {
                        self.emit_once(SolverEvent::CallBypass {
                            call_site: node.stmt.clone(),
                            return_site,
                            value: v.clone(),
                        });
                    }
                }
            }
            Instruction::Return { .. } | Instruction::Nop => {
                kept.push((v.clone(), FieldOp::Normal));
            }
        }
    }

    fn backward_flow(
        &mut self,
        node: &Node,
        instruction: &Instruction,
        kept: &mut Vec<(Value, FieldOp)>,
        rules: &mut Vec<Rule>,
    ) {
        let v = &node.value;
        match instruction {
            Instruction::New { dest, .. } | Instruction::Null { dest } => {
                if v != dest {
                    kept.push((v.clone(), FieldOp::Normal));
                }
            }
            Instruction::Assign { dest, value } => {
                if v == dest {
                    kept.push((value.clone(), FieldOp::Normal));
                } else {
                    kept.push((v.clone(), FieldOp::Normal));
                }
            }
            Instruction::Load { dest, base, field } => {
                if v == dest {
                    kept.push((base.clone(), FieldOp::Push(field.clone())));
                } else {
                    kept.push((v.clone(), FieldOp::Normal));
                }
            }
            Instruction::Store { base, field, value } => {
                kept.push((v.clone(), FieldOp::Normal));
                if v == base {
                    kept.push((value.clone(), FieldOp::Pop(field.clone())));
                }
            }
            Instruction::Call { dest, callee, args } => {
                let callees = self.resolve_callees(&node.stmt, callee);
                if dest.as_ref() == Some(v) {
                    if callees.is_empty() {
                        warn!("No reachable callee defines {v} at {}", node.stmt);
                    }
                    for method in &callees {
                        for ret in self.icfg.start_points_of(method) {
                            if let Some(Instruction::Return {
                                value: Some(returned),
                            }) = self.icfg.instruction_at(&ret)
                            {
                                rules.push(Rule {
                                    to: Node::new(ret.clone(), returned.clone()),
                                    field: FieldOp::Normal,
                                    call: CallOp::Push {
                                        call_site: node.stmt.clone(),
                                    },
                                });
                            }
                        }
                    }
                    return;
                }
                for (i, _) in args.iter().enumerate().filter(|(_, arg)| *arg == v) {
                    self.enter_parameter(node, &callees, i, rules);
                }
                kept.push((v.clone(), FieldOp::Normal));
            }
            Instruction::Return { .. } | Instruction::Nop => {
                kept.push((v.clone(), FieldOp::Normal));
            }
        }
    }

    /// Maps argument `index` of the call at `node` onto the callee parameters.
    fn enter_parameter(&self, node: &Node, callees: &[Method], index: usize, rules: &mut Vec<Rule>) {
        for method in callees {
            let Some(parameter) = self.icfg.parameters_of(method).get(index).cloned() else {
                continue;
            };
            for start in self.icfg.start_points_of(method) {
                rules.push(Rule {
                    to: Node::new(start, parameter.clone()),
                    field: FieldOp::Normal,
                    call: CallOp::Push {
                        call_site: node.stmt.clone(),
                    },
                });
            }
        }
    }

    /// Flow from an end point of a method back into every caller.
    fn exit_rules(
        &mut self,
        node: &Node,
        instruction: &Instruction,
        value: &Value,
        op: &FieldOp,
    ) -> Vec<Rule> {
        let method = self.icfg.method_of(&node.stmt);
        let parameter = self
            .icfg
            .parameters_of(&method)
            .iter()
            .position(|p| p == value);
        let returned = self.direction == Direction::Forward
            && matches!(instruction, Instruction::Return { value: Some(rv) } if rv == value);

        let mut rules = vec![];
        for call_site in self.icfg.callers_of(&method) {
            let Some(Instruction::Call { dest, args, .. }) = self.icfg.instruction_at(&call_site)
            else {
                continue;
            };
            let mut mapped = vec![];
            if returned {
                mapped.extend(dest.clone());
            }
            if let Some(arg) = parameter.and_then(|i| args.get(i)) {
                mapped.push(arg.clone());
            }
            for return_site in self.icfg.successors_of(&call_site) {
                for value in &mapped {
                    rules.push(Rule {
                        to: Node::new(return_site.clone(), value.clone()),
                        field: op.clone(),
                        call: CallOp::Exit {
                            call_site: call_site.clone(),
                        },
                    });
                }
            }
        }

        if self.direction == Direction::Forward {
            for rule in &rules {
                if let CallOp::Exit { call_site } = &rule.call {
                    self.emit_once(SolverEvent::ReturnFromCall {
                        call_site: call_site.clone(),
                        return_site: rule.to.stmt.clone(),
                        node: rule.to.clone(),
                    });
                }
            }
        }
        rules
    }

    /// Virtual calls only dispatch to classes known to be allocated.
    pub(super) fn resolve_callees(&self, call_site: &Statement, callee: &Callee) -> Vec<Method> {
        let callees = self.icfg.callees_of(call_site);
        match callee {
            Callee::Static(_) => callees,
            Callee::Virtual(_) => callees
                .into_iter()
                .filter(|m| {
                    m.declaring_type()
                        .map_or(true, |ty| self.allocated_types.contains(&ty))
                })
                .collect(),
        }
    }
}
