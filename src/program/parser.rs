use std::rc::Rc;

use hashbrown::HashSet;
use once_cell::sync::Lazy;

use super::{Callee, Field, Instruction, Jump, Line, Method, MethodBody, Program, Type, Value};

static KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "method", "new", "null", "call", "vcall", "return", "nop", "goto", "if", "entry",
    ]
    .into_iter()
    .collect()
});

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn variable(s: &str, method: &Method) -> Result<Value, String> {
    let s = s.trim();
    if !is_ident(s) || KEYWORDS.contains(s) {
        return Err(format!("Expected variable, found '{s}'"));
    }
    Ok(Value::new(s, method))
}

fn label(s: &str) -> Result<Rc<str>, String> {
    let s = s.trim();
    if !is_ident(s) || KEYWORDS.contains(s) {
        return Err(format!("Invalid label '{s}'"));
    }
    Ok(s.into())
}

/// Splits `a.b` into its two identifier halves.
fn dotted(s: &str) -> Option<(&str, &str)> {
    let (left, right) = s.trim().split_once('.')?;
    (is_ident(left.trim()) && is_ident(right.trim())).then(|| (left.trim(), right.trim()))
}

/// Parses `name(a, b)` into the name and argument list.
fn invocation(s: &str) -> Result<(&str, Vec<&str>), String> {
    let s = s.trim();
    let (name, rest) = s
        .split_once('(')
        .ok_or_else(|| format!("Expected '(' in '{s}'"))?;
    let args = rest
        .strip_suffix(')')
        .ok_or_else(|| format!("Expected ')' at the end of '{s}'"))?;
    let args = if args.trim().is_empty() {
        vec![]
    } else {
        args.split(',').map(str::trim).collect()
    };
    Ok((name.trim(), args))
}

fn call(rhs: &str, dest: Option<Value>, method: &Method) -> Result<Instruction, String> {
    if let Some(rest) = rhs.strip_prefix("vcall ") {
        let (target, args) = invocation(rest)?;
        let (receiver, name) =
            dotted(target).ok_or_else(|| format!("Expected 'receiver.method', found '{target}'"))?;
        let mut values = vec![variable(receiver, method)?];
        for arg in args {
            values.push(variable(arg, method)?);
        }
        return Ok(Instruction::Call {
            dest,
            callee: Callee::Virtual(name.into()),
            args: values,
        });
    }

    let rest = rhs
        .strip_prefix("call ")
        .ok_or_else(|| format!("Expected call, found '{rhs}'"))?;
    let (name, args) = invocation(rest)?;
    if name.is_empty() || !name.split('.').all(is_ident) {
        return Err(format!("Invalid method name '{name}'"));
    }
    Ok(Instruction::Call {
        dest,
        callee: Callee::Static(Method::new(name)),
        args: args
            .into_iter()
            .map(|arg| variable(arg, method))
            .collect::<Result<_, _>>()?,
    })
}

fn assignment(lhs: &str, rhs: &str, method: &Method) -> Result<Instruction, String> {
    if let Some((base, field)) = dotted(lhs) {
        return Ok(Instruction::Store {
            base: variable(base, method)?,
            field: Field::new(field),
            value: variable(rhs, method)?,
        });
    }

    let dest = variable(lhs, method)?;
    if let Some(ty) = rhs.strip_prefix("new ") {
        let ty = ty.trim();
        if !is_ident(ty) {
            return Err(format!("Invalid type '{ty}'"));
        }
        return Ok(Instruction::New {
            dest,
            ty: Type::new(ty),
        });
    }
    if rhs == "null" {
        return Ok(Instruction::Null { dest });
    }
    if rhs.starts_with("call ") || rhs.starts_with("vcall ") {
        return call(rhs, Some(dest), method);
    }
    if let Some((base, field)) = dotted(rhs) {
        return Ok(Instruction::Load {
            dest,
            base: variable(base, method)?,
            field: Field::new(field),
        });
    }
    Ok(Instruction::Assign {
        dest,
        value: variable(rhs, method)?,
    })
}

fn statement(text: &str, method: &Method) -> Result<(Instruction, Jump), String> {
    if text == "nop" {
        return Ok((Instruction::Nop, Jump::Next));
    }
    if text == "return" {
        return Ok((Instruction::Return { value: None }, Jump::Next));
    }
    if let Some(value) = text.strip_prefix("return ") {
        let value = Some(variable(value, method)?);
        return Ok((Instruction::Return { value }, Jump::Next));
    }
    if let Some(target) = text.strip_prefix("goto ") {
        return Ok((Instruction::Nop, Jump::Goto(label(target)?)));
    }
    if let Some(rest) = text.strip_prefix("if ") {
        let target = rest
            .trim()
            .strip_prefix('*')
            .and_then(|r| r.trim().strip_prefix("goto "))
            .ok_or_else(|| format!("Expected 'if * goto LABEL', found '{text}'"))?;
        return Ok((Instruction::Nop, Jump::Branch(label(target)?)));
    }
    if text.starts_with("call ") || text.starts_with("vcall ") {
        return Ok((call(text, None, method)?, Jump::Next));
    }
    match text.split_once('=') {
        Some((lhs, rhs)) => Ok((assignment(lhs.trim(), rhs.trim(), method)?, Jump::Next)),
        None => Err(format!("Unknown statement '{text}'")),
    }
}

fn method_header(text: &str) -> Result<(Method, Vec<Value>), String> {
    let rest = text
        .strip_prefix("method ")
        .and_then(|r| r.trim().strip_suffix('{'))
        .ok_or_else(|| format!("Expected 'method NAME(PARAMS) {{', found '{text}'"))?;
    let (name, params) = invocation(rest)?;
    if name.is_empty() || !name.split('.').all(is_ident) {
        return Err(format!("Invalid method name '{name}'"));
    }
    let method = Method::new(name);
    let params = params
        .into_iter()
        .map(|p| variable(p, &method))
        .collect::<Result<_, _>>()?;
    Ok((method, params))
}

struct OpenMethod {
    method: Method,
    parameters: Vec<Value>,
    lines: Vec<Line>,
    pending_label: Option<Rc<str>>,
}

pub(super) fn parse_program(source: &str) -> Result<Program, String> {
    let mut bodies = vec![];
    let mut current: Option<OpenMethod> = None;

    for (number, raw) in source.lines().enumerate() {
        let at = |err: String| format!("line {}: {err}", number + 1);
        let text = raw.split('#').next().unwrap_or("").trim();
        if text.is_empty() {
            continue;
        }

        let Some(open) = current.as_mut() else {
            let (method, parameters) = method_header(text).map_err(at)?;
            current = Some(OpenMethod {
                method,
                parameters,
                lines: vec![],
                pending_label: None,
            });
            continue;
        };

        if text == "}" {
            if let Some(open) = current.take() {
                let mut lines = open.lines;
                if let Some(label) = open.pending_label {
                    lines.push(Line {
                        label: Some(label),
                        instruction: Instruction::Nop,
                        jump: Jump::Next,
                    });
                }
                bodies.push(MethodBody::new(open.method, open.parameters, lines).map_err(at)?);
            }
            continue;
        }

        let mut text = text;
        if let Some((head, rest)) = text.split_once(':') {
            if is_ident(head.trim()) {
                if open.pending_label.is_some() {
                    return Err(at("Two labels on the same statement".to_string()));
                }
                open.pending_label = Some(label(head).map_err(at)?);
                text = rest.trim();
                if text.is_empty() {
                    continue;
                }
            }
        }

        let (instruction, jump) = statement(text, &open.method).map_err(at)?;
        open.lines.push(Line {
            label: open.pending_label.take(),
            instruction,
            jump,
        });
    }

    if let Some(open) = current {
        return Err(format!("Method {} is not closed", open.method));
    }

    Program::new(bodies)
}
