//! Undefined-variable check for `{% if %}` / `{% elif %}` conditions.
//!
//! Tera reads an undefined name in a condition as false and drops the block.
//! Conditions are resolved here against the render context before rendering,
//! so a missing attribute fails the render like it does in `{{ }}` output.
//!
//! Every branch is checked whether or not it would be taken. Optional
//! attributes are written `x is defined and x` or `x | default(value=..)`.

use serde_json::Value;
use tera::ast::{Expr, ExprVal, LogicExpr, LogicOperator, Node};
use tera::Tera;

use crate::context::RenderContext;

/// First variable used in a condition of `template` (or a template it
/// includes or extends) that is absent from `context`
pub fn undefined_condition_variable(
    tera: &Tera,
    template: &str,
    context: &RenderContext,
) -> Option<String> {
    let mut walker = Walker {
        tera,
        context,
        locals: Vec::new(),
        globals: Vec::new(),
        stack: Vec::new(),
    };
    walker.template(template)
}

/// What a name bound inside the template stands for
#[derive(Debug, Clone)]
enum Binding<'a> {
    /// Only known while rendering: `set` targets, `loop`, map keys
    Opaque,
    /// Every value a loop variable takes
    Values(Vec<&'a Value>),
}

enum Lookup<'a> {
    Missing,
    Opaque,
    Found(Vec<&'a Value>),
}

struct Walker<'a> {
    tera: &'a Tera,
    context: &'a RenderContext,
    /// Loop variables and `set` names of the enclosing scopes, innermost last
    locals: Vec<(String, Binding<'a>)>,
    /// `set_global` names
    globals: Vec<String>,
    /// Templates being walked; breaks include cycles
    stack: Vec<String>,
}

impl<'a> Walker<'a> {
    fn template(&mut self, name: &str) -> Option<String> {
        if self.stack.iter().any(|n| n == name) {
            return None;
        }
        let tera = self.tera;
        let template = tera.get_template(name).ok()?;

        self.stack.push(name.to_string());
        let mut found = self.nodes(&template.ast);
        for parent in &template.parents {
            if found.is_some() {
                break;
            }
            if let Ok(parent) = tera.get_template(parent) {
                found = self.nodes(&parent.ast);
            }
        }
        self.stack.pop();
        found
    }

    fn nodes(&mut self, nodes: &[Node]) -> Option<String> {
        nodes.iter().find_map(|node| self.node(node))
    }

    fn node(&mut self, node: &Node) -> Option<String> {
        match node {
            Node::If(if_node, _) => {
                for (_, condition, body) in &if_node.conditions {
                    if let Some(variable) = self.condition(condition, &[]) {
                        return Some(variable);
                    }
                    if let Some(variable) = self.nodes(body) {
                        return Some(variable);
                    }
                }
                if_node
                    .otherwise
                    .as_ref()
                    .and_then(|(_, body)| self.nodes(body))
            }
            Node::Forloop(_, forloop, _) => {
                let mark = self.locals.len();
                let (keys, values) = self.loop_bindings(&forloop.container);
                self.locals.push(("loop".to_string(), Binding::Opaque));
                if let Some(key) = &forloop.key {
                    self.locals.push((key.clone(), keys));
                }
                self.locals.push((forloop.value.clone(), values));

                let found = self.nodes(&forloop.body);
                self.locals.truncate(mark);
                found.or_else(|| {
                    forloop
                        .empty_body
                        .as_ref()
                        .and_then(|body| self.nodes(body))
                })
            }
            Node::Set(_, set) => {
                if set.global {
                    self.globals.push(set.key.clone());
                } else {
                    self.locals.push((set.key.clone(), Binding::Opaque));
                }
                None
            }
            Node::Include(_, names, _) => {
                let tera = self.tera;
                let name = names.iter().find(|n| tera.get_template(n).is_ok())?;
                self.template(name)
            }
            Node::Block(_, block, _) => self.nodes(&block.body),
            Node::FilterSection(_, section, _) => self.nodes(&section.body),
            _ => None,
        }
    }

    /// Undefined names Tera would read as false. `guarded` holds names
    /// already tested with `is defined` on the left of an `and`.
    fn condition(&self, expr: &Expr, guarded: &[&str]) -> Option<String> {
        match &expr.val {
            ExprVal::Ident(ident) => {
                let has_default = expr.filters.first().is_some_and(|f| f.name == "default");
                if has_default || is_guarded(ident, guarded) {
                    return None;
                }
                match self.lookup(ident) {
                    Lookup::Missing => Some(ident.clone()),
                    Lookup::Opaque | Lookup::Found(_) => None,
                }
            }
            ExprVal::Logic(LogicExpr { lhs, rhs, operator }) => {
                let wants_defined = match operator {
                    LogicOperator::And => true,
                    LogicOperator::Or => false,
                    _ => return None,
                };
                if let Some(variable) = self.condition(lhs, guarded) {
                    return Some(variable);
                }
                let mut guarded = guarded.to_vec();
                defined_tests(lhs, wants_defined, &mut guarded);
                self.condition(rhs, &guarded)
            }
            _ => None,
        }
    }

    /// Bindings of a loop's key and value variables
    fn loop_bindings(&self, container: &Expr) -> (Binding<'a>, Binding<'a>) {
        let opaque = (Binding::Opaque, Binding::Opaque);
        let ExprVal::Ident(ident) = &container.val else {
            return opaque;
        };
        if !container.filters.is_empty() {
            return opaque;
        }
        let Lookup::Found(containers) = self.lookup(ident) else {
            return opaque;
        };

        let mut items = Vec::new();
        for container in containers {
            match container {
                Value::Array(values) => items.extend(values.iter()),
                Value::Object(map) => items.extend(map.values()),
                _ => return opaque,
            }
        }
        (Binding::Opaque, Binding::Values(items))
    }

    fn lookup(&self, ident: &str) -> Lookup<'a> {
        // Subscripts (`a[0]`, `a[key]`) are left to Tera
        let path = ident.split('[').next().unwrap_or(ident);
        let mut parts = path.split('.');
        let root = parts.next().unwrap_or_default();

        if root == "__tera_context" || self.globals.iter().any(|g| g == root) {
            return Lookup::Opaque;
        }
        let mut values = match self.locals.iter().rev().find(|(name, _)| name == root) {
            Some((_, Binding::Opaque)) => return Lookup::Opaque,
            Some((_, Binding::Values(values))) => values.clone(),
            None => match self.context.get(root) {
                Some(value) => vec![value],
                None => return Lookup::Missing,
            },
        };

        for part in parts {
            let mut next = Vec::with_capacity(values.len());
            for value in values {
                let child = match value {
                    Value::Object(map) => map.get(part),
                    Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
                    _ => None,
                };
                match child {
                    Some(child) => next.push(child),
                    None => return Lookup::Missing,
                }
            }
            values = next;
        }
        Lookup::Found(values)
    }
}

/// Collect the names `expr` proves defined (`wants_defined`) or undefined
fn defined_tests<'e>(expr: &'e Expr, wants_defined: bool, out: &mut Vec<&'e str>) {
    match &expr.val {
        ExprVal::Test(test) if test.name == "defined" || test.name == "undefined" => {
            let defined = (test.name == "defined") ^ test.negated ^ expr.negated;
            if defined == wants_defined {
                out.push(&test.ident);
            }
        }
        ExprVal::Logic(LogicExpr { lhs, rhs, operator })
            if (wants_defined && *operator == LogicOperator::And)
                || (!wants_defined && *operator == LogicOperator::Or) =>
        {
            defined_tests(lhs, wants_defined, out);
            defined_tests(rhs, wants_defined, out);
        }
        _ => {}
    }
}

fn is_guarded(ident: &str, guarded: &[&str]) -> bool {
    guarded.iter().any(|g| {
        ident == *g || (ident.starts_with(*g) && ident[g.len()..].starts_with(['.', '[']))
    })
}
