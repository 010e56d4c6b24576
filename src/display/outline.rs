use crate::store::registry::SymbolShell;
use crate::store::{Model, Symbol, SymbolKind};
use std::collections::HashMap;
use std::fmt::Write;

/// Renders an expression tree as an indented outline. A node reached a second
/// time is printed as a back-reference to the level it first appeared at.
pub fn format_outline(root: &Symbol) -> String {
    let mut output = String::new();
    Outliner::default().write_tree(&mut output, root);
    output
}

/// Outlines the trees of a model, sharing back-references across all of them.
pub fn format_model(model: &Model) -> String {
    let mut output = String::new();
    let mut outliner = Outliner::default();
    let _ = writeln!(output, "MODEL '{}' ({})", model.name, model.kind.tag());
    let _ = writeln!(output, "--------------------------------------------------");
    for (label, tree) in model.required_trees() {
        let _ = writeln!(output, "{}:", label);
        outliner.write_tree(&mut output, tree);
    }
    for event in &model.events {
        let _ = writeln!(output, "event '{}' [{:?}]:", event.name(), event.event_type());
        outliner.write_tree(&mut output, event.expression());
    }
    output
}

#[derive(Default)]
struct Outliner {
    first_seen: HashMap<*const Symbol, usize>,
}

struct Frame<'a> {
    node: &'a Symbol,
    level: usize,
    stem: String,
    connector: &'static str,
    label: &'static str,
}

impl Outliner {
    fn write_tree(&mut self, output: &mut String, root: &Symbol) {
        let mut stack = vec![Frame { node: root, level: 1, stem: String::new(), connector: "", label: "" }];

        while let Some(Frame { node, level, stem, connector, label }) = stack.pop() {
            let key = node as *const Symbol;
            if let Some(&first) = self.first_seen.get(&key) {
                let _ = writeln!(output, "{}{}{}-> (Ref to L{})", stem, connector, label, first);
                continue;
            }
            self.first_seen.insert(key, level);
            let _ = writeln!(output, "{}{}{}[L{}] {}{}", stem, connector, label, level, node.name, describe(node));

            let child_stem = match connector {
                "" => stem,
                "`-- " => format!("{}    ", stem),
                _ => format!("{}|   ", stem),
            };
            let mut linked: Vec<(&Symbol, &'static str)> = node.children.iter().map(|c| (c.as_ref(), "")).collect();
            if let Some(ic) = node.initial_condition() {
                linked.push((ic.as_ref(), "initial condition: "));
            }
            let last = linked.len().saturating_sub(1);
            // Reverse so the first child is popped first.
            for (i, (child, label)) in linked.into_iter().enumerate().rev() {
                stack.push(Frame {
                    node: child,
                    level: level + 1,
                    stem: child_stem.clone(),
                    connector: if i == last { "`-- " } else { "|-- " },
                    label,
                });
            }
        }
    }
}

fn describe(node: &Symbol) -> String {
    let class = match (&node.kind, SymbolShell::of(&node.kind)) {
        (_, Some(shell)) => shell.class_name(),
        (SymbolKind::Spatial(op), None) => op.name(),
        _ => "?",
    };
    match &node.kind {
        SymbolKind::Scalar { .. } | SymbolKind::Time => format!(" ({})", class),
        SymbolKind::Vector { entries } => format!(" ({}, len={})", class, entries.len()),
        SymbolKind::Matrix(m) => format!(" ({}, {}x{})", class, m.rows, m.cols),
        _ if !node.domains.primary.is_empty() => format!(" ({}) on {:?}", class, node.domains.primary),
        _ => format!(" ({})", class),
    }
}
