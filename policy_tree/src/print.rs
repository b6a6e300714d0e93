//! Human-readable outline of a policy tree for `polrepo policy validate --dump`.

use std::fmt;

use crate::node::PolicyNode;

/// Format a policy tree as an indented outline of nodes and rule names.
pub fn print_tree(node: &PolicyNode) -> String {
    let mut out = String::new();
    print_node(&mut out, node, 0);
    out
}

fn print_node(out: &mut String, node: &PolicyNode, depth: usize) {
    let indent = "  ".repeat(depth);
    let name = if node.name().is_empty() {
        "<unnamed>"
    } else {
        node.name()
    };
    out.push_str(&format!(
        "{indent}{name} ({} rules, {} children)\n",
        node.rules().len(),
        node.children().len()
    ));
    for rule in node.rules().keys() {
        out.push_str(&format!("{indent}  - {rule}\n"));
    }
    for child in node.children().values() {
        print_node(out, child, depth + 1);
    }
}

impl fmt::Display for PolicyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", print_tree(self))
    }
}
