use super::tree;
use crate::branch::{BranchId, BranchSet};
use std::fmt::Write;
use std::rc::Rc;

type Node = tree::Node<String>;
type Tree = tree::Tree<String>;

/// Branches merged back into a tree: lines sharing a prefix share its nodes.
pub struct MoveTree {
    tree: Tree,
    ends: Vec<(Rc<Node>, BranchId)>,
}

impl MoveTree {
    pub fn from_branches(branches: &BranchSet) -> Self {
        let mut tree = Tree::new();
        let mut ends = Vec::new();

        for branch in branches {
            let mut node = tree.root.clone();
            for m in &branch.moves {
                node = node.branch_or_find(&mut tree, m.clone());
            }
            ends.push((node, branch.id.clone()));
        }

        MoveTree { tree, ends }
    }

    /// Every root-to-leaf path, depth first.
    pub fn variations(&self) -> Vec<Vec<String>> {
        let mut leaves = Vec::new();
        self.collect_leaves(&self.tree.root, &mut leaves);
        leaves.iter().map(|leaf| self.resolve(leaf)).collect()
    }

    fn collect_leaves(&self, node: &Rc<Node>, result: &mut Vec<Rc<Node>>) {
        let children = node.get_children(&self.tree);
        if children.is_empty() {
            if node.value(&self.tree).is_some() {
                result.push(node.clone());
            }
            return;
        }
        for child in children {
            self.collect_leaves(child, result);
        }
    }

    fn resolve(&self, node: &Rc<Node>) -> Vec<String> {
        let mut moves = Vec::with_capacity(node.depth(&self.tree));
        let mut current = Some(node.clone());
        while let Some(node) = current {
            if let Some(m) = node.value(&self.tree) {
                moves.push(m.clone());
            }
            current = node.try_get_parent(&self.tree);
        }
        moves.reverse();
        moves
    }

    fn branches_ending_at(&self, node: &Rc<Node>) -> Vec<&str> {
        self.ends
            .iter()
            .filter(|(end, _)| Rc::ptr_eq(end, node))
            .map(|(_, id)| id.as_str())
            .collect()
    }

    /// Indented outline, one move per line, with the ids of the branches
    /// ending on each node.
    ///
    /// ```text
    /// 1. e4
    ///   1... e5
    ///     2. Nf3  [main]
    ///   1... c5  [var_1]
    /// ```
    pub fn outline(&self) -> String {
        let mut out = String::new();
        for child in self.tree.root.get_children(&self.tree) {
            self.write_node(child, 0, &mut out);
        }
        out
    }

    fn write_node(&self, node: &Rc<Node>, ply: usize, out: &mut String) {
        let san = node.value(&self.tree).map(String::as_str).unwrap_or_default();
        let number = ply / 2 + 1;
        let dots = if ply % 2 == 0 { "." } else { "..." };

        let _ = write!(out, "{:indent$}{}{} {}", "", number, dots, san, indent = ply * 2);
        let ids = self.branches_ending_at(node);
        if !ids.is_empty() {
            let _ = write!(out, "  [{}]", ids.join(", "));
        }
        out.push('\n');

        for child in node.get_children(&self.tree) {
            self.write_node(child, ply + 1, out);
        }
    }
}
