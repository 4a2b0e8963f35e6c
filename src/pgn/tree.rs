use qcell::{QCell, QCellOwner};
use std::rc::{Rc, Weak};

pub struct Tree<T> {
    owner: QCellOwner,
    pub root: Rc<Node<T>>,
}

impl<T> Tree<T> {
    pub fn new() -> Self {
        let owner = QCellOwner::new();
        let root = Node::make_root(&owner);
        Tree { owner, root }
    }
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Node<T> {
    inner: QCell<NodeInner<T>>,
}

struct NodeInner<T> {
    parent: Option<Weak<Node<T>>>,
    value: Option<T>,
    children: Vec<Rc<Node<T>>>,
}

impl<T> Node<T> {
    fn make_root(owner: &QCellOwner) -> Rc<Self> {
        let inner = NodeInner {
            parent: None,
            value: None,
            children: Vec::new(),
        };

        Rc::new(Node {
            inner: QCell::new(owner, inner),
        })
    }

    pub fn branch(self: &Rc<Self>, tree: &mut Tree<T>, value: T) -> Rc<Self> {
        let inner = NodeInner {
            parent: Some(Rc::downgrade(self)),
            value: Some(value),
            children: Vec::new(),
        };

        let new_node = Rc::new(Node { inner: QCell::new(&tree.owner, inner) });
        self.inner.rw(&mut tree.owner).children.push(new_node.clone());

        new_node
    }

    pub fn try_get_parent(&self, tree: &Tree<T>) -> Option<Rc<Self>> {
        self.inner.ro(&tree.owner).parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn get_children<'a>(&'a self, tree: &'a Tree<T>) -> &'a [Rc<Self>] {
        &self.inner.ro(&tree.owner).children
    }

    pub fn value<'a>(&'a self, tree: &'a Tree<T>) -> Option<&'a T> {
        self.inner.ro(&tree.owner).value.as_ref()
    }

    /// Number of edges between this node and the root.
    pub fn depth(&self, tree: &Tree<T>) -> usize {
        let mut depth = 0;
        let mut node = self.try_get_parent(tree);
        while let Some(parent) = node {
            depth += 1;
            node = parent.try_get_parent(tree);
        }
        depth
    }
}

impl<T: PartialEq> Node<T> {
    /// Follows the child holding `value`, creating it if there is none.
    pub fn branch_or_find(self: &Rc<Self>, tree: &mut Tree<T>, value: T) -> Rc<Self> {
        let existing = self
            .inner
            .ro(&tree.owner)
            .children
            .iter()
            .find(|child| child.inner.ro(&tree.owner).value.as_ref() == Some(&value))
            .cloned();

        match existing {
            Some(child) => child,
            None => self.branch(tree, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Tree;

    #[test]
    fn branch_or_find_reuses_children() {
        let mut tree: Tree<&str> = Tree::new();
        let root = tree.root.clone();

        let e4 = root.branch_or_find(&mut tree, "e4");
        let again = root.branch_or_find(&mut tree, "e4");
        let d4 = root.branch_or_find(&mut tree, "d4");

        assert!(std::rc::Rc::ptr_eq(&e4, &again));
        assert_eq!(root.get_children(&tree).len(), 2);
        assert_eq!(d4.value(&tree), Some(&"d4"));
        assert_eq!(e4.depth(&tree), 1);
        assert!(e4.try_get_parent(&tree).is_some());
        assert!(root.value(&tree).is_none());
    }
}
