use tandem_model::{Node, NodeId, NodeKind};

/// Visitor pattern for walking node trees
///
/// Every hook defaults to walking the node's structurally significant
/// descendants in pre-order. Override specific visit_* methods to act on
/// nodes; call the matching walk_* function to keep descending.
pub trait Visitor: Sized {
    fn visit_node(&mut self, node: &Node) {
        walk_node(self, node);
    }

    fn visit_declaration(&mut self, _node: &Node) {
        // Leaf node, no children to walk
    }

    fn visit_style_rule(&mut self, node: &Node) {
        walk_children(self, node);
    }

    fn visit_at_rule(&mut self, node: &Node) {
        walk_children(self, node);
    }

    fn visit_media_rule(&mut self, node: &Node) {
        walk_children(self, node);
    }

    fn visit_element(&mut self, node: &Node) {
        walk_children(self, node);
    }

    fn visit_text(&mut self, _node: &Node) {
        // Leaf node, no children to walk
    }

    fn visit_slot(&mut self, node: &Node) {
        walk_children(self, node);
    }

    fn visit_content(&mut self, node: &Node) {
        walk_children(self, node);
    }

    fn visit_component(&mut self, node: &Node) {
        walk_children(self, node);
    }

    fn visit_component_instance(&mut self, node: &Node) {
        walk_children(self, node);
    }
}

/// Dispatch a node to the hook for its kind
pub fn walk_node<V: Visitor>(visitor: &mut V, node: &Node) {
    match &node.kind {
        NodeKind::Declaration { .. } => visitor.visit_declaration(node),
        NodeKind::StyleRule { .. } => visitor.visit_style_rule(node),
        NodeKind::AtRule { .. } => visitor.visit_at_rule(node),
        // only the nested rule list; the condition list is not a node
        NodeKind::MediaRule { .. } => visitor.visit_media_rule(node),
        NodeKind::Element { .. } => visitor.visit_element(node),
        NodeKind::Text { .. } => visitor.visit_text(node),
        NodeKind::Slot { .. } => visitor.visit_slot(node),
        NodeKind::Content { .. } => visitor.visit_content(node),
        NodeKind::Component { .. } => visitor.visit_component(node),
        // instance children are slot content; the referenced component is
        // never walked through the instance
        NodeKind::ComponentInstance { .. } => visitor.visit_component_instance(node),
    }
}

pub fn walk_children<V: Visitor>(visitor: &mut V, node: &Node) {
    for child in &node.children {
        visitor.visit_node(child);
    }
}

/// Walk `root` and call `f` on every node in pre-order
pub fn walk_tree<F: FnMut(&Node)>(root: &Node, f: F) {
    struct Walker<F>(F);

    impl<F: FnMut(&Node)> Visitor for Walker<F> {
        fn visit_node(&mut self, node: &Node) {
            (self.0)(node);
            walk_node(self, node);
        }
    }

    Walker(f).visit_node(root);
}

/// Ids of all nodes in pre-order
pub fn collect_ids(root: &Node) -> Vec<NodeId> {
    let mut ids = Vec::new();
    walk_tree(root, |node| ids.push(node.id.clone()));
    ids
}

pub fn count_nodes(root: &Node) -> usize {
    let mut count = 0;
    walk_tree(root, |_| count += 1);
    count
}

/// Instances of `component_id` anywhere in `root`
pub fn collect_instances_of(root: &Node, component_id: &str) -> Vec<NodeId> {
    struct InstanceCollector<'a> {
        component_id: &'a str,
        found: Vec<NodeId>,
    }

    impl Visitor for InstanceCollector<'_> {
        fn visit_component_instance(&mut self, node: &Node) {
            if node.reference() == Some(self.component_id) {
                self.found.push(node.id.clone());
            }
            walk_children(self, node);
        }
    }

    let mut collector = InstanceCollector {
        component_id,
        found: Vec::new(),
    };
    collector.visit_node(root);
    collector.found
}

/// Components defined anywhere in `root`
pub fn collect_components(root: &Node) -> Vec<NodeId> {
    struct ComponentCollector(Vec<NodeId>);

    impl Visitor for ComponentCollector {
        fn visit_component(&mut self, node: &Node) {
            self.0.push(node.id.clone());
            walk_children(self, node);
        }
    }

    let mut collector = ComponentCollector(Vec::new());
    collector.visit_node(root);
    collector.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Node {
        Node::element("root", "div").with_children([
            Node::component("button", "Button").with_children([
                Node::element("b", "button").with_children([Node::text("label", "Click")]),
            ]),
            Node::media_rule("m", ["screen"]).with_children([
                Node::style_rule("r", ".a").with_children([Node::declaration("d", "color", "red")]),
            ]),
            Node::instance("i1", "button")
                .with_children([Node::content("c", "footer").with_children([Node::instance("i2", "button")])]),
        ])
    }

    #[test]
    fn test_pre_order() {
        assert_eq!(
            collect_ids(&tree()),
            vec!["root", "button", "b", "label", "m", "r", "d", "i1", "c", "i2"]
        );
        assert_eq!(count_nodes(&tree()), 10);
    }

    #[test]
    fn test_collect_instances() {
        assert_eq!(collect_instances_of(&tree(), "button"), vec!["i1", "i2"]);
        assert!(collect_instances_of(&tree(), "missing").is_empty());
        assert_eq!(collect_components(&tree()), vec!["button"]);
    }

    #[test]
    fn test_override_stops_descent() {
        struct RuleCounter(usize);

        impl Visitor for RuleCounter {
            fn visit_style_rule(&mut self, _node: &Node) {
                // don't walk declarations
                self.0 += 1;
            }

            fn visit_declaration(&mut self, _node: &Node) {
                panic!("declarations should not be visited");
            }
        }

        let mut counter = RuleCounter(0);
        counter.visit_node(&tree());
        assert_eq!(counter.0, 1);
    }
}
