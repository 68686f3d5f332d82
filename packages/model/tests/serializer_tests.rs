//! Serializer bridge round-trip and reference resolution tests

use serde_json::json;
use std::sync::Arc;
use tandem_model::{
    deserialize, deserialize_document, serialize, serialize_document, NoResolver, Node,
    Registry, Resolution,
};

fn stylesheet() -> Node {
    Node::component("c1", "Card")
        .with_metadata("bounds", json!({ "left": 10, "top": 20, "width": 300, "height": 200 }))
        .with_children([
            Node::element("e1", "div")
                .with_attribute("class", "card")
                .with_children([
                    Node::text("t1", "Hello"),
                    Node::slot("s1", "footer"),
                ]),
            Node::style_rule("r1", ".card").with_children([
                Node::declaration("d1", "color", "red"),
                Node::declaration("d2", "padding", "8px 16px"),
            ]),
            Node::media_rule("m1", ["screen", "and (max-width: 400px)"]).with_children([
                Node::style_rule("r2", ".card")
                    .with_children([Node::declaration("d3", "padding", "4px")]),
            ]),
            Node::at_rule("k1", "keyframes", "fade").with_children([
                Node::style_rule("r3", "from").with_children([Node::declaration("d4", "opacity", "0")]),
            ]),
        ])
}

#[test]
fn test_round_trip_preserves_structure() {
    let tree = stylesheet();

    let plain = serialize(&tree).unwrap();
    let restored = deserialize(plain, Arc::new(NoResolver)).unwrap();

    assert!(restored.root.structurally_eq(&tree));
    // identities survive the round trip as well
    assert_eq!(restored.root.descendant_ids(), tree.descendant_ids());
    assert!(restored.references.is_empty());
}

#[test]
fn test_round_trip_through_bytes() {
    let tree = stylesheet();

    let bytes = serialize_document("doc", 7, &tree, true).unwrap();
    let (header, restored) = deserialize_document(&bytes, Arc::new(NoResolver)).unwrap();

    assert_eq!(header.document_id, "doc");
    assert_eq!(header.version, 7);
    assert!(restored.root.structurally_eq(&tree));
}

#[test]
fn test_local_reference_resolves_lazily() {
    let tree = Node::element("root", "div").with_children([
        Node::component("button", "Button").with_children([Node::element("b1", "button")]),
        Node::instance("i1", "button"),
    ]);

    let restored = deserialize(serialize(&tree).unwrap(), Arc::new(NoResolver)).unwrap();

    // nothing is resolved until asked for
    assert!(!restored.references.is_resolved("i1"));

    match restored.references.lookup("i1") {
        Some(Resolution::Resolved(component)) => assert_eq!(component.name(), "Button"),
        other => panic!("Expected resolved component, got {:?}", other),
    }
    assert!(restored.references.is_resolved("i1"));
}

#[test]
fn test_external_reference_uses_resolver() {
    let library = Node::component("lib-button", "Button").into_shared();
    let mut registry = Registry::new();
    registry.register(&library);

    let tree = Node::element("root", "div").with_children([Node::instance("i1", "lib-button")]);
    let restored = deserialize(serialize(&tree).unwrap(), Arc::new(registry)).unwrap();

    let resolution = restored.references.lookup("i1").unwrap();
    assert_eq!(resolution.node().map(|n| n.id.as_str()), Some("lib-button"));
}

#[test]
fn test_unresolved_reference_is_missing_not_error() {
    let tree = Node::element("root", "div").with_children([
        Node::instance("i1", "ghost"),
        Node::instance("i2", "ghost"),
    ]);

    let restored = deserialize(serialize(&tree).unwrap(), Arc::new(NoResolver)).unwrap();

    assert!(matches!(
        restored.references.lookup("i1"),
        Some(Resolution::Missing(id)) if id == "ghost"
    ));
    assert_eq!(restored.references.missing().len(), 2);
    // not an instance at all
    assert!(restored.references.lookup("root").is_none());
}

#[test]
fn test_closure_resolver() {
    let shared = Node::component("c", "Shared").into_shared();
    let resolver = move |id: &str| (id == "c").then(|| shared.clone());

    let tree = Node::instance("i", "c");
    let restored = deserialize(serialize(&tree).unwrap(), Arc::new(resolver)).unwrap();

    assert!(!restored.references.lookup("i").unwrap().is_missing());
}

#[test]
fn test_reference_to_non_component_is_missing() {
    let tree = Node::element("root", "div").with_children([
        Node::element("not-a-component", "div"),
        Node::instance("i1", "not-a-component"),
    ]);
    let mut registry = Registry::new();
    registry.register(&Arc::new(tree.clone()));

    let restored = deserialize(serialize(&tree).unwrap(), Arc::new(registry)).unwrap();
    assert!(restored.references.lookup("i1").unwrap().is_missing());
}
