use super::*;

const GRAPH: &str = r#"{
  "nodes": [
    { "id": "bg", "op": { "type": "checkerboard", "size": 4, "a": [0.2, 0.2, 0.2, 1.0], "b": [0.8, 0.8, 0.8, 1.0] } },
    { "id": "fg", "op": { "type": "constant", "color": [0.5, 0.0, 0.0, 0.5] }, "priority": "high" },
    { "id": "soft", "op": { "type": "box_blur", "radius": 2 } },
    { "id": "comp", "op": { "type": "merge" } },
    { "id": "look", "op": { "type": "grade", "gain": 1.2 } }
  ],
  "edges": [
    { "from": "fg", "to": "soft" },
    { "from": "soft", "to": "comp", "slot": 0 },
    { "from": "bg", "to": "comp", "slot": 1 },
    { "from": "comp", "to": "look" }
  ],
  "output": "look"
}"#;

#[test]
fn parses_tagged_ops_with_defaults() {
    let doc = GraphDocument::from_json_str(GRAPH).unwrap();
    assert_eq!(doc.nodes.len(), 5);
    assert_eq!(
        doc.nodes[2].op,
        OpSpec::BoxBlur {
            radius: 2,
            radius_y: None
        }
    );
    assert_eq!(doc.nodes[3].op, OpSpec::Merge { mix: 1.0 });
    assert_eq!(
        doc.nodes[4].op,
        OpSpec::Grade(GradeParams {
            gain: 1.2,
            ..GradeParams::default()
        })
    );
    assert_eq!(doc.nodes[1].priority, Some(CachePriority::High));
    assert_eq!(doc.edges[0].slot, 0);
}

#[test]
fn build_wires_the_graph() {
    let doc = GraphDocument::from_json_str(GRAPH).unwrap();
    let mut dag = Dag::new();
    let built = doc.build(&mut dag).unwrap();
    assert_eq!(dag.len(), 5);
    assert_eq!(built.output, built.id("look").unwrap());

    let comp = built.id("comp").unwrap();
    assert_eq!(
        dag.inputs(comp).unwrap(),
        &[built.id("soft"), built.id("bg")]
    );
    let fg = dag.node(built.id("fg").unwrap()).unwrap();
    assert_eq!(fg.cache_priority(), CachePriority::High);
    assert_eq!(fg.name(), "constant");

    let order = dag.topological_order(built.output).unwrap();
    assert_eq!(order.len(), 5);
    assert_eq!(order.last(), Some(&built.output));
}

#[test]
fn build_continues_after_existing_ids() {
    let doc = GraphDocument::from_json_str(GRAPH).unwrap();
    let mut dag = Dag::new();
    let first = doc.build(&mut dag).unwrap();
    let second = doc.build(&mut dag).unwrap();
    assert_eq!(dag.len(), 10);
    assert!(second.output.0 > first.output.0);
}

#[test]
fn validate_rejects_bad_references() {
    let dup = r#"{ "nodes": [
        { "id": "a", "op": { "type": "invert" } },
        { "id": "a", "op": { "type": "invert" } }
    ], "output": "a" }"#;
    assert!(GraphDocument::from_json_str(dup).is_err());

    let dangling = r#"{ "nodes": [ { "id": "a", "op": { "type": "invert" } } ],
        "edges": [ { "from": "b", "to": "a" } ], "output": "a" }"#;
    assert!(GraphDocument::from_json_str(dangling).is_err());

    let no_output = r#"{ "nodes": [ { "id": "a", "op": { "type": "invert" } } ], "output": "z" }"#;
    assert!(GraphDocument::from_json_str(no_output).is_err());

    let empty = r#"{ "nodes": [], "output": "a" }"#;
    assert!(GraphDocument::from_json_str(empty).is_err());

    let unknown_op = r#"{ "nodes": [ { "id": "a", "op": { "type": "sharpen" } } ], "output": "a" }"#;
    assert!(GraphDocument::from_json_str(unknown_op).is_err());
}

#[test]
fn build_reports_bad_slots_and_cycles() {
    let bad_slot = r#"{ "nodes": [
        { "id": "c", "op": { "type": "constant", "color": [0, 0, 0, 1] } },
        { "id": "i", "op": { "type": "invert" } }
    ], "edges": [ { "from": "c", "to": "i", "slot": 1 } ], "output": "i" }"#;
    let doc = GraphDocument::from_json_str(bad_slot).unwrap();
    let err = doc.build(&mut Dag::new()).unwrap_err();
    assert!(err.to_string().contains("slot 1"));

    let cycle = r#"{ "nodes": [
        { "id": "x", "op": { "type": "invert" } },
        { "id": "y", "op": { "type": "invert" } }
    ], "edges": [ { "from": "x", "to": "y" }, { "from": "y", "to": "x" } ], "output": "y" }"#;
    let doc = GraphDocument::from_json_str(cycle).unwrap();
    assert!(doc.build(&mut Dag::new()).is_err());
}

#[test]
fn invalid_op_params_fail_at_build() {
    let doc = GraphDocument::from_json_str(
        r#"{ "nodes": [ { "id": "m", "op": { "type": "merge", "mix": 2.0 } } ], "output": "m" }"#,
    )
    .unwrap();
    assert!(doc.build(&mut Dag::new()).is_err());
}
