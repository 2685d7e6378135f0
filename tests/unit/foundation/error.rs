use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        EngineError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(EngineError::graph("x").to_string().contains("graph error:"));
    assert!(
        EngineError::evaluation("x")
            .to_string()
            .contains("evaluation error:")
    );
    assert!(EngineError::config("x").to_string().contains("config error:"));
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = EngineError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}

#[test]
fn row_failure_mentions_node_and_scanline() {
    let f = RowFailure::new(NodeId(7), 3, "bad pixel");
    let s = f.to_string();
    assert!(s.contains("row 3"));
    assert!(s.contains("node 7"));
    assert!(s.contains("bad pixel"));

    let e = RowError::from(f.clone());
    assert_eq!(e, RowError::Failed(f));
}
