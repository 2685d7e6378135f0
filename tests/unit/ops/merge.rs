use std::sync::Arc;

use super::*;
use crate::node::instance::NodeInstance;
use crate::ops::source::Constant;
use crate::test_support::eval_row;

fn constant(id: u64, color: [f32; 4]) -> Arc<NodeInstance> {
    NodeInstance::detached(Arc::new(Constant::new(NodeId(id), color)))
}

#[test]
fn a_over_b_uses_foreground_alpha() {
    let merge = Arc::new(Merge::new(NodeId(3), 1.0).unwrap());
    let inst = NodeInstance::new(
        merge,
        vec![
            Some(constant(1, [0.5, 0.0, 0.0, 0.5])),
            Some(constant(2, [0.0, 0.0, 1.0, 1.0])),
        ],
    );
    let out = eval_row(&inst, 0, XRange { x: 0, r: 1 }, ChannelSet::RGBA).unwrap();
    assert_eq!(out, vec![0.5, 0.0, 0.5, 1.0]);
}

#[test]
fn mix_scales_the_foreground() {
    let merge = Arc::new(Merge::new(NodeId(3), 0.5).unwrap());
    let inst = NodeInstance::new(
        merge,
        vec![
            Some(constant(1, [1.0, 1.0, 1.0, 1.0])),
            Some(constant(2, [0.0, 0.0, 0.0, 1.0])),
        ],
    );
    let out = eval_row(&inst, 0, XRange { x: 0, r: 1 }, ChannelSet::RGB).unwrap();
    assert_eq!(out, vec![0.5, 0.5, 0.5]);
}

#[test]
fn missing_inputs_read_as_transparent() {
    let merge = Arc::new(Merge::new(NodeId(3), 1.0).unwrap());
    let only_b = NodeInstance::new(
        Arc::clone(&merge) as Arc<dyn Node>,
        vec![None, Some(constant(2, [0.2, 0.4, 0.6, 1.0]))],
    );
    let out = eval_row(&only_b, 0, XRange { x: 0, r: 1 }, ChannelSet::RGBA).unwrap();
    assert_eq!(out, vec![0.2, 0.4, 0.6, 1.0]);

    let only_a = NodeInstance::new(merge, vec![Some(constant(1, [0.2, 0.4, 0.6, 0.5])), None]);
    let out = eval_row(&only_a, 0, XRange { x: 0, r: 1 }, ChannelSet::RGBA).unwrap();
    assert_eq!(out, vec![0.2, 0.4, 0.6, 0.5]);
}

#[test]
fn foreground_always_needs_alpha() {
    let merge = Merge::new(NodeId(3), 1.0).unwrap();
    assert_eq!(
        merge.input_channels(ChannelSet::RGB, MERGE_A),
        ChannelSet::RGBA
    );
    assert_eq!(merge.input_channels(ChannelSet::RGB, MERGE_B), ChannelSet::RGB);
}

#[test]
fn mix_is_validated() {
    assert!(Merge::new(NodeId(3), 1.5).is_err());
    let merge = Merge::new(NodeId(3), 1.0).unwrap();
    assert!(merge.set_mix(-0.1).is_err());
    let v = merge.version();
    merge.set_mix(0.25).unwrap();
    assert!(merge.version() > v);
    assert_eq!(merge.mix(), 0.25);
}
