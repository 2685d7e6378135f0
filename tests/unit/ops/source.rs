use super::*;
use crate::foundation::core::Channel;
use crate::node::instance::NodeInstance;
use crate::test_support::eval_row;

#[test]
fn constant_fills_requested_planes() {
    let inst = NodeInstance::detached(std::sync::Arc::new(Constant::new(
        NodeId(1),
        [0.1, 0.2, 0.3, 0.4],
    )));
    let channels = ChannelSet::from_channels(&[Channel::Green, Channel::Depth]);
    let out = eval_row(&inst, 0, XRange { x: 3, r: 5 }, channels).unwrap();
    assert_eq!(out, vec![0.2, 0.2, 0.0, 0.0]);
}

#[test]
fn constant_edits_bump_version() {
    let c = Constant::new(NodeId(1), [0.0; 4]);
    let v = c.version();
    c.set_color([1.0; 4]);
    assert!(c.version() > v);
    assert_eq!(c.color(), [1.0; 4]);
}

#[test]
fn ramp_interpolates_and_clamps() {
    let ramp = Ramp::new(
        NodeId(1),
        [0.0, 0.0, 0.0, 1.0],
        [1.0, 0.0, 0.0, 1.0],
        Axis::Horizontal,
        5,
    )
    .unwrap();
    let inst = NodeInstance::detached(std::sync::Arc::new(ramp));
    let red = ChannelSet::from_channels(&[Channel::Red]);
    let out = eval_row(&inst, 0, XRange { x: -1, r: 6 }, red).unwrap();
    assert_eq!(out, vec![0.0, 0.0, 0.25, 0.5, 0.75, 1.0, 1.0]);
}

#[test]
fn vertical_ramp_is_constant_along_a_row() {
    let ramp = Ramp::new(NodeId(1), [0.0; 4], [1.0; 4], Axis::Vertical, 3).unwrap();
    let inst = NodeInstance::detached(std::sync::Arc::new(ramp));
    let out = eval_row(&inst, 1, XRange { x: 0, r: 3 }, ChannelSet::ALPHA).unwrap();
    assert_eq!(out, vec![0.5, 0.5, 0.5]);
    assert!(Ramp::new(NodeId(2), [0.0; 4], [1.0; 4], Axis::Vertical, 0).is_err());
}

#[test]
fn checkerboard_alternates_including_negative_coordinates() {
    let board = Checkerboard::new(NodeId(1), 2, [1.0; 4], [0.0; 4]).unwrap();
    let inst = NodeInstance::detached(std::sync::Arc::new(board));
    let out = eval_row(&inst, 0, XRange { x: -2, r: 4 }, ChannelSet::ALPHA).unwrap();
    assert_eq!(out, vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
    let next_band = eval_row(&inst, 2, XRange { x: 0, r: 2 }, ChannelSet::ALPHA).unwrap();
    assert_eq!(next_band, vec![0.0, 0.0]);
}

#[test]
fn checkerboard_size_is_validated() {
    assert!(Checkerboard::new(NodeId(1), 0, [0.0; 4], [1.0; 4]).is_err());
    let board = Checkerboard::new(NodeId(1), 4, [0.0; 4], [1.0; 4]).unwrap();
    assert!(board.set_size(0).is_err());
    let v = board.version();
    board.set_size(8).unwrap();
    assert!(board.version() > v);
}
