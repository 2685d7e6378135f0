use std::sync::Arc;

use super::*;
use crate::foundation::core::Channel;
use crate::node::instance::NodeInstance;
use crate::test_support::{CountingNode, eval_row, expected};

#[test]
fn request_pads_by_radius() {
    let blur = BoxBlur::new(NodeId(2), 2, 1).unwrap();
    let out = Region::new(0, 0, 10, 4).unwrap();
    assert_eq!(blur.request(out, 0), Region::new(-2, -1, 12, 5).unwrap());
}

#[test]
fn radius_is_bounded_and_edits_bump_version() {
    assert!(BoxBlur::new(NodeId(2), MAX_BLUR_RADIUS + 1, 0).is_err());
    let blur = BoxBlur::new(NodeId(2), 1, 1).unwrap();
    let v = blur.version();
    blur.set_radius(3, 0).unwrap();
    assert_eq!(blur.radius(), (3, 0));
    assert!(blur.version() > v);
    assert!(blur.set_radius(0, MAX_BLUR_RADIUS + 1).is_err());
}

#[test]
fn box_average_of_a_linear_ramp_is_the_center_value() {
    let src = CountingNode::new(1);
    let blur = Arc::new(BoxBlur::new(NodeId(2), 2, 1).unwrap());
    let inst = NodeInstance::new(blur, vec![Some(NodeInstance::detached(src.clone()))]);

    let x_range = XRange { x: 4, r: 9 };
    let channels = ChannelSet::from_channels(&[Channel::Red, Channel::Alpha]);
    let out = eval_row(&inst, 6, x_range, channels).unwrap();
    assert_eq!(out.len(), 10);
    for (i, x) in (4..9).enumerate() {
        assert!((out[i] - expected(x, 6)).abs() < 1e-4, "x={x}: {}", out[i]);
        assert!((out[5 + i] - expected(x, 6)).abs() < 1e-4);
    }
    // One input row per scanline of the vertical window.
    assert_eq!(src.calls(), 3);
}

#[test]
fn zero_radius_is_identity() {
    let src = CountingNode::new(1);
    let blur = Arc::new(BoxBlur::new(NodeId(2), 0, 0).unwrap());
    let inst = NodeInstance::new(blur, vec![Some(NodeInstance::detached(src))]);
    let out = eval_row(&inst, 2, XRange { x: 0, r: 3 }, ChannelSet::ALPHA).unwrap();
    assert_eq!(out.len(), 3);
    for (x, v) in out.iter().enumerate() {
        assert!((v - expected(x as i32, 2)).abs() < 1e-5);
    }
}

#[test]
fn failed_input_row_fails_the_output_row() {
    let src = CountingNode::new(1);
    src.fail_on(4);
    let blur = Arc::new(BoxBlur::new(NodeId(2), 0, 1).unwrap());
    let inst = NodeInstance::new(blur, vec![Some(NodeInstance::detached(src))]);
    let err = eval_row(&inst, 3, XRange { x: 0, r: 2 }, ChannelSet::RGB).unwrap_err();
    assert!(err.to_string().contains("1 of 3 input rows failed"));
    assert!(eval_row(&inst, 1, XRange { x: 0, r: 2 }, ChannelSet::RGB).is_ok());
}
