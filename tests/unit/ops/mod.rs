use super::*;
use crate::ops::blur::BoxBlur;

#[test]
fn fill_row_is_planar_by_channel() {
    let row = fill_row(XRange { x: 10, r: 13 }, ChannelSet::RGB, |c, x| {
        component(&[1.0, 2.0, 3.0, 4.0], c) * 100.0 + x as f32
    });
    assert_eq!(
        row,
        vec![110.0, 111.0, 112.0, 210.0, 211.0, 212.0, 310.0, 311.0, 312.0]
    );
    assert!(fill_row(XRange { x: 4, r: 4 }, ChannelSet::RGB, |_, _| 1.0).is_empty());
}

#[test]
fn depth_and_mask_read_as_zero() {
    let color = [0.5; 4];
    assert_eq!(component(&color, Channel::Depth), 0.0);
    assert_eq!(component(&color, Channel::Mask), 0.0);
    assert_eq!(component(&color, Channel::Alpha), 0.5);
}

#[test]
fn prioritized_only_overrides_the_priority() {
    let blur: Arc<dyn Node> = Arc::new(BoxBlur::new(NodeId(3), 2, 1).unwrap());
    let wrapped = Prioritized::new(Arc::clone(&blur), CachePriority::High);

    assert_eq!(wrapped.cache_priority(), CachePriority::High);
    assert_eq!(blur.cache_priority(), CachePriority::Normal);
    assert_eq!(wrapped.identity(), NodeId(3));
    assert_eq!(wrapped.name(), blur.name());
    assert_eq!(wrapped.version(), blur.version());
    assert_eq!(wrapped.input_count(), 1);
    let out = Region::with_size(4, 4);
    assert_eq!(wrapped.request(out, 0), out.pad(2, 1));
    assert!(Arc::ptr_eq(wrapped.inner(), &blur));
}
