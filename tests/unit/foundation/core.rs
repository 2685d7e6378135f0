use super::*;

#[test]
fn channel_set_counts_and_orders() {
    let set = ChannelSet::from_channels(&[Channel::Alpha, Channel::Red, Channel::Blue]);
    assert_eq!(set.count(), 3);
    assert_eq!(
        set.iter().collect::<Vec<_>>(),
        vec![Channel::Red, Channel::Blue, Channel::Alpha]
    );
    assert_eq!(set.index_of(Channel::Red), Some(0));
    assert_eq!(set.index_of(Channel::Blue), Some(1));
    assert_eq!(set.index_of(Channel::Alpha), Some(2));
    assert_eq!(set.index_of(Channel::Green), None);
}

#[test]
fn channel_set_algebra() {
    assert_eq!(ChannelSet::RGB.with(Channel::Alpha), ChannelSet::RGBA);
    assert_eq!(ChannelSet::RGBA.without(Channel::Alpha), ChannelSet::RGB);
    assert_eq!(
        ChannelSet::RGB.intersection(ChannelSet::ALPHA),
        ChannelSet::NONE
    );
    assert!(ChannelSet::NONE.is_empty());
    assert_eq!(ChannelSet::RGB.union(ChannelSet::ALPHA), ChannelSet::RGBA);
}

#[test]
fn channel_set_serde_as_list() {
    let json = serde_json::to_string(&ChannelSet::RGBA).unwrap();
    assert_eq!(json, r#"["red","green","blue","alpha"]"#);
    let back: ChannelSet = serde_json::from_str(&json).unwrap();
    assert_eq!(back, ChannelSet::RGBA);
}

#[test]
fn region_union_ignores_empty() {
    let a = Region::new(0, 0, 4, 4).unwrap();
    let empty = Region::new(10, 10, 10, 10).unwrap();
    assert_eq!(a.union(empty), a);
    assert_eq!(empty.union(a), a);

    let b = Region::new(2, -3, 8, 1).unwrap();
    assert_eq!(a.union(b), Region::new(0, -3, 8, 4).unwrap());
}

#[test]
fn region_rows_are_inclusive() {
    let r = Region::with_size(16, 10);
    assert_eq!(r.rows(), Some((0, 9)));
    assert_eq!(r.pad(2, 1).rows(), Some((-1, 10)));
    assert_eq!(Region::new(0, 5, 3, 5).unwrap().rows(), None);
    assert!(Region::new(3, 0, 1, 1).is_err());
}

#[test]
fn xrange_width_and_pad() {
    let x = XRange::new(2, 6).unwrap();
    assert_eq!(x.width(), 4);
    assert!(x.contains(2));
    assert!(!x.contains(6));
    assert_eq!(x.pad(1), XRange { x: 1, r: 7 });
    assert!(XRange::new(5, 1).is_err());
}
