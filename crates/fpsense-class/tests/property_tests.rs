//! Property-based tests for registration and frame reads.

mod common;

use fpsense_class::DeviceDescriptor;
use fpsense_class::mock::MockCapability;
use fpsense_core::{Error, Geometry, OpenMode};
use proptest::prelude::*;
use std::sync::Arc;

/// Strategy for valid geometries, kept small so frames stay cheap.
fn valid_geometry() -> impl Strategy<Value = Geometry> {
    (1usize..=64, 1usize..=64, 1usize..=4).prop_map(|(w, h, bpp)| Geometry::new(w, h, bpp))
}

/// Strategy for geometries with at least one zero dimension.
fn invalid_geometry() -> impl Strategy<Value = Geometry> {
    (0usize..=16, 0usize..=16, 0usize..=4)
        .prop_filter("at least one dimension is zero", |(w, h, bpp)| {
            *w == 0 || *h == 0 || *bpp == 0
        })
        .prop_map(|(w, h, bpp)| Geometry::new(w, h, bpp))
}

/// Strategy for non-zero geometries whose frame size overflows `usize`.
fn overflowing_geometry() -> impl Strategy<Value = Geometry> {
    (1usize..=usize::MAX, 1usize..=usize::MAX, 1usize..=8)
        .prop_filter("frame size overflows", |(w, h, bpp)| {
            w.checked_mul(*h).and_then(|n| n.checked_mul(*bpp)).is_none()
        })
        .prop_map(|(w, h, bpp)| Geometry::new(w, h, bpp))
}

proptest! {
    /// Property: a valid geometry registers and a full read sequence delivers
    /// exactly one frame's worth of bytes.
    #[test]
    fn prop_full_read_sequence_delivers_frame_size(
        geometry in valid_geometry(),
        chunk in 1usize..=512,
    ) {
        let registry = common::small_registry(4);
        let (device, _capability) = common::register_mock(&registry, geometry);
        device.report_presence(true);

        let total = common::runtime().block_on(async {
            let mut file = registry.open(device.id(), OpenMode::NonBlocking).unwrap();
            let mut buf = vec![0u8; chunk];
            let mut total = 0;
            loop {
                let n = file.read(&mut buf).await.unwrap();
                if n == 0 {
                    break total;
                }
                total += n;
            }
        });

        prop_assert_eq!(total, geometry.frame_size());
    }

    /// Property: a zero dimension is rejected and consumes no identity.
    #[test]
    fn prop_invalid_geometry_rejected(geometry in invalid_geometry()) {
        let registry = common::small_registry(1);
        let result = registry.register(
            DeviceDescriptor::new("mock", geometry),
            Arc::new(MockCapability::new(1)),
        );
        prop_assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
        prop_assert_eq!(registry.allocate_identity().unwrap().as_u32(), 0);
    }

    /// Property: an overflowing frame size is rejected and consumes no identity.
    #[test]
    fn prop_overflowing_geometry_rejected(geometry in overflowing_geometry()) {
        let registry = common::small_registry(1);
        let result = registry.register(
            DeviceDescriptor::new("mock", geometry),
            Arc::new(MockCapability::new(1)),
        );
        prop_assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
        prop_assert!(registry.is_empty());
        prop_assert_eq!(registry.allocate_identity().unwrap().as_u32(), 0);
    }

    /// Property: reading `k` then `N - k` bytes yields the same bytes as one
    /// read of at least `N` bytes.
    #[test]
    fn prop_split_read_matches_single_read(
        geometry in valid_geometry(),
        split in any::<prop::sample::Index>(),
    ) {
        let n = geometry.frame_size();
        prop_assume!(n > 1);
        let k = 1 + split.index(n - 1);

        let registry = common::small_registry(4);
        let (device, _capability) = common::register_mock(&registry, geometry);
        device.report_presence(true);

        let (whole, parts) = common::runtime().block_on(async {
            let mut single = registry.open(device.id(), OpenMode::NonBlocking).unwrap();
            let mut whole = vec![0u8; n + 8];
            let read = single.read(&mut whole).await.unwrap();
            whole.truncate(read);

            let mut split = registry.open(device.id(), OpenMode::NonBlocking).unwrap();
            let mut first = vec![0u8; k];
            let mut second = vec![0u8; n - k];
            let a = split.read(&mut first).await.unwrap();
            let b = split.read(&mut second).await.unwrap();
            first.truncate(a);
            second.truncate(b);
            first.extend_from_slice(&second);

            (whole, first)
        });

        prop_assert_eq!(whole.len(), n);
        prop_assert_eq!(whole, parts);
    }
}
