use std::sync::Arc;

use picfly::{Blur, Grayscale, RequestDescriptor, Rotate, Transformation};
use proptest::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Blur,
    Gray,
    Rotate,
}

impl Op {
    fn build(self) -> Arc<dyn Transformation> {
        match self {
            Op::Blur => Arc::new(Blur::new(5.0)),
            Op::Gray => Arc::new(Grayscale),
            Op::Rotate => Arc::new(Rotate::new(90.0)),
        }
    }
}

#[derive(Debug, Clone)]
struct Shape {
    url: &'static str,
    size: (u32, u32),
    ops: Vec<Op>,
}

impl Shape {
    fn descriptor(&self) -> RequestDescriptor {
        self.ops.iter().fold(
            RequestDescriptor::new(self.url).with_resize(self.size.0, self.size.1),
            |request, op| request.with_transformation(op.build()),
        )
    }

    /// 指纹语义上的身份：缩放只有两边都为正时才算数。
    fn identity(&self) -> (&'static str, Option<(u32, u32)>, Vec<Op>) {
        let size = (self.size.0 > 0 && self.size.1 > 0).then_some(self.size);
        (self.url, size, self.ops.clone())
    }
}

fn shape() -> impl Strategy<Value = Shape> {
    (
        prop::sample::select(vec!["http://host/a.png", "http://host/b.png"]),
        prop::sample::select(vec![(0u32, 0u32), (10, 10), (10, 20), (0, 20)]),
        prop::collection::vec(
            prop::sample::select(vec![Op::Blur, Op::Gray, Op::Rotate]),
            0..3,
        ),
    )
        .prop_map(|(url, size, ops)| Shape { url, size, ops })
}

proptest! {
    #[test]
    fn fingerprints_match_exactly_when_identities_match(a in shape(), b in shape()) {
        let same_fingerprint = a.descriptor().fingerprint() == b.descriptor().fingerprint();
        prop_assert_eq!(same_fingerprint, a.identity() == b.identity());
    }

    #[test]
    fn fingerprint_is_stable_across_rebuilds(a in shape()) {
        prop_assert_eq!(a.descriptor().fingerprint(), a.descriptor().fingerprint());
    }
}
