//! Property tests for broadcasting.

use proptest::prelude::*;

use crate::shape::{broadcast_index, broadcast_shapes, broadcasts_to, numel, resolve_reshape};

use super::generators::*;

proptest! {
    /// An operand built to broadcast onto a target does so without growing it.
    #[test]
    fn broadcast_onto_target((target, operand) in arb_broadcast_pair(4, 4)) {
        prop_assert!(broadcasts_to(&operand, &target));
        prop_assert_eq!(broadcast_shapes(&operand, &target).unwrap().to_vec(), target.clone());
        prop_assert_eq!(broadcast_shapes(&target, &operand).unwrap().to_vec(), target);
    }

    /// Broadcast indices stay inside the operand.
    #[test]
    fn broadcast_index_in_bounds((target, operand) in arb_broadcast_pair(4, 4)) {
        for i in 0..numel(&target) {
            prop_assert!(broadcast_index(i, &target, &operand) < numel(&operand));
        }
    }

    /// Flattening preserves the element count.
    #[test]
    fn reshape_flatten(shape in arb_shape(4, 5)) {
        let flat = resolve_reshape(&shape, &[-1], false).unwrap();
        prop_assert_eq!(flat.as_slice(), &[numel(&shape)]);
    }
}
