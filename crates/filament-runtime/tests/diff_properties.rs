//! Property tests for the structural differ: the diff must be a faithful,
//! minimal description of how to turn the old value into the new one.

use proptest::prelude::*;
use serde_json::Value;

use filament_runtime::{apply_diff, diff_and_clone};

fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        "[a-z]{0,4}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            proptest::collection::btree_map("[a-z]{1,2}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn applying_the_diff_reproduces_the_new_value(old in arb_json(), new in arb_json()) {
        let result = diff_and_clone(&new, &old);
        let mut patched = old.clone();
        apply_diff(&mut patched, &result.diff_data);
        prop_assert_eq!(patched, new);
    }

    #[test]
    fn identical_values_produce_empty_diffs(value in arb_json()) {
        let result = diff_and_clone(&value, &value);
        prop_assert!(!result.changed());
        prop_assert!(result.diff_data.is_empty());
    }

    #[test]
    fn the_clone_equals_the_input(new in arb_json(), old in arb_json()) {
        prop_assert_eq!(diff_and_clone(&new, &old).clone, new);
    }
}
