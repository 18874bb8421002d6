// ShrinkingMap integration suite.
//
// Invariants exercised:
// - Presence: get(k) is Some iff k's latest write was not followed by a
//   removal of k.
// - Accounting: deletions accumulate until they exceed a nonzero limit,
//   then a shrink runs before the deleting call returns and the counter
//   is zero again.
// - Preservation: a shrink never changes keys or values.
use shrinking_map::{DeleteAccounting, ShrinkConfig, ShrinkingMap};
use std::collections::BTreeMap;

fn contents(m: &ShrinkingMap<String, u64>) -> BTreeMap<String, u64> {
    m.values().iter().map(|(k, v)| (k.clone(), *v)).collect()
}

// Test: the limit-2 walkthrough.
// Verifies: counter is 1, 2, then the third deletion (of an absent key)
// crosses the limit, shrinks, and resets to zero.
#[test]
fn limit_two_walkthrough() {
    let mut m = ShrinkingMap::new(2);
    m.set("a", "a");
    m.set("b", "b");

    m.delete([&"a"]);
    assert_eq!(m.deleted(), 1);
    m.delete([&"b"]);
    assert_eq!(m.deleted(), 2);
    assert_eq!(m.shrink_count(), 0);

    m.delete([&"c"]);
    assert_eq!(m.deleted(), 0);
    assert_eq!(m.shrink_count(), 1);
    assert!(m.is_empty());
}

// Test: batch delete is charged after the whole batch.
// Verifies: one shrink per crossing batch, no matter how far past the limit.
#[test]
fn batch_delete_shrinks_once() {
    let mut m: ShrinkingMap<String, u64> = ShrinkingMap::new(3);
    for i in 0..20 {
        m.set(format!("k{i}"), i);
    }
    let doomed: Vec<String> = (0..10).map(|i| format!("k{i}")).collect();
    m.delete(doomed.iter().map(String::as_str));
    assert_eq!(m.shrink_count(), 1);
    assert_eq!(m.deleted(), 0);
    assert_eq!(m.len(), 10);
    for i in 10..20 {
        assert_eq!(m.get(format!("k{i}").as_str()), Some(&i));
    }
}

// Test: contents survive automatic shrinks during a long churn.
#[test]
fn churn_preserves_survivors() {
    let mut m: ShrinkingMap<String, u64> = ShrinkingMap::new(16);
    let mut expected = BTreeMap::new();
    for round in 0..50u64 {
        for i in 0..10 {
            let k = format!("r{round}-{i}");
            m.set(k.clone(), round * 10 + i);
            expected.insert(k, round * 10 + i);
        }
        for i in 0..7 {
            let k = format!("r{round}-{i}");
            assert_eq!(m.get_and_delete(k.as_str()), Some(round * 10 + i));
            expected.remove(&k);
        }
    }
    assert!(m.shrink_count() > 0);
    assert!(m.deleted() <= 16);
    assert_eq!(contents(&m), expected);
}

// Test: get_or_set only writes when the key is absent.
#[test]
fn get_or_set_semantics() {
    let mut m: ShrinkingMap<String, u64> = ShrinkingMap::new(0);
    assert_eq!(*m.get_or_set("k".to_string(), 1), 1);
    let before = contents(&m);
    assert_eq!(*m.get_or_set("k".to_string(), 2), 1);
    assert_eq!(contents(&m), before);
}

// Test: get_and_delete of an absent key leaves everything untouched.
#[test]
fn get_and_delete_absent_is_noop() {
    let mut m: ShrinkingMap<String, u64> = ShrinkingMap::new(1);
    m.set("x".to_string(), 9);
    let before = contents(&m);
    assert_eq!(m.get_and_delete("y"), None);
    assert_eq!(contents(&m), before);
    assert_eq!(m.deleted(), 0);
}

// Test: both accounting policies on the same workload of absent keys.
// Verifies: PerKey churns through shrinks; RemovedOnly never does.
#[test]
fn accounting_policies_on_absent_keys() {
    let mut per_key: ShrinkingMap<u32, u32> = ShrinkingMap::new(4);
    let mut removed_only: ShrinkingMap<u32, u32> =
        ShrinkingMap::with_config(ShrinkConfig::new(4).with_accounting(DeleteAccounting::RemovedOnly));

    for i in 0..20u32 {
        per_key.delete([&i]);
        removed_only.delete([&i]);
    }
    assert_eq!(per_key.shrink_count(), 4);
    assert_eq!(removed_only.shrink_count(), 0);
    assert_eq!(removed_only.deleted(), 0);
}

// Test: set_limit / limit round-trip and disabling.
#[test]
fn limit_can_be_changed_and_disabled() {
    let mut m: ShrinkingMap<u32, u32> = ShrinkingMap::new(1);
    assert_eq!(m.limit(), 1);
    m.set_limit(0);
    for i in 0..10u32 {
        m.delete([&i]);
    }
    assert_eq!(m.shrink_count(), 0);
    assert_eq!(m.deleted(), 10);

    m.set_limit(5);
    m.delete([&99]);
    assert_eq!(m.shrink_count(), 1);
    assert_eq!(m.deleted(), 0);
}

// Test: ShrinkingMap can move to another thread when its contents can.
#[test]
fn sequential_map_is_send() {
    let mut m: ShrinkingMap<u32, String> = ShrinkingMap::new(2);
    m.set(1, "one".to_string());
    let m = std::thread::spawn(move || {
        m.delete([&1, &2, &3]);
        m
    })
    .join()
    .unwrap();
    assert_eq!(m.shrink_count(), 1);
    assert!(m.is_empty());
}
