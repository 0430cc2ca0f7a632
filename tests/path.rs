//! `Path` prefix semantics exercised through its public constructors, as
//! used by `Client::stores_matching`.

use operon::path::Path;

#[test]
fn two_element_prefix_matches_a_three_element_extension() {
    let prefix = Path::from(["a", "b"]);
    let full = Path::from_segments(vec!["a".into(), "b".into(), "c".into()]);
    assert!(prefix.is_prefix_of(&full));
}

#[test]
fn a_path_diverging_in_its_second_element_is_not_a_prefix() {
    let diverging = Path::from(["a", "c"]);
    let full = Path::from_segments(vec!["a".into(), "b".into(), "c".into()]);
    assert!(!diverging.is_prefix_of(&full));
}

#[test]
fn mixed_segment_kinds_compare_structurally() {
    let prefix = Path::from(["users"]);
    let full = Path::from_segments(vec!["users".into(), 7u64.into(), "friends".into()]);
    assert!(prefix.is_prefix_of(&full));

    let wrong_id = Path::from_segments(vec!["users".into(), 8u64.into()]);
    assert!(!prefix.appending(7u64).is_prefix_of(&wrong_id));
}
