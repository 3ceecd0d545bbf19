use std::collections::BTreeMap;
use std::collections::HashMap;

use vhl_core::{compute_sha256, params_fingerprint};

#[test]
fn sha256_matches_known_digests() {
    assert_eq!(
        compute_sha256(""),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    assert_eq!(
        compute_sha256("abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn fingerprint_ignores_insertion_order() {
    let mut first = HashMap::new();
    first.insert("r", 1000);
    first.insert("c", 3);
    let mut second = HashMap::new();
    second.insert("c", 3);
    second.insert("r", 1000);
    let control: BTreeMap<String, f64> = BTreeMap::new();

    let a = params_fingerprint(&first, &control).expect("fingerprint");
    let b = params_fingerprint(&second, &control).expect("fingerprint");
    assert_eq!(a, b);
    assert_eq!(a.len(), 8);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn fingerprint_distinguishes_model_and_control_sides() {
    let empty: BTreeMap<String, i64> = BTreeMap::new();
    let mut params = BTreeMap::new();
    params.insert("r".to_string(), 1000_i64);
    let left = params_fingerprint(&params, &empty).expect("fingerprint");
    let right = params_fingerprint(&empty, &params).expect("fingerprint");
    assert_ne!(left, right);
}

