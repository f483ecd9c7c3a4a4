use console_core::defaults;
use console_core::tree::{ParamTree, Path, PathError};
use serde_json::json;

#[test]
fn set_replaces_target_and_preserves_siblings() {
    let tree = defaults::simulation_params();
    let path = Path::root().key("viscosity");
    let updated = tree.set(&path, ParamTree::Number(0.05)).expect("valid path");

    assert_eq!(updated.get(&path).unwrap(), &ParamTree::Number(0.05));

    let sibling = Path::root().key("grid_resolution");
    assert_eq!(updated.get(&sibling).unwrap(), tree.get(&sibling).unwrap());

    // The input tree is untouched.
    assert_eq!(tree.get(&path).unwrap(), &ParamTree::Number(0.02));
}

#[test]
fn set_deep_sequence_element() {
    let tree = defaults::visualization_params();
    let path = Path::root().key("camera_location").index(2);
    let updated = tree.set(&path, ParamTree::Number(4.0)).expect("valid path");

    assert_eq!(updated.get(&path).unwrap(), &ParamTree::Number(4.0));

    let neighbor = Path::root().key("camera_location").index(0);
    assert_eq!(updated.get(&neighbor).unwrap(), tree.get(&neighbor).unwrap());
}

#[test]
fn set_never_creates_nodes() {
    let tree = defaults::simulation_params();

    // One segment past an existing leaf.
    let too_deep = Path::root().key("viscosity").key("nested");
    let err = tree.set(&too_deep, ParamTree::Number(1.0)).unwrap_err();
    assert!(matches!(err, PathError::KindMismatch { .. }), "got {err:?}");

    let missing = Path::root().key("no_such_param");
    let err = tree.set(&missing, ParamTree::Number(1.0)).unwrap_err();
    assert!(matches!(err, PathError::UnknownKey { .. }), "got {err:?}");
}

#[test]
fn empty_path_is_not_a_set_target() {
    let tree = defaults::simulation_params();
    let err = tree.set(&Path::root(), ParamTree::Number(1.0)).unwrap_err();
    assert_eq!(err, PathError::Empty);
}

#[test]
fn index_into_mapping_is_a_kind_mismatch() {
    let tree = defaults::simulation_params();
    let err = tree.get(&Path::root().index(0)).unwrap_err();
    assert!(matches!(err, PathError::KindMismatch { kind: "mapping", .. }), "got {err:?}");
}

#[test]
fn out_of_bounds_index_reports_len() {
    let tree = defaults::simulation_params();
    let err = tree.get(&Path::root().key("grid_resolution").index(5)).unwrap_err();
    assert_eq!(
        err,
        PathError::OutOfBounds {
            index: 5,
            len: 2,
            at: "grid_resolution".to_string(),
        }
    );
}

#[test]
fn from_value_rejects_null_and_bool() {
    assert!(ParamTree::from_value(&json!({"flag": true})).is_err());
    assert!(ParamTree::from_value(&json!({"hole": null})).is_err());
    assert!(ParamTree::from_value(&json!([1, false])).is_err());
}

#[test]
fn value_round_trip_preserves_shape() {
    let tree = defaults::simulation_params();
    let back = ParamTree::from_value(&tree.to_value()).expect("round trip");
    assert_eq!(back, tree);
}

#[test]
fn path_parse_and_display_round_trip() {
    for s in ["viscosity", "camera_location[2]", "a.b[0].c", "[1]", "grid_resolution[0]"] {
        let path: Path = s.parse().expect(s);
        assert_eq!(path.to_string(), s);
    }

    assert!("".parse::<Path>().is_err());
    assert!("a[x]".parse::<Path>().is_err());
    assert!(".a".parse::<Path>().is_err());
}
