use data_contracts::{CheckpointMeta, ExperimentSpecs, ShapeModelMeta, SpecsError};
use std::fs;

#[test]
fn specs_load_validates_on_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("specs.json");
    fs::write(&path, r#"{ "DataSource": "d", "CodeLength": 0 }"#).unwrap();
    let err = ExperimentSpecs::load(&path).unwrap_err();
    assert!(matches!(err, SpecsError::ZeroCodeLength));
}

#[test]
fn specs_load_reports_missing_file_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("specs.json");
    let err = ExperimentSpecs::load(&path).unwrap_err();
    assert!(err.to_string().contains("specs.json"));
}

#[test]
fn specs_save_then_load_keeps_pascal_case() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("exp").join("specs.json");
    let mut specs = ExperimentSpecs::new("voxels/chairs", 32);
    specs.fine_tune.steps_per_epoch = 3;
    specs.save(&path).unwrap();

    let raw = fs::read_to_string(&path).unwrap();
    assert!(raw.contains("\"DataSource\""));
    assert!(raw.contains("\"StepsPerEpoch\": 3"));

    let loaded = ExperimentSpecs::load(&path).unwrap();
    assert_eq!(loaded.code_length, 32);
    assert_eq!(loaded.fine_tune.steps_per_epoch, 3);
}

#[test]
fn shape_meta_written_under_missing_parent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("finetune").join("chair_01").join("best.json");
    let meta = ShapeModelMeta {
        shape_name: "chair_01".into(),
        source_checkpoint: "best".into(),
        epoch: 12,
        loss: 0.031,
        created_at_ms: 1,
    };
    meta.save(&path).unwrap();
    assert_eq!(ShapeModelMeta::load(&path).unwrap(), meta);
}

#[test]
fn corrupt_checkpoint_meta_is_invalid_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("best.json");
    fs::write(&path, b"not json").unwrap();
    let err = CheckpointMeta::load(&path).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}
