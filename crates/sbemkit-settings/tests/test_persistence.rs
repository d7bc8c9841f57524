use sbemkit_core::StageCalibration;
use sbemkit_settings::{
    CalibrationStore, Config, ConfigCalibrationStore, MemoryCalibrationStore, SettingsManager,
};
use tempfile::tempdir;

fn sample_calibration() -> StageCalibration {
    StageCalibration {
        scale_x: 1.0234,
        scale_y: 0.9871,
        rotation_x: 0.0123,
        rotation_y: 0.0456,
    }
}

#[test]
fn test_toml_and_json_files_agree() {
    let dir = tempdir().expect("tempdir");
    let mut config = Config::new();
    config.approach.default_slices = 12;
    config.motor_test.seed = Some(99);
    config.acquisition.base_dir = Some(dir.path().to_path_buf());
    config.set_stage_calibration(1.5, sample_calibration());

    for name in ["settings.toml", "settings.json"] {
        let path = dir.path().join(name);
        config.save_to_file(&path).expect("save");
        let loaded = Config::load_from_file(&path).expect("load");
        assert_eq!(loaded, config, "mismatch for {name}");
    }
}

#[test]
fn test_measured_calibration_is_bit_exact_after_reload() {
    let dir = tempdir().expect("tempdir");
    let measured = StageCalibration {
        scale_x: 1.6 / 1.599_87,
        scale_y: 0.9999614834136179,
        rotation_x: (-0.3f64).atan2(243.0),
        rotation_y: 0.1 + 0.2 - 0.2,
    };
    let mut config = Config::new();
    config.set_stage_calibration(1.5, measured);

    for name in ["settings.json", "settings.toml"] {
        let path = dir.path().join(name);
        config.save_to_file(&path).expect("save");
        let loaded = Config::load_from_file(&path).expect("load");
        let reloaded = loaded.stage_calibration_for(1.5).expect("entry");
        assert_eq!(reloaded.scale_y.to_bits(), measured.scale_y.to_bits(), "{name}");
        assert_eq!(reloaded, measured, "{name}");
    }
}

#[test]
fn test_partial_file_fills_defaults() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("partial.toml");
    std::fs::write(&path, "[approach]\nmax_slices = 40\n").expect("write");

    let loaded = Config::load_from_file(&path).expect("load");
    assert_eq!(loaded.approach.max_slices, 40);
    assert_eq!(loaded.approach.default_slices, 5);
    assert_eq!(loaded.motor_test.xy_bound_um, 600.0);
}

#[test]
fn test_invalid_file_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[microtome]\nmotor_speed_x = -3.0\n").expect("write");
    assert!(Config::load_from_file(&path).is_err());
}

#[test]
fn test_config_store_writes_through() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("settings.toml");

    let store = ConfigCalibrationStore::new(SettingsManager::new(&path));
    assert!(store.stage_calibration(1.5).is_none());
    store
        .store_stage_calibration(1.5, sample_calibration())
        .expect("store");

    let reloaded = SettingsManager::load_or_default(&path).expect("reload");
    assert_eq!(
        reloaded.config().stage_calibration_for(1.5),
        Some(sample_calibration())
    );
}

#[test]
fn test_store_rejects_invalid_calibration() {
    let store = MemoryCalibrationStore::new();
    let bad = StageCalibration {
        scale_x: 0.0,
        ..sample_calibration()
    };
    assert!(store.store_stage_calibration(1.5, bad).is_err());
    assert_eq!(store.writes(), 0);
    assert!(store.stage_calibration(1.5).is_none());
}
