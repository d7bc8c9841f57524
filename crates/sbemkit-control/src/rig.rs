//! Hardware bundle and run factories
//!
//! A [`Rig`] holds the collaborators every run needs and builds runs from
//! operator input plus the current [`Config`]. All input validation happens
//! here, before a worker is started.

use crate::approach::{ApproachParams, ApproachSequencer};
use crate::beam::EhtSwitchRun;
use crate::calibration::{StageCalibrationParams, StageCalibrationRun};
use crate::log::OperatorLog;
use crate::motor_test::{MotorStressTester, MotorTestParams, WalkBounds};
use crate::stage_move::StageMoveRun;
use sbemkit_core::{StageCalibration, ValidationError, XyPosition};
use sbemkit_hardware::{
    CorrelationRegistration, FrameSettings, ImageRegistration, Microscope, Microtome,
    SimulatedMicroscope, SimulatedMicrotome, SimulatedOptics,
};
use sbemkit_settings::{CalibrationStore, Config};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// The collaborators of one acquisition rig
#[derive(Clone)]
pub struct Rig {
    pub microtome: Arc<dyn Microtome>,
    pub microscope: Arc<dyn Microscope>,
    pub registration: Arc<dyn ImageRegistration>,
    pub store: Arc<dyn CalibrationStore>,
    pub log: OperatorLog,
}

impl Rig {
    pub fn new(
        microtome: Arc<dyn Microtome>,
        microscope: Arc<dyn Microscope>,
        registration: Arc<dyn ImageRegistration>,
        store: Arc<dyn CalibrationStore>,
    ) -> Self {
        Self {
            microtome,
            microscope,
            registration,
            store,
            log: OperatorLog::new(),
        }
    }

    /// Simulated microtome and microscope configured from `config`.
    ///
    /// `truth` is the calibration the simulated optics follow.
    pub fn simulated(config: &Config, truth: StageCalibration, store: Arc<dyn CalibrationStore>) -> Self {
        let microtome = Arc::new(
            SimulatedMicrotome::new().with_cut_duration(config.microtome.full_cut_duration()),
        );
        let optics = SimulatedOptics {
            truth,
            ..Default::default()
        };
        let microscope = Arc::new(SimulatedMicroscope::new(
            microtome.clone(),
            optics,
            config.motor_test.seed.unwrap_or(0),
        ));
        tracing::info!("Using simulated rig at {:.2} kV", optics.eht_kv);
        Self::new(
            microtome,
            microscope,
            Arc::new(CorrelationRegistration::new(config.calibration.search_radius_px)),
            store,
        )
    }

    /// Approach run for `slices` cuts of `thickness_nm`.
    pub fn approach(
        &self,
        config: &Config,
        slices: u32,
        thickness_nm: f64,
    ) -> Result<ApproachSequencer, ValidationError> {
        let params = ApproachParams::validated(slices, thickness_nm, config.approach.max_slices)?;
        Ok(
            ApproachSequencer::new(self.microtome.clone(), params, self.log.clone())
                .with_z_retry(config.microtome.z_read_retry())
                .with_cycle_estimate(Duration::from_secs_f64(config.approach.cycle_estimate_s)),
        )
    }

    /// Motor test lasting `duration_min` minutes, optionally capped at
    /// `max_moves` iterations.
    pub fn motor_test(
        &self,
        config: &Config,
        duration_min: u32,
        max_moves: Option<u64>,
    ) -> Result<MotorStressTester, ValidationError> {
        let settings = &config.motor_test;
        let params = MotorTestParams::validated(
            duration_min,
            settings.max_duration_min,
            base_dir(config).join(&settings.log_file_name),
        )?
        .with_bounds(WalkBounds {
            xy_um: settings.xy_bound_um,
            z_um: settings.z_bound_um,
        })?
        .with_seed(settings.seed);
        let params = match max_moves {
            Some(cap) => params.with_max_moves(cap),
            None => params,
        };
        Ok(MotorStressTester::new(
            self.microtome.clone(),
            params,
            self.log.clone(),
        ))
    }

    /// Stage calibration with the configured frame settings.
    pub fn stage_calibration(
        &self,
        config: &Config,
        shift_distance_um: Option<f64>,
    ) -> Result<StageCalibrationRun, ValidationError> {
        let cal = &config.calibration;
        let frame = FrameSettings {
            width: cal.frame_width,
            height: cal.frame_height,
            pixel_size_nm: cal.pixel_size_nm,
            dwell_time_us: cal.dwell_time_us,
        };
        let save_dir = config
            .acquisition
            .save_calibration_frames
            .then(|| config.acquisition.base_dir.clone())
            .flatten();
        let params = StageCalibrationParams::validated(
            shift_distance_um.unwrap_or(cal.shift_distance_um),
            frame,
            save_dir,
        )?;
        Ok(StageCalibrationRun::new(
            self.microtome.clone(),
            self.microscope.clone(),
            self.registration.clone(),
            self.store.clone(),
            params,
            self.log.clone(),
        ))
    }

    pub fn stage_move(&self, x: f64, y: f64) -> Result<StageMoveRun, ValidationError> {
        if !x.is_finite() || !y.is_finite() {
            return Err(ValidationError::invalid("target", "coordinates must be finite"));
        }
        Ok(StageMoveRun::new(
            self.microtome.clone(),
            XyPosition::new(x, y),
            self.log.clone(),
        ))
    }

    pub fn eht_switch(&self, on: bool) -> EhtSwitchRun {
        EhtSwitchRun::new(self.microscope.clone(), on, self.log.clone())
    }
}

fn base_dir(config: &Config) -> PathBuf {
    config
        .acquisition
        .base_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."))
}
