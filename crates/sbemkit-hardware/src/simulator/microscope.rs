//! Simulated microscope
//!
//! Renders a fixed field of Gaussian particles. The field moves across the
//! frame as the simulated stage moves, following a known ("true") stage
//! calibration, so a calibration run against it has a checkable answer.

use super::microtome::SimulatedMicrotome;
use crate::microscope::{FrameSettings, Microscope};
use crate::microtome::HardwareResult;
use image::{GrayImage, Luma};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sbemkit_core::{HardwareFault, StageCalibration};
use std::sync::Arc;

/// Optical model of the simulated rig
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedOptics {
    /// Calibration a perfect measurement would recover.
    pub truth: StageCalibration,
    /// Beam energy reported by `eht_kv` (kV).
    pub eht_kv: f64,
    /// Particles per µm² of sample.
    pub density: f64,
    /// Particle radius (1σ, µm).
    pub sigma_um: f64,
    /// Half-width of the square sample region populated with particles (µm).
    pub field_um: f64,
}

impl Default for SimulatedOptics {
    fn default() -> Self {
        Self {
            truth: StageCalibration::default(),
            eht_kv: 1.5,
            density: 0.35,
            sigma_um: 0.25,
            field_um: 40.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Particle {
    x: f64,
    y: f64,
    amplitude: f64,
}

#[derive(Debug)]
struct ScopeState {
    eht_on: bool,
    eht_target: bool,
    ramp_remaining: u32,
    ramp_polls: u32,
    mag_factor: f64,
    frames: usize,
    frame_faults: Vec<(usize, HardwareFault)>,
}

/// In-process microscope looking at a [`SimulatedMicrotome`]'s stage
#[derive(Debug)]
pub struct SimulatedMicroscope {
    stage: Arc<SimulatedMicrotome>,
    optics: SimulatedOptics,
    particles: Vec<Particle>,
    state: Mutex<ScopeState>,
}

impl SimulatedMicroscope {
    /// Create a microscope with a particle field generated from `seed`.
    pub fn new(stage: Arc<SimulatedMicrotome>, optics: SimulatedOptics, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let area = (2.0 * optics.field_um).powi(2);
        let count = (area * optics.density).round() as usize;
        let particles = (0..count)
            .map(|_| Particle {
                x: rng.gen_range(-optics.field_um..optics.field_um),
                y: rng.gen_range(-optics.field_um..optics.field_um),
                amplitude: rng.gen_range(90.0..200.0),
            })
            .collect();

        Self {
            stage,
            optics,
            particles,
            state: Mutex::new(ScopeState {
                eht_on: true,
                eht_target: true,
                ramp_remaining: 0,
                ramp_polls: 0,
                mag_factor: 1000.0,
                frames: 0,
                frame_faults: Vec::new(),
            }),
        }
    }

    /// Number of `is_eht_on` polls before a requested switch takes effect.
    pub fn with_eht_ramp(self, polls: u32) -> Self {
        self.state.lock().ramp_polls = polls;
        self
    }

    /// Start with the beam off.
    pub fn with_eht_off(self) -> Self {
        {
            let mut state = self.state.lock();
            state.eht_on = false;
            state.eht_target = false;
        }
        self
    }

    /// Fail the `call`-th frame acquisition (1-based).
    pub fn inject_frame_fault(&self, call: usize, fault: HardwareFault) {
        self.state.lock().frame_faults.push((call, fault));
    }

    /// Number of frames acquired so far (including failed ones).
    pub fn frames_acquired(&self) -> usize {
        self.state.lock().frames
    }

    /// Sample-frame offset (µm) produced by the current stage position.
    fn stage_offset(&self) -> (f64, f64) {
        let pos = self.stage.position();
        let t = &self.optics.truth;
        let sx = pos.x / t.scale_x;
        let sy = pos.y / t.scale_y;
        (
            sx * t.rotation_x.cos() - sy * t.rotation_y.sin(),
            sx * t.rotation_x.sin() + sy * t.rotation_y.cos(),
        )
    }

    fn render(&self, settings: &FrameSettings) -> GrayImage {
        let px_um = settings.pixel_size_nm / 1000.0;
        let (ox, oy) = self.stage_offset();
        let (w, h) = (settings.width as usize, settings.height as usize);
        let sigma_px = self.optics.sigma_um / px_um;
        let reach = (4.0 * sigma_px).ceil() as i64;
        let mut buffer = vec![30.0f64; w * h];

        for p in &self.particles {
            // Particle centre in frame pixels; frame centre is the sample origin.
            let cx = (p.x + ox) / px_um + w as f64 / 2.0;
            let cy = (p.y + oy) / px_um + h as f64 / 2.0;
            let x0 = (cx.floor() as i64 - reach).max(0);
            let x1 = (cx.ceil() as i64 + reach).min(w as i64 - 1);
            let y0 = (cy.floor() as i64 - reach).max(0);
            let y1 = (cy.ceil() as i64 + reach).min(h as i64 - 1);
            for y in y0..=y1 {
                for x in x0..=x1 {
                    let r2 = (x as f64 - cx).powi(2) + (y as f64 - cy).powi(2);
                    buffer[y as usize * w + x as usize] +=
                        p.amplitude * (-r2 / (2.0 * sigma_px * sigma_px)).exp();
                }
            }
        }

        GrayImage::from_fn(settings.width, settings.height, |x, y| {
            let v = buffer[y as usize * w + x as usize];
            Luma([v.round().clamp(0.0, 255.0) as u8])
        })
    }
}

impl Microscope for SimulatedMicroscope {
    fn eht_kv(&self) -> f64 {
        self.optics.eht_kv
    }

    fn is_eht_on(&self) -> HardwareResult<bool> {
        let mut state = self.state.lock();
        if state.ramp_remaining > 0 {
            state.ramp_remaining -= 1;
        } else {
            state.eht_on = state.eht_target;
        }
        Ok(state.eht_on)
    }

    fn turn_eht_on(&self) -> HardwareResult<()> {
        let mut state = self.state.lock();
        state.eht_target = true;
        state.ramp_remaining = state.ramp_polls;
        Ok(())
    }

    fn turn_eht_off(&self) -> HardwareResult<()> {
        let mut state = self.state.lock();
        state.eht_target = false;
        state.ramp_remaining = state.ramp_polls;
        Ok(())
    }

    fn acquire_frame(&self, settings: &FrameSettings) -> HardwareResult<GrayImage> {
        {
            let mut state = self.state.lock();
            state.frames += 1;
            let frame = state.frames;
            if let Some((_, fault)) = state.frame_faults.iter().find(|(call, _)| *call == frame) {
                return Err(fault.clone());
            }
            if !state.eht_on {
                return Err(HardwareFault::Device {
                    code: 302,
                    cause: "EHT is off".to_string(),
                });
            }
        }
        Ok(self.render(settings))
    }

    fn mag_calibration_factor(&self) -> f64 {
        self.state.lock().mag_factor
    }

    fn set_mag_calibration_factor(&self, factor: f64) -> HardwareResult<()> {
        self.state.lock().mag_factor = factor;
        Ok(())
    }
}
