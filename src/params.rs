// physical constants and derived kernel coefficients
use std::f32::consts::PI;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::SimError;

/// Tunable physical constants, as read from `assets/fluid.toml` (or the
/// compiled-in defaults). Distances are in physical units except the
/// boundary box, which is in simulation units (`sim_scale` converts).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct FluidConfig {
    pub sim_scale: f32,
    pub smooth_radius: f32,
    pub mass: f32,
    pub rest_density: f32,
    pub stiffness: f32,
    pub viscosity: f32,
    pub ext_stiffness: f32,
    pub ext_damping: f32,
    pub speed_limit: f32,
    pub time_step: f32,
    pub volume_min: [f32; 3],
    pub volume_max: [f32; 3],
    pub gravity: [f32; 3],
}

impl Default for FluidConfig {
    fn default() -> Self {
        Self {
            sim_scale: 0.004,
            smooth_radius: 0.01,
            mass: 0.000_205_43,
            rest_density: 600.0,
            stiffness: 1.5,
            viscosity: 0.2,
            ext_stiffness: 10_000.0,
            ext_damping: 256.0,
            speed_limit: 200.0,
            time_step: 1.0,
            volume_min: [-15.0, -15.0, -15.0],
            volume_max: [15.0, 15.0, 15.0],
            gravity: [0.0, -9.8, 0.0],
        }
    }
}

impl FluidConfig {
    pub fn from_toml(text: &str) -> Result<Self, SimError> {
        Ok(toml::from_str(text)?)
    }
}

/// The fixed kernel-argument set. Computed once per reset from a
/// [`FluidConfig`] and never recomputed inside a kernel stage.
#[derive(Clone, Copy, Debug)]
pub struct FluidParams {
    pub sim_scale: f32,
    pub smooth_radius: f32,
    pub radius2: f32,
    pub mass: f32,
    pub rest_density: f32,
    pub stiffness: f32,
    pub viscosity: f32,
    pub poly6_coeff: f32,
    pub spiky_coeff: f32,
    pub visc_lap_coeff: f32,
    pub ext_stiffness: f32,
    pub ext_damping: f32,
    pub speed_limit: f32,
    pub time_step: f32,
    pub volume_min: Vec3,
    pub volume_max: Vec3,
    pub gravity: Vec3,
}

impl FluidParams {
    pub fn derive(cfg: &FluidConfig) -> Self {
        let h = cfg.smooth_radius;
        Self {
            sim_scale: cfg.sim_scale,
            smooth_radius: h,
            radius2: h * h,
            mass: cfg.mass,
            rest_density: cfg.rest_density,
            stiffness: cfg.stiffness,
            viscosity: cfg.viscosity,
            poly6_coeff: 315.0 / (64.0 * PI * h.powi(9)),
            spiky_coeff: -45.0 / (PI * h.powi(6)),
            visc_lap_coeff: 45.0 / (PI * h.powi(6)),
            ext_stiffness: cfg.ext_stiffness,
            ext_damping: cfg.ext_damping,
            speed_limit: cfg.speed_limit,
            time_step: cfg.time_step,
            volume_min: Vec3::from_array(cfg.volume_min),
            volume_max: Vec3::from_array(cfg.volume_max),
            gravity: Vec3::from_array(cfg.gravity),
        }
    }
}

impl Default for FluidParams {
    fn default() -> Self {
        Self::derive(&FluidConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_coefficients_match_formulas() {
        let p = FluidParams::default();
        let h = p.smooth_radius;
        assert_eq!(p.radius2, h * h);
        assert!((p.poly6_coeff - 315.0 / (64.0 * PI * h.powi(9))).abs() / p.poly6_coeff < 1e-6);
        assert!((p.spiky_coeff + 45.0 / (PI * h.powi(6))).abs() / p.spiky_coeff.abs() < 1e-6);
        assert!(p.spiky_coeff < 0.0);
        assert!(p.visc_lap_coeff > 0.0);
    }

    #[test]
    fn config_parses_with_partial_overrides() {
        let cfg = FluidConfig::from_toml("stiffness = 3.0\nviscosity = 0.5\n").unwrap();
        assert_eq!(cfg.stiffness, 3.0);
        assert_eq!(cfg.viscosity, 0.5);
        // untouched fields keep the defaults
        assert_eq!(cfg.smooth_radius, FluidConfig::default().smooth_radius);
    }

    #[test]
    fn bad_config_is_an_error() {
        assert!(FluidConfig::from_toml("stiffness = \"lots\"").is_err());
    }
}
