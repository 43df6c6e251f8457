// Headless CPU run: steps the fluid and prints a few aggregates, handy for
// eyeballing stability after retuning constants.
use fluidsim::params::FluidConfig;
use fluidsim::system::{FluidSystem, ParticleSystem};
use glam::Vec3;

const PARTICLES: usize = 512;
const STEPS: usize = 100;

fn main() {
    let mut sys = FluidSystem::new(&FluidConfig::default());
    sys.reset(PARTICLES, 42).expect("reset failed");

    for step in 1..=STEPS {
        sys.update(1.0);
        if step % 10 == 0 {
            let n = sys.len() as f32;
            let com = sys
                .positions()
                .iter()
                .fold(Vec3::ZERO, |acc, p| acc + p.truncate())
                / n;
            let max_rho = sys.densities().iter().cloned().fold(0.0f32, f32::max);
            let max_speed = sys
                .velocities()
                .iter()
                .map(|v| v.truncate().length())
                .fold(0.0f32, f32::max);
            println!(
                "step {step:3}  com ({:7.3} {:7.3} {:7.3})  max rho {max_rho:9.2}  max speed {max_speed:8.2}",
                com.x, com.y, com.z
            );
        }
    }
}
