use std::time::{SystemTime, UNIX_EPOCH};

use bevy::input::mouse::MouseMotion;
use bevy::prelude::*;

use fluidsim::gpu::buffers::{GpuFluidPlugin, GpuResetEpoch, UseGpuCompute};
use fluidsim::params::FluidConfig;
use fluidsim::system::{FluidSystem, ParticleSystem, Simulation, TestSystem};
use fluidsim::{ShowBounds, ViewOrbit};

/// Fixed per application; changing it requires a reset anyway.
const PARTICLE_COUNT: usize = 2025;
const CONFIG_PATH: &str = "assets/fluid.toml";

#[derive(Resource)]
struct AppConfig(FluidConfig);

fn main() {
    App::new()
        .add_plugins(DefaultPlugins)
        .insert_resource(ClearColor(Color::Srgba(
            bevy::color::palettes::css::DARK_SLATE_GRAY,
        )))
        .init_resource::<ViewOrbit>()
        .insert_resource(ShowBounds(true))
        .add_plugins(GpuFluidPlugin)
        .add_systems(Startup, setup)
        .add_systems(
            Update,
            (keyboard_controls, drive_simulation, orbit_camera, draw_bounds),
        )
        .run();
}

fn load_config() -> FluidConfig {
    match std::fs::read_to_string(CONFIG_PATH) {
        Ok(text) => match FluidConfig::from_toml(&text) {
            Ok(cfg) => {
                info!("loaded fluid config from {CONFIG_PATH}");
                cfg
            }
            Err(e) => {
                warn!("ignoring malformed {CONFIG_PATH}: {e}");
                FluidConfig::default()
            }
        },
        Err(_) => FluidConfig::default(),
    }
}

fn wall_clock_seed() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

fn orbit_transform(orbit: &ViewOrbit) -> Transform {
    let eye = Quat::from_rotation_y(orbit.yaw)
        * Quat::from_rotation_x(-orbit.pitch)
        * (Vec3::Z * orbit.distance);
    Transform::from_translation(eye).looking_at(Vec3::ZERO, Vec3::Y)
}

fn setup(mut commands: Commands, mut epoch: ResMut<GpuResetEpoch>) {
    let config = load_config();

    let mut fluid = FluidSystem::new(&config);
    let seed = wall_clock_seed();
    match fluid.reset(PARTICLE_COUNT, seed) {
        Ok(()) => {
            epoch.epoch += 1;
            epoch.seed = seed;
        }
        Err(e) => error!("initial reset failed: {e}"),
    }

    commands.insert_resource(AppConfig(config));
    commands.insert_resource(Simulation::Fluid(fluid));
    commands.spawn((Camera3d::default(), orbit_transform(&ViewOrbit::default())));
}

/// Translates key events into driver operations. Everything here is a thin
/// dispatch; the driver owns the semantics.
fn keyboard_controls(
    keys: Res<ButtonInput<KeyCode>>,
    mut sim: ResMut<Simulation>,
    mut epoch: ResMut<GpuResetEpoch>,
    mut show_bounds: ResMut<ShowBounds>,
    mut use_gpu: ResMut<UseGpuCompute>,
    cfg: Res<AppConfig>,
) {
    if keys.just_pressed(KeyCode::KeyR) {
        reset_sim(&mut sim, &mut epoch);
    }
    if keys.just_pressed(KeyCode::Space) {
        info!("paused: {}", sim.toggle_pause());
    }
    if keys.just_pressed(KeyCode::KeyD) {
        info!("drain: {}", sim.toggle_drain());
    }
    if keys.just_pressed(KeyCode::KeyF) {
        info!("fountain: {}", sim.toggle_fountain());
    }
    if keys.just_pressed(KeyCode::KeyW) {
        sim.emit_wave();
        info!("wave emitted");
    }
    if keys.just_pressed(KeyCode::KeyB) {
        show_bounds.0 = !show_bounds.0;
    }
    if keys.just_pressed(KeyCode::KeyG) {
        use_gpu.0 = !use_gpu.0;
        if use_gpu.0 {
            // reseed device-side state; only positions were ever uploaded
            epoch.epoch += 1;
            epoch.seed = wall_clock_seed();
        }
        info!("gpu compute: {}", use_gpu.0);
    }
    if keys.just_pressed(KeyCode::KeyT) {
        *sim = match &*sim {
            Simulation::Fluid(_) => {
                info!("switching to test system");
                Simulation::Test(TestSystem::new(&cfg.0))
            }
            Simulation::Test(_) => {
                info!("switching to fluid system");
                Simulation::Fluid(FluidSystem::new(&cfg.0))
            }
        };
        reset_sim(&mut sim, &mut epoch);
    }
}

fn reset_sim(sim: &mut Simulation, epoch: &mut GpuResetEpoch) {
    let seed = wall_clock_seed();
    match sim.reset(PARTICLE_COUNT, seed) {
        Ok(()) => {
            epoch.epoch += 1;
            epoch.seed = seed;
        }
        Err(e) => error!("reset failed, keeping previous state: {e}"),
    }
}

/// Advances the simulation by its own fixed time step, decoupled from the
/// wall-clock frame time. With GPU compute active the kernel stages run
/// device-side and only the driver clock advances here.
fn drive_simulation(mut sim: ResMut<Simulation>, use_gpu: Res<UseGpuCompute>) {
    match &mut *sim {
        Simulation::Fluid(fluid) => {
            let dt = fluid.params().time_step;
            if use_gpu.0 {
                fluid.advance_clock(dt);
            } else {
                fluid.update(dt);
            }
        }
        Simulation::Test(test) => test.update(1.0),
    }
}

fn orbit_camera(
    buttons: Res<ButtonInput<MouseButton>>,
    mut motion: EventReader<MouseMotion>,
    mut orbit: ResMut<ViewOrbit>,
    mut camera: Query<&mut Transform, With<Camera3d>>,
) {
    let mut delta = Vec2::ZERO;
    for ev in motion.read() {
        delta += ev.delta;
    }
    if buttons.pressed(MouseButton::Left) && delta != Vec2::ZERO {
        orbit.yaw -= delta.x * 0.005;
        orbit.pitch = (orbit.pitch + delta.y * 0.005).clamp(-1.5, 1.5);
    }
    if let Ok(mut transform) = camera.single_mut() {
        *transform = orbit_transform(&orbit);
    }
}

fn draw_bounds(mut gizmos: Gizmos, show: Res<ShowBounds>, cfg: Option<Res<AppConfig>>) {
    if !show.0 {
        return;
    }
    let Some(cfg) = cfg else {
        return;
    };
    let min = Vec3::from_array(cfg.0.volume_min);
    let max = Vec3::from_array(cfg.0.volume_max);
    gizmos.cuboid(
        Transform::from_translation((min + max) * 0.5).with_scale(max - min),
        Color::srgb(0.35, 0.85, 0.45),
    );
}
