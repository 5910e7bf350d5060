use bevy::prelude::*;
use bevy_infinite_grid::{InfiniteGridBundle, InfiniteGridPlugin, InfiniteGridSettings};
use bevy_metaballs::{
    ExtractionConfig, ExtractionMode, IsoSurface, MarchingCubesPlugin, MetaBallField,
    extract::Extractor,
};
use bevy_panorbit_camera::{PanOrbitCamera, PanOrbitCameraPlugin};

fn main() {
    App::new()
        .add_plugins((
            DefaultPlugins,
            MarchingCubesPlugin::default(),
            PanOrbitCameraPlugin,
            InfiniteGridPlugin,
        ))
        .add_systems(Startup, setup)
        .add_systems(Update, (toggle_mode, stats))
        .run();
}

fn setup(mut commands: Commands, mut materials: ResMut<Assets<StandardMaterial>>) {
    bevy::log::info!("Metaballs Example: press M to switch serial/parallel extraction");

    commands.spawn(InfiniteGridBundle {
        settings: InfiniteGridSettings {
            fadeout_distance: 100.0,
            ..Default::default()
        },
        ..Default::default()
    });

    commands.spawn((
        Camera3d::default(),
        PanOrbitCamera::default(),
        Transform::from_xyz(0.0, 4.0, 9.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    commands.spawn((
        DirectionalLight {
            illuminance: light_consts::lux::OVERCAST_DAY,
            ..Default::default()
        },
        Transform::default().with_rotation(Quat::from_rotation_x(-45.0_f32.to_radians())),
    ));

    let field = match MetaBallField::orbiting(5, 0.7, 1.6) {
        Ok(field) => field,
        Err(err) => {
            bevy::log::error!("invalid metaball field: {err}");
            return;
        }
    };
    let surface = match IsoSurface::new(field, ExtractionConfig::default()) {
        Ok(surface) => surface,
        Err(err) => {
            bevy::log::error!("invalid extraction config: {err}");
            return;
        }
    };

    commands.spawn((
        surface,
        Transform::from_xyz(0.0, 2.0, 0.0),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: Color::srgb(0.9, 0.3, 0.2),
            perceptual_roughness: 0.4,
            ..Default::default()
        })),
    ));
}

/// Rebuilds the surface with the other extraction mode when M is pressed.
fn toggle_mode(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut query: Query<&mut IsoSurface>,
) {
    if !keyboard.just_pressed(KeyCode::KeyM) {
        return;
    }
    for mut surface in query.iter_mut() {
        let config = surface.extractor().config().clone();
        let mode = match config.mode {
            ExtractionMode::Serial => ExtractionMode::Parallel,
            ExtractionMode::Parallel => ExtractionMode::Serial,
        };
        let field = MetaBallField::orbiting(5, 0.7, 1.6);
        match field.and_then(|f| IsoSurface::new(f, config.with_mode(mode))) {
            Ok(rebuilt) => {
                bevy::log::info!("switched to {mode:?} extraction");
                *surface = rebuilt;
            }
            Err(err) => bevy::log::error!("could not rebuild surface: {err}"),
        }
    }
}

fn stats(time: Res<Time>, mut timer: Local<f32>, query: Query<&IsoSurface>) {
    *timer += time.delta_secs();
    if *timer < 2.0 {
        return;
    }
    *timer = 0.0;
    for surface in query.iter() {
        let extractor: &Extractor = surface.extractor();
        let stats = extractor.stats();
        bevy::log::info!(
            "{:?}: {} triangles, {} cells, {:?}",
            extractor.config().mode,
            stats.triangles,
            stats.cells,
            stats.duration
        );
    }
}
