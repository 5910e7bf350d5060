use std::time::Duration;

use bevy::{
    asset::RenderAssetUsages,
    mesh::{Indices, PrimitiveTopology},
    prelude::*,
};
use log::{debug, warn};

use crate::{
    config::ExtractionConfig,
    error::Result,
    extract::Extractor,
    field::ScalarField,
    mesh::MarchMesh,
};

/// System sets for the per-frame extraction pipeline.
///
/// ```text
/// MarchingCubesSet::Step  →  [your systems]  →  MarchingCubesSet::Upload
/// ```
///
/// Systems that read [`IsoSurface::mesh`] for something other than rendering
/// (collision shapes, statistics) belong between the two sets.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum MarchingCubesSet {
    /// Advances each field and re-extracts its surface.
    Step,
    /// Copies freshly extracted meshes into the entity's [`Mesh3d`] asset.
    Upload,
}

/// Runtime configuration shared by every [`IsoSurface`].
///
/// ```rust,ignore
/// fn my_system(mut config: ResMut<MarchingCubesConfig>) {
///     config.paused = true; // freeze all surfaces on their current mesh
/// }
/// ```
#[derive(Resource, Clone, Debug, Default)]
pub struct MarchingCubesConfig {
    /// A surface whose last extraction took longer than this skips its next
    /// frame and keeps showing the previous mesh. Extraction itself is never cut short.
    pub frame_budget: Option<Duration>,
    /// Stops all stepping while set.
    pub paused: bool,
}

/// An animated scalar field and the extractor that meshes it every frame.
///
/// The first successful upload inserts a [`Mesh3d`]; later uploads replace that
/// asset's contents. Despawning the entity drops the handle and with it the GPU mesh.
#[derive(Component)]
#[require(Transform)]
pub struct IsoSurface {
    field: Box<dyn ScalarField + Send>,
    extractor: Extractor,
    /// Set when the front mesh changed and has not been uploaded yet.
    dirty: bool,
    skip_next: bool,
}

impl IsoSurface {
    /// Validates `config` and allocates every per-frame buffer up front.
    pub fn new<F>(field: F, config: ExtractionConfig) -> Result<Self>
    where
        F: ScalarField + Send + 'static,
    {
        Ok(Self {
            field: Box::new(field),
            extractor: Extractor::new(config)?,
            dirty: false,
            skip_next: false,
        })
    }

    pub fn field(&self) -> &dyn ScalarField {
        self.field.as_ref()
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    /// The last completed mesh.
    pub fn mesh(&self) -> &MarchMesh {
        self.extractor.mesh()
    }
}

/// Bevy plugin that re-extracts every [`IsoSurface`] once per frame.
///
/// With the `auto_step` feature enabled the pipeline runs in `Update`:
///
/// ```text
/// IsoSurface spawned
///   → field.update(elapsed) + extraction   (MarchingCubesSet::Step, every frame)
///   → [your systems here]
///   → Mesh3d inserted / replaced           (MarchingCubesSet::Upload)
/// ```
///
/// Without it, add [`step_surfaces`] and [`upload_meshes`] to a schedule yourself.
#[derive(Default)]
pub struct MarchingCubesPlugin {
    /// Initial value for [`MarchingCubesConfig::frame_budget`].
    pub frame_budget: Option<Duration>,
}

impl Plugin for MarchingCubesPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(MarchingCubesConfig {
            frame_budget: self.frame_budget,
            paused: false,
        });

        #[cfg(feature = "auto_step")]
        app.configure_sets(
            Update,
            (MarchingCubesSet::Step, MarchingCubesSet::Upload).chain(),
        )
        .add_systems(
            Update,
            (
                step_surfaces.in_set(MarchingCubesSet::Step),
                upload_meshes.in_set(MarchingCubesSet::Upload),
            ),
        );
    }
}

/// Advances every field to the current elapsed time and extracts its surface.
pub fn step_surfaces(
    config: Res<MarchingCubesConfig>,
    time: Res<Time>,
    mut query: Query<(Entity, &mut IsoSurface)>,
) {
    if config.paused {
        return;
    }
    let elapsed = time.elapsed_secs();

    for (entity, mut surface) in query.iter_mut() {
        let surface = &mut *surface;
        if surface.skip_next {
            surface.skip_next = false;
            debug!("{entity}: over frame budget, skipping a frame");
            continue;
        }

        match surface.extractor.step(surface.field.as_mut(), elapsed) {
            Ok(_) => {
                surface.dirty = true;
                surface.skip_next = config
                    .frame_budget
                    .is_some_and(|budget| surface.extractor.stats().duration > budget);
            }
            Err(err) => warn!("{entity}: extraction failed, keeping previous mesh: {err}"),
        }
    }
}

/// Uploads freshly extracted meshes, inserting a [`Mesh3d`] on first use.
pub fn upload_meshes(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut query: Query<(Entity, &mut IsoSurface, Option<&Mesh3d>)>,
) {
    for (entity, mut surface, mesh3d) in query.iter_mut() {
        if !surface.dirty {
            continue;
        }
        surface.dirty = false;
        let bevy_mesh = to_bevy_mesh(surface.mesh());

        if let Some(handle) = mesh3d {
            if let Some(mut existing) = meshes.get_mut(&handle.0) {
                *existing = bevy_mesh;
                continue;
            }
        }
        commands.entity(entity).insert(Mesh3d(meshes.add(bevy_mesh)));
    }
}

/// Converts a [`MarchMesh`] into a Bevy triangle-list [`Mesh`].
pub fn to_bevy_mesh(mesh: &MarchMesh) -> Mesh {
    Mesh::new(
        PrimitiveTopology::TriangleList,
        RenderAssetUsages::RENDER_WORLD,
    )
    .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, mesh.vertices.clone())
    .with_inserted_attribute(Mesh::ATTRIBUTE_NORMAL, mesh.normals.clone())
    .with_inserted_indices(Indices::U32(mesh.indices.clone()))
}
