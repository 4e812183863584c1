use log::debug;
use rayon::prelude::*;

use crate::{
    bounds::Bounds3f,
    error::{GuidingError, Result},
    field::{GuidingFieldI, RegionId},
    observation::TrainingObservation,
    vecmath::{Point3f, Vector3f},
    vmm::{VmmDistribution, MAX_LOBES},
    Float,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridFieldSettings {
    /// Cells along each axis of the scene bounds.
    pub resolution: u32,
    /// vMF lobes per cell.
    pub lobes: usize,
    pub em_iterations: usize,
    /// Cells that gathered fewer observations in an iteration keep their previous fit.
    pub min_samples: usize,
    pub max_kappa: Float,
    /// Concentration of the evenly spread lobes a cell starts fitting from.
    pub initial_kappa: Float,
}

impl Default for GridFieldSettings {
    fn default() -> Self {
        Self {
            resolution: 8,
            lobes: 4,
            em_iterations: 8,
            min_samples: 32,
            max_kappa: 1e3,
            initial_kappa: 2.0,
        }
    }
}

impl GridFieldSettings {
    pub fn validate(&self) -> Result<()> {
        if self.resolution == 0 || self.resolution > 256 {
            return Err(GuidingError::InvalidOptions(format!(
                "grid resolution must be in 1..=256, got {}",
                self.resolution
            )));
        }
        if self.lobes == 0 || self.lobes > MAX_LOBES {
            return Err(GuidingError::InvalidOptions(format!(
                "lobes per cell must be in 1..={}, got {}",
                MAX_LOBES, self.lobes
            )));
        }
        if !(self.max_kappa > 0.0) {
            return Err(GuidingError::InvalidOptions(
                "max_kappa must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reference guiding field: a uniform grid over the scene bounds with one
/// vMF mixture per cell, refit by weighted EM on every training iteration.
#[derive(Debug, Clone)]
pub struct GridField {
    settings: GridFieldSettings,
    bounds: Bounds3f,
    cells: Vec<Option<VmmDistribution>>,
    iteration: u32,
    total_spp: u64,
}

impl GridField {
    pub fn new(settings: GridFieldSettings) -> GridField {
        let resolution = settings.resolution.max(1) as usize;
        GridField {
            settings,
            bounds: Bounds3f::empty(),
            cells: vec![None; resolution * resolution * resolution],
            iteration: 0,
            total_spp: 0,
        }
    }

    pub fn settings(&self) -> &GridFieldSettings {
        &self.settings
    }

    /// Number of cells currently holding a fitted mixture.
    pub fn num_fitted_cells(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    fn resolution(&self) -> usize {
        self.settings.resolution.max(1) as usize
    }

    /// Cell containing p; points outside the bounds map to the nearest border cell.
    fn cell_index(&self, p: &Point3f) -> Option<usize> {
        if self.bounds.is_empty() || !p.is_finite() {
            return None;
        }
        let res = self.resolution();
        let o = self.bounds.offset(p);
        let axis = |v: Float| -> usize {
            let i = (v * res as Float).floor();
            Float::clamp(i, 0.0, (res - 1) as Float) as usize
        };
        Some((axis(o.z) * res + axis(o.y)) * res + axis(o.x))
    }
}

impl GuidingFieldI for GridField {
    type Distribution = VmmDistribution;

    fn set_scene_bounds(&mut self, bounds: Bounds3f) {
        if bounds != self.bounds {
            self.bounds = bounds;
            self.cells.iter_mut().for_each(|c| *c = None);
        }
    }

    fn scene_bounds(&self) -> Bounds3f {
        self.bounds
    }

    fn train(&mut self, observations: &[TrainingObservation], spp: u32) {
        if self.bounds.is_empty() {
            let bounds = observations
                .iter()
                .filter(|o| o.is_valid())
                .fold(Bounds3f::empty(), |b, o| b.union_point(&o.position));
            self.set_scene_bounds(bounds);
        }

        let mut bins: Vec<Vec<(Vector3f, Float)>> = vec![Vec::new(); self.cells.len()];
        let mut skipped = 0;
        for o in observations {
            match self.cell_index(&o.position) {
                Some(i) if o.is_valid() => bins[i].push((o.direction, o.importance())),
                _ => skipped += 1,
            }
        }

        let settings = self.settings;
        let fitted: usize = self
            .cells
            .par_iter_mut()
            .zip(bins.into_par_iter())
            .enumerate()
            .map(|(i, (cell, samples))| {
                if samples.len() < settings.min_samples {
                    return 0;
                }
                let mut mixture = cell.clone().unwrap_or_else(|| {
                    VmmDistribution::spread(settings.lobes, settings.initial_kappa, RegionId(i as u32))
                });
                match mixture.fit(&samples, settings.em_iterations, settings.max_kappa) {
                    Some(()) if mixture.is_valid() => {
                        *cell = Some(mixture);
                        1
                    }
                    _ => 0,
                }
            })
            .sum();

        self.iteration += 1;
        self.total_spp += spp as u64;
        debug!(
            "Grid field iteration {}: {} observations, {} skipped, {} cells refit, {} cells populated",
            self.iteration,
            observations.len(),
            skipped,
            fitted,
            self.num_fitted_cells()
        );
    }

    fn query_distribution(&self, p: Point3f, _u: Float) -> Option<VmmDistribution> {
        let index = self.cell_index(&p)?;
        self.cells[index].clone()
    }

    fn is_trained(&self) -> bool {
        self.cells.iter().any(|c| c.is_some())
    }

    fn iteration(&self) -> u32 {
        self.iteration
    }

    fn total_spp(&self) -> u64 {
        self.total_spp
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    use super::{GridField, GridFieldSettings};
    use crate::{
        bounds::Bounds3f,
        field::{DistributionI, GuidingFieldI},
        math::INV_PI,
        observation::{ObservationFlags, TrainingObservation},
        vecmath::{Point3f, Vector3f},
    };

    fn plane_observations(n: usize, seed: u64) -> Vec<TrainingObservation> {
        let mut rng = SmallRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let p = Point3f::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), 0.0);
                TrainingObservation::new(p, Vector3f::Z, 1.0, 0.5 * INV_PI, 1.0, ObservationFlags::empty())
            })
            .collect()
    }

    #[test]
    fn untrained_field_has_nothing_to_offer() {
        let mut field = GridField::new(GridFieldSettings::default());
        field.set_scene_bounds(Bounds3f::new(
            Point3f::new(-1.0, -1.0, -1.0),
            Point3f::new(1.0, 1.0, 1.0),
        ));
        assert!(!field.is_trained());
        assert_eq!(0, field.iteration());
        assert!(field.query_distribution(Point3f::ZERO, 0.5).is_none());
    }

    #[test]
    fn trained_plane_points_up() {
        let mut field = GridField::new(GridFieldSettings::default());
        field.set_scene_bounds(Bounds3f::new(
            Point3f::new(-1.0, -1.0, -1.0),
            Point3f::new(1.0, 1.0, 1.0),
        ));
        field.train(&plane_observations(100_000, 0), 4);

        assert!(field.is_trained());
        assert_eq!(1, field.iteration());
        assert_eq!(4, field.total_spp());

        let d = field
            .query_distribution(Point3f::new(0.5, 0.5, 0.0), 0.5)
            .unwrap();
        assert!(d.pdf(Vector3f::Z) > 10.0 * d.pdf(-Vector3f::Z));
        assert!(d.pdf(Vector3f::Z) > 1.0);

        // Nothing was observed away from the plane.
        assert!(field
            .query_distribution(Point3f::new(0.5, 0.5, 0.9), 0.5)
            .is_none());

        // Regions differ between cells and are stable for a cell.
        let other = field
            .query_distribution(Point3f::new(-0.5, -0.5, 0.0), 0.5)
            .unwrap();
        assert_ne!(d.region(), other.region());
        assert_eq!(
            d.region(),
            field
                .query_distribution(Point3f::new(0.51, 0.52, 0.0), 0.1)
                .unwrap()
                .region()
        );
    }

    #[test]
    fn sparse_cells_keep_their_previous_fit() {
        let settings = GridFieldSettings {
            resolution: 2,
            ..Default::default()
        };
        let mut field = GridField::new(settings);
        field.set_scene_bounds(Bounds3f::new(
            Point3f::new(-1.0, -1.0, -1.0),
            Point3f::new(1.0, 1.0, 1.0),
        ));
        field.train(&plane_observations(10_000, 1), 1);
        let p = Point3f::new(0.5, 0.5, 0.0);
        let before = field.query_distribution(p, 0.5).unwrap();

        // A handful of contradicting observations is not enough to refit.
        let few: Vec<TrainingObservation> = (0..settings.min_samples - 1)
            .map(|_| {
                TrainingObservation::new(p, -Vector3f::Z, 1.0, 1.0, 1.0, ObservationFlags::empty())
            })
            .collect();
        field.train(&few, 1);
        assert_eq!(2, field.iteration());
        assert_eq!(before, field.query_distribution(p, 0.5).unwrap());
    }

    #[test]
    fn bounds_are_inferred_from_observations() {
        let mut field = GridField::new(GridFieldSettings::default());
        assert!(field.scene_bounds().is_empty());
        field.train(&plane_observations(50_000, 2), 1);
        assert!(!field.scene_bounds().is_empty());
        assert!(field.query_distribution(Point3f::ZERO, 0.0).is_some());
    }

    #[test]
    fn settings_are_validated() {
        assert!(GridFieldSettings::default().validate().is_ok());
        let bad = GridFieldSettings {
            lobes: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
