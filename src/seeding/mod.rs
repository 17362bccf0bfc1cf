//! Seed sources: where paths start and in which direction.

pub mod basic;
pub mod dynamic;

pub use basic::{FixedSeeds, GridPerVoxel, MaskSeed, RandomPerVoxel, SphereSeed};
pub use dynamic::{DensityField, DynamicSeeder};

use glam::Vec3;
use rand::Rng;
use rand::rngs::StdRng;
use std::sync::Mutex;

use crate::error::{TrackError, TrackResult};

/// Initial position and direction of one path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Seed {
    pub pos: Vec3,
    pub dir: Vec3,
}

/// Thread-safe generator of seeds.
///
/// Finite sources return None permanently once exhausted. Infinite sources may return None
/// for a single failed draw; the tracker retries those up to a fixed bound.
pub trait SeedSource: Send + Sync {
    fn get_seed(&self) -> Option<Seed>;

    fn is_finite(&self) -> bool;

    /// Total seeds a finite source will produce, if known.
    fn count(&self) -> Option<u64> {
        None
    }
}

/// Uniformly distributed unit vector.
pub fn random_direction<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    loop {
        let v = Vec3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
        );
        let n2 = v.length_squared();
        if n2 > 1e-6 && n2 <= 1.0 {
            return v / n2.sqrt();
        }
    }
}

/// Ordered collection of sources. Finite lists drain members in order; infinite lists
/// pick a member at random per draw.
pub struct SeedList {
    sources: Vec<Box<dyn SeedSource>>,
    finite: bool,
    cursor: Mutex<usize>,
    rng: Mutex<StdRng>,
}

impl SeedList {
    pub fn new(sources: Vec<Box<dyn SeedSource>>, rng: StdRng) -> TrackResult<Self> {
        let Some(first) = sources.first() else {
            return Err(TrackError::config("no seed sources supplied"));
        };
        let finite = first.is_finite();
        if sources.iter().any(|s| s.is_finite() != finite) {
            return Err(TrackError::config(
                "cannot mix finite and unbounded seed sources",
            ));
        }
        Ok(Self {
            sources,
            finite,
            cursor: Mutex::new(0),
            rng: Mutex::new(rng),
        })
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl SeedSource for SeedList {
    fn get_seed(&self) -> Option<Seed> {
        if self.finite {
            let mut cursor = self.cursor.lock().unwrap_or_else(|e| e.into_inner());
            while *cursor < self.sources.len() {
                if let Some(seed) = self.sources[*cursor].get_seed() {
                    return Some(seed);
                }
                *cursor += 1;
            }
            None
        } else {
            let idx = {
                let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
                rng.random_range(0..self.sources.len())
            };
            self.sources[idx].get_seed()
        }
    }

    fn is_finite(&self) -> bool {
        self.finite
    }

    fn count(&self) -> Option<u64> {
        if !self.finite {
            return None;
        }
        self.sources.iter().map(|s| s.count()).sum()
    }
}
