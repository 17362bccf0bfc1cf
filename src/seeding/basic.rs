//! Static seeding strategies.

use glam::Vec3;
use rand::Rng;
use rand::rngs::StdRng;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Seed, SeedSource, random_direction};
use crate::error::{TrackError, TrackResult};
use crate::geometry::MaskImage;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Uniform jitter within one voxel, in voxel units.
fn jitter(rng: &mut StdRng) -> Vec3 {
    Vec3::new(
        rng.random::<f32>() - 0.5,
        rng.random::<f32>() - 0.5,
        rng.random::<f32>() - 0.5,
    )
}

/// Explicit list of seeds, handed out once each in order.
pub struct FixedSeeds {
    seeds: Vec<(Vec3, Option<Vec3>)>,
    cursor: AtomicUsize,
    rng: Mutex<StdRng>,
}

impl FixedSeeds {
    /// Seeds without a direction get a random one.
    pub fn new(seeds: Vec<(Vec3, Option<Vec3>)>, rng: StdRng) -> Self {
        Self {
            seeds,
            cursor: AtomicUsize::new(0),
            rng: Mutex::new(rng),
        }
    }

    pub fn with_directions(seeds: impl IntoIterator<Item = (Vec3, Vec3)>, rng: StdRng) -> Self {
        Self::new(
            seeds.into_iter().map(|(p, d)| (p, Some(d))).collect(),
            rng,
        )
    }
}

impl SeedSource for FixedSeeds {
    fn get_seed(&self) -> Option<Seed> {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        let &(pos, dir) = self.seeds.get(i)?;
        let dir = match dir.and_then(|d| d.try_normalize()) {
            Some(d) => d,
            None => random_direction(&mut *lock(&self.rng)),
        };
        Some(Seed { pos, dir })
    }

    fn is_finite(&self) -> bool {
        true
    }

    fn count(&self) -> Option<u64> {
        Some(self.seeds.len() as u64)
    }
}

/// Uniform random seeds inside a sphere. Unbounded.
pub struct SphereSeed {
    centre: Vec3,
    radius: f32,
    rng: Mutex<StdRng>,
}

impl SphereSeed {
    pub fn new(centre: Vec3, radius: f32, rng: StdRng) -> TrackResult<Self> {
        if !(radius > 0.0) {
            return Err(TrackError::config(format!(
                "seed sphere radius must be positive, got {}",
                radius
            )));
        }
        Ok(Self {
            centre,
            radius,
            rng: Mutex::new(rng),
        })
    }
}

impl SeedSource for SphereSeed {
    fn get_seed(&self) -> Option<Seed> {
        let mut rng = lock(&self.rng);
        let p = loop {
            let p = Vec3::new(
                2.0 * rng.random::<f32>() - 1.0,
                2.0 * rng.random::<f32>() - 1.0,
                2.0 * rng.random::<f32>() - 1.0,
            );
            if p.length_squared() <= 1.0 {
                break p;
            }
        };
        Some(Seed {
            pos: self.centre + p * self.radius,
            dir: random_direction(&mut *rng),
        })
    }

    fn is_finite(&self) -> bool {
        false
    }
}

/// Uniform random seeds inside a random set voxel of a mask. Unbounded.
pub struct MaskSeed {
    mask: MaskImage,
    voxels: Vec<usize>,
    rng: Mutex<StdRng>,
}

impl MaskSeed {
    pub fn new(mask: MaskImage, rng: StdRng) -> TrackResult<Self> {
        let voxels = mask.true_voxels();
        if voxels.is_empty() {
            return Err(TrackError::config("seed mask is empty"));
        }
        Ok(Self {
            mask,
            voxels,
            rng: Mutex::new(rng),
        })
    }
}

impl SeedSource for MaskSeed {
    fn get_seed(&self) -> Option<Seed> {
        let mut rng = lock(&self.rng);
        let grid = self.mask.grid();
        let v = grid.voxel_at(self.voxels[rng.random_range(0..self.voxels.len())]);
        let local = Vec3::new(v[0] as f32, v[1] as f32, v[2] as f32) + jitter(&mut rng);
        Some(Seed {
            pos: grid.voxel_to_scanner(local),
            dir: random_direction(&mut *rng),
        })
    }

    fn is_finite(&self) -> bool {
        false
    }
}

#[derive(Default)]
struct VoxelCursor {
    voxel: Option<usize>,
    inc: usize,
    expired: bool,
}

/// `per_voxel` random seeds in every set voxel, visited in raster order.
pub struct RandomPerVoxel {
    mask: MaskImage,
    per_voxel: usize,
    state: Mutex<(VoxelCursor, StdRng)>,
}

impl RandomPerVoxel {
    pub fn new(mask: MaskImage, per_voxel: usize, rng: StdRng) -> TrackResult<Self> {
        if per_voxel == 0 {
            return Err(TrackError::config("seeds per voxel must be at least 1"));
        }
        Ok(Self {
            mask,
            per_voxel,
            state: Mutex::new((VoxelCursor::default(), rng)),
        })
    }
}

impl SeedSource for RandomPerVoxel {
    fn get_seed(&self) -> Option<Seed> {
        let mut guard = lock(&self.state);
        let (cursor, rng) = &mut *guard;
        if cursor.expired {
            return None;
        }
        cursor.inc += 1;
        if cursor.voxel.is_none() || cursor.inc == self.per_voxel {
            cursor.inc = 0;
            let start = cursor.voxel.map_or(0, |v| v + 1);
            match self.mask.next_true_from(start) {
                Some(v) => cursor.voxel = Some(v),
                None => {
                    cursor.expired = true;
                    return None;
                }
            }
        }
        let grid = self.mask.grid();
        let v = grid.voxel_at(cursor.voxel?);
        let local = Vec3::new(v[0] as f32, v[1] as f32, v[2] as f32) + jitter(rng);
        Some(Seed {
            pos: grid.voxel_to_scanner(local),
            dir: random_direction(rng),
        })
    }

    fn is_finite(&self) -> bool {
        true
    }

    fn count(&self) -> Option<u64> {
        Some((self.mask.count() * self.per_voxel) as u64)
    }
}

/// Regular `os`³ grid of seeds in every set voxel, visited in raster order.
pub struct GridPerVoxel {
    mask: MaskImage,
    os: usize,
    state: Mutex<(Option<usize>, [usize; 3], bool, StdRng)>,
}

impl GridPerVoxel {
    pub fn new(mask: MaskImage, os: usize, rng: StdRng) -> TrackResult<Self> {
        if os == 0 {
            return Err(TrackError::config("grid oversampling must be at least 1"));
        }
        Ok(Self {
            mask,
            os,
            state: Mutex::new((None, [0; 3], false, rng)),
        })
    }
}

impl SeedSource for GridPerVoxel {
    fn get_seed(&self) -> Option<Seed> {
        let mut guard = lock(&self.state);
        let (voxel, sub, expired, rng) = &mut *guard;
        if *expired {
            return None;
        }
        let os = self.os;
        let advance_voxel = match voxel {
            None => true,
            Some(_) => {
                sub[2] += 1;
                if sub[2] == os {
                    sub[2] = 0;
                    sub[1] += 1;
                    if sub[1] == os {
                        sub[1] = 0;
                        sub[0] += 1;
                    }
                }
                if sub[0] == os {
                    *sub = [0; 3];
                    true
                } else {
                    false
                }
            }
        };
        if advance_voxel {
            let start = voxel.map_or(0, |v| v + 1);
            match self.mask.next_true_from(start) {
                Some(v) => *voxel = Some(v),
                None => {
                    *expired = true;
                    return None;
                }
            }
        }
        let grid = self.mask.grid();
        let v = grid.voxel_at((*voxel)?);
        let step = 1.0 / os as f32;
        let offset = -0.5 + 0.5 * step;
        let local = Vec3::new(
            v[0] as f32 + offset + sub[0] as f32 * step,
            v[1] as f32 + offset + sub[1] as f32 * step,
            v[2] as f32 + offset + sub[2] as f32 * step,
        );
        Some(Seed {
            pos: grid.voxel_to_scanner(local),
            dir: random_direction(rng),
        })
    }

    fn is_finite(&self) -> bool {
        true
    }

    fn count(&self) -> Option<u64> {
        Some((self.mask.count() * self.os.pow(3)) as u64)
    }
}
