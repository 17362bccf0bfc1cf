//! Regions of interest: inclusion, exclusion and tracking-mask sets.

use glam::Vec3;

use crate::geometry::MaskImage;

/// One region. Read-only after setup, so concurrent containment checks need no locking.
#[derive(Clone, Debug, PartialEq)]
pub enum Region {
    Sphere { centre: Vec3, radius: f32 },
    Box { min: Vec3, max: Vec3 },
    Mask(MaskImage),
}

impl Region {
    pub fn sphere(centre: Vec3, radius: f32) -> Self {
        Region::Sphere { centre, radius }
    }

    pub fn aabb(a: Vec3, b: Vec3) -> Self {
        Region::Box {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn contains(&self, pos: Vec3) -> bool {
        match self {
            Region::Sphere { centre, radius } => pos.distance_squared(*centre) <= radius * radius,
            Region::Box { min, max } => pos.cmpge(*min).all() && pos.cmple(*max).all(),
            Region::Mask(mask) => mask.contains(pos),
        }
    }
}

/// Ordered set of regions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RoiSet {
    regions: Vec<Region>,
}

impl RoiSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, region: Region) {
        self.regions.push(region);
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// True if any member contains `pos`.
    pub fn contains(&self, pos: Vec3) -> bool {
        self.regions.iter().any(|r| r.contains(pos))
    }

    /// Mark `touched[i]` for every member `i` containing `pos`. Bits are only ever set, never cleared.
    pub fn contains_and_mark(&self, pos: Vec3, touched: &mut [bool]) {
        for (region, bit) in self.regions.iter().zip(touched.iter_mut()) {
            if !*bit && region.contains(pos) {
                *bit = true;
            }
        }
    }
}

impl FromIterator<Region> for RoiSet {
    fn from_iter<T: IntoIterator<Item = Region>>(iter: T) -> Self {
        Self {
            regions: iter.into_iter().collect(),
        }
    }
}
