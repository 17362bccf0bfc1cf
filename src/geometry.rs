//! Voxel grids and binary masks shared by regions, seeding and track mapping.

use glam::Vec3;

use crate::error::{TrackError, TrackResult};

/// Regular axis-aligned voxel grid. `origin` is the centre of voxel (0, 0, 0).
#[derive(Clone, Debug, PartialEq)]
pub struct VoxelGrid {
    pub dims: [usize; 3],
    pub origin: Vec3,
    pub voxel_size: f32,
}

impl VoxelGrid {
    pub fn new(dims: [usize; 3], origin: Vec3, voxel_size: f32) -> TrackResult<Self> {
        if dims.contains(&0) {
            return Err(TrackError::config(format!(
                "voxel grid has an empty dimension: {:?}",
                dims
            )));
        }
        if !(voxel_size > 0.0) {
            return Err(TrackError::config(format!(
                "voxel size must be positive, got {}",
                voxel_size
            )));
        }
        Ok(Self {
            dims,
            origin,
            voxel_size,
        })
    }

    pub fn num_voxels(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// Voxel containing `pos`, or None when outside the grid.
    pub fn voxel_of(&self, pos: Vec3) -> Option<[usize; 3]> {
        let rel = ((pos - self.origin) / self.voxel_size).round();
        let mut out = [0usize; 3];
        for axis in 0..3 {
            let v = rel[axis];
            if !v.is_finite() || v < 0.0 || v as usize >= self.dims[axis] {
                return None;
            }
            out[axis] = v as usize;
        }
        Some(out)
    }

    /// Raster index, x slowest, z fastest.
    pub fn index(&self, v: [usize; 3]) -> usize {
        (v[0] * self.dims[1] + v[1]) * self.dims[2] + v[2]
    }

    pub fn voxel_at(&self, index: usize) -> [usize; 3] {
        let z = index % self.dims[2];
        let y = (index / self.dims[2]) % self.dims[1];
        let x = index / (self.dims[1] * self.dims[2]);
        [x, y, z]
    }

    pub fn index_of(&self, pos: Vec3) -> Option<usize> {
        self.voxel_of(pos).map(|v| self.index(v))
    }

    /// Map continuous voxel coordinates to scanner space.
    pub fn voxel_to_scanner(&self, v: Vec3) -> Vec3 {
        self.origin + v * self.voxel_size
    }

    pub fn centre(&self, v: [usize; 3]) -> Vec3 {
        self.voxel_to_scanner(Vec3::new(v[0] as f32, v[1] as f32, v[2] as f32))
    }
}

/// Binary image on a [`VoxelGrid`].
#[derive(Clone, Debug, PartialEq)]
pub struct MaskImage {
    grid: VoxelGrid,
    data: Vec<bool>,
}

impl MaskImage {
    pub fn new(grid: VoxelGrid, data: Vec<bool>) -> TrackResult<Self> {
        if data.len() != grid.num_voxels() {
            return Err(TrackError::config(format!(
                "mask has {} values but grid holds {} voxels",
                data.len(),
                grid.num_voxels()
            )));
        }
        Ok(Self { grid, data })
    }

    /// Build a mask by evaluating `f` at every voxel centre.
    pub fn from_fn<F>(grid: VoxelGrid, f: F) -> Self
    where
        F: Fn(Vec3) -> bool,
    {
        let data = (0..grid.num_voxels())
            .map(|i| f(grid.centre(grid.voxel_at(i))))
            .collect();
        Self { grid, data }
    }

    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    pub fn value(&self, v: [usize; 3]) -> bool {
        self.data[self.grid.index(v)]
    }

    pub fn contains(&self, pos: Vec3) -> bool {
        self.grid.index_of(pos).is_some_and(|i| self.data[i])
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&b| b).count()
    }

    /// Raster indices of all set voxels.
    pub fn true_voxels(&self) -> Vec<usize> {
        self.data
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| b.then_some(i))
            .collect()
    }

    /// First set voxel at raster index `>= start`.
    pub fn next_true_from(&self, start: usize) -> Option<usize> {
        self.data
            .get(start..)?
            .iter()
            .position(|&b| b)
            .map(|offset| start + offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trips_through_voxel_at() {
        let grid = VoxelGrid::new([3, 4, 5], Vec3::ZERO, 1.0).unwrap();
        for i in 0..grid.num_voxels() {
            assert_eq!(grid.index(grid.voxel_at(i)), i);
        }
    }

    #[test]
    fn voxel_of_rejects_outside() {
        let grid = VoxelGrid::new([2, 2, 2], Vec3::ZERO, 2.0).unwrap();
        assert_eq!(grid.voxel_of(Vec3::new(2.2, 0.0, 0.9)), Some([1, 0, 0]));
        assert_eq!(grid.voxel_of(Vec3::new(-1.5, 0.0, 0.0)), None);
        assert_eq!(grid.voxel_of(Vec3::new(0.0, 3.5, 0.0)), None);
    }

    #[test]
    fn next_true_skips_unset() {
        let grid = VoxelGrid::new([1, 1, 5], Vec3::ZERO, 1.0).unwrap();
        let mask = MaskImage::new(grid, vec![false, true, false, false, true]).unwrap();
        assert_eq!(mask.next_true_from(0), Some(1));
        assert_eq!(mask.next_true_from(2), Some(4));
        assert_eq!(mask.next_true_from(5), None);
        assert_eq!(mask.count(), 2);
    }
}
