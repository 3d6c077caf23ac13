//! 结节几何信息提取.
//!
//! 二值化 (任何非零值均视为前景) 后做 8-连通域分析,
//! 对每个连通域求轴对齐外接矩形, 直径取矩形高、宽中的较大者.
//!
//! 调用者应保证每次输入只包含一个结节. 严格接口在多连通域时返回错误;
//! 宽松接口沿用 "最后一个连通域胜出" 的约定, 并打印警告.

use std::collections::VecDeque;

use log::warn;
use ndarray::{Array2, ArrayView2, ArrayView3, Axis, Zip};

use crate::{Area2d, Idx2d, Voxel};

/// 几何信息提取错误.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    /// 掩码中不存在前景.
    #[error("分割掩码中不存在前景像素")]
    Empty,

    /// 掩码中存在多个互不连通的前景区域.
    #[error("分割掩码中存在 {count} 个连通域, 但每次只允许一个结节")]
    MultipleRegions {
        /// 连通域个数.
        count: usize,
    },
}

/// 几何信息提取结果.
pub type GeometryResult<T> = Result<T, GeometryError>;

/// 单个结节的几何信息. 外接矩形为左闭右开区间 `[min, max)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NoduleGeometry {
    /// 最小行索引 (含).
    pub min_row: usize,

    /// 最小列索引 (含).
    pub min_col: usize,

    /// 最大行索引 (不含).
    pub max_row: usize,

    /// 最大列索引 (不含).
    pub max_col: usize,

    /// 外接矩形高、宽中的较大者, 以像素为单位.
    pub diameter: usize,

    /// 连通域像素个数.
    pub area: usize,
}

/// 一个连通域: 像素集合及其几何信息.
#[derive(Clone, Debug)]
pub struct Region {
    pixels: Area2d,
    geometry: NoduleGeometry,
}

impl Region {
    /// 连通域内的所有像素, 按 BFS 访问顺序排列.
    #[inline]
    pub fn pixels(&self) -> &[Idx2d] {
        &self.pixels
    }

    /// 几何信息.
    #[inline]
    pub fn geometry(&self) -> NoduleGeometry {
        self.geometry
    }
}

impl NoduleGeometry {
    fn from_pixels(pixels: &[Idx2d]) -> Self {
        debug_assert!(!pixels.is_empty());
        let (mut min_row, mut min_col) = (usize::MAX, usize::MAX);
        let (mut max_row, mut max_col) = (0, 0);
        for &(h, w) in pixels {
            min_row = min_row.min(h);
            min_col = min_col.min(w);
            max_row = max_row.max(h + 1);
            max_col = max_col.max(w + 1);
        }
        Self {
            min_row,
            min_col,
            max_row,
            max_col,
            diameter: (max_row - min_row).max(max_col - min_col),
            area: pixels.len(),
        }
    }

    /// 外接矩形的高.
    #[inline]
    pub fn height(&self) -> usize {
        self.max_row - self.min_row
    }

    /// 外接矩形的宽.
    #[inline]
    pub fn width(&self) -> usize {
        self.max_col - self.min_col
    }

    /// 从二维掩码提取唯一结节的几何信息.
    ///
    /// 无前景时返回 `GeometryError::Empty`, 多于一个连通域时返回
    /// `GeometryError::MultipleRegions`.
    pub fn from_slice<T: Voxel>(mask: ArrayView2<T>) -> GeometryResult<Self> {
        let found = regions(mask);
        match found.len() {
            0 => Err(GeometryError::Empty),
            1 => Ok(found[0].geometry),
            count => Err(GeometryError::MultipleRegions { count }),
        }
    }

    /// 从三维掩码提取唯一结节的几何信息. 掩码先沿第 1 轴投影为冠状面足迹,
    /// 见 [`footprint`].
    #[inline]
    pub fn from_volume<T: Voxel>(mask: ArrayView3<T>) -> GeometryResult<Self> {
        Self::from_slice(footprint(mask).view())
    }

    /// 宽松模式: 返回最后一个被发现的连通域 (按光栅顺序) 的几何信息.
    ///
    /// 多个连通域时打印警告. 无前景时返回 `None`.
    pub fn last_region_of_slice<T: Voxel>(mask: ArrayView2<T>) -> Option<Self> {
        let found = regions(mask);
        if found.len() > 1 {
            warn!(
                "分割掩码中存在 {} 个连通域, 仅使用最后一个 (每次调用应只包含一个结节)",
                found.len()
            );
        }
        found.last().map(Region::geometry)
    }

    /// 宽松模式的三维版本. 见 [`Self::last_region_of_slice`].
    #[inline]
    pub fn last_region_of_volume<T: Voxel>(mask: ArrayView3<T>) -> Option<Self> {
        Self::last_region_of_slice(footprint(mask).view())
    }
}

/// 将三维掩码沿第 1 轴 (高) 投影为二维足迹: 只要该方向上存在非零体素,
/// 足迹对应像素即为前景 (1), 否则为 0.
pub fn footprint<T: Voxel>(mask: ArrayView3<T>) -> Array2<u8> {
    let (z, _, w) = mask.dim();
    let mut out = Array2::<u8>::zeros((z, w));
    Zip::from(&mut out)
        .and(mask.lanes(Axis(1)))
        .for_each(|o, lane| {
            *o = u8::from(lane.iter().any(|v| is_foreground(*v)));
        });
    out
}

#[inline]
fn is_foreground<T: Voxel>(v: T) -> bool {
    v.to_f64() != 0.0
}

/// 二值化后求所有 8-连通域, 按光栅顺序 (首个像素的行优先位置) 排列.
pub fn regions<T: Voxel>(mask: ArrayView2<T>) -> Vec<Region> {
    let (height, width) = mask.dim();
    let mut visited = Array2::<bool>::from_shape_fn((height, width), |p| !is_foreground(mask[p]));
    let mut ans = vec![];
    let mut bfs_q = VecDeque::with_capacity(8);

    for pos in ndarray::indices((height, width)) {
        if visited[pos] {
            continue;
        }
        visited[pos] = true;
        bfs_q.push_back(pos);
        let mut area = vec![];
        while let Some(cur) = bfs_q.pop_front() {
            area.push(cur);
            for nb in n8_positions(cur, (height, width)) {
                if !visited[nb] {
                    visited[nb] = true;
                    bfs_q.push_back(nb);
                }
            }
        }
        let geometry = NoduleGeometry::from_pixels(&area);
        ans.push(Region {
            pixels: area,
            geometry,
        });
    }
    ans
}

/// `pos` 周围 8 个像素中不越界的那些.
fn n8_positions((h, w): Idx2d, (height, width): Idx2d) -> impl Iterator<Item = Idx2d> {
    itertools::iproduct!(-1isize..=1, -1isize..=1)
        .filter(|&d| d != (0, 0))
        .filter_map(move |(dh, dw)| {
            let nh = h.checked_add_signed(dh)?;
            let nw = w.checked_add_signed(dw)?;
            (nh < height && nw < width).then_some((nh, nw))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{s, Array2, Array3};

    #[test]
    fn test_cube_diameter() {
        let mut vol = Array3::<u8>::zeros((5, 5, 5));
        vol.slice_mut(s![1..4, 1..4, 1..4]).fill(1);
        let g = NoduleGeometry::from_volume(vol.view()).unwrap();
        assert_eq!(g.diameter, 3);
        assert_eq!((g.min_row, g.min_col, g.max_row, g.max_col), (1, 1, 4, 4));
        assert_eq!(g.area, 9);
    }

    #[test]
    fn test_box_longest_edge() {
        // z 方向 2, h 方向 4 (被投影掉), w 方向 3.
        let mut vol = Array3::<i16>::zeros((6, 6, 6));
        vol.slice_mut(s![0..2, 1..5, 2..5]).fill(255);
        let g = NoduleGeometry::from_volume(vol.view()).unwrap();
        assert_eq!(g.height(), 2);
        assert_eq!(g.width(), 3);
        assert_eq!(g.diameter, 3);
    }

    #[test]
    fn test_empty_mask() {
        let vol = Array3::<u8>::zeros((3, 3, 3));
        assert_eq!(
            NoduleGeometry::from_volume(vol.view()),
            Err(GeometryError::Empty)
        );
        assert_eq!(NoduleGeometry::last_region_of_volume(vol.view()), None);
    }

    #[test]
    fn test_multiple_regions() {
        let mut img = Array2::<u8>::zeros((6, 6));
        img[(0, 0)] = 1;
        img.slice_mut(s![3..6, 2..4]).fill(2);
        assert_eq!(
            NoduleGeometry::from_slice(img.view()),
            Err(GeometryError::MultipleRegions { count: 2 })
        );

        let last = NoduleGeometry::last_region_of_slice(img.view()).unwrap();
        assert_eq!((last.min_row, last.min_col), (3, 2));
        assert_eq!(last.diameter, 3);

        let all = regions(img.view());
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].pixels(), &[(0, 0)]);
        assert_eq!(all[1].pixels().len(), 6);
    }

    #[test]
    fn test_diagonal_is_connected() {
        let mut img = Array2::<f32>::zeros((4, 4));
        img[(0, 0)] = 0.5;
        img[(1, 1)] = 0.5;
        img[(2, 2)] = -1.0;
        let g = NoduleGeometry::from_slice(img.view()).unwrap();
        assert_eq!(g.diameter, 3);
        assert_eq!(g.area, 3);
    }

    #[test]
    fn test_footprint() {
        let mut vol = Array3::<u8>::zeros((2, 3, 4));
        vol[(1, 2, 3)] = 1;
        let fp = footprint(vol.view());
        assert_eq!(fp.dim(), (2, 4));
        assert_eq!(fp.iter().map(|&v| v as usize).sum::<usize>(), 1);
        assert_eq!(fp[(1, 3)], 1);
    }
}
