use std::fmt::Debug;
use std::ops::{Index, IndexMut};

use ndarray::{Array3, ArrayView3, ArrayViewMut3};
use num::ToPrimitive;
use ordered_float::OrderedFloat;

use crate::Idx3d;

pub mod save;
pub mod window;

pub use save::ImgWriteVis;
pub use window::HuWindow;

/// 体素数据类型标记. 重采样启发式规则依赖它来判断数据 "看起来" 是扫描还是掩码.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VoxelKind {
    /// 8-bit 无符号整数.
    UInt8,

    /// 16-bit 有符号整数. 原始 CT 扫描通常以此类型存储.
    Int16,

    /// 16-bit 无符号整数.
    UInt16,

    /// 32-bit 有符号整数.
    Int32,

    /// 单精度浮点数.
    Float32,

    /// 双精度浮点数.
    Float64,
}

/// 可以存放在 [`Volume`] 中的体素值.
///
/// 所有插值计算都在 `f64` 上进行. 写回整数类型时四舍五入 (远离零) 并饱和截断,
/// `NaN` 写回为 0.
pub trait Voxel: Copy + Debug + PartialOrd + Send + Sync + 'static {
    /// 数据类型标记.
    const KIND: VoxelKind;

    /// 转换为 `f64`.
    fn to_f64(self) -> f64;

    /// 从 `f64` 转换回来.
    fn from_f64(v: f64) -> Self;
}

macro_rules! impl_voxel_int {
    ($($t: ty => $kind: ident),+) => {
        $(
            impl Voxel for $t {
                const KIND: VoxelKind = VoxelKind::$kind;

                #[inline]
                fn to_f64(self) -> f64 {
                    ToPrimitive::to_f64(&self).unwrap_or(f64::NAN)
                }

                #[inline]
                fn from_f64(v: f64) -> Self {
                    // `as` 自身即饱和转换.
                    v.round() as $t
                }
            }
        )+
    };
}

macro_rules! impl_voxel_float {
    ($($t: ty => $kind: ident),+) => {
        $(
            impl Voxel for $t {
                const KIND: VoxelKind = VoxelKind::$kind;

                #[inline]
                fn to_f64(self) -> f64 {
                    ToPrimitive::to_f64(&self).unwrap_or(f64::NAN)
                }

                #[inline]
                fn from_f64(v: f64) -> Self {
                    v as $t
                }
            }
        )+
    };
}

impl_voxel_int!(u8 => UInt8, i16 => Int16, u16 => UInt16, i32 => Int32);
impl_voxel_float!(f32 => Float32, f64 => Float64);

/// 体素间距不合法: 存在非有限值或非正值.
#[derive(Copy, Clone, Debug, PartialEq, thiserror::Error)]
#[error("体素间距必须为三个有限正数, 但得到了 {0:?}")]
pub struct InvalidSpacing(pub [f64; 3]);

/// 体素间距, 以毫米为单位, 与体数据的 `(z, h, w)` 轴一一对应.
///
/// 该结构只能通过 [`Spacing::new`] 构建, 因此总是满足 "三个有限正数" 的不变式.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Spacing([f64; 3]);

impl Spacing {
    /// 构建体素间距. 若存在非有限值或非正值则返回 `Err`.
    pub fn new(spacing: [f64; 3]) -> Result<Self, InvalidSpacing> {
        if spacing.iter().all(|s| s.is_finite() && *s > 0.0) {
            Ok(Self(spacing))
        } else {
            Err(InvalidSpacing(spacing))
        }
    }

    /// 各向同性的单位间距 `[1, 1, 1]`.
    #[inline]
    pub const fn unit() -> Self {
        Self([1.0; 3])
    }

    /// 各向同性的间距 `[s, s, s]`.
    #[inline]
    pub fn isotropic(s: f64) -> Result<Self, InvalidSpacing> {
        Self::new([s; 3])
    }

    /// 轴序颠倒后的间距.
    #[inline]
    pub fn reversed(&self) -> Self {
        let [a, b, c] = self.0;
        Self([c, b, a])
    }

    /// 以数组形式获取.
    #[inline]
    pub fn as_array(&self) -> [f64; 3] {
        self.0
    }
}

impl Index<usize> for Spacing {
    type Output = f64;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

/// 3D 体数据: 按 `(z, h, w)` 组织的体素数组 + 体素间距.
///
/// 既可以存放 CT 扫描 (HU 值), 也可以存放分割掩码.
#[derive(Debug, Clone)]
pub struct Volume<T> {
    data: Array3<T>,
    spacing: Spacing,
}

impl<T> Index<Idx3d> for Volume<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl<T> IndexMut<Idx3d> for Volume<T> {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl<T: Voxel> Volume<T> {
    /// 直接由数组和间距构建.
    #[inline]
    pub fn new(data: Array3<T>, spacing: Spacing) -> Self {
        Self { data, spacing }
    }

    /// 以单位间距构建.
    #[inline]
    pub fn with_unit_spacing(data: Array3<T>) -> Self {
        Self::new(data, Spacing::unit())
    }

    /// 数据形状 `(z, h, w)`.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    /// 体素间距.
    #[inline]
    pub fn spacing(&self) -> Spacing {
        self.spacing
    }

    /// 替换体素间距.
    #[inline]
    pub fn set_spacing(&mut self, spacing: Spacing) {
        self.spacing = spacing;
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, T> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut3<'_, T> {
        self.data.view_mut()
    }

    /// 各轴的物理长度, 以毫米为单位.
    pub fn extent_mm(&self) -> [f64; 3] {
        let (z, h, w) = self.shape();
        let s = self.spacing.as_array();
        [z as f64 * s[0], h as f64 * s[1], w as f64 * s[2]]
    }

    /// 体素值的 (最小值, 最大值). 空数据或全为 `NaN` 时返回 `None`.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        min_max(self.data.iter().map(|v| v.to_f64()))
    }
}

/// 一组数值的 (最小值, 最大值), 忽略 `NaN`. 无有效值时返回 `None`.
pub(crate) fn min_max<I: IntoIterator<Item = f64>>(it: I) -> Option<(f64, f64)> {
    use itertools::{Itertools, MinMaxResult};
    match it
        .into_iter()
        .filter(|v| !v.is_nan())
        .map(OrderedFloat)
        .minmax()
    {
        MinMaxResult::NoElements => None,
        MinMaxResult::OneElement(v) => Some((v.0, v.0)),
        MinMaxResult::MinMax(lo, hi) => Some((lo.0, hi.0)),
    }
}

/// 银行家舍入 (四舍六入五成双). 目标形状与放置中心的取整都按此规则.
pub(crate) fn round_half_even(v: f64) -> f64 {
    let r = v.round();
    if (v - v.trunc()).abs() == 0.5 {
        2.0 * (v / 2.0).round()
    } else {
        r
    }
}

/// 宿主图像上的目标框 (像素坐标). `x` 为水平方向 (宽), `y` 为垂直方向 (高).
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundingBox {
    /// 左边界.
    pub x0: f64,

    /// 右边界.
    pub x1: f64,

    /// 上边界.
    pub y0: f64,

    /// 下边界.
    pub y1: f64,
}

impl BoundingBox {
    /// 直接构建.
    #[inline]
    pub fn new(x0: f64, x1: f64, y0: f64, y1: f64) -> Self {
        Self { x0, x1, y0, y1 }
    }

    /// 四个坐标是否都是有限值?
    #[inline]
    pub fn is_finite(&self) -> bool {
        [self.x0, self.x1, self.y0, self.y1]
            .iter()
            .all(|v| v.is_finite())
    }

    /// 框的中点 `(x, y)`, 按银行家舍入取整.
    #[inline]
    pub fn center(&self) -> (i64, i64) {
        (
            round_half_even((self.x0 + self.x1) / 2.0) as i64,
            round_half_even((self.y0 + self.y1) / 2.0) as i64,
        )
    }
}
