//! 3D 体数据重采样.
//!
//! 按目标体素间距或目标形状 (二者必须且只能给出一个) 缩放体数据.
//! 插值在 `f64` 上进行, 写回时转换为原体素类型.
//!
//! # 启发式检查
//!
//! 插值阶数与数据 "看起来" 的类型不匹配时 (扫描用了 1 阶, 或掩码用了 3 阶),
//! 只打印警告并在结果中附带 [`OrderAdvisory`], 不会中止处理.

use log::{debug, warn};
use ndarray::{Array3, Axis};

use crate::consts::heuristic::{MASK_MAX, SCAN_MAX};
use crate::consts::MAX_SPLINE_ORDER;
use crate::data::round_half_even;
use crate::{InvalidSpacing, Spacing, Volume, Voxel, VoxelKind};

mod spline;

/// 重采样错误. 均为调用约定违例, 不可恢复.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResampleError {
    /// 既没有给出目标间距, 也没有给出目标形状.
    #[error("必须给出目标体素间距或目标形状之一")]
    MissingTarget,

    /// 同时给出了目标间距和目标形状.
    #[error("目标体素间距和目标形状只能给出一个")]
    ConflictingTarget,

    /// 不支持的插值阶数.
    #[error("插值阶数必须在 0 ~ 5 之间, 但得到了 {0}")]
    UnsupportedOrder(usize),

    /// 目标间距或计算出的间距不合法.
    #[error(transparent)]
    InvalidSpacing(#[from] InvalidSpacing),

    /// 输入体数据存在长度为 0 的轴.
    #[error("输入体数据形状 {0:?} 存在空轴")]
    EmptyVolume([usize; 3]),

    /// 目标形状存在长度为 0 的轴.
    #[error("目标形状 {0:?} 存在空轴")]
    EmptyShape([usize; 3]),
}

/// 重采样结果.
pub type ResampleResult<T> = Result<T, ResampleError>;

/// 插值阶数与数据类型不匹配的提示.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OrderAdvisory {
    /// 数据看起来是 CT 扫描 (`i16`, 有负值且最大值超过 50), 却使用了 1 阶插值.
    ScanWithOrder1,

    /// 数据看起来是标签掩码 (8/16-bit 整数, 取值在 \[0, 50\]), 却使用了 3 阶插值.
    MaskWithOrder3,
}

impl OrderAdvisory {
    /// 面向用户的提示语.
    pub fn message(&self) -> &'static str {
        match self {
            Self::ScanWithOrder1 => "数据看起来是扫描, 却选择了 1 阶插值, 建议使用 3 阶",
            Self::MaskWithOrder3 => "数据看起来是标签掩码, 却选择了 3 阶插值, 建议使用 1 阶",
        }
    }
}

/// 根据数据类型和取值范围检查插值阶数是否合适. 仅作提示.
pub fn check_order(kind: VoxelKind, min: f64, max: f64, order: usize) -> Option<OrderAdvisory> {
    if kind == VoxelKind::Int16 && min < 0.0 && max > SCAN_MAX && order == 1 {
        return Some(OrderAdvisory::ScanWithOrder1);
    }
    let mask_like = matches!(
        kind,
        VoxelKind::UInt8 | VoxelKind::Int16 | VoxelKind::UInt16
    );
    if mask_like && min == 0.0 && max <= MASK_MAX && order == 3 {
        return Some(OrderAdvisory::MaskWithOrder3);
    }
    None
}

/// 重采样结果.
#[derive(Debug, Clone)]
pub struct Resampled<T> {
    /// 重采样后的体数据. 其间距按输入约定的逆序给出.
    pub volume: Volume<T>,

    /// 各轴实际缩放因子 (目标形状 / 原形状).
    pub factor: [f64; 3],

    /// 启发式检查结果.
    pub advisory: Option<OrderAdvisory>,
}

/// 重采样器.
///
/// ```
/// use nodule_berry::resample::Resampler;
/// use nodule_berry::Volume;
/// use ndarray::Array3;
///
/// let vol = Volume::with_unit_spacing(Array3::<f32>::zeros((4, 4, 4)));
/// let out = Resampler::new(1).shape([2, 8, 3]).resample(&vol).unwrap();
/// assert_eq!(out.volume.shape(), (2, 8, 3));
/// ```
#[derive(Copy, Clone, Debug)]
pub struct Resampler {
    order: usize,
    spacing: Option<[f64; 3]>,
    shape: Option<[usize; 3]>,
}

impl Resampler {
    /// 以 `order` 阶插值创建. 1 为线性, 3 为三次样条, 0 为最近邻.
    #[inline]
    pub fn new(order: usize) -> Self {
        Self {
            order,
            spacing: None,
            shape: None,
        }
    }

    /// 设置目标体素间距.
    #[inline]
    pub fn spacing(mut self, spacing: [f64; 3]) -> Self {
        self.spacing = Some(spacing);
        self
    }

    /// 设置目标形状.
    #[inline]
    pub fn shape(mut self, shape: [usize; 3]) -> Self {
        self.shape = Some(shape);
        self
    }

    /// 插值阶数.
    #[inline]
    pub fn order(&self) -> usize {
        self.order
    }

    /// 计算目标形状与目标间距 (逆序前).
    fn plan(&self, shape: [usize; 3], spacing: Spacing) -> ResampleResult<([usize; 3], Spacing)> {
        if self.order > MAX_SPLINE_ORDER {
            return Err(ResampleError::UnsupportedOrder(self.order));
        }
        if shape.contains(&0) {
            return Err(ResampleError::EmptyVolume(shape));
        }
        match (self.spacing, self.shape) {
            (None, None) => Err(ResampleError::MissingTarget),
            (Some(_), Some(_)) => Err(ResampleError::ConflictingTarget),
            (None, Some(new_shape)) => {
                if new_shape.contains(&0) {
                    return Err(ResampleError::EmptyShape(new_shape));
                }
                let s = spacing.as_array();
                let new_spacing = Spacing::new(std::array::from_fn(|i| {
                    s[i] / (new_shape[i] as f64 / shape[i] as f64)
                }))?;
                Ok((new_shape, new_spacing))
            }
            (Some(target), None) => {
                let target = Spacing::new(target)?;
                // 行/列约定归一化.
                let spacing = if spacing[0] == spacing[1] {
                    spacing.reversed()
                } else {
                    spacing
                };
                let new_shape: [usize; 3] = std::array::from_fn(|i| {
                    let mm = shape[i] as f64 * spacing[i];
                    round_half_even(mm / target[i]) as usize
                });
                if new_shape.contains(&0) {
                    return Err(ResampleError::EmptyShape(new_shape));
                }
                Ok((new_shape, target))
            }
        }
    }

    /// 对 `volume` 重采样.
    pub fn resample<T: Voxel>(&self, volume: &Volume<T>) -> ResampleResult<Resampled<T>> {
        let (z, h, w) = volume.shape();
        let shape = [z, h, w];
        let (new_shape, new_spacing) = self.plan(shape, volume.spacing())?;
        let factor: [f64; 3] = std::array::from_fn(|i| new_shape[i] as f64 / shape[i] as f64);

        let advisory = volume
            .min_max()
            .and_then(|(lo, hi)| check_order(T::KIND, lo, hi, self.order));
        if let Some(adv) = advisory {
            warn!("{}", adv.message());
        }
        debug!(
            "重采样 {shape:?} -> {new_shape:?}, 缩放因子 {factor:?}, {} 阶插值",
            self.order
        );

        let mut data: Array3<f64> = volume.data().mapv(Voxel::to_f64);
        for (axis, &len) in new_shape.iter().enumerate() {
            data = spline::zoom_axis(&data, Axis(axis), len, self.order);
        }
        let data = data.mapv(T::from_f64);

        Ok(Resampled {
            volume: Volume::new(data, new_spacing.reversed()),
            factor,
            advisory,
        })
    }
}
