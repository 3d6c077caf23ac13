//! 结节块流水线: 从 CT 扫描及其结节分割生成指定直径的 2D 合成结节块.
//!
//! 几何提取 -> 等比重采样 -> 掩蔽结节外体素 -> DRR 投影.

use std::path::Path;

use log::debug;
use ndarray::{Array2, Axis, Zip};

use crate::dataset::{open_volume, LoadError};
use crate::drr::synthesize_along;
use crate::geometry::{GeometryError, NoduleGeometry};
use crate::resample::{ResampleError, Resampler};
use crate::{Idx3d, Spacing, Volume, Voxel};

/// 流水线错误.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 分割几何信息提取失败.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// 重采样失败.
    #[error(transparent)]
    Resample(#[from] ResampleError),

    /// 读取输入文件失败.
    #[error(transparent)]
    Io(#[from] LoadError),

    /// 扫描与分割形状不一致.
    #[error("扫描形状 {scan:?} 与分割形状 {label:?} 不一致")]
    ShapeMismatch {
        /// 扫描形状.
        scan: Idx3d,

        /// 分割形状.
        label: Idx3d,
    },

    /// 目标直径不是有限正数.
    #[error("目标直径必须为有限正数, 但得到了 {0}")]
    InvalidDiameter(f64),

    /// 投影轴不存在.
    #[error("投影轴 {0} 超出范围, 体数据只有 3 个轴")]
    InvalidAxis(usize),
}

/// 流水线结果.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// 流水线配置.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PipelineConfig {
    /// DRR 吸收增强系数.
    pub p_lambda: f64,

    /// 扫描重采样的插值阶数, 默认为 3 (三次样条).
    ///
    /// 常见做法对扫描也使用 1 阶; 两者得到的结节块在边缘处数值不同,
    /// 需要与其他来源的结节块保持一致时应显式设为 1.
    pub scan_order: usize,

    /// 分割重采样的插值阶数.
    pub label_order: usize,

    /// DRR 投影轴.
    pub projection_axis: usize,

    /// 是否使用文件头中的体素间距. 为 `false` 时视为单位间距.
    pub use_header_spacing: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            p_lambda: crate::consts::DEFAULT_P_LAMBDA,
            scan_order: 3,
            label_order: 1,
            projection_axis: 1,
            use_header_spacing: false,
        }
    }
}

/// 一个合成结节块.
#[derive(Clone, Debug)]
pub struct SynthesizedPatch {
    /// 投影结果, 未归一化.
    pub patch: Array2<f64>,

    /// 原分割中测得的结节直径 (像素).
    pub diameter: usize,

    /// 重采样后的体素间距.
    pub spacing: Spacing,
}

/// 结节块流水线.
#[derive(Copy, Clone, Debug, Default)]
pub struct PatchPipeline {
    config: PipelineConfig,
}

impl PatchPipeline {
    /// 以给定配置创建.
    #[inline]
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// 配置.
    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 读取 nii 格式的扫描与分割, 再调用 [`Self::run`].
    pub fn from_files<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        scan_path: P,
        label_path: Q,
        requested_diameter: f64,
    ) -> PipelineResult<SynthesizedPatch> {
        let scan: Volume<i16> = open_volume(scan_path)?;
        let label: Volume<u8> = open_volume(label_path)?;
        self.run(&scan, &label, requested_diameter)
    }

    /// 生成结节块, 使其中结节直径约为 `requested_diameter` 像素.
    ///
    /// 分割中必须恰好有一个结节 (冠状面足迹只有一个连通域).
    pub fn run<T: Voxel, U: Voxel>(
        &self,
        scan: &Volume<T>,
        label: &Volume<U>,
        requested_diameter: f64,
    ) -> PipelineResult<SynthesizedPatch> {
        if !(requested_diameter.is_finite() && requested_diameter > 0.0) {
            return Err(PipelineError::InvalidDiameter(requested_diameter));
        }
        if scan.shape() != label.shape() {
            return Err(PipelineError::ShapeMismatch {
                scan: scan.shape(),
                label: label.shape(),
            });
        }
        let axis = self.config.projection_axis;
        if axis >= 3 {
            return Err(PipelineError::InvalidAxis(axis));
        }

        let diameter = NoduleGeometry::from_volume(label.data())?.diameter;
        let scaling = diameter as f64 / requested_diameter;
        debug!("结节直径 {diameter}, 目标直径 {requested_diameter}, 缩放因子 {scaling}");

        let (scan, label) = if self.config.use_header_spacing {
            (scan.clone(), label.clone())
        } else {
            (
                Volume::new(scan.data().to_owned(), Spacing::unit()),
                Volume::new(label.data().to_owned(), Spacing::unit()),
            )
        };
        let mut scan = Resampler::new(self.config.scan_order)
            .spacing([scaling; 3])
            .resample(&scan)?
            .volume;
        let label = Resampler::new(self.config.label_order)
            .spacing([scaling; 3])
            .resample(&label)?
            .volume;

        // 形状非空, 两者总有最小值.
        if let (Some((scan_min, _)), Some((label_min, _))) = (scan.min_max(), label.min_max()) {
            let fill = T::from_f64(scan_min);
            Zip::from(scan.data_mut())
                .and(label.data())
                .for_each(|s, l| {
                    if l.to_f64() <= label_min {
                        *s = fill;
                    }
                });
        }

        let patch = synthesize_along(scan.data(), self.config.p_lambda, Axis(axis));
        Ok(SynthesizedPatch {
            patch,
            diameter,
            spacing: scan.spacing(),
        })
    }
}
