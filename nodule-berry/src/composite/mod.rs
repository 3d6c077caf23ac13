//! 病灶植入: 把合成的结节块无缝融合进宿主胸片的目标框中.
//!
//! 流程为: 紧致裁剪 -> 5x5 高斯模糊生成掩码 -> 以目标框中心放置 ->
//! 泊松融合 -> 在编辑区域内截断强度.
//!
//! 融合在宿主图像自身的强度尺度上进行, 编辑区域以外的像素保持逐位不变.

use log::{debug, warn};
use ndarray::{s, Array2, ArrayView2, Zip};

use crate::consts::{BLUR_KERNEL, CORRECTION};
use crate::poisson::{BlendError, CloneMode, PoissonBlender, SolverOptions};
use crate::{BoundingBox, Idx2d};

mod blur;

pub use blur::{gaussian_blur, gaussian_kernel};

/// 病灶植入错误.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompositeError {
    /// 结节块中没有非零像素.
    #[error("结节块中没有非零像素")]
    EmptyNodule,

    /// 目标框坐标非有限值或上下/左右颠倒.
    #[error("目标框 {0:?} 无效")]
    InvalidBox(BoundingBox),

    /// 结节块 (连同一圈边框) 放置后超出宿主图像.
    #[error("以 {center:?} 为中心放置 {size:?} 的结节块超出了 {host:?} 的宿主图像")]
    PlacementOutOfBounds {
        /// 放置中心 `(x, y)`.
        center: (i64, i64),

        /// 裁剪后结节块的 (高, 宽).
        size: Idx2d,

        /// 宿主图像的 (高, 宽).
        host: Idx2d,
    },

    /// 泊松融合失败.
    #[error(transparent)]
    Blend(#[from] BlendError),
}

/// 病灶植入结果.
pub type CompositeResult<T> = Result<T, CompositeError>;

/// 植入配置.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompositorConfig {
    /// 引导场类型.
    pub mode: CloneMode,

    /// 编辑区域内结果的合法强度范围 `(下限, 上限)`.
    pub value_range: (f64, f64),

    /// 泊松方程求解参数.
    pub solver: SolverOptions,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            mode: CloneMode::Mixed,
            value_range: (0.0, 1.0),
            solver: SolverOptions::default(),
        }
    }
}

/// 病灶植入器.
#[derive(Copy, Clone, Debug, Default)]
pub struct LesionCompositor {
    config: CompositorConfig,
}

impl LesionCompositor {
    /// 以给定配置创建.
    #[inline]
    pub fn new(config: CompositorConfig) -> Self {
        Self { config }
    }

    /// 配置.
    #[inline]
    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// 尽力而为的植入. 任何失败都只打印警告, 并返回宿主图像的拷贝.
    pub fn composite(
        &self,
        nodule: ArrayView2<f64>,
        host: ArrayView2<f64>,
        bbox: BoundingBox,
    ) -> Array2<f64> {
        match self.try_composite(nodule, host, bbox) {
            Ok(out) => out,
            Err(e) => {
                warn!("病灶植入失败, 返回原宿主图像: {e}");
                host.to_owned()
            }
        }
    }

    /// 尽力而为的植入, 同时返回与宿主图像同形的二值掩码 (1 为植入区域).
    /// 失败时返回宿主图像的拷贝和全零掩码.
    pub fn composite_with_mask(
        &self,
        nodule: ArrayView2<f64>,
        host: ArrayView2<f64>,
        bbox: BoundingBox,
    ) -> (Array2<f64>, Array2<u8>) {
        match self.try_composite_with_mask(nodule, host, bbox) {
            Ok(pair) => pair,
            Err(e) => {
                warn!("病灶植入失败, 返回原宿主图像: {e}");
                (host.to_owned(), Array2::zeros(host.raw_dim()))
            }
        }
    }

    /// 将 `nodule` 融合进 `host` 中 `bbox` 所指的位置.
    ///
    /// 结节块先被裁剪到其非零像素的最小外接矩形, 裁剪结果的中心对准 `bbox` 的中心.
    /// 编辑区域为裁剪块外扩一个像素; 最外圈直接取宿主图像的值.
    #[inline]
    pub fn try_composite(
        &self,
        nodule: ArrayView2<f64>,
        host: ArrayView2<f64>,
        bbox: BoundingBox,
    ) -> CompositeResult<Array2<f64>> {
        self.try_composite_with_mask(nodule, host, bbox)
            .map(|(out, _)| out)
    }

    /// 同 [`Self::try_composite`], 另外返回与宿主图像同形的二值掩码,
    /// 融合掩码覆盖的像素为 1, 其余为 0.
    pub fn try_composite_with_mask(
        &self,
        nodule: ArrayView2<f64>,
        host: ArrayView2<f64>,
        bbox: BoundingBox,
    ) -> CompositeResult<(Array2<f64>, Array2<u8>)> {
        if !bbox.is_finite() || bbox.x1 < bbox.x0 || bbox.y1 < bbox.y0 {
            return Err(CompositeError::InvalidBox(bbox));
        }
        let crop = tight_crop(nodule).ok_or(CompositeError::EmptyNodule)?;
        let (h, w) = crop.dim();

        let blurred = gaussian_blur(crop, BLUR_KERNEL, 0.0);
        let mut mask = Array2::<u8>::zeros((h + 2, w + 2));
        Zip::from(mask.slice_mut(s![1..h + 1, 1..w + 1]))
            .and(&blurred)
            .for_each(|m, &b| {
                if b != 0.0 {
                    *m = CORRECTION;
                }
            });

        let center = bbox.center();
        let (top, left) =
            framed_origin(center, (h, w), host.dim()).ok_or(CompositeError::PlacementOutOfBounds {
                center,
                size: (h, w),
                host: host.dim(),
            })?;
        debug!("结节块 {h}x{w} 放置于 ({top}, {left}), 外扩一个像素后融合");

        let mut out = host.to_owned();
        let (lo, hi) = self.config.value_range;
        {
            let mut region = out.slice_mut(s![top..top + h + 2, left..left + w + 2]);
            PoissonBlender::new(self.config.mode)
                .with_solver(self.config.solver)
                .edit_gray(crop, region.view_mut(), mask.view(), (1, 1))?;
            // 只截断求解出的像素, 边框与掩码外像素保持宿主原值.
            Zip::from(&mut region).and(&mask).for_each(|v, &m| {
                if m != 0 {
                    *v = v.clamp(lo, hi);
                }
            });
        }

        let mut placed = Array2::<u8>::zeros(host.raw_dim());
        Zip::from(placed.slice_mut(s![top..top + h + 2, left..left + w + 2]))
            .and(&mask)
            .for_each(|p, &m| *p = u8::from(m != 0));
        Ok((out, placed))
    }
}

/// 外扩一个像素后的编辑区域左上角 `(行, 列)`. 区域超出宿主图像时返回 `None`.
///
/// 裁剪块 `(h, w)` 的左上角为 `center - size / 2`.
fn framed_origin(center: (i64, i64), (h, w): Idx2d, (host_h, host_w): Idx2d) -> Option<Idx2d> {
    let origin = |c: i64, len: usize, host_len: usize| -> Option<usize> {
        let start = c.checked_sub(i64::try_from(len / 2).ok()?)?.checked_sub(1)?;
        let start = usize::try_from(start).ok()?;
        (start.checked_add(len)?.checked_add(2)? <= host_len).then_some(start)
    };
    Some((origin(center.1, h, host_h)?, origin(center.0, w, host_w)?))
}

/// 以默认配置 (混合梯度, `[0, 1]` 强度) 做尽力而为的植入.
#[inline]
pub fn composite(nodule: ArrayView2<f64>, host: ArrayView2<f64>, bbox: BoundingBox) -> Array2<f64> {
    LesionCompositor::default().composite(nodule, host, bbox)
}

/// 非零像素的最小外接矩形. 全零时返回 `None`.
pub fn tight_crop(img: ArrayView2<f64>) -> Option<ArrayView2<f64>> {
    let mut bounds: Option<(usize, usize, usize, usize)> = None;
    for ((r, c), &v) in img.indexed_iter() {
        if v == 0.0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (r, r, c, c),
            Some((r0, r1, c0, c1)) => (r0.min(r), r1.max(r), c0.min(c), c1.max(c)),
        });
    }
    let (r0, r1, c0, c1) = bounds?;
    Some(img.slice_move(s![r0..=r1, c0..=c1]))
}

/// 以乘性残差的方式把 `addition` 叠加到 `starting` 上:
/// `starting * exp(addition) * mask + starting * (1 - mask)`.
///
/// 如果三者形状不一致, 则程序 panic.
pub fn place_addition(
    addition: ArrayView2<f64>,
    starting: ArrayView2<f64>,
    mask: ArrayView2<f64>,
) -> Array2<f64> {
    Zip::from(addition)
        .and(starting)
        .and(mask)
        .map_collect(|&a, &s, &m| s * a.exp() * m + s * (1.0 - m))
}
