//! 数字重建放射影像 (DRR): 将 3D CT 体数据投影为 2D 合成胸片.
//!
//! 衰减模型: HU 截断到 \[-500, 400\], 平移 +1024, 除以 1000, 乘以增强系数
//! `p_lambda`, 截断到 `<= 1`, 取指数, 再沿某一轴取平均.
//! 组织密度越大, X 射线吸收的增强越明显.

use log::debug;
use ndarray::{Array, Array2, Array3, ArrayView, ArrayView3, Axis, Dimension};

use crate::consts::hu::{DRR_LOWER, DRR_UPPER, OFFSET, SCALE};
use crate::consts::DEFAULT_P_LAMBDA;
use crate::data::min_max;
use crate::Voxel;

/// 单个体素的衰减值 `exp(min(1, (clip(hu) + 1024) / 1000 * p_lambda))`.
#[inline]
pub fn attenuation(hu: f64, p_lambda: f64) -> f64 {
    let clipped = hu.clamp(f64::from(DRR_LOWER), f64::from(DRR_UPPER));
    ((clipped + OFFSET) / SCALE * p_lambda).min(1.0).exp()
}

/// 以默认增强系数 0.85 沿第 1 轴投影.
#[inline]
pub fn synthesize_default<T: Voxel>(volume: ArrayView3<T>) -> Array2<f64> {
    synthesize(volume, DEFAULT_P_LAMBDA)
}

/// 沿第 1 轴 (高) 投影.
#[inline]
pub fn synthesize<T: Voxel>(volume: ArrayView3<T>, p_lambda: f64) -> Array2<f64> {
    synthesize_along(volume, p_lambda, Axis(1))
}

/// 沿 `axis` 投影. 输出值位于 `(1, e]` 之间, 未做归一化.
///
/// 如果 `volume` 在 `axis` 方向长度为 0, 则程序 panic.
pub fn synthesize_along<T: Voxel>(volume: ArrayView3<T>, p_lambda: f64, axis: Axis) -> Array2<f64> {
    assert!(volume.len_of(axis) > 0, "投影方向长度不能为 0");
    let att: Array3<f64> = volume.mapv(|v| attenuation(v.to_f64(), p_lambda));
    // 长度非零时 `mean_axis` 总能返回结果.
    att.mean_axis(axis)
        .unwrap_or_else(|| unreachable!("投影方向长度不能为 0"))
}

/// 将图像线性拉伸到 \[0, 1\].
///
/// 最大值等于最小值 (或图像为空、取值范围非有限) 时无法归一化,
/// 此时原样返回输入的拷贝.
pub fn min_max_normalize<D: Dimension>(img: ArrayView<f64, D>) -> Array<f64, D> {
    match min_max(img.iter().copied()) {
        Some((lo, hi)) if hi > lo && (hi - lo).is_finite() => {
            let range = hi - lo;
            img.mapv(|v| (v - lo) / range)
        }
        _ => {
            debug!("图像取值范围退化, 跳过归一化");
            img.to_owned()
        }
    }
}

/// 沿第 0 轴逐样本独立归一化, 每个样本各自拉伸到 \[0, 1\].
pub fn min_max_normalize_per_sample(batch: ArrayView3<f64>) -> Array3<f64> {
    let mut out = batch.to_owned();

    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            use rayon::iter::{IntoParallelIterator, ParallelIterator};
            out.axis_iter_mut(Axis(0))
                .into_par_iter()
                .for_each(|mut sample| {
                    let normalized = min_max_normalize(sample.view());
                    sample.assign(&normalized);
                });
        } else {
            for mut sample in out.axis_iter_mut(Axis(0)) {
                let normalized = min_max_normalize(sample.view());
                sample.assign(&normalized);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array3};
    use std::f64::consts::E;

    #[test]
    fn test_attenuation_range() {
        // 截断下限: (-500 + 1024) / 1000 * 0.85.
        assert_abs_diff_eq!(attenuation(-3000.0, 0.85), (0.524_f64 * 0.85).exp(), epsilon = 1e-12);
        // 截断上限: 1.424 * 0.85 > 1, 再截断为 1.
        assert_abs_diff_eq!(attenuation(3000.0, 0.85), E, epsilon = 1e-12);
        assert!(attenuation(0.0, 0.85) > 1.0);
    }

    /// 窗内的 HU 值以双精度参与计算, 不经过单精度舍入.
    #[test]
    fn test_attenuation_keeps_precision() {
        for hu in [100.123456789, -499.999999999, 0.1, 399.75000000001] {
            assert_eq!(attenuation(hu, 0.85), ((hu + 1024.0) / 1000.0 * 0.85_f64).min(1.0).exp());
        }
        assert_eq!(attenuation(-500.0000001, 0.85), attenuation(-500.0, 0.85));
    }

    #[test]
    fn test_projection_shape_and_mean() {
        let mut vol = Array3::<i16>::from_elem((2, 4, 3), -1000);
        vol[(0, 0, 0)] = 400;
        let img = synthesize(vol.view(), 0.85);
        assert_eq!(img.dim(), (2, 3));
        let lo = attenuation(-1000.0, 0.85);
        let hi = attenuation(400.0, 0.85);
        assert_abs_diff_eq!(img[(0, 0)], (3.0 * lo + hi) / 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(img[(1, 2)], lo, epsilon = 1e-12);
        assert!(img.iter().all(|&v| v > 1.0 && v <= E));

        let img = synthesize_along(vol.view(), 0.85, Axis(0));
        assert_eq!(img.dim(), (4, 3));
    }

    /// 增大 `p_lambda` 时, 任意像素都不会变暗.
    #[test]
    fn test_monotonic_in_p_lambda() {
        let vol = Array3::from_shape_fn((3, 5, 4), |(z, h, w)| {
            -600.0_f32 + (z * 97 + h * 41 + w * 13) as f32 % 900.0
        });
        let mut prev = synthesize(vol.view(), 0.1);
        for step in 2..=20 {
            let cur = synthesize(vol.view(), step as f64 * 0.1);
            for (a, b) in prev.iter().zip(cur.iter()) {
                assert!(b >= a);
            }
            prev = cur;
        }
    }

    #[test]
    fn test_normalize() {
        let img = array![[1.0, 2.0], [3.0, 5.0]];
        let n = min_max_normalize(img.view());
        assert_eq!(n, array![[0.0, 0.25], [0.5, 1.0]]);

        // 退化输入原样返回, 不会产生 NaN.
        let flat = Array2::from_elem((2, 2), 1.7);
        assert_eq!(min_max_normalize(flat.view()), flat);
        let empty = Array2::<f64>::zeros((0, 3));
        assert_eq!(min_max_normalize(empty.view()).dim(), (0, 3));
    }

    #[test]
    fn test_normalize_per_sample() {
        let batch = Array3::from_shape_vec(
            (2, 1, 3),
            vec![0.0, 5.0, 10.0, 4.0, 4.0, 4.0],
        )
        .unwrap();
        let n = min_max_normalize_per_sample(batch.view());
        assert_eq!(n.index_axis(Axis(0), 0), array![[0.0, 0.5, 1.0]]);
        assert_eq!(n.index_axis(Axis(0), 1), array![[4.0, 4.0, 4.0]]);
    }
}
