//! 对比度匹配.
//!
//! 参考 Litjens 等人的做法: `c = ln(结节区平均强度 / 周围组织平均强度)`.
//! 结果下限截断为 [`CONTRAST_FLOOR`], 否则合成结节有时几乎不可见.

use ndarray::ArrayView2;

use crate::consts::CONTRAST_FLOOR;
use crate::Idx2d;

/// 计算对比度因子.
///
/// `nodule` 为合成结节块, `nodule_pixels` 为其中属于结节的像素坐标,
/// `surrounding` 为宿主图像中对应区域的强度.
///
/// 结果永不小于 0.4. 像素集合为空、背景均值为 0 或比值非正等导致结果
/// 非有限的情形也返回 0.4.
///
/// 如果 `nodule_pixels` 中存在越界坐标, 则程序 panic.
pub fn contrast_factor(
    nodule: ArrayView2<f64>,
    nodule_pixels: &[Idx2d],
    surrounding: ArrayView2<f64>,
) -> f64 {
    let it = mean(nodule_pixels.iter().map(|&p| nodule[p]));
    let ib = mean(surrounding.iter().copied());
    floor_contrast((it / ib).ln())
}

/// 将原始对比度值截断到下限. 非有限值 (含正无穷) 视为无效, 取下限.
#[inline]
pub fn floor_contrast(c: f64) -> f64 {
    if !c.is_finite() || c < CONTRAST_FLOOR {
        CONTRAST_FLOOR
    } else {
        c
    }
}

fn mean<I: IntoIterator<Item = f64>>(it: I) -> f64 {
    let mut count = 0u64;
    let mut sum = 0.0;
    for v in it {
        count += 1;
        sum += v;
    }
    sum / (count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    #[test]
    fn test_contrast_regular() {
        let nodule = array![[0.0, 2.0], [2.0, 0.0]];
        let lung = Array2::from_elem((3, 3), 0.5);
        let c = contrast_factor(nodule.view(), &[(0, 1), (1, 0)], lung.view());
        assert_abs_diff_eq!(c, 4.0_f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_contrast_never_below_floor() {
        let lung = Array2::from_elem((3, 3), 0.8);

        // 结节比周围暗.
        let dim = Array2::from_elem((2, 2), 0.2);
        let c = contrast_factor(dim.view(), &[(0, 0), (1, 1)], lung.view());
        assert_eq!(c, CONTRAST_FLOOR);

        // 略亮但仍低于下限.
        let close = Array2::from_elem((2, 2), 0.9);
        assert_eq!(contrast_factor(close.view(), &[(0, 0)], lung.view()), 0.4);

        // 空像素集合、全零背景、负均值.
        assert_eq!(contrast_factor(dim.view(), &[], lung.view()), 0.4);
        let black = Array2::<f64>::zeros((2, 2));
        assert_eq!(contrast_factor(dim.view(), &[(0, 0)], black.view()), 0.4);
        let neg = Array2::from_elem((2, 2), -1.0);
        assert_eq!(contrast_factor(neg.view(), &[(0, 0)], lung.view()), 0.4);
        assert_eq!(floor_contrast(f64::NEG_INFINITY), 0.4);
        assert_eq!(floor_contrast(f64::INFINITY), 0.4);
        assert_eq!(floor_contrast(f64::NAN), 0.4);
        assert_eq!(floor_contrast(2.5), 2.5);
    }
}
