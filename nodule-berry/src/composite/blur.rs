//! 可分离高斯模糊, 边界按 reflect-101 (`dcb|abcd|cba`) 延拓.

use ndarray::{Array2, ArrayView2, Axis, Zip};

/// 奇数边长 `<= 7` 且未指定标准差时使用的固定核.
const SMALL_KERNELS: [&[f64]; 4] = [
    &[1.0],
    &[0.25, 0.5, 0.25],
    &[0.0625, 0.25, 0.375, 0.25, 0.0625],
    &[
        0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125,
    ],
];

/// 边长为 `ksize` 的一维高斯核, 和为 1.
///
/// `sigma <= 0` 时按 `0.3 * ((ksize - 1) / 2 - 1) + 0.8` 推算标准差;
/// 若此时 `ksize` 为不超过 7 的奇数, 则直接使用二项式系数表.
///
/// 如果 `ksize` 为偶数, 则程序 panic.
pub fn gaussian_kernel(ksize: usize, sigma: f64) -> Vec<f64> {
    assert!(ksize % 2 == 1, "高斯核边长必须为奇数");
    if sigma <= 0.0 && ksize <= 7 {
        return SMALL_KERNELS[ksize / 2].to_vec();
    }
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((ksize as f64 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let half = (ksize / 2) as f64;
    let raw: Vec<f64> = (0..ksize)
        .map(|i| {
            let d = i as f64 - half;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|v| v / sum).collect()
}

/// reflect-101 延拓下, 越界索引 `i` 对应的有效索引.
fn reflect_101(mut i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    while i < 0 || i >= n {
        i = if i < 0 { -i } else { 2 * n - 2 - i };
    }
    i as usize
}

fn convolve_axis(img: ArrayView2<f64>, kernel: &[f64], axis: Axis) -> Array2<f64> {
    let half = (kernel.len() / 2) as isize;
    let mut out = Array2::<f64>::zeros(img.raw_dim());
    Zip::from(out.lanes_mut(axis))
        .and(img.lanes(axis))
        .for_each(|mut dst, src| {
            let n = src.len();
            for (i, d) in dst.iter_mut().enumerate() {
                *d = kernel
                    .iter()
                    .enumerate()
                    .map(|(j, w)| w * src[reflect_101(i as isize + j as isize - half, n)])
                    .sum();
            }
        });
    out
}

/// 以 `ksize * ksize` 的高斯核模糊二维图像.
pub fn gaussian_blur(img: ArrayView2<f64>, ksize: usize, sigma: f64) -> Array2<f64> {
    if img.is_empty() {
        return img.to_owned();
    }
    let kernel = gaussian_kernel(ksize, sigma);
    let rows = convolve_axis(img, &kernel, Axis(1));
    convolve_axis(rows.view(), &kernel, Axis(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_kernel_sums_to_one() {
        for (k, s) in [(1, 0.0), (3, 0.0), (5, 0.0), (7, 0.0), (9, 0.0), (5, 2.0)] {
            let kernel = gaussian_kernel(k, s);
            assert_eq!(kernel.len(), k);
            assert_abs_diff_eq!(kernel.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        }
        assert_eq!(gaussian_kernel(5, 0.0)[2], 0.375);
    }

    #[test]
    fn test_reflect_101() {
        assert_eq!(reflect_101(-1, 4), 1);
        assert_eq!(reflect_101(-2, 4), 2);
        assert_eq!(reflect_101(4, 4), 2);
        assert_eq!(reflect_101(5, 4), 1);
        assert_eq!(reflect_101(-2, 2), 0);
        assert_eq!(reflect_101(3, 2), 1);
        assert_eq!(reflect_101(-2, 1), 0);
    }

    #[test]
    fn test_blur() {
        let flat = Array2::from_elem((4, 6), 0.7);
        for v in gaussian_blur(flat.view(), 5, 0.0) {
            assert_abs_diff_eq!(v, 0.7, epsilon = 1e-12);
        }

        let mut dot = Array2::<f64>::zeros((7, 7));
        dot[(3, 3)] = 1.0;
        let out = gaussian_blur(dot.view(), 5, 0.0);
        assert_abs_diff_eq!(out[(3, 3)], 0.375 * 0.375, epsilon = 1e-12);
        assert_abs_diff_eq!(out.sum(), 1.0, epsilon = 1e-12);
        assert_eq!(out[(0, 0)], 0.0);

        let single = array![[2.0]];
        assert_eq!(gaussian_blur(single.view(), 5, 0.0), single);
    }
}
