//! 一维样条缩放核心.
//!
//! 三维缩放是可分离的: 依次对每个轴上的所有一维线做缩放即可.
//! 2 阶以上先对线做 B 样条预滤波 (因果/反因果 IIR), 再按 B 样条基函数加权.
//!
//! 边界按 "nearest" 延拓: 预滤波前先将线两端各复制延拓 [`PAD`] 个样本,
//! 预滤波本身使用反射初始化.

use ndarray::{Array3, ArrayView1, ArrayViewMut1, Axis, Zip};

/// 预滤波前每端延拓的样本数.
pub(crate) const PAD: usize = 12;

/// `order` 阶 B 样条预滤波器的极点.
fn poles(order: usize) -> Vec<f64> {
    match order {
        2 => vec![8.0_f64.sqrt() - 3.0],
        3 => vec![3.0_f64.sqrt() - 2.0],
        4 => vec![
            (664.0 - 438976.0_f64.sqrt()).sqrt() + 304.0_f64.sqrt() - 19.0,
            (664.0 + 438976.0_f64.sqrt()).sqrt() - 304.0_f64.sqrt() - 19.0,
        ],
        5 => vec![
            (67.5 - (17745.0_f64 / 4.0).sqrt()).sqrt() + (105.0_f64 / 4.0).sqrt() - 6.5,
            (67.5 + (17745.0_f64 / 4.0).sqrt()).sqrt() - (105.0_f64 / 4.0).sqrt() - 6.5,
        ],
        _ => vec![],
    }
}

/// 就地对 `c` 做 `order` 阶 B 样条预滤波, 把样本值变为样条系数.
pub(crate) fn prefilter(c: &mut [f64], order: usize) {
    let n = c.len();
    if n < 2 {
        return;
    }
    let poles = poles(order);
    if poles.is_empty() {
        return;
    }

    let gain: f64 = poles.iter().map(|z| (1.0 - z) * (1.0 - 1.0 / z)).product();
    c.iter_mut().for_each(|v| *v *= gain);

    for &z in poles.iter() {
        init_causal_reflect(c, z);
        for i in 1..n {
            c[i] += z * c[i - 1];
        }
        c[n - 1] *= z / (z - 1.0);
        for i in (0..n - 1).rev() {
            c[i] = z * (c[i + 1] - c[i]);
        }
    }
}

fn init_causal_reflect(c: &mut [f64], z: f64) {
    let n = c.len();
    let c0 = c[0];
    let z_n = z.powi(n as i32);
    let mut z_i = z;

    let mut acc = c[0] + z_n * c[n - 1];
    for i in 1..n {
        acc += z_i * (c[i] + z_n * c[n - 1 - i]);
        z_i *= z;
    }
    c[0] = acc * z / (1.0 - z_n * z_n) + c0;
}

/// 中心化的 `n` 阶 B 样条基函数 (`n >= 1`).
pub(crate) fn bspline(n: usize, t: f64) -> f64 {
    let half = (n + 1) as f64 / 2.0;
    if t.abs() >= half {
        return 0.0;
    }
    let mut binom = 1.0;
    let mut acc = 0.0;
    for k in 0..=n + 1 {
        let u = t + half - k as f64;
        if u > 0.0 {
            let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
            acc += sign * binom * u.powi(n as i32);
        }
        binom = binom * (n + 1 - k) as f64 / (k + 1) as f64;
    }
    let factorial: f64 = (1..=n).map(|v| v as f64).product();
    acc / factorial
}

/// 一个轴上的缩放计划: 每个输出样本对应的起始输入索引和权重.
pub(crate) struct LinePlan {
    in_len: usize,
    out_len: usize,
    order: usize,
    starts: Vec<isize>,
    weights: Vec<f64>,
}

impl LinePlan {
    /// 输入长度 `in_len` 缩放到 `out_len`. 输出第 `o` 个样本对应输入坐标
    /// `o * (in_len - 1) / (out_len - 1)`, `out_len == 1` 时为 0.
    pub fn new(in_len: usize, out_len: usize, order: usize) -> Self {
        debug_assert!(in_len > 0 && out_len > 0);
        let ratio = if out_len > 1 {
            (in_len - 1) as f64 / (out_len - 1) as f64
        } else {
            0.0
        };
        let taps = order + 1;
        let mut starts = Vec::with_capacity(out_len);
        let mut weights = Vec::with_capacity(out_len * taps);

        for o in 0..out_len {
            let x = o as f64 * ratio;
            if order == 0 {
                starts.push((x + 0.5).floor() as isize);
                weights.push(1.0);
                continue;
            }
            let start = if order % 2 == 1 {
                x.floor() as isize - (order / 2) as isize
            } else {
                (x + 0.5).floor() as isize - (order / 2) as isize
            };
            starts.push(start);
            weights.extend((0..taps).map(|k| bspline(order, x - (start + k as isize) as f64)));
        }

        Self {
            in_len,
            out_len,
            order,
            starts,
            weights,
        }
    }

    /// 对一条线做缩放. `buf` 为复用的工作区.
    fn apply(&self, src: ArrayView1<f64>, mut dst: ArrayViewMut1<f64>, buf: &mut Vec<f64>) {
        debug_assert_eq!(src.len(), self.in_len);
        debug_assert_eq!(dst.len(), self.out_len);

        buf.clear();
        let (first, last) = (src[0], src[self.in_len - 1]);
        buf.extend(std::iter::repeat(first).take(PAD));
        buf.extend(src.iter().copied());
        buf.extend(std::iter::repeat(last).take(PAD));
        if self.order >= 2 {
            prefilter(buf, self.order);
        }

        let taps = self.order + 1;
        let hi = (buf.len() - 1) as isize;
        for (o, out) in dst.iter_mut().enumerate() {
            let start = self.starts[o] + PAD as isize;
            let w = &self.weights[o * taps..(o + 1) * taps];
            *out = w
                .iter()
                .enumerate()
                .map(|(k, wk)| wk * buf[(start + k as isize).clamp(0, hi) as usize])
                .sum();
        }
    }
}

/// 沿 `axis` 将 `input` 缩放到长度 `out_len`.
pub(crate) fn zoom_axis(input: &Array3<f64>, axis: Axis, out_len: usize, order: usize) -> Array3<f64> {
    let in_len = input.len_of(axis);
    if in_len == out_len {
        return input.clone();
    }
    let plan = LinePlan::new(in_len, out_len, order);
    let mut shape = input.raw_dim();
    shape[axis.index()] = out_len;
    let mut out = Array3::<f64>::zeros(shape);
    let mut buf = Vec::with_capacity(in_len + 2 * PAD);

    Zip::from(input.lanes(axis))
        .and(out.lanes_mut(axis))
        .for_each(|src, dst| plan.apply(src, dst, &mut buf));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_bspline_partition_of_unity() {
        for n in 1..=5 {
            for &x in &[0.0, 0.13, 0.5, 0.77] {
                let sum: f64 = (-4..=4).map(|k| bspline(n, x - k as f64)).sum();
                assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-10);
            }
        }
        assert_abs_diff_eq!(bspline(1, 0.0), 1.0);
        assert_abs_diff_eq!(bspline(3, 0.0), 2.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(bspline(3, 1.0), 1.0 / 6.0, epsilon = 1e-12);
        assert_eq!(bspline(3, 2.0), 0.0);
    }

    /// 预滤波后在整数点处插值应还原原样本.
    #[test]
    fn test_prefilter_interpolates_samples() {
        let samples = [3.0, -1.0, 4.0, 1.0, -5.0, 9.0, 2.0, 6.0];
        for order in 2..=5 {
            let mut c = samples.to_vec();
            prefilter(&mut c, order);
            let half = (order / 2) as isize + 1;
            for i in 2..samples.len() - 2 {
                let v: f64 = (-half..=half)
                    .filter_map(|d| {
                        let j = i as isize + d;
                        (0..c.len() as isize)
                            .contains(&j)
                            .then(|| c[j as usize] * bspline(order, -d as f64))
                    })
                    .sum();
                assert_abs_diff_eq!(v, samples[i], epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_linear_plan() {
        let input = Array3::from_shape_vec((1, 1, 3), vec![0.0, 2.0, 4.0]).unwrap();
        let out = zoom_axis(&input, Axis(2), 5, 1);
        let got: Vec<f64> = out.iter().copied().collect();
        for (g, e) in got.iter().zip([0.0, 1.0, 2.0, 3.0, 4.0]) {
            assert_abs_diff_eq!(*g, e, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_constant_line_stays_constant() {
        let input = Array3::from_elem((2, 3, 4), 7.5);
        for order in 0..=5 {
            let out = zoom_axis(&input, Axis(1), 7, order);
            assert_eq!(out.dim(), (2, 7, 4));
            out.iter()
                .for_each(|v| assert_abs_diff_eq!(*v, 7.5, epsilon = 1e-9));
        }
    }
}
