//! 泊松图像编辑 (Pérez et al., "Poisson Image Editing", 2003).
//!
//! 在掩码区域内求解离散泊松方程: 结果在区域内保持源图的梯度 (引导场),
//! 在区域外及编辑区域最外圈保持目标图的值.
//!
//! # 算子
//!
//! 在 `n * m` 网格上构建图拉普拉斯算子 (见 [`laplacian_matrix`]),
//! 再把所有掩码为 0 的像素, 以及编辑区域最外圈的 **所有** 像素 (无论掩码取值)
//! 所在的行替换为单位行. 这些像素直接取目标图的值.
//!
//! 求解时将固定像素移到右端项, 剩余的自由像素构成对称正定方程组,
//! 以目标图的值为初始猜测做共轭梯度迭代. 各通道互不依赖.

use log::debug;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, ArrayViewMut2, ArrayViewMut3, Axis};

use crate::{Idx2d, Voxel};

mod error;
mod solver;
mod sparse;

pub use error::BlendError;
pub use solver::{cg_solve, CgOutcome, SolverOptions};
pub use sparse::{laplacian_matrix, poisson_operator, SparseMatrix};

/// 泊松融合结果.
pub type BlendResult<T> = Result<T, BlendError>;

/// 引导场类型.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CloneMode {
    /// 引导场为源图梯度, 右端项即源图的拉普拉斯.
    #[default]
    Normal,

    /// 对每对相邻像素, 取源图与目标图差分中绝对值较大者.
    /// 适合把半透明的结节叠加到带纹理的背景上.
    Mixed,
}

/// 一次融合的统计信息.
#[derive(Clone, Debug)]
pub struct BlendReport {
    /// 自由 (参与求解的) 像素个数.
    pub free_pixels: usize,

    /// 每个通道的迭代次数.
    pub iterations: Vec<usize>,
}

/// 泊松融合器.
#[derive(Copy, Clone, Debug, Default)]
pub struct PoissonBlender {
    mode: CloneMode,
    solver: SolverOptions,
}

impl PoissonBlender {
    /// 以指定引导场类型创建, 使用默认求解器参数.
    #[inline]
    pub fn new(mode: CloneMode) -> Self {
        Self {
            mode,
            solver: SolverOptions::default(),
        }
    }

    /// 替换求解器参数.
    #[inline]
    pub fn with_solver(mut self, solver: SolverOptions) -> Self {
        self.solver = solver;
        self
    }

    /// 引导场类型.
    #[inline]
    pub fn mode(&self) -> CloneMode {
        self.mode
    }

    /// 将 `source` 平移 `offset = (dx, dy)` 后, 在 `mask` 指定的区域内融合进 `target`.
    ///
    /// * `source`: `(高, 宽, 通道)`, 通道数为 1 或与 `target` 相同.
    ///   单通道源图会用于 `target` 的每个通道.
    /// * `target`: `(高, 宽, 通道)`, 就地修改. 编辑区域即整个 `target`.
    /// * `mask`: 与 `target` 同高同宽, 非零即为待编辑像素.
    ///
    /// 出错时 `target` 保持不变.
    pub fn edit<T: Voxel>(
        &self,
        source: ArrayView3<f64>,
        mut target: ArrayViewMut3<f64>,
        mask: ArrayView2<T>,
        offset: (isize, isize),
    ) -> BlendResult<BlendReport> {
        let (n, m, channels) = target.dim();
        if mask.dim() != (n, m) {
            return Err(BlendError::ShapeMismatch {
                mask: mask.dim(),
                target: (n, m),
            });
        }
        let src_channels = source.len_of(Axis(2));
        if src_channels != 1 && src_channels != channels {
            return Err(BlendError::ChannelMismatch {
                source_channels: src_channels,
                target_channels: channels,
            });
        }
        if !source.iter().chain(target.iter()).all(|v| v.is_finite()) {
            return Err(BlendError::NonFinite);
        }

        let shifted = translate(source, offset, (n, m));
        let fixed = fixed_pixels(mask, (n, m));
        let system = PoissonSystem::new(n, m, &fixed);
        let laplacian = laplacian_matrix(n, m);

        let solve = |c: usize| -> BlendResult<(Vec<f64>, usize)> {
            let src = shifted.index_axis(Axis(2), if src_channels == 1 { 0 } else { c });
            let tgt = target.index_axis(Axis(2), c);
            let src_flat: Vec<f64> = src.iter().copied().collect();
            let tgt_flat: Vec<f64> = tgt.iter().copied().collect();

            let mut b = match self.mode {
                CloneMode::Normal => laplacian.mul_vec(&src_flat),
                CloneMode::Mixed => mixed_guidance(&src_flat, &tgt_flat, n, m),
            };
            for (k, is_fixed) in fixed.iter().enumerate() {
                if *is_fixed {
                    b[k] = tgt_flat[k];
                }
            }
            system
                .solve(&b, &tgt_flat, &self.solver)
                .map_err(|(iterations, residual)| BlendError::NotConverged {
                    channel: c,
                    iterations,
                    residual,
                })
        };

        let solved: Vec<(Vec<f64>, usize)>;
        cfg_if::cfg_if! {
            if #[cfg(feature = "rayon")] {
                use rayon::iter::{IntoParallelIterator, ParallelIterator};
                solved = (0..channels).into_par_iter().map(solve).collect::<BlendResult<_>>()?;
            } else {
                solved = (0..channels).map(solve).collect::<BlendResult<_>>()?;
            }
        }

        let mut iterations = Vec::with_capacity(channels);
        for (c, (x, iters)) in solved.into_iter().enumerate() {
            let x = Array2::from_shape_vec((n, m), x)
                .unwrap_or_else(|_| unreachable!("解向量长度总等于像素个数"));
            target.index_axis_mut(Axis(2), c).assign(&x);
            iterations.push(iters);
        }
        debug!(
            "泊松融合: {n}x{m} 网格, {} 个自由像素, 迭代次数 {iterations:?}",
            system.free.len()
        );

        Ok(BlendReport {
            free_pixels: system.free.len(),
            iterations,
        })
    }

    /// 单通道版本的 [`Self::edit`].
    #[inline]
    pub fn edit_gray<T: Voxel>(
        &self,
        source: ArrayView2<f64>,
        target: ArrayViewMut2<f64>,
        mask: ArrayView2<T>,
        offset: (isize, isize),
    ) -> BlendResult<BlendReport> {
        self.edit(
            source.insert_axis(Axis(2)),
            target.insert_axis(Axis(2)),
            mask,
            offset,
        )
    }
}

/// 以普通引导场做泊松融合, 见 [`PoissonBlender::edit`].
#[inline]
pub fn poisson_edit<T: Voxel>(
    source: ArrayView3<f64>,
    target: ArrayViewMut3<f64>,
    mask: ArrayView2<T>,
    offset: (isize, isize),
) -> BlendResult<BlendReport> {
    PoissonBlender::default().edit(source, target, mask, offset)
}

/// 将 `source` 平移 `(dx, dy)` 到 `(高, 宽) = shape` 的画布上.
/// 即 `out[y, x] = source[y - dy, x - dx]`, 源图覆盖不到的位置为 0.
pub fn translate(source: ArrayView3<f64>, (dx, dy): (isize, isize), shape: Idx2d) -> Array3<f64> {
    let (h, w, c) = source.dim();
    let mut out = Array3::<f64>::zeros((shape.0, shape.1, c));
    for ((y, x, ch), v) in out.indexed_iter_mut() {
        let sy = y as isize - dy;
        let sx = x as isize - dx;
        if (0..h as isize).contains(&sy) && (0..w as isize).contains(&sx) {
            *v = source[(sy as usize, sx as usize, ch)];
        }
    }
    out
}

/// 固定像素 (单位行) 标记: 掩码为 0, 或位于编辑区域最外圈.
fn fixed_pixels<T: Voxel>(mask: ArrayView2<T>, (n, m): Idx2d) -> Vec<bool> {
    mask.indexed_iter()
        .map(|((y, x), v)| {
            let border = y == 0 || x == 0 || y + 1 == n || x + 1 == m;
            border || v.to_f64() == 0.0
        })
        .collect()
}

/// 混合梯度引导场的散度. 对每个像素 `p` 和它的网格内 4-邻居 `q`,
/// 累加 `s_p - s_q` 与 `t_p - t_q` 中绝对值较大者.
fn mixed_guidance(src: &[f64], tgt: &[f64], n: usize, m: usize) -> Vec<f64> {
    let mut b = vec![0.0; n * m];
    for y in 0..n {
        for x in 0..m {
            let k = x + y * m;
            let neighbours = [
                (y > 0).then(|| k - m),
                (x > 0).then(|| k - 1),
                (x + 1 < m).then(|| k + 1),
                (y + 1 < n).then(|| k + m),
            ];
            b[k] = neighbours
                .into_iter()
                .flatten()
                .map(|q| {
                    let ds = src[k] - src[q];
                    let dt = tgt[k] - tgt[q];
                    if ds.abs() > dt.abs() {
                        ds
                    } else {
                        dt
                    }
                })
                .sum();
        }
    }
    b
}

/// 带单位行的泊松算子, 及其自由像素子系统.
struct PoissonSystem {
    operator: SparseMatrix,
    /// 自由像素的展平索引.
    free: Vec<usize>,
    /// 展平索引 -> 自由像素序号.
    slot: Vec<Option<usize>>,
}

impl PoissonSystem {
    fn new(n: usize, m: usize, fixed: &[bool]) -> Self {
        let operator = poisson_operator(n, m, |k| fixed[k]);
        let free: Vec<usize> = (0..n * m).filter(|&k| !fixed[k]).collect();
        let mut slot = vec![None; n * m];
        for (i, &k) in free.iter().enumerate() {
            slot[k] = Some(i);
        }
        Self {
            operator,
            free,
            slot,
        }
    }

    /// 求解 `A x = b`. 单位行上 `x = b`; 自由像素上把已知量移到右端项后用共轭梯度求解.
    ///
    /// 未收敛时返回 `Err((迭代次数, 残差))`.
    fn solve(&self, b: &[f64], guess: &[f64], opts: &SolverOptions) -> Result<(Vec<f64>, usize), (usize, f64)> {
        let mut x = b.to_vec();
        if self.free.is_empty() {
            return Ok((x, 0));
        }

        let rhs: Vec<f64> = self
            .free
            .iter()
            .map(|&k| {
                let known: f64 = self
                    .operator
                    .row(k)
                    .filter(|(c, _)| self.slot[*c].is_none())
                    .map(|(c, v)| v * b[c])
                    .sum();
                b[k] - known
            })
            .collect();
        let x0: Vec<f64> = self.free.iter().map(|&k| guess[k]).collect();

        let a_op = |y: &[f64]| -> Vec<f64> {
            self.free
                .iter()
                .map(|&k| {
                    self.operator
                        .row(k)
                        .filter_map(|(c, v)| self.slot[c].map(|j| v * y[j]))
                        .sum()
                })
                .collect()
        };
        let out = cg_solve(a_op, &rhs, &x0, opts);
        if !out.converged {
            return Err((out.iterations, out.residual));
        }
        for (&k, v) in self.free.iter().zip(out.x) {
            x[k] = v;
        }
        Ok((x, out.iterations))
    }
}
