//! 共轭梯度求解器.
//!
//! 求解 `Ax = b`, 其中 `A` 对称正定, 以闭包形式给出矩阵-向量乘法.

/// 求解器参数.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolverOptions {
    /// 相对残差阈值 `|r| <= tol * max(|b|, |r0|)`, `r0` 为初始残差.
    pub tol: f64,

    /// 最大迭代次数. `None` 时取 `2 * 未知数个数 + 50`.
    pub max_iter: Option<usize>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            tol: 1e-10,
            max_iter: None,
        }
    }
}

impl SolverOptions {
    /// 对 `n` 个未知数实际使用的最大迭代次数.
    #[inline]
    pub fn max_iter_for(&self, n: usize) -> usize {
        self.max_iter.unwrap_or(2 * n + 50)
    }
}

/// 一次求解的结果.
#[derive(Clone, Debug)]
pub struct CgOutcome {
    /// 解向量.
    pub x: Vec<f64>,

    /// 实际迭代次数.
    pub iterations: usize,

    /// 最终残差的 2-范数.
    pub residual: f64,

    /// 是否达到收敛阈值.
    pub converged: bool,
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// 共轭梯度法. `x0` 为初始猜测.
///
/// 如果 `b` 与 `x0` 长度不符, 则程序 panic.
pub fn cg_solve<F>(a_op: F, b: &[f64], x0: &[f64], opts: &SolverOptions) -> CgOutcome
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    assert_eq!(b.len(), x0.len(), "初始猜测与右端项长度不符");
    let n = b.len();
    let max_iter = opts.max_iter_for(n);
    let mut x = x0.to_vec();

    // r = b - A*x
    let ax = a_op(&x);
    let mut r: Vec<f64> = b.iter().zip(ax.iter()).map(|(bi, axi)| bi - axi).collect();
    let mut p = r.clone();
    let mut rsold = dot(&r, &r);
    let threshold = opts.tol * dot(b, b).sqrt().max(rsold.sqrt());

    if rsold == 0.0 {
        return CgOutcome {
            x,
            iterations: 0,
            residual: rsold.sqrt(),
            converged: true,
        };
    }

    let mut iterations = 0;
    while iterations < max_iter {
        iterations += 1;
        let ap = a_op(&p);
        let pap = dot(&p, &ap);
        if pap.abs() < 1e-300 {
            break;
        }
        let alpha = rsold / pap;

        for i in 0..n {
            x[i] += alpha * p[i];
            r[i] -= alpha * ap[i];
        }

        let rsnew = dot(&r, &r);
        if rsnew.sqrt() <= threshold {
            rsold = rsnew;
            break;
        }

        let beta = rsnew / rsold;
        for i in 0..n {
            p[i] = r[i] + beta * p[i];
        }
        rsold = rsnew;
    }

    let residual = rsold.sqrt();
    CgOutcome {
        x,
        iterations,
        residual,
        converged: residual <= threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_cg_identity() {
        let b = vec![1.0, 2.0, 3.0];
        let out = cg_solve(|v| v.to_vec(), &b, &[0.0; 3], &SolverOptions::default());
        assert!(out.converged);
        for (xi, bi) in out.x.iter().zip(b.iter()) {
            assert_abs_diff_eq!(xi, bi, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_cg_tridiagonal() {
        // [2 -1 0; -1 2 -1; 0 -1 2] x = [1 0 1], x = [1 1 1].
        let op = |v: &[f64]| {
            vec![
                2.0 * v[0] - v[1],
                -v[0] + 2.0 * v[1] - v[2],
                -v[1] + 2.0 * v[2],
            ]
        };
        let out = cg_solve(op, &[1.0, 0.0, 1.0], &[0.0; 3], &SolverOptions::default());
        assert!(out.converged);
        assert!(out.iterations <= 3);
        for xi in out.x.iter() {
            assert_abs_diff_eq!(*xi, 1.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_cg_exact_initial_guess() {
        let out = cg_solve(|v| v.to_vec(), &[5.0, 6.0], &[5.0, 6.0], &SolverOptions::default());
        assert_eq!(out.iterations, 0);
        assert_eq!(out.x, vec![5.0, 6.0]);
    }

    #[test]
    fn test_cg_iteration_cap() {
        let opts = SolverOptions {
            tol: 1e-30,
            max_iter: Some(1),
        };
        let op = |v: &[f64]| vec![4.0 * v[0] - v[1], -v[0] + 3.0 * v[1]];
        let out = cg_solve(op, &[1.0, 2.0], &[0.0; 2], &opts);
        assert_eq!(out.iterations, 1);
        assert!(!out.converged);
    }
}
