//! 行压缩 (CSR) 稀疏矩阵与离散泊松算子.

/// 行压缩存储的稀疏矩阵. 每行内按列号升序存放非零元.
#[derive(Clone, Debug, PartialEq)]
pub struct SparseMatrix {
    rows: usize,
    cols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl SparseMatrix {
    /// 创建 `cols` 列的空矩阵, 之后逐行追加.
    fn with_cols(cols: usize, nnz_hint: usize) -> Self {
        Self {
            rows: 0,
            cols,
            indptr: vec![0],
            indices: Vec::with_capacity(nnz_hint),
            values: Vec::with_capacity(nnz_hint),
        }
    }

    /// 追加一行. `entries` 必须按列号升序排列且列号不越界.
    fn push_row<I: IntoIterator<Item = (usize, f64)>>(&mut self, entries: I) {
        for (c, v) in entries {
            debug_assert!(c < self.cols);
            self.indices.push(c);
            self.values.push(v);
        }
        self.indptr.push(self.indices.len());
        self.rows += 1;
    }

    /// 矩阵形状 (行, 列).
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// 非零元个数.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// 第 `r` 行的所有非零元 `(列号, 值)`.
    ///
    /// 当 `r` 越界时 panic.
    #[inline]
    pub fn row(&self, r: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.indptr[r]..self.indptr[r + 1];
        self.indices[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    /// 矩阵-向量乘法.
    ///
    /// 如果 `x` 长度与列数不符, 则程序 panic.
    pub fn mul_vec(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(x.len(), self.cols, "向量长度与矩阵列数不符");
        (0..self.rows)
            .map(|r| self.row(r).map(|(c, v)| v * x[c]).sum())
            .collect()
    }
}

/// 像素 `(y, x)` 在 `n * m` 网格中的 4-邻居展平索引, 按升序排列.
fn n4_flat(y: usize, x: usize, n: usize, m: usize) -> impl Iterator<Item = usize> {
    let k = x + y * m;
    [
        (y > 0).then(|| k - m),
        (x > 0).then(|| k - 1),
        (x + 1 < m).then(|| k + 1),
        (y + 1 < n).then(|| k + m),
    ]
    .into_iter()
    .flatten()
}

/// 生成 `n` 行 `m` 列网格上的离散泊松 (图拉普拉斯) 矩阵.
///
/// 像素按行优先展平为 `k = x + y * m`. 对角元为 4,
/// 同一行内左右相邻 (`k ± 1`) 以及上下相邻 (`k ± m`) 的位置为 -1.
/// 网格边缘的像素缺少的邻居不会回绕到别的行.
///
/// 参考: <https://en.wikipedia.org/wiki/Discrete_Poisson_equation>.
#[inline]
pub fn laplacian_matrix(n: usize, m: usize) -> SparseMatrix {
    poisson_operator(n, m, |_| false)
}

/// 与 [`laplacian_matrix`] 相同, 但 `is_fixed(k)` 为真的行替换为单位行.
pub fn poisson_operator<F: Fn(usize) -> bool>(n: usize, m: usize, is_fixed: F) -> SparseMatrix {
    let mut mat = SparseMatrix::with_cols(n * m, n * m * 5);
    for y in 0..n {
        for x in 0..m {
            let k = x + y * m;
            if is_fixed(k) {
                mat.push_row([(k, 1.0)]);
                continue;
            }
            let mut row: Vec<(usize, f64)> = n4_flat(y, x, n, m).map(|c| (c, -1.0)).collect();
            let at = row.partition_point(|&(c, _)| c < k);
            row.insert(at, (k, 4.0));
            mat.push_row(row);
        }
    }
    mat
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    impl SparseMatrix {
        /// `(r, c)` 处的值, 未存储的位置为 0.
        fn get(&self, r: usize, c: usize) -> f64 {
            self.row(r)
                .find_map(|(col, v)| (col == c).then_some(v))
                .unwrap_or(0.0)
        }

        /// 仅对角元为 1 的行.
        fn is_identity_row(&self, r: usize) -> bool {
            let mut it = self.row(r);
            matches!((it.next(), it.next()), (Some((c, v)), None) if c == r && v == 1.0)
        }

        fn to_dense(&self) -> Array2<f64> {
            let mut out = Array2::zeros((self.rows, self.cols));
            for r in 0..self.rows {
                for (c, v) in self.row(r) {
                    out[(r, c)] = v;
                }
            }
            out
        }
    }

    #[test]
    fn test_laplacian_2x2() {
        let mat = laplacian_matrix(2, 2);
        assert_eq!(mat.shape(), (4, 4));
        assert_eq!(mat.nnz(), 12);
        assert_eq!(
            mat.to_dense(),
            array![
                [4.0, -1.0, -1.0, 0.0],
                [-1.0, 4.0, 0.0, -1.0],
                [-1.0, 0.0, 4.0, -1.0],
                [0.0, -1.0, -1.0, 4.0],
            ]
        );
    }

    #[test]
    fn test_laplacian_no_wrap() {
        // 3 列: 第 0 行末尾 (k = 2) 与第 1 行开头 (k = 3) 不相邻.
        let mat = laplacian_matrix(2, 3);
        assert_eq!(mat.get(2, 3), 0.0);
        assert_eq!(mat.get(3, 2), 0.0);
        assert_eq!(mat.get(2, 5), -1.0);
        assert_eq!(mat.get(1, 1), 4.0);
        let dense = mat.to_dense();
        assert_eq!(dense, dense.t());
    }

    #[test]
    fn test_identity_rows() {
        let mat = poisson_operator(3, 3, |k| k != 4);
        for k in 0..9 {
            assert_eq!(mat.is_identity_row(k), k != 4);
        }
        let center: Vec<_> = mat.row(4).collect();
        assert_eq!(
            center,
            vec![(1, -1.0), (3, -1.0), (4, 4.0), (5, -1.0), (7, -1.0)]
        );
        assert_eq!(mat.mul_vec(&[1.0; 9])[4], 0.0);
    }
}
