use anyhow::{Context, Result};
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, Axis};

/// 对应分析结果。
///
/// `P = N / n`，行质量 `r`、列质量 `c`；对标准化残差矩阵
/// `S = D_r^-1/2 (P - r c^T) D_c^-1/2` 做 SVD，`S = U Σ V^T`。
/// 行主坐标 `F = D_r^-1/2 U Σ`，列主坐标 `G = D_c^-1/2 V Σ`。
#[derive(Debug, Clone)]
pub struct CorrespondenceAnalysis {
    pub row_masses: Array1<f64>,
    pub col_masses: Array1<f64>,
    /// 降序排列，只保留非平凡的 `min(R, C) - 1` 个
    pub singular_values: Vec<f64>,
    pub row_coords: Array2<f64>,
    pub col_coords: Array2<f64>,
    /// `D_r (P - rc) D_c / rc`，即 `p - rc`
    pub indexed_residuals: Array2<f64>,
    /// `(p - rc) / sqrt(rc)`
    pub standardized_residuals: Array2<f64>,
}

impl CorrespondenceAnalysis {
    pub fn fit(table: &Array2<f64>) -> Result<Self> {
        let (nr, nc) = table.dim();
        if nr < 2 || nc < 2 {
            anyhow::bail!("correspondence analysis needs at least 2 rows and 2 columns, got {}x{}", nr, nc);
        }
        if table.iter().any(|&x| x < 0.0 || !x.is_finite()) {
            anyhow::bail!("contingency table has negative or non-finite counts");
        }
        let n = table.sum();
        if n <= 0.0 {
            anyhow::bail!("contingency table is empty");
        }
        let p = table / n;
        let r = p.sum_axis(Axis(1));
        let c = p.sum_axis(Axis(0));
        if let Some(i) = r.iter().position(|&m| m <= 0.0) {
            anyhow::bail!("row {} has no observations", i);
        }
        if let Some(j) = c.iter().position(|&m| m <= 0.0) {
            anyhow::bail!("column {} has no observations", j);
        }

        let expected = Array2::from_shape_fn((nr, nc), |(i, j)| r[i] * c[j]);
        let diff = &p - &expected;
        let indexed_residuals = diff.clone();
        let standardized_residuals = &diff / &expected.mapv(f64::sqrt);

        let s = DMatrix::from_fn(nr, nc, |i, j| standardized_residuals[[i, j]]);
        let svd = s.svd(true, true);
        let u = svd.u.context("SVD did not return left singular vectors")?;
        let v_t = svd.v_t.context("SVD did not return right singular vectors")?;

        let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
        order.sort_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]));
        order.truncate(nr.min(nc) - 1);

        let k = order.len();
        let mut row_coords = Array2::<f64>::zeros((nr, k));
        let mut col_coords = Array2::<f64>::zeros((nc, k));
        let mut singular_values = Vec::with_capacity(k);
        for (d, &idx) in order.iter().enumerate() {
            let sigma = svd.singular_values[idx];
            // the largest |u| entry is positive so axes do not flip between runs
            let pivot = (0..nr)
                .map(|i| u[(i, idx)])
                .max_by(|a, b| a.abs().total_cmp(&b.abs()))
                .unwrap_or(0.0);
            let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
            for i in 0..nr {
                row_coords[[i, d]] = sign * u[(i, idx)] * sigma / r[i].sqrt();
            }
            for j in 0..nc {
                col_coords[[j, d]] = sign * v_t[(idx, j)] * sigma / c[j].sqrt();
            }
            singular_values.push(sigma);
        }

        Ok(Self {
            row_masses: r,
            col_masses: c,
            singular_values,
            row_coords,
            col_coords,
            indexed_residuals,
            standardized_residuals,
        })
    }

    /// 总惯量（= 卡方 / n）
    pub fn total_inertia(&self) -> f64 {
        self.singular_values.iter().map(|s| s * s).sum()
    }

    /// 每个维度解释的惯量比例
    pub fn explained_inertia(&self) -> Vec<f64> {
        let total = self.total_inertia();
        self.singular_values
            .iter()
            .map(|s| if total > 0.0 { s * s / total } else { 0.0 })
            .collect()
    }

    /// 前两个维度上的坐标；只有一个维度时第二维为 0。
    pub fn plane(coords: &Array2<f64>) -> Vec<(f64, f64)> {
        coords
            .rows()
            .into_iter()
            .map(|r| (r.get(0).copied().unwrap_or(0.0), r.get(1).copied().unwrap_or(0.0)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    fn table() -> Array2<f64> {
        arr2(&[[10.0, 2.0, 3.0], [1.0, 12.0, 4.0], [3.0, 4.0, 11.0], [5.0, 5.0, 5.0]])
    }

    #[test]
    fn masses_sum_to_one() {
        let ca = CorrespondenceAnalysis::fit(&table()).unwrap();
        assert!((ca.row_masses.sum() - 1.0).abs() < 1e-12);
        assert!((ca.col_masses.sum() - 1.0).abs() < 1e-12);
        assert_eq!(ca.singular_values.len(), 2);
        assert!(ca.singular_values[0] >= ca.singular_values[1]);
    }

    #[test]
    fn inertia_equals_chi_square_over_n() {
        let t = table();
        let ca = CorrespondenceAnalysis::fit(&t).unwrap();
        let chi2_over_n: f64 = ca.standardized_residuals.iter().map(|z| z * z).sum();
        assert!((ca.total_inertia() - chi2_over_n).abs() < 1e-9);
        let explained: f64 = ca.explained_inertia().iter().sum();
        assert!((explained - 1.0).abs() < 1e-9);
    }

    #[test]
    fn weighted_coordinates_are_centred() {
        let ca = CorrespondenceAnalysis::fit(&table()).unwrap();
        for d in 0..ca.row_coords.ncols() {
            let row_mean: f64 = (0..ca.row_coords.nrows()).map(|i| ca.row_masses[i] * ca.row_coords[[i, d]]).sum();
            let col_mean: f64 = (0..ca.col_coords.nrows()).map(|j| ca.col_masses[j] * ca.col_coords[[j, d]]).sum();
            assert!(row_mean.abs() < 1e-9);
            assert!(col_mean.abs() < 1e-9);
        }
    }

    #[test]
    fn independent_table_has_zero_residuals() {
        let t = arr2(&[[2.0, 4.0], [3.0, 6.0]]);
        let ca = CorrespondenceAnalysis::fit(&t).unwrap();
        assert!(ca.indexed_residuals.iter().all(|x| x.abs() < 1e-12));
        assert!(ca.total_inertia() < 1e-20);
    }

    #[test]
    fn residual_definitions() {
        let t = arr2(&[[3.0, 1.0], [1.0, 3.0]]);
        let ca = CorrespondenceAnalysis::fit(&t).unwrap();
        // p = 3/8, r = c = 1/2, rc = 1/4
        assert!((ca.indexed_residuals[[0, 0]] - 0.125).abs() < 1e-12);
        assert!((ca.indexed_residuals[[1, 0]] + 0.125).abs() < 1e-12);
        assert!((ca.standardized_residuals[[0, 0]] - 0.25).abs() < 1e-12);
        assert!((ca.standardized_residuals[[0, 1]] + 0.25).abs() < 1e-12);
    }

    #[test]
    fn small_tables_rejected() {
        assert!(CorrespondenceAnalysis::fit(&arr2(&[[1.0, 2.0]])).is_err());
        assert!(CorrespondenceAnalysis::fit(&arr2(&[[1.0], [2.0]])).is_err());
    }
}
