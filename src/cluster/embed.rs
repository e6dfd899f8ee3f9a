use anyhow::Result;
use nalgebra::DMatrix;
use ndarray::Array2;

/// 拉普拉斯特征映射（谱嵌入）。
///
/// 亲和矩阵先对称化，负值截断为 0，忽略自环；在对称归一化拉普拉斯
/// `L = I - D^-1/2 A D^-1/2` 上取最小的 `dims + 1` 个特征向量，按 `D^-1/2`
/// 缩放并固定符号（绝对值最大的分量为正），丢弃第一个（平凡）向量。
/// 返回 `n x dims'` 矩阵，`dims' = min(dims, n - 1)`。
pub fn spectral_embedding(affinity: &Array2<f64>, dims: usize) -> Result<Array2<f64>> {
    let (n, m) = affinity.dim();
    if n != m {
        anyhow::bail!("affinity matrix must be square, got {}x{}", n, m);
    }
    if n < 2 {
        anyhow::bail!("spectral embedding needs at least 2 points, got {}", n);
    }

    let weight = |i: usize, j: usize| -> f64 {
        if i == j {
            return 0.0;
        }
        let w = 0.5 * (affinity[[i, j]] + affinity[[j, i]]);
        if w.is_finite() && w > 0.0 {
            w
        } else {
            0.0
        }
    };

    let degree: Vec<f64> = (0..n).map(|i| (0..n).map(|j| weight(i, j)).sum()).collect();
    if let Some(i) = degree.iter().position(|&d| d <= 0.0) {
        anyhow::bail!("point {} has no positive affinity to any other point", i);
    }
    let inv_sqrt: Vec<f64> = degree.iter().map(|d| 1.0 / d.sqrt()).collect();

    let laplacian = DMatrix::from_fn(n, n, |i, j| {
        let norm = weight(i, j) * inv_sqrt[i] * inv_sqrt[j];
        if i == j {
            1.0 - norm
        } else {
            -norm
        }
    });
    let eig = laplacian.symmetric_eigen();

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[a].total_cmp(&eig.eigenvalues[b]));

    let k = (dims + 1).min(n);
    let mut out = Array2::<f64>::zeros((n, k - 1));
    // skip the trivial first eigenvector
    for (c, &col) in order[1..k].iter().enumerate() {
        let v: Vec<f64> = (0..n).map(|i| eig.eigenvectors[(i, col)] * inv_sqrt[i]).collect();
        let pivot = v
            .iter()
            .copied()
            .max_by(|a, b| a.abs().total_cmp(&b.abs()))
            .unwrap_or(0.0);
        let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
        for (i, x) in v.into_iter().enumerate() {
            out[[i, c]] = sign * x;
        }
    }
    Ok(out)
}
