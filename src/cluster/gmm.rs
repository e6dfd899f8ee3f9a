use anyhow::{Context, Result};
use linfa::prelude::*;
use linfa::DatasetBase;
use linfa_clustering::GaussianMixtureModel;
use nalgebra::{DMatrix, DVector};
use ndarray::Array2;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use tracing::warn;

/// 全协方差高斯混合模型，固定随机种子以便复现。
pub fn fit(data: &Array2<f64>, k: usize, seed: u64, runs: u64) -> Result<GaussianMixtureModel<f64>> {
    if k == 0 || k > data.nrows() {
        anyhow::bail!("cannot fit {} components to {} points", k, data.nrows());
    }
    let dataset = DatasetBase::from(data.clone());
    let rng = Xoshiro256Plus::seed_from_u64(seed);
    let model = GaussianMixtureModel::params(k)
        .n_runs(runs.max(1))
        .tolerance(1e-4)
        .with_rng(rng)
        .fit(&dataset)
        .with_context(|| format!("GMM with {} components failed to converge", k))?;
    Ok(model)
}

pub fn fit_predict(data: &Array2<f64>, k: usize, seed: u64, runs: u64) -> Result<Vec<usize>> {
    let model = fit(data, k, seed, runs)?;
    Ok(model.predict(data).to_vec())
}

/// 模型在数据上的对数似然（逐点 log-sum-exp）
pub fn log_likelihood(data: &Array2<f64>, model: &GaussianMixtureModel<f64>) -> Result<f64> {
    let weights = model.weights();
    let means = model.means();
    let covs = model.covariances();
    let d = data.ncols();
    let ln_2pi = (2.0 * std::f64::consts::PI).ln();

    // per component: (ln w, L^-1 factor via cholesky, ln det)
    let mut comps = Vec::with_capacity(weights.len());
    for c in 0..weights.len() {
        let cov = DMatrix::from_fn(d, d, |i, j| covs[[c, i, j]]);
        let chol = cov
            .cholesky()
            .with_context(|| format!("covariance of component {} is not positive definite", c))?;
        let l = chol.l();
        let log_det = 2.0 * l.diagonal().iter().map(|x| x.ln()).sum::<f64>();
        comps.push((weights[c].ln(), l, log_det));
    }

    let mut total = 0.0;
    for row in data.rows() {
        let terms: Vec<f64> = comps
            .iter()
            .enumerate()
            .filter_map(|(c, (ln_w, l, log_det))| {
                let diff = DVector::from_fn(d, |i, _| row[i] - means[[c, i]]);
                let z = l.solve_lower_triangular(&diff)?;
                Some(ln_w - 0.5 * (d as f64 * ln_2pi + log_det + z.norm_squared()))
            })
            .collect();
        let max = terms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            anyhow::bail!("sample has zero likelihood under every component");
        }
        total += max + terms.iter().map(|t| (t - max).exp()).sum::<f64>().ln();
    }
    Ok(total)
}

/// 全协方差 GMM 的自由参数个数
pub fn n_parameters(k: usize, d: usize) -> usize {
    k * d * (d + 1) / 2 + k * d + k - 1
}

/// 一个分量数下的信息准则
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Criteria {
    pub components: usize,
    pub bic: f64,
    pub aic: f64,
}

pub fn information_criteria(data: &Array2<f64>, model: &GaussianMixtureModel<f64>) -> Result<Criteria> {
    let ll = log_likelihood(data, model)?;
    let k = model.weights().len();
    let p = n_parameters(k, data.ncols()) as f64;
    let n = data.nrows() as f64;
    Ok(Criteria {
        components: k,
        bic: -2.0 * ll + p * n.ln(),
        aic: -2.0 * ll + 2.0 * p,
    })
}

/// 1..=max 个分量各拟合一次；分量数超过样本数或拟合失败的点被跳过。
pub fn criteria_curve(data: &Array2<f64>, max: usize, seed: u64, runs: u64) -> Vec<Criteria> {
    (1..=max.min(data.nrows()))
        .filter_map(|k| {
            let res = fit(data, k, seed, runs).and_then(|m| information_criteria(data, &m));
            match res {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!(components = k, error = %e, "skipping BIC/AIC point");
                    None
                }
            }
        })
        .collect()
}
