//! 相似度矩阵的谱嵌入 + GMM 聚类。

pub mod embed;
pub mod gmm;

use anyhow::{Context, Result};
use ndarray::Array2;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

use crate::config::{AnalysisConfig, Layout};
use crate::simmat::{SimMatrix, SimMatrixSet};
use crate::typing::MhcClass;

pub use embed::spectral_embedding;

/// 等位基因 -> 聚类编号
pub type ClusterMap = BTreeMap<String, usize>;

pub fn save_clusters(path: &Path, map: &ClusterMap) -> Result<()> {
    crate::db::save_json(path, map)
}

pub fn load_clusters(path: &Path) -> Result<ClusterMap> {
    crate::db::load_json(path)
}

/// 单个 MHC 类别的聚类结果
#[derive(Debug, Clone)]
pub struct Clustering {
    pub labels: Vec<String>,
    pub embedding: Array2<f64>,
    pub assignments: Vec<usize>,
}

impl Clustering {
    pub fn to_map(&self) -> ClusterMap {
        self.labels.iter().cloned().zip(self.assignments.iter().copied()).collect()
    }

    pub fn n_clusters(&self) -> usize {
        self.assignments.iter().max().map_or(0, |m| m + 1)
    }

    /// 每个聚类一行：`id: allele allele ...`
    pub fn member_lines(&self) -> Vec<String> {
        let mut members: Vec<Vec<&str>> = vec![Vec::new(); self.n_clusters()];
        for (label, &c) in self.labels.iter().zip(&self.assignments) {
            members[c].push(label);
        }
        members
            .iter()
            .enumerate()
            .map(|(id, names)| format!("{}: {}", id, names.join(" ")))
            .collect()
    }
}

/// 嵌入并聚类一个相似度矩阵。
///
/// 零个等位基因得到空结果，一个等位基因直接归入聚类 0；
/// 聚类数不超过样本数。
pub fn cluster_matrix(m: &SimMatrix, dims: usize, k: usize, seed: u64, runs: u64) -> Result<Clustering> {
    let n = m.len();
    if n < 2 {
        return Ok(Clustering {
            labels: m.labels.clone(),
            embedding: Array2::zeros((n, 0)),
            assignments: vec![0; n],
        });
    }
    let embedding = spectral_embedding(&m.values, dims)?;
    let k = k.clamp(1, n);
    let assignments = gmm::fit_predict(&embedding, k, seed, runs)?;
    Ok(Clustering { labels: m.labels.clone(), embedding, assignments })
}

fn class_clusters(cfg: &AnalysisConfig, class: MhcClass) -> usize {
    match class {
        MhcClass::I => cfg.mhc_i_clusters,
        MhcClass::II => cfg.mhc_ii_clusters,
    }
}

fn write_plots(dir: &Path, class: MhcClass, c: &Clustering, cfg: &AnalysisConfig) -> Result<()> {
    let tag = class.file_tag();
    if c.embedding.ncols() == 0 {
        return Ok(());
    }

    let curve = gmm::criteria_curve(&c.embedding, cfg.max_components, cfg.gmm_seed, cfg.gmm_runs);
    if !curve.is_empty() {
        let bic: Vec<(f64, f64)> = curve.iter().map(|p| (p.components as f64, p.bic)).collect();
        let aic: Vec<(f64, f64)> = curve.iter().map(|p| (p.components as f64, p.aic)).collect();
        crate::plot::line_chart(
            &dir.join(format!("BIC_graph_{}.svg", tag)),
            &format!("{} information criteria", class),
            "components",
            &[("BIC", bic), ("AIC", aic)],
        )?;
    }

    for other in 1..c.embedding.ncols().min(4) {
        let points: Vec<(f64, f64)> = c
            .embedding
            .rows()
            .into_iter()
            .map(|r| (r[0], r[other]))
            .collect();
        let y_desc = format!("dimension {}", other + 1);
        crate::plot::cluster_scatter(
            &dir.join(format!("1n{} eigenvector {}.svg", other + 1, tag)),
            &format!("{} embedding", class),
            ("dimension 1", &y_desc),
            &points,
            &c.assignments,
        )?;
    }
    Ok(())
}

/// 读取相似度矩阵缓存，按类别聚类，写出聚类字典、成员列表和图。
pub fn run(layout: &Layout, cfg: &AnalysisConfig) -> Result<BTreeMap<MhcClass, Clustering>> {
    let set = SimMatrixSet::load_from_file(&layout.sim_matrix_cache())?;
    let plots = layout.cluster_data();
    Layout::ensure_dir(&plots)?;

    let mut out = BTreeMap::new();
    for class in MhcClass::ALL {
        let m = set.get(class);
        let k = class_clusters(cfg, class);
        if m.len() < k {
            warn!(class = %class, alleles = m.len(), requested = k, "fewer alleles than clusters, capping");
        }
        let c = cluster_matrix(m, cfg.embed_dims, k, cfg.gmm_seed, cfg.gmm_runs)
            .with_context(|| format!("clustering {} alleles", class))?;
        info!(class = %class, alleles = c.labels.len(), clusters = c.n_clusters(), "clustering done");

        write_plots(&plots, class, &c, cfg)?;
        save_clusters(&layout.clusters(class), &c.to_map())?;

        let members = plots.join(format!("{}_clust_members.txt", class.file_tag()));
        let mut f = std::io::BufWriter::new(
            std::fs::File::create(&members).with_context(|| format!("cannot write '{}'", members.display()))?,
        );
        println!("Clusters for {} alleles.", class);
        for line in c.member_lines() {
            writeln!(f, "{}", line)?;
            println!("{}", line);
        }
        f.flush()?;
        out.insert(class, c);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(n_per_block: usize) -> SimMatrix {
        let n = n_per_block * 2;
        let values = Array2::from_shape_fn((n, n), |(i, j)| {
            if i == j {
                1.0
            } else if (i < n_per_block) == (j < n_per_block) {
                0.8 + 0.01 * ((i + j) % 3) as f64
            } else {
                0.05
            }
        });
        SimMatrix { labels: (0..n).map(|i| format!("A*{:02}:01", i)).collect(), values }
    }

    #[test]
    fn single_allele_is_cluster_zero() {
        let m = SimMatrix { labels: vec!["A*01:01".into()], values: ndarray::arr2(&[[1.0]]) };
        let c = cluster_matrix(&m, 5, 8, 22, 1).unwrap();
        assert_eq!(c.assignments, vec![0]);
        assert_eq!(c.member_lines(), vec!["0: A*01:01".to_string()]);
    }

    #[test]
    fn empty_matrix() {
        let m = SimMatrix { labels: vec![], values: Array2::zeros((0, 0)) };
        let c = cluster_matrix(&m, 5, 8, 22, 1).unwrap();
        assert!(c.to_map().is_empty());
        assert!(c.member_lines().is_empty());
    }

    #[test]
    fn every_allele_gets_a_cluster_within_k() {
        let m = matrix(6);
        let c = cluster_matrix(&m, 2, 2, 22, 3).unwrap();
        assert_eq!(c.embedding.dim(), (12, 2));
        let map = c.to_map();
        assert_eq!(map.len(), 12);
        assert!(map.values().all(|&id| id < 2));
    }

    #[test]
    fn member_lines_list_each_cluster() {
        let c = Clustering {
            labels: vec!["A*01:01".into(), "A*02:01".into(), "B*07:02".into()],
            embedding: Array2::zeros((3, 1)),
            assignments: vec![1, 0, 1],
        };
        assert_eq!(c.member_lines(), vec!["0: A*02:01".to_string(), "1: A*01:01 B*07:02".to_string()]);
    }

    #[test]
    fn cluster_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("MHCI_clusters.json");
        let map: ClusterMap = [("A*01:01".to_string(), 3), ("B*07:02".to_string(), 0)].into_iter().collect();
        save_clusters(&path, &map).unwrap();
        assert_eq!(load_clusters(&path).unwrap(), map);
    }
}
