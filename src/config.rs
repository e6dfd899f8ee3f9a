use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 工作目录布局：所有输入 / 输出文件都从 root 推导。
#[derive(Debug, Clone)]
pub struct Layout {
    pub root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn databases(&self) -> PathBuf {
        self.root.join("databases")
    }

    pub fn spreadsheets(&self) -> PathBuf {
        self.root.join("spreadsheets")
    }

    pub fn output(&self) -> PathBuf {
        self.root.join("output")
    }

    pub fn allele_db(&self) -> PathBuf {
        self.databases().join("HLA_alleles.json")
    }

    pub fn group_db(&self) -> PathBuf {
        self.databases().join("HLA_groups.json")
    }

    pub fn sim_matrix_dir(&self) -> PathBuf {
        self.databases().join("sim_matrix")
    }

    pub fn sim_matrix_cache(&self) -> PathBuf {
        self.sim_matrix_dir().join("sim_matrix.bin")
    }

    pub fn clusters(&self, class: crate::typing::MhcClass) -> PathBuf {
        self.databases().join(format!("{}_clusters.json", class.file_tag()))
    }

    pub fn types_table(&self) -> PathBuf {
        self.spreadsheets().join("types.csv")
    }

    pub fn response_table(&self) -> PathBuf {
        self.spreadsheets().join("response.csv")
    }

    pub fn alignments(&self) -> PathBuf {
        self.output().join("alignments")
    }

    pub fn cluster_data(&self) -> PathBuf {
        self.output().join("cluster_data")
    }

    pub fn ca_stats(&self) -> PathBuf {
        self.output().join("CA").join("stats")
    }

    pub fn ca_results(&self) -> PathBuf {
        self.output().join("CA").join("results")
    }

    pub fn ensure_dir(path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("cannot create directory '{}'", path.display()))
    }
}

/// 检查输入文件是否存在，缺失时给出统一的提示。
pub fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        return Ok(());
    }
    let name = path.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let dir = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string());
    anyhow::bail!("please ensure '{}' is in the {} folder", name, dir)
}

/// 分析参数。默认值即研究中使用的设置，可用 TOML 文件覆盖任意子集。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub gap_open: f64,
    pub gap_extend: f64,
    /// 相似度归一化常数（BLOSUM100 对角线最大值）
    pub similarity_normaliser: f64,

    pub embed_dims: usize,
    pub mhc_i_clusters: usize,
    pub mhc_ii_clusters: usize,
    pub gmm_seed: u64,
    pub gmm_runs: u64,
    pub max_components: usize,

    pub response_edges: Vec<f64>,
    pub response_labels: Vec<String>,
    pub total_quantiles: usize,
    pub total_labels: Vec<String>,

    pub missing_marker: String,
    pub not_measured: Vec<f64>,
    pub zero_sentinels: Vec<f64>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            gap_open: -10.0,
            gap_extend: -0.5,
            similarity_normaliser: 17.0,
            embed_dims: 5,
            mhc_i_clusters: 8,
            mhc_ii_clusters: 7,
            gmm_seed: 22,
            gmm_runs: 1,
            max_components: 24,
            response_edges: vec![-1.0, 0.0, 0.001, 0.01, 1.0],
            response_labels: ["No response", "Weak", "Moderate", "Strong"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            total_quantiles: 5,
            total_labels: ["Very Low", "Low", "Moderate", "High", "Very High"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            missing_marker: "n.t.".to_string(),
            not_measured: vec![-777.0],
            zero_sentinels: vec![-888.0, -999.0],
        }
    }
}

impl AnalysisConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let cfg = match path {
            None => Self::default(),
            Some(p) => {
                let text = std::fs::read_to_string(p)
                    .with_context(|| format!("cannot read config '{}'", p.display()))?;
                toml::from_str(&text).with_context(|| format!("invalid config '{}'", p.display()))?
            }
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.response_edges.len() != self.response_labels.len() + 1 {
            anyhow::bail!(
                "response_edges must have exactly one more entry than response_labels ({} vs {})",
                self.response_edges.len(),
                self.response_labels.len()
            );
        }
        if self.response_edges.windows(2).any(|w| w[0] >= w[1]) {
            anyhow::bail!("response_edges must be strictly increasing");
        }
        if self.total_labels.len() != self.total_quantiles {
            anyhow::bail!("total_labels must have total_quantiles ({}) entries", self.total_quantiles);
        }
        if self.similarity_normaliser <= 0.0 {
            anyhow::bail!("similarity_normaliser must be positive");
        }
        if self.embed_dims == 0 {
            anyhow::bail!("embed_dims must be at least 1");
        }
        self.align_params().doubled()?;
        Ok(())
    }

    pub fn align_params(&self) -> crate::align::AlignParams {
        crate::align::AlignParams {
            gap_open: self.gap_open,
            gap_extend: self.gap_extend,
            normaliser: self.similarity_normaliser,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = AnalysisConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.mhc_i_clusters, 8);
        assert_eq!(cfg.mhc_ii_clusters, 7);
    }

    #[test]
    fn partial_toml_overrides_defaults() {
        let cfg: AnalysisConfig = toml::from_str("embed_dims = 3\ngmm_seed = 7\n").unwrap();
        assert_eq!(cfg.embed_dims, 3);
        assert_eq!(cfg.gmm_seed, 7);
        assert_eq!(cfg.gap_open, -10.0);
    }

    #[test]
    fn mismatched_bins_rejected() {
        let cfg = AnalysisConfig {
            response_labels: vec!["a".into()],
            ..AnalysisConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_file_message() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        let err = require_file(&layout.types_table()).unwrap_err();
        assert_eq!(err.to_string(), "please ensure 'types.csv' is in the spreadsheets folder");
    }
}
