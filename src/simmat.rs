//! 等位基因两两相似度矩阵：rayon 并行填充、bincode 缓存、CSV 导出。

use anyhow::{Context, Result};
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::align::{AlignParams, PairAligner};
use crate::config::{AnalysisConfig, Layout};
use crate::db::AlleleDb;
use crate::io::table::{format_number, Sheet};
use crate::typing::{DonorTypes, MhcClass};

/// 带行 / 列标签的对称相似度矩阵
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimMatrix {
    pub labels: Vec<String>,
    pub values: Array2<f64>,
}

impl SimMatrix {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn to_sheet(&self) -> Sheet {
        let mut sheet = Sheet::new("", self.labels.clone());
        for (label, row) in self.labels.iter().zip(self.values.rows()) {
            sheet.push(label.clone(), row.iter().map(|&v| format_number(v)).collect());
        }
        sheet
    }
}

/// 计算 `labels` 中全部等位基因两两之间的相似度。
///
/// 全局比对得分对称，只计算上三角（含对角线）再镜像。缺少序列的等位基因
/// 会一次性全部报出。
pub fn fill(labels: &[String], db: &AlleleDb, params: AlignParams) -> Result<SimMatrix> {
    let missing: Vec<&str> = labels
        .iter()
        .map(String::as_str)
        .filter(|l| !db.contains(l))
        .collect();
    if !missing.is_empty() {
        anyhow::bail!(
            "{} allele(s) have no sequence in the HLA database (run typecheck): {}",
            missing.len(),
            missing.join(", ")
        );
    }
    // validate penalties once before spawning workers
    let (open, extend) = params.doubled()?;

    let seqs: Vec<&[u8]> = labels
        .iter()
        .filter_map(|l| db.get(l))
        .map(str::as_bytes)
        .collect();
    let n = seqs.len();
    let pairs: Vec<(usize, usize)> = (0..n).flat_map(|i| (i..n).map(move |j| (i, j))).collect();

    let results: Vec<(usize, usize, f64)> = pairs
        .par_iter()
        .map_init(
            || PairAligner::from_doubled(open, extend),
            |aligner, &(i, j)| (i, j, aligner.align(seqs[i], seqs[j]).similarity(params.normaliser)),
        )
        .collect();

    let mut values = Array2::<f64>::zeros((n, n));
    for (i, j, sim) in results {
        values[[i, j]] = sim;
        values[[j, i]] = sim;
    }
    Ok(SimMatrix { labels: labels.to_vec(), values })
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MatrixMeta {
    pub types_file: Option<String>,
    pub build_args: Option<String>,
    pub build_timestamp: Option<String>,
    pub gap_open: f64,
    pub gap_extend: f64,
    pub normaliser: f64,
}

/// MHC I 与 MHC II 两个矩阵，连同构建信息一起以 bincode 缓存。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimMatrixSet {
    pub mhc_i: SimMatrix,
    pub mhc_ii: SimMatrix,
    pub meta: MatrixMeta,
}

impl SimMatrixSet {
    pub fn get(&self, class: MhcClass) -> &SimMatrix {
        match class {
            MhcClass::I => &self.mhc_i,
            MhcClass::II => &self.mhc_ii,
        }
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let f = std::fs::File::create(path)
            .with_context(|| format!("cannot write '{}'", path.display()))?;
        let mut w = std::io::BufWriter::new(f);
        bincode::serialize_into(&mut w, self)?;
        std::io::Write::flush(&mut w)?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        crate::config::require_file(path)?;
        let f = std::fs::File::open(path)?;
        let set: Self = bincode::deserialize_from(std::io::BufReader::new(f))
            .with_context(|| format!("'{}' is not a similarity matrix cache", path.display()))?;
        Ok(set)
    }
}

fn csv_name(class: MhcClass) -> &'static str {
    match class {
        MhcClass::I => "MHC_I.csv",
        MhcClass::II => "MHC_II.csv",
    }
}

/// 读取分型表与序列库，计算两类矩阵，写出缓存、CSV 与热图。
pub fn run(layout: &Layout, cfg: &AnalysisConfig) -> Result<SimMatrixSet> {
    let db = AlleleDb::load(&layout.allele_db())?;
    let types = DonorTypes::from_path(&layout.types_table(), &cfg.missing_marker)?;
    let params = cfg.align_params();

    let mut mats = Vec::with_capacity(2);
    for class in MhcClass::ALL {
        let labels = types.unique_alleles(class);
        info!(class = %class, alleles = labels.len(), pairs = labels.len() * (labels.len() + 1) / 2, "computing similarity matrix");
        let m = fill(&labels, &db, params).with_context(|| format!("{} similarity matrix", class))?;
        info!(class = %class, "similarity matrix done");
        mats.push(m);
    }
    let mhc_ii = mats.pop().context("missing MHC II matrix")?;
    let mhc_i = mats.pop().context("missing MHC I matrix")?;

    let set = SimMatrixSet {
        mhc_i,
        mhc_ii,
        meta: MatrixMeta {
            types_file: Some(layout.types_table().display().to_string()),
            build_args: Some(std::env::args().collect::<Vec<_>>().join(" ")),
            build_timestamp: Some(chrono::Utc::now().to_rfc3339()),
            gap_open: params.gap_open,
            gap_extend: params.gap_extend,
            normaliser: params.normaliser,
        },
    };

    let dir = layout.sim_matrix_dir();
    Layout::ensure_dir(&dir)?;
    set.save_to_file(&layout.sim_matrix_cache())?;

    let plots = layout.cluster_data();
    Layout::ensure_dir(&plots)?;
    for class in MhcClass::ALL {
        let m = set.get(class);
        m.to_sheet().write_to_path(&dir.join(csv_name(class)))?;
        if !m.is_empty() {
            let svg = plots.join(format!("{}_heatmap.svg", class.file_tag().to_lowercase()));
            crate::plot::matrix_heatmap(&svg, &format!("{} allele similarity", class), &m.labels, &m.values)?;
        }
    }
    info!(cache = %layout.sim_matrix_cache().display(), "similarity matrices saved");
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> AlleleDb {
        vec![
            ("A*01:01".to_string(), "MAVMAPRTLLLLLSGALALTQTWAGSHSMRYF".to_string()),
            ("A*02:01".to_string(), "MAVMAPRTLVLLLSGALALTQTWAGSHSMRYF".to_string()),
            ("B*07:02".to_string(), "MLVMAPRTVLLLLSAALALTETWAGSHSMRYF".to_string()),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn matrix_is_symmetric_with_best_diagonal() {
        let labels: Vec<String> = ["A*01:01", "A*02:01", "B*07:02"].iter().map(|s| s.to_string()).collect();
        let m = fill(&labels, &db(), AlignParams::default()).unwrap();
        assert_eq!(m.values.dim(), (3, 3));
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(m.values[[i, j]], m.values[[j, i]]);
                assert!(m.values[[i, i]] >= m.values[[i, j]]);
            }
        }
        // one substitution apart is closer than four
        assert!(m.values[[0, 1]] > m.values[[0, 2]]);
    }

    #[test]
    fn missing_alleles_listed() {
        let labels = vec!["A*01:01".to_string(), "C*99:99".to_string(), "B*99:99".to_string()];
        let err = fill(&labels, &db(), AlignParams::default()).unwrap_err().to_string();
        assert!(err.starts_with("2 allele(s)"));
        assert!(err.contains("C*99:99, B*99:99"));
    }

    #[test]
    fn invalid_penalties_rejected_before_filling() {
        let labels = vec!["A*01:01".to_string(), "A*02:01".to_string()];
        let params = AlignParams { gap_open: -10.3, ..AlignParams::default() };
        let err = fill(&labels, &db(), params).unwrap_err();
        assert!(err.to_string().contains("multiples of 0.5"));
        let params = AlignParams { gap_open: 2.0, gap_extend: 0.0, ..AlignParams::default() };
        assert!(fill(&labels, &db(), params).is_err());
    }

    #[test]
    fn empty_label_list() {
        let m = fill(&[], &db(), AlignParams::default()).unwrap();
        assert!(m.is_empty());
        assert_eq!(m.values.dim(), (0, 0));
    }

    #[test]
    fn cache_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim_matrix.bin");
        let labels = vec!["A*01:01".to_string(), "A*02:01".to_string()];
        let m = fill(&labels, &db(), AlignParams::default()).unwrap();
        let set = SimMatrixSet { mhc_i: m.clone(), mhc_ii: m, meta: MatrixMeta::default() };
        set.save_to_file(&path).unwrap();
        assert_eq!(SimMatrixSet::load_from_file(&path).unwrap(), set);
    }

    #[test]
    fn sheet_has_labels_on_both_axes() {
        let m = SimMatrix {
            labels: vec!["a".into(), "b".into()],
            values: ndarray::arr2(&[[1.0, 0.25], [0.25, 1.0]]),
        };
        let mut out = Vec::new();
        m.to_sheet().write(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), ",a,b\na,1,0.25\nb,0.25,1\n");
    }
}
