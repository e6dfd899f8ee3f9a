//! 供体抗原反应分级与等位基因聚类的对应分析。

pub mod analysis;
pub mod binning;
pub mod contingency;
pub mod stats;

use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::cluster::{load_clusters, ClusterMap};
use crate::config::{AnalysisConfig, Layout};
use crate::io::table::Table;
use crate::typing::{DonorTypes, DonorTyping, MhcClass};

pub use analysis::CorrespondenceAnalysis;
pub use contingency::{ClusterLabel, Contingency};

const VACCINATED: &str = "CMVVASC";
const OLDER: &str = "older";

/// 一个反应列（抗原或合计）在全部供体上的值
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseColumn {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl ResponseColumn {
    /// CD4 反应对应 MHC II，CD8 反应对应 MHC I
    pub fn class(&self) -> Option<MhcClass> {
        if self.name.contains("cd4") {
            Some(MhcClass::II)
        } else if self.name.contains("cd8") {
            Some(MhcClass::I)
        } else {
            None
        }
    }

    /// 结果子目录名：去掉 `cd4_` / `cd8_` 前缀
    pub fn short_name(&self) -> &str {
        self.name.get(4..).filter(|s| !s.is_empty()).unwrap_or(&self.name)
    }
}

/// 反应表与分型表按供体内连接后的队列。
#[derive(Debug, Clone)]
pub struct Cohort {
    pub typings: Vec<DonorTyping>,
    /// 各 cd4 抗原列，最后一个是 `cd4_total`
    pub cd4: Vec<ResponseColumn>,
    /// 各 cd8 抗原列，最后一个是 `cd8_total`
    pub cd8: Vec<ResponseColumn>,
    /// `Yes` / `No`
    pub vaccinated: Option<Vec<Option<String>>>,
    pub older: Option<Vec<Option<String>>>,
}

impl Cohort {
    pub fn len(&self) -> usize {
        self.typings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.typings.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &ResponseColumn> {
        self.cd4.iter().chain(&self.cd8)
    }

    pub fn is_vaccinated(&self, donor: usize) -> bool {
        self.vaccinated
            .as_ref()
            .and_then(|v| v.get(donor))
            .is_some_and(|v| v.as_deref() == Some("Yes"))
    }
}

fn is_total(name: &str) -> bool {
    name.ends_with("_total")
}

/// 哨兵值处理：`not_measured` 视为缺失，`zero_sentinels` 视为 0。
fn clean(v: Option<f64>, cfg: &AnalysisConfig) -> Option<f64> {
    let x = v?;
    if cfg.not_measured.contains(&x) {
        None
    } else if cfg.zero_sentinels.contains(&x) {
        Some(0.0)
    } else {
        Some(x)
    }
}

/// 0/1 标记列映射为 `No` / `Yes`；已是文字的值原样保留。
fn yes_no(cell: Option<&str>, cfg: &AnalysisConfig) -> Option<String> {
    let cell = cell?;
    match cell.parse::<f64>() {
        Ok(x) => match clean(Some(x), cfg)? {
            v if v == 0.0 => Some("No".to_string()),
            v if v == 1.0 => Some("Yes".to_string()),
            _ => Some(cell.to_string()),
        },
        Err(_) => Some(cell.to_string()),
    }
}

fn total_column(name: &str, parts: &[ResponseColumn], n: usize) -> ResponseColumn {
    let values = (0..n)
        .map(|i| Some(parts.iter().filter_map(|c| c.values[i]).sum()))
        .collect();
    ResponseColumn { name: name.to_string(), values }
}

/// 按供体连接反应表与分型表，清洗哨兵值并加上合计列。
pub fn prepare(response: &Table, types: &Table, cfg: &AnalysisConfig) -> Result<Cohort> {
    let typed = DonorTypes::from_table(types).context("types table")?;
    let donor_col = response.require_column("donor").context("response table")?;

    let mut rows = Vec::new();
    let mut typings = Vec::new();
    let mut unmatched = 0usize;
    for r in 0..response.len() {
        match response.get(r, donor_col).and_then(|d| typed.find(d)) {
            Some(t) => {
                rows.push(r);
                typings.push(t.clone());
            }
            None => unmatched += 1,
        }
    }
    if unmatched > 0 {
        warn!(donors = unmatched, "response rows without a typed donor were dropped");
    }

    let mut cd4 = Vec::new();
    let mut cd8 = Vec::new();
    for (c, name) in response.headers.iter().enumerate() {
        let is_cd4 = name.contains("cd4");
        if !is_cd4 && !name.contains("cd8") {
            continue;
        }
        let values = rows
            .iter()
            .map(|&r| response.number(r, c).map(|v| clean(v, cfg)))
            .collect::<Result<Vec<_>>>()?;
        let col = ResponseColumn { name: name.clone(), values };
        if is_cd4 {
            cd4.push(col);
        } else {
            cd8.push(col);
        }
    }
    let n = rows.len();
    if !cd4.is_empty() {
        let total = total_column("cd4_total", &cd4, n);
        cd4.push(total);
    }
    if !cd8.is_empty() {
        let total = total_column("cd8_total", &cd8, n);
        cd8.push(total);
    }

    // flag columns may live in either spreadsheet
    let flag = |name: &str| -> Option<Vec<Option<String>>> {
        if let Some(c) = response.column(name) {
            return Some(rows.iter().map(|&r| yes_no(response.get(r, c), cfg)).collect());
        }
        let c = types.column(name)?;
        let donor_col = types.column("donor")?;
        Some(
            typings
                .iter()
                .map(|t| {
                    let r = (0..types.len()).find(|&r| types.get(r, donor_col) == Some(t.donor.as_str()))?;
                    yes_no(types.get(r, c), cfg)
                })
                .collect(),
        )
    };
    let vaccinated = flag(VACCINATED);
    if vaccinated.is_none() {
        warn!("no {} column, vaccinated donors are not separated", VACCINATED);
    }
    let older = flag(OLDER);

    Ok(Cohort { typings, cd4, cd8, vaccinated, older })
}

/// 每个反应列分级后的等级标签
pub type BinnedColumns = BTreeMap<String, Vec<Option<String>>>;

/// 合计列按分位数分 5 档；抗原列先把 0 换成 -1，再按固定边界分档。
pub fn bin_responses(cohort: &Cohort, cfg: &AnalysisConfig) -> Result<BinnedColumns> {
    let mut out = BTreeMap::new();
    for col in cohort.columns() {
        let labels = if is_total(&col.name) {
            binning::qcut(&col.values, cfg.total_quantiles, &cfg.total_labels)
                .with_context(|| format!("binning '{}'", col.name))?
        } else {
            let shifted: Vec<Option<f64>> = col
                .values
                .iter()
                .map(|v| v.map(|x| if x == 0.0 { -1.0 } else { x }))
                .collect();
            binning::cut(&shifted, &cfg.response_edges, &cfg.response_labels)?
        };
        out.insert(col.name.clone(), labels.into_iter().map(|l| l.map(str::to_string)).collect());
    }
    Ok(out)
}

/// 某一反应列的列联表；没有聚类编号的等位基因被丢弃并返回。
pub fn contingency_for(
    cohort: &Cohort,
    column: &str,
    classes: &[Option<String>],
    class: MhcClass,
    clusters: &ClusterMap,
    col_order: &[String],
) -> (Contingency, BTreeSet<String>) {
    let mut dropped = BTreeSet::new();
    let mut pairs = Vec::new();
    for (d, typing) in cohort.typings.iter().enumerate() {
        let Some(response) = classes.get(d).and_then(Option::as_deref) else {
            continue;
        };
        let vaccinated = cohort.is_vaccinated(d);
        for locus in class.loci() {
            let Some(pair) = typing.pair(*locus) else {
                continue;
            };
            for allele in pair.iter().flatten() {
                match clusters.get(allele) {
                    Some(&cluster) => pairs.push((ClusterLabel { vaccinated, cluster }, response)),
                    None => {
                        dropped.insert(allele.clone());
                    }
                }
            }
        }
    }
    if !dropped.is_empty() {
        debug!(column, dropped = dropped.len(), "alleles without a cluster skipped");
    }
    (Contingency::from_pairs(pairs, col_order), dropped)
}

fn write_stats(dir: &Path, cohort: &Cohort, binned: &BinnedColumns, cfg: &AnalysisConfig) -> Result<()> {
    Layout::ensure_dir(dir)?;

    let numeric: Vec<(String, Vec<Option<f64>>)> =
        cohort.columns().map(|c| (c.name.clone(), c.values.clone())).collect();
    stats::describe_sheet(&numeric).write_to_path(&dir.join("variation_statistics.csv"))?;

    let antigens: Vec<(String, BTreeMap<String, usize>)> = cohort
        .columns()
        .filter(|c| !is_total(&c.name))
        .filter_map(|c| {
            let labels = binned.get(&c.name)?;
            Some((c.name.clone(), stats::value_counts(labels.iter().map(Option::as_deref))))
        })
        .collect();
    stats::counts_sheet(&antigens, Some(&cfg.response_labels)).write_to_path(&dir.join("binned_responses.csv"))?;

    let flags: Vec<(String, BTreeMap<String, usize>)> = [(VACCINATED, &cohort.vaccinated), (OLDER, &cohort.older)]
        .into_iter()
        .filter_map(|(name, v)| {
            let v = v.as_ref()?;
            Some((name.to_string(), stats::value_counts(v.iter().map(Option::as_deref))))
        })
        .collect();
    if !flags.is_empty() {
        stats::counts_sheet(&flags, None).write_to_path(&dir.join("vaccinated_older.csv"))?;
    }

    let loci: BTreeSet<_> = cohort.typings.iter().flat_map(|t| t.alleles.iter().map(|(l, _)| *l)).collect();
    for locus in loci {
        let columns: Vec<(String, BTreeMap<String, usize>)> = (0..2)
            .map(|pos| {
                let counts = stats::value_counts(
                    cohort
                        .typings
                        .iter()
                        .map(|t| t.pair(locus).and_then(|p| p[pos].as_deref())),
                );
                (format!("{}.{}", locus.name(), pos + 1), counts)
            })
            .collect();
        stats::counts_sheet(&columns, None).write_to_path(&dir.join(format!("{}_counts.csv", locus.name())))?;
    }
    Ok(())
}

/// 单个反应列的分析结果摘要
#[derive(Debug, Clone)]
pub struct ColumnResult {
    pub column: String,
    pub table: Contingency,
    /// 表太小时为 `None`
    pub analysis: Option<CorrespondenceAnalysis>,
}

fn analyse_column(results: &Path, col: &ResponseColumn, table: Contingency) -> Result<ColumnResult> {
    let column = col.name.as_str();
    info!(column, rows = table.rows.len(), cols = table.cols.len(), "performing correspondence analysis");
    let dir = results.join(col.short_name());
    Layout::ensure_dir(&dir)?;
    table
        .to_sheet("type")
        .write_to_path(&dir.join(format!("{}_contingency.csv", column)))?;

    let analysis = match CorrespondenceAnalysis::fit(&table.counts) {
        Ok(ca) => ca,
        Err(e) => {
            warn!(column, error = %e, "correspondence analysis skipped");
            return Ok(ColumnResult { column: column.to_string(), table, analysis: None });
        }
    };

    table
        .values_sheet("type", &analysis.indexed_residuals)?
        .write_to_path(&dir.join(format!("{}_indexed_residuals.csv", column)))?;
    table
        .values_sheet("type", &analysis.standardized_residuals)?
        .write_to_path(&dir.join(format!("{}_z_scores.csv", column)))?;

    let graphs = results.join("graphs");
    Layout::ensure_dir(&graphs)?;
    let explained = analysis.explained_inertia();
    let axis = |d: usize| match explained.get(d) {
        Some(e) => format!("Component {} ({:.1}% inertia)", d, e * 100.0),
        None => format!("Component {}", d),
    };
    let rows: Vec<(String, (f64, f64))> = table
        .row_names()
        .into_iter()
        .zip(CorrespondenceAnalysis::plane(&analysis.row_coords))
        .collect();
    let cols: Vec<(String, (f64, f64))> = table
        .cols
        .iter()
        .cloned()
        .zip(CorrespondenceAnalysis::plane(&analysis.col_coords))
        .collect();
    crate::plot::biplot(
        &graphs.join(format!("{}.svg", column)),
        &format!("Clustered alleles vs {} binned responses", column),
        (&axis(0), &axis(1)),
        &rows,
        &cols,
    )?;
    info!(column, inertia = analysis.total_inertia(), "results saved");
    Ok(ColumnResult { column: column.to_string(), table, analysis: Some(analysis) })
}

/// 读取两张表与两类聚类字典，写出统计表、列联表、残差表和双标图。
pub fn run(layout: &Layout, cfg: &AnalysisConfig) -> Result<Vec<ColumnResult>> {
    let mut clusters = BTreeMap::new();
    for class in MhcClass::ALL {
        clusters.insert(class, load_clusters(&layout.clusters(class))?);
    }
    let response = Table::from_path(&layout.response_table(), &cfg.missing_marker)?;
    let types = Table::from_path(&layout.types_table(), &cfg.missing_marker)?;

    let cohort = prepare(&response, &types, cfg)?;
    if cohort.is_empty() {
        anyhow::bail!("no donor appears in both the response and the types spreadsheet");
    }
    info!(donors = cohort.len(), cd4 = cohort.cd4.len(), cd8 = cohort.cd8.len(), "cohort loaded");

    let binned = bin_responses(&cohort, cfg)?;
    write_stats(&layout.ca_stats(), &cohort, &binned, cfg)?;

    let results = layout.ca_results();
    Layout::ensure_dir(&results)?;
    let mut out = Vec::new();
    let mut dropped_all = BTreeSet::new();
    for col in cohort.columns() {
        let (Some(class), Some(classes)) = (col.class(), binned.get(&col.name)) else {
            continue;
        };
        let order = if is_total(&col.name) { &cfg.total_labels } else { &cfg.response_labels };
        let empty = ClusterMap::new();
        let map = clusters.get(&class).unwrap_or(&empty);
        let (table, dropped) = contingency_for(&cohort, &col.name, classes, class, map, order);
        dropped_all.extend(dropped);
        out.push(analyse_column(&results, col, table)?);
    }
    if !dropped_all.is_empty() {
        warn!(
            alleles = %dropped_all.iter().cloned().collect::<Vec<_>>().join(", "),
            "alleles have no cluster and were left out of every table"
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TYPES: &str = "donor,A,B,DRB1\n\
                         d1,\"01:01, 02:01\",07:02,\"15:01, 04:01\"\n\
                         d2,02:01,08:01,15:01\n\
                         d3,01:01,n.t.,04:01\n\
                         d4,03:01,07:02,15:01\n";
    const RESPONSE: &str = "donor,cd4_pp65,cd8_ie1,CMVVASC,older\n\
                            d1,0.02,0,1,0\n\
                            d2,-888,0.005,0,1\n\
                            d3,0.0005,-777,0,0\n\
                            d9,0.5,0.5,0,0\n\
                            d4,0.003,0.02,1,1\n";

    fn cohort() -> Cohort {
        let cfg = AnalysisConfig::default();
        let types = Table::read(Cursor::new(TYPES), &cfg.missing_marker).unwrap();
        let response = Table::read(Cursor::new(RESPONSE), &cfg.missing_marker).unwrap();
        prepare(&response, &types, &cfg).unwrap()
    }

    #[test]
    fn inner_join_and_sentinels() {
        let c = cohort();
        assert_eq!(c.len(), 4);
        assert_eq!(c.typings.iter().map(|t| t.donor.as_str()).collect::<Vec<_>>(), vec!["d1", "d2", "d3", "d4"]);
        assert_eq!(c.cd4[0].values, vec![Some(0.02), Some(0.0), Some(0.0005), Some(0.003)]);
        assert_eq!(c.cd8[0].values, vec![Some(0.0), Some(0.005), None, Some(0.02)]);
        assert_eq!(c.cd8[1].name, "cd8_total");
        // missing responses are skipped in the total
        assert_eq!(c.cd8[1].values[2], Some(0.0));
        assert!(c.is_vaccinated(0));
        assert!(!c.is_vaccinated(1));
        assert_eq!(c.older.as_ref().unwrap()[1].as_deref(), Some("Yes"));
    }

    #[test]
    fn column_classes_and_names() {
        let c = cohort();
        assert_eq!(c.cd4[0].class(), Some(MhcClass::II));
        assert_eq!(c.cd8[0].class(), Some(MhcClass::I));
        assert_eq!(c.cd4[0].short_name(), "pp65");
        assert_eq!(c.cd4[1].short_name(), "total");
    }

    #[test]
    fn antigen_zero_means_no_response() {
        let cfg = AnalysisConfig {
            total_quantiles: 2,
            total_labels: vec!["Low".into(), "High".into()],
            ..AnalysisConfig::default()
        };
        let c = cohort();
        let b = bin_responses(&c, &cfg).unwrap();
        assert_eq!(
            b["cd4_pp65"],
            vec![Some("Strong".into()), Some("No response".into()), Some("Weak".into()), Some("Moderate".into())]
        );
        assert_eq!(b["cd8_ie1"][2], None);
        assert_eq!(b["cd4_total"].iter().flatten().count(), 4);
    }

    #[test]
    fn contingency_uses_class_clusters_and_vaccination() {
        let c = cohort();
        let clusters: ClusterMap = [
            ("DRB1*15:01".to_string(), 0),
            ("DRB1*04:01".to_string(), 1),
        ]
        .into_iter()
        .collect();
        let classes = vec![Some("Strong".to_string()), Some("Weak".to_string()), None, Some("Weak".to_string())];
        let cfg = AnalysisConfig::default();
        let (t, dropped) = contingency_for(&c, "cd4_pp65", &classes, MhcClass::II, &clusters, &cfg.response_labels);
        assert!(dropped.is_empty());
        // d1 vaccinated: V0, V1 strong; d2: 0 weak; d4 vaccinated: V0 weak
        assert_eq!(t.row_names(), vec!["0", "V0", "V1"]);
        assert_eq!(t.cols, vec!["Weak".to_string(), "Strong".to_string()]);
        assert_eq!(t.counts, ndarray::arr2(&[[1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]));
    }

    #[test]
    fn unclustered_alleles_dropped() {
        let c = cohort();
        let clusters: ClusterMap = [("A*01:01".to_string(), 2)].into_iter().collect();
        let classes = vec![Some("Weak".to_string()); 4];
        let cfg = AnalysisConfig::default();
        let (t, dropped) = contingency_for(&c, "cd8_ie1", &classes, MhcClass::I, &clusters, &cfg.response_labels);
        assert_eq!(t.total(), 2.0);
        assert!(dropped.contains("A*02:01"));
        assert!(dropped.contains("B*07:02"));
    }
}
