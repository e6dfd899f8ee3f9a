use anyhow::Result;
use ndarray::{Array2, Axis};
use std::collections::BTreeSet;
use std::fmt;

use crate::io::table::Sheet;

/// 列联表的行标签：聚类编号，接种过疫苗的供体带 `V` 前缀。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterLabel {
    pub vaccinated: bool,
    pub cluster: usize,
}

impl fmt::Display for ClusterLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.vaccinated {
            write!(f, "V{}", self.cluster)
        } else {
            write!(f, "{}", self.cluster)
        }
    }
}

/// 聚类 x 反应等级的频数表
#[derive(Debug, Clone, PartialEq)]
pub struct Contingency {
    pub rows: Vec<ClusterLabel>,
    pub cols: Vec<String>,
    pub counts: Array2<f64>,
}

impl Contingency {
    /// 交叉计数。行按（未接种在前，聚类编号）排序；列按 `col_order` 排列，
    /// 只保留出现过的等级，不在 `col_order` 中的等级按字母序排在最后。
    pub fn from_pairs<'a>(
        pairs: impl IntoIterator<Item = (ClusterLabel, &'a str)>,
        col_order: &[String],
    ) -> Self {
        let pairs: Vec<(ClusterLabel, &str)> = pairs.into_iter().collect();
        let rows: Vec<ClusterLabel> = pairs.iter().map(|p| p.0).collect::<BTreeSet<_>>().into_iter().collect();
        let seen: BTreeSet<&str> = pairs.iter().map(|p| p.1).collect();
        let mut cols: Vec<String> = col_order.iter().filter(|c| seen.contains(c.as_str())).cloned().collect();
        cols.extend(
            seen.iter()
                .filter(|s| !col_order.iter().any(|c| c == *s))
                .map(|s| s.to_string()),
        );

        let mut counts = Array2::<f64>::zeros((rows.len(), cols.len()));
        for (label, class) in &pairs {
            let r = rows.binary_search(label).unwrap_or_default();
            if let Some(c) = cols.iter().position(|c| c == class) {
                counts[[r, c]] += 1.0;
            }
        }
        Self { rows, cols, counts }
    }

    pub fn total(&self) -> f64 {
        self.counts.sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.cols.is_empty()
    }

    pub fn row_names(&self) -> Vec<String> {
        self.rows.iter().map(ToString::to_string).collect()
    }

    /// 带 `Total` 行 / 列边际和的表
    pub fn to_sheet(&self, corner: &str) -> Sheet {
        let mut columns = self.cols.clone();
        columns.push("Total".to_string());
        let mut sheet = Sheet::new(corner, columns);
        for (label, row) in self.rows.iter().zip(self.counts.rows()) {
            sheet.push_numbers(label.to_string(), row.iter().copied().chain(std::iter::once(row.sum())));
        }
        let col_totals = self.counts.sum_axis(Axis(0));
        sheet.push_numbers("Total", col_totals.iter().copied().chain(std::iter::once(self.total())));
        sheet
    }

    /// 同形状的数值矩阵（如残差）导出为表
    pub fn values_sheet(&self, corner: &str, values: &Array2<f64>) -> Result<Sheet> {
        if values.dim() != self.counts.dim() {
            anyhow::bail!("table shape {:?} does not match {:?}", values.dim(), self.counts.dim());
        }
        let mut sheet = Sheet::new(corner, self.cols.clone());
        for (label, row) in self.rows.iter().zip(values.rows()) {
            sheet.push_numbers(label.to_string(), row.iter().copied());
        }
        Ok(sheet)
    }
}
