use anyhow::Result;
use std::fmt;
use std::io::Write;
use tracing::info;

use super::{DonorTypes, Locus};
use crate::config::{AnalysisConfig, Layout};
use crate::db::nomenclature::GroupMap;
use crate::db::{load_groups, AlleleDb};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueKind {
    /// 名字是某个 G/P 组的成员，应改用组名
    Grouped { replacements: Vec<String> },
    NotFound,
}

/// 分型表中一个无法在序列库中找到的等位基因。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeIssue {
    pub donor: String,
    pub row: usize,
    pub locus: Locus,
    /// 1 或 2
    pub position: usize,
    pub allele: String,
    pub kind: IssueKind,
}

impl fmt::Display for TypeIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            IssueKind::Grouped { replacements } => write!(
                f,
                "For donor {}, in row {}, for the allele in position {}, {} is a grouped allele\n\
                 Choice of replacement is/are {}",
                self.donor,
                self.row,
                self.position,
                self.allele,
                replacements.join(", ")
            ),
            IssueKind::NotFound => write!(
                f,
                "For donor {}, in row {}, for the allele in position {}, {} cannot be found in database of HLA alleles",
                self.donor, self.row, self.position, self.allele
            ),
        }
    }
}

pub fn typecheck(types: &DonorTypes, db: &AlleleDb, groups: &GroupMap) -> Vec<TypeIssue> {
    let mut issues = Vec::new();
    // locus, then allele position, then row
    for &locus in &types.loci {
        for i in 0..2 {
            for donor in &types.donors {
                let Some(allele) = donor.pair(locus).and_then(|p| p[i].as_ref()) else { continue };
                if db.contains(allele) {
                    continue;
                }
                let kind = match groups.get(allele) {
                    Some(gs) => IssueKind::Grouped { replacements: gs.clone() },
                    None => IssueKind::NotFound,
                };
                issues.push(TypeIssue {
                    donor: donor.donor.clone(),
                    row: donor.row,
                    locus,
                    position: i + 1,
                    allele: allele.clone(),
                    kind,
                });
            }
        }
    }
    issues
}

/// 检查 `types.csv`，报告写入 `output/typecheck.txt` 并返回问题列表。
pub fn run(layout: &Layout, cfg: &AnalysisConfig) -> Result<Vec<TypeIssue>> {
    let types = DonorTypes::from_path(&layout.types_table(), &cfg.missing_marker)?;
    let groups = load_groups(&layout.group_db())?;
    let db = AlleleDb::load(&layout.allele_db())?;

    let issues = typecheck(&types, &db, &groups);
    info!(donors = types.donors.len(), issues = issues.len(), "typecheck finished");

    Layout::ensure_dir(&layout.output())?;
    let path = layout.output().join("typecheck.txt");
    let mut w = std::io::BufWriter::new(std::fs::File::create(&path)?);
    for issue in &issues {
        writeln!(w, "{}\n", issue)?;
    }
    w.flush()?;
    Ok(issues)
}
