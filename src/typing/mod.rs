//! 供体 HLA 分型表：位点定义、等位基因拆分、数据库一致性检查。

pub mod check;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use crate::io::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MhcClass {
    I,
    II,
}

impl MhcClass {
    pub const ALL: [MhcClass; 2] = [MhcClass::I, MhcClass::II];

    pub fn loci(self) -> &'static [Locus] {
        match self {
            MhcClass::I => &[Locus::A, Locus::B, Locus::C],
            MhcClass::II => &[Locus::Drb1, Locus::Dqb1],
        }
    }

    /// 文件名里使用的标签：`MHCI` / `MHCII`
    pub fn file_tag(self) -> &'static str {
        match self {
            MhcClass::I => "MHCI",
            MhcClass::II => "MHCII",
        }
    }
}

impl fmt::Display for MhcClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MhcClass::I => write!(f, "MHC I"),
            MhcClass::II => write!(f, "MHC II"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Locus {
    A,
    B,
    C,
    Drb1,
    Dqb1,
}

impl Locus {
    pub const ALL: [Locus; 5] = [Locus::A, Locus::B, Locus::C, Locus::Drb1, Locus::Dqb1];

    pub fn name(self) -> &'static str {
        match self {
            Locus::A => "A",
            Locus::B => "B",
            Locus::C => "C",
            Locus::Drb1 => "DRB1",
            Locus::Dqb1 => "DQB1",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|l| l.name() == name)
    }

    pub fn class(self) -> MhcClass {
        match self {
            Locus::A | Locus::B | Locus::C => MhcClass::I,
            Locus::Drb1 | Locus::Dqb1 => MhcClass::II,
        }
    }

    /// 参考序列文件名，如 `HLA-A.txt`
    pub fn sequence_file(self) -> String {
        format!("HLA-{}.txt", self.name())
    }

    /// 把表格里的裸名字（`02:01`、`*02:01` 或 `A*02:01`）补全为 `A*02:01`。
    pub fn qualify(self, raw: &str) -> String {
        let raw = raw.trim();
        let prefix = format!("{}*", self.name());
        if raw.starts_with(&prefix) {
            return raw.to_string();
        }
        format!("{}{}", prefix, raw.trim_start_matches('*'))
    }
}

impl fmt::Display for Locus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 一个单元格里最多两个等位基因，以 `", "` 分隔（只切第一次）。
pub fn split_alleles(locus: Locus, cell: Option<&str>) -> [Option<String>; 2] {
    let Some(cell) = cell.map(str::trim).filter(|c| !c.is_empty()) else {
        return [None, None];
    };
    match cell.split_once(", ") {
        Some((a, b)) => {
            let b = b.trim();
            let second = if b.is_empty() { None } else { Some(locus.qualify(b)) };
            [Some(locus.qualify(a)), second]
        }
        None => [Some(locus.qualify(cell)), None],
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DonorTyping {
    pub donor: String,
    /// 表格中的行号（含表头，从 1 开始计），用于报错定位
    pub row: usize,
    pub alleles: Vec<(Locus, [Option<String>; 2])>,
}

impl DonorTyping {
    pub fn pair(&self, locus: Locus) -> Option<&[Option<String>; 2]> {
        self.alleles.iter().find(|(l, _)| *l == locus).map(|(_, p)| p)
    }
}

/// 从 `types.csv` 读取的全部供体分型。只识别 A/B/C/DRB1/DQB1 列。
#[derive(Debug, Clone, Default)]
pub struct DonorTypes {
    pub loci: Vec<Locus>,
    pub donors: Vec<DonorTyping>,
}

impl DonorTypes {
    pub fn from_table(table: &Table) -> Result<Self> {
        let donor_col = table.require_column("donor")?;
        let cols: Vec<(Locus, usize)> = table
            .headers
            .iter()
            .enumerate()
            .filter_map(|(i, h)| Locus::from_name(h).map(|l| (l, i)))
            .collect();
        if cols.is_empty() {
            anyhow::bail!("types table has none of the HLA columns A, B, C, DRB1, DQB1");
        }

        let mut donors = Vec::with_capacity(table.len());
        for r in 0..table.len() {
            let donor = match table.get(r, donor_col) {
                Some(d) => d.to_string(),
                None => anyhow::bail!("row {} has no donor id", r + 2),
            };
            let alleles = cols
                .iter()
                .map(|&(locus, c)| (locus, split_alleles(locus, table.get(r, c))))
                .collect();
            donors.push(DonorTyping { donor, row: r + 2, alleles });
        }

        Ok(Self {
            loci: cols.into_iter().map(|(l, _)| l).collect(),
            donors,
        })
    }

    pub fn from_path(path: &Path, missing_marker: &str) -> Result<Self> {
        Self::from_table(&Table::from_path(path, missing_marker)?)
    }

    /// 某一类 MHC 中出现过的全部等位基因，去重并排序。
    pub fn unique_alleles(&self, class: MhcClass) -> Vec<String> {
        let mut set = BTreeSet::new();
        for d in &self.donors {
            for (locus, pair) in &d.alleles {
                if locus.class() != class {
                    continue;
                }
                for a in pair.iter().flatten() {
                    set.insert(a.clone());
                }
            }
        }
        set.into_iter().collect()
    }

    pub fn find(&self, donor: &str) -> Option<&DonorTyping> {
        self.donors.iter().find(|d| d.donor == donor)
    }
}
