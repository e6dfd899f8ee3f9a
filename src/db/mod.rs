//! HLA 等位基因序列库：从 IMGT 下载文件构建，JSON 持久化。

pub mod nomenclature;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::{require_file, Layout};
use crate::io::fasta::FastaReader;
use crate::typing::Locus;
use nomenclature::{read_groups, GroupCode, GroupMap};

/// 等位基因名（或 G/P 组名）-> 氨基酸序列
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlleleDb {
    seqs: BTreeMap<String, String>,
}

impl AlleleDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// 属于 G/P 组的等位基因以组名登记（每个所属组各一份），否则以自身名字登记。
    pub fn insert(&mut self, allele: String, seq: String, groups: &GroupMap) {
        match groups.get(&allele) {
            Some(gs) => {
                for g in gs {
                    self.seqs.insert(g.clone(), seq.clone());
                }
            }
            None => {
                self.seqs.insert(allele, seq);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.seqs.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.seqs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.seqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seqs.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.seqs.keys().map(String::as_str)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(path, &self.seqs)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self { seqs: load_json(path)? })
    }
}

impl FromIterator<(String, String)> for AlleleDb {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self { seqs: iter.into_iter().collect() }
    }
}

pub fn save_groups(path: &Path, groups: &GroupMap) -> Result<()> {
    save_json(path, groups)
}

pub fn load_groups(path: &Path) -> Result<GroupMap> {
    load_json(path)
}

pub(crate) fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let f = std::fs::File::create(path)
        .with_context(|| format!("cannot write '{}'", path.display()))?;
    let mut w = std::io::BufWriter::new(f);
    serde_json::to_writer(&mut w, value)?;
    std::io::Write::flush(&mut w)?;
    Ok(())
}

pub(crate) fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    require_file(path)?;
    let f = std::fs::File::open(path)
        .with_context(|| format!("cannot open '{}'", path.display()))?;
    serde_json::from_reader(std::io::BufReader::new(f))
        .with_context(|| format!("'{}' is not a valid JSON dictionary", path.display()))
}

/// 解析单个位点的序列文件，返回 (带位点前缀的名字, 序列)。
///
/// 支持两种格式：每行 `名字 序列` 的纯文本表，或以 `>` 开头的 FASTA
/// （IMGT `*_prot.fasta`，只保留该位点的记录）。
pub fn parse_sequence_file<R: BufRead>(locus: Locus, mut reader: R) -> Result<Vec<(String, String)>> {
    let is_fasta = {
        let buf = reader.fill_buf()?;
        buf.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'>')
    };

    let mut out = Vec::new();
    if is_fasta {
        let prefix = format!("{}*", locus.name());
        for rec in FastaReader::new(reader) {
            let rec = rec?;
            let name = rec.allele_name();
            if !name.starts_with(&prefix) || rec.seq.is_empty() {
                continue;
            }
            out.push((name.to_string(), String::from_utf8_lossy(&rec.seq).into_owned()));
        }
        return Ok(out);
    }

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let mut fields = line.split_whitespace();
        let (Some(name), Some(seq)) = (fields.next(), fields.next()) else {
            if !line.trim().is_empty() {
                debug!(locus = %locus, line = i + 1, "skipping line without a sequence");
            }
            continue;
        };
        out.push((locus.qualify(name), seq.to_ascii_uppercase()));
    }
    Ok(out)
}

fn open_input(path: &Path) -> Result<std::io::BufReader<std::fs::File>> {
    require_file(path)?;
    let f = std::fs::File::open(path)
        .with_context(|| format!("cannot open '{}'", path.display()))?;
    Ok(std::io::BufReader::new(f))
}

/// 汇总结果，供命令行打印
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieveSummary {
    pub groups: usize,
    pub grouped_alleles: usize,
    pub sequences_read: usize,
    pub entries: usize,
}

/// 由 `databases/` 下的 IMGT 文件构建 `HLA_groups.json` 与 `HLA_alleles.json`。
pub fn retrieve(layout: &Layout) -> Result<RetrieveSummary> {
    let dir = layout.databases();

    let mut groups = GroupMap::new();
    let mut n_groups = 0usize;
    for code in [GroupCode::G, GroupCode::P] {
        let path = dir.join(code.file_name());
        let n = read_groups(open_input(&path)?, code, &mut groups)
            .with_context(|| format!("cannot read groups from '{}'", path.display()))?;
        info!(file = code.file_name(), groups = n, "read allele groups");
        n_groups += n;
    }
    save_groups(&layout.group_db(), &groups)?;

    let mut db = AlleleDb::new();
    let mut n_seqs = 0usize;
    for locus in Locus::ALL {
        let path = dir.join(locus.sequence_file());
        let records = parse_sequence_file(locus, open_input(&path)?)
            .with_context(|| format!("cannot read sequences from '{}'", path.display()))?;
        if records.is_empty() {
            warn!(locus = %locus, "no sequences found");
        }
        info!(locus = %locus, sequences = records.len(), "read allele sequences");
        n_seqs += records.len();
        for (name, seq) in records {
            db.insert(name, seq, &groups);
        }
    }
    db.save(&layout.allele_db())?;

    Ok(RetrieveSummary {
        groups: n_groups,
        grouped_alleles: groups.len(),
        sequences_read: n_seqs,
        entries: db.len(),
    })
}
