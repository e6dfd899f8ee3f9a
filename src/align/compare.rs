use anyhow::Result;
use std::fmt::Write as _;
use std::path::Path;

use super::blosum::BLOSUM100;
use super::pairwise::{PairAligner, PairAlignment};
use super::AlignParams;

/// 比对列中含空位时的得分
pub const GAP_COLUMN_SCORE: i32 = -10;

/// 两个等位基因的完整比较结果：逐列得分、错配位置与相似度。
#[derive(Debug, Clone)]
pub struct Comparison {
    pub names: [String; 2],
    pub alignment: PairAlignment,
    pub column_scores: Vec<i32>,
    pub matches: usize,
    pub mismatches: Vec<usize>,
    pub similarity: f64,
}

impl Comparison {
    pub fn new(name1: &str, seq1: &[u8], name2: &str, seq2: &[u8], params: AlignParams) -> Result<Self> {
        let alignment = PairAligner::new(params)?.align(seq1, seq2);
        Ok(Self::from_alignment([name1.to_string(), name2.to_string()], alignment, params.normaliser))
    }

    pub fn from_alignment(names: [String; 2], alignment: PairAlignment, normaliser: f64) -> Self {
        let column_scores: Vec<i32> = alignment
            .columns
            .iter()
            .map(|c| match c {
                (Some(x), Some(y)) => BLOSUM100.score(*x, *y),
                _ => GAP_COLUMN_SCORE,
            })
            .collect();
        let mismatches: Vec<usize> = column_scores
            .iter()
            .enumerate()
            .filter(|(_, &s)| s <= 0)
            .map(|(i, _)| i)
            .collect();
        let matches = column_scores.len() - mismatches.len();
        let similarity = alignment.similarity(normaliser);
        Self { names, alignment, column_scores, matches, mismatches, similarity }
    }

    pub fn title(&self) -> String {
        format!("{} vs {}", self.names[0], self.names[1])
    }

    pub fn similarity_line(&self) -> String {
        format!(
            "HLA sequence similarity between {} and {} is {:.2}%",
            self.names[0],
            self.names[1],
            self.similarity * 100.0
        )
    }

    pub fn mismatch_report(&self) -> String {
        let mut out = self.title();
        out.push_str("\nMismatches occurred at positions...");
        for &pos in &self.mismatches {
            let (x, y) = self.alignment.columns[pos];
            let _ = write!(out, "\n{}: {} against {}", pos, residue(x), residue(y));
        }
        out
    }

    /// 热图每列的标签：上下两个残基
    pub fn column_labels(&self) -> Vec<String> {
        self.alignment
            .columns
            .iter()
            .map(|&(x, y)| format!("{}\n{}", residue(x), residue(y)))
            .collect()
    }

    pub fn write_heatmap(&self, path: &Path) -> Result<()> {
        crate::plot::alignment_heatmap(path, &self.title(), &self.column_scores, &self.column_labels())
    }

    /// 写出 `<dir>/<name>.txt` 与 `<dir>/<name>.svg`
    pub fn save(&self, dir: &Path, name: &str) -> Result<()> {
        crate::config::Layout::ensure_dir(dir)?;
        let txt = dir.join(format!("{}.txt", name));
        let mut body = self.mismatch_report();
        let _ = write!(body, "\ncigar: {}\n{}\n", self.alignment.cigar(), self.similarity_line());
        std::fs::write(&txt, body)?;
        self.write_heatmap(&dir.join(format!("{}.svg", name)))?;
        Ok(())
    }
}

fn residue(r: Option<u8>) -> char {
    r.map_or('-', char::from)
}

/// 去掉文件名中的非法字符 `\/*?:"<>|`
pub fn sanitize_name(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| !matches!(c, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmp(a: &[u8], b: &[u8]) -> Comparison {
        Comparison::new("A*01:01", a, "A*02:01", b, AlignParams::default()).unwrap()
    }

    #[test]
    fn identical_has_no_mismatches() {
        let c = cmp(b"MAVMAPRT", b"MAVMAPRT");
        assert!(c.mismatches.is_empty());
        assert_eq!(c.matches, 8);
        assert!(c.similarity > 0.0 && c.similarity <= 1.0);
    }

    #[test]
    fn mismatch_positions_use_alignment_columns() {
        // V/D = -8 is a mismatch; A/S = 1 counts as a match
        let c = cmp(b"MAVMAPRT", b"MSDMAPRT");
        assert_eq!(c.mismatches, vec![2]);
        let report = c.mismatch_report();
        assert!(report.starts_with("A*01:01 vs A*02:01\nMismatches occurred at positions..."));
        assert!(report.ends_with("2: V against D"));
    }

    #[test]
    fn gap_columns_are_mismatches() {
        let c = cmp(b"WWWWCC", b"WWWW");
        assert_eq!(c.column_scores.iter().filter(|&&s| s == GAP_COLUMN_SCORE).count(), 2);
        assert_eq!(c.mismatches.len(), 2);
        assert_eq!(c.column_labels().len(), 6);
    }

    #[test]
    fn sanitize_strips_illegal_chars() {
        assert_eq!(sanitize_name(" a*b/c:d? "), "abcd");
        assert_eq!(sanitize_name("\\/*?:\"<>|"), "");
    }

    #[test]
    fn save_writes_report_and_heatmap() {
        let dir = tempfile::tempdir().unwrap();
        let c = cmp(b"MAVMAPRT", b"MSDMAPRT");
        c.save(dir.path(), "cmp0").unwrap();
        let txt = std::fs::read_to_string(dir.path().join("cmp0.txt")).unwrap();
        assert!(txt.contains("HLA sequence similarity between A*01:01 and A*02:01 is"));
        assert!(dir.path().join("cmp0.svg").is_file());
    }
}
