use anyhow::Result;
use bio::alignment::pairwise::Aligner;
use bio::alignment::AlignmentOperation;
use std::fmt::Write as _;

use super::blosum::BLOSUM100;

/// 全局比对参数。`gap_open` 是长度为 1 的空位得分，之后每延长一格加 `gap_extend`。
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlignParams {
    pub gap_open: f64,
    pub gap_extend: f64,
    /// 相似度 = 得分 / (normaliser * 比对长度)
    pub normaliser: f64,
}

impl Default for AlignParams {
    fn default() -> Self {
        Self { gap_open: -10.0, gap_extend: -0.5, normaliser: 17.0 }
    }
}

impl AlignParams {
    /// rust-bio 只接受整数罚分，且长度 k 的空位计分为 `open + k * extend`。
    /// 这里把得分整体乘 2，并把 "首格 open、其余 extend" 换算成 bio 的形式。
    pub fn doubled(&self) -> Result<(i32, i32)> {
        let open = 2.0 * (self.gap_open - self.gap_extend);
        let extend = 2.0 * self.gap_extend;
        if open.fract() != 0.0 || extend.fract() != 0.0 {
            anyhow::bail!(
                "gap penalties must be multiples of 0.5 (open {}, extend {})",
                self.gap_open,
                self.gap_extend
            );
        }
        if open > 0.0 || extend > 0.0 {
            anyhow::bail!("gap penalties must not be positive");
        }
        Ok((open as i32, extend as i32))
    }
}

fn doubled_blosum(a: u8, b: u8) -> i32 {
    2 * BLOSUM100.score(a, b)
}

pub type ScoreFn = fn(u8, u8) -> i32;

/// 可复用的全局比对器，每个线程持有一个以复用 DP 缓冲区。
pub struct PairAligner {
    inner: Aligner<ScoreFn>,
}

impl PairAligner {
    pub fn new(params: AlignParams) -> Result<Self> {
        let (open, extend) = params.doubled()?;
        Ok(Self::from_doubled(open, extend))
    }

    /// 由 [`AlignParams::doubled`] 已校验过的罚分构建
    pub fn from_doubled(open: i32, extend: i32) -> Self {
        Self { inner: Aligner::new(open, extend, doubled_blosum as ScoreFn) }
    }

    pub fn align(&mut self, a: &[u8], b: &[u8]) -> PairAlignment {
        let aln = self.inner.global(a, b);
        let mut columns = Vec::with_capacity(aln.operations.len());
        let (mut i, mut j) = (0usize, 0usize);
        for op in &aln.operations {
            match op {
                AlignmentOperation::Match | AlignmentOperation::Subst => {
                    columns.push((Some(a[i]), Some(b[j])));
                    i += 1;
                    j += 1;
                }
                AlignmentOperation::Ins => {
                    columns.push((Some(a[i]), None));
                    i += 1;
                }
                AlignmentOperation::Del => {
                    columns.push((None, Some(b[j])));
                    j += 1;
                }
                // global mode never clips
                AlignmentOperation::Xclip(_) | AlignmentOperation::Yclip(_) => {}
            }
        }
        PairAlignment { score: aln.score as f64 / 2.0, columns }
    }
}

/// 一次全局比对的结果：得分与逐列残基（`None` 表示空位）。
#[derive(Debug, Clone, PartialEq)]
pub struct PairAlignment {
    pub score: f64,
    pub columns: Vec<(Option<u8>, Option<u8>)>,
}

impl PairAlignment {
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn similarity(&self, normaliser: f64) -> f64 {
        if self.columns.is_empty() {
            return 0.0;
        }
        self.score / (normaliser * self.columns.len() as f64)
    }

    /// 扩展 CIGAR：`=` 相同，`X` 替换，`I` 第二条序列缺位，`D` 第一条序列缺位
    pub fn cigar(&self) -> String {
        let ops: Vec<char> = self
            .columns
            .iter()
            .map(|c| match c {
                (Some(x), Some(y)) if x == y => '=',
                (Some(_), Some(_)) => 'X',
                (Some(_), None) => 'I',
                _ => 'D',
            })
            .collect();
        ops_to_cigar(&ops)
    }

    pub fn gapped(&self) -> (String, String) {
        let row = |f: fn(&(Option<u8>, Option<u8>)) -> Option<u8>| {
            self.columns.iter().map(|c| f(c).map_or('-', char::from)).collect::<String>()
        };
        (row(|c| c.0), row(|c| c.1))
    }
}

pub fn ops_to_cigar(ops: &[char]) -> String {
    let mut cigar = String::new();
    if ops.is_empty() {
        return cigar;
    }
    let mut cur = ops[0];
    let mut len = 1usize;
    for &op in &ops[1..] {
        if op == cur {
            len += 1;
        } else {
            let _ = write!(&mut cigar, "{}{}", len, cur);
            cur = op;
            len = 1;
        }
    }
    let _ = write!(&mut cigar, "{}{}", len, cur);
    cigar
}

/// 单次比对的便捷入口
pub fn global_align(a: &[u8], b: &[u8], params: AlignParams) -> Result<PairAlignment> {
    Ok(PairAligner::new(params)?.align(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubled_penalties() {
        assert_eq!(AlignParams::default().doubled().unwrap(), (-19, -1));
        let odd = AlignParams { gap_open: -10.25, ..AlignParams::default() };
        assert!(odd.doubled().is_err());
    }

    #[test]
    fn identical_sequences() {
        let aln = global_align(b"WWW", b"WWW", AlignParams::default()).unwrap();
        assert_eq!(aln.score, 51.0);
        assert_eq!(aln.len(), 3);
        assert_eq!(aln.similarity(17.0), 1.0);
        assert_eq!(aln.cigar(), "3=");
    }

    #[test]
    fn single_substitution() {
        // A/A = 8, R/K = 3, C/C = 14
        let aln = global_align(b"ARC", b"AKC", AlignParams::default()).unwrap();
        assert_eq!(aln.score, 25.0);
        assert_eq!(aln.cigar(), "1=1X1=");
    }

    #[test]
    fn gap_costs_open_then_extend() {
        // W W W W vs W W: two end gap columns cost -10 + -0.5
        let aln = global_align(b"WWWW", b"WW", AlignParams::default()).unwrap();
        assert_eq!(aln.score, 2.0 * 17.0 - 10.5);
        assert_eq!(aln.len(), 4);
        let (top, bottom) = aln.gapped();
        assert_eq!(top, "WWWW");
        assert_eq!(bottom.matches('-').count(), 2);
    }

    #[test]
    fn symmetric_score() {
        let p = AlignParams::default();
        let a = b"MAVMAPRTLLLLLSGALALTQTWAG";
        let b = b"MRVMAPRTLILLLSGALALTETWAC";
        let mut aligner = PairAligner::new(p).unwrap();
        let ab = aligner.align(a, b);
        let ba = aligner.align(b, a);
        assert_eq!(ab.score, ba.score);
    }

    #[test]
    fn cigar_compaction() {
        assert_eq!(ops_to_cigar(&['=', '=', 'X', 'I', 'I', '=']), "2=1X2I1=");
        assert_eq!(ops_to_cigar(&[]), "");
    }
}
