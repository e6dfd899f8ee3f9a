//! BLOSUM100 替换矩阵（NCBI，1/3 bit 单位）。

const ALPHABET: &[u8; 24] = b"ARNDCQEGHILKMFPSTWYVBZX*";
const DIM: usize = 24;
const UNKNOWN: usize = 22; // X

/// 下三角存储，行 i 含列 0..=i；查表时对称展开。
const LOWER: [&[i8]; DIM] = [
    &[8],
    &[-3, 10],
    &[-4, -2, 11],
    &[-5, -5, 1, 10],
    &[-2, -8, -5, -8, 14],
    &[-2, 0, -1, -2, -7, 11],
    &[-3, -2, -2, 2, -9, 2, 10],
    &[-1, -6, -2, -4, -7, -5, -6, 9],
    &[-4, -1, 0, -3, -8, 1, -2, -6, 13],
    &[-4, -7, -7, -8, -3, -6, -7, -9, -7, 8],
    &[-4, -6, -7, -8, -5, -5, -7, -8, -6, 2, 8],
    &[-2, 3, -1, -3, -8, 2, 0, -5, -3, -6, -6, 10],
    &[-3, -4, -5, -8, -4, -2, -5, -7, -5, 1, 3, -4, 12],
    &[-5, -6, -7, -8, -4, -6, -8, -8, -4, -2, 0, -6, -1, 11],
    &[-2, -5, -5, -5, -8, -4, -4, -6, -5, -7, -7, -3, -5, -7, 12],
    &[1, -3, 0, -2, -3, -2, -2, -2, -3, -5, -6, -2, -4, -5, -3, 9],
    &[-1, -3, -1, -4, -3, -3, -3, -5, -4, -3, -4, -3, -2, -5, -4, 2, 9],
    &[-6, -7, -8, -10, -7, -5, -8, -7, -5, -6, -5, -8, -4, 0, -8, -7, -7, 17],
    &[-5, -5, -5, -7, -6, -4, -7, -8, 1, -4, -4, -5, -5, 4, -7, -5, -5, 2, 12],
    &[-2, -6, -7, -8, -3, -5, -5, -8, -7, 4, 0, -5, 0, -3, -6, -4, -1, -5, -5, 8],
    &[-4, -4, 5, 6, -7, -2, 0, -3, -2, -8, -8, -2, -7, -7, -5, -1, -2, -9, -6, -7, 6],
    &[-2, -1, -2, 0, -8, 5, 7, -5, -1, -7, -6, 0, -4, -7, -4, -2, -3, -7, -6, -5, 0, 6],
    &[-2, -3, -3, -4, -5, -2, -3, -4, -4, -3, -3, -3, -3, -4, -4, -2, -2, -6, -4, -3, -3, -3, -3],
    &[
        -10, -10, -10, -10, -10, -10, -10, -10, -10, -10, -10, -10, -10, -10, -10, -10, -10, -10,
        -10, -10, -10, -10, -10, 1,
    ],
];

/// 展开后的 24x24 矩阵与字节 -> 下标映射。未知残基按 `X` 计分。
#[derive(Clone)]
pub struct Blosum100 {
    table: [[i8; DIM]; DIM],
    index: [u8; 256],
}

pub static BLOSUM100: Blosum100 = Blosum100::new();

impl Blosum100 {
    pub const fn new() -> Self {
        let mut table = [[0i8; DIM]; DIM];
        let mut i = 0;
        while i < DIM {
            let row = LOWER[i];
            let mut j = 0;
            while j < row.len() {
                table[i][j] = row[j];
                table[j][i] = row[j];
                j += 1;
            }
            i += 1;
        }
        let mut index = [UNKNOWN as u8; 256];
        let mut k = 0;
        while k < DIM {
            let c = ALPHABET[k];
            index[c as usize] = k as u8;
            index[c.to_ascii_lowercase() as usize] = k as u8;
            k += 1;
        }
        Self { table, index }
    }

    #[inline]
    pub fn score(&self, a: u8, b: u8) -> i32 {
        let i = self.index[a as usize] as usize;
        let j = self.index[b as usize] as usize;
        self.table[i][j] as i32
    }

    /// 对角线最大值（W/W = 17），即每个比对列可能的最高得分。
    pub fn max_score(&self) -> i32 {
        (0..DIM).map(|i| self.table[i][i] as i32).max().unwrap_or(0)
    }
}

impl std::fmt::Debug for Blosum100 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Blosum100")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangle_rows_have_expected_lengths() {
        for (i, row) in LOWER.iter().enumerate() {
            assert_eq!(row.len(), i + 1, "row {}", ALPHABET[i] as char);
        }
    }

    #[test]
    fn symmetric_lookup() {
        let m = &BLOSUM100;
        for &a in ALPHABET {
            for &b in ALPHABET {
                assert_eq!(m.score(a, b), m.score(b, a));
            }
        }
        assert_eq!(m.score(b'A', b'S'), 1);
        assert_eq!(m.score(b'S', b'A'), 1);
        assert_eq!(m.score(b'K', b'R'), 3);
    }

    #[test]
    fn diagonal_is_row_maximum() {
        let m = &BLOSUM100;
        for &a in &ALPHABET[..20] {
            for &b in &ALPHABET[..20] {
                assert!(m.score(a, a) >= m.score(a, b));
            }
        }
        assert_eq!(m.max_score(), 17);
        assert_eq!(m.score(b'W', b'W'), 17);
    }

    #[test]
    fn unknown_residue_scores_as_x() {
        let m = &BLOSUM100;
        assert_eq!(m.score(b'J', b'A'), m.score(b'X', b'A'));
        assert_eq!(m.score(b'a', b'a'), 8);
    }
}
