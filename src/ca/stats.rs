use std::collections::BTreeMap;

use super::binning::quantile;
use crate::io::table::Sheet;

/// 一列数值的描述统计，缺失值不计入。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Describe {
    pub count: usize,
    pub mean: f64,
    /// 样本标准差（n - 1）
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
    pub max: f64,
}

impl Describe {
    pub const COLUMNS: [&'static str; 8] = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];

    pub fn values(&self) -> [f64; 8] {
        [self.count as f64, self.mean, self.std, self.min, self.q25, self.q50, self.q75, self.max]
    }
}

pub fn describe(values: &[Option<f64>]) -> Describe {
    let mut v: Vec<f64> = values.iter().flatten().copied().filter(|x| !x.is_nan()).collect();
    let n = v.len();
    if n == 0 {
        return Describe {
            count: 0,
            mean: f64::NAN,
            std: f64::NAN,
            min: f64::NAN,
            q25: f64::NAN,
            q50: f64::NAN,
            q75: f64::NAN,
            max: f64::NAN,
        };
    }
    v.sort_by(f64::total_cmp);
    let mean = v.iter().sum::<f64>() / n as f64;
    let std = if n > 1 {
        (v.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
    } else {
        f64::NAN
    };
    Describe {
        count: n,
        mean,
        std,
        min: v[0],
        q25: quantile(&v, 0.25),
        q50: quantile(&v, 0.5),
        q75: quantile(&v, 0.75),
        max: v[n - 1],
    }
}

/// 每个取值出现的次数，缺失值不计。
pub fn value_counts<'a>(values: impl IntoIterator<Item = Option<&'a str>>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for v in values.into_iter().flatten() {
        *counts.entry(v.to_string()).or_insert(0) += 1;
    }
    counts
}

/// 一行一个变量的描述统计表
pub fn describe_sheet(columns: &[(String, Vec<Option<f64>>)]) -> Sheet {
    let mut sheet = Sheet::new("", Describe::COLUMNS.iter().map(|s| s.to_string()).collect());
    for (name, values) in columns {
        sheet.push_numbers(name.clone(), describe(values).values());
    }
    sheet
}

/// 频数表：行为取值，列为变量；`order` 给定时按其排列行，否则按取值排序。
pub fn counts_sheet(columns: &[(String, BTreeMap<String, usize>)], order: Option<&[String]>) -> Sheet {
    let keys: Vec<String> = match order {
        Some(o) => o.to_vec(),
        None => {
            let mut all: Vec<String> = columns.iter().flat_map(|(_, c)| c.keys().cloned()).collect();
            all.sort();
            all.dedup();
            all
        }
    };
    let mut sheet = Sheet::new("", columns.iter().map(|(name, _)| name.clone()).collect());
    for key in keys {
        let cells: Vec<f64> = columns
            .iter()
            .map(|(_, c)| c.get(&key).copied().unwrap_or(0) as f64)
            .collect();
        sheet.push_numbers(key, cells);
    }
    sheet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_matches_sample_statistics() {
        let d = describe(&[Some(1.0), Some(2.0), None, Some(3.0), Some(4.0)]);
        assert_eq!(d.count, 4);
        assert_eq!(d.mean, 2.5);
        assert!((d.std - 1.290_994_448_735_805_6).abs() < 1e-12);
        assert_eq!(d.min, 1.0);
        assert_eq!(d.q50, 2.5);
        assert_eq!(d.q25, 1.75);
        assert_eq!(d.max, 4.0);
    }

    #[test]
    fn describe_single_and_empty() {
        let d = describe(&[Some(2.0)]);
        assert_eq!(d.count, 1);
        assert!(d.std.is_nan());
        assert_eq!(describe(&[None]).count, 0);
    }

    #[test]
    fn counts_skip_missing() {
        let c = value_counts([Some("Yes"), None, Some("No"), Some("Yes")]);
        assert_eq!(c.get("Yes"), Some(&2));
        assert_eq!(c.get("No"), Some(&1));
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn counts_sheet_fills_zeros() {
        let a = value_counts([Some("x"), Some("y")]);
        let b = value_counts([Some("y")]);
        let sheet = counts_sheet(&[("a".into(), a), ("b".into(), b)], None);
        let mut out = Vec::new();
        sheet.write(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), ",a,b\nx,1,0\ny,1,1\n");
    }
}
