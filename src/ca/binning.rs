use anyhow::Result;

/// 按边界分箱：`[e_i, e_i+1)`，最后一个箱右端闭合；越界或缺失值得到 `None`。
pub fn cut<'a>(values: &[Option<f64>], edges: &[f64], labels: &'a [String]) -> Result<Vec<Option<&'a str>>> {
    if edges.len() != labels.len() + 1 {
        anyhow::bail!("{} bin edges cannot carry {} labels", edges.len(), labels.len());
    }
    let last = labels.len().saturating_sub(1);
    Ok(values
        .iter()
        .map(|v| {
            let x = (*v)?;
            if x.is_nan() {
                return None;
            }
            (0..labels.len())
                .find(|&i| x >= edges[i] && (x < edges[i + 1] || (i == last && x == edges[i + 1])))
                .map(|i| labels[i].as_str())
        })
        .collect())
}

/// 线性插值分位数，`sorted` 必须已升序排列且非空。
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// 等频分箱：`q` 个箱，边界取线性插值分位数。
///
/// 箱为右闭 `(e_i, e_i+1]`，第一个箱包含最小值。边界重复（数据里相同值太多）时报错。
pub fn qcut<'a>(values: &[Option<f64>], q: usize, labels: &'a [String]) -> Result<Vec<Option<&'a str>>> {
    if q == 0 || labels.len() != q {
        anyhow::bail!("qcut needs {} labels, got {}", q, labels.len());
    }
    let mut sorted: Vec<f64> = values.iter().flatten().copied().filter(|x| !x.is_nan()).collect();
    if sorted.is_empty() {
        return Ok(vec![None; values.len()]);
    }
    sorted.sort_by(f64::total_cmp);

    let edges: Vec<f64> = (0..=q).map(|i| quantile(&sorted, i as f64 / q as f64)).collect();
    if let Some(w) = edges.windows(2).find(|w| w[0] >= w[1]) {
        anyhow::bail!(
            "quantile bin edges are not unique ({} repeats), too many identical values for {} bins",
            w[1],
            q
        );
    }

    Ok(values
        .iter()
        .map(|v| {
            let x = (*v)?;
            if x.is_nan() {
                return None;
            }
            (0..q)
                .find(|&i| x <= edges[i + 1])
                .map(|i| labels[i].as_str())
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn cut_half_open_with_closed_last_bin() {
        let l = labels(&["No response", "Weak", "Moderate", "Strong"]);
        let edges = [-1.0, 0.0, 0.001, 0.01, 1.0];
        let v = [Some(-1.0), Some(0.0), Some(0.0005), Some(0.001), Some(0.5), Some(1.0), Some(1.5), Some(-2.0), None];
        let got = cut(&v, &edges, &l).unwrap();
        assert_eq!(
            got,
            vec![
                Some("No response"),
                Some("Weak"),
                Some("Weak"),
                Some("Moderate"),
                Some("Strong"),
                Some("Strong"),
                None,
                None,
                None
            ]
        );
    }

    #[test]
    fn cut_rejects_label_mismatch() {
        assert!(cut(&[Some(1.0)], &[0.0, 1.0], &labels(&["a", "b"])).is_err());
    }

    #[test]
    fn quantile_interpolates() {
        let s = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&s, 0.0), 1.0);
        assert_eq!(quantile(&s, 1.0), 4.0);
        assert!((quantile(&s, 0.5) - 2.5).abs() < 1e-12);
        assert!((quantile(&s, 0.25) - 1.75).abs() < 1e-12);
    }

    #[test]
    fn qcut_equal_sized_bins() {
        let v: Vec<Option<f64>> = (1..=10).map(|x| Some(x as f64)).collect();
        let l = labels(&["lo", "mid", "hi"]);
        let got = qcut(&v, 2, &l[..2]).unwrap();
        assert_eq!(got.iter().filter(|x| **x == Some("lo")).count(), 5);
        assert_eq!(got.iter().filter(|x| **x == Some("mid")).count(), 5);
        // minimum lands in the first bin
        assert_eq!(got[0], Some("lo"));

        let got = qcut(&v, 3, &l).unwrap();
        assert_eq!(got[0], Some("lo"));
        assert_eq!(got[9], Some("hi"));
    }

    #[test]
    fn qcut_keeps_missing() {
        let v = vec![Some(1.0), None, Some(2.0), Some(3.0)];
        let l = labels(&["a", "b"]);
        let got = qcut(&v, 2, &l).unwrap();
        assert_eq!(got, vec![Some("a"), None, Some("a"), Some("b")]);
    }

    #[test]
    fn qcut_duplicate_edges_error() {
        let v = vec![Some(0.0); 8];
        let err = qcut(&v, 4, &labels(&["a", "b", "c", "d"])).unwrap_err();
        assert!(err.to_string().contains("not unique"));
    }
}
