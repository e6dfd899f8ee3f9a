//! SVG 图表：相似度热图、比对列热图、BIC/AIC 曲线、嵌入散点图、CA 双标图。

use anyhow::Result;
use ndarray::Array2;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::ops::Range;
use std::path::Path;

const FONT: &str = "sans-serif";

/// 顺序色图（深 -> 浅），用于相似度热图
const SEQUENTIAL: [(u8, u8, u8); 5] = [(3, 5, 26), (93, 23, 78), (203, 27, 79), (246, 125, 83), (250, 235, 221)];
/// 发散色图 RdYlBu：低分偏暖，高分偏冷
const DIVERGING: [(u8, u8, u8); 5] = [(165, 0, 38), (244, 109, 67), (255, 255, 191), (116, 173, 209), (49, 54, 149)];

fn lerp_stops(stops: &[(u8, u8, u8)], t: f64) -> RGBColor {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let seg = (stops.len() - 1) as f64;
    let pos = t * seg;
    let i = (pos.floor() as usize).min(stops.len() - 2);
    let f = pos - i as f64;
    let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * f).round() as u8;
    let (a, b) = (stops[i], stops[i + 1]);
    RGBColor(mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
}

fn padded_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return -1.0..1.0;
    }
    let pad = if hi > lo { (hi - lo) * 0.05 } else { 0.5 };
    (lo - pad)..(hi + pad)
}

/// 带标签的方阵热图
pub fn matrix_heatmap(path: &Path, title: &str, labels: &[String], values: &Array2<f64>) -> Result<()> {
    let n = labels.len();
    if n == 0 {
        anyhow::bail!("cannot draw an empty heatmap");
    }
    let (vmin, vmax) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = if vmax > vmin { vmax - vmin } else { 1.0 };

    let side = (n as u32 * 8).clamp(600, 2400);
    let root = SVGBackend::new(path, (side + 120, side + 120)).into_drawing_area();
    root.fill(&WHITE)?;
    let n_labels = if n <= 60 { n } else { 20 };
    let mut chart = ChartBuilder::on(&root)
        .caption(title, (FONT, 24).into_font())
        .margin(10)
        .x_label_area_size(90)
        .y_label_area_size(90)
        .build_cartesian_2d((0..n).into_segmented(), (0..n).into_segmented())?;
    let fmt = |v: &SegmentValue<usize>| match v {
        SegmentValue::CenterOf(i) => labels.get(*i).cloned().unwrap_or_default(),
        _ => String::new(),
    };
    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(n_labels)
        .y_labels(n_labels)
        .x_label_formatter(&fmt)
        .y_label_formatter(&fmt)
        .label_style((FONT, 9).into_font())
        .draw()?;

    chart.draw_series(values.indexed_iter().map(|((i, j), &v)| {
        let color = lerp_stops(&SEQUENTIAL, (v - vmin) / span);
        // row 0 at the top, like a table
        let y = n - 1 - i;
        Rectangle::new(
            [
                (SegmentValue::Exact(j), SegmentValue::Exact(y)),
                (SegmentValue::Exact(j + 1), SegmentValue::Exact(y + 1)),
            ],
            color.filled(),
        )
    }))?;
    root.present()?;
    Ok(())
}

/// 单行比对热图，色阶固定为 -10..10；每列下方按行写出标签（以 `\n` 分隔）。
pub fn alignment_heatmap(path: &Path, title: &str, scores: &[i32], labels: &[String]) -> Result<()> {
    let n = scores.len().max(1);
    let label_rows = labels.iter().map(|l| l.lines().count()).max().unwrap_or(0);
    let rows = label_rows + 1;

    let width = (n as u32 * 14 + 80).max(400);
    let root = SVGBackend::new(path, (width, 60 + rows as u32 * 28)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, (FONT, 18).into_font())
        .margin(10)
        .build_cartesian_2d(0f64..n as f64, 0f64..rows as f64)?;

    chart.draw_series(scores.iter().enumerate().map(|(i, &s)| {
        let t = (s as f64 + 10.0) / 20.0;
        Rectangle::new(
            [(i as f64, label_rows as f64), (i as f64 + 1.0, rows as f64)],
            lerp_stops(&DIVERGING, t).filled(),
        )
    }))?;

    let style = (FONT, 11)
        .into_font()
        .color(&BLACK)
        .pos(Pos::new(HPos::Center, VPos::Center));
    for (i, label) in labels.iter().enumerate() {
        for (k, line) in label.lines().enumerate() {
            let y = label_rows as f64 - k as f64 - 0.5;
            chart.draw_series(std::iter::once(Text::new(
                line.to_string(),
                (i as f64 + 0.5, y),
                style.clone(),
            )))?;
        }
    }
    root.present()?;
    Ok(())
}

/// 多条折线，如 BIC / AIC 随分量数变化
pub fn line_chart(path: &Path, title: &str, x_desc: &str, series: &[(&str, Vec<(f64, f64)>)]) -> Result<()> {
    let xr = padded_range(series.iter().flat_map(|(_, pts)| pts.iter().map(|p| p.0)));
    let yr = padded_range(series.iter().flat_map(|(_, pts)| pts.iter().map(|p| p.1)));

    let root = SVGBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, (FONT, 24).into_font())
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(xr, yr)?;
    chart.configure_mesh().x_desc(x_desc).draw()?;

    for (k, (name, pts)) in series.iter().enumerate() {
        let color = Palette99::pick(k).to_rgba();
        chart
            .draw_series(LineSeries::new(pts.iter().copied(), color.stroke_width(2)))?
            .label(*name)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

/// 散点图，点按聚类编号着色
pub fn cluster_scatter(path: &Path, title: &str, axes: (&str, &str), points: &[(f64, f64)], labels: &[usize]) -> Result<()> {
    let xr = padded_range(points.iter().map(|p| p.0));
    let yr = padded_range(points.iter().map(|p| p.1));

    let root = SVGBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, (FONT, 24).into_font())
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(xr, yr)?;
    chart.configure_mesh().x_desc(axes.0).y_desc(axes.1).draw()?;
    chart.draw_series(
        points
            .iter()
            .zip(labels)
            .map(|(&p, &c)| Circle::new(p, 4, Palette99::pick(c).filled())),
    )?;
    root.present()?;
    Ok(())
}

/// 对应分析双标图：行点（聚类）为圆，列点（反应等级）为三角
pub fn biplot(
    path: &Path,
    title: &str,
    axes: (&str, &str),
    rows: &[(String, (f64, f64))],
    cols: &[(String, (f64, f64))],
) -> Result<()> {
    let all = rows.iter().chain(cols).map(|(_, p)| *p);
    let xr = padded_range(all.clone().map(|p| p.0));
    let yr = padded_range(all.map(|p| p.1));

    let root = SVGBackend::new(path, (1000, 1000)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, (FONT, 24).into_font())
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(xr, yr)?;
    chart.configure_mesh().x_desc(axes.0).y_desc(axes.1).draw()?;

    let row_color = RGBColor(49, 54, 149);
    let col_color = RGBColor(165, 0, 38);
    chart.draw_series(rows.iter().map(|(_, p)| Circle::new(*p, 5, row_color.filled())))?;
    chart.draw_series(cols.iter().map(|(_, p)| TriangleMarker::new(*p, 7, col_color.filled())))?;

    let style = (FONT, 13).into_font().color(&BLACK).pos(Pos::new(HPos::Left, VPos::Bottom));
    chart.draw_series(
        rows.iter()
            .chain(cols)
            .map(|(name, p)| Text::new(name.clone(), *p, style.clone())),
    )?;
    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colormap_endpoints() {
        assert_eq!(lerp_stops(&DIVERGING, 0.0), RGBColor(165, 0, 38));
        assert_eq!(lerp_stops(&DIVERGING, 1.0), RGBColor(49, 54, 149));
        assert_eq!(lerp_stops(&DIVERGING, 0.5), RGBColor(255, 255, 191));
        assert_eq!(lerp_stops(&DIVERGING, f64::NAN), RGBColor(165, 0, 38));
    }

    #[test]
    fn padded_range_handles_constant_and_empty() {
        assert_eq!(padded_range([2.0, 2.0].into_iter()), 1.5..2.5);
        assert_eq!(padded_range(std::iter::empty()), -1.0..1.0);
    }

    #[test]
    fn writes_svg_files() {
        let dir = tempfile::tempdir().unwrap();
        let labels = vec!["A*01:01".to_string(), "A*02:01".to_string()];
        let values = ndarray::arr2(&[[1.0, 0.5], [0.5, 1.0]]);
        let p = dir.path().join("heat.svg");
        matrix_heatmap(&p, "MHC I", &labels, &values).unwrap();
        assert!(std::fs::read_to_string(&p).unwrap().contains("<svg"));

        let p = dir.path().join("bic.svg");
        line_chart(&p, "BIC", "components", &[("BIC", vec![(1.0, 10.0), (2.0, 8.0)])]).unwrap();
        assert!(p.is_file());
    }
}
