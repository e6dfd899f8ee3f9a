use anyhow::{Context, Result};
use std::io::{Read, Write};
use std::path::Path;

/// 内存中的 CSV 表格。空单元格与缺失标记（如 `n.t.`）都读作 `None`。
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn read<R: Read>(reader: R, missing_marker: &str) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for (i, rec) in rdr.records().enumerate() {
            let rec = rec.with_context(|| format!("malformed CSV at data row {}", i + 1))?;
            let row = rec
                .iter()
                .map(|cell| {
                    if cell.is_empty() || cell == missing_marker {
                        None
                    } else {
                        Some(cell.to_string())
                    }
                })
                .collect();
            rows.push(row);
        }
        Ok(Self { headers, rows })
    }

    pub fn from_path(path: &Path, missing_marker: &str) -> Result<Self> {
        crate::config::require_file(path)?;
        let f = std::fs::File::open(path)
            .with_context(|| format!("cannot open table '{}'", path.display()))?;
        Self::read(std::io::BufReader::new(f), missing_marker)
            .with_context(|| format!("cannot parse table '{}'", path.display()))
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column(name)
            .ok_or_else(|| anyhow::anyhow!("table has no '{}' column", name))
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col)?.as_deref()
    }

    /// 数值单元格；缺失为 `Ok(None)`，无法解析为错误。
    pub fn number(&self, row: usize, col: usize) -> Result<Option<f64>> {
        match self.get(row, col) {
            None => Ok(None),
            Some(s) => s.parse::<f64>().map(Some).with_context(|| {
                format!("row {}, column '{}': '{}' is not a number", row + 2, self.headers[col], s)
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// 带行标签的输出表（对应原工作簿里的一个 sheet）。
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub corner: String,
    pub columns: Vec<String>,
    pub rows: Vec<(String, Vec<String>)>,
}

impl Sheet {
    pub fn new(corner: impl Into<String>, columns: Vec<String>) -> Self {
        Self { corner: corner.into(), columns, rows: Vec::new() }
    }

    pub fn push(&mut self, label: impl Into<String>, cells: Vec<String>) {
        self.rows.push((label.into(), cells));
    }

    pub fn push_numbers(&mut self, label: impl Into<String>, values: impl IntoIterator<Item = f64>) {
        self.push(label, values.into_iter().map(format_number).collect());
    }

    pub fn write<W: Write>(&self, w: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(w);
        let mut header = Vec::with_capacity(self.columns.len() + 1);
        header.push(self.corner.as_str());
        header.extend(self.columns.iter().map(String::as_str));
        wtr.write_record(&header)?;
        for (label, cells) in &self.rows {
            let mut rec = Vec::with_capacity(cells.len() + 1);
            rec.push(label.as_str());
            rec.extend(cells.iter().map(String::as_str));
            wtr.write_record(&rec)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_to_path(&self, path: &Path) -> Result<()> {
        let f = std::fs::File::create(path)
            .with_context(|| format!("cannot write '{}'", path.display()))?;
        self.write(std::io::BufWriter::new(f))
    }
}

pub fn format_number(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        format!("{}", v)
    }
}
