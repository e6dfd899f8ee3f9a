pub mod blosum;
pub mod compare;
pub mod pairwise;
pub mod repl;

pub use compare::{sanitize_name, Comparison};
pub use pairwise::{global_align, AlignParams, PairAligner, PairAlignment};

use anyhow::{Context, Result};
use std::io::Write;

use crate::config::{AnalysisConfig, Layout};
use crate::db::AlleleDb;

fn lookup<'a>(db: &'a AlleleDb, name: &str) -> Result<&'a str> {
    db.get(name).with_context(|| {
        format!("please check input '{}', as this allele cannot be found in the HLA database", name)
    })
}

/// 一次性比较两个等位基因；给出 `save` 时写入 `output/alignments/<save>/`。
pub fn run_compare(layout: &Layout, cfg: &AnalysisConfig, first: &str, second: &str, save: Option<&str>) -> Result<Comparison> {
    let db = AlleleDb::load(&layout.allele_db())?;
    let s1 = lookup(&db, first)?;
    let s2 = lookup(&db, second)?;
    let cmp = Comparison::new(first, s1.as_bytes(), second, s2.as_bytes(), cfg.align_params())?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{}", cmp.mismatch_report())?;
    writeln!(out, "{}", cmp.similarity_line())?;

    if let Some(name) = save {
        let name = sanitize_name(name);
        if name.is_empty() {
            anyhow::bail!("output name only contains illegal filename characters");
        }
        let dir = layout.alignments().join(&name);
        cmp.save(&dir, &name)?;
        writeln!(out, "saved to {}", dir.display())?;
    }
    Ok(cmp)
}

/// 交互式比较，读标准输入直到 `quit` 或 EOF。
pub fn run_repl(layout: &Layout, cfg: &AnalysisConfig) -> Result<()> {
    let db = AlleleDb::load(&layout.allele_db())?;
    let mut session = repl::Session::new(&db, cfg.align_params(), layout.alignments());
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    session.run(stdin.lock(), &mut stdout.lock())
}
