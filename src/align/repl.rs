use anyhow::Result;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use super::compare::{sanitize_name, Comparison};
use super::AlignParams;
use crate::db::AlleleDb;

pub const BANNER: &str = "\
Set HLA alleles to be compared using the commands 'setboth', 'setfirst' or 'setsecond'.
As an example, 'setboth A*24:109 B*39:71' compares A*24:109 and B*39:71.

  show similarity   similarity between the alleles set
  show mismatch     positions where the alleles differ
  show heatmap      render the per-column heatmap and print its path
  compare           all three at once
  save NAME         write NAME.txt and NAME.svg to output/alignments/NAME
  overwrite NAME    replace files saved earlier under NAME
  help, quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// 交互式两两比较会话。输入输出均为泛型，便于测试。
pub struct Session<'a> {
    db: &'a AlleleDb,
    params: AlignParams,
    out_dir: PathBuf,
    alleles: [Option<String>; 2],
    current: Option<Comparison>,
}

impl<'a> Session<'a> {
    pub fn new(db: &'a AlleleDb, params: AlignParams, out_dir: PathBuf) -> Self {
        Self { db, params, out_dir, alleles: [None, None], current: None }
    }

    pub fn current(&self) -> Option<&Comparison> {
        self.current.as_ref()
    }

    pub fn run<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> Result<()> {
        writeln!(out, "{}", BANNER)?;
        write!(out, "> ")?;
        out.flush()?;
        for line in input.lines() {
            let line = line?;
            if self.execute(&line, out)? == Flow::Quit {
                return Ok(());
            }
            write!(out, "> ")?;
            out.flush()?;
        }
        writeln!(out)?;
        Ok(())
    }

    pub fn execute<W: Write>(&mut self, line: &str, out: &mut W) -> Result<Flow> {
        let line = line.trim();
        let (cmd, args) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let args = args.trim();
        match cmd {
            "" => {}
            "setboth" => {
                let names: Vec<&str> = args.split_whitespace().collect();
                if names.len() != 2 {
                    writeln!(out, "Please input only two alleles to be compared.")?;
                } else {
                    for (i, name) in names.into_iter().enumerate() {
                        if !self.set_allele(name, i, out)? {
                            break;
                        }
                    }
                }
            }
            "setfirst" => {
                self.set_allele(args, 0, out)?;
            }
            "setsecond" => {
                self.set_allele(args, 1, out)?;
            }
            "compare" => {
                if let Some(c) = self.ready(out)? {
                    writeln!(out, "{}", c.mismatch_report())?;
                    writeln!(out, "{}", c.similarity_line())?;
                    let path = self.preview(c)?;
                    writeln!(out, "Heatmap written to {}", path.display())?;
                }
            }
            "show" => {
                if let Some(c) = self.ready(out)? {
                    if args.contains("similarity") {
                        writeln!(out, "{}", c.similarity_line())?;
                    } else if args.contains("mismatch") {
                        writeln!(out, "{}", c.mismatch_report())?;
                    } else if args.contains("heatmap") {
                        let path = self.preview(c)?;
                        writeln!(out, "Heatmap written to {}", path.display())?;
                    } else {
                        writeln!(out, "Only accepted arguments are 'similarity', 'mismatch' or 'heatmap'.")?;
                    }
                }
            }
            "save" => self.save(args, false, out)?,
            "overwrite" => self.save(args, true, out)?,
            "help" | "?" => writeln!(out, "{}", BANNER)?,
            "quit" | "exit" => {
                writeln!(out, "Quitting.")?;
                return Ok(Flow::Quit);
            }
            other => writeln!(out, "Unknown command '{}'. Type 'help' for the command list.", other)?,
        }
        Ok(Flow::Continue)
    }

    /// 返回是否设置成功
    fn set_allele<W: Write>(&mut self, name: &str, index: usize, out: &mut W) -> Result<bool> {
        if !self.db.contains(name) {
            writeln!(
                out,
                "Please check input '{}', as this allele cannot be found in the HLA database.",
                name
            )?;
            return Ok(false);
        }
        self.alleles[index] = Some(name.to_string());
        writeln!(out, "Allele {} has been set to {}", index + 1, name)?;

        if let [Some(a), Some(b)] = &self.alleles {
            let (sa, sb) = match (self.db.get(a), self.db.get(b)) {
                (Some(sa), Some(sb)) => (sa, sb),
                _ => return Ok(true),
            };
            self.current = Some(Comparison::new(a, sa.as_bytes(), b, sb.as_bytes(), self.params)?);
            writeln!(
                out,
                "Alleles have been aligned. Use 'compare' or 'show similarity|mismatch|heatmap'."
            )?;
        }
        Ok(true)
    }

    fn ready<W: Write>(&self, out: &mut W) -> Result<Option<&Comparison>> {
        if self.current.is_none() {
            writeln!(out, "Both alleles have not been set yet. Please set both alleles to start comparison.")?;
        }
        Ok(self.current.as_ref())
    }

    fn preview(&self, c: &Comparison) -> Result<PathBuf> {
        let dir = self.out_dir.join(".preview");
        crate::config::Layout::ensure_dir(&dir)?;
        let path = dir.join(format!("{}_vs_{}.svg", sanitize_name(&c.names[0]), sanitize_name(&c.names[1])));
        c.write_heatmap(&path)?;
        Ok(path)
    }

    fn save<W: Write>(&self, args: &str, overwrite: bool, out: &mut W) -> Result<()> {
        let Some(c) = &self.current else {
            writeln!(out, "There is nothing to save. Please start a comparison.")?;
            return Ok(());
        };
        if args.is_empty() {
            writeln!(out, "Nothing is inputted as the filename. Please input 'save filename'.")?;
            return Ok(());
        }
        let name = sanitize_name(args);
        if name.is_empty() {
            writeln!(
                out,
                "This filename only has illegal filename characters. Please choose another filename."
            )?;
            return Ok(());
        }
        let dir = self.out_dir.join(&name);
        match (dir.exists(), overwrite) {
            (true, false) => writeln!(
                out,
                "There are already files with the name '{}', input 'overwrite {}' to confirm overwriting these files.",
                name, name
            )?,
            (false, true) => writeln!(out, "There are no such files to overwrite. Please use the 'save' command instead.")?,
            _ => {
                c.save(&dir, &name)?;
                writeln!(out, "Comparison of {} saved as '{}.txt' and '{}.svg' in {}", c.title(), name, name, dir.display())?;
            }
        }
        Ok(())
    }
}
