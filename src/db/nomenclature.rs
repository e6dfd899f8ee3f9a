use anyhow::Result;
use regex::Regex;
use std::collections::BTreeMap;
use std::io::BufRead;

/// G / P 分组代码：组名以该字母结尾。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupCode {
    G,
    P,
}

impl GroupCode {
    pub fn suffix(self) -> char {
        match self {
            GroupCode::G => 'G',
            GroupCode::P => 'P',
        }
    }

    /// IMGT 下载文件名
    pub fn file_name(self) -> &'static str {
        match self {
            GroupCode::G => "hla_nom_g.txt",
            GroupCode::P => "hla_nom_p.txt",
        }
    }
}

/// 解析 `hla_nom_g.txt` / `hla_nom_p.txt` 的行。
///
/// 行格式：`A*;01:01:01:01/01:01:01:03;01:01:01G`。不以分组代码结尾的行
/// （注释、单成员未分组的等位基因）返回 `None`。
pub struct GroupLineParser {
    locus_re: Regex,
    group_re: Regex,
}

impl GroupLineParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            locus_re: Regex::new(r"\w+\*")?,
            group_re: Regex::new(r"(\d+:)+\d+G|(\d+:)+\d+P")?,
        })
    }

    /// 返回 (组名, 成员列表)，均带位点前缀。
    pub fn parse(&self, line: &str, code: GroupCode) -> Option<(String, Vec<String>)> {
        let line = line.trim_end();
        if line.starts_with('#') || !line.ends_with(code.suffix()) {
            return None;
        }
        let locus = self.locus_re.find(line)?.as_str();
        let group = self.group_re.find(line)?.as_str();
        let group_name = format!("{}{}", locus, group);

        let body = line.replacen(group, "", 1).replacen(locus, "", 1);
        let members = body
            .trim_matches(';')
            .split('/')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(|m| format!("{}{}", locus, m))
            .collect::<Vec<_>>();
        if members.is_empty() {
            return None;
        }
        Some((group_name, members))
    }
}

/// 等位基因 -> 所属分组（可同时属于一个 G 组和一个 P 组）
pub type GroupMap = BTreeMap<String, Vec<String>>;

/// 从一个分组文件读取成员关系，追加到 `groups`。返回读到的分组数。
pub fn read_groups<R: BufRead>(reader: R, code: GroupCode, groups: &mut GroupMap) -> Result<usize> {
    let parser = GroupLineParser::new()?;
    let mut n = 0usize;
    for line in reader.lines() {
        let line = line?;
        if let Some((group, members)) = parser.parse(&line, code) {
            n += 1;
            for m in members {
                let entry = groups.entry(m).or_default();
                if !entry.contains(&group) {
                    entry.push(group.clone());
                }
            }
        }
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parse_g_group_line() {
        let p = GroupLineParser::new().unwrap();
        let (g, m) = p
            .parse("A*;01:01:01:01/01:01:01:03/01:01:38L;01:01:01G", GroupCode::G)
            .unwrap();
        assert_eq!(g, "A*01:01:01G");
        assert_eq!(m, vec!["A*01:01:01:01", "A*01:01:01:03", "A*01:01:38L"]);
    }

    #[test]
    fn parse_p_group_line_multi_letter_locus() {
        let p = GroupLineParser::new().unwrap();
        let (g, m) = p.parse("DRB1*;15:01:01:01/15:01:02;15:01P", GroupCode::P).unwrap();
        assert_eq!(g, "DRB1*15:01P");
        assert_eq!(m, vec!["DRB1*15:01:01:01", "DRB1*15:01:02"]);
    }

    #[test]
    fn skips_ungrouped_and_comment_lines() {
        let p = GroupLineParser::new().unwrap();
        assert!(p.parse("# file: hla_nom_g.txt", GroupCode::G).is_none());
        assert!(p.parse("A*;01:01:01:02N;", GroupCode::G).is_none());
        // a G line is not a P line
        assert!(p.parse("A*;01:01:01:01;01:01:01G", GroupCode::P).is_none());
    }

    #[test]
    fn allele_can_belong_to_g_and_p() {
        let mut groups = GroupMap::new();
        read_groups(Cursor::new("A*;01:01:01:01/01:01:01:03;01:01:01G\n"), GroupCode::G, &mut groups).unwrap();
        read_groups(Cursor::new("A*;01:01:01:01/01:01:02;01:01P\n"), GroupCode::P, &mut groups).unwrap();
        assert_eq!(groups["A*01:01:01:01"], vec!["A*01:01:01G", "A*01:01P"]);
        assert_eq!(groups["A*01:01:02"], vec!["A*01:01P"]);
        assert_eq!(groups.len(), 3);
    }
}
