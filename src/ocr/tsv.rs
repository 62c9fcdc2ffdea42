//! Tesseract TSV output → line-level text regions.
//!
//! Columns: level, page_num, block_num, par_num, line_num, word_num,
//! left, top, width, height, conf, text. Only word rows (level 5) carry text.

use super::engine::TextRegion;

const TSV_MIN_FIELDS: usize = 12;
const TSV_WORD_LEVEL: u32 = 5;

#[derive(Debug)]
struct LineAcc {
    key: (u32, u32, u32, u32),
    words: Vec<String>,
    conf_sum: f64,
    left: i64,
    top: i64,
    right: i64,
    bottom: i64,
}

impl LineAcc {
    fn into_region(self) -> TextRegion {
        let n = self.words.len().max(1) as f64;
        let (l, t, r, b) = (
            self.left as f64,
            self.top as f64,
            self.right as f64,
            self.bottom as f64,
        );
        TextRegion {
            bbox: vec![[l, t], [r, t], [r, b], [l, b]],
            text: self.words.join(" "),
            confidence: (self.conf_sum / n / 100.0).clamp(0.0, 1.0),
        }
    }
}

/// Groups recognised words into lines, in reading order of appearance.
pub fn parse_regions(tsv: &str) -> Vec<TextRegion> {
    let mut lines: Vec<LineAcc> = Vec::new();

    for (line_num, line) in tsv.lines().enumerate() {
        if line_num == 0 && line.starts_with("level") {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < TSV_MIN_FIELDS {
            continue;
        }

        let level = fields[0].trim().parse::<u32>().unwrap_or(0);
        if level != TSV_WORD_LEVEL {
            continue;
        }

        let conf = fields[10].trim().parse::<f64>().unwrap_or(-1.0);
        if conf < 0.0 {
            continue;
        }

        // text is the last column and may itself contain tabs in odd builds
        let text = fields[11..].join("\t");
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        let num = |i: usize| fields[i].trim().parse::<i64>().unwrap_or(0);
        let key = (num(1) as u32, num(2) as u32, num(3) as u32, num(4) as u32);
        let (left, top) = (num(6), num(7));
        let (right, bottom) = (left + num(8), top + num(9));

        match lines.iter_mut().find(|l| l.key == key) {
            Some(acc) => {
                acc.words.push(text.to_string());
                acc.conf_sum += conf;
                acc.left = acc.left.min(left);
                acc.top = acc.top.min(top);
                acc.right = acc.right.max(right);
                acc.bottom = acc.bottom.max(bottom);
            }
            None => lines.push(LineAcc {
                key,
                words: vec![text.to_string()],
                conf_sum: conf,
                left,
                top,
                right,
                bottom,
            }),
        }
    }

    lines.into_iter().map(LineAcc::into_region).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn tsv(rows: &[&str]) -> String {
        let mut s = String::from(HEADER);
        for r in rows {
            s.push('\n');
            s.push_str(r);
        }
        s
    }

    #[test]
    fn words_on_one_line_merge_into_a_region() {
        let data = tsv(&[
            "1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t",
            "4\t1\t1\t1\t1\t0\t100\t50\t170\t30\t-1\t",
            "5\t1\t1\t1\t1\t1\t100\t50\t80\t30\t90\tHello",
            "5\t1\t1\t1\t1\t2\t190\t48\t80\t34\t80\tWorld",
        ]);

        let regions = parse_regions(&data);
        assert_eq!(regions.len(), 1);
        let r = &regions[0];
        assert_eq!(r.text, "Hello World");
        assert_eq!(r.bbox, vec![[100.0, 48.0], [270.0, 48.0], [270.0, 82.0], [100.0, 82.0]]);
        assert!((r.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn separate_lines_stay_separate_and_ordered() {
        let data = tsv(&[
            "5\t1\t1\t1\t1\t1\t10\t10\t40\t20\t95\tПривет",
            "5\t1\t1\t1\t2\t1\t10\t40\t40\t20\t70\tмир",
        ]);
        let regions = parse_regions(&data);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].text, "Привет");
        assert_eq!(regions[1].text, "мир");
    }

    #[test]
    fn empty_and_unconfident_words_are_dropped() {
        let data = tsv(&[
            "5\t1\t1\t1\t1\t1\t10\t10\t40\t20\t-1\tghost",
            "5\t1\t1\t1\t1\t2\t60\t10\t40\t20\t88\t   ",
        ]);
        assert!(parse_regions(&data).is_empty());
    }

    #[test]
    fn malformed_rows_are_ignored() {
        let data = tsv(&["garbage", "5\t1\t1", ""]);
        assert!(parse_regions(&data).is_empty());
    }

    #[test]
    fn confidence_stays_in_unit_interval() {
        let data = tsv(&["5\t1\t1\t1\t1\t1\t0\t0\t1\t1\t100\tx"]);
        let regions = parse_regions(&data);
        assert_eq!(regions[0].confidence, 1.0);
    }
}
