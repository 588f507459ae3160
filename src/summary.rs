//! End-of-run report.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

const RULE_WIDTH: usize = 80;

/// Counts for one keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordSummary {
    pub keyword: String,
    /// Distinct candidate locators extracted from the results page.
    pub found: usize,
    /// Files kept during the pipeline.
    pub downloaded: usize,
    /// Files present in the keyword directory after the browser closed.
    #[serde(rename = "final")]
    pub final_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub keywords: Vec<KeywordSummary>,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>, elapsed: Duration, keywords: Vec<KeywordSummary>) -> Self {
        Self {
            started_at,
            elapsed_secs: elapsed.as_secs_f64(),
            keywords,
        }
    }

    pub fn get(&self, keyword: &str) -> Option<&KeywordSummary> {
        self.keywords.iter().find(|k| k.keyword == keyword)
    }

    pub fn total_downloaded(&self) -> usize {
        self.keywords.iter().map(|k| k.downloaded).sum()
    }

    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }

    fn table(&self) -> String {
        let headers = ["Keyword", "Found", "Downloaded", "Final"];
        let rows: Vec<[String; 4]> = self
            .keywords
            .iter()
            .map(|k| {
                [
                    k.keyword.clone(),
                    k.found.to_string(),
                    k.downloaded.to_string(),
                    k.final_count.to_string(),
                ]
            })
            .collect();

        let mut widths = headers.map(str::len);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut out = String::new();
        let line = |cells: [&str; 4]| {
            let mut line = format!("{:<w$}", cells[0], w = widths[0]);
            for (cell, width) in cells[1..].iter().zip(&widths[1..]) {
                line.push_str(&format!("  {:>w$}", cell, w = *width));
            }
            line
        };
        out.push_str(&line(headers));
        out.push('\n');
        out.push_str(&line(widths.map(|w| "-".repeat(w)).each_ref().map(String::as_str)));
        out.push('\n');
        for row in &rows {
            out.push_str(&line(row.each_ref().map(String::as_str)));
            out.push('\n');
        }
        out
    }
}

/// `h:mm:ss.mmm`
pub fn format_elapsed(secs: f64) -> String {
    let millis = (secs * 1000.0).round() as u64;
    let (hours, rest) = (millis / 3_600_000, millis % 3_600_000);
    let (minutes, rest) = (rest / 60_000, rest % 60_000);
    format!("{}:{:02}:{:02}.{:03}", hours, minutes, rest / 1000, rest % 1000)
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "#".repeat(RULE_WIDTH);
        writeln!(f, "{rule}")?;
        writeln!(f)?;
        writeln!(f, "⏱ Total time taken: {}", format_elapsed(self.elapsed_secs))?;
        writeln!(f)?;
        writeln!(f, "{rule}")?;
        writeln!(f)?;
        writeln!(f, "📊 Summary of downloaded images:")?;
        writeln!(f)?;
        write!(f, "{}", self.table())?;
        writeln!(f)?;
        write!(f, "{rule}")
    }
}
