//! Plain-text reports for chat replies.
//!
//! Tables are padded to the widest cell per column and separated by two
//! spaces, so they read correctly in a monospace chat client.

use std::fmt::Write as _;

use crate::campaign::Spend;
use crate::cents::Cents;
use crate::keyword::WordSet;
use crate::ledger::{LedgerEntry, SYSTEM};
use crate::scoreboard::{Metrics, ScoreboardEntry};

const KEYWORDS_WIDTH: usize = 50;

/// Render `rows` under `headers` with every column left-aligned.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            let len = cell.chars().count();
            if i < widths.len() && len > widths[i] {
                widths[i] = len;
            }
        }
    }

    let mut out = String::new();
    let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    push_row(&mut out, &header_cells, &widths);
    for row in rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row(out: &mut String, cells: &[String], widths: &[usize]) {
    let mut line = String::new();
    for (i, width) in widths.iter().enumerate() {
        let cell = cells.get(i).map(String::as_str).unwrap_or("");
        if i > 0 {
            line.push_str("  ");
        }
        let _ = write!(line, "{cell:<width$}");
    }
    out.push_str(line.trim_end());
    out.push('\n');
}

/// Comma-joined keywords, cut at 50 characters.
pub fn format_keywords(keywords: &WordSet) -> String {
    let joined = keywords.iter().collect::<Vec<_>>().join(",");
    if joined.chars().count() > KEYWORDS_WIDTH {
        let cut: String = joined.chars().take(KEYWORDS_WIDTH).collect();
        format!("{cut}...")
    } else {
        joined
    }
}

pub fn ledger_report(account: &str, entries: &[LedgerEntry]) -> String {
    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|entry| {
            vec![
                entry.txid.to_string(),
                entry.from.clone(),
                entry.to.clone(),
                entry.memo.clone(),
                entry.amount.to_string(),
                entry.balance.to_string(),
            ]
        })
        .collect();
    format!(
        "ledger for {account}:\n{}",
        render_table(&["ID", "From", "To", "Memo", "Amount", "Balance"], &rows)
    )
}

/// One owner's spends.
pub fn campaigns_report(owner: &str, spends: &[Spend]) -> String {
    let rows: Vec<Vec<String>> = spends
        .iter()
        .map(|spend| {
            vec![
                spend.creative.clone(),
                spend.max_bid.to_string(),
                format_keywords(&spend.keywords),
            ]
        })
        .collect();
    format!(
        "{owner} campaigns\n{}",
        render_table(&["Creative", "Max Bid", "Keywords"], &rows)
    )
}

/// Every spend in the global index.
pub fn all_campaigns_report(spends: &[Spend]) -> String {
    let rows: Vec<Vec<String>> = spends
        .iter()
        .map(|spend| {
            vec![
                spend.owner.clone(),
                spend.creative.clone(),
                spend.max_bid.to_string(),
                format_keywords(&spend.keywords),
            ]
        })
        .collect();
    format!(
        "all campaigns:\n{}",
        render_table(&["Account", "Creative", "Max Bid", "Keywords"], &rows)
    )
}

pub fn scoreboard_report(entries: &[ScoreboardEntry]) -> String {
    let rows: Vec<Vec<String>> = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            vec![
                (i + 1).to_string(),
                entry.nick.clone(),
                entry.metrics.impressions.to_string(),
                entry.metrics.amount_spent.to_string(),
            ]
        })
        .collect();
    format!(
        "top scores:\n{}",
        render_table(&["Rank", "User", "Impressions", "Amount Spent"], &rows)
    )
}

/// Counters for one account. The system record reports revenue (spend net
/// of house ads) instead of total spend.
pub fn stats_report(account: &str, metrics: &Metrics) -> String {
    let mut rows = vec![
        vec![
            "Ads displayed:".to_string(),
            metrics.ads_displayed.to_string(),
        ],
        vec!["Impressions:".to_string(), metrics.impressions.to_string()],
    ];
    if account == SYSTEM {
        rows.push(vec![
            "Total revenue:".to_string(),
            metrics.revenue().to_string(),
        ]);
    } else {
        rows.push(vec![
            "Total spent:".to_string(),
            metrics.amount_spent.to_string(),
        ]);
    }
    if let Some(cpi) = metrics.cost_per_impression() {
        rows.push(vec![
            "CPI:".to_string(),
            Cents::from_f64_rounded(cpi).to_string(),
        ]);
    }
    let table = render_table(&["", ""], &rows);
    // The header row is blank; drop it.
    let body = table.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
    format!("stats for {account}:\n{body}")
}
