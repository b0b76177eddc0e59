// 📄 Report rendering boundary
//
// The renderer receives finished numbers and paints them; it performs no
// business computation beyond grouping line items for display and rounding
// to whole currency units. JsonReportRenderer writes one document per
// artist; the spreadsheet painter used in production implements the same
// trait outside this crate.

use crate::aggregator::{album_totals, RevenueLineItem};
use crate::error::{Result, SettlementError};
use crate::period::Period;
use crate::settlement::SettlementResult;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

// ============================================================================
// DOCUMENT MODEL
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub source: String,
    pub album: String,
    pub fields: BTreeMap<String, String>,
    pub period_label: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumLine {
    pub album: String,
    pub period_label: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeductionSection {
    pub albums: String,
    pub cost_balance: i64,
    pub deduction: i64,
    pub remaining_balance: i64,
    pub revenue_after_deduction: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareSection {
    pub albums: String,
    pub rate_label: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementDocument {
    pub artist: String,
    pub period: Period,
    pub period_label: String,
    pub issued_on: NaiveDate,
    pub lines: Vec<DocumentLine>,
    pub lines_total: i64,
    pub albums: Vec<AlbumLine>,
    pub albums_total: i64,
    pub deduction: DeductionSection,
    pub share: ShareSection,
    pub total_settlement: i64,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDocument {
    pub artist_key: String,
    pub period: Period,
    /// Where the document was written, if anywhere
    pub location: Option<PathBuf>,
    pub document: SettlementDocument,
}

/// Whole currency units, half away from zero
pub fn round_currency(amount: f64) -> i64 {
    amount.round() as i64
}

/// "₩1,234,567"
pub fn format_currency(amount: f64) -> String {
    let rounded = round_currency(amount);
    let digits = rounded.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if rounded < 0 { "-" } else { "" };
    format!("{}₩{}", sign, grouped)
}

/// Assemble the document sections from computed values
pub fn build_document(
    artist_key: &str,
    period: Period,
    issued_on: NaiveDate,
    line_items: &[&RevenueLineItem],
    result: &SettlementResult,
) -> SettlementDocument {
    let period_label = period.label();

    let lines: Vec<DocumentLine> = line_items
        .iter()
        .map(|item| DocumentLine {
            source: item.source.clone(),
            album: item.album().to_string(),
            fields: item.fields.clone(),
            period_label: period_label.clone(),
            amount: round_currency(item.amount),
        })
        .collect();
    let lines_total: f64 = line_items.iter().map(|i| i.amount).sum();

    let album_sums = album_totals(line_items.iter().copied());
    let album_names: Vec<&str> = album_sums.iter().map(|(a, _)| a.as_str()).collect();
    let albums_label = if album_names.is_empty() {
        "(no album)".to_string()
    } else {
        album_names.join(", ")
    };
    let albums: Vec<AlbumLine> = album_sums
        .iter()
        .map(|(album, amount)| AlbumLine {
            album: album.clone(),
            period_label: period_label.clone(),
            amount: round_currency(*amount),
        })
        .collect();

    SettlementDocument {
        artist: artist_key.to_string(),
        period,
        period_label,
        issued_on,
        lines,
        lines_total: round_currency(lines_total),
        albums,
        albums_total: round_currency(album_sums.iter().map(|(_, a)| a).sum()),
        deduction: DeductionSection {
            albums: albums_label.clone(),
            cost_balance: round_currency(result.available_balance),
            deduction: round_currency(result.deduction_applied),
            remaining_balance: round_currency(result.remaining_carry_forward),
            revenue_after_deduction: round_currency(result.post_deduction_revenue),
        },
        share: ShareSection {
            albums: albums_label,
            rate_label: format!("{}%", result.rate),
            amount: round_currency(result.net_settlement_amount),
        },
        total_settlement: round_currency(result.net_settlement_amount),
        note: "VAT excluded".to_string(),
    }
}

// ============================================================================
// RENDERERS
// ============================================================================

pub trait ReportRenderer {
    fn render(
        &mut self,
        artist_key: &str,
        period: Period,
        line_items: &[&RevenueLineItem],
        result: &SettlementResult,
    ) -> Result<RenderedDocument>;
}

/// Writes <dir>/<period>/<artist>.json
pub struct JsonReportRenderer {
    dir: PathBuf,
    issued_on: NaiveDate,
}

impl JsonReportRenderer {
    pub fn new(dir: impl Into<PathBuf>, issued_on: NaiveDate) -> Self {
        JsonReportRenderer {
            dir: dir.into(),
            issued_on,
        }
    }

    /// Artist names become file names; keep them path-safe
    fn file_name(artist_key: &str) -> String {
        let safe: String = artist_key
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                other => other,
            })
            .collect();
        format!("{}.json", safe)
    }
}

impl ReportRenderer for JsonReportRenderer {
    fn render(
        &mut self,
        artist_key: &str,
        period: Period,
        line_items: &[&RevenueLineItem],
        result: &SettlementResult,
    ) -> Result<RenderedDocument> {
        let document = build_document(artist_key, period, self.issued_on, line_items, result);

        let dir = self.dir.join(period.to_string());
        fs::create_dir_all(&dir)?;
        let path = dir.join(Self::file_name(artist_key));
        let json = serde_json::to_string_pretty(&document).map_err(|e| SettlementError::Render {
            artist: artist_key.to_string(),
            message: e.to_string(),
        })?;
        fs::write(&path, json)?;

        Ok(RenderedDocument {
            artist_key: artist_key.to_string(),
            period,
            location: Some(path),
            document,
        })
    }
}

/// Keeps documents in memory (tests, dry runs)
#[derive(Debug, Default)]
pub struct MemoryRenderer {
    pub issued_on: NaiveDate,
    pub documents: Vec<RenderedDocument>,
}

impl MemoryRenderer {
    pub fn new(issued_on: NaiveDate) -> Self {
        MemoryRenderer {
            issued_on,
            documents: Vec::new(),
        }
    }

    pub fn document(&self, artist_key: &str) -> Option<&SettlementDocument> {
        self.documents
            .iter()
            .rev()
            .find(|d| d.artist_key == artist_key)
            .map(|d| &d.document)
    }
}

impl ReportRenderer for MemoryRenderer {
    fn render(
        &mut self,
        artist_key: &str,
        period: Period,
        line_items: &[&RevenueLineItem],
        result: &SettlementResult,
    ) -> Result<RenderedDocument> {
        let rendered = RenderedDocument {
            artist_key: artist_key.to_string(),
            period,
            location: None,
            document: build_document(artist_key, period, self.issued_on, line_items, result),
        };
        self.documents.push(rendered.clone());
        Ok(rendered)
    }
}
