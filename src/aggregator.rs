// 💰 Revenue Source Aggregator
//
// Reads every configured revenue tab through its schema and folds the rows
// into per-artist aggregates keyed by the normalized artist name. The map is
// owned by the aggregator and built fresh per run.

use crate::affiliation::AffiliationSet;
use crate::error::Result;
use crate::ledger::parse_number;
use crate::normalize::{is_numeric_key, is_summary_key, normalize};
use crate::sources::{sources_for, SourceSchema, ALBUM_FIELD};
use crate::store::Table;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

// ============================================================================
// LINE ITEMS + AGGREGATES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueLineItem {
    pub source: String,
    pub artist_raw: String,
    pub artist_key: String,
    pub amount: f64,
    /// Descriptive columns by logical field name; set varies per source
    pub fields: BTreeMap<String, String>,
    /// Data-row index in the source tab
    pub row: usize,
}

impl RevenueLineItem {
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(|s| s.as_str()).unwrap_or("")
    }

    pub fn album(&self) -> &str {
        self.field(ALBUM_FIELD)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtistRevenueAggregate {
    pub artist_key: String,
    pub per_source_total: BTreeMap<String, f64>,
    pub line_items: Vec<RevenueLineItem>,
}

impl ArtistRevenueAggregate {
    pub fn new(artist_key: &str) -> Self {
        ArtistRevenueAggregate {
            artist_key: artist_key.to_string(),
            ..Default::default()
        }
    }

    pub fn source_total(&self, source: &str) -> f64 {
        self.per_source_total.get(source).copied().unwrap_or(0.0)
    }

    /// Sum over the given sources; absent sources contribute 0
    pub fn total_for(&self, sources: &[&str]) -> f64 {
        sources.iter().map(|s| self.source_total(s)).sum()
    }

    /// Revenue from the sources mapped to the artist's recognized affiliations
    pub fn grand_total(&self, schemas: &[SourceSchema], affiliations: &AffiliationSet) -> f64 {
        affiliations
            .recognized
            .iter()
            .map(|aff| self.total_for(&sources_for(schemas, *aff)))
            .sum()
    }

    /// Line items belonging to the given sources, in album order
    pub fn line_items_for<'a>(&'a self, sources: &[&str]) -> Vec<&'a RevenueLineItem> {
        self.line_items
            .iter()
            .filter(|item| sources.contains(&item.source.as_str()))
            .collect()
    }

    fn push(&mut self, item: RevenueLineItem) {
        *self.per_source_total.entry(item.source.clone()).or_insert(0.0) += item.amount;
        self.line_items.push(item);
    }
}

/// Per-album subtotals in album order
pub fn album_totals<'a>(items: impl IntoIterator<Item = &'a RevenueLineItem>) -> Vec<(String, f64)> {
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for item in items {
        *totals.entry(item.album().to_string()).or_insert(0.0) += item.amount;
    }
    let mut ordered: Vec<(String, f64)> = totals.into_iter().collect();
    ordered.sort_by(|a, b| album_order(&a.0, &b.0));
    ordered
}

fn is_hangul(s: &str) -> bool {
    s.chars().any(|c| ('가'..='힣').contains(&c))
}

/// Hangul album titles first, then lexical
pub fn album_order(a: &str, b: &str) -> Ordering {
    is_hangul(b).cmp(&is_hangul(a)).then_with(|| a.cmp(b))
}

// ============================================================================
// SOURCE STATS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceStats {
    pub source: String,
    /// Data rows left after summary-row filtering
    pub raw_rows: usize,
    pub skipped_summary_rows: usize,
    pub total_amount: f64,
}

// ============================================================================
// AGGREGATOR
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct RevenueAggregation {
    pub aggregates: BTreeMap<String, ArtistRevenueAggregate>,
    pub stats: BTreeMap<String, SourceStats>,
    pub schemas: Vec<SourceSchema>,
}

impl RevenueAggregation {
    pub fn get(&self, artist_key: &str) -> Option<&ArtistRevenueAggregate> {
        self.aggregates.get(artist_key)
    }

    pub fn schema(&self, source: &str) -> Option<&SourceSchema> {
        self.schemas.iter().find(|s| s.id == source)
    }

    /// Artists with at least one row in `source`
    pub fn artists_in(&self, source: &str) -> Vec<&str> {
        self.aggregates
            .values()
            .filter(|a| a.line_items.iter().any(|i| i.source == source))
            .map(|a| a.artist_key.as_str())
            .collect()
    }

    /// Every line item of one source, in row order
    pub fn line_items_in(&self, source: &str) -> Vec<&RevenueLineItem> {
        let mut items: Vec<&RevenueLineItem> = self
            .aggregates
            .values()
            .flat_map(|a| a.line_items.iter())
            .filter(|i| i.source == source)
            .collect();
        items.sort_by_key(|i| i.row);
        items
    }
}

#[derive(Debug, Default)]
pub struct RevenueAggregator {
    aggregation: RevenueAggregation,
}

impl RevenueAggregator {
    pub fn new() -> Self {
        RevenueAggregator::default()
    }

    /// Fold one source tab into the aggregates
    pub fn ingest(&mut self, schema: &SourceSchema, table: &Table, tab: &str) -> Result<()> {
        let cols = schema.resolve(table, tab)?;
        let mut stats = SourceStats {
            source: schema.id.clone(),
            ..Default::default()
        };

        for row in 0..table.len() {
            let artist_raw = table.cell(row, cols.artist);
            let artist_key = normalize(artist_raw);
            if is_summary_key(&artist_key) || is_numeric_key(&artist_key) {
                stats.skipped_summary_rows += 1;
                continue;
            }

            let amount = parse_number(table.cell(row, cols.amount));
            let fields = cols
                .fields
                .iter()
                .map(|(name, idx)| (name.clone(), table.cell(row, *idx).trim().to_string()))
                .collect();

            stats.raw_rows += 1;
            stats.total_amount += amount;

            self.aggregation
                .aggregates
                .entry(artist_key.clone())
                .or_insert_with(|| ArtistRevenueAggregate::new(&artist_key))
                .push(RevenueLineItem {
                    source: schema.id.clone(),
                    artist_raw: artist_raw.to_string(),
                    artist_key,
                    amount,
                    fields,
                    row,
                });
        }

        self.aggregation.stats.insert(schema.id.clone(), stats);
        if !self.aggregation.schemas.iter().any(|s| s.id == schema.id) {
            self.aggregation.schemas.push(schema.clone());
        }
        Ok(())
    }

    /// Order line items by album and hand over the aggregation
    pub fn finish(mut self) -> RevenueAggregation {
        for aggregate in self.aggregation.aggregates.values_mut() {
            // stable: rows of the same album keep source/row order
            aggregate
                .line_items
                .sort_by(|a, b| album_order(a.album(), b.album()));
        }
        self.aggregation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affiliation::AffiliationVocabulary;

    fn source_a_table(rows: &[&[&str]]) -> Table {
        Table::from_rows(
            &[
                "AlbumArtist",
                "AlbumName",
                "MajorCategory",
                "MiddleCategory",
                "ServiceName",
                "RightsHolderAmount",
            ],
            rows,
        )
    }

    #[test]
    fn test_aggregate_per_artist() {
        let table = source_a_table(&[
            &["Han", "Zeta", "Stream", "Music", "Melon", "1,000"],
            &["Han\u{3000}", "가나다", "Stream", "Music", "Genie", "500"],
            &["Kim", "Alpha", "Download", "Music", "Bugs", "250.5"],
        ]);
        let mut aggregator = RevenueAggregator::new();
        aggregator
            .ingest(&SourceSchema::source_a(), &table, "202412")
            .unwrap();
        let result = aggregator.finish();

        let han = result.get("Han").unwrap();
        assert_eq!(han.source_total("source_a"), 1_500.0);
        assert_eq!(han.line_items.len(), 2);
        // Hangul album sorts first
        assert_eq!(han.line_items[0].album(), "가나다");
        assert_eq!(han.line_items[0].field("service"), "Genie");

        assert_eq!(result.get("Kim").unwrap().source_total("source_a"), 250.5);
        assert_eq!(result.stats["source_a"].raw_rows, 3);
    }

    #[test]
    fn test_summary_rows_excluded() {
        let table = source_a_table(&[
            &["Han", "Zeta", "", "", "", "100"],
            &["총계", "", "", "", "", "99,999,999"],
            &["", "", "", "", "", "5"],
            &["17", "", "", "", "", "5"],
        ]);
        let mut aggregator = RevenueAggregator::new();
        aggregator
            .ingest(&SourceSchema::source_a(), &table, "202412")
            .unwrap();
        let result = aggregator.finish();

        assert!(result.get("총계").is_none());
        assert_eq!(result.aggregates.len(), 1);
        assert_eq!(result.stats["source_a"].raw_rows, 1);
        assert_eq!(result.stats["source_a"].skipped_summary_rows, 3);
    }

    #[test]
    fn test_two_files_sum_into_one_affiliation() {
        let song = Table::from_rows(
            &["ArtistName", "AlbumName", "ServiceRegion", "RightsHolderAmount"],
            &[&["Kim", "Alpha", "KR", "300"]],
        );
        let video = Table::from_rows(
            &[
                "AlbumArtist",
                "AlbumTitle",
                "TrackTitle",
                "TrackNumber",
                "TrackId",
                "RightsHolderAmountLocalCurrency",
            ],
            &[&["Kim", "Alpha", "Intro", "1", "T-1", "200"]],
        );

        let mut aggregator = RevenueAggregator::new();
        aggregator
            .ingest(&SourceSchema::source_b_song(), &song, "202412")
            .unwrap();
        aggregator
            .ingest(&SourceSchema::source_b_video(), &video, "202412")
            .unwrap();
        let result = aggregator.finish();

        let kim = result.get("Kim").unwrap();
        let b_only = AffiliationVocabulary::default().parse("B");
        let a_only = AffiliationVocabulary::default().parse("A");
        assert_eq!(kim.grand_total(&result.schemas, &b_only), 500.0);
        assert_eq!(kim.grand_total(&result.schemas, &a_only), 0.0);
        assert_eq!(kim.line_items[1].field("track_id"), "T-1");
    }

    #[test]
    fn test_album_totals_ordering() {
        let table = source_a_table(&[
            &["Han", "Beta", "", "", "", "10"],
            &["Han", "Alpha", "", "", "", "5"],
            &["Han", "하늘", "", "", "", "1"],
            &["Han", "Beta", "", "", "", "10"],
        ]);
        let mut aggregator = RevenueAggregator::new();
        aggregator
            .ingest(&SourceSchema::source_a(), &table, "202412")
            .unwrap();
        let result = aggregator.finish();

        let totals = album_totals(&result.get("Han").unwrap().line_items);
        assert_eq!(
            totals,
            vec![
                ("하늘".to_string(), 1.0),
                ("Alpha".to_string(), 5.0),
                ("Beta".to_string(), 20.0),
            ]
        );
    }
}
