// 🧾 Revenue source schemas - table-driven column mapping per affiliate
//
// Every revenue file is described by data, not code: which workbook it lives
// in, which affiliation it pays, which columns carry the artist and the
// amount, and which descriptive columns to keep on each line item. Adding a
// source means adding a descriptor.

use crate::affiliation::Affiliation;
use crate::error::{Result, SettlementError};
use crate::store::Table;
use serde::{Deserialize, Serialize};

/// Logical field name shared by all sources for album grouping
pub const ALBUM_FIELD: &str = "album";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Logical name on the line item (e.g. "album", "service")
    pub field: String,
    /// Header text in the tab
    pub header: String,
}

impl FieldMapping {
    pub fn new(field: &str, header: &str) -> Self {
        FieldMapping {
            field: field.to_string(),
            header: header.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSchema {
    /// Stable identifier, used as the perSourceTotal key
    pub id: String,
    pub workbook: String,
    pub affiliation: Affiliation,
    pub artist_column: String,
    pub amount_column: String,
    #[serde(default)]
    pub fields: Vec<FieldMapping>,
}

/// Column indexes of a schema resolved against one tab's header
#[derive(Debug, Clone)]
pub struct ResolvedColumns {
    pub artist: usize,
    pub amount: usize,
    pub fields: Vec<(String, usize)>,
}

impl SourceSchema {
    /// Locate every mapped header; a missing one is fatal for the tab
    pub fn resolve(&self, table: &Table, tab: &str) -> Result<ResolvedColumns> {
        let find = |header: &str| {
            table.column(header).ok_or_else(|| SettlementError::MissingColumn {
                tab: format!("{}/{}", self.workbook, tab),
                header: header.to_string(),
            })
        };

        let artist = find(&self.artist_column)?;
        let amount = find(&self.amount_column)?;
        let fields = self
            .fields
            .iter()
            .map(|m| find(&m.header).map(|idx| (m.field.clone(), idx)))
            .collect::<Result<Vec<_>>>()?;

        Ok(ResolvedColumns {
            artist,
            amount,
            fields,
        })
    }

    /// Source A online revenue
    pub fn source_a() -> Self {
        SourceSchema {
            id: "source_a".to_string(),
            workbook: "source_a_revenue".to_string(),
            affiliation: Affiliation::SourceA,
            artist_column: "AlbumArtist".to_string(),
            amount_column: "RightsHolderAmount".to_string(),
            fields: vec![
                FieldMapping::new(ALBUM_FIELD, "AlbumName"),
                FieldMapping::new("major_category", "MajorCategory"),
                FieldMapping::new("middle_category", "MiddleCategory"),
                FieldMapping::new("service", "ServiceName"),
            ],
        }
    }

    /// Source B song revenue
    pub fn source_b_song() -> Self {
        SourceSchema {
            id: "source_b_song".to_string(),
            workbook: "source_b_song_revenue".to_string(),
            affiliation: Affiliation::SourceB,
            artist_column: "ArtistName".to_string(),
            amount_column: "RightsHolderAmount".to_string(),
            fields: vec![
                FieldMapping::new(ALBUM_FIELD, "AlbumName"),
                FieldMapping::new("service_region", "ServiceRegion"),
            ],
        }
    }

    /// Source B video revenue (paid in local currency)
    pub fn source_b_video() -> Self {
        SourceSchema {
            id: "source_b_video".to_string(),
            workbook: "source_b_video_revenue".to_string(),
            affiliation: Affiliation::SourceB,
            artist_column: "AlbumArtist".to_string(),
            amount_column: "RightsHolderAmountLocalCurrency".to_string(),
            fields: vec![
                FieldMapping::new(ALBUM_FIELD, "AlbumTitle"),
                FieldMapping::new("track_title", "TrackTitle"),
                FieldMapping::new("track_number", "TrackNumber"),
                FieldMapping::new("track_id", "TrackId"),
            ],
        }
    }

    pub fn defaults() -> Vec<SourceSchema> {
        vec![
            SourceSchema::source_a(),
            SourceSchema::source_b_song(),
            SourceSchema::source_b_video(),
        ]
    }
}

/// Source ids that pay a given affiliation
pub fn sources_for(schemas: &[SourceSchema], affiliation: Affiliation) -> Vec<&str> {
    schemas
        .iter()
        .filter(|s| s.affiliation == affiliation)
        .map(|s| s.id.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_columns_by_name_not_position() {
        let table = Table::from_rows(
            &[
                "ServiceName",
                "RightsHolderAmount",
                "AlbumArtist",
                "MiddleCategory",
                "AlbumName",
                "MajorCategory",
            ],
            &[],
        );
        let cols = SourceSchema::source_a().resolve(&table, "202412").unwrap();
        assert_eq!(cols.artist, 2);
        assert_eq!(cols.amount, 1);
        assert_eq!(cols.fields[0], (ALBUM_FIELD.to_string(), 4));
    }

    #[test]
    fn test_missing_column_names_header() {
        let table = Table::from_rows(&["ArtistName", "AlbumName", "ServiceRegion"], &[]);
        let err = SourceSchema::source_b_song()
            .resolve(&table, "202412")
            .unwrap_err();
        match err {
            SettlementError::MissingColumn { header, tab } => {
                assert_eq!(header, "RightsHolderAmount");
                assert_eq!(tab, "source_b_song_revenue/202412");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_two_files_back_source_b() {
        let schemas = SourceSchema::defaults();
        assert_eq!(sources_for(&schemas, Affiliation::SourceA), vec!["source_a"]);
        assert_eq!(
            sources_for(&schemas, Affiliation::SourceB),
            vec!["source_b_song", "source_b_video"]
        );
    }
}
