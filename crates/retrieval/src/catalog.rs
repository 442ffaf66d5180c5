//! Catalog loading
//!
//! The source catalog is a delimited text file with a header row. Five
//! columns are required; anything else is carried through to the index
//! payload unmodified so the transport layer can echo it back.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use crate::RetrievalError;

/// Required catalog columns
pub mod columns {
    pub const SERVICE_NAME: &str = "service_name";
    pub const TAGS: &str = "tags";
    pub const SUPPORT: &str = "support";
    pub const REQUIREMENT: &str = "requirement";
    pub const URL: &str = "url";
    /// Optional; falls back to the service name when absent
    pub const SERVICE_ID: &str = "service_id";

    pub const REQUIRED: [&str; 5] = [SERVICE_NAME, TAGS, SUPPORT, REQUIREMENT, URL];
}

/// One row of the source catalog
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogRecord {
    /// Stable identifier; defaults to the name when the catalog has no id column
    pub service_id: String,
    pub service_name: String,
    /// Comma-separated tag list as it appears in the source
    pub tags: String,
    /// Support/benefit description
    pub support: String,
    /// Requirement description
    pub requirement: String,
    /// Source URL
    pub url: String,
    /// Pass-through columns, keyed by header name
    pub extra: BTreeMap<String, String>,
}

impl CatalogRecord {
    /// Embedding input: (name + tags) repeated three times, then the
    /// support text, whitespace-normalized. The repetition biases the
    /// vector toward literal name/tag matches over free-text overlap.
    pub fn composed_text(&self) -> String {
        let name_plus_tags = format!("{} {}", self.service_name, self.tags);
        let weighted = format!(
            "{} {} {} {}",
            name_plus_tags, name_plus_tags, name_plus_tags, self.support
        );
        normalize_whitespace(&weighted)
    }

    /// Tags split back into an ordered list
    pub fn tag_list(&self) -> Vec<String> {
        split_tags(&self.tags)
    }
}

/// Split a comma-separated tag field into trimmed, non-empty entries
pub fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The loaded catalog
#[derive(Debug, Clone)]
pub struct Catalog {
    records: Vec<CatalogRecord>,
}

impl Catalog {
    pub fn new(records: Vec<CatalogRecord>) -> Self {
        Self { records }
    }

    /// Load the catalog from a delimited file
    ///
    /// A missing file is a configuration error; missing required columns
    /// are a schema error. Both are fatal at startup.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RetrievalError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RetrievalError::Configuration(format!(
                "catalog file not found: {}",
                path.display()
            )));
        }

        let file = std::fs::File::open(path).map_err(|e| {
            RetrievalError::Configuration(format!("failed to open {}: {}", path.display(), e))
        })?;

        let catalog = Self::from_reader(file)?;
        tracing::info!(
            path = %path.display(),
            records = catalog.len(),
            "Loaded catalog"
        );
        Ok(catalog)
    }

    /// Parse catalog rows from any reader
    pub fn from_reader(reader: impl Read) -> Result<Self, RetrievalError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()
            .map_err(|e| RetrievalError::Schema(format!("failed to read header row: {}", e)))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let missing: Vec<&str> = columns::REQUIRED
            .iter()
            .copied()
            .filter(|required| !headers.iter().any(|h| h == required))
            .collect();
        if !missing.is_empty() {
            return Err(RetrievalError::Schema(format!(
                "catalog is missing required columns: {}",
                missing.join(", ")
            )));
        }

        let col = |name: &str| headers.iter().position(|h| h == name);
        let name_idx = col(columns::SERVICE_NAME).expect("checked above");
        let tags_idx = col(columns::TAGS).expect("checked above");
        let support_idx = col(columns::SUPPORT).expect("checked above");
        let requirement_idx = col(columns::REQUIREMENT).expect("checked above");
        let url_idx = col(columns::URL).expect("checked above");
        let id_idx = col(columns::SERVICE_ID);

        let known = [
            Some(name_idx),
            Some(tags_idx),
            Some(support_idx),
            Some(requirement_idx),
            Some(url_idx),
            id_idx,
        ];

        let mut records = Vec::new();
        for (row_num, row) in csv_reader.records().enumerate() {
            let row = row.map_err(|e| {
                RetrievalError::Schema(format!("failed to parse row {}: {}", row_num + 2, e))
            })?;

            // Short rows are padded with empty strings, matching how the
            // catalog exporter leaves trailing cells blank.
            let field = |idx: usize| row.get(idx).unwrap_or("").trim().to_string();

            let service_name = field(name_idx);
            let service_id = match id_idx {
                Some(idx) if !field(idx).is_empty() => field(idx),
                _ => service_name.clone(),
            };

            let extra: BTreeMap<String, String> = headers
                .iter()
                .enumerate()
                .filter(|(idx, _)| !known.contains(&Some(*idx)))
                .map(|(idx, header)| (header.clone(), field(idx)))
                .collect();

            records.push(CatalogRecord {
                service_id,
                service_name,
                tags: field(tags_idx),
                support: field(support_idx),
                requirement: field(requirement_idx),
                url: field(url_idx),
                extra,
            });
        }

        Ok(Self { records })
    }

    pub fn records(&self) -> &[CatalogRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Content fingerprint over every field of every record, in row order.
    ///
    /// Used to name the persisted index collection, so it must be stable
    /// across processes and compiler versions; FNV-1a rather than the
    /// randomized std hasher.
    pub fn fingerprint(&self) -> u64 {
        const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

        let mut hash = FNV_OFFSET;
        let mut feed = |text: &str| {
            for byte in text.as_bytes() {
                hash ^= u64::from(*byte);
                hash = hash.wrapping_mul(FNV_PRIME);
            }
            // Field separator so ("ab","c") and ("a","bc") differ
            hash ^= 0x1f;
            hash = hash.wrapping_mul(FNV_PRIME);
        };

        for record in &self.records {
            feed(&record.service_id);
            feed(&record.service_name);
            feed(&record.tags);
            feed(&record.support);
            feed(&record.requirement);
            feed(&record.url);
            for (key, value) in &record.extra {
                feed(key);
                feed(value);
            }
        }
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
service_name,tags,support,requirement,url,contact
Youth Housing Support,\"housing, youth\",Monthly rent subsidy of 200000 won,Age 19-34,https://example.org/youth,1350
Small Business Grant,\"business, startup\",One-time grant up to 5M won,Registered business,https://example.org/biz,1357
";

    #[test]
    fn test_load_from_reader() {
        let catalog = Catalog::from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(catalog.len(), 2);

        let first = &catalog.records()[0];
        assert_eq!(first.service_name, "Youth Housing Support");
        assert_eq!(first.service_id, "Youth Housing Support");
        assert_eq!(first.tag_list(), vec!["housing", "youth"]);
        assert_eq!(first.extra.get("contact").map(String::as_str), Some("1350"));
    }

    #[test]
    fn test_missing_columns_is_schema_error() {
        let bad = "service_name,support\nA,B\n";
        let err = Catalog::from_reader(bad.as_bytes()).unwrap_err();
        match err {
            RetrievalError::Schema(msg) => {
                assert!(msg.contains("tags"));
                assert!(msg.contains("url"));
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = Catalog::from_path("/nonexistent/catalog.csv").unwrap_err();
        assert!(matches!(err, RetrievalError::Configuration(_)));
    }

    #[test]
    fn test_composed_text_weighting() {
        let catalog = Catalog::from_reader(SAMPLE.as_bytes()).unwrap();
        let composed = catalog.records()[0].composed_text();

        assert_eq!(composed.matches("Youth Housing Support").count(), 3);
        assert_eq!(composed.matches("Monthly rent subsidy").count(), 1);
        // Whitespace normalized: no doubled spaces survive
        assert!(!composed.contains("  "));
    }

    #[test]
    fn test_explicit_service_id_column() {
        let with_id = "\
service_id,service_name,tags,support,requirement,url
SVC-001,Youth Housing Support,housing,Rent subsidy,Age 19-34,https://example.org
";
        let catalog = Catalog::from_reader(with_id.as_bytes()).unwrap();
        assert_eq!(catalog.records()[0].service_id, "SVC-001");
        assert!(catalog.records()[0].extra.is_empty());
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = Catalog::from_reader(SAMPLE.as_bytes()).unwrap();
        let b = Catalog::from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let changed = SAMPLE.replace("200000", "250000");
        let c = Catalog::from_reader(changed.as_bytes()).unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_short_rows_padded() {
        let short = "service_name,tags,support,requirement,url\nSolo Service,alone\n";
        let catalog = Catalog::from_reader(short.as_bytes()).unwrap();
        assert_eq!(catalog.records()[0].support, "");
        assert_eq!(catalog.records()[0].url, "");
    }
}
