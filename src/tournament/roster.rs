//! Entrant Roster Loading
//!
//! The marketplace listing API that supplies token metadata lives outside
//! this crate; it is consumed through the [`EntrantSource`] seam as a
//! sequence of batches. A failed batch is skipped and logged, never retried
//! within the same initialization attempt. Initialization only proceeds if
//! at least two usable entrants survive.

use std::fs;
use std::path::PathBuf;

use serde::{Serialize, Deserialize};
use tracing::{info, warn};

use crate::tournament::entrant::Entrant;

/// Minimum entrants required to build a bracket.
pub const MIN_ENTRANTS: usize = 2;

/// Raw token metadata as returned by a listing batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntrantRecord {
    /// Display name.
    pub name: String,
    /// NFT mint address. Records without one are unusable.
    #[serde(default)]
    pub mint: String,
    /// Image URI.
    #[serde(default)]
    pub image: String,
}

/// Roster loading errors.
#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    /// A single batch could not be fetched or parsed. Skippable.
    #[error("Batch {page} failed: {reason}")]
    BatchFailed {
        /// Zero-based batch index.
        page: usize,
        /// What went wrong.
        reason: String,
    },

    /// Fewer than [`MIN_ENTRANTS`] usable entrants in the whole listing.
    #[error("Insufficient entrants: found {found}, need at least {MIN_ENTRANTS}")]
    InsufficientEntrants {
        /// Usable entrants found.
        found: usize,
    },

    /// The roster file itself could not be opened.
    #[error("Roster unavailable: {0}")]
    Unavailable(#[from] std::io::Error),
}

/// A paginated source of entrant metadata.
///
/// Implementations yield batches until exhausted (`Ok(None)`). A batch-level
/// failure is reported as `Err` and the caller moves on to the next batch.
pub trait EntrantSource {
    /// Fetch the next batch of records, or `None` when the listing is done.
    fn next_batch(&mut self) -> Result<Option<Vec<EntrantRecord>>, RosterError>;
}

/// Drain an [`EntrantSource`] into a usable entrant list.
///
/// Failed batches and records without a mint are skipped with a warning.
/// Errors with [`RosterError::InsufficientEntrants`] if fewer than two
/// usable entrants remain, in which case no tournament is created.
pub fn load_roster<S: EntrantSource>(source: &mut S) -> Result<Vec<Entrant>, RosterError> {
    let mut entrants = Vec::new();
    let mut skipped_batches = 0usize;
    let mut page = 0usize;

    loop {
        match source.next_batch() {
            Ok(Some(records)) => {
                for record in records {
                    if record.mint.is_empty() {
                        warn!("Skipping entrant '{}' with no mint", record.name);
                        continue;
                    }
                    let id = entrants.len() as u32;
                    entrants.push(Entrant::new(id, record.name, record.mint, record.image));
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Skipping batch {}: {}", page, e);
                skipped_batches += 1;
            }
        }
        page += 1;
    }

    if entrants.len() < MIN_ENTRANTS {
        return Err(RosterError::InsufficientEntrants {
            found: entrants.len(),
        });
    }

    info!(
        "Loaded {} entrants ({} batches skipped)",
        entrants.len(),
        skipped_batches
    );

    Ok(entrants)
}

/// File-backed entrant source.
///
/// Reads a JSON array of [`EntrantRecord`] and serves it in fixed-size
/// pages, mimicking the paginated listing API the production fetcher talks
/// to.
pub struct FileRoster {
    records: Vec<EntrantRecord>,
    page_size: usize,
    cursor: usize,
}

impl FileRoster {
    /// Default page size, matching the listing API's batch limit.
    pub const PAGE_SIZE: usize = 20;

    /// Open a roster file.
    pub fn open(path: PathBuf) -> Result<Self, RosterError> {
        let raw = fs::read_to_string(&path)?;
        let records: Vec<EntrantRecord> = serde_json::from_str(&raw).map_err(|e| {
            RosterError::BatchFailed {
                page: 0,
                reason: format!("invalid roster file {}: {}", path.display(), e),
            }
        })?;

        Ok(Self {
            records,
            page_size: Self::PAGE_SIZE,
            cursor: 0,
        })
    }

    /// Build a roster directly from records (tests, fixtures).
    pub fn from_records(records: Vec<EntrantRecord>, page_size: usize) -> Self {
        Self {
            records,
            page_size: page_size.max(1),
            cursor: 0,
        }
    }
}

impl EntrantSource for FileRoster {
    fn next_batch(&mut self) -> Result<Option<Vec<EntrantRecord>>, RosterError> {
        if self.cursor >= self.records.len() {
            return Ok(None);
        }
        let end = (self.cursor + self.page_size).min(self.records.len());
        let batch = self.records[self.cursor..end].to_vec();
        self.cursor = end;
        Ok(Some(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, mint: &str) -> EntrantRecord {
        EntrantRecord {
            name: name.to_string(),
            mint: mint.to_string(),
            image: String::new(),
        }
    }

    /// Source that fails on designated pages.
    struct FlakySource {
        pages: Vec<Result<Vec<EntrantRecord>, String>>,
        cursor: usize,
    }

    impl EntrantSource for FlakySource {
        fn next_batch(&mut self) -> Result<Option<Vec<EntrantRecord>>, RosterError> {
            if self.cursor >= self.pages.len() {
                return Ok(None);
            }
            let page = self.cursor;
            self.cursor += 1;
            match &self.pages[page] {
                Ok(records) => Ok(Some(records.clone())),
                Err(reason) => Err(RosterError::BatchFailed {
                    page,
                    reason: reason.clone(),
                }),
            }
        }
    }

    #[test]
    fn test_load_roster_assigns_sequential_ids() {
        let mut source = FileRoster::from_records(
            vec![record("A", "m1"), record("B", "m2"), record("C", "m3")],
            2,
        );

        let entrants = load_roster(&mut source).unwrap();
        assert_eq!(entrants.len(), 3);
        let ids: Vec<u32> = entrants.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_failed_batch_is_skipped_not_fatal() {
        let mut source = FlakySource {
            pages: vec![
                Ok(vec![record("A", "m1")]),
                Err("listing timeout".to_string()),
                Ok(vec![record("B", "m2"), record("C", "m3")]),
            ],
            cursor: 0,
        };

        let entrants = load_roster(&mut source).unwrap();
        assert_eq!(entrants.len(), 3);
    }

    #[test]
    fn test_mintless_records_skipped() {
        let mut source = FileRoster::from_records(
            vec![record("A", "m1"), record("ghost", ""), record("B", "m2")],
            10,
        );

        let entrants = load_roster(&mut source).unwrap();
        assert_eq!(entrants.len(), 2);
        assert!(entrants.iter().all(|e| !e.mint.is_empty()));
    }

    #[test]
    fn test_insufficient_entrants() {
        let mut source = FileRoster::from_records(vec![record("A", "m1")], 10);

        let err = load_roster(&mut source).unwrap_err();
        assert!(matches!(err, RosterError::InsufficientEntrants { found: 1 }));
    }

    #[test]
    fn test_all_batches_failed_is_insufficient() {
        let mut source = FlakySource {
            pages: vec![Err("down".into()), Err("down".into())],
            cursor: 0,
        };

        let err = load_roster(&mut source).unwrap_err();
        assert!(matches!(err, RosterError::InsufficientEntrants { found: 0 }));
    }
}
