use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::models::{LedgerEntry, LedgerError};
use crate::types::{Payer, Points, TransactionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum JournalOp {
    Insert,
    Update,
    Commit
}

/// One line of the journal. Columns not used by an op are left empty.
#[derive(Debug, Serialize, Deserialize)]
struct JournalRecord {
    op: JournalOp,
    id: Option<TransactionId>,
    payer: Option<Payer>,
    points: Option<Points>,
    remaining_points: Option<Points>,
    timestamp: Option<DateTime<Utc>>
}

impl JournalRecord {
    fn insert(entry: &LedgerEntry) -> Self {
        Self {
            op: JournalOp::Insert,
            id: Some(entry.id),
            payer: Some(entry.payer.clone()),
            points: Some(entry.points),
            remaining_points: Some(entry.remaining_points),
            timestamp: Some(entry.timestamp)
        }
    }

    fn update(id: TransactionId, remaining_points: Points) -> Self {
        Self {
            op: JournalOp::Update,
            id: Some(id),
            payer: None,
            points: None,
            remaining_points: Some(remaining_points),
            timestamp: None
        }
    }

    fn commit() -> Self {
        Self {
            op: JournalOp::Commit,
            id: None,
            payer: None,
            points: None,
            remaining_points: None,
            timestamp: None
        }
    }
}

/// Append-only CSV log of committed ledger writes.
///
/// Every commit is written as its `insert`/`update` lines followed by a `commit`
/// line. Lines after the last `commit` line never made it and are cut off when
/// the journal is opened.
pub struct Journal {
    file: File,
    /// Length of the file up to and including the last `commit` line.
    committed_len: u64,
    poisoned: bool
}

impl Journal {
    /// Opens the journal at `path`, creating it if needed, and returns the rows it holds.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, Vec<LedgerEntry>), LedgerError> {
        let path = path.as_ref();
        let open_error = |error: io::Error| LedgerError::storage("journal_open", format!("{}: {error}", path.display()));

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .map_err(open_error)?;

        let (entries, mut committed_len) = replay(&mut file)?;
        let file_len = file.metadata().map_err(open_error)?.len();

        if file_len > committed_len {
            warn!("Discarding [{}] bytes of uncommitted journal tail in {}", file_len - committed_len, path.display());
            file.set_len(committed_len).map_err(open_error)?;
        }

        if committed_len > 0 && !ends_with_newline(&mut file, committed_len).map_err(open_error)? {
            file.write_all(b"\n").map_err(open_error)?;
            committed_len += 1;
        }

        let journal = Self {
            file,
            committed_len,
            poisoned: false
        };

        Ok((journal, entries))
    }

    /// Durably records one commit. On failure the file is cut back to the previous commit.
    pub fn append(&mut self, inserted: &[LedgerEntry], updates: &BTreeMap<TransactionId, Points>) -> Result<(), LedgerError> {
        if self.poisoned {
            return Err(LedgerError::storage("journal_append", "journal could not be restored after an earlier failed write"));
        }

        let buffer = encode(inserted, updates)?;

        if let Err(write_error) = self.write(&buffer) {
            if let Err(truncate_error) = self.file.set_len(self.committed_len) {
                error!("Journal could not be truncated after a failed write: {truncate_error}");
                self.poisoned = true;
            }

            return Err(LedgerError::storage("journal_append", write_error.to_string()));
        }

        self.committed_len += buffer.len() as u64;

        Ok(())
    }

    fn write(&mut self, buffer: &[u8]) -> io::Result<()> {
        self.file.write_all(buffer)?;
        self.file.sync_data()
    }
}

fn encode(inserted: &[LedgerEntry], updates: &BTreeMap<TransactionId, Points>) -> Result<Vec<u8>, LedgerError> {
    let encode_error = |error: csv::Error| LedgerError::storage("journal_encode", error.to_string());

    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    for entry in inserted {
        writer.serialize(JournalRecord::insert(entry)).map_err(encode_error)?;
    }

    for (&id, &remaining_points) in updates {
        writer.serialize(JournalRecord::update(id, remaining_points)).map_err(encode_error)?;
    }

    writer.serialize(JournalRecord::commit()).map_err(encode_error)?;

    writer.into_inner()
        .map_err(|error| LedgerError::storage("journal_encode", error.to_string()))
}

fn ends_with_newline(file: &mut File, len: u64) -> io::Result<bool> {
    let mut last = [0u8; 1];

    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;

    Ok(last[0] == b'\n')
}

/// Rebuilds the committed rows and returns them with the byte length they occupy.
fn replay<R: Read>(source: R) -> Result<(Vec<LedgerEntry>, u64), LedgerError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(source);

    let mut entries = Vec::new();
    let mut pending = Vec::new();
    let mut committed_len = 0;
    let mut raw = StringRecord::new();

    loop {
        let line = reader.position().line();
        let record: Result<JournalRecord, String> = match reader.read_record(&mut raw) {
            Ok(false) => break,
            Ok(true) => raw.deserialize(None).map_err(|error| error.to_string()),
            Err(error) => Err(error.to_string())
        };

        match record {
            Ok(record) if record.op == JournalOp::Commit => {
                for record in pending.drain(..) {
                    apply(&mut entries, record)?;
                }

                committed_len = reader.position().byte();
            }
            Ok(record) => pending.push(record),
            Err(error) => {
                //NOTE: Only the last line can be torn by a crash, anything unreadable before it is corruption
                if matches!(reader.read_record(&mut raw), Ok(true)) {
                    return Err(LedgerError::storage("journal_replay", format!("line {line}: {error}")));
                }

                warn!("Ignoring torn journal line {line}: {error}");
                break;
            }
        }
    }

    if !pending.is_empty() {
        warn!("Ignoring [{}] journal records without a commit", pending.len());
    }

    Ok((entries, committed_len))
}

fn apply(entries: &mut Vec<LedgerEntry>, record: JournalRecord) -> Result<(), LedgerError> {
    let corrupt = |message: String| LedgerError::storage("journal_replay", message);

    match record.op {
        JournalOp::Insert => {
            let expected = entries.len() as TransactionId + 1;

            let (Some(id), Some(payer), Some(points), Some(timestamp)) = (record.id, record.payer, record.points, record.timestamp) else {
                return Err(corrupt(format!("insert of transaction [{expected}] is missing fields")));
            };

            if id != expected {
                return Err(corrupt(format!("insert of transaction [{id}] out of sequence, expected [{expected}]")));
            }

            let mut entry = LedgerEntry::new(id, payer, points, timestamp);
            entry.remaining_points = record.remaining_points.unwrap_or(entry.remaining_points);

            if entry.remaining_points < 0 || entry.remaining_points > entry.spendable_limit() {
                return Err(corrupt(format!("transaction [{id}] has remaining points out of range")));
            }

            entries.push(entry);
        }
        JournalOp::Update => {
            let (Some(id), Some(remaining_points)) = (record.id, record.remaining_points) else {
                return Err(corrupt("update is missing fields".to_string()));
            };

            let entry = usize::try_from(id).ok()
                .and_then(|id| id.checked_sub(1))
                .and_then(|index| entries.get_mut(index))
                .ok_or_else(|| corrupt(format!("update of unknown transaction [{id}]")))?;

            if remaining_points < 0 || remaining_points > entry.spendable_limit() {
                return Err(corrupt(format!("transaction [{id}] updated to remaining points out of range")));
            }

            entry.remaining_points = remaining_points;
        }
        JournalOp::Commit => {}
    }

    Ok(())
}
