use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, StoreErr};

/// One row of fixed-width numeric columns.
pub type Row = Vec<f32>;

/// The stored dataset of one repository plus the round reached by each of its sessions.
///
/// `rows` and `cols` always match the shape of `data`, every mutation goes through a
/// method that checks the incoming rows first and only then applies them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRecord")]
pub struct DatasetRecord {
    data: Vec<Row>,
    rows: usize,
    cols: usize,
    timestamp: DateTime<Utc>,
    sessions: BTreeMap<String, u64>,
}

/// The record as found on disk, before its invariants are checked.
#[derive(Deserialize)]
struct RawRecord {
    data: Vec<Row>,
    rows: usize,
    cols: usize,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    sessions: BTreeMap<String, u64>,
}

impl TryFrom<RawRecord> for DatasetRecord {
    type Error = StoreErr;

    fn try_from(raw: RawRecord) -> Result<Self> {
        let cols = width_of(&raw.data)?;

        if raw.rows != raw.data.len() || raw.cols != cols {
            return Err(StoreErr::Corrupt(format!(
                "record claims {}x{} but holds {}x{cols}",
                raw.rows,
                raw.cols,
                raw.data.len()
            )));
        }

        Ok(Self {
            data: raw.data,
            rows: raw.rows,
            cols: raw.cols,
            timestamp: raw.timestamp,
            sessions: raw.sessions,
        })
    }
}

/// Returns the common width of `data`, or the first row that breaks it.
///
/// Every value must be finite.
fn width_of(data: &[Row]) -> Result<usize> {
    let cols = data.first().map_or(0, Vec::len);

    for (row, values) in data.iter().enumerate() {
        if values.len() != cols {
            return Err(StoreErr::ShapeMismatch {
                row,
                expected: cols,
                got: values.len(),
            });
        }

        if let Some(col) = values.iter().position(|v| !v.is_finite()) {
            return Err(StoreErr::NonFiniteValue { row, col });
        }
    }

    Ok(cols)
}

impl DatasetRecord {
    /// Creates a new record with no sessions.
    ///
    /// # Arguments
    /// * `data` - The initial rows, all of the same width. May be empty.
    ///
    /// # Returns
    /// The record or `StoreErr::ShapeMismatch` for ragged data.
    pub fn new(data: Vec<Row>) -> Result<Self> {
        let cols = width_of(&data)?;

        Ok(Self {
            rows: data.len(),
            cols,
            data,
            timestamp: Utc::now(),
            sessions: BTreeMap::new(),
        })
    }

    pub fn data(&self) -> &[Row] {
        &self.data
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// When the current data was stored.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Replaces the data and refreshes the timestamp, keeping every session's round.
    ///
    /// # Arguments
    /// * `data` - The new rows, all of the same width.
    ///
    /// # Returns
    /// `StoreErr::ShapeMismatch` for ragged data, in which case nothing changes.
    pub fn replace_data(&mut self, data: Vec<Row>) -> Result<()> {
        let cols = width_of(&data)?;

        self.rows = data.len();
        self.cols = cols;
        self.data = data;
        self.timestamp = Utc::now();
        Ok(())
    }

    /// Appends rows to the dataset.
    ///
    /// An empty dataset takes its width from the first appended batch, otherwise every new
    /// row must have exactly `cols` columns.
    ///
    /// # Arguments
    /// * `rows` - The rows to append.
    ///
    /// # Returns
    /// `StoreErr::ShapeMismatch` if any row has the wrong width, in which case nothing is
    /// appended.
    pub fn append(&mut self, rows: Vec<Row>) -> Result<()> {
        let cols = width_of(&rows)?;
        if rows.is_empty() {
            return Ok(());
        }

        if self.rows > 0 && cols != self.cols {
            return Err(StoreErr::ShapeMismatch {
                row: self.rows,
                expected: self.cols,
                got: cols,
            });
        }

        self.rows += rows.len();
        self.cols = cols;
        self.data.extend(rows);
        Ok(())
    }

    /// The last completed round of a session, if the session is known.
    pub fn session_round(&self, session_id: &str) -> Option<u64> {
        self.sessions.get(session_id).copied()
    }

    pub fn sessions(&self) -> impl Iterator<Item = (&str, u64)> {
        self.sessions.iter().map(|(id, round)| (id.as_str(), *round))
    }

    /// Returns the session's last completed round, registering it at round 0 if unknown.
    pub fn ensure_session(&mut self, session_id: &str) -> u64 {
        *self.sessions.entry(session_id.to_owned()).or_insert(0)
    }

    /// Records `round` as the session's last completed round.
    ///
    /// # Arguments
    /// * `session_id` - The session, registered at round 0 if unknown.
    /// * `round` - Must be exactly one past the current round.
    ///
    /// # Returns
    /// `StoreErr::NonSequentialRound` if `round` is not the next round.
    pub fn advance_session(&mut self, session_id: &str, round: u64) -> Result<()> {
        let current = self.ensure_session(session_id);

        if current.checked_add(1) != Some(round) {
            return Err(StoreErr::NonSequentialRound {
                session_id: session_id.to_owned(),
                current,
                got: round,
            });
        }

        self.sessions.insert(session_id.to_owned(), round);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DatasetRecord {
        DatasetRecord::new(vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap()
    }

    #[test]
    fn new_derives_shape() {
        let record = sample();
        assert_eq!((record.rows(), record.cols()), (3, 2));
        assert_eq!(record.sessions().count(), 0);
    }

    #[test]
    fn new_rejects_ragged_rows() {
        let err = DatasetRecord::new(vec![vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(
            err,
            StoreErr::ShapeMismatch {
                row: 1,
                expected: 2,
                got: 1
            }
        ));
    }

    #[test]
    fn append_grows_rows_and_keeps_cols() {
        let mut record = sample();
        record.append(vec![vec![7.0, 8.0], vec![9.0, 10.0]]).unwrap();

        assert_eq!((record.rows(), record.cols()), (5, 2));
        assert_eq!(record.data().len(), 5);
        assert_eq!(record.data()[4], vec![9.0, 10.0]);
    }

    #[test]
    fn append_with_wrong_width_changes_nothing() {
        let mut record = sample();
        let before = record.clone();

        assert!(record.append(vec![vec![1.0, 2.0, 3.0]]).is_err());
        assert!(record.append(vec![vec![1.0, 2.0], vec![3.0]]).is_err());
        assert_eq!(record, before);
    }

    #[test]
    fn empty_dataset_takes_width_from_first_batch() {
        let mut record = DatasetRecord::new(Vec::new()).unwrap();
        assert_eq!((record.rows(), record.cols()), (0, 0));

        record.append(vec![vec![1.0, 2.0, 3.0]]).unwrap();
        assert_eq!((record.rows(), record.cols()), (1, 3));
    }

    #[test]
    fn sessions_start_at_zero_and_advance_by_one() {
        let mut record = sample();
        assert_eq!(record.session_round("S1"), None);
        assert_eq!(record.ensure_session("S1"), 0);
        assert_eq!(record.session_round("S1"), Some(0));

        record.advance_session("S1", 1).unwrap();
        record.advance_session("S1", 2).unwrap();
        assert_eq!(record.session_round("S1"), Some(2));

        for round in [0, 2, 4] {
            assert!(matches!(
                record.advance_session("S1", round),
                Err(StoreErr::NonSequentialRound { current: 2, .. })
            ));
        }
        assert_eq!(record.session_round("S1"), Some(2));
    }

    #[test]
    fn replace_data_keeps_sessions() {
        let mut record = sample();
        record.advance_session("S1", 1).unwrap();

        record.replace_data(vec![vec![0.0; 4]]).unwrap();
        assert_eq!((record.rows(), record.cols()), (1, 4));
        assert_eq!(record.session_round("S1"), Some(1));
    }

    #[test]
    fn deserialization_checks_shape() {
        let mut record = sample();
        record.advance_session("S1", 1).unwrap();

        let json = serde_json::to_string(&record).unwrap();
        let back: DatasetRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);

        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["rows"] = 10.into();
        assert!(serde_json::from_value::<DatasetRecord>(value).is_err());
    }

    #[test]
    fn empty_document_must_have_no_columns() {
        let empty = DatasetRecord::new(Vec::new()).unwrap();
        let mut value = serde_json::to_value(&empty).unwrap();
        assert!(serde_json::from_value::<DatasetRecord>(value.clone()).is_ok());

        value["cols"] = 3.into();
        assert!(serde_json::from_value::<DatasetRecord>(value).is_err());
    }

    #[test]
    fn non_finite_values_are_rejected() {
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            assert!(matches!(
                DatasetRecord::new(vec![vec![1.0, 2.0], vec![3.0, bad]]),
                Err(StoreErr::NonFiniteValue { row: 1, col: 1 })
            ));

            let mut record = sample();
            let before = record.clone();
            assert!(matches!(
                record.append(vec![vec![bad, 0.0]]),
                Err(StoreErr::NonFiniteValue { row: 0, col: 0 })
            ));
            assert!(record.replace_data(vec![vec![bad]]).is_err());
            assert_eq!(record, before);
        }
    }
}
