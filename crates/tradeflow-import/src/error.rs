//! Error taxonomy for the import pipeline
//!
//! Row-level problems are [`FormatError`]s and never leave the worker that
//! hit them. Everything else is an [`ImportError`], which is fatal either for
//! one file or, when raised before dispatch, for the whole run.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for import operations
pub type Result<T> = std::result::Result<T, ImportError>;

/// Source column of a trade row, in file order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeField {
    ReferenceDate,
    InstrumentCode,
    UpdateAction,
    TradePrice,
    TradedQuantity,
    ClosingTime,
    DealId,
    SessionType,
    TradeDate,
    BuyerCode,
    SellerCode,
}

impl TradeField {
    /// All columns in the order they appear in the file and in the table
    pub const ALL: [TradeField; 11] = [
        TradeField::ReferenceDate,
        TradeField::InstrumentCode,
        TradeField::UpdateAction,
        TradeField::TradePrice,
        TradeField::TradedQuantity,
        TradeField::ClosingTime,
        TradeField::DealId,
        TradeField::SessionType,
        TradeField::TradeDate,
        TradeField::BuyerCode,
        TradeField::SellerCode,
    ];

    /// Destination column name
    pub fn column(&self) -> &'static str {
        match self {
            TradeField::ReferenceDate => "reference_date",
            TradeField::InstrumentCode => "instrument_code",
            TradeField::UpdateAction => "update_action",
            TradeField::TradePrice => "trade_price",
            TradeField::TradedQuantity => "traded_quantity",
            TradeField::ClosingTime => "closing_time",
            TradeField::DealId => "deal_id",
            TradeField::SessionType => "session_type",
            TradeField::TradeDate => "trade_date",
            TradeField::BuyerCode => "buyer_code",
            TradeField::SellerCode => "seller_code",
        }
    }

    /// Zero-based position in the raw row
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for TradeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// A single row failed parsing or validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("expected {expected} columns, found {found}")]
    ColumnCount { expected: usize, found: usize },

    #[error("invalid {field} '{value}': {reason}")]
    Field {
        field: TradeField,
        value: String,
        reason: String,
    },
}

impl FormatError {
    pub(crate) fn field(field: TradeField, value: &str, reason: impl Into<String>) -> Self {
        Self::Field {
            field,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Database operation that a [`ImportError::Transaction`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStage {
    Begin,
    Insert,
    Flush,
    Commit,
}

impl fmt::Display for TxStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            TxStage::Begin => "begin",
            TxStage::Insert => "insert",
            TxStage::Flush => "flush",
            TxStage::Commit => "commit",
        };
        f.write_str(stage)
    }
}

/// File- or run-level import failure
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv_async::Error,
    },

    #[error("Transaction {stage} failed: {source}")]
    Transaction {
        stage: TxStage,
        #[source]
        source: sqlx::Error,
    },

    #[error("Import deadline exceeded")]
    DeadlineExceeded,
}

impl ImportError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn tx(stage: TxStage) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Transaction { stage, source }
    }

    /// Whether this error came from the global deadline rather than the data
    pub fn is_deadline(&self) -> bool {
        matches!(self, ImportError::DeadlineExceeded)
    }
}
