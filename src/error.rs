use thiserror::Error;

use crate::metadata::tables::TableId;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants follow the failure classes of the table engine: corrupt input, values that do
/// not fit their column, merge partners that do not belong together, and policy violations while
/// emitting records. Lookups that simply find nothing never produce an error, they return `None`
/// or an empty range instead.
///
/// # Error Categories
///
/// ## Format Errors
/// - [`Error::Malformed`] - Signature, schema or stream checks failed
/// - [`Error::OutOfBounds`] - Attempted to read beyond the supplied buffer
///
/// ## Column and Sizing Errors
/// - [`Error::Overflow`] - A value does not fit its fixed-width column, or sizing overflowed
/// - [`Error::OutOfMemory`] - A reservation for row or heap storage failed
///
/// ## Store Errors
/// - [`Error::RowNotFound`] - A RID outside of the current row count was addressed
/// - [`Error::RecordOutOfOrder`] - Policy forbids creating an indirection table
/// - [`Error::ReadOnly`] - A mutation was attempted on a read-only store
///
/// ## Delta Merge Errors
/// - [`Error::VersionMismatch`] - Schema versions of base and delta differ
/// - [`Error::ModuleMismatch`] - Module identities of base and delta differ
/// - [`Error::UnexpectedFuncCode`] - Unknown ENC log function code
///
/// # Examples
///
/// ```rust,no_run
/// use mdstore::{Error, TableStore};
///
/// match TableStore::from_buffer(&[0u8; 4], false) {
///     Ok(_) => println!("loaded"),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed metadata: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The metadata is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the buffer.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// A value did not fit into a fixed-width column, or an arithmetic overflow happened
    /// while computing table or stream sizes.
    ///
    /// Kept separate from [`Error::Malformed`] so callers can decide to expand and retry.
    #[error("Value {value:#x} does not fit into {width} byte(s)")]
    Overflow {
        /// The value that was rejected
        value: u64,
        /// Width of the destination in bytes
        width: u8,
    },

    /// Growing row or heap storage failed.
    #[error("Out of memory")]
    OutOfMemory,

    /// The addressed row does not exist in the table.
    #[error("Row {rid} not found in table {table:?}")]
    RowNotFound {
        /// Table that was accessed
        table: TableId,
        /// The RID that was requested
        rid: u32,
    },

    /// Emitting this child would require an indirection table, which the configured policy
    /// forbids for this table.
    #[error("Record emitted out of order for table {0:?}")]
    RecordOutOfOrder(TableId),

    /// The store was opened read-only.
    #[error("Store is read-only")]
    ReadOnly,

    /// Base and delta carry different schema versions.
    #[error("Schema version mismatch - base {base:?}, delta {delta:?}")]
    VersionMismatch {
        /// Major and minor version of the base
        base: (u8, u8),
        /// Major and minor version of the delta
        delta: (u8, u8),
    },

    /// Base and delta describe different modules.
    #[error("Delta module identity does not match the base")]
    ModuleMismatch,

    /// An ENC log record carried an unknown function code.
    #[error("Unexpected ENC function code - {0}")]
    UnexpectedFuncCode(u32),

    /// A caller supplied argument is not acceptable.
    #[error("Invalid argument - {0}")]
    InvalidArgument(String),

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Failed to acquire a lock.
    #[error("Failed to lock target")]
    LockError,
}

impl From<std::collections::TryReserveError> for Error {
    fn from(_: std::collections::TryReserveError) -> Self {
        Error::OutOfMemory
    }
}
