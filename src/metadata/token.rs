//! Metadata tokens.
//!
//! A token packs a table kind into its high byte and a 1-based RID into the low 24 bits.
//! RID 0 is the nil row. ENC log and map records may additionally carry the RecId marker bit
//! (`0x8000_0000`), which is masked off when the table kind is resolved.

use std::fmt;

use crate::{metadata::tables::TableId, Result};

/// High bit used by record identifiers inside ENC log and map rows
pub const RECID_FLAG: u32 = 0x8000_0000;

/// Token type of the user-string heap
pub const USER_STRING_TOKEN_TYPE: u32 = 0x7000_0000;

/// A metadata token, `(table << 24) | rid`
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Token(pub u32);

impl Token {
    /// The nil token
    pub const NIL: Token = Token(0);

    /// Create a token from its raw value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Create a token addressing `rid` in `table`
    #[must_use]
    pub fn from_parts(table: TableId, rid: u32) -> Self {
        Token(((table as u32) << 24) | (rid & 0x00FF_FFFF))
    }

    /// Raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Table kind byte, with the RecId marker removed
    #[must_use]
    pub fn table(&self) -> u8 {
        ((self.0 & !RECID_FLAG) >> 24) as u8
    }

    /// Resolve the table kind of this token
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the table byte does not name a known table.
    pub fn table_id(&self) -> Result<TableId> {
        TableId::from_u8(self.table())
            .ok_or_else(|| malformed_error!("Token {} addresses unknown table", self))
    }

    /// The 1-based row
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// True for the nil token, or any token with RID 0
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.row() == 0
    }

    /// True if the RecId marker bit is set
    #[must_use]
    pub fn is_rec_id(&self) -> bool {
        self.0 & RECID_FLAG != 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
