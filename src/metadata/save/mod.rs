//! Serialization of a [`TableStore`] into a metadata image.
//!
//! Saving runs in two phases. Pre-save normalization brings the tables into the shape the
//! chosen [`SaveMode`] requires: a full save eliminates indirection tables, folds member
//! references into definitions and sorts every keyed table, reporting each moved row to the
//! remap listener. ENC and delta saves never move a row. The second phase plans the streams,
//! picks column widths and writes the image.
//!
//! [`TableStore::get_save_size`] and [`TableStore::save`] share one plan. The size of a full
//! save is cached until the next mutation; ENC and delta sizes are recomputed every time.
//!
//! # Examples
//!
//! ```rust
//! use mdstore::{metadata::tables::{col, TableId}, SaveMode, TableStore};
//!
//! let mut store = TableStore::new();
//! let rid = store.add_record(TableId::Module)?;
//! store.put_string(TableId::Module, col::module::NAME, rid, "app.dll")?;
//!
//! let size = store.get_save_size(SaveMode::Full)?;
//! let image = store.save(SaveMode::Full)?;
//! assert_eq!(image.len(), size as usize);
//!
//! let loaded = TableStore::from_buffer(&image, true)?;
//! assert_eq!(loaded.get_string(TableId::Module, col::module::NAME, 1)?, "app.dll");
//! # Ok::<(), mdstore::Error>(())
//! ```

mod presave;
mod size;
mod writer;

use std::io::Write;

use crate::{metadata::tables::TableStore, Error, Result};

pub(crate) use size::SavePlan;

/// What a save produces
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SaveMode {
    /// A compact, sorted image without indirection tables. Rows may move.
    Full,
    /// A complete image that keeps every token stable, written as an `#-` stream
    Enc,
    /// A minimal delta: the rows listed in the ENC map and the heap bytes added in the
    /// current session
    Delta,
}

impl TableStore {
    /// Size in bytes of the image [`TableStore::save`] would produce for `mode`.
    ///
    /// Runs the pre-save normalization of `mode` on writable stores, so rows may move and the
    /// remap listener may be called.
    ///
    /// # Errors
    /// Returns the errors of pre-save normalization, [`crate::Error::Malformed`] if the ENC
    /// map lists a missing row, or [`crate::Error::Overflow`] if the image exceeds 4 GiB.
    pub fn get_save_size(&mut self, mode: SaveMode) -> Result<u32> {
        if let Some((cached, size)) = self.save_size {
            if cached == mode && mode == SaveMode::Full {
                return Ok(size);
            }
        }

        if !self.read_only {
            self.presave(mode)?;
        }
        let plan = SavePlan::new(self, mode)?;
        let size = plan.size();
        let Ok(size) = u32::try_from(size) else {
            return Err(Error::Overflow {
                value: size as u64,
                width: 4,
            });
        };

        if mode == SaveMode::Full {
            self.save_size = Some((mode, size));
        }
        Ok(size)
    }

    /// Serialize the store into a new buffer
    ///
    /// # Errors
    /// See [`TableStore::get_save_size`].
    pub fn save(&mut self, mode: SaveMode) -> Result<Vec<u8>> {
        let expected = self.get_save_size(mode)?;
        let image = SavePlan::new(self, mode)?.write(self)?;
        debug_assert_eq!(image.len(), expected as usize, "save size does not match the image");
        Ok(image)
    }

    /// Serialize the store into `out`
    ///
    /// # Errors
    /// See [`TableStore::get_save_size`]; write failures are returned as
    /// [`crate::Error::FileError`].
    pub fn save_to_stream(&mut self, mode: SaveMode, out: &mut impl Write) -> Result<()> {
        let image = self.save(mode)?;
        out.write_all(&image)?;
        Ok(())
    }
}
