use strum::IntoEnumIterator;

use crate::{
    metadata::{
        heaps::{HeapKind, HeapPool},
        root::ImageBuilder,
        save::size::{RowSelection, SavePlan, StreamSource},
        tables::{TableId, TableStore},
    },
    Error, Result,
};

impl SavePlan {
    /// Produce the image this plan describes
    pub(crate) fn write(&self, store: &TableStore) -> Result<Vec<u8>> {
        let mut builder = ImageBuilder::new(&self.version);

        for stream in &self.streams {
            let out = builder.create_stream(stream.name);
            out.try_reserve_exact(stream.len)?;
            match stream.source {
                StreamSource::Tables => self.write_tables(store, out)?,
                StreamSource::Heap(kind, from) => write_heap(store, kind, from, out)?,
            }

            if out.len() > stream.len {
                return Err(Error::Overflow {
                    value: out.len() as u64,
                    width: 4,
                });
            }
            out.resize(stream.len, 0);
        }

        builder.finish()
    }

    fn write_tables(&self, store: &TableStore, out: &mut Vec<u8>) -> Result<()> {
        self.schema.write(out)?;

        for table in TableId::iter() {
            let source = store.table_def(table);
            let target = &self.defs[table.index()];
            let data = store.table(table).bytes();

            match &self.rows[table.index()] {
                RowSelection::All => out.extend_from_slice(&source.reencode_rows(data, target)?),
                RowSelection::Listed(rids) => {
                    let row_size = target.row_size as usize;
                    for rid in rids {
                        let start = out.len();
                        out.resize(start + row_size, 0);
                        source.reencode_row(store.row(table, *rid)?, target, &mut out[start..])?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn write_heap(store: &TableStore, kind: HeapKind, from: u32, out: &mut Vec<u8>) -> Result<()> {
    match kind {
        HeapKind::Strings => store.strings.save_delta(from, out),
        HeapKind::UserStrings => store.user_strings.save_delta(from, out),
        HeapKind::Guid => store.guids.save_delta(from, out),
        HeapKind::Blob => store.blobs.save_delta(from, out),
    }
}
