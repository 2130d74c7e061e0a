use strum::IntoEnumIterator;

use crate::{
    file::io::align4,
    metadata::{
        enc::{EncMapDirectory, FULL_IN_DELTA},
        heaps::{HeapKind, HeapPool},
        root::{Root, ENC_TABLES_STREAM, TABLES_STREAM},
        save::SaveMode,
        tables::{ColumnSizing, HeapSizes, Schema, TableDef, TableId, TableStore, TABLE_COUNT},
    },
    Result,
};

/// Minimal padding after the last table row
const TABLES_TAIL: usize = 2;

/// Which rows of a table go into the image
#[derive(Clone, Debug)]
pub(crate) enum RowSelection {
    /// Every row, in storage order
    All,
    /// The listed RIDs, renumbered from 1
    Listed(Vec<u32>),
}

/// What one stream of the image is filled from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StreamSource {
    /// Schema block and rows
    Tables,
    /// Heap content starting at the given offset
    Heap(HeapKind, u32),
}

#[derive(Clone, Debug)]
pub(crate) struct StreamPlan {
    pub(crate) name: &'static str,
    pub(crate) source: StreamSource,
    /// Stream length before the directory's 4-byte alignment
    pub(crate) len: usize,
}

/// Layout of an image, computed before anything is written
#[derive(Clone, Debug)]
pub(crate) struct SavePlan {
    pub(crate) schema: Schema,
    pub(crate) defs: Vec<TableDef>,
    pub(crate) rows: Vec<RowSelection>,
    pub(crate) streams: Vec<StreamPlan>,
    pub(crate) version: String,
}

impl SavePlan {
    pub(crate) fn new(store: &TableStore, mode: SaveMode) -> Result<Self> {
        let mut schema = Schema {
            heaps: HeapSizes::empty(),
            rid_bits: 0,
            ..store.schema.clone()
        };

        let rows = if mode == SaveMode::Delta {
            delta_rows(store)?
        } else {
            vec![RowSelection::All; TABLE_COUNT]
        };
        for (table, selection) in TableId::iter().zip(&rows) {
            #[allow(clippy::cast_possible_truncation)]
            let count = match selection {
                RowSelection::All => store.row_count(table),
                RowSelection::Listed(rids) => rids.len() as u32,
            };
            schema.rows[table.index()] = count;
        }
        schema.rid_bits = schema.compute_rid_bits();

        let defs = if mode == SaveMode::Delta {
            schema.heaps = HeapSizes::DELTA_ONLY
                | HeapSizes::STRINGS_WIDE
                | HeapSizes::GUID_WIDE
                | HeapSizes::BLOB_WIDE;
            TableDef::build_all(ColumnSizing::Wide, &schema)
        } else {
            schema.heaps.set(
                HeapSizes::STRINGS_WIDE,
                store.strings.aligned_size() > u32::from(u16::MAX),
            );
            schema.heaps.set(
                HeapSizes::BLOB_WIDE,
                store.blobs.aligned_size() > u32::from(u16::MAX),
            );
            schema
                .heaps
                .set(HeapSizes::GUID_WIDE, store.guids.count() > u32::from(u16::MAX));
            TableDef::build_all(ColumnSizing::Compressed, &schema)
        };
        schema
            .heaps
            .set(HeapSizes::EXTRA_DATA, schema.extra.is_some());

        let tables_len = defs
            .iter()
            .map(|def| def.row_size as usize * schema.rows[def.table.index()] as usize)
            .sum::<usize>()
            + schema.size();
        let tables = StreamPlan {
            name: if mode == SaveMode::Full {
                TABLES_STREAM
            } else {
                ENC_TABLES_STREAM
            },
            source: StreamSource::Tables,
            len: align4(tables_len + TABLES_TAIL),
        };

        let mut heaps = Vec::with_capacity(4);
        for heap in [
            heap_stream(&store.strings, mode),
            heap_stream(&store.user_strings, mode),
            heap_stream(&store.guids, mode),
            heap_stream(&store.blobs, mode),
        ]
        .into_iter()
        .flatten()
        {
            heaps.push(heap);
        }

        let mut streams = Vec::with_capacity(5);
        if store.options.string_pool_first {
            if let Some(position) = heaps
                .iter()
                .position(|stream| stream.source_kind() == Some(HeapKind::Strings))
            {
                streams.push(heaps.remove(position));
            }
        }
        streams.push(tables);
        streams.extend(heaps);

        let plan = SavePlan {
            schema,
            defs,
            rows,
            streams,
            version: store.options.runtime_version.clone(),
        };
        for stream in &plan.streams {
            log::debug!("Save {:?}: {} is {} bytes", mode, stream.name, stream.len);
        }
        Ok(plan)
    }

    /// Total image size, signature block and directory included
    pub(crate) fn size(&self) -> usize {
        Root::encoded_size(&self.version, self.streams.iter().map(|stream| stream.name))
            + self
                .streams
                .iter()
                .map(|stream| align4(stream.len))
                .sum::<usize>()
    }
}

impl StreamPlan {
    fn source_kind(&self) -> Option<HeapKind> {
        match self.source {
            StreamSource::Heap(kind, _) => Some(kind),
            StreamSource::Tables => None,
        }
    }
}

/// The stream of one heap, `None` when the heap contributes nothing
fn heap_stream(heap: &impl HeapPool, mode: SaveMode) -> Option<StreamPlan> {
    let from = match (mode, heap.kind()) {
        (SaveMode::Delta, kind) if kind != HeapKind::Guid => heap.session_start(),
        _ => 0,
    };

    let len = if from == 0 {
        if heap.is_empty() {
            return None;
        }
        align4(heap.data().len())
    } else {
        let added = heap.size().saturating_sub(from) as usize;
        if added == 0 {
            return None;
        }
        align4(added)
    };

    Some(StreamPlan {
        name: heap.kind().stream_name(),
        source: StreamSource::Heap(heap.kind(), from),
        len,
    })
}

/// Rows of a minimal delta: tables carried in full plus every row the ENC map lists
fn delta_rows(store: &TableStore) -> Result<Vec<RowSelection>> {
    let directory = EncMapDirectory::from_store(store)?;
    let mut rows = Vec::with_capacity(TABLE_COUNT);

    for table in TableId::iter() {
        if FULL_IN_DELTA.contains(&table) {
            rows.push(RowSelection::All);
            continue;
        }

        let listed = directory.rows(table);
        if let Some(missing) = listed.iter().find(|rid| **rid > store.row_count(table)) {
            return Err(malformed_error!(
                "ENC map lists {:?} row {} but the table has {} rows",
                table,
                missing,
                store.row_count(table)
            ));
        }
        rows.push(RowSelection::Listed(listed.to_vec()));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::tables::col,
        options::StoreOptions,
    };

    #[test]
    fn full_plan_uses_compressed_widths() {
        let mut store = TableStore::with_options(StoreOptions {
            large_columns: true,
            ..StoreOptions::full()
        });
        store.add_record(TableId::Module).unwrap();
        store.put_string(TableId::Module, col::module::NAME, 1, "a").unwrap();

        let plan = SavePlan::new(&store, SaveMode::Full).unwrap();
        assert!(plan.schema.heaps.is_empty());
        // Generation u16, name, mvid, enc id, enc base id
        assert_eq!(plan.defs[TableId::Module.index()].row_size, 10);
        assert_eq!(
            plan.streams.iter().map(|stream| stream.name).collect::<Vec<_>>(),
            vec!["#~", "#Strings"]
        );
    }

    #[test]
    fn tables_stream_keeps_tail_padding() {
        let store = TableStore::new();
        let plan = SavePlan::new(&store, SaveMode::Full).unwrap();
        // Empty schema is 24 bytes, plus at least two bytes of padding
        assert_eq!(plan.streams[0].len, 28);
    }

    #[test]
    fn pool_first_moves_strings() {
        let mut store = TableStore::with_options(StoreOptions {
            string_pool_first: true,
            ..StoreOptions::full()
        });
        store.add_string("first").unwrap();
        store.add_blob(&[1, 2]).unwrap();

        let plan = SavePlan::new(&store, SaveMode::Enc).unwrap();
        assert_eq!(
            plan.streams.iter().map(|stream| stream.name).collect::<Vec<_>>(),
            vec!["#Strings", "#-", "#Blob"]
        );
    }

    #[test]
    fn delta_plan_lists_mapped_rows() {
        let mut store = TableStore::with_options(StoreOptions::delta());
        store.add_record(TableId::Module).unwrap();
        for _ in 0..3 {
            store.add_record(TableId::TypeDef).unwrap();
        }
        store.checkpoint_session();
        store.create_method(2).unwrap();
        store.build_enc_map().unwrap();

        let plan = SavePlan::new(&store, SaveMode::Delta).unwrap();
        assert!(plan.schema.is_delta_only());
        assert_eq!(plan.schema.rows[TableId::TypeDef.index()], 1);
        assert_eq!(plan.schema.rows[TableId::MethodDef.index()], 1);
        assert_eq!(plan.schema.rows[TableId::Module.index()], 1);
        assert_eq!(plan.schema.rows[TableId::EncLog.index()], 2);
        assert!(plan
            .defs
            .iter()
            .all(|def| matches!(def.variable_width(), None | Some(4))));
    }
}
