//! Indirection table integration tests.
//!
//! Children added out of order go through the Ptr tables; a full save folds them back into
//! physical order and reports every moved row.

use std::sync::{Arc, Mutex};

use mdstore::{
    metadata::{
        sort::TokenRemap,
        tables::{col, TableId},
    },
    options::OutOfOrderFlags,
    Error, Result, SaveMode, StoreOptions, TableStore,
};

/// Three types; methods are created for types 1, 3 and then 2, which forces `MethodPtr`
fn out_of_order_methods() -> Result<TableStore> {
    let mut store = TableStore::new();
    for name in ["First", "Second", "Third"] {
        let rid = store.add_record(TableId::TypeDef)?;
        store.put_string(TableId::TypeDef, col::typedef::NAME, rid, name)?;
    }

    for (type_rid, name) in [(1, "first_a"), (3, "third_a"), (2, "second_a")] {
        let method = store.create_method(type_rid)?;
        store.put_string(TableId::MethodDef, col::method::NAME, method, name)?;
    }
    Ok(store)
}

#[test]
fn in_order_children_stay_direct() -> Result<()> {
    let mut store = TableStore::new();
    store.add_record(TableId::TypeDef)?;
    store.add_record(TableId::TypeDef)?;

    store.create_field(1)?;
    store.create_field(1)?;
    store.create_field(2)?;
    assert!(!store.has_indirect_table(TableId::Field));
    assert_eq!(store.children(TableId::TypeDef, TableId::Field, 1)?, vec![1, 2]);
    assert_eq!(store.children(TableId::TypeDef, TableId::Field, 2)?, vec![3]);
    assert_eq!(store.find_parent_of(TableId::Field, 2)?, Some(1));
    assert_eq!(store.find_parent_of(TableId::Field, 3)?, Some(2));
    Ok(())
}

#[test]
fn out_of_order_child_creates_pointer_table() -> Result<()> {
    let store = out_of_order_methods()?;

    assert!(store.has_indirect_table(TableId::MethodDef));
    assert_eq!(store.row_count(TableId::MethodPtr), 3);
    assert_eq!(store.children(TableId::TypeDef, TableId::MethodDef, 1)?, vec![1]);
    assert_eq!(store.children(TableId::TypeDef, TableId::MethodDef, 2)?, vec![3]);
    assert_eq!(store.children(TableId::TypeDef, TableId::MethodDef, 3)?, vec![2]);

    assert_eq!(store.find_parent_of(TableId::MethodDef, 2)?, Some(3));
    assert_eq!(store.find_parent_of(TableId::MethodDef, 3)?, Some(2));
    assert_eq!(store.find_method_def(2, "second_a", None)?, Some(3));
    Ok(())
}

#[test]
fn explicit_linking_matches_create() -> Result<()> {
    let mut store = TableStore::new();
    store.add_record(TableId::TypeDef)?;
    store.add_record(TableId::TypeDef)?;

    let late = store.add_record(TableId::MethodDef)?;
    store.add_method_to_type_def(2, late)?;
    let early = store.add_record(TableId::MethodDef)?;
    store.add_method_to_type_def(1, early)?;

    assert!(store.has_indirect_table(TableId::MethodDef));
    assert_eq!(store.children(TableId::TypeDef, TableId::MethodDef, 1)?, vec![early]);
    assert_eq!(store.children(TableId::TypeDef, TableId::MethodDef, 2)?, vec![late]);
    Ok(())
}

#[test]
fn params_are_kept_in_sequence_order() -> Result<()> {
    let mut store = TableStore::new();
    store.add_record(TableId::TypeDef)?;
    let method = store.create_method(1)?;

    let second = store.create_param(method, 2)?;
    let first = store.create_param(method, 1)?;
    assert!(store.has_indirect_table(TableId::Param));
    assert_eq!(store.children(TableId::MethodDef, TableId::Param, method)?, vec![first, second]);

    let image = store.save(SaveMode::Full)?;
    let loaded = TableStore::from_buffer(&image, true)?;
    assert_eq!(loaded.row_count(TableId::ParamPtr), 0);
    assert_eq!(loaded.get_column(TableId::Param, col::param::SEQUENCE, 1)?, 1);
    assert_eq!(loaded.get_column(TableId::Param, col::param::SEQUENCE, 2)?, 2);
    Ok(())
}

#[test]
fn full_save_eliminates_pointer_tables() -> Result<()> {
    let mut store = out_of_order_methods()?;

    let remaps = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&remaps);
    store.set_token_remap_listener(move |remap: TokenRemap| {
        if let Ok(mut remaps) = sink.lock() {
            remaps.push(remap);
        }
    });

    let image = store.save(SaveMode::Full)?;
    let loaded = TableStore::from_buffer(&image, false)?;
    assert_eq!(loaded.row_count(TableId::MethodPtr), 0);
    assert!(!loaded.has_indirect_table(TableId::MethodDef));

    let names = (1..=3)
        .map(|rid| loaded.get_string(TableId::MethodDef, col::method::NAME, rid))
        .collect::<Result<Vec<_>>>()?;
    assert_eq!(names, vec!["first_a", "second_a", "third_a"]);
    assert_eq!(loaded.children(TableId::TypeDef, TableId::MethodDef, 3)?, vec![3]);

    let remaps = remaps.lock().map(|remaps| remaps.clone()).unwrap_or_default();
    let moves: Vec<(u32, u32)> = remaps
        .iter()
        .filter(|remap| !remap.duplicate)
        .map(|remap| (remap.from.row(), remap.to.row()))
        .collect();
    assert_eq!(moves, vec![(3, 2), (2, 3)]);
    Ok(())
}

#[test]
fn empty_lists_resolve_on_save() -> Result<()> {
    let mut store = TableStore::new();
    store.add_record(TableId::TypeDef)?;
    store.add_record(TableId::TypeDef)?;
    store.create_field(1)?;
    assert_eq!(store.get_column(TableId::TypeDef, col::typedef::FIELD_LIST, 2)?, 0);

    let image = store.save(SaveMode::Full)?;
    let loaded = TableStore::from_buffer(&image, true)?;
    assert_eq!(loaded.get_column(TableId::TypeDef, col::typedef::FIELD_LIST, 2)?, 2);
    assert_eq!(loaded.get_column(TableId::TypeDef, col::typedef::METHOD_LIST, 1)?, 1);
    assert!(loaded.children(TableId::TypeDef, TableId::Field, 2)?.is_empty());
    Ok(())
}

#[test]
fn out_of_order_policy_rejects_pointer_table() -> Result<()> {
    let mut store = TableStore::with_options(StoreOptions {
        out_of_order: OutOfOrderFlags::FIELD,
        ..StoreOptions::default()
    });
    store.add_record(TableId::TypeDef)?;
    store.add_record(TableId::TypeDef)?;
    store.create_field(2)?;

    assert!(matches!(
        store.create_field(1),
        Err(Error::RecordOutOfOrder(TableId::Field))
    ));
    assert!(!store.has_indirect_table(TableId::Field));
    Ok(())
}
