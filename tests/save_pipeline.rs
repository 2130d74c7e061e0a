//! Full save pipeline integration tests.
//!
//! Sorting of keyed tables, the remap events reported while rows move, folding of member
//! references into definitions, and the save size cache.

use std::sync::{Arc, Mutex};

use mdstore::{
    metadata::{
        sort::TokenRemap,
        tables::{col, key_column, TableId},
    },
    Error, Result, SaveMode, TableStore, Token,
};

const CA_VALUE: usize = 2;

fn collect_remaps(store: &mut TableStore) -> Arc<Mutex<Vec<TokenRemap>>> {
    let remaps = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&remaps);
    store.set_token_remap_listener(move |remap: TokenRemap| {
        if let Ok(mut remaps) = sink.lock() {
            remaps.push(remap);
        }
    });
    remaps
}

fn remaps_of(remaps: &Arc<Mutex<Vec<TokenRemap>>>, table: TableId) -> Vec<TokenRemap> {
    remaps
        .lock()
        .map(|remaps| {
            remaps
                .iter()
                .filter(|remap| remap.from.table() == table as u8)
                .copied()
                .collect()
        })
        .unwrap_or_default()
}

fn method(store: &mut TableStore, type_rid: u32, name: &str, signature: &[u8]) -> Result<u32> {
    let rid = store.create_method(type_rid)?;
    store.put_string(TableId::MethodDef, col::method::NAME, rid, name)?;
    store.put_blob(TableId::MethodDef, col::method::SIGNATURE, rid, signature)?;
    Ok(rid)
}

fn member_ref(store: &mut TableStore, class: Token, name: &str, signature: &[u8]) -> Result<u32> {
    let rid = store.add_record(TableId::MemberRef)?;
    store.put_token(TableId::MemberRef, col::memberref::CLASS, rid, class)?;
    store.put_string(TableId::MemberRef, col::memberref::NAME, rid, name)?;
    store.put_blob(TableId::MemberRef, col::memberref::SIGNATURE, rid, signature)?;
    Ok(rid)
}

#[test]
fn custom_attributes_are_sorted_with_remap() -> Result<()> {
    let mut store = TableStore::new();
    store.add_record(TableId::TypeDef)?;
    method(&mut store, 1, "First", &[0x00, 0x00, 0x01])?;
    method(&mut store, 1, "Second", &[0x00, 0x00, 0x01])?;

    let parents = [
        Token::from_parts(TableId::TypeDef, 1),
        Token::from_parts(TableId::MethodDef, 2),
        Token::from_parts(TableId::MethodDef, 1),
    ];
    for (parent, marker) in parents.iter().zip(1u8..) {
        let rid = store.add_record(TableId::CustomAttribute)?;
        store.put_token(TableId::CustomAttribute, 0, rid, *parent)?;
        store.put_blob(TableId::CustomAttribute, CA_VALUE, rid, &[0x01, 0x00, marker])?;
    }
    assert!(!store.is_sorted(TableId::CustomAttribute));

    let remaps = collect_remaps(&mut store);
    let image = store.save(SaveMode::Full)?;

    let moves = remaps_of(&remaps, TableId::CustomAttribute);
    let mut from: Vec<u32> = moves.iter().map(|remap| remap.from.row()).collect();
    let mut to: Vec<u32> = moves.iter().map(|remap| remap.to.row()).collect();
    assert!(moves.iter().all(|remap| !remap.duplicate));
    assert_eq!(
        moves
            .iter()
            .map(|remap| (remap.from.row(), remap.to.row()))
            .collect::<Vec<_>>(),
        vec![(3, 1), (1, 2), (2, 3)]
    );
    from.sort_unstable();
    to.sort_unstable();
    assert_eq!(from, to);

    let loaded = TableStore::from_buffer(&image, true)?;
    assert!(loaded.is_sorted(TableId::CustomAttribute));
    assert_eq!(
        loaded.get_token(TableId::CustomAttribute, 0, 1)?,
        Token::from_parts(TableId::MethodDef, 1)
    );
    assert_eq!(loaded.get_blob(TableId::CustomAttribute, CA_VALUE, 1)?, &[0x01, 0x00, 3]);
    assert_eq!(
        loaded.find_by_token(TableId::CustomAttribute, Token::from_parts(TableId::MethodDef, 2))?,
        vec![3]
    );
    Ok(())
}

#[test]
fn unreferenced_tables_sort_silently() -> Result<()> {
    let mut store = TableStore::new();
    store.add_record(TableId::TypeDef)?;
    store.create_field(1)?;
    store.create_field(1)?;

    let Some(parent) = key_column(TableId::Constant) else {
        return Err(Error::InvalidArgument("Constant has no key".to_string()));
    };
    for field in [2, 1] {
        let rid = store.add_record(TableId::Constant)?;
        store.put_token(TableId::Constant, parent, rid, Token::from_parts(TableId::Field, field))?;
    }

    let remaps = collect_remaps(&mut store);
    let image = store.save(SaveMode::Full)?;
    assert!(remaps_of(&remaps, TableId::Constant).is_empty());

    let loaded = TableStore::from_buffer(&image, true)?;
    assert!(loaded.is_sorted(TableId::Constant));
    assert_eq!(
        loaded.get_token(TableId::Constant, parent, 1)?,
        Token::from_parts(TableId::Field, 1)
    );
    Ok(())
}

#[test]
fn member_refs_fold_into_definitions() -> Result<()> {
    let mut store = TableStore::new();
    store.add_record(TableId::TypeDef)?;
    store.add_record(TableId::TypeDef)?;
    method(&mut store, 2, "Other", &[0x00, 0x00, 0x01])?;
    // Created out of order: moves from RID 2 to RID 1 when the save removes MethodPtr
    let run = method(&mut store, 1, "Run", &[0x00, 0x00, 0x01])?;
    assert_eq!(run, 2);

    let owner = Token::from_parts(TableId::TypeDef, 1);
    let folded = member_ref(&mut store, owner, "Run", &[0x00, 0x00, 0x01])?;
    let vararg = member_ref(&mut store, owner, "Run", &[0x05, 0x00, 0x01])?;
    let mismatch = member_ref(&mut store, owner, "Run", &[0x00, 0x01, 0x01, 0x08])?;

    let remaps = collect_remaps(&mut store);
    let image = store.save(SaveMode::Full)?;

    let duplicates: Vec<TokenRemap> = remaps_of(&remaps, TableId::MemberRef);
    assert_eq!(
        duplicates,
        vec![TokenRemap {
            from: Token::from_parts(TableId::MemberRef, folded),
            to: Token::from_parts(TableId::MethodDef, 1),
            duplicate: true,
        }]
    );
    assert!(duplicates
        .iter()
        .all(|remap| remap.from.row() != vararg && remap.from.row() != mismatch));

    // References are reported, not removed
    let loaded = TableStore::from_buffer(&image, true)?;
    assert_eq!(loaded.row_count(TableId::MemberRef), 3);
    assert_eq!(loaded.get_string(TableId::MethodDef, col::method::NAME, 1)?, "Run");
    Ok(())
}

#[test]
fn save_size_matches_image() -> Result<()> {
    let mut store = TableStore::new();
    store.add_record(TableId::TypeDef)?;
    method(&mut store, 1, "Main", &[0x00, 0x00, 0x01])?;
    store.add_user_string("literal")?;

    let size = store.get_save_size(SaveMode::Full)?;
    assert_eq!(store.get_save_size(SaveMode::Full)?, size);
    assert_eq!(store.save(SaveMode::Full)?.len(), size as usize);

    method(&mut store, 1, "Helper", &[0x00, 0x01, 0x01, 0x08])?;
    let grown = store.get_save_size(SaveMode::Full)?;
    assert!(grown > size);
    assert_eq!(store.save(SaveMode::Full)?.len(), grown as usize);
    Ok(())
}

#[test]
fn saved_image_is_four_byte_aligned() -> Result<()> {
    let mut store = TableStore::new();
    store.add_record(TableId::TypeDef)?;
    store.add_string("odd")?;
    store.add_blob(&[1, 2, 3])?;

    for mode in [SaveMode::Full, SaveMode::Enc] {
        let image = store.save(mode)?;
        assert_eq!(image.len() % 4, 0, "{mode:?}");
    }
    Ok(())
}
