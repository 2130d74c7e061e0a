//! Edit-and-Continue delta integration tests.
//!
//! Each test saves a base image, opens an editing session on a copy of it, saves the session
//! as a delta and merges that delta back into a freshly loaded base.

use mdstore::{
    metadata::{
        enc::FuncCode,
        root::{Root, StreamStore},
        tables::{col, TableId},
    },
    Error, Result, SaveMode, StoreOptions, TableStore, Token,
};
use uguid::guid;

const SIGNATURE: [u8; 3] = [0x00, 0x00, 0x01];

/// Module with `<Module>` and `Program`, where `Program` owns the method `Existing`
fn base_image() -> Result<Vec<u8>> {
    let mut store = TableStore::new();
    let module = store.add_record(TableId::Module)?;
    store.put_string(TableId::Module, col::module::NAME, module, "Base.dll")?;
    store.put_guid(
        TableId::Module,
        col::module::MVID,
        module,
        &guid!("2f4c1e8a-6b3d-4a59-9c27-d1e0b5a47f36"),
    )?;

    for name in ["<Module>", "Program"] {
        let rid = store.add_record(TableId::TypeDef)?;
        store.put_string(TableId::TypeDef, col::typedef::NAME, rid, name)?;
    }
    let method = store.create_method(2)?;
    store.put_string(TableId::MethodDef, col::method::NAME, method, "Existing")?;
    store.put_blob(TableId::MethodDef, col::method::SIGNATURE, method, &SIGNATURE)?;

    store.save(SaveMode::Full)
}

/// Open an editing session on `image`, let `edit` change it, and return the minimal delta
fn minimal_delta(
    image: &[u8],
    edit: impl FnOnce(&mut TableStore) -> Result<()>,
) -> Result<TableStore> {
    let mut editor = TableStore::from_buffer_with_options(image, false, StoreOptions::delta())?;
    edit(&mut editor)?;
    let delta = editor.save(SaveMode::Delta)?;
    TableStore::from_buffer(&delta, true)
}

fn set_method_flags(store: &mut TableStore, rid: u32, flags: u32) -> Result<()> {
    store.put_column(TableId::MethodDef, col::method::FLAGS, rid, flags)?;
    store.update_enc_log(Token::from_parts(TableId::MethodDef, rid), FuncCode::Default)
}

#[test]
fn minimal_delta_adds_methods() -> Result<()> {
    let image = base_image()?;
    let delta = minimal_delta(&image, |editor| {
        for name in ["Alpha", "Beta", "Gamma"] {
            let method = editor.create_method(2)?;
            editor.put_string(TableId::MethodDef, col::method::NAME, method, name)?;
            editor.put_blob(TableId::MethodDef, col::method::SIGNATURE, method, &SIGNATURE)?;
        }
        Ok(())
    })?;
    assert!(delta.is_minimal_delta());
    assert_eq!(delta.row_count(TableId::MethodDef), 3);

    let mut base = TableStore::from_buffer(&image, false)?;
    base.apply_delta(&delta)?;

    assert_eq!(base.row_count(TableId::MethodDef), 4);
    assert_eq!(base.children(TableId::TypeDef, TableId::MethodDef, 2)?, vec![1, 2, 3, 4]);
    let names = (1..=4)
        .map(|rid| base.get_string(TableId::MethodDef, col::method::NAME, rid))
        .collect::<Result<Vec<_>>>()?;
    assert_eq!(names, vec!["Existing", "Alpha", "Beta", "Gamma"]);
    assert_eq!(base.get_blob(TableId::MethodDef, col::method::SIGNATURE, 4)?, &SIGNATURE);
    assert_eq!(base.find_method_def(2, "Beta", None)?, Some(3));

    // The merged log is kept for the next generation
    assert_eq!(base.row_count(TableId::EncLog), delta.row_count(TableId::EncLog));
    Ok(())
}

#[test]
fn methods_merge_under_type_without_methods() -> Result<()> {
    let mut store = TableStore::new();
    let module = store.add_record(TableId::Module)?;
    store.put_string(TableId::Module, col::module::NAME, module, "Lists.dll")?;
    for name in ["A", "B"] {
        let rid = store.add_record(TableId::TypeDef)?;
        store.put_string(TableId::TypeDef, col::typedef::NAME, rid, name)?;
    }
    let owned = store.create_method(1)?;
    store.put_string(TableId::MethodDef, col::method::NAME, owned, "Owned")?;
    let image = store.save(SaveMode::Full)?;

    let loaded = TableStore::from_buffer(&image, true)?;
    assert_eq!(loaded.get_column(TableId::TypeDef, col::typedef::METHOD_LIST, 2)?, 2);
    assert!(loaded.children(TableId::TypeDef, TableId::MethodDef, 2)?.is_empty());

    let delta = minimal_delta(&image, |editor| {
        for name in ["First", "Second", "Third"] {
            let method = editor.create_method(2)?;
            editor.put_string(TableId::MethodDef, col::method::NAME, method, name)?;
        }
        Ok(())
    })?;

    let mut base = TableStore::from_buffer(&image, false)?;
    base.apply_delta(&delta)?;

    assert_eq!(base.row_count(TableId::MethodDef), 4);
    assert_eq!(base.children(TableId::TypeDef, TableId::MethodDef, 1)?, vec![1]);
    assert_eq!(base.children(TableId::TypeDef, TableId::MethodDef, 2)?, vec![2, 3, 4]);
    assert_eq!(base.get_string(TableId::MethodDef, col::method::NAME, 2)?, "First");
    assert_eq!(base.find_parent_of(TableId::MethodDef, 4)?, Some(2));
    Ok(())
}

#[test]
fn complete_enc_image_merges() -> Result<()> {
    let image = base_image()?;
    let mut editor = TableStore::from_buffer_with_options(&image, false, StoreOptions::enc())?;
    let method = editor.create_method(2)?;
    editor.put_string(TableId::MethodDef, col::method::NAME, method, "Added")?;
    let enc_image = editor.save(SaveMode::Enc)?;

    let delta = TableStore::from_buffer(&enc_image, true)?;
    assert!(!delta.is_minimal_delta());

    let mut base = TableStore::from_buffer(&image, false)?;
    base.apply_delta(&delta)?;
    assert_eq!(base.row_count(TableId::MethodDef), 2);
    assert_eq!(base.get_string(TableId::MethodDef, col::method::NAME, 2)?, "Added");
    assert_eq!(base.children(TableId::TypeDef, TableId::MethodDef, 2)?, vec![1, 2]);
    Ok(())
}

#[test]
fn updates_merge_in_any_order() -> Result<()> {
    let image = base_image()?;
    let mut grown = TableStore::from_buffer(&image, false)?;
    let second = grown.create_method(2)?;
    grown.put_string(TableId::MethodDef, col::method::NAME, second, "Second")?;
    let image = grown.save(SaveMode::Full)?;

    let first_edit = minimal_delta(&image, |editor| set_method_flags(editor, 1, 0x0006))?;
    let second_edit = minimal_delta(&image, |editor| set_method_flags(editor, 2, 0x0016))?;

    let mut forward = TableStore::from_buffer(&image, false)?;
    forward.apply_delta(&first_edit)?;
    forward.apply_delta(&second_edit)?;

    let mut backward = TableStore::from_buffer(&image, false)?;
    backward.apply_delta(&second_edit)?;
    backward.apply_delta(&first_edit)?;

    assert_eq!(
        forward.table(TableId::MethodDef).bytes(),
        backward.table(TableId::MethodDef).bytes()
    );
    assert_eq!(forward.get_column(TableId::MethodDef, col::method::FLAGS, 1)?, 0x0006);
    assert_eq!(forward.get_column(TableId::MethodDef, col::method::FLAGS, 2)?, 0x0016);
    assert_eq!(forward.get_string(TableId::MethodDef, col::method::NAME, 2)?, "Second");
    Ok(())
}

#[test]
fn schema_version_mismatch_is_rejected() -> Result<()> {
    let image = base_image()?;
    let delta = {
        let mut editor =
            TableStore::from_buffer_with_options(&image, false, StoreOptions::delta())?;
        set_method_flags(&mut editor, 1, 0x0006)?;
        editor.save(SaveMode::Delta)?
    };

    let root = Root::read(&delta)?;
    let tables = root
        .open_stream(&delta, "#-")
        .map(|stream| stream.as_ptr() as usize - delta.as_ptr() as usize);
    let Some(offset) = tables else {
        return Err(Error::InvalidArgument("delta has no #- stream".to_string()));
    };
    let mut patched = delta.clone();
    patched[offset + 5] = 1;

    let delta = TableStore::from_buffer(&patched, true)?;
    let mut base = TableStore::from_buffer(&image, false)?;
    assert!(matches!(
        base.apply_delta(&delta),
        Err(Error::VersionMismatch {
            base: (2, 0),
            delta: (2, 1)
        })
    ));
    assert_eq!(base.get_column(TableId::MethodDef, col::method::FLAGS, 1)?, 0);
    assert_eq!(base.row_count(TableId::EncLog), 0);
    Ok(())
}

#[test]
fn foreign_module_is_reported() -> Result<()> {
    let image = base_image()?;

    let mut foreign = TableStore::with_options(StoreOptions::enc());
    let module = foreign.add_record(TableId::Module)?;
    foreign.put_guid(
        TableId::Module,
        col::module::MVID,
        module,
        &guid!("00000000-0000-0000-0000-000000000001"),
    )?;

    let mut base = TableStore::from_buffer_with_options(&image, false, StoreOptions::enc())?;
    let result = base.apply_delta(&foreign);
    if cfg!(debug_assertions) {
        assert!(matches!(result, Err(Error::ModuleMismatch)));
    } else {
        assert!(result.is_ok());
    }
    Ok(())
}

#[test]
fn unknown_function_code_is_rejected() -> Result<()> {
    let mut delta = TableStore::with_options(StoreOptions::enc());
    let entry = delta.add_record(TableId::EncLog)?;
    delta.put_column(
        TableId::EncLog,
        col::enclog::TOKEN,
        entry,
        Token::from_parts(TableId::MethodDef, 1).value(),
    )?;
    delta.put_column(TableId::EncLog, col::enclog::FUNC_CODE, entry, 9)?;

    let mut base = TableStore::new();
    assert!(matches!(base.apply_delta(&delta), Err(Error::UnexpectedFuncCode(9))));
    assert_eq!(base.row_count(TableId::EncLog), 0);
    Ok(())
}

#[test]
fn read_only_base_refuses_merge() -> Result<()> {
    let image = base_image()?;
    let delta = minimal_delta(&image, |editor| set_method_flags(editor, 1, 0x0006))?;

    let mut base = TableStore::from_buffer(&image, true)?;
    assert!(matches!(base.apply_delta(&delta), Err(Error::ReadOnly)));
    Ok(())
}
