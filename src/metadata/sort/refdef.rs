use crate::{
    metadata::{
        sort::TokenRemap,
        tables::{col, TableId, TableStore},
        token::Token,
    },
    Result,
};

/// Calling convention nibble of a vararg method signature
const VARARG: u8 = 0x05;

/// Member references that duplicate a definition of this module, as `(reference, definition)`
pub(crate) type RefToDef = Vec<(Token, Token)>;

impl TableStore {
    /// Find every member reference whose parent is a type of this module and which names a
    /// method or field of that type with identical signature bytes.
    ///
    /// Vararg references are never folded: their signature carries the call site's extra
    /// arguments and must stay a separate row.
    pub(crate) fn collect_ref_to_def(&self) -> Result<RefToDef> {
        let types = self.row_count(TableId::TypeDef);
        let mut pairs = Vec::new();

        for rid in 1..=self.row_count(TableId::MemberRef) {
            let class = self.get_token(TableId::MemberRef, col::memberref::CLASS, rid)?;
            if class.is_null()
                || class.table() != TableId::TypeDef as u8
                || class.row() > types
            {
                continue;
            }

            let signature = self.get_blob(TableId::MemberRef, col::memberref::SIGNATURE, rid)?;
            if signature.first().is_some_and(|first| first & 0x0F == VARARG) {
                continue;
            }
            let name = self.get_string(TableId::MemberRef, col::memberref::NAME, rid)?;

            if let Some(definition) = self.find_member_def(class.row(), name, Some(signature))? {
                pairs.push((Token::from_parts(TableId::MemberRef, rid), definition));
            }
        }

        Ok(pairs)
    }

    /// Report folded references, with definitions translated through the moves of this save
    pub(crate) fn emit_ref_to_def(&mut self, pairs: &RefToDef) {
        for (reference, definition) in pairs {
            let to = self.movements.get(*definition).unwrap_or(*definition);
            self.notify_remap(TokenRemap {
                from: *reference,
                to,
                duplicate: true,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(store: &mut TableStore, class: Token, name: &str, signature: &[u8]) -> u32 {
        let rid = store.add_record(TableId::MemberRef).unwrap();
        store
            .put_token(TableId::MemberRef, col::memberref::CLASS, rid, class)
            .unwrap();
        store
            .put_string(TableId::MemberRef, col::memberref::NAME, rid, name)
            .unwrap();
        store
            .put_blob(TableId::MemberRef, col::memberref::SIGNATURE, rid, signature)
            .unwrap();
        rid
    }

    #[test]
    fn folds_matching_definitions() {
        let mut store = TableStore::new();
        let owner = store.add_record(TableId::TypeDef).unwrap();
        let method = store.create_method(owner).unwrap();
        store
            .put_string(TableId::MethodDef, col::method::NAME, method, "Run")
            .unwrap();
        store
            .put_blob(TableId::MethodDef, col::method::SIGNATURE, method, &[0x00, 0x00, 0x01])
            .unwrap();
        let field = store.create_field(owner).unwrap();
        store
            .put_string(TableId::Field, col::field::NAME, field, "count")
            .unwrap();
        store
            .put_blob(TableId::Field, col::field::SIGNATURE, field, &[0x06, 0x08])
            .unwrap();

        let class = Token::from_parts(TableId::TypeDef, owner);
        let to_method = reference(&mut store, class, "Run", &[0x00, 0x00, 0x01]);
        let to_field = reference(&mut store, class, "count", &[0x06, 0x08]);
        reference(&mut store, class, "Run", &[0x00, 0x01, 0x01, 0x08]);
        reference(&mut store, class, "Run", &[0x05, 0x00, 0x01]);
        reference(&mut store, Token::from_parts(TableId::TypeRef, 1), "Run", &[0x00, 0x00, 0x01]);

        let pairs = store.collect_ref_to_def().unwrap();
        assert_eq!(
            pairs,
            vec![
                (
                    Token::from_parts(TableId::MemberRef, to_method),
                    Token::from_parts(TableId::MethodDef, method)
                ),
                (
                    Token::from_parts(TableId::MemberRef, to_field),
                    Token::from_parts(TableId::Field, field)
                ),
            ]
        );
    }
}
