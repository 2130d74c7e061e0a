//! # Coded Index Types Module
//!
//! Coded indices combine a table selector and a row index into a single column value. The
//! low bits select the target table from a fixed candidate list, the remaining bits carry the
//! RID. The number of selector bits is `ceil(log2(candidates))`, which also decides when a
//! coded column must become 4 bytes wide: a 2-byte column can only address candidates with
//! fewer than `2^(16 - tag_bits)` rows.
//!
//! ## References
//!
//! - [ECMA-335 Standard](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf) - Section II.24.2.6

use strum::{EnumCount, EnumIter};

use crate::{
    metadata::{tables::TableId, token::Token},
    Error, Result,
};

/// Largest selector width of any coded index kind (`HasCustomAttribute`)
pub const MAX_TAG_BITS: u8 = 5;

/// All coded index kinds of the ECMA-335 tables
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, EnumIter, EnumCount)]
#[repr(usize)]
pub enum CodedIndexType {
    /// `TypeDef`, `TypeRef`, `TypeSpec`
    TypeDefOrRef,
    /// `Field`, `Param`, `Property`
    HasConstant,
    /// Anything that can carry a custom attribute
    HasCustomAttribute,
    /// `Field`, `Param`
    HasFieldMarshal,
    /// `TypeDef`, `MethodDef`, `Assembly`
    HasDeclSecurity,
    /// Parent of a member reference
    MemberRefParent,
    /// `Event`, `Property`
    HasSemantics,
    /// `MethodDef`, `MemberRef`
    MethodDefOrRef,
    /// `Field`, `MethodDef`
    MemberForwarded,
    /// `File`, `AssemblyRef`, `ExportedType`
    Implementation,
    /// Constructor of a custom attribute
    CustomAttributeType,
    /// Scope of a type reference
    ResolutionScope,
    /// `TypeDef`, `MethodDef`
    TypeOrMethodDef,
}

impl CodedIndexType {
    /// Candidate tables in selector order. `None` marks selector values that are reserved.
    #[must_use]
    pub fn tables(&self) -> &'static [Option<TableId>] {
        match self {
            CodedIndexType::TypeDefOrRef => &[
                Some(TableId::TypeDef),
                Some(TableId::TypeRef),
                Some(TableId::TypeSpec),
            ],
            CodedIndexType::HasConstant => &[
                Some(TableId::Field),
                Some(TableId::Param),
                Some(TableId::Property),
            ],
            CodedIndexType::HasCustomAttribute => &[
                Some(TableId::MethodDef),
                Some(TableId::Field),
                Some(TableId::TypeRef),
                Some(TableId::TypeDef),
                Some(TableId::Param),
                Some(TableId::InterfaceImpl),
                Some(TableId::MemberRef),
                Some(TableId::Module),
                Some(TableId::DeclSecurity),
                Some(TableId::Property),
                Some(TableId::Event),
                Some(TableId::StandAloneSig),
                Some(TableId::ModuleRef),
                Some(TableId::TypeSpec),
                Some(TableId::Assembly),
                Some(TableId::AssemblyRef),
                Some(TableId::File),
                Some(TableId::ExportedType),
                Some(TableId::ManifestResource),
                Some(TableId::GenericParam),
                Some(TableId::GenericParamConstraint),
                Some(TableId::MethodSpec),
            ],
            CodedIndexType::HasFieldMarshal => &[Some(TableId::Field), Some(TableId::Param)],
            CodedIndexType::HasDeclSecurity => &[
                Some(TableId::TypeDef),
                Some(TableId::MethodDef),
                Some(TableId::Assembly),
            ],
            CodedIndexType::MemberRefParent => &[
                Some(TableId::TypeDef),
                Some(TableId::TypeRef),
                Some(TableId::ModuleRef),
                Some(TableId::MethodDef),
                Some(TableId::TypeSpec),
            ],
            CodedIndexType::HasSemantics => &[Some(TableId::Event), Some(TableId::Property)],
            CodedIndexType::MethodDefOrRef => {
                &[Some(TableId::MethodDef), Some(TableId::MemberRef)]
            }
            CodedIndexType::MemberForwarded => &[Some(TableId::Field), Some(TableId::MethodDef)],
            CodedIndexType::Implementation => &[
                Some(TableId::File),
                Some(TableId::AssemblyRef),
                Some(TableId::ExportedType),
            ],
            // Selector values 0, 1 and 4 are reserved
            CodedIndexType::CustomAttributeType => &[
                None,
                None,
                Some(TableId::MethodDef),
                Some(TableId::MemberRef),
                None,
            ],
            CodedIndexType::ResolutionScope => &[
                Some(TableId::Module),
                Some(TableId::ModuleRef),
                Some(TableId::AssemblyRef),
                Some(TableId::TypeRef),
            ],
            CodedIndexType::TypeOrMethodDef => &[Some(TableId::TypeDef), Some(TableId::MethodDef)],
        }
    }

    /// Number of low bits used as table selector
    #[must_use]
    pub fn tag_bits(&self) -> u8 {
        let count = self.tables().len();
        let mut bits = 0u8;
        while (1usize << bits) < count {
            bits += 1;
        }
        bits
    }

    /// Row count from which a candidate no longer fits a 2-byte column
    #[must_use]
    pub fn narrow_row_limit(&self) -> u32 {
        1u32 << (16 - self.tag_bits())
    }

    /// Candidate tables that actually exist, skipping reserved selectors
    pub fn candidates(&self) -> impl Iterator<Item = TableId> {
        self.tables().iter().filter_map(|table| *table)
    }

    /// Encode a token into a coded index value of this kind.
    ///
    /// The nil token encodes as `0`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if the token's table is not a candidate, or
    /// [`crate::Error::Overflow`] if its RID cannot be shifted past the selector bits.
    pub fn encode(&self, token: Token) -> Result<u32> {
        if token.value() == 0 {
            return Ok(0);
        }

        let table = token.table_id()?;
        let Some(tag) = self
            .tables()
            .iter()
            .position(|candidate| *candidate == Some(table))
        else {
            return Err(Error::InvalidArgument(format!(
                "{:?} is not a candidate of {:?}",
                table, self
            )));
        };

        let bits = self.tag_bits();
        let rid = token.row();
        if u64::from(rid) << bits > u64::from(u32::MAX) {
            return Err(Error::Overflow {
                value: u64::from(rid),
                width: 4,
            });
        }

        #[allow(clippy::cast_possible_truncation)]
        Ok((rid << bits) | tag as u32)
    }

    /// Decode a coded index value of this kind into a token.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the selector names a reserved or missing slot.
    pub fn decode(&self, value: u32) -> Result<Token> {
        let bits = self.tag_bits();
        let tag = (value & ((1u32 << bits) - 1)) as usize;

        match self.tables().get(tag) {
            Some(Some(table)) => Ok(Token::from_parts(*table, value >> bits)),
            _ => Err(malformed_error!(
                "Invalid selector {} for coded index {:?}",
                tag,
                self
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn tag_bits() {
        assert_eq!(CodedIndexType::TypeDefOrRef.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasCustomAttribute.tag_bits(), 5);
        assert_eq!(CodedIndexType::MethodDefOrRef.tag_bits(), 1);
        assert_eq!(CodedIndexType::CustomAttributeType.tag_bits(), 3);
        assert_eq!(CodedIndexType::MemberRefParent.tag_bits(), 3);

        let widest = CodedIndexType::iter().map(|kind| kind.tag_bits()).max();
        assert_eq!(widest, Some(MAX_TAG_BITS));
    }

    #[test]
    fn encode_decode() {
        let token = Token::from_parts(TableId::TypeRef, 0x10);
        let value = CodedIndexType::TypeDefOrRef.encode(token).unwrap();
        assert_eq!(value, (0x10 << 2) | 1);
        assert_eq!(CodedIndexType::TypeDefOrRef.decode(value).unwrap(), token);

        let ctor = Token::from_parts(TableId::MemberRef, 3);
        let value = CodedIndexType::CustomAttributeType.encode(ctor).unwrap();
        assert_eq!(value, (3 << 3) | 3);
        assert_eq!(CodedIndexType::CustomAttributeType.decode(value).unwrap(), ctor);
    }

    #[test]
    fn nil() {
        assert_eq!(CodedIndexType::TypeDefOrRef.encode(Token::NIL).unwrap(), 0);
        assert!(CodedIndexType::TypeDefOrRef.decode(0).unwrap().is_null());
    }

    #[test]
    fn invalid() {
        let method = Token::from_parts(TableId::MethodDef, 1);
        assert!(CodedIndexType::TypeDefOrRef.encode(method).is_err());
        assert!(CodedIndexType::TypeDefOrRef.decode(3).is_err());
        assert!(CodedIndexType::CustomAttributeType.decode((1 << 3) | 1).is_err());
    }

    #[test]
    fn narrow_limits() {
        assert_eq!(CodedIndexType::HasCustomAttribute.narrow_row_limit(), 2048);
        assert_eq!(CodedIndexType::MethodDefOrRef.narrow_row_limit(), 0x8000);
    }
}
