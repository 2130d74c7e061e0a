//! Column catalog of all metadata tables.
//!
//! Every table is described by a static list of column templates. A template only knows the
//! column's type; byte widths and offsets are decided later by [`crate::metadata::tables::TableDef`]
//! according to the active sizing policy (uniform narrow, uniform wide, or ECMA-335 compressed).
//!
//! Fixed columns (`U8`, `U16`, `U32`) never change width. RID, coded index and heap index
//! columns are the variable columns that participate in growth.

use crate::metadata::tables::{CodedIndexType, TableId};

/// Type of a single column
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// Fixed 1-byte scalar
    U8,
    /// Fixed 2-byte scalar
    U16,
    /// Fixed 4-byte scalar
    U32,
    /// Row index into the given table
    Rid(TableId),
    /// Coded index of the given kind
    Coded(CodedIndexType),
    /// Offset into the `#Strings` heap
    Strings,
    /// 1-based index into the `#GUID` heap
    Guid,
    /// Offset into the `#Blob` heap
    Blob,
}

impl ColumnType {
    /// Width of fixed columns, `None` for columns whose width depends on the sizing policy
    #[must_use]
    pub fn fixed_size(&self) -> Option<u8> {
        match self {
            ColumnType::U8 => Some(1),
            ColumnType::U16 => Some(2),
            ColumnType::U32 => Some(4),
            _ => None,
        }
    }

    /// True for RID, coded index and heap index columns
    #[must_use]
    pub fn is_variable(&self) -> bool {
        self.fixed_size().is_none()
    }

    /// True for RID and coded index columns, the columns that carry tokens
    #[must_use]
    pub fn is_token(&self) -> bool {
        matches!(self, ColumnType::Rid(_) | ColumnType::Coded(_))
    }
}

/// Static description of one column
#[derive(Clone, Copy, Debug)]
pub struct ColumnTemplate {
    /// Name as given by ECMA-335 II.22
    pub name: &'static str,
    /// Column type
    pub kind: ColumnType,
}

/// [`ColumnTemplate`] literal usable in promoted `'static` column lists
macro_rules! c {
    ($name:literal, $kind:expr) => {
        ColumnTemplate {
            name: $name,
            kind: $kind,
        }
    };
}

use ColumnType::{Blob, Coded, Guid, Rid, Strings, U16, U32, U8};

/// Column positions of the tables the engine addresses directly
pub mod col {
    /// `Module` columns
    pub mod module {
        /// Generation
        pub const GENERATION: usize = 0;
        /// Name
        pub const NAME: usize = 1;
        /// Mvid
        pub const MVID: usize = 2;
        /// EncId
        pub const ENC_ID: usize = 3;
        /// EncBaseId
        pub const ENC_BASE_ID: usize = 4;
    }
    /// `TypeRef` columns
    pub mod typeref {
        /// ResolutionScope
        pub const RESOLUTION_SCOPE: usize = 0;
        /// TypeName
        pub const NAME: usize = 1;
        /// TypeNamespace
        pub const NAMESPACE: usize = 2;
    }
    /// `TypeDef` columns
    pub mod typedef {
        /// Flags
        pub const FLAGS: usize = 0;
        /// TypeName
        pub const NAME: usize = 1;
        /// TypeNamespace
        pub const NAMESPACE: usize = 2;
        /// Extends
        pub const EXTENDS: usize = 3;
        /// FieldList
        pub const FIELD_LIST: usize = 4;
        /// MethodList
        pub const METHOD_LIST: usize = 5;
    }
    /// `Field` columns
    pub mod field {
        /// Flags
        pub const FLAGS: usize = 0;
        /// Name
        pub const NAME: usize = 1;
        /// Signature
        pub const SIGNATURE: usize = 2;
    }
    /// `MethodDef` columns
    pub mod method {
        /// RVA
        pub const RVA: usize = 0;
        /// ImplFlags
        pub const IMPL_FLAGS: usize = 1;
        /// Flags
        pub const FLAGS: usize = 2;
        /// Name
        pub const NAME: usize = 3;
        /// Signature
        pub const SIGNATURE: usize = 4;
        /// ParamList
        pub const PARAM_LIST: usize = 5;
    }
    /// `Param` columns
    pub mod param {
        /// Flags
        pub const FLAGS: usize = 0;
        /// Sequence
        pub const SEQUENCE: usize = 1;
        /// Name
        pub const NAME: usize = 2;
    }
    /// `MemberRef` columns
    pub mod memberref {
        /// Class
        pub const CLASS: usize = 0;
        /// Name
        pub const NAME: usize = 1;
        /// Signature
        pub const SIGNATURE: usize = 2;
    }
    /// `EventMap` and `PropertyMap` columns
    pub mod map {
        /// Parent
        pub const PARENT: usize = 0;
        /// EventList or PropertyList
        pub const LIST: usize = 1;
    }
    /// Column of the five indirection tables
    pub mod ptr {
        /// Target row
        pub const TARGET: usize = 0;
    }
    /// `ENCLog` columns
    pub mod enclog {
        /// Token
        pub const TOKEN: usize = 0;
        /// FuncCode
        pub const FUNC_CODE: usize = 1;
    }
    /// `ENCMap` columns
    pub mod encmap {
        /// Token
        pub const TOKEN: usize = 0;
    }
}

/// Parent tables with a "range start" list column, the column, and the child table it spans
pub const LIST_COLUMNS: [(TableId, usize, TableId); 5] = [
    (TableId::TypeDef, col::typedef::FIELD_LIST, TableId::Field),
    (TableId::TypeDef, col::typedef::METHOD_LIST, TableId::MethodDef),
    (TableId::MethodDef, col::method::PARAM_LIST, TableId::Param),
    (TableId::EventMap, col::map::LIST, TableId::Event),
    (TableId::PropertyMap, col::map::LIST, TableId::Property),
];

/// Find the list column of `parent` that spans `child`
#[must_use]
pub fn list_column(parent: TableId, child: TableId) -> Option<usize> {
    LIST_COLUMNS
        .iter()
        .find(|(p, _, c)| *p == parent && *c == child)
        .map(|(_, column, _)| *column)
}

/// Find the parent table and list column spanning `child`
#[must_use]
pub fn parent_of_list(child: TableId) -> Option<(TableId, usize)> {
    LIST_COLUMNS
        .iter()
        .find(|(_, _, c)| *c == child)
        .map(|(parent, column, _)| (*parent, *column))
}

/// Column templates of `table`
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn columns(table: TableId) -> &'static [ColumnTemplate] {
    match table {
        TableId::Module => &[
            c!("Generation", U16),
            c!("Name", Strings),
            c!("Mvid", Guid),
            c!("EncId", Guid),
            c!("EncBaseId", Guid),
        ],
        TableId::TypeRef => &[
            c!("ResolutionScope", Coded(CodedIndexType::ResolutionScope)),
            c!("TypeName", Strings),
            c!("TypeNamespace", Strings),
        ],
        TableId::TypeDef => &[
            c!("Flags", U32),
            c!("TypeName", Strings),
            c!("TypeNamespace", Strings),
            c!("Extends", Coded(CodedIndexType::TypeDefOrRef)),
            c!("FieldList", Rid(TableId::Field)),
            c!("MethodList", Rid(TableId::MethodDef)),
        ],
        TableId::FieldPtr => &[c!("Field", Rid(TableId::Field))],
        TableId::Field => &[c!("Flags", U16), c!("Name", Strings), c!("Signature", Blob)],
        TableId::MethodPtr => &[c!("Method", Rid(TableId::MethodDef))],
        TableId::MethodDef => &[
            c!("RVA", U32),
            c!("ImplFlags", U16),
            c!("Flags", U16),
            c!("Name", Strings),
            c!("Signature", Blob),
            c!("ParamList", Rid(TableId::Param)),
        ],
        TableId::ParamPtr => &[c!("Param", Rid(TableId::Param))],
        TableId::Param => &[c!("Flags", U16), c!("Sequence", U16), c!("Name", Strings)],
        TableId::InterfaceImpl => &[
            c!("Class", Rid(TableId::TypeDef)),
            c!("Interface", Coded(CodedIndexType::TypeDefOrRef)),
        ],
        TableId::MemberRef => &[
            c!("Class", Coded(CodedIndexType::MemberRefParent)),
            c!("Name", Strings),
            c!("Signature", Blob),
        ],
        TableId::Constant => &[
            c!("Type", U8),
            c!("PaddingZero", U8),
            c!("Parent", Coded(CodedIndexType::HasConstant)),
            c!("Value", Blob),
        ],
        TableId::CustomAttribute => &[
            c!("Parent", Coded(CodedIndexType::HasCustomAttribute)),
            c!("Type", Coded(CodedIndexType::CustomAttributeType)),
            c!("Value", Blob),
        ],
        TableId::FieldMarshal => &[
            c!("Parent", Coded(CodedIndexType::HasFieldMarshal)),
            c!("NativeType", Blob),
        ],
        TableId::DeclSecurity => &[
            c!("Action", U16),
            c!("Parent", Coded(CodedIndexType::HasDeclSecurity)),
            c!("PermissionSet", Blob),
        ],
        TableId::ClassLayout => &[
            c!("PackingSize", U16),
            c!("ClassSize", U32),
            c!("Parent", Rid(TableId::TypeDef)),
        ],
        TableId::FieldLayout => &[c!("Offset", U32), c!("Field", Rid(TableId::Field))],
        TableId::StandAloneSig => &[c!("Signature", Blob)],
        TableId::EventMap => &[
            c!("Parent", Rid(TableId::TypeDef)),
            c!("EventList", Rid(TableId::Event)),
        ],
        TableId::EventPtr => &[c!("Event", Rid(TableId::Event))],
        TableId::Event => &[
            c!("EventFlags", U16),
            c!("Name", Strings),
            c!("EventType", Coded(CodedIndexType::TypeDefOrRef)),
        ],
        TableId::PropertyMap => &[
            c!("Parent", Rid(TableId::TypeDef)),
            c!("PropertyList", Rid(TableId::Property)),
        ],
        TableId::PropertyPtr => &[c!("Property", Rid(TableId::Property))],
        TableId::Property => &[c!("Flags", U16), c!("Name", Strings), c!("Type", Blob)],
        TableId::MethodSemantics => &[
            c!("Semantics", U16),
            c!("Method", Rid(TableId::MethodDef)),
            c!("Association", Coded(CodedIndexType::HasSemantics)),
        ],
        TableId::MethodImpl => &[
            c!("Class", Rid(TableId::TypeDef)),
            c!("MethodBody", Coded(CodedIndexType::MethodDefOrRef)),
            c!("MethodDeclaration", Coded(CodedIndexType::MethodDefOrRef)),
        ],
        TableId::ModuleRef => &[c!("Name", Strings)],
        TableId::TypeSpec => &[c!("Signature", Blob)],
        TableId::ImplMap => &[
            c!("MappingFlags", U16),
            c!("MemberForwarded", Coded(CodedIndexType::MemberForwarded)),
            c!("ImportName", Strings),
            c!("ImportScope", Rid(TableId::ModuleRef)),
        ],
        TableId::FieldRVA => &[c!("RVA", U32), c!("Field", Rid(TableId::Field))],
        TableId::EncLog => &[c!("Token", U32), c!("FuncCode", U32)],
        TableId::EncMap => &[c!("Token", U32)],
        TableId::Assembly => &[
            c!("HashAlgId", U32),
            c!("MajorVersion", U16),
            c!("MinorVersion", U16),
            c!("BuildNumber", U16),
            c!("RevisionNumber", U16),
            c!("Flags", U32),
            c!("PublicKey", Blob),
            c!("Name", Strings),
            c!("Culture", Strings),
        ],
        TableId::AssemblyProcessor => &[c!("Processor", U32)],
        TableId::AssemblyOS => &[
            c!("OSPlatformID", U32),
            c!("OSMajorVersion", U32),
            c!("OSMinorVersion", U32),
        ],
        TableId::AssemblyRef => &[
            c!("MajorVersion", U16),
            c!("MinorVersion", U16),
            c!("BuildNumber", U16),
            c!("RevisionNumber", U16),
            c!("Flags", U32),
            c!("PublicKeyOrToken", Blob),
            c!("Name", Strings),
            c!("Culture", Strings),
            c!("HashValue", Blob),
        ],
        TableId::AssemblyRefProcessor => &[
            c!("Processor", U32),
            c!("AssemblyRef", Rid(TableId::AssemblyRef)),
        ],
        TableId::AssemblyRefOS => &[
            c!("OSPlatformID", U32),
            c!("OSMajorVersion", U32),
            c!("OSMinorVersion", U32),
            c!("AssemblyRef", Rid(TableId::AssemblyRef)),
        ],
        TableId::File => &[c!("Flags", U32), c!("Name", Strings), c!("HashValue", Blob)],
        TableId::ExportedType => &[
            c!("Flags", U32),
            c!("TypeDefId", U32),
            c!("TypeName", Strings),
            c!("TypeNamespace", Strings),
            c!("Implementation", Coded(CodedIndexType::Implementation)),
        ],
        TableId::ManifestResource => &[
            c!("Offset", U32),
            c!("Flags", U32),
            c!("Name", Strings),
            c!("Implementation", Coded(CodedIndexType::Implementation)),
        ],
        TableId::NestedClass => &[
            c!("NestedClass", Rid(TableId::TypeDef)),
            c!("EnclosingClass", Rid(TableId::TypeDef)),
        ],
        TableId::GenericParam => &[
            c!("Number", U16),
            c!("Flags", U16),
            c!("Owner", Coded(CodedIndexType::TypeOrMethodDef)),
            c!("Name", Strings),
        ],
        TableId::MethodSpec => &[
            c!("Method", Coded(CodedIndexType::MethodDefOrRef)),
            c!("Instantiation", Blob),
        ],
        TableId::GenericParamConstraint => &[
            c!("Owner", Rid(TableId::GenericParam)),
            c!("Constraint", Coded(CodedIndexType::TypeDefOrRef)),
        ],
    }
}

/// The column a table is canonically sorted by, for tables that have one
#[must_use]
pub fn key_column(table: TableId) -> Option<usize> {
    match table {
        TableId::InterfaceImpl
        | TableId::MethodImpl
        | TableId::NestedClass
        | TableId::FieldMarshal
        | TableId::CustomAttribute
        | TableId::EventMap
        | TableId::PropertyMap
        | TableId::GenericParamConstraint => Some(0),
        TableId::FieldLayout | TableId::FieldRVA | TableId::DeclSecurity | TableId::ImplMap => {
            Some(1)
        }
        TableId::Constant
        | TableId::ClassLayout
        | TableId::MethodSemantics
        | TableId::GenericParam => Some(2),
        _ => None,
    }
}
