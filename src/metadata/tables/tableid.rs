//! Table kinds of the metadata tables stream.
//!
//! The discriminant of every variant is the table number used in tokens, in the schema's
//! valid/sorted bit masks and in the on-disk table order. Numbers run contiguously from `0x00`
//! to `0x2C`, which lets per-table state live in plain arrays indexed by [`TableId::index`].

use strum::{EnumCount, EnumIter, IntoEnumIterator};

/// Identifier of one of the 45 logical metadata tables
#[derive(Clone, Copy, PartialEq, Debug, EnumIter, EnumCount, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TableId {
    /// Module definition, always exactly one row
    Module = 0x00,
    /// Type references
    TypeRef = 0x01,
    /// Type definitions, parents of the field and method lists
    TypeDef = 0x02,
    /// Indirection for `Field`
    FieldPtr = 0x03,
    /// Field definitions
    Field = 0x04,
    /// Indirection for `MethodDef`
    MethodPtr = 0x05,
    /// Method definitions, parents of the param list
    MethodDef = 0x06,
    /// Indirection for `Param`
    ParamPtr = 0x07,
    /// Parameter definitions
    Param = 0x08,
    /// Implemented interfaces, keyed by class
    InterfaceImpl = 0x09,
    /// Member references
    MemberRef = 0x0A,
    /// Constant values, keyed by parent
    Constant = 0x0B,
    /// Custom attributes, keyed by parent
    CustomAttribute = 0x0C,
    /// Marshalling descriptors, keyed by parent
    FieldMarshal = 0x0D,
    /// Security declarations, keyed by parent
    DeclSecurity = 0x0E,
    /// Explicit class layouts, keyed by parent
    ClassLayout = 0x0F,
    /// Explicit field offsets, keyed by field
    FieldLayout = 0x10,
    /// Standalone signatures
    StandAloneSig = 0x11,
    /// Type to event list map
    EventMap = 0x12,
    /// Indirection for `Event`
    EventPtr = 0x13,
    /// Event definitions
    Event = 0x14,
    /// Type to property list map
    PropertyMap = 0x15,
    /// Indirection for `Property`
    PropertyPtr = 0x16,
    /// Property definitions
    Property = 0x17,
    /// Accessor associations, keyed by association
    MethodSemantics = 0x18,
    /// Method overrides, keyed by class
    MethodImpl = 0x19,
    /// Module references
    ModuleRef = 0x1A,
    /// Type specifications
    TypeSpec = 0x1B,
    /// P/Invoke maps, keyed by forwarded member
    ImplMap = 0x1C,
    /// Field initial data, keyed by field
    FieldRVA = 0x1D,
    /// Edit-and-Continue log
    EncLog = 0x1E,
    /// Edit-and-Continue row map
    EncMap = 0x1F,
    /// Assembly definition
    Assembly = 0x20,
    /// Unused processor table
    AssemblyProcessor = 0x21,
    /// Unused OS table
    AssemblyOS = 0x22,
    /// Assembly references
    AssemblyRef = 0x23,
    /// Unused assembly reference processor table
    AssemblyRefProcessor = 0x24,
    /// Unused assembly reference OS table
    AssemblyRefOS = 0x25,
    /// Files of a multi-module assembly
    File = 0x26,
    /// Exported types
    ExportedType = 0x27,
    /// Manifest resources
    ManifestResource = 0x28,
    /// Nesting relation, keyed by nested class
    NestedClass = 0x29,
    /// Generic parameters, keyed by owner
    GenericParam = 0x2A,
    /// Generic method instantiations
    MethodSpec = 0x2B,
    /// Generic parameter constraints, keyed by owner
    GenericParamConstraint = 0x2C,
}

/// Number of table kinds
pub const TABLE_COUNT: usize = TableId::COUNT;

/// Child tables that may be reached through an indirection table, with their Ptr table
pub const PTR_TABLES: [(TableId, TableId); 5] = [
    (TableId::Field, TableId::FieldPtr),
    (TableId::MethodDef, TableId::MethodPtr),
    (TableId::Param, TableId::ParamPtr),
    (TableId::Event, TableId::EventPtr),
    (TableId::Property, TableId::PropertyPtr),
];

impl TableId {
    /// Position of this table in per-table arrays
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Resolve a table number
    #[must_use]
    pub fn from_u8(value: u8) -> Option<TableId> {
        TableId::iter().nth(usize::from(value))
    }

    /// The indirection table of a child table, if it can have one
    #[must_use]
    pub fn ptr_table(self) -> Option<TableId> {
        PTR_TABLES
            .iter()
            .find(|(child, _)| *child == self)
            .map(|(_, ptr)| *ptr)
    }

    /// True for the five indirection tables
    #[must_use]
    pub fn is_ptr_table(self) -> bool {
        PTR_TABLES.iter().any(|(_, ptr)| *ptr == self)
    }

    /// Bit of this table inside the schema's valid and sorted masks
    #[must_use]
    pub fn mask(self) -> u64 {
        1u64 << (self as u8)
    }
}
