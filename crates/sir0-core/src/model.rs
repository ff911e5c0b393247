//! Tree model for decoded SIR0 containers.
//!
//! A container decodes into a [`Document`]: the byte order and pointer width
//! it was read with, plus a root [`Node`]. Struct nodes own their children;
//! an address pointed to by more than one slot is materialized once (with an
//! `id`) and every other occurrence becomes a [`Node::Reference`].

/// Byte order of all pointer and integer fields in a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

impl Endianness {
    /// Reads an unsigned integer of `buf.len()` bytes (1..=8).
    pub fn read_uint(self, buf: &[u8]) -> u64 {
        let mut v = 0u64;
        match self {
            Endianness::Little => {
                for &b in buf.iter().rev() {
                    v = (v << 8) | u64::from(b);
                }
            }
            Endianness::Big => {
                for &b in buf {
                    v = (v << 8) | u64::from(b);
                }
            }
        }
        v
    }

    /// Appends the low `width` bytes of `v` to `out`.
    pub fn write_uint(self, out: &mut Vec<u8>, v: u64, width: usize) {
        match self {
            Endianness::Little => {
                for i in 0..width {
                    out.push((v >> (8 * i)) as u8);
                }
            }
            Endianness::Big => {
                for i in (0..width).rev() {
                    out.push((v >> (8 * i)) as u8);
                }
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Endianness::Little => "little",
            Endianness::Big => "big",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "little" => Some(Endianness::Little),
            "big" => Some(Endianness::Big),
            _ => None,
        }
    }
}

/// Pointer width of a container; auto-detected on decode, chosen on encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PtrWidth {
    #[default]
    W4,
    W8,
}

impl PtrWidth {
    pub fn bytes(self) -> usize {
        match self {
            PtrWidth::W4 => 4,
            PtrWidth::W8 => 8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PtrWidth::W4 => "4",
            PtrWidth::W8 => "8",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "4" => Some(PtrWidth::W4),
            "8" => Some(PtrWidth::W8),
            _ => None,
        }
    }
}

/// A decoded container: decode configuration plus the root struct.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub endianness: Endianness,
    pub width: PtrWidth,
    pub root: Node,
}

/// One node of the editable tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Struct {
        /// Present only when the struct is shared (pointed to by >=2 slots).
        id: Option<String>,
        children: Vec<Node>,
    },
    Data(DataLeaf),
    Reference {
        target: String,
    },
}

impl Node {
    pub fn raw(bytes: Vec<u8>) -> Node {
        Node::Data(DataLeaf {
            tag: None,
            value: LeafValue::Bytes(bytes),
        })
    }
}

/// A leaf holding decoded bytes, optionally typed by a schema tag.
#[derive(Debug, Clone, PartialEq)]
pub struct DataLeaf {
    pub tag: Option<TypeTag>,
    pub value: LeafValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LeafValue {
    /// Raw/skip/padding bytes, or the whole leaf when no schema applies.
    Bytes(Vec<u8>),
    Uint(u64),
    Int(i64),
    /// Escaped text of a str8/str16 field (see `typed::escape_units`).
    Text(String),
    /// An embedded container, recursively codec'd.
    Container(Box<Document>),
}

/// Closed set of primitive field tags a schema may assign to a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Raw,
    Skip,
    Uint,
    Int,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int8,
    Int16,
    Int32,
    Int64,
    Str8,
    Str16,
    Padding,
    Sir0,
}

impl TypeTag {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "raw" => TypeTag::Raw,
            "skip" => TypeTag::Skip,
            "uint" => TypeTag::Uint,
            "int" => TypeTag::Int,
            "uint8" => TypeTag::Uint8,
            "uint16" => TypeTag::Uint16,
            "uint32" => TypeTag::Uint32,
            "uint64" => TypeTag::Uint64,
            "int8" => TypeTag::Int8,
            "int16" => TypeTag::Int16,
            "int32" => TypeTag::Int32,
            "int64" => TypeTag::Int64,
            "str8" => TypeTag::Str8,
            "str16" => TypeTag::Str16,
            "padding" => TypeTag::Padding,
            "sir0" => TypeTag::Sir0,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Raw => "raw",
            TypeTag::Skip => "skip",
            TypeTag::Uint => "uint",
            TypeTag::Int => "int",
            TypeTag::Uint8 => "uint8",
            TypeTag::Uint16 => "uint16",
            TypeTag::Uint32 => "uint32",
            TypeTag::Uint64 => "uint64",
            TypeTag::Int8 => "int8",
            TypeTag::Int16 => "int16",
            TypeTag::Int32 => "int32",
            TypeTag::Int64 => "int64",
            TypeTag::Str8 => "str8",
            TypeTag::Str16 => "str16",
            TypeTag::Padding => "padding",
            TypeTag::Sir0 => "sir0",
        }
    }

    /// Fixed byte width of the tag, if it has one. Width-less integer tags
    /// take the container's pointer width; strings, padding and nested
    /// containers are variable.
    pub fn fixed_width(self, ptr: PtrWidth) -> Option<usize> {
        match self {
            TypeTag::Raw | TypeTag::Skip | TypeTag::Uint8 | TypeTag::Int8 => Some(1),
            TypeTag::Uint16 | TypeTag::Int16 => Some(2),
            TypeTag::Uint32 | TypeTag::Int32 => Some(4),
            TypeTag::Uint64 | TypeTag::Int64 => Some(8),
            TypeTag::Uint | TypeTag::Int => Some(ptr.bytes()),
            TypeTag::Str8 | TypeTag::Str16 | TypeTag::Padding | TypeTag::Sir0 => None,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            TypeTag::Int | TypeTag::Int8 | TypeTag::Int16 | TypeTag::Int32 | TypeTag::Int64
        )
    }
}
