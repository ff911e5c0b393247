//! sir0-core: codecs, schema cursor and tree model for SIR0 containers
//!
//! This crate focuses on a small, well-factored surface:
//! - Container decoder reconstructing a shared-node tree from the flat
//!   pointer list (boundary inference, reference deduplication)
//! - Container encoder writing a tree back to bytes, pointer list included
//! - Schema grammar + field cursor turning opaque data runs into typed leaves
//! - XML interchange for the editable tree, for CLI use
//!
pub mod container;
pub mod container_write;
pub mod error;
pub mod model;
pub mod ptrlist;
pub mod schema;
pub mod typed;
pub mod xml;

pub use container::{DecodeOptions, decode};
pub use container_write::encode;
pub use error::{Result, Sir0Error};
pub use model::{DataLeaf, Document, Endianness, LeafValue, Node, PtrWidth, TypeTag};
pub use schema::{Count, FieldCursor, FieldToken, Member, SchemaGrammar, Terminal};
pub use xml::{from_xml, to_xml};
