//! Structural decoder for SIR0 containers.
//!
//! The pointer list names every slot offset in the file; each slot's value
//! is a pointed address. Struct boundaries are not self-describing: a struct
//! at address A extends to the next strictly greater pointed address (or the
//! end of the buffer for the last one). The walk is an explicit breadth-first
//! worklist, so shared-struct id assignment order does not depend on nesting
//! depth and cyclic pointer graphs terminate (a reference is emitted before
//! any re-expansion could happen).

use std::collections::{HashMap, HashSet, VecDeque};

use log::debug;

use crate::error::{Result, Sir0Error};
use crate::model::{Document, Endianness, Node, PtrWidth};
use crate::ptrlist;
use crate::schema::{FieldCursor, SchemaGrammar, Terminal};
use crate::typed::{self, RunCtx};

pub const MAGIC: &[u8; 4] = b"SIR0";

/// Caller-supplied decode configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions<'a> {
    pub endianness: Endianness,
    /// When present, data runs decode into typed leaves starting from the
    /// grammar's root type; otherwise every run becomes one raw leaf.
    pub schema: Option<&'a SchemaGrammar>,
}

/// Decodes a container buffer into a shared-node tree.
pub fn decode(data: &[u8], opts: &DecodeOptions<'_>) -> Result<Document> {
    decode_inner(data, opts.endianness, opts.schema, "")
}

/// Decode entry point for containers embedded in a data leaf: always
/// untyped, with a caller-chosen id prefix keeping nested id namespaces
/// disjoint from the parent's.
pub(crate) fn decode_embedded(data: &[u8], endianness: Endianness, id_prefix: &str) -> Result<Document> {
    decode_inner(data, endianness, None, id_prefix)
}

fn decode_inner(
    data: &[u8],
    endianness: Endianness,
    schema: Option<&SchemaGrammar>,
    id_prefix: &str,
) -> Result<Document> {
    let header = Header::read(data, endianness)?;
    debug!(
        "header: width {}, root {:#x}, pointer list {:#x}",
        header.width.bytes(),
        header.root,
        header.ptrlist
    );
    let w = header.width.bytes() as u64;

    let slots = ptrlist::decode(data, usize::try_from(header.ptrlist).map_err(|_| {
        Sir0Error::format(8, "pointer-list address does not fit in memory")
    })?)?;
    debug!("{} pointer slots", slots.len());

    // Classify pointed addresses: first-seen ones delimit struct extents,
    // re-pointed ones must be shared by reference.
    let slot_set: HashSet<u64> = slots.iter().copied().collect();
    let mut pointed: Vec<u64> = Vec::with_capacity(slots.len());
    let mut seen: HashSet<u64> = HashSet::with_capacity(slots.len());
    let mut multi: HashSet<u64> = HashSet::new();
    for &slot in &slots {
        let addr = read_ptr(data, slot, w, endianness)?;
        if seen.insert(addr) {
            pointed.push(addr);
        } else {
            multi.insert(addr);
        }
    }
    pointed.sort_unstable();

    let mut walker = Walker {
        data,
        endianness,
        width: header.width,
        schema,
        id_prefix,
        slot_set,
        pointed,
        multi,
        queue: VecDeque::new(),
        visited: HashSet::new(),
        id_map: HashMap::new(),
        next_id: 0,
        order: Vec::new(),
        built: HashMap::new(),
        nested: 0,
    };
    let root_type = schema.map(|g| g.root_type().to_string());
    walker.enqueue(header.root, root_type);
    while let Some((addr, ty)) = walker.queue.pop_front() {
        walker.expand(addr, ty.as_deref())?;
    }

    Ok(Document {
        endianness,
        width: header.width,
        root: walker.stitch(header.root)?,
    })
}

struct Header {
    width: PtrWidth,
    root: u64,
    ptrlist: u64,
}

impl Header {
    fn read(data: &[u8], endianness: Endianness) -> Result<Self> {
        if data.len() < 12 {
            return Err(Sir0Error::format(0, "buffer too short for a header"));
        }
        if &data[0..4] != MAGIC {
            let mut found = [0u8; 4];
            found.copy_from_slice(&data[0..4]);
            return Err(Sir0Error::BadMagic { found });
        }
        // An all-zero field after the magic marks the 8-byte layout; a
        // 4-byte container's root address can never be zero there.
        if data[4..8].iter().all(|&b| b == 0) {
            if data.len() < 24 {
                return Err(Sir0Error::format(4, "buffer too short for an 8-byte header"));
            }
            Ok(Self {
                width: PtrWidth::W8,
                root: endianness.read_uint(&data[8..16]),
                ptrlist: endianness.read_uint(&data[16..24]),
            })
        } else {
            Ok(Self {
                width: PtrWidth::W4,
                root: endianness.read_uint(&data[4..8]),
                ptrlist: endianness.read_uint(&data[8..12]),
            })
        }
    }
}

fn read_ptr(data: &[u8], offset: u64, width: u64, endianness: Endianness) -> Result<u64> {
    let start = usize::try_from(offset)
        .map_err(|_| Sir0Error::format(0, format!("slot offset {offset:#x} out of range")))?;
    let end = start
        .checked_add(width as usize)
        .filter(|&e| e <= data.len())
        .ok_or_else(|| Sir0Error::format(start, "pointer field runs past end of buffer"))?;
    Ok(endianness.read_uint(&data[start..end]))
}

enum Part {
    Node(Node),
    /// Placeholder for the struct expanded from this address; resolved in
    /// the final stitching pass.
    Inline(u64),
}

struct Walker<'a> {
    data: &'a [u8],
    endianness: Endianness,
    width: PtrWidth,
    schema: Option<&'a SchemaGrammar>,
    id_prefix: &'a str,
    slot_set: HashSet<u64>,
    pointed: Vec<u64>,
    multi: HashSet<u64>,
    queue: VecDeque<(u64, Option<String>)>,
    visited: HashSet<u64>,
    id_map: HashMap<u64, String>,
    next_id: usize,
    order: Vec<u64>,
    built: HashMap<u64, (Option<String>, Vec<Part>)>,
    nested: usize,
}

impl Walker<'_> {
    /// First visit of an address: marks it, hands out an id if it is
    /// multi-pointed (ids follow first-visit order) and queues it.
    fn enqueue(&mut self, addr: u64, ty: Option<String>) {
        self.visited.insert(addr);
        if self.multi.contains(&addr) {
            self.id_map
                .insert(addr, format!("{}{}", self.id_prefix, self.next_id));
            self.next_id += 1;
        }
        self.queue.push_back((addr, ty));
    }

    fn extent_end(&self, addr: u64) -> Result<u64> {
        let idx = self.pointed.binary_search(&addr).map_err(|_| {
            Sir0Error::format(
                addr as usize,
                "address is not in the pointed-address list, cannot infer struct boundary",
            )
        })?;
        let end = self
            .pointed
            .get(idx + 1)
            .copied()
            .unwrap_or(self.data.len() as u64);
        if end > self.data.len() as u64 {
            return Err(Sir0Error::format(
                addr as usize,
                "struct extent runs past end of buffer",
            ));
        }
        Ok(end)
    }

    fn expand(&mut self, addr: u64, ty: Option<&str>) -> Result<()> {
        self.order.push(addr);
        let end = self.extent_end(addr)?;
        debug!("struct at {addr:#x}..{end:#x} (type {ty:?})");
        let mut cursor = match (self.schema, ty) {
            (Some(grammar), Some(ty)) => Some(FieldCursor::new(grammar, ty)?),
            _ => None,
        };

        let w = self.width.bytes() as u64;
        let mut children: Vec<Part> = Vec::new();
        let mut pending: Vec<u8> = Vec::new();
        let mut i = addr;
        while i < end {
            if self.slot_set.contains(&i) {
                self.flush_run(&mut pending, cursor.as_mut(), &mut children)?;
                let target = read_ptr(self.data, i, w, self.endianness)?;
                let child_ty = match cursor.as_mut() {
                    Some(cur) => match cur.take().map_err(|e| {
                        Sir0Error::schema(format!("at pointer slot {i:#x}: {e}"))
                    })? {
                        Terminal::Indirect(name) => Some(name),
                        Terminal::Prim(tag) => {
                            return Err(Sir0Error::schema(format!(
                                "pointer slot at {i:#x} where schema expects '{}'",
                                tag.name()
                            )));
                        }
                    },
                    None => None,
                };
                if self.visited.contains(&target) {
                    let id = self.id_map.get(&target).cloned().ok_or_else(|| {
                        Sir0Error::format(i as usize, "re-pointed address has no id")
                    })?;
                    children.push(Part::Node(Node::Reference { target: id }));
                } else {
                    self.enqueue(target, child_ty);
                    children.push(Part::Inline(target));
                }
            } else {
                let stop = (i + w).min(end) as usize;
                pending.extend_from_slice(&self.data[i as usize..stop]);
            }
            i += w;
        }
        self.flush_run(&mut pending, cursor.as_mut(), &mut children)?;

        let id = self.id_map.get(&addr).cloned();
        self.built.insert(addr, (id, children));
        Ok(())
    }

    fn flush_run(
        &mut self,
        pending: &mut Vec<u8>,
        cursor: Option<&mut FieldCursor<'_>>,
        children: &mut Vec<Part>,
    ) -> Result<()> {
        if pending.is_empty() {
            return Ok(());
        }
        let run = std::mem::take(pending);
        match cursor {
            Some(cursor) => {
                let mut ctx = RunCtx {
                    endianness: self.endianness,
                    width: self.width,
                    id_prefix: self.id_prefix,
                    nested: &mut self.nested,
                };
                for leaf in typed::decode_data_run(cursor, &run, &mut ctx)? {
                    children.push(Part::Node(leaf));
                }
            }
            None => children.push(Part::Node(Node::raw(run))),
        }
        Ok(())
    }

    /// Resolves inline placeholders in reverse expansion order: a target is
    /// always expanded after its first pointing struct, so walking the order
    /// backwards guarantees every placeholder's node is already complete.
    fn stitch(&mut self, root: u64) -> Result<Node> {
        let mut nodes: HashMap<u64, Node> = HashMap::with_capacity(self.order.len());
        for &addr in self.order.iter().rev() {
            let (id, parts) = self
                .built
                .remove(&addr)
                .ok_or_else(|| Sir0Error::format(addr as usize, "struct expanded twice"))?;
            let mut children = Vec::with_capacity(parts.len());
            for part in parts {
                match part {
                    Part::Node(node) => children.push(node),
                    Part::Inline(target) => children.push(nodes.remove(&target).ok_or_else(
                        || Sir0Error::format(target as usize, "inline struct never expanded"),
                    )?),
                }
            }
            nodes.insert(addr, Node::Struct { id, children });
        }
        nodes
            .remove(&root)
            .ok_or_else(|| Sir0Error::format(root as usize, "root struct never expanded"))
    }
}
