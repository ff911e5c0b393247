//! Encoder producing container bytes from a tree.
//!
//! Structs are written depth-first, children before parents, so a child's
//! start address is known when the parent's pointer field is emitted.
//! Reference slots are zero placeholders patched in one pass after the whole
//! tree is down; the pointer list (data slots plus the header's two synthetic
//! slots) goes last.

use std::collections::HashMap;

use log::debug;

use crate::container::MAGIC;
use crate::error::{Result, Sir0Error};
use crate::model::{Document, Endianness, Node, PtrWidth};
use crate::ptrlist;
use crate::typed;

/// Encodes a tree back into container bytes.
pub fn encode(doc: &Document) -> Result<Vec<u8>> {
    let w = doc.width.bytes();
    let header_len = match doc.width {
        PtrWidth::W4 => 16,
        PtrWidth::W8 => 32,
    };
    let mut writer = Writer {
        out: vec![0u8; header_len],
        endianness: doc.endianness,
        width: doc.width,
        slots: Vec::new(),
        id_addr: HashMap::new(),
        refs: Vec::new(),
    };
    writer.out[0..4].copy_from_slice(MAGIC);

    let Node::Struct { id, children } = &doc.root else {
        return Err(Sir0Error::format(0, "document root must be a struct node"));
    };
    let root_addr = writer.write_struct(id.as_deref(), children)?;
    debug!("root struct at {root_addr:#x}, {} slots", writer.slots.len());

    // Resolve every pending reference slot against the recorded ids.
    for (target, slot) in &writer.refs {
        let addr = *writer
            .id_addr
            .get(target)
            .ok_or_else(|| Sir0Error::UnresolvedReference { id: target.clone() })?;
        patch_uint(&mut writer.out, *slot as usize, addr, w, doc.endianness)?;
    }

    let mut out = writer.out;
    while out.len() % w != 0 {
        out.push(0);
    }
    let ptr_start = out.len() as u64;

    let synthetic: [u64; 2] = match doc.width {
        PtrWidth::W4 => [4, 8],
        PtrWidth::W8 => [8, 16],
    };
    patch_uint(&mut out, synthetic[0] as usize, root_addr, w, doc.endianness)?;
    patch_uint(&mut out, synthetic[1] as usize, ptr_start, w, doc.endianness)?;

    let mut slots = writer.slots;
    slots.extend_from_slice(&synthetic);
    slots.sort_unstable();
    ptrlist::encode(&slots, &mut out);

    while out.len() % 16 != 0 {
        out.push(0);
    }
    Ok(out)
}

struct Writer {
    out: Vec<u8>,
    endianness: Endianness,
    width: PtrWidth,
    /// Absolute offsets of every pointer and reference slot written so far.
    slots: Vec<u64>,
    id_addr: HashMap<String, u64>,
    refs: Vec<(String, u64)>,
}

impl Writer {
    /// Writes a struct's children into a local buffer, appends it to the
    /// global one and returns the struct's start address.
    fn write_struct(&mut self, id: Option<&str>, children: &[Node]) -> Result<u64> {
        let w = self.width.bytes();
        let mut local: Vec<u8> = Vec::new();
        let mut local_slots: Vec<usize> = Vec::new();
        let mut local_refs: Vec<(String, usize)> = Vec::new();
        for child in children {
            match child {
                Node::Struct { id, children } => {
                    if local.len() % w != 0 {
                        return Err(Sir0Error::Alignment {
                            offset: local.len(),
                            width: w,
                        });
                    }
                    local_slots.push(local.len());
                    let addr = self.write_struct(id.as_deref(), children)?;
                    check_fits(addr, w)?;
                    self.endianness.write_uint(&mut local, addr, w);
                }
                Node::Reference { target } => {
                    if local.len() % w != 0 {
                        return Err(Sir0Error::Alignment {
                            offset: local.len(),
                            width: w,
                        });
                    }
                    local_slots.push(local.len());
                    local_refs.push((target.clone(), local.len()));
                    self.endianness.write_uint(&mut local, 0, w);
                }
                Node::Data(leaf) => {
                    typed::encode_leaf(leaf, &mut local, self.endianness, self.width)?;
                }
            }
        }
        while local.len() % w != 0 {
            local.push(0);
        }

        let loc = self.out.len() as u64;
        self.slots.extend(local_slots.iter().map(|&p| loc + p as u64));
        self.refs
            .extend(local_refs.into_iter().map(|(t, p)| (t, loc + p as u64)));
        self.out.extend_from_slice(&local);
        if let Some(id) = id {
            self.id_addr.insert(id.to_string(), loc);
        }
        Ok(loc)
    }
}

fn check_fits(v: u64, width: usize) -> Result<()> {
    if width < 8 && v >> (8 * width) != 0 {
        return Err(Sir0Error::format(
            v as usize,
            format!("address does not fit a {width}-byte pointer"),
        ));
    }
    Ok(())
}

fn patch_uint(out: &mut [u8], offset: usize, v: u64, width: usize, endianness: Endianness) -> Result<()> {
    check_fits(v, width)?;
    let mut tmp = Vec::with_capacity(width);
    endianness.write_uint(&mut tmp, v, width);
    out[offset..offset + width].copy_from_slice(&tmp);
    Ok(())
}
