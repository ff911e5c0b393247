//! Typed interpretation of the data runs between pointer slots.
//!
//! Decoding takes terminals from a [`FieldCursor`] in lock-step with the run
//! bytes and must consume the run exactly; any leftover or overrun is a
//! schema error, never a silent misalignment. Encoding is cursor-free: each
//! leaf carries its own tag.

use log::trace;

use crate::container;
use crate::error::{Result, Sir0Error};
use crate::model::{DataLeaf, Endianness, LeafValue, Node, PtrWidth, TypeTag};
use crate::schema::{FieldCursor, Terminal};

/// Per-invocation context threaded through a struct's data runs.
pub struct RunCtx<'a> {
    pub endianness: Endianness,
    pub width: PtrWidth,
    /// Id-namespace prefix for containers nested under this decode call.
    pub id_prefix: &'a str,
    /// Counter of nested containers decoded so far in this call.
    pub nested: &'a mut usize,
}

/// Decodes one data run into typed leaves, consuming `bytes` exactly.
pub fn decode_data_run(
    cursor: &mut FieldCursor<'_>,
    bytes: &[u8],
    ctx: &mut RunCtx<'_>,
) -> Result<Vec<Node>> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < bytes.len() {
        // Peek first so a real grammar error (unknown composite, runaway
        // expansion) propagates as-is; only a clean end of the outermost
        // frame means the schema ran out before the bytes did.
        let terminal = match cursor.peek()? {
            Some(_) => cursor.take()?,
            None => {
                return Err(Sir0Error::schema(format!(
                    "schema exhausted with {} data bytes left in run",
                    bytes.len() - pos
                )));
            }
        };
        match terminal {
            Terminal::Prim(tag @ (TypeTag::Raw | TypeTag::Skip)) => {
                let start = pos;
                pos += 1;
                // Coalesce consecutive identical byte-granular terminals
                // into one multi-byte leaf.
                while pos < bytes.len() && cursor.peek()? == Some(Terminal::Prim(tag)) {
                    cursor.take()?;
                    pos += 1;
                }
                out.push(Node::Data(DataLeaf {
                    tag: Some(tag),
                    value: LeafValue::Bytes(bytes[start..pos].to_vec()),
                }));
            }
            Terminal::Prim(TypeTag::Padding) => {
                out.push(Node::Data(DataLeaf {
                    tag: Some(TypeTag::Padding),
                    value: LeafValue::Bytes(bytes[pos..].to_vec()),
                }));
                pos = bytes.len();
            }
            Terminal::Prim(TypeTag::Str8) => {
                let rest = &bytes[pos..];
                let nul = rest.iter().position(|&b| b == 0).ok_or_else(|| {
                    Sir0Error::schema("unterminated str8 field in data run")
                })?;
                out.push(Node::Data(DataLeaf {
                    tag: Some(TypeTag::Str8),
                    value: LeafValue::Text(escape8(&rest[..nul])),
                }));
                pos += nul + 1;
            }
            Terminal::Prim(TypeTag::Str16) => {
                let (units, consumed) = scan_units16(&bytes[pos..], ctx.endianness)?;
                out.push(Node::Data(DataLeaf {
                    tag: Some(TypeTag::Str16),
                    value: LeafValue::Text(escape16(&units)),
                }));
                pos += consumed;
            }
            Terminal::Prim(TypeTag::Sir0) => {
                let payload = &bytes[pos..];
                let prefix = format!("{}{}_", ctx.id_prefix, *ctx.nested);
                *ctx.nested += 1;
                trace!("nested container of {} bytes, id prefix '{prefix}'", payload.len());
                let doc = container::decode_embedded(payload, ctx.endianness, &prefix)?;
                out.push(Node::Data(DataLeaf {
                    tag: Some(TypeTag::Sir0),
                    value: LeafValue::Container(Box::new(doc)),
                }));
                pos = bytes.len();
            }
            Terminal::Prim(tag) => {
                // Width-bearing integer tags.
                let width = tag
                    .fixed_width(ctx.width)
                    .ok_or_else(|| Sir0Error::schema(format!("unexpected tag '{}'", tag.name())))?;
                let raw = take_bytes(bytes, pos, width, tag.name())?;
                pos += width;
                out.push(Node::Data(decode_int_leaf(tag, raw, ctx.endianness)));
            }
            Terminal::Indirect(_) => {
                // An indirection-marked token consumed mid-run (not at a
                // pointer slot) decodes as a pointer-width unsigned integer.
                // Observed legacy behavior, kept as a documented fallback:
                // typically an array-length field ahead of a pointer group.
                let width = ctx.width.bytes();
                let raw = take_bytes(bytes, pos, width, "indirect")?;
                pos += width;
                out.push(Node::Data(DataLeaf {
                    tag: Some(TypeTag::Uint),
                    value: LeafValue::Uint(ctx.endianness.read_uint(raw)),
                }));
            }
        }
    }
    Ok(out)
}

fn take_bytes<'b>(bytes: &'b [u8], pos: usize, width: usize, what: &str) -> Result<&'b [u8]> {
    if pos + width > bytes.len() {
        return Err(Sir0Error::schema(format!(
            "field '{what}' needs {width} bytes but the run has {} left",
            bytes.len() - pos
        )));
    }
    Ok(&bytes[pos..pos + width])
}

fn decode_int_leaf(tag: TypeTag, raw: &[u8], endianness: Endianness) -> DataLeaf {
    let v = endianness.read_uint(raw);
    let value = if tag.is_signed() {
        LeafValue::Int(sign_extend(v, raw.len()))
    } else {
        LeafValue::Uint(v)
    };
    DataLeaf { tag: Some(tag), value }
}

fn sign_extend(v: u64, width: usize) -> i64 {
    if width >= 8 {
        return v as i64;
    }
    let shift = 64 - 8 * width as u32;
    ((v << shift) as i64) >> shift
}

fn scan_units16(bytes: &[u8], endianness: Endianness) -> Result<(Vec<u16>, usize)> {
    let mut units = Vec::new();
    let mut pos = 0usize;
    loop {
        if pos + 2 > bytes.len() {
            return Err(Sir0Error::schema("unterminated str16 field in data run"));
        }
        let unit = endianness.read_uint(&bytes[pos..pos + 2]) as u16;
        pos += 2;
        if unit == 0 {
            return Ok((units, pos));
        }
        units.push(unit);
    }
}

/// Encodes one leaf, appending its bytes to `out`.
pub fn encode_leaf(leaf: &DataLeaf, out: &mut Vec<u8>, endianness: Endianness, width: PtrWidth) -> Result<()> {
    let Some(tag) = leaf.tag else {
        // Untyped leaves re-emit their bytes verbatim.
        return match &leaf.value {
            LeafValue::Bytes(b) => {
                out.extend_from_slice(b);
                Ok(())
            }
            other => Err(Sir0Error::schema(format!(
                "untyped data leaf must hold raw bytes, got {other:?}"
            ))),
        };
    };
    match (tag, &leaf.value) {
        (TypeTag::Raw | TypeTag::Skip | TypeTag::Padding, LeafValue::Bytes(b)) => {
            out.extend_from_slice(b);
        }
        (TypeTag::Str8, LeafValue::Text(text)) => {
            let bytes = unescape8(text)?;
            out.extend_from_slice(&bytes);
            out.push(0);
        }
        (TypeTag::Str16, LeafValue::Text(text)) => {
            for unit in unescape16(text)? {
                endianness.write_uint(out, u64::from(unit), 2);
            }
            endianness.write_uint(out, 0, 2);
        }
        (TypeTag::Sir0, LeafValue::Container(doc)) => {
            let payload = crate::container_write::encode(doc)?;
            out.extend_from_slice(&payload);
        }
        (tag, LeafValue::Uint(v)) if !tag.is_signed() => {
            let w = tag
                .fixed_width(width)
                .ok_or_else(|| Sir0Error::schema(format!("tag '{}' has no integer width", tag.name())))?;
            if w < 8 && *v >> (8 * w) != 0 {
                return Err(Sir0Error::schema(format!(
                    "value {v} out of range for {}",
                    tag.name()
                )));
            }
            endianness.write_uint(out, *v, w);
        }
        (tag, LeafValue::Int(v)) if tag.is_signed() => {
            let w = tag
                .fixed_width(width)
                .ok_or_else(|| Sir0Error::schema(format!("tag '{}' has no integer width", tag.name())))?;
            if w < 8 {
                let bound = 1i64 << (8 * w - 1);
                if *v < -bound || *v >= bound {
                    return Err(Sir0Error::schema(format!(
                        "value {v} out of range for {}",
                        tag.name()
                    )));
                }
            }
            endianness.write_uint(out, *v as u64, w);
        }
        (tag, value) => {
            return Err(Sir0Error::schema(format!(
                "tag '{}' does not match leaf value {value:?}",
                tag.name()
            )));
        }
    }
    Ok(())
}

const PRINTABLE: std::ops::Range<u16> = 0x20..0x7F;

/// Escapes 8-bit string units: printable ASCII stays literal, a backslash is
/// doubled, everything else becomes `\xNN`.
pub fn escape8(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if b == b'\\' {
            out.push_str("\\\\");
        } else if PRINTABLE.contains(&u16::from(b)) {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\x{b:02x}"));
        }
    }
    out
}

/// Escapes 16-bit string units; non-printable units become `\uNNNN`.
pub fn escape16(units: &[u16]) -> String {
    let mut out = String::with_capacity(units.len());
    for &u in units {
        if u == u16::from(b'\\') {
            out.push_str("\\\\");
        } else if PRINTABLE.contains(&u) {
            out.push(u as u8 as char);
        } else {
            out.push_str(&format!("\\u{u:04x}"));
        }
    }
    out
}

pub fn unescape8(text: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            if !PRINTABLE.contains(&(c as u16)) || c as u32 > 0x7F {
                return Err(Sir0Error::schema(format!(
                    "unescaped non-ascii character {c:?} in str8 text"
                )));
            }
            out.push(c as u8);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push(b'\\'),
            Some('x') => out.push(hex_escape(&mut chars, 2)? as u8),
            other => {
                return Err(Sir0Error::schema(format!(
                    "bad escape '\\{}' in str8 text",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}

pub fn unescape16(text: &str) -> Result<Vec<u16>> {
    let mut out = Vec::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            if !PRINTABLE.contains(&(c as u16)) || c as u32 > 0x7F {
                return Err(Sir0Error::schema(format!(
                    "unescaped non-ascii character {c:?} in str16 text"
                )));
            }
            out.push(c as u16);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push(u16::from(b'\\')),
            Some('u') => out.push(hex_escape(&mut chars, 4)?),
            other => {
                return Err(Sir0Error::schema(format!(
                    "bad escape '\\{}' in str16 text",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}

fn hex_escape(chars: &mut std::str::Chars<'_>, digits: usize) -> Result<u16> {
    let mut v: u16 = 0;
    for _ in 0..digits {
        let c = chars
            .next()
            .ok_or_else(|| Sir0Error::schema("truncated hex escape in string text"))?;
        let d = c
            .to_digit(16)
            .ok_or_else(|| Sir0Error::schema(format!("bad hex digit {c:?} in string text")))?;
        v = (v << 4) | d as u16;
    }
    Ok(v)
}
