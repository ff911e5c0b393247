//! XML interchange for the editable tree.
//!
//! The textual form mirrors the tree one-to-one: a `<sir0>` root carrying
//! the byte order and pointer mode, `<struct>` elements with optional ids,
//! `<reference ref=..>` back-links and `<data>` leaves whose payload is hex,
//! a decimal integer, escaped text, or a nested `<sir0>` element. An
//! optional annotation mode appends an ASCII rendering of raw data blocks
//! as XML comments; the reader ignores comments.

use std::fmt::Display;

use quick_xml::Writer as XmlWriter;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::error::{Result, Sir0Error};
use crate::model::{DataLeaf, Document, Endianness, LeafValue, Node, PtrWidth, TypeTag};

fn xml_err<E: Display>(e: E) -> Sir0Error {
    Sir0Error::Xml(e.to_string())
}

/// Renders a document as indented XML text.
pub fn to_xml(doc: &Document, ascii_comments: bool) -> Result<String> {
    let mut writer = XmlWriter::new_with_indent(Vec::new(), b'\t', 1);
    write_document(&mut writer, doc, ascii_comments)?;
    String::from_utf8(writer.into_inner()).map_err(xml_err)
}

fn write_document<W: std::io::Write>(
    writer: &mut XmlWriter<W>,
    doc: &Document,
    ascii: bool,
) -> Result<()> {
    let mut el = BytesStart::new("sir0");
    el.push_attribute(("endianness", doc.endianness.as_str()));
    el.push_attribute(("mode", doc.width.as_str()));
    writer.write_event(Event::Start(el)).map_err(xml_err)?;
    write_node(writer, &doc.root, ascii)?;
    writer
        .write_event(Event::End(BytesEnd::new("sir0")))
        .map_err(xml_err)
}

fn write_node<W: std::io::Write>(writer: &mut XmlWriter<W>, node: &Node, ascii: bool) -> Result<()> {
    match node {
        Node::Struct { id, children } => {
            let mut el = BytesStart::new("struct");
            if let Some(id) = id {
                el.push_attribute(("id", id.as_str()));
            }
            writer.write_event(Event::Start(el)).map_err(xml_err)?;
            for child in children {
                write_node(writer, child, ascii)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new("struct")))
                .map_err(xml_err)
        }
        Node::Reference { target } => {
            let mut el = BytesStart::new("reference");
            el.push_attribute(("ref", target.as_str()));
            writer.write_event(Event::Empty(el)).map_err(xml_err)
        }
        Node::Data(leaf) => write_data(writer, leaf, ascii),
    }
}

fn write_data<W: std::io::Write>(writer: &mut XmlWriter<W>, leaf: &DataLeaf, ascii: bool) -> Result<()> {
    let mut el = BytesStart::new("data");
    if let Some(tag) = leaf.tag {
        el.push_attribute(("type", tag.name()));
    }
    writer.write_event(Event::Start(el)).map_err(xml_err)?;
    match &leaf.value {
        LeafValue::Container(doc) => write_document(writer, doc, ascii)?,
        LeafValue::Bytes(bytes) => {
            let text = to_hex(bytes);
            writer
                .write_event(Event::Text(BytesText::new(text.as_str())))
                .map_err(xml_err)?;
        }
        LeafValue::Uint(v) => {
            let text = v.to_string();
            writer
                .write_event(Event::Text(BytesText::new(text.as_str())))
                .map_err(xml_err)?;
        }
        LeafValue::Int(v) => {
            let text = v.to_string();
            writer
                .write_event(Event::Text(BytesText::new(text.as_str())))
                .map_err(xml_err)?;
        }
        LeafValue::Text(text) => {
            writer
                .write_event(Event::Text(BytesText::new(text.as_str())))
                .map_err(xml_err)?;
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new("data")))
        .map_err(xml_err)?;
    if ascii {
        if let LeafValue::Bytes(bytes) = &leaf.value {
            let rendered: String = bytes
                .iter()
                .map(|&b| if (0x20..0x7F).contains(&b) { b as char } else { '?' })
                .collect();
            // "--" would terminate the comment early.
            let comment = format!(" {} ", rendered.replace("--", "-?"));
            writer
                .write_event(Event::Comment(BytesText::from_escaped(comment.as_str())))
                .map_err(xml_err)?;
        }
    }
    Ok(())
}

/// Parses XML interchange text back into a document.
pub fn from_xml(text: &str) -> Result<Document> {
    let parsed = roxmltree::Document::parse(text).map_err(xml_err)?;
    parse_document(parsed.root_element())
}

fn parse_document(el: roxmltree::Node<'_, '_>) -> Result<Document> {
    if el.tag_name().name() != "sir0" {
        return Err(Sir0Error::Xml(format!(
            "expected <sir0> root, found <{}>",
            el.tag_name().name()
        )));
    }
    let endianness = match el.attribute("endianness") {
        Some(s) => Endianness::parse(s)
            .ok_or_else(|| Sir0Error::Xml(format!("bad endianness '{s}'")))?,
        None => Endianness::Little,
    };
    let width = match el.attribute("mode") {
        Some(s) => {
            PtrWidth::parse(s).ok_or_else(|| Sir0Error::Xml(format!("bad mode '{s}'")))?
        }
        None => PtrWidth::W4,
    };
    let root_el = el
        .children()
        .find(|c| c.is_element())
        .ok_or_else(|| Sir0Error::Xml("missing root <struct>".into()))?;
    if root_el.tag_name().name() != "struct" {
        return Err(Sir0Error::Xml(format!(
            "root child must be <struct>, found <{}>",
            root_el.tag_name().name()
        )));
    }
    Ok(Document {
        endianness,
        width,
        root: parse_node(root_el)?,
    })
}

fn parse_node(el: roxmltree::Node<'_, '_>) -> Result<Node> {
    match el.tag_name().name() {
        "struct" => {
            let id = el.attribute("id").map(str::to_string);
            let mut children = Vec::new();
            for child in el.children().filter(|c| c.is_element()) {
                children.push(parse_node(child)?);
            }
            Ok(Node::Struct { id, children })
        }
        "reference" => {
            let target = el
                .attribute("ref")
                .ok_or_else(|| Sir0Error::Xml("<reference> without ref attribute".into()))?;
            Ok(Node::Reference {
                target: target.to_string(),
            })
        }
        "data" => parse_data(el),
        other => Err(Sir0Error::Xml(format!("unexpected element <{other}>"))),
    }
}

fn parse_data(el: roxmltree::Node<'_, '_>) -> Result<Node> {
    let tag = match el.attribute("type") {
        Some(s) => Some(
            TypeTag::parse(s).ok_or_else(|| Sir0Error::Xml(format!("unknown data type '{s}'")))?,
        ),
        None => None,
    };
    let value = match tag {
        Some(TypeTag::Sir0) => {
            let inner = el
                .children()
                .find(|c| c.is_element())
                .ok_or_else(|| Sir0Error::Xml("sir0 data leaf without nested <sir0>".into()))?;
            LeafValue::Container(Box::new(parse_document(inner)?))
        }
        Some(TypeTag::Str8) | Some(TypeTag::Str16) => {
            LeafValue::Text(el.text().unwrap_or_default().to_string())
        }
        Some(t) if t.is_signed() => {
            let text = el.text().unwrap_or_default().trim().to_string();
            LeafValue::Int(
                text.parse()
                    .map_err(|_| Sir0Error::Xml(format!("bad integer '{text}'")))?,
            )
        }
        Some(TypeTag::Uint)
        | Some(TypeTag::Uint8)
        | Some(TypeTag::Uint16)
        | Some(TypeTag::Uint32)
        | Some(TypeTag::Uint64) => {
            let text = el.text().unwrap_or_default().trim().to_string();
            LeafValue::Uint(
                text.parse()
                    .map_err(|_| Sir0Error::Xml(format!("bad integer '{text}'")))?,
            )
        }
        // raw, skip, padding or untyped: hex payload.
        _ => LeafValue::Bytes(from_hex(el.text().unwrap_or_default().trim())?),
    };
    Ok(Node::Data(DataLeaf { tag, value }))
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

fn from_hex(text: &str) -> Result<Vec<u8>> {
    let text: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if text.len() % 2 != 0 {
        return Err(Sir0Error::Xml("hex payload has odd length".into()));
    }
    let mut out = Vec::with_capacity(text.len() / 2);
    let bytes = text.as_bytes();
    for pair in bytes.chunks(2) {
        let hi = (pair[0] as char)
            .to_digit(16)
            .ok_or_else(|| Sir0Error::Xml(format!("bad hex digit '{}'", pair[0] as char)))?;
        let lo = (pair[1] as char)
            .to_digit(16)
            .ok_or_else(|| Sir0Error::Xml(format!("bad hex digit '{}'", pair[1] as char)))?;
        out.push(((hi << 4) | lo) as u8);
    }
    Ok(out)
}
