use sir0_core::container::DecodeOptions;
use sir0_core::{
    DataLeaf, Document, Endianness, LeafValue, Node, PtrWidth, SchemaGrammar, Sir0Error, TypeTag,
    decode, encode, from_xml, ptrlist, to_xml,
};

fn single_leaf_doc(bytes: Vec<u8>) -> Document {
    Document {
        endianness: Endianness::Little,
        width: PtrWidth::W4,
        root: Node::Struct {
            id: None,
            children: vec![Node::raw(bytes)],
        },
    }
}

fn shared_struct_doc() -> Document {
    let shared = Node::Struct {
        id: Some("0".into()),
        children: vec![Node::raw(vec![0xDE, 0xAD, 0xBE, 0xEF])],
    };
    Document {
        endianness: Endianness::Little,
        width: PtrWidth::W4,
        root: Node::Struct {
            id: None,
            children: vec![shared, Node::Reference { target: "0".into() }],
        },
    }
}

#[test]
fn pointer_list_varint_roundtrip() {
    let offsets = vec![4, 8, 0x10, 0x90, 0x2000, 0x2000 + 0x1F_FFFF, u64::from(u32::MAX) + 77];
    let mut buf = vec![0xAAu8; 3];
    ptrlist::encode(&offsets, &mut buf);
    buf.extend_from_slice(&[0x55, 0x55]);
    assert_eq!(ptrlist::decode(&buf, 3).unwrap(), offsets);
}

#[test]
fn pointer_list_multibyte_delta_encoding() {
    // 0x80 does not fit one 7-bit group: high group first, continuation set.
    let mut buf = Vec::new();
    ptrlist::encode(&[0x80], &mut buf);
    assert_eq!(buf, [0x81, 0x00, 0x00]);
}

#[test]
fn pointer_list_without_terminator_is_an_error() {
    let err = ptrlist::decode(&[0x84, 0x84], 0).unwrap_err();
    assert!(matches!(err, Sir0Error::Format { .. }));
}

#[test]
fn minimal_container_layout() {
    let doc = single_leaf_doc(vec![0x2A, 0, 0, 0]);
    let bytes = encode(&doc).unwrap();

    let mut expected = Vec::new();
    expected.extend_from_slice(b"SIR0");
    expected.extend_from_slice(&0x10u32.to_le_bytes());
    expected.extend_from_slice(&0x14u32.to_le_bytes());
    expected.extend_from_slice(&[0; 4]);
    expected.extend_from_slice(&[0x2A, 0, 0, 0]);
    // Header slots at 4 and 8, delta-encoded, then the terminator.
    expected.extend_from_slice(&[0x04, 0x04, 0x00]);
    expected.resize(32, 0);
    assert_eq!(bytes, expected);

    assert_eq!(decode(&bytes, &DecodeOptions::default()).unwrap(), doc);
}

#[test]
fn schema_types_the_minimal_leaf() {
    let bytes = encode(&single_leaf_doc(vec![0x2A, 0, 0, 0])).unwrap();
    let grammar = SchemaGrammar::from_json_str(r#"{ "Root": ["uint32"] }"#).unwrap();
    let opts = DecodeOptions {
        schema: Some(&grammar),
        ..Default::default()
    };
    let doc = decode(&bytes, &opts).unwrap();
    let Node::Struct { children, .. } = &doc.root else {
        panic!("root must be a struct");
    };
    assert_eq!(
        children,
        &vec![Node::Data(DataLeaf {
            tag: Some(TypeTag::Uint32),
            value: LeafValue::Uint(42),
        })]
    );
}

#[test]
fn struct_extends_to_next_pointed_address() {
    // Hand-built file: root at 0x10 points to 0x20, which points to 0x30.
    let mut data = Vec::new();
    data.extend_from_slice(b"SIR0");
    data.extend_from_slice(&0x10u32.to_le_bytes());
    data.extend_from_slice(&0x40u32.to_le_bytes());
    data.resize(0x40, 0);
    data[0x10..0x14].copy_from_slice(&0x20u32.to_le_bytes());
    data[0x20..0x24].copy_from_slice(&0x30u32.to_le_bytes());
    ptrlist::encode(&[4, 8, 0x10, 0x20], &mut data);
    data.resize(0x50, 0);

    let doc = decode(&data, &DecodeOptions::default()).unwrap();
    let c = Node::Struct {
        id: None,
        children: vec![Node::raw(vec![0; 16])],
    };
    let b = Node::Struct {
        id: None,
        children: vec![c, Node::raw(vec![0; 12])],
    };
    let root = Node::Struct {
        id: None,
        children: vec![b, Node::raw(vec![0; 12])],
    };
    assert_eq!(doc.root, root);
}

#[test]
fn shared_struct_gets_id_and_reference() {
    let doc = shared_struct_doc();
    let bytes = encode(&doc).unwrap();
    let back = decode(&bytes, &DecodeOptions::default()).unwrap();
    assert_eq!(back, doc);
    assert_eq!(encode(&back).unwrap(), bytes);
}

#[test]
fn cyclic_pointer_graph_terminates_with_reference() {
    // Hand-built file: root at 0x10 points to 0x18, which points back.
    let mut data = Vec::new();
    data.extend_from_slice(b"SIR0");
    data.extend_from_slice(&0x10u32.to_le_bytes());
    data.extend_from_slice(&0x20u32.to_le_bytes());
    data.resize(0x10, 0);
    data.extend_from_slice(&0x18u32.to_le_bytes());
    data.extend_from_slice(&[1, 1, 1, 1]);
    data.extend_from_slice(&0x10u32.to_le_bytes());
    data.extend_from_slice(&[2, 2, 2, 2]);
    ptrlist::encode(&[4, 8, 0x10, 0x18], &mut data);
    data.resize(0x30, 0);

    let doc = decode(&data, &DecodeOptions::default()).unwrap();
    // The back edge lands on the already-visited root, so it becomes a
    // reference and the root carries the id.
    let b = Node::Struct {
        id: None,
        children: vec![
            Node::Reference { target: "0".into() },
            Node::raw(vec![2, 2, 2, 2]),
        ],
    };
    let root = Node::Struct {
        id: Some("0".into()),
        children: vec![b, Node::raw(vec![1, 1, 1, 1])],
    };
    assert_eq!(doc.root, root);

    let rebuilt = decode(&encode(&doc).unwrap(), &DecodeOptions::default()).unwrap();
    assert_eq!(rebuilt, doc);
}

#[test]
fn wide_mode_roundtrip() {
    let doc = Document {
        endianness: Endianness::Little,
        width: PtrWidth::W8,
        root: Node::Struct {
            id: None,
            children: vec![
                Node::Struct {
                    id: None,
                    children: vec![Node::raw(vec![7; 8])],
                },
                Node::raw(vec![1, 2, 3, 4, 5, 6, 7, 8]),
            ],
        },
    };
    let bytes = encode(&doc).unwrap();
    assert_eq!(&bytes[0..4], b"SIR0");
    // The zero field after the magic is what flags the 8-byte layout.
    assert!(bytes[4..8].iter().all(|&b| b == 0));
    assert_eq!(bytes.len() % 16, 0);
    assert_eq!(decode(&bytes, &DecodeOptions::default()).unwrap(), doc);
}

#[test]
fn big_endian_roundtrip() {
    let doc = Document {
        endianness: Endianness::Big,
        width: PtrWidth::W4,
        root: Node::Struct {
            id: None,
            children: vec![Node::raw(vec![0, 0, 0, 0x2A])],
        },
    };
    let bytes = encode(&doc).unwrap();
    assert_eq!(&bytes[4..8], &0x10u32.to_be_bytes());
    let opts = DecodeOptions {
        endianness: Endianness::Big,
        ..Default::default()
    };
    assert_eq!(decode(&bytes, &opts).unwrap(), doc);
}

#[test]
fn rejects_bad_magic() {
    let mut bytes = encode(&single_leaf_doc(vec![0; 4])).unwrap();
    bytes[0] = b'X';
    assert!(matches!(
        decode(&bytes, &DecodeOptions::default()),
        Err(Sir0Error::BadMagic { .. })
    ));
}

#[test]
fn rejects_unresolved_reference() {
    let doc = Document {
        endianness: Endianness::Little,
        width: PtrWidth::W4,
        root: Node::Struct {
            id: None,
            children: vec![Node::Reference { target: "9".into() }],
        },
    };
    assert!(matches!(
        encode(&doc),
        Err(Sir0Error::UnresolvedReference { .. })
    ));
}

#[test]
fn rejects_misaligned_pointer_field() {
    let doc = Document {
        endianness: Endianness::Little,
        width: PtrWidth::W4,
        root: Node::Struct {
            id: None,
            children: vec![
                Node::raw(vec![1, 2]),
                Node::Struct {
                    id: None,
                    children: vec![Node::raw(vec![0; 4])],
                },
            ],
        },
    };
    let err = encode(&doc).unwrap_err();
    assert!(matches!(err, Sir0Error::Alignment { offset: 2, width: 4 }));
    assert!(err.to_string().contains("struct-relative"));

    // Same check inside a nested struct: the reported offset is local to
    // that struct, not to the file.
    let nested = Document {
        endianness: Endianness::Little,
        width: PtrWidth::W4,
        root: Node::Struct {
            id: None,
            children: vec![Node::Struct {
                id: None,
                children: vec![
                    Node::raw(vec![9]),
                    Node::Reference { target: "0".into() },
                ],
            }],
        },
    };
    let err = encode(&nested).unwrap_err();
    assert!(matches!(err, Sir0Error::Alignment { offset: 1, width: 4 }));
}

#[test]
fn schema_error_when_pointer_slot_meets_primitive() {
    let doc = Document {
        endianness: Endianness::Little,
        width: PtrWidth::W4,
        root: Node::Struct {
            id: None,
            children: vec![Node::Struct {
                id: None,
                children: vec![Node::raw(vec![0; 4])],
            }],
        },
    };
    let bytes = encode(&doc).unwrap();
    let grammar = SchemaGrammar::from_json_str(r#"{ "Root": ["uint32"] }"#).unwrap();
    let opts = DecodeOptions {
        schema: Some(&grammar),
        ..Default::default()
    };
    assert!(matches!(decode(&bytes, &opts), Err(Sir0Error::Schema(_))));
}

#[test]
fn schema_error_when_run_outlives_grammar() {
    let bytes = encode(&single_leaf_doc(vec![0; 8])).unwrap();
    let grammar = SchemaGrammar::from_json_str(r#"{ "Root": ["uint32"] }"#).unwrap();
    let opts = DecodeOptions {
        schema: Some(&grammar),
        ..Default::default()
    };
    assert!(matches!(decode(&bytes, &opts), Err(Sir0Error::Schema(_))));
}

#[test]
fn schema_error_on_truncated_field() {
    let bytes = encode(&single_leaf_doc(vec![0; 4])).unwrap();
    let grammar = SchemaGrammar::from_json_str(r#"{ "Root": ["uint16", "uint32"] }"#).unwrap();
    let opts = DecodeOptions {
        schema: Some(&grammar),
        ..Default::default()
    };
    assert!(matches!(decode(&bytes, &opts), Err(Sir0Error::Schema(_))));
}

#[test]
fn nested_container_ids_do_not_collide() {
    let inner = Document {
        endianness: Endianness::Little,
        width: PtrWidth::W4,
        root: Node::Struct {
            id: None,
            children: vec![
                Node::Struct {
                    id: Some("0".into()),
                    children: vec![Node::raw(vec![9, 9, 9, 9])],
                },
                Node::Reference { target: "0".into() },
            ],
        },
    };
    let outer = Document {
        endianness: Endianness::Little,
        width: PtrWidth::W4,
        root: Node::Struct {
            id: None,
            children: vec![
                Node::Struct {
                    id: Some("0".into()),
                    children: vec![Node::Data(DataLeaf {
                        tag: Some(TypeTag::Uint32),
                        value: LeafValue::Uint(1),
                    })],
                },
                Node::Reference { target: "0".into() },
                Node::Data(DataLeaf {
                    tag: Some(TypeTag::Sir0),
                    value: LeafValue::Container(Box::new(inner)),
                }),
            ],
        },
    };
    let bytes = encode(&outer).unwrap();

    let grammar = SchemaGrammar::from_json_str(
        r#"{ "Root": ["&Shared", "&Shared", "sir0"], "Shared": ["uint32"] }"#,
    )
    .unwrap();
    let opts = DecodeOptions {
        schema: Some(&grammar),
        ..Default::default()
    };
    let doc = decode(&bytes, &opts).unwrap();

    let Node::Struct { children, .. } = &doc.root else {
        panic!("root must be a struct");
    };
    let Node::Struct { id: outer_id, .. } = &children[0] else {
        panic!("first child must be the shared struct");
    };
    assert_eq!(outer_id.as_deref(), Some("0"));
    let Node::Data(DataLeaf {
        value: LeafValue::Container(nested),
        ..
    }) = &children[2]
    else {
        panic!("third child must hold the nested container");
    };
    let Node::Struct {
        children: nested_children,
        ..
    } = &nested.root
    else {
        panic!("nested root must be a struct");
    };
    let Node::Struct { id: nested_id, .. } = &nested_children[0] else {
        panic!("nested first child must be the shared struct");
    };
    assert_eq!(nested_id.as_deref(), Some("0_0"));

    assert_eq!(encode(&doc).unwrap(), bytes);
}

#[test]
fn xml_roundtrip_preserves_tree() {
    let doc = Document {
        endianness: Endianness::Big,
        width: PtrWidth::W8,
        root: Node::Struct {
            id: None,
            children: vec![
                Node::Struct {
                    id: Some("0".into()),
                    children: vec![
                        Node::Data(DataLeaf {
                            tag: Some(TypeTag::Uint32),
                            value: LeafValue::Uint(42),
                        }),
                        Node::Data(DataLeaf {
                            tag: Some(TypeTag::Int16),
                            value: LeafValue::Int(-7),
                        }),
                        Node::Data(DataLeaf {
                            tag: Some(TypeTag::Str8),
                            value: LeafValue::Text("ab\\x01".into()),
                        }),
                    ],
                },
                Node::Reference { target: "0".into() },
                Node::raw(vec![0xCA, 0xFE]),
                Node::Data(DataLeaf {
                    tag: Some(TypeTag::Sir0),
                    value: LeafValue::Container(Box::new(single_leaf_doc(vec![1, 2, 3, 4]))),
                }),
            ],
        },
    };
    let text = to_xml(&doc, false).unwrap();
    assert_eq!(from_xml(&text).unwrap(), doc);
}

#[test]
fn ascii_comments_are_ignored_by_the_reader() {
    let doc = single_leaf_doc(b"Hi--there".to_vec());
    let text = to_xml(&doc, true).unwrap();
    assert!(text.contains("<!--"));
    assert_eq!(from_xml(&text).unwrap(), doc);
}

#[test]
fn file_roundtrip_via_tempdir() {
    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join("demo.sir0");
    let doc = shared_struct_doc();
    std::fs::write(&bin, encode(&doc).unwrap()).unwrap();

    let data = std::fs::read(&bin).unwrap();
    let back = decode(&data, &DecodeOptions::default()).unwrap();
    let xml_path = dir.path().join("demo.xml");
    std::fs::write(&xml_path, to_xml(&back, false).unwrap()).unwrap();

    let reread = from_xml(&std::fs::read_to_string(&xml_path).unwrap()).unwrap();
    assert_eq!(encode(&reread).unwrap(), data);
}
