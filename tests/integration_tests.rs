//! Integration tests for pdfgraph
//!
//! These tests drive whole documents through the public API: build or
//! hand-assemble a file, load it with either parsing strategy, edit it and
//! write it back.

use pdfgraph::config::{Config, ParserMode, SaveOptions, XrefStyle};
use pdfgraph::pdf::document::Document;
use pdfgraph::pdf::object::{Array, Dictionary, Name, ObjRef, Object, PdfString, Stream};
use pdfgraph::Error;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Assembles classic-table files revision by revision, computing offsets.
struct FileBuilder {
    out: Vec<u8>,
    prev: Option<usize>,
}

impl FileBuilder {
    fn new() -> Self {
        Self {
            out: b"%PDF-1.4\n".to_vec(),
            prev: None,
        }
    }

    fn revision(mut self, objects: &[(u64, &str)], trailer: &str) -> Self {
        let mut offsets = Vec::new();
        for (num, body) in objects {
            offsets.push((*num, self.out.len()));
            self.out
                .extend_from_slice(format!("{num} 0 obj\n{body}\nendobj\n").as_bytes());
        }
        let xref = self.out.len();
        self.out.extend_from_slice(b"xref\n");
        if self.prev.is_none() {
            self.out.extend_from_slice(b"0 1\n0000000000 65535 f\r\n");
        }
        for (num, offset) in offsets {
            self.out
                .extend_from_slice(format!("{num} 1\n{offset:010} 00000 n\r\n").as_bytes());
        }
        let prev = self.prev.map(|p| format!(" /Prev {p}")).unwrap_or_default();
        self.out.extend_from_slice(
            format!("trailer\n<< {trailer}{prev} >>\nstartxref\n{xref}\n%%EOF\n").as_bytes(),
        );
        self.prev = Some(xref);
        self
    }

    fn finish(self) -> Vec<u8> {
        self.out
    }
}

fn sequential() -> Config {
    Config::default().with_parser(ParserMode::Sequential)
}

mod roundtrip {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn leaf() -> impl Strategy<Value = Object> {
        prop_oneof![
            Just(Object::Null),
            any::<bool>().prop_map(Object::Bool),
            (-1_000_000_000_i64..1_000_000_000).prop_map(Object::Int),
            (-4_000_000_i64..4_000_000).prop_map(|q| Object::Real(q as f64 / 4.0)),
            "[A-Za-z][A-Za-z0-9]{0,8}".prop_map(|s| Object::Name(Name::new(&s))),
            proptest::collection::vec(any::<u8>(), 0..24).prop_map(|b| Object::String(PdfString::new(b))),
        ]
    }

    fn object() -> impl Strategy<Value = Object> {
        leaf().prop_recursive(3, 24, 6, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..6).prop_map(Object::from),
                proptest::collection::vec(("K[a-z0-9]{0,6}", inner), 0..6).prop_map(|pairs| {
                    let mut dict = Dictionary::new();
                    for (key, value) in pairs {
                        dict.insert(Name::new(&key), value);
                    }
                    Object::Dict(dict)
                }),
            ]
        })
    }

    proptest! {
        #[test]
        fn test_emit_then_parse_preserves_objects(objects in proptest::collection::vec(object(), 1..8)) {
            let mut doc = Document::new();
            let ids: Vec<ObjRef> = objects.iter().map(|o| doc.insert(o.copy())).collect();
            let bytes = doc.save().unwrap();

            let mut reloaded = Document::load(bytes).unwrap();
            for (id, expected) in ids.iter().zip(&objects) {
                prop_assert_eq!(reloaded.resolve(*id).unwrap(), expected);
            }
        }
    }

    #[test]
    fn test_both_strategies_agree() {
        init_tracing();
        let mut doc = Document::new();
        let font = doc.insert(
            Dictionary::new()
                .with("Type", Name::new("Font"))
                .with("BaseFont", Name::new("Helvetica")),
        );
        let content = doc.insert(Stream::new(Dictionary::new(), b"BT /F1 12 Tf (Hi) Tj ET".to_vec()));
        let bytes = doc.save().unwrap();

        let mut lazy = Document::load(bytes.clone()).unwrap();
        let mut eager = Document::load_with(bytes, sequential()).unwrap();
        for id in [font, content] {
            let a = lazy.resolve(id).unwrap().copy();
            let b = eager.resolve(id).unwrap().copy();
            assert_eq!(a, b);
        }
        assert_eq!(eager.stats().offset_loads, 0);
        assert_eq!(lazy.stats().offset_loads, 2);
    }

    #[test]
    fn test_filtered_stream_roundtrip() {
        let mut doc = Document::new();
        let mut stream = Stream::new(Dictionary::new(), vec![b'x'; 500]);
        stream.set_filters(doc.registry(), &["FlateDecode"]).unwrap();
        let id = doc.insert(stream);
        let bytes = doc.save().unwrap();
        assert!(bytes.len() < 500);

        let mut reloaded = Document::load(bytes).unwrap();
        let mut stream = reloaded.resolve(id).unwrap().as_stream().cloned().unwrap();
        assert_eq!(stream.decode().unwrap(), vec![b'x'; 500].as_slice());
    }

    #[test]
    fn test_non_utf8_name_survives_reload_and_save() {
        let bytes = FileBuilder::new()
            .revision(&[(1, "<< /Type /Catalog /F /Caf#E9 >>")], "/Size 2 /Root 1 0 R")
            .finish();
        for config in [Config::default(), sequential()] {
            let mut doc = Document::load_with(bytes.clone(), config).unwrap();
            let name = doc.catalog().unwrap().get_name("F").cloned().unwrap();
            assert_eq!(name.as_bytes(), b"Caf\xE9");

            let out = doc.save().unwrap();
            assert!(out.windows(8).any(|w| w == b"/Caf#E9 "));
            let mut reloaded = Document::load(out).unwrap();
            assert_eq!(reloaded.catalog().unwrap().get_name("F"), Some(&name));
        }
    }

    #[test]
    fn test_save_to_and_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pdf");
        let mut doc = Document::new();
        let catalog = doc.insert(Dictionary::new().with("Type", Name::new("Catalog")));
        doc.trailer_mut().set_root(catalog);
        doc.save_to(&path).unwrap();

        let mut opened = Document::open(&path).unwrap();
        assert!(opened.catalog().unwrap().is_type("Catalog"));
    }
}

mod revisions {
    use super::*;
    use pretty_assertions::assert_eq;

    fn two_revisions() -> Vec<u8> {
        FileBuilder::new()
            .revision(&[(5, "(A)")], "/Size 6")
            .revision(&[(5, "(B)")], "/Size 6")
            .finish()
    }

    #[test]
    fn test_newest_revision_wins() {
        for config in [Config::default(), sequential()] {
            let mut doc = Document::load_with(two_revisions(), config).unwrap();
            assert_eq!(doc.revision_count(), 2);
            assert_eq!(doc.resolve(ObjRef::new(5, 0)).unwrap(), &Object::string("B"));
        }
    }

    #[test]
    fn test_removing_revision_uncovers_older_value() {
        for config in [Config::default(), sequential()] {
            let mut doc = Document::load_with(two_revisions(), config).unwrap();
            doc.remove_revision(1).unwrap();
            assert_eq!(doc.resolve(ObjRef::new(5, 0)).unwrap(), &Object::string("A"));
        }
    }

    #[test]
    fn test_root_is_served_from_body_cache() {
        let bytes = FileBuilder::new()
            .revision(
                &[(1, "<< /Root 2 0 R >>"), (2, "<< /Type /Catalog >>")],
                "/Size 3 /Root 2 0 R",
            )
            .revision(&[(3, "<< /Producer (x) >>")], "/Size 4 /Root 2 0 R")
            .finish();
        let mut doc = Document::load_with(bytes, sequential()).unwrap();
        let root = doc.trailer().root().unwrap();
        assert!(doc.resolve(root).unwrap().dict().unwrap().is_type("Catalog"));
        let stats = doc.stats();
        assert_eq!(stats.offset_loads, 0);
        assert_eq!(stats.body_hits, 1);
    }

    #[test]
    fn test_prev_zero_terminates_chain() {
        let bytes = FileBuilder::new()
            .revision(&[(1, "<< /Type /Catalog >>")], "/Size 2 /Root 1 0 R /Prev 0")
            .finish();
        let mut doc = Document::load(bytes).unwrap();
        assert_eq!(doc.revision_count(), 1);
        assert!(doc.catalog().is_ok());
    }

    #[test]
    fn test_squash_then_save_keeps_latest_values() {
        let mut doc = Document::load(two_revisions()).unwrap();
        doc.squash().unwrap();
        let bytes = doc.save().unwrap();
        let mut reloaded = Document::load(bytes).unwrap();
        assert_eq!(reloaded.revision_count(), 1);
        assert_eq!(reloaded.resolve(ObjRef::new(5, 0)).unwrap(), &Object::string("B"));
    }

    #[test]
    fn test_full_save_keeps_every_revision() {
        let mut doc = Document::load(two_revisions()).unwrap();
        let bytes = doc.save().unwrap();
        let mut reloaded = Document::load(bytes).unwrap();
        assert_eq!(reloaded.revision_count(), 2);
        assert_eq!(reloaded.resolve(ObjRef::new(5, 0)).unwrap(), &Object::string("B"));
        reloaded.remove_revision(1).unwrap();
        assert_eq!(reloaded.resolve(ObjRef::new(5, 0)).unwrap(), &Object::string("A"));
    }
}

mod free_list {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_deleted_object_is_on_the_chain_once() {
        let mut doc = Document::new();
        let keep = doc.insert(Object::Int(1));
        let gone = doc.insert(Object::Int(2));
        let also = doc.insert(Object::Int(3));
        doc.delete(gone).unwrap();
        let bytes = doc.save().unwrap();

        let mut reloaded = Document::load(bytes).unwrap();
        let table = reloaded.revisions()[0].xref().unwrap().table.clone().unwrap();
        let chain = table.free_chain().unwrap();
        assert_eq!(chain.iter().filter(|n| **n == gone.num).count(), 1);
        assert_eq!(reloaded.resolve(gone).unwrap(), &Object::Null);
        assert_eq!(reloaded.resolve(keep).unwrap(), &Object::Int(1));
        assert_eq!(reloaded.resolve(also).unwrap(), &Object::Int(3));
    }

    #[test]
    fn test_delete_in_new_revision_shadows_old_object() {
        let bytes = FileBuilder::new()
            .revision(&[(1, "<< /Type /Catalog >>"), (2, "42")], "/Size 3 /Root 1 0 R")
            .finish();
        let mut doc = Document::load(bytes).unwrap();
        doc.delete(ObjRef::new(2, 0)).unwrap();
        let out = doc
            .save_with(&SaveOptions {
                incremental: true,
                ..SaveOptions::default()
            })
            .unwrap();

        let mut reloaded = Document::load(out).unwrap();
        assert_eq!(reloaded.revision_count(), 2);
        assert_eq!(reloaded.resolve(ObjRef::new(2, 0)).unwrap(), &Object::Null);
        let newest = &reloaded.revisions()[1];
        let chain = newest.xref().unwrap().table.as_ref().unwrap().free_chain().unwrap();
        assert_eq!(chain, vec![2]);
    }

    #[test]
    fn test_strict_resolution_of_freed_object_fails() {
        let mut doc = Document::with_config(Config::strict());
        let id = doc.insert(Object::Int(1));
        doc.delete(id).unwrap();
        assert!(matches!(doc.resolve(id), Err(Error::Resolution(_))));
    }
}

mod cache {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_nested_string_counted_once() {
        let inner = Array::from_vec(vec![Object::string("S")]);
        let middle = Array::from_vec(vec![Object::Array(inner)]);
        let dict = Dictionary::new().with("K", middle);
        assert_eq!(dict.cache().string_count(b"S"), 1);
    }

    #[test]
    fn test_insert_after_nesting_updates_outer_cache() {
        let middle = Array::from_vec(vec![Object::Array(Array::new())]);
        let mut dict = Dictionary::new().with("K", middle);
        dict.update("K", |k| {
            if let Some(middle) = k.as_array_mut() {
                middle.update(0, |inner| {
                    if let Some(inner) = inner.as_array_mut() {
                        inner.push(Object::string("S"));
                    }
                });
            }
        });
        assert_eq!(dict.cache().string_count(b"S"), 1);
        dict.remove("K");
        assert_eq!(dict.cache().string_count(b"S"), 0);
    }

    #[test]
    fn test_reference_cache_drives_referrers() {
        let mut doc = Document::new();
        let target = doc.insert(Object::Int(1));
        let holder = doc.insert(Dictionary::new().with("Deep", vec![Object::from(vec![Object::Ref(target)])]));
        assert_eq!(doc.referrers(target).unwrap(), vec![holder]);
    }

    proptest! {
        #[test]
        fn test_string_counts_match_contents(strings in proptest::collection::vec("[a-c]{1,2}", 0..20)) {
            let mut dict = Dictionary::new();
            for (i, s) in strings.iter().enumerate() {
                let nested = Array::from_vec(vec![Object::from(vec![Object::string(s.as_str())])]);
                dict.insert(Name::new(&format!("K{i}")), nested);
            }
            for s in &strings {
                let expected = strings.iter().filter(|other| *other == s).count();
                prop_assert_eq!(dict.cache().string_count(s.as_bytes()), expected);
            }
        }
    }
}

mod xref_streams {
    use super::*;
    use pretty_assertions::assert_eq;

    /// File indexed by one unfiltered xref stream with the given rows.
    fn stream_indexed(w: &str, index: &str, size: u64, rows: &[u8]) -> Vec<u8> {
        let mut out = b"%PDF-1.5\n".to_vec();
        let offset = out.len();
        out.extend_from_slice(
            format!(
                "9 0 obj\n<< /Type /XRef /W {w} /Index {index} /Size {size} /Length {} >>\nstream\n",
                rows.len()
            )
            .as_bytes(),
        );
        out.extend_from_slice(rows);
        out.extend_from_slice(format!("\nendstream\nendobj\nstartxref\n{offset}\n%%EOF\n").as_bytes());
        out
    }

    #[test]
    fn test_w_1_2_1_decodes_three_entries() {
        use pdfgraph::pdf::xref::XrefEntry;
        let rows = [0, 0, 0, 0, 1, 0, 10, 0, 2, 0, 4, 1];
        let bytes = stream_indexed("[1 2 1]", "[0 3]", 3, &rows);
        let doc = Document::load(bytes).unwrap();
        let xref = doc.revisions()[0].xref().unwrap();
        let table = &xref.stream.as_ref().unwrap().table;
        assert_eq!(table.get(0), Some(XrefEntry::free(0, 0)));
        assert_eq!(table.get(1), Some(XrefEntry::in_use(10, 0)));
        assert_eq!(table.get(2), Some(XrefEntry::compressed(4, 1)));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_object_streams_roundtrip_with_both_styles() {
        for style in [XrefStyle::Stream, XrefStyle::Hybrid] {
            let mut doc = Document::new();
            let ids: Vec<ObjRef> = (0..10).map(|i| doc.insert(Dictionary::new().with("N", i))).collect();
            let image = doc.insert(Stream::new(Dictionary::new(), b"pixels".to_vec()));
            let bytes = doc
                .save_with(&SaveOptions {
                    xref_style: style,
                    object_streams: true,
                    incremental: false,
                })
                .unwrap();

            for config in [Config::default(), sequential()] {
                let mut reloaded = Document::load_with(bytes.clone(), config).unwrap();
                for (i, id) in ids.iter().enumerate() {
                    let n = reloaded.resolve(*id).unwrap().as_dict().and_then(|d| d.get_int("N"));
                    assert_eq!(n, Some(i as i64), "{style:?}");
                }
                assert!(reloaded.resolve(image).unwrap().as_stream().is_some());
            }
        }
    }

    #[test]
    fn test_sequential_finds_packed_objects_through_index() {
        let mut doc = Document::new();
        let id = doc.insert(Dictionary::new().with("Packed", true));
        let bytes = doc
            .save_with(&SaveOptions {
                xref_style: XrefStyle::Stream,
                object_streams: true,
                incremental: false,
            })
            .unwrap();
        let mut reloaded = Document::load_with(bytes, sequential()).unwrap();
        assert_eq!(
            reloaded.resolve(id).unwrap().as_dict().and_then(|d| d.get("Packed")),
            Some(&Object::Bool(true))
        );
        assert_eq!(reloaded.stats().container_loads, 1);
    }
}

mod recovery {
    use super::*;
    use pretty_assertions::assert_eq;

    fn broken_startxref() -> Vec<u8> {
        let good = FileBuilder::new()
            .revision(&[(1, "<< /Type /Catalog >>"), (2, "(two)")], "/Size 3 /Root 1 0 R")
            .finish();
        let text = String::from_utf8(good).unwrap();
        let cut = text.rfind("startxref").unwrap();
        format!("{}startxref\n999999\n%%EOF\n", &text[..cut]).into_bytes()
    }

    #[test]
    fn test_bad_startxref_is_rebuilt() {
        init_tracing();
        let mut doc = Document::load(broken_startxref()).unwrap();
        assert!(!doc.diagnostics().is_empty());
        assert_eq!(doc.resolve(ObjRef::new(2, 0)).unwrap(), &Object::string("two"));
        assert!(doc.catalog().unwrap().is_type("Catalog"));
    }

    #[test]
    fn test_bad_startxref_is_fatal_without_recovery() {
        let config = Config {
            recover: false,
            ..Config::default()
        };
        assert!(Document::load_with(broken_startxref(), config).is_err());
    }

    #[test]
    fn test_wrong_offset_is_found_by_scanning() {
        let good = FileBuilder::new()
            .revision(&[(1, "<< /Type /Catalog >>"), (2, "(two)")], "/Size 3 /Root 1 0 R")
            .finish();
        let text = String::from_utf8(good).unwrap();
        let real = text.find("2 0 obj").unwrap();
        let wrong = format!("{:010} 00000 n", real + 3);
        let right = format!("{real:010} 00000 n");
        let damaged = text.replace(&right, &wrong);

        let mut doc = Document::load(damaged.into_bytes()).unwrap();
        assert_eq!(doc.resolve(ObjRef::new(2, 0)).unwrap(), &Object::string("two"));
    }

    #[test]
    fn test_sequential_skips_garbage_between_objects() {
        let mut bytes = b"%PDF-1.4\n1 0 obj\n(one)\nendobj\n".to_vec();
        bytes.extend_from_slice(b"@@@ not an object @@@\n");
        bytes.extend_from_slice(b"2 0 obj\n(two)\nendobj\ntrailer\n<< /Size 3 >>\n%%EOF\n");
        let mut doc = Document::load_with(bytes, sequential()).unwrap();
        assert_eq!(doc.resolve(ObjRef::new(1, 0)).unwrap(), &Object::string("one"));
        assert_eq!(doc.resolve(ObjRef::new(2, 0)).unwrap(), &Object::string("two"));
        assert!(!doc.diagnostics().is_empty());
    }
}

mod encryption {
    use super::*;
    use pretty_assertions::assert_eq;
    use pdfgraph::pdf::crypt::CryptMethod;

    fn secret_document(method: CryptMethod) -> (Vec<u8>, ObjRef, ObjRef) {
        let mut doc = Document::new();
        let text = doc.insert(Dictionary::new().with("Title", Object::string("Quarterly numbers")));
        let mut stream = Stream::new(Dictionary::new(), b"confidential stream body".to_vec());
        stream.set_filters(doc.registry(), &["FlateDecode"]).unwrap();
        let data = doc.insert(stream);
        let catalog = doc.insert(Dictionary::new().with("Type", Name::new("Catalog")));
        doc.trailer_mut().set_root(catalog);
        doc.encrypt(method, b"user", b"owner", -4);
        (doc.save().unwrap(), text, data)
    }

    #[test]
    fn test_roundtrip_with_each_method() {
        for method in [CryptMethod::Rc4 { key_bits: 40 }, CryptMethod::Rc4 { key_bits: 128 }, CryptMethod::Aes128] {
            let (bytes, text, data) = secret_document(method);
            assert!(!bytes.windows(9).any(|w| w == b"Quarterly"), "{method:?}");

            let mut doc = Document::load_encrypted(bytes, b"user", Config::default()).unwrap();
            assert!(doc.is_encrypted());
            let title = doc.resolve(text).unwrap().as_dict().and_then(|d| d.get_string("Title")).cloned();
            assert_eq!(title.as_ref().and_then(PdfString::as_str), Some("Quarterly numbers"));
            let mut stream = doc.resolve(data).unwrap().as_stream().cloned().unwrap();
            assert_eq!(stream.decode().unwrap(), b"confidential stream body");
        }
    }

    #[test]
    fn test_missing_password_is_rejected() {
        let (bytes, _, _) = secret_document(CryptMethod::Aes128);
        assert!(matches!(Document::load(bytes.clone()), Err(Error::Encryption(_))));
        assert!(matches!(
            Document::load_encrypted(bytes, b"wrong", Config::default()),
            Err(Error::Encryption(_))
        ));
    }

    #[test]
    fn test_sequential_load_decrypts_bodies() {
        let (bytes, text, _) = secret_document(CryptMethod::Rc4 { key_bits: 128 });
        let mut doc = Document::load_encrypted(bytes, b"user", sequential()).unwrap();
        let title = doc.resolve(text).unwrap().as_dict().and_then(|d| d.get_string("Title")).cloned();
        assert_eq!(title.as_ref().and_then(PdfString::as_str), Some("Quarterly numbers"));
    }
}

mod incremental {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_append_leaves_original_bytes_untouched() {
        let original = FileBuilder::new()
            .revision(&[(1, "<< /Type /Catalog /Pages 2 0 R >>"), (2, "<< /Type /Pages /Kids [] /Count 0 >>")], "/Size 3 /Root 1 0 R")
            .finish();
        let mut doc = Document::load(original.clone()).unwrap();
        let info = doc.insert(Dictionary::new().with("Producer", Object::string("pdfgraph")));
        doc.trailer_mut().dict_mut().insert("Info", info);
        let out = doc
            .save_with(&SaveOptions {
                incremental: true,
                ..SaveOptions::default()
            })
            .unwrap();
        assert!(out.starts_with(&original));

        let mut reloaded = Document::load(out).unwrap();
        assert_eq!(reloaded.revision_count(), 2);
        assert_eq!(reloaded.trailer().info(), Some(info));
        assert_eq!(info.num, 3);
        assert!(reloaded.catalog().unwrap().is_type("Catalog"));
    }

    #[test]
    fn test_second_save_continues_the_chain() {
        let mut doc = Document::new();
        let counter = doc.insert(Object::Int(0));
        let options = SaveOptions {
            incremental: true,
            ..SaveOptions::default()
        };
        let mut bytes = doc.save_with(&options).unwrap();
        for round in 1..=3 {
            *doc.get_mut(counter).unwrap() = Object::Int(round);
            let next = doc.save_with(&options).unwrap();
            assert!(next.starts_with(&bytes));
            bytes = next;
        }
        let mut reloaded = Document::load(bytes).unwrap();
        assert_eq!(reloaded.revision_count(), 4);
        assert_eq!(reloaded.resolve(counter).unwrap(), &Object::Int(3));
    }

    #[test]
    fn test_removed_parsed_revision_forces_full_rewrite() {
        let original = FileBuilder::new()
            .revision(&[(5, "(A)")], "/Size 6")
            .revision(&[(5, "(B)")], "/Size 6")
            .finish();
        let mut doc = Document::load(original.clone()).unwrap();
        doc.remove_revision(1).unwrap();
        let out = doc
            .save_with(&SaveOptions {
                incremental: true,
                ..SaveOptions::default()
            })
            .unwrap();
        assert!(!out.starts_with(&original));
        let mut reloaded = Document::load(out).unwrap();
        assert_eq!(reloaded.resolve(ObjRef::new(5, 0)).unwrap(), &Object::string("A"));
    }
}

mod graph {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cyclic_page_tree_is_an_invariant_violation() {
        let bytes = FileBuilder::new()
            .revision(
                &[
                    (1, "<< /Type /Catalog /Pages 2 0 R >>"),
                    (2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>"),
                    (3, "<< /Type /Pages /Kids [2 0 R] /Count 1 >>"),
                ],
                "/Size 4 /Root 1 0 R",
            )
            .finish();
        let mut doc = Document::load(bytes).unwrap();
        let result = doc.check_tree(ObjRef::new(2, 0), "Kids");
        assert!(matches!(result, Err(Error::Invariant(_))));
    }

    #[test]
    fn test_each_object_through_containers() {
        let mut doc = Document::new();
        doc.insert(Dictionary::new().with("A", 1));
        doc.insert(Stream::new(Dictionary::new(), b"s".to_vec()));
        let bytes = doc
            .save_with(&SaveOptions {
                xref_style: XrefStyle::Stream,
                object_streams: true,
                incremental: false,
            })
            .unwrap();
        let mut reloaded = Document::load(bytes).unwrap();
        let all = reloaded.each_object(false, true).unwrap().len();
        let outside = reloaded.each_object(false, false).unwrap().len();
        // the packed dictionary is only reachable through its container
        assert_eq!(all, outside + 1);
    }
}

mod filters {
    use pdfgraph::pdf::filter::FilterRegistry;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_decode_inverts_encode(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let registry = FilterRegistry::standard();
            for name in ["FlateDecode", "LZWDecode", "ASCII85Decode", "ASCIIHexDecode", "RunLengthDecode"] {
                let filter = registry.get(name).unwrap();
                let encoded = filter.encode(&data, None).unwrap();
                prop_assert_eq!(filter.decode(&encoded, None).unwrap(), data.clone(), "{}", name);
            }
        }
    }
}
