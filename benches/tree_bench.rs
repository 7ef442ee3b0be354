#![allow(clippy::expect_used)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::fmt::Write;
use xmlgrove::command::Session;
use xmlgrove::{ChildPosition, DepthLimit, Document, Placement, TreeEnumerator};

// ---------------------------------------------------------------------------
// Document generators
// ---------------------------------------------------------------------------

/// Generates a catalog with `books` books, each holding three fields.
fn make_catalog(books: usize) -> String {
    let mut xml = String::from("<?xml version=\"1.0\"?>\n<catalog>\n");
    for i in 0..books {
        let _ = writeln!(
            xml,
            "  <book id=\"bk{i}\"><title>Title {i}</title>\
             <author>Author {i}</author>\
             <price>{}.99</price></book>",
            10 + i
        );
    }
    xml.push_str("</catalog>\n");
    xml
}

/// Generates a chain of `depth` nested elements.
fn make_nested(depth: usize) -> String {
    let mut xml = String::new();
    for i in 0..depth {
        let _ = write!(xml, "<n{i}>");
    }
    for i in (0..depth).rev() {
        let _ = write!(xml, "</n{i}>");
    }
    xml
}

fn catalog(books: usize) -> Document {
    Document::parse(&make_catalog(books), false).expect("catalog parses")
}

// ---------------------------------------------------------------------------
// Parsing and serialization
// ---------------------------------------------------------------------------

fn bench_parse_catalog(c: &mut Criterion) {
    let xml = make_catalog(1000);
    c.bench_function("parse_catalog_1000", |b| {
        b.iter(|| Document::parse(black_box(&xml), false));
    });
}

fn bench_serialize_catalog(c: &mut Criterion) {
    let doc = catalog(1000);
    c.bench_function("serialize_catalog_1000", |b| {
        b.iter(|| doc.serialize(black_box(doc.root()), false));
    });
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

fn bench_resolve_last_book(c: &mut Criterion) {
    let doc = catalog(1000);
    c.bench_function("resolve_last_book", |b| {
        b.iter(|| doc.resolve(black_box("/catalog/book[1000]/price")));
    });
}

fn bench_path_of_every_node(c: &mut Criterion) {
    let doc = catalog(200);
    let root = doc.root_element().expect("root element");
    c.bench_function("path_of_every_node_200", |b| {
        b.iter(|| {
            TreeEnumerator::new(&doc, root, DepthLimit::Unbounded)
                .map(|(node, _)| doc.path_of(node).len())
                .sum::<usize>()
        });
    });
}

fn bench_resolve_deep(c: &mut Criterion) {
    let doc = Document::parse(&make_nested(200), false).expect("nested parses");
    let leaf = doc
        .descendants(doc.root())
        .last()
        .expect("nested document has a leaf");
    let path = doc.path_of(leaf);
    c.bench_function("resolve_depth_200", |b| {
        b.iter(|| doc.resolve(black_box(&path)));
    });
}

// ---------------------------------------------------------------------------
// Enumeration
// ---------------------------------------------------------------------------

fn bench_enumerate_filtered(c: &mut Criterion) {
    let doc = catalog(1000);
    let root = doc.root_element().expect("root element");
    c.bench_function("enumerate_titles_1000", |b| {
        b.iter(|| {
            TreeEnumerator::new(&doc, root, DepthLimit::Unbounded)
                .filter(black_box("title"))
                .count()
        });
    });
}

// ---------------------------------------------------------------------------
// Mutation
// ---------------------------------------------------------------------------

fn bench_add_and_remove(c: &mut Criterion) {
    let mut doc = catalog(100);
    let root = doc.root_element().expect("root element");
    c.bench_function("add_remove_child", |b| {
        b.iter(|| {
            let node = doc
                .add_child(root, "book", "extra", ChildPosition::Last)
                .expect("add child");
            doc.remove(node).expect("remove child");
        });
    });
}

fn bench_copy_subtree(c: &mut Criterion) {
    let mut doc = catalog(100);
    let book = doc.resolve("/catalog/book[1]").expect("first book");
    let last = doc.resolve("/catalog/book[100]").expect("last book");
    c.bench_function("copy_book", |b| {
        b.iter(|| {
            let copy = doc
                .copy_node(book, last, Placement::After)
                .expect("copy book");
            doc.remove(copy).expect("remove copy");
        });
    });
}

// ---------------------------------------------------------------------------
// Command surface
// ---------------------------------------------------------------------------

fn bench_session_child_text_list(c: &mut Criterion) {
    let mut session = Session::new();
    let id = session
        .execute("createDocument", &[&make_catalog(200), "false"])
        .expect("document created");
    let args = [id.as_str(), "/catalog", "=", "\n", "full", "-1"];
    c.bench_function("session_child_text_list_200", |b| {
        b.iter(|| session.execute("childTextList", black_box(&args)));
    });
}

criterion_group!(parsing, bench_parse_catalog, bench_serialize_catalog);

criterion_group!(
    paths,
    bench_resolve_last_book,
    bench_path_of_every_node,
    bench_resolve_deep
);

criterion_group!(enumeration, bench_enumerate_filtered);

criterion_group!(mutation, bench_add_and_remove, bench_copy_subtree);

criterion_group!(command, bench_session_child_text_list);

criterion_main!(parsing, paths, enumeration, mutation, command);
