use criterion::{black_box, criterion_group, criterion_main, Criterion};
use revisor_markup::{flatten, parse, serialize};

fn sample_document(paragraphs: usize) -> String {
    let mut source = String::from("<h1>Quarterly report</h1>\n");
    for i in 0..paragraphs {
        source.push_str(&format!(
            "<p align=\"justify\">Paragraph {} mentions <b>revenue</b> and <i>growth</i> for Q{}.</p>\n",
            i,
            i % 4 + 1
        ));
    }
    source.push_str("<table><tr><td>Region</td><td>Total</td></tr><tr><td>North</td><td>42</td></tr></table>\n");
    source
}

fn parse_document(c: &mut Criterion) {
    let source = sample_document(200);
    c.bench_function("parse_200_paragraphs", |b| b.iter(|| parse(black_box(&source))));
}

fn serialize_document(c: &mut Criterion) {
    let doc = parse(&sample_document(200)).unwrap();
    c.bench_function("serialize_200_paragraphs", |b| b.iter(|| serialize(black_box(&doc))));
}

fn flatten_document(c: &mut Criterion) {
    let doc = parse(&sample_document(200)).unwrap();
    c.bench_function("flatten_200_paragraphs", |b| b.iter(|| flatten(black_box(&doc))));
}

criterion_group!(benches, parse_document, serialize_document, flatten_document);
criterion_main!(benches);
