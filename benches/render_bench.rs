use criterion::{criterion_group, criterion_main, Criterion};
use rfshot::pagination::PagePlan;
use rfshot::{ContentBox, LogFacade, TemplateStore};
use serde_json::json;
use std::sync::Arc;

fn bench_render_template(c: &mut Criterion) {
    let dir = std::env::temp_dir();
    let store = TemplateStore::new(dir, Arc::new(LogFacade));
    let source = r#"<div id="container"><h1>{{ title }}</h1>{% for row in rows %}<p>{{ row.name }}: {{ row.value }}</p>{% endfor %}</div>"#;
    let rows: Vec<_> = (0..200)
        .map(|i| json!({ "name": format!("row {}", i), "value": i * 7 }))
        .collect();
    let data = json!({ "title": "Bench", "rows": rows });

    c.bench_function("render_template_200_rows", |b| {
        b.iter(|| {
            let _ = store.render_str(source, &data).unwrap();
        })
    });
}

fn bench_page_plan(c: &mut Criterion) {
    let content = ContentBox {
        width: 1280.0,
        height: 48_000.0,
    };
    c.bench_function("page_plan_12_pages", |b| {
        b.iter(|| PagePlan::new(content, 4000))
    });
}

criterion_group!(benches, bench_render_template, bench_page_plan);
criterion_main!(benches);
