use brrtguard::security::{compile_security, SecurityHandlerFactory, SecurityRequest, StaticApiKeys};
use brrtguard::spec::{load_spec_str, ApiDocument};
use brrtguard::NormalizedRequest;
use criterion::{criterion_group, criterion_main, Criterion};
use http::Method;
use std::hint::black_box;

fn example_spec() -> &'static str {
    r#"swagger: "2.0"
info: { title: Keyring, version: "1.0" }
securityDefinitions:
  header_key: { type: apiKey, in: header, name: X-Api-Key }
  query_key: { type: apiKey, in: query, name: api_key }
  basic: { type: basic }
paths:
  /items:
    get:
      operationId: list_items
      security:
        - basic: []
        - query_key: []
        - header_key: []
      responses:
        "200": { description: OK }
"#
}

fn parse_spec(yaml: &str) -> ApiDocument {
    load_spec_str(yaml).expect("failed to load spec")
}

fn factory() -> SecurityHandlerFactory {
    let keys = StaticApiKeys::new().key("k-1", "alice").key("k-2", "bob");
    SecurityHandlerFactory::new()
        .with_api_key_info("header_key", keys.clone())
        .with_api_key_info("query_key", keys)
}

fn bench_compile(c: &mut Criterion) {
    let doc = parse_spec(example_spec());
    let op = doc.operation("list_items").expect("operation exists");
    let factory = factory();
    c.bench_function("security_compile", |b| {
        b.iter(|| {
            black_box(compile_security(
                &op.operation_id,
                &op.security,
                &doc.security_schemes,
                &factory,
            ))
        })
    });
}

fn bench_authenticate(c: &mut Criterion) {
    let doc = parse_spec(example_spec());
    let op = doc.operation("list_items").expect("operation exists");
    let compiled = compile_security(&op.operation_id, &op.security, &doc.security_schemes, &factory());
    // Falls through the dropped basic alternative and the query key to the header key
    let req = NormalizedRequest::new(Method::GET, "/items").header("x-api-key", "k-2");
    c.bench_function("security_authenticate_last_alternative", |b| {
        b.iter(|| {
            let outcome = compiled.auth.authenticate(&SecurityRequest::from(&req));
            black_box(&outcome);
        })
    });
}

criterion_group!(benches, bench_compile, bench_authenticate);
criterion_main!(benches);
