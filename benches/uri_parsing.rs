use brrtguard::spec::{CollectionFormat, ParameterLocation, ParameterSpec, ParameterStyle};
use brrtguard::uri_parsing::{UriParser, UriParsingPolicy};
use brrtguard::NormalizedRequest;
use criterion::{criterion_group, criterion_main, Criterion};
use http::Method;
use std::hint::black_box;

fn parameters() -> Vec<ParameterSpec> {
    vec![
        ParameterSpec::new("id", ParameterLocation::Path).typed("integer"),
        ParameterSpec::new("tags", ParameterLocation::Query)
            .array("string")
            .collection_format(CollectionFormat::Csv),
        ParameterSpec::new("ids", ParameterLocation::Query)
            .array("integer")
            .collection_format(CollectionFormat::Multi),
        ParameterSpec::new("limit", ParameterLocation::Query).typed("integer"),
        ParameterSpec::new("active", ParameterLocation::Query).typed("boolean"),
        ParameterSpec::new("filter", ParameterLocation::Query)
            .typed("object")
            .style(ParameterStyle::DeepObject),
    ]
}

fn request() -> NormalizedRequest {
    NormalizedRequest::new(Method::GET, "/things/42")
        .path_param("id", "42")
        .query_string(
            "tags=a,b,c&tags=d,e&ids=1&ids=2&ids=3&limit=50&active=true\
             &filter[status]=open&filter[owner]=u1&unrelated=x",
        )
}

fn bench_policies(c: &mut Criterion) {
    let mut group = c.benchmark_group("uri_parsing");
    for policy in [
        UriParsingPolicy::Swagger2,
        UriParsingPolicy::FirstValue,
        UriParsingPolicy::AlwaysMulti,
        UriParsingPolicy::OpenApi,
    ] {
        let parser = UriParser::new(policy, parameters());
        group.bench_function(policy.to_string(), |b| {
            b.iter_batched(
                request,
                |mut req| {
                    parser.parse_request(&mut req);
                    black_box(req)
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_policies);
criterion_main!(benches);
