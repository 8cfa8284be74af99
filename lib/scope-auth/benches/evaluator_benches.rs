use std::hint::black_box;
use std::sync::Arc;

use criterion::Criterion;
use criterion::{criterion_group, criterion_main};
use scope_auth::{ScopeAuth, ScopeInitializer, ScopeLoader, ScopeLoaderSet, ScopeMap};
use serde_json::json;
use tokio::runtime::Runtime;

struct Session {
    permissions: Vec<String>,
}

fn scope_auth() -> ScopeAuth<Session> {
    ScopeAuth::builder(ScopeInitializer::sync(|session: &Session| {
        let permissions = session.permissions.clone();
        Ok(ScopeLoaderSet::new()
            .with("admin", false)
            .with("loggedIn", true)
            .with(
                "permission",
                ScopeLoader::sync(move |arg| {
                    Ok(arg
                        .as_str()
                        .is_some_and(|p| permissions.iter().any(|own| own == p)))
                }),
            )
            .with(
                "remotePermission",
                ScopeLoader::future(|arg| {
                    let arg = arg.clone();
                    async move { Ok(arg == json!("read")) }
                }),
            ))
    }))
    .build()
}

fn session() -> Session {
    Session {
        permissions: (0..32).map(|i| format!("perm-{}", i)).collect(),
    }
}

fn nested_map() -> Arc<ScopeMap> {
    ScopeMap::builder()
        .scope("loggedIn", true)
        .any(
            ScopeMap::builder()
                .scope("admin", true)
                .scope("permission", "perm-31")
                .scope("permission", "perm-7")
                .build(),
        )
        .all(
            ScopeMap::builder()
                .scope("loggedIn", true)
                .scope("permission", "perm-1")
                .build(),
        )
        .build()
}

fn sync_scopes_fresh_request(c: &mut Criterion) {
    let auth = scope_auth();
    let map = nested_map();

    c.bench_function("sync_scopes_fresh_request", |b| {
        b.iter(|| {
            let request = auth.request_scope(session());
            let check = request.evaluate(black_box(&map), None);
            black_box(check.is_ready())
        });
    });
}

fn cached_scopes_same_request(c: &mut Criterion) {
    let auth = scope_auth();
    let map = nested_map();
    let request = auth.request_scope(session());

    c.bench_function("cached_scopes_same_request", |b| {
        b.iter(|| {
            let check = request.evaluate(black_box(&map), None);
            black_box(check.is_ready())
        });
    });
}

fn async_scopes_fresh_request(c: &mut Criterion) {
    let rt = Runtime::new().expect("Failed to create Tokio runtime");
    let auth = scope_auth();
    let map = ScopeMap::builder()
        .any(
            ScopeMap::builder()
                .scope("remotePermission", "write")
                .scope("remotePermission", "read")
                .build(),
        )
        .build();

    c.bench_function("async_scopes_fresh_request", |b| {
        b.to_async(&rt).iter(|| async {
            let request = auth.request_scope(session());
            let result = request.evaluate(black_box(&map), None).await;
            black_box(result.is_ok())
        });
    });
}

fn all_benchmarks(c: &mut Criterion) {
    sync_scopes_fresh_request(c);
    cached_scopes_same_request(c);
    async_scopes_fresh_request(c);
}

criterion_group!(benches, all_benchmarks);
criterion_main!(benches);
