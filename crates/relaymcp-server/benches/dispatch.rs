//! Performance benchmarks for the dispatcher hot path: rate limiting,
//! operation tracking, resource caching, and URI template resolution.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use relaymcp_protocol::types::{ResourceContent, ResourceTemplateDescriptor};
use relaymcp_server::context::HandlerContext;
use relaymcp_server::error::ServerResult;
use relaymcp_server::operations::OperationKind;
use relaymcp_server::rate_limit::RateLimiter;
use relaymcp_server::{OperationTracker, ResourceCache, ResourceHandler, ResourceRegistry};

fn benchmark_rate_limiter(c: &mut Criterion) {
    c.bench_function("rate_limit/allow_under_limit", |b| {
        let limiter = RateLimiter::new(1_000_000, Duration::from_secs(60), true);
        b.iter(|| black_box(limiter.check("session-1", "tools/call")))
    });

    c.bench_function("rate_limit/many_sessions", |b| {
        let limiter = RateLimiter::new(1_000_000, Duration::from_secs(60), true);
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            let session = format!("session-{}", n % 64);
            black_box(limiter.check(&session, "tools/call"))
        })
    });
}

fn benchmark_operation_tracker(c: &mut Criterion) {
    c.bench_function("operations/register_complete", |b| {
        let tracker = OperationTracker::new();
        b.iter(|| {
            let handle = tracker.register("session-1", OperationKind::Tool("echo".into()), None);
            tracker.complete(&handle.id);
            black_box(())
        })
    });

    c.bench_function("operations/cancel_all_for_session", |b| {
        let tracker = OperationTracker::new();
        b.iter(|| {
            for _ in 0..16 {
                tracker.register("session-1", OperationKind::Tool("echo".into()), None);
            }
            tracker.cancel_all_for_session("session-1");
        })
    });
}

fn benchmark_resource_cache(c: &mut Criterion) {
    c.bench_function("cache/put_get_hit", |b| {
        let cache = ResourceCache::new(Duration::from_secs(300));
        cache.put("test://r", ResourceContent::text("test://r", "text/plain", "v"), None);
        b.iter(|| black_box(cache.get("test://r")))
    });
}

struct EchoResource;

#[async_trait]
impl ResourceHandler for EchoResource {
    async fn read(&self, uri: &str, _ctx: &HandlerContext) -> ServerResult<ResourceContent> {
        Ok(ResourceContent::text(uri, "text/plain", uri))
    }
}

fn benchmark_resource_template_matching(c: &mut Criterion) {
    c.bench_function("registry/template_resolve", |b| {
        let registry = ResourceRegistry::new();
        registry
            .register_template(
                ResourceTemplateDescriptor {
                    uri_template: "file:///{path}".to_string(),
                    name: "file template".to_string(),
                    description: None,
                    mime_type: None,
                },
                Arc::new(EchoResource),
            )
            .unwrap();
        b.iter(|| black_box(registry.resolve("file:///etc/hosts")))
    });
}

criterion_group!(
    benches,
    benchmark_rate_limiter,
    benchmark_operation_tracker,
    benchmark_resource_cache,
    benchmark_resource_template_matching,
);
criterion_main!(benches);
