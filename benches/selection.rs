use std::hint::black_box;
use std::time::Duration;

use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use http::StatusCode;
use retryx::BoxError;
use retryx::prelude::{
    Endpoint, FixedBackoff, HttpRequest, HttpResponse, LoadBalanceStrategy, RetryExecutor,
    RoundRobinLoadBalanceStrategy, StaticEndpointResolver,
};

fn endpoints(count: u16) -> Vec<Endpoint> {
    (0..count)
        .map(|index| Endpoint::new("10.0.0.1", 8000 + index))
        .collect()
}

fn strategy(count: u16, failed: u16) -> RoundRobinLoadBalanceStrategy {
    let strategy = RoundRobinLoadBalanceStrategy::builder(StaticEndpointResolver::new(endpoints(
        count,
    )))
    .ttl(Duration::from_secs(3600))
    .sweep_interval(Duration::from_secs(3600))
    .build()
    .expect("build strategy");
    for endpoint in endpoints(count).into_iter().take(usize::from(failed)) {
        strategy.failed_endpoints().mark_failed(endpoint);
    }
    strategy
}

fn bench_choose(c: &mut Criterion) {
    let request = HttpRequest::get("http://inventory/v1/items?page=2").expect("build request");
    let mut group = c.benchmark_group("round_robin_choose");
    group.throughput(Throughput::Elements(1));

    for (count, failed) in [(2_u16, 0_u16), (16, 0), (16, 8), (16, 16)] {
        let strategy = strategy(count, failed);
        group.bench_with_input(
            BenchmarkId::new(format!("{count}_endpoints"), format!("{failed}_failed")),
            &request,
            |b, request| b.iter(|| black_box(strategy.choose(black_box(request)))),
        );
    }
    group.finish();
}

fn bench_execute_without_retries(c: &mut Criterion) {
    let executor = RetryExecutor::builder(FixedBackoff::new(Duration::ZERO, 3))
        .load_balance_strategy(strategy(4, 1))
        .build();
    let request = HttpRequest::get("http://inventory/v1/items").expect("build request");
    let transport = |_: &HttpRequest, _: &Bytes| -> Result<HttpResponse, BoxError> {
        Ok(HttpResponse::from_status(StatusCode::OK))
    };
    let body = Bytes::new();

    c.bench_function("execute_single_attempt", |b| {
        b.iter(|| {
            black_box(
                executor
                    .execute(black_box(&request), &body, &transport)
                    .expect("fake transport succeeds"),
            )
        })
    });
}

criterion_group!(benches, bench_choose, bench_execute_without_retries);
criterion_main!(benches);
