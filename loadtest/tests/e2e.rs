use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use loadtest::config::Config;
use loadtest::healthcheck::healthcheck;
use loadtest::{HttpRemote, Report, ScenarioKind, UserGroup, WaitTime};
use loadtest_test::server::TestServer;
use tokio_util::sync::CancellationToken;

const SEED_NAME: &str = "POST /products/:id/details (seed)";

fn group(kind: ScenarioKind, users: usize) -> UserGroup {
    UserGroup {
        scenario: Arc::new(kind.scenario()),
        users,
        wait_time: WaitTime::default(),
    }
}

async fn run_against(host: &str, groups: Vec<UserGroup>, duration: Duration) -> Report {
    loadtest_test::tracing::init();

    let remote = HttpRemote::new(host, Duration::from_secs(5)).unwrap();
    loadtest::run(remote, groups, duration, CancellationToken::new())
        .await
        .unwrap()
}

/// Returns an address nobody listens on.
fn unused_host() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

#[tokio::test]
async fn mixed_without_failures() {
    let server = TestServer::new().await;

    let report = run_against(
        &server.base_url(),
        vec![group(ScenarioKind::Mixed, 4)],
        Duration::from_secs(1),
    )
    .await;

    let seeds = report.request(SEED_NAME).unwrap();
    assert_eq!(seeds.successes, 40);

    let gets = report.request("GET /products/:id").unwrap();
    assert!(gets.count() > 0);
    assert_eq!(gets.failure_count(), 0, "{gets:?}");

    let posts = report.request("POST /products/:id/details").unwrap();
    assert!(posts.count() > 0);
    assert_eq!(posts.failure_count(), 0, "{posts:?}");

    for id in 1..=10 {
        assert!(server.product(id).is_some(), "product {id} was not seeded");
    }
}

#[tokio::test]
async fn all_scenarios_concurrently() {
    let server = TestServer::new().await;

    let report = run_against(
        &server.base_url(),
        vec![
            group(ScenarioKind::ReadOnly, 2),
            group(ScenarioKind::WriteOnly, 2),
            group(ScenarioKind::Search, 2),
        ],
        Duration::from_secs(1),
    )
    .await;

    let scenarios: Vec<_> = report.groups.iter().map(|g| g.scenario.as_str()).collect();
    assert_eq!(scenarios, ["read_only", "write_only", "search"]);

    for name in [
        "GET /products/:id (read-only)",
        "POST /products/:id/details (write-only)",
        "/products/search",
        "/health",
    ] {
        let stats = report.request(name).unwrap();
        assert!(stats.count() > 0, "no requests for {name}");
        assert_eq!(stats.failure_count(), 0, "{name}: {stats:?}");
    }

    // Both write-only users start their own counter at the same base.
    let product = server.product(10_001).unwrap();
    assert_eq!(product["sku"], "SKU-WRITE-10001");
    assert_eq!(product["manufacturer"], "Load Test Corp");

    assert_eq!(report.total().failure_count(), 0);
}

#[tokio::test]
async fn seeding_failures_are_tolerated() {
    let server = TestServer::failing_writes(500).await;

    let report = run_against(
        &server.base_url(),
        vec![group(ScenarioKind::Mixed, 2)],
        Duration::from_millis(500),
    )
    .await;

    let seeds = report.request(SEED_NAME).unwrap();
    assert_eq!(seeds.successes, 0);
    assert_eq!(seeds.failures["Got status code 500"], 20);

    // Users still proceed to their weighted tasks.
    let gets = report.request("GET /products/:id").unwrap();
    assert!(gets.count() > 0);
    assert_eq!(gets.successes, 0);
    assert_eq!(gets.failures["Got status code 404"], gets.count());

    let posts = report.request("POST /products/:id/details").unwrap();
    assert_eq!(posts.failures["Got status code 500"], posts.count());

    assert_eq!(server.product_count(), 0);
}

#[tokio::test]
async fn transport_errors_are_failures() {
    let report = run_against(
        &unused_host(),
        vec![group(ScenarioKind::WriteOnly, 1)],
        Duration::from_millis(300),
    )
    .await;

    let total = report.total();
    assert!(total.count() > 0);
    assert_eq!(total.successes, 0);
    // Refused connections share one reason regardless of the product in the URL.
    assert_eq!(total.failures.len(), 1, "{:?}", total.failures);
}

#[tokio::test]
async fn shutdown_stops_early() {
    let server = TestServer::new().await;
    let remote = HttpRemote::new(&server.base_url(), Duration::from_secs(5)).unwrap();

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            shutdown.cancel();
        }
    });

    let report = loadtest::run(
        remote,
        vec![group(ScenarioKind::Search, 3)],
        Duration::from_secs(600),
        shutdown,
    )
    .await
    .unwrap();

    assert!(report.elapsed < Duration::from_secs(10));
    assert!(report.request("/products/search").unwrap().count() > 0);
}

#[tokio::test]
async fn wait_time_slows_users_down() {
    let server = TestServer::new().await;

    let mut search = group(ScenarioKind::Search, 1);
    search.wait_time = WaitTime {
        min: Duration::from_millis(100),
        max: Duration::from_millis(100),
    };

    let report = run_against(&server.base_url(), vec![search], Duration::from_millis(550)).await;

    // One request right away, then at most one per 100ms.
    let count = report.total().count();
    assert!((1..=7).contains(&count), "{count} requests");
}

#[tokio::test]
async fn healthcheck_requires_ok() {
    let server = TestServer::new().await;

    let config = Config {
        host: server.base_url(),
        ..Default::default()
    };
    healthcheck(&config).await.unwrap();

    let config = Config {
        host: unused_host(),
        timeout: Duration::from_secs(1),
        ..Default::default()
    };
    assert!(healthcheck(&config).await.is_err());
}
