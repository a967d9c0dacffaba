mod common;

use std::time::Duration;

use common::FakeNet;
use fleetprobe::{
    ConfigError, EmptyHostPolicy, FleetScanner, PortSpec, ScanConfig, ScanError, ScanProgress,
};
use tokio_util::sync::CancellationToken;

fn config(ports: PortSpec) -> ScanConfig {
    ScanConfig::new(ports).timeout(Duration::from_millis(500))
}

#[tokio::test]
async fn host_without_open_ports_is_dropped() {
    let net = FakeNet::new().open("a", [443]).into_arc();
    let scanner = FleetScanner::new().with_connector(net);

    let report = scanner
        .scan(&["a", "b"], &config(PortSpec::Range { low: 1, high: 1024 }))
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(&report).unwrap(),
        serde_json::json!({ "results": [{ "target": "a", "proto": "tcp", "ports": [443] }] })
    );
    assert!(report.get("b").is_none());
}

#[tokio::test]
async fn all_closed_fleet_gives_empty_report() {
    let net = FakeNet::new().into_arc();
    let report = FleetScanner::new()
        .with_connector(net)
        .scan(&["x", "y", "z"], &config(PortSpec::Set(vec![22, 80])))
        .await
        .unwrap();

    assert!(report.is_empty());
    assert_eq!(
        serde_json::to_string(&report).unwrap(),
        r#"{"results":[]}"#
    );
}

#[tokio::test]
async fn keep_policy_reports_empty_hosts() {
    let net = FakeNet::new().open("a", [22]).into_arc();
    let cfg = config(PortSpec::Set(vec![22, 80])).empty_hosts(EmptyHostPolicy::Keep);

    let report = FleetScanner::new()
        .with_connector(net)
        .scan(&["a", "b"], &cfg)
        .await
        .unwrap();

    assert_eq!(report.len(), 2);
    assert_eq!(report.results()[0].open_ports, vec![22]);
    assert_eq!(report.results()[1].target, "b");
    assert!(report.results()[1].open_ports.is_empty());
}

#[tokio::test(start_paused = true)]
async fn report_follows_target_order_not_completion_order() {
    let net = FakeNet::new()
        .open("slow", [80])
        .open("fast", [80])
        .open("mid", [80])
        .host_delay("slow", Duration::from_millis(300))
        .host_delay("mid", Duration::from_millis(100))
        .into_arc();

    let report = FleetScanner::new()
        .with_connector(net)
        .scan(&["slow", "fast", "mid"], &config(PortSpec::Set(vec![80])))
        .await
        .unwrap();

    let order: Vec<&str> = report.results().iter().map(|r| r.target.as_str()).collect();
    assert_eq!(order, vec!["slow", "fast", "mid"]);
}

#[tokio::test]
async fn repeated_scans_are_identical() {
    let net = FakeNet::new()
        .open("a", [22, 80, 443])
        .open("c", [8080])
        .into_arc();
    let scanner = FleetScanner::new().with_connector(net);
    let cfg = config(PortSpec::Range { low: 1, high: 9000 })
        .max_concurrent_hosts(2)
        .max_concurrent_ports_per_host(256);

    let first = scanner.scan(&["a", "b", "c"], &cfg).await.unwrap();
    let second = scanner.scan(&["a", "b", "c"], &cfg).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.get("a").unwrap().open_ports, vec![22, 80, 443]);
    assert_eq!(first.get("c").unwrap().open_ports, vec![8080]);
}

#[tokio::test(start_paused = true)]
async fn host_concurrency_limit_is_enforced() {
    let net = FakeNet::new().delay(Duration::from_millis(10)).into_arc();
    let targets: Vec<String> = (0..10).map(|i| format!("h{i}")).collect();
    let cfg = config(PortSpec::Set(vec![1, 2, 3]))
        .max_concurrent_hosts(3)
        .max_concurrent_ports_per_host(1);

    FleetScanner::new()
        .with_connector(net.clone())
        .scan(&targets, &cfg)
        .await
        .unwrap();

    assert!(net.max_active_hosts() <= 3, "active hosts {}", net.max_active_hosts());
    assert!(net.max_in_flight() <= 3);
    assert_eq!(net.total_attempts(), 30);
}

#[tokio::test]
async fn invalid_config_fails_before_any_probe() {
    let net = FakeNet::new().open("a", [22]).into_arc();
    let scanner = FleetScanner::new().with_connector(net.clone());

    let no_targets: [&str; 0] = [];
    let res = scanner
        .scan(&no_targets, &config(PortSpec::Set(vec![22])))
        .await;
    assert!(matches!(res, Err(ScanError::Config(ConfigError::NoTargets))));

    let res = scanner
        .scan(&["a"], &config(PortSpec::Range { low: 90, high: 10 }))
        .await;
    assert!(matches!(
        res,
        Err(ScanError::Config(ConfigError::InvertedRange { .. }))
    ));

    let res = scanner
        .scan(&["a"], &config(PortSpec::Set(vec![22])).max_concurrent_hosts(0))
        .await;
    assert!(matches!(
        res,
        Err(ScanError::Config(ConfigError::ZeroConcurrency(_)))
    ));

    assert_eq!(net.total_attempts(), 0);
}

#[tokio::test]
async fn caps_beyond_semaphore_capacity_fail_before_any_attempt() {
    let net = FakeNet::new().open("a", [22]).into_arc();
    let scanner = FleetScanner::new().with_connector(net.clone());

    let res = scanner
        .scan(&["a"], &config(PortSpec::Set(vec![22])).max_concurrent_hosts(usize::MAX))
        .await;
    assert!(matches!(
        res,
        Err(ScanError::Config(ConfigError::ConcurrencyTooLarge { name: "max_concurrent_hosts", .. }))
    ));

    let res = scanner
        .scan(
            &["a"],
            &config(PortSpec::Set(vec![22])).max_concurrent_ports_per_host(usize::MAX),
        )
        .await;
    assert!(matches!(
        res,
        Err(ScanError::Config(ConfigError::ConcurrencyTooLarge {
            name: "max_concurrent_ports_per_host",
            ..
        }))
    ));

    assert_eq!(net.total_attempts(), 0);
}

#[tokio::test]
async fn repeated_target_is_scanned_once() {
    let net = FakeNet::new().open("a", [22]).into_arc();
    let cfg = config(PortSpec::Set(vec![22, 80])).empty_hosts(EmptyHostPolicy::Keep);

    let report = FleetScanner::new()
        .with_connector(net.clone())
        .scan(&["a", "b", " a", "a"], &cfg)
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(&report).unwrap(),
        serde_json::json!({ "results": [
            { "target": "a", "proto": "tcp", "ports": [22] },
            { "target": "b", "proto": "tcp", "ports": [] },
        ] })
    );
    assert_eq!(net.attempts("a", 22), 1);
    assert_eq!(net.attempts("a", 80), 1);
    assert_eq!(net.total_attempts(), 4);
}

#[tokio::test]
async fn progress_counts_every_probe() {
    let net = FakeNet::new().open("a", [1, 2]).open("b", [3]).into_arc();
    let progress = ScanProgress::new();

    FleetScanner::new()
        .with_connector(net)
        .with_progress(progress.clone())
        .scan(&["a", "b"], &config(PortSpec::Range { low: 1, high: 10 }))
        .await
        .unwrap();

    let snap = progress.snapshot();
    assert_eq!(snap.probes_total, 20);
    assert_eq!(snap.probes_done, 20);
    assert_eq!(snap.open_found, 3);
    assert_eq!(snap.hosts_total, 2);
    assert_eq!(snap.hosts_done, 2);
}

#[tokio::test(start_paused = true)]
async fn cancelled_fleet_scan_returns_no_report() {
    let net = FakeNet::new()
        .open("a", [22])
        .delay(Duration::from_secs(60))
        .into_arc();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let cfg = config(PortSpec::Set(vec![22, 80])).timeout(Duration::from_secs(120));
    let res = FleetScanner::new()
        .with_connector(net)
        .with_cancel(cancel)
        .scan(&["a", "b"], &cfg)
        .await;

    assert!(matches!(res, Err(ScanError::Cancelled)));
}
