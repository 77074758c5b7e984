use kiln_kernel::prelude::*;
use kiln_test_utils::{todo_app_manifest, ScriptedWork};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn wave(index: usize, names: &[&str]) -> Wave {
    Wave::new(
        index,
        names
            .iter()
            .map(|n| ServiceNode::real(*n, format!("{n}.contract.yaml")))
            .collect(),
        WorkAction::Implement,
    )
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_fan_in_waits_for_every_sibling(
        delay_a in 0..15u64,
        delay_b in 0..15u64,
        limit in 0..3usize
    ) {
        let work = Arc::new(
            ScriptedWork::new()
                .delay("a", Duration::from_millis(delay_a))
                .delay("b", Duration::from_millis(delay_b)),
        );
        let runner = Runner::new(vec![wave(0, &["a", "b"]), wave(1, &["c"])], work.clone())
            .with_concurrency(limit);

        let results = runtime().block_on(runner.execute_all()).unwrap();

        let c = work.call("c").unwrap();
        prop_assert!(c.finished_before.contains("a"));
        prop_assert!(c.finished_before.contains("b"));
        prop_assert_eq!(results.len(), 3);
        prop_assert_eq!(results[2].node.as_str(), "c");
    }
}

#[tokio::test]
async fn failure_in_first_wave_stops_the_run() {
    let work = Arc::new(
        ScriptedWork::new()
            .fail("b", "tests failed")
            .delay("a", Duration::from_millis(20)),
    );
    let runner = Runner::new(vec![wave(0, &["a", "b"]), wave(1, &["c"])], work.clone());

    let failure = runner.execute_all().await.unwrap_err();

    assert!(!work.was_called("c"));
    assert_eq!(
        failure.error,
        RunError::NodeFailed {
            wave: 0,
            node: "b".to_string(),
            cause: "tests failed".to_string(),
        }
    );
    let names: Vec<_> = failure.results.iter().map(|r| r.node.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert!(failure.results[0].success);
    assert!(!failure.results[1].success);
}

#[tokio::test]
async fn results_keep_node_order_regardless_of_finish_order() {
    let work = Arc::new(
        ScriptedWork::new()
            .delay("slow", Duration::from_millis(30))
            .delay("fast", Duration::from_millis(1)),
    );
    let runner = Runner::new(vec![wave(0, &["slow", "fast"])], work);

    let results = runner.execute_all().await.unwrap();
    let names: Vec<_> = results.iter().map(|r| r.node.as_str()).collect();
    assert_eq!(names, vec!["slow", "fast"]);
    assert!(results[0].duration >= Duration::from_millis(30));
}

#[tokio::test]
async fn concurrency_limit_caps_in_flight_nodes() {
    let mut work = ScriptedWork::new();
    let names = ["a", "b", "c", "d", "e", "f"];
    for name in names {
        work = work.delay(name, Duration::from_millis(10));
    }
    let work = Arc::new(work);
    let runner = Runner::new(vec![wave(0, &names)], work.clone()).with_concurrency(2);

    runner.execute_all().await.unwrap();

    assert_eq!(work.call_count(), 6);
    assert!(work.peak_in_flight() <= 2);
}

#[tokio::test]
async fn unbounded_wave_runs_everything_at_once() {
    let mut work = ScriptedWork::new();
    let names = ["a", "b", "c", "d"];
    for name in names {
        work = work.delay(name, Duration::from_millis(25));
    }
    let work = Arc::new(work);
    Runner::new(vec![wave(0, &names)], work.clone())
        .execute_all()
        .await
        .unwrap();

    assert_eq!(work.peak_in_flight(), 4);
}

#[tokio::test]
async fn panicking_node_fails_without_losing_siblings() {
    let work = Arc::new(ScriptedWork::new().panic_on("b"));
    let runner = Runner::new(vec![wave(0, &["a", "b", "c"]), wave(1, &["d"])], work.clone());

    let failure = runner.execute_all().await.unwrap_err();

    assert_eq!(failure.error.node(), "b");
    assert_eq!(failure.results.len(), 3);
    assert_eq!(failure.succeeded().count(), 2);
    assert!(failure.results[1]
        .error
        .as_deref()
        .unwrap()
        .contains("scripted panic in b"));
    assert!(!work.was_called("d"));
}

#[tokio::test]
async fn builds_todo_app_in_dependency_order() {
    let graph = GraphBuilder::from_manifest(&todo_app_manifest())
        .unwrap()
        .build()
        .unwrap();
    let waves = build_waves(&graph).unwrap();
    let work = Arc::new(ScriptedWork::new());

    let results = Runner::new(waves, work.clone())
        .with_concurrency(4)
        .execute_all()
        .await
        .unwrap();

    let order: Vec<_> = work.calls().into_iter().map(|c| c.node).collect();
    assert_eq!(order, vec!["user", "todo", "gateway-service"]);
    assert!(work.call("todo").unwrap().finished_before.contains("user"));

    let summary = RunSummary::from_results(&results);
    assert!(summary.all_succeeded());
    assert_eq!(summary.total, 3);
}

#[tokio::test]
async fn single_node_rerun_uses_wave_action() {
    let waves = vec![Wave::new(
        3,
        vec![ServiceNode::real("user", "user.contract.yaml")],
        WorkAction::Reimplement { breaking: true },
    )];
    let work = Arc::new(ScriptedWork::new());
    let runner = Runner::new(waves, work.clone());

    let result = runner.execute_single("user").await.unwrap();
    assert!(result.success);
    assert_eq!(result.wave, 3);

    let call = work.call("user").unwrap();
    assert_eq!(call.action, WorkAction::Reimplement { breaking: true });
    assert!(matches!(
        runner.execute_single("todo").await,
        Err(RunError::NodeNotFound(_))
    ));
}
