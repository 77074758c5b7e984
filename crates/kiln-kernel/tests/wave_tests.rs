use kiln_kernel::prelude::*;
use kiln_contract::{AppManifest, ServiceDecl};
use kiln_kernel::{GATEWAY_NODE, INFRASTRUCTURE_NODE};
use kiln_test_utils::todo_app_manifest;
use proptest::prelude::*;
use std::collections::HashMap;

/// Build a graph of `n` nodes where node `i` depends on node `j` for every
/// generated pair whose rank ordering makes the graph acyclic. Declaration
/// order is unrelated to dependency order.
fn acyclic_graph(n: usize, ranks: &[usize], pairs: &[(usize, usize)], externals: &[usize]) -> ServiceGraph {
    let mut nodes: Vec<ServiceNode> = (0..n)
        .map(|i| ServiceNode::real(format!("s{i}"), format!("s{i}.yaml")))
        .collect();

    for &(i, j) in pairs {
        if i < n && j < n && ranks[j] < ranks[i] {
            let dep = format!("s{j}");
            if !nodes[i].dependencies.contains(&dep) {
                nodes[i].dependencies.push(dep);
            }
        }
    }
    for &i in externals {
        if i < n {
            nodes[i].dependencies.push(format!("external-{i}"));
        }
    }

    let mut builder = GraphBuilder::new().with_aggregator(false);
    for node in nodes {
        builder.add_node(node).unwrap();
    }
    builder.build().unwrap()
}

fn wave_index(waves: &[Wave]) -> HashMap<String, usize> {
    waves
        .iter()
        .flat_map(|w| w.nodes.iter().map(move |n| (n.name.clone(), w.index)))
        .collect()
}

fn graph_strategy() -> impl Strategy<Value = ServiceGraph> {
    (1..24usize).prop_flat_map(|n| {
        (
            Just(n),
            Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
            proptest::collection::vec((0..n, 0..n), 0..60),
            proptest::collection::vec(0..n, 0..4),
        )
            .prop_map(|(n, ranks, pairs, externals)| acyclic_graph(n, &ranks, &pairs, &externals))
    })
}

proptest! {
    #[test]
    fn prop_dependencies_land_in_earlier_waves(graph in graph_strategy()) {
        let waves = build_waves(&graph).unwrap();
        let index = wave_index(&waves);

        for node in graph.nodes() {
            for dep in graph.dependencies_of(&node.name) {
                prop_assert!(index[&dep.name] < index[&node.name]);
            }
        }
    }

    #[test]
    fn prop_waves_partition_the_graph(graph in graph_strategy()) {
        let waves = build_waves(&graph).unwrap();
        let index = wave_index(&waves);

        let total: usize = waves.iter().map(Wave::len).sum();
        prop_assert_eq!(total, graph.len());
        prop_assert_eq!(index.len(), graph.len());
        for (position, wave) in waves.iter().enumerate() {
            prop_assert_eq!(wave.index, position);
            prop_assert!(!wave.is_empty());
            prop_assert_eq!(wave.parallel, wave.len() > 1);
        }
    }

    #[test]
    fn prop_first_wave_is_exactly_the_roots(graph in graph_strategy()) {
        let waves = build_waves(&graph).unwrap();
        let mut roots: Vec<&str> = graph
            .nodes()
            .filter(|n| graph.dependencies_of(&n.name).next().is_none())
            .map(|n| n.name.as_str())
            .collect();
        let mut first: Vec<&str> = waves[0].names().collect();
        roots.sort_unstable();
        first.sort_unstable();
        prop_assert_eq!(first, roots);
    }

    #[test]
    fn prop_scheduling_is_deterministic(graph in graph_strategy()) {
        prop_assert_eq!(build_waves(&graph).unwrap(), build_waves(&graph).unwrap());
    }

    #[test]
    fn prop_strict_schedule_fails_iff_cyclic(
        n in 1..12usize,
        pairs in proptest::collection::vec((0..12usize, 0..12usize), 0..30)
    ) {
        let mut nodes: Vec<ServiceNode> = (0..n)
            .map(|i| ServiceNode::real(format!("s{i}"), format!("s{i}.yaml")))
            .collect();
        for (i, j) in pairs {
            if i < n && j < n && i != j {
                nodes[i].dependencies.push(format!("s{j}"));
            }
        }
        let mut builder = GraphBuilder::new().with_aggregator(false);
        for node in nodes {
            builder.add_node(node).unwrap();
        }
        let graph = builder.build().unwrap();

        match build_waves(&graph) {
            Ok(_) => prop_assert!(!graph.has_cycle()),
            Err(err) => {
                prop_assert!(graph.has_cycle());
                prop_assert!(graph.contains(err.node()));
            }
        }

        let degraded = schedule(&graph, CyclePolicy::Degrade).unwrap();
        prop_assert_eq!(degraded.node_count(), graph.len());
        prop_assert_eq!(degraded.warnings.is_empty(), !graph.has_cycle());
    }
}

#[test]
fn todo_app_waves() {
    let graph = GraphBuilder::from_manifest(&todo_app_manifest())
        .unwrap()
        .build()
        .unwrap();
    let waves = build_waves(&graph).unwrap();

    let names: Vec<Vec<&str>> = waves.iter().map(|w| w.names().collect()).collect();
    assert_eq!(names, vec![vec!["user"], vec!["todo"], vec![GATEWAY_NODE]]);
    assert!(waves.iter().all(|w| !w.parallel));
    assert_eq!(waves[2].nodes[0].synthetic_kind(), Some(SyntheticKind::Gateway));
}

#[test]
fn two_node_cycle_names_a_cycle_member() {
    let mut builder = GraphBuilder::new();
    builder
        .add_node(ServiceNode::real("a", "a.yaml").depends_on("b"))
        .unwrap()
        .add_node(ServiceNode::real("b", "b.yaml").depends_on("a"))
        .unwrap();
    let graph = builder.build().unwrap();

    let err = build_waves(&graph).unwrap_err();
    assert!(err.node() == "a" || err.node() == "b");
    assert!(err.to_string().contains("circular dependency"));
}

#[test]
fn independent_services_share_a_parallel_wave() {
    let mut builder = GraphBuilder::new();
    for name in ["billing", "user", "search"] {
        builder.add_node(ServiceNode::real(name, format!("{name}.yaml"))).unwrap();
    }
    let waves = build_waves(&builder.build().unwrap()).unwrap();

    assert_eq!(waves.len(), 2);
    assert!(waves[0].parallel);
    assert_eq!(waves[0].names().collect::<Vec<_>>(), vec!["billing", "user", "search"]);
    assert_eq!(waves[1].names().collect::<Vec<_>>(), vec![GATEWAY_NODE]);
}

#[test]
fn infrastructure_node_is_synthetic() {
    let node = ServiceNode::infrastructure();
    assert_eq!(node.name, INFRASTRUCTURE_NODE);
    assert!(node.is_synthetic());
}

#[test]
fn self_dependency_is_rejected_before_scheduling() {
    let manifest = AppManifest::new("shop")
        .with_service(ServiceDecl::new("catalog", "catalog.yaml"))
        .with_service(ServiceDecl::new("cart", "cart.yaml").depends_on("catalog").depends_on("cart"));

    let err = GraphBuilder::from_manifest(&manifest).unwrap_err();
    assert_eq!(err, GraphError::SelfDependency("cart".to_string()));
}
