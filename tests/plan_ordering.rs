//! Property-based tests for plan ordering
//!
//! Dependency order must hold for any input order, and the resulting order
//! must not depend on how the descriptors were listed.

mod common;

use common::{config, health_check};
use proptest::prelude::*;
use psclink::error::ProvisionError;
use psclink::plan::{PlanBuilder, ProvisioningPlan};
use psclink::resource::ResourceDescriptor;
use std::collections::HashMap;

/// Random DAG over `n` health checks: node i may depend on any node j < i
fn arb_dag() -> impl Strategy<Value = Vec<(usize, Vec<usize>)>> {
    (1usize..12).prop_flat_map(|n| {
        (0..n)
            .map(|i| prop::collection::vec(0..i.max(1), 0..=i.min(3)).prop_map(move |deps| (i, deps)))
            .collect::<Vec<_>>()
    })
}

fn descriptors(dag: &[(usize, Vec<usize>)]) -> Vec<ResourceDescriptor> {
    dag.iter()
        .map(|(i, deps)| {
            deps.iter()
                .filter(|d| *d < i)
                .fold(health_check(&format!("hc-{:02}", i)), |desc, d| {
                    desc.depends_on(format!("hc-{:02}", d).as_str())
                })
        })
        .collect()
}

fn assert_dependencies_first(plan: &ProvisioningPlan) {
    let position: HashMap<&str, usize> = plan
        .steps()
        .iter()
        .enumerate()
        .map(|(i, step)| (step.id(), i))
        .collect();
    for step in plan.steps() {
        for dep in step.dependencies() {
            assert!(
                position[dep] < position[step.id()],
                "{} scheduled before its dependency {}",
                step.id(),
                dep
            );
        }
    }
}

proptest! {
    #[test]
    fn standard_plan_order_ignores_input_order(
        shuffled in Just(config().plan().unwrap().steps().to_vec()).prop_shuffle()
    ) {
        let expected = config().plan().unwrap();
        let plan = PlanBuilder::new().extend(shuffled).build().unwrap();
        prop_assert_eq!(plan.ids(), expected.ids());
        assert_dependencies_first(&plan);
    }

    #[test]
    fn random_dag_orders_dependencies_first(dag in arb_dag()) {
        let plan = PlanBuilder::new().extend(descriptors(&dag)).build().unwrap();
        prop_assert_eq!(plan.len(), dag.len());
        assert_dependencies_first(&plan);

        // Teardown visits dependents before what they depend on
        let teardown: Vec<&str> = plan.teardown_order().map(|d| d.id()).collect();
        let mut forward = plan.ids();
        forward.reverse();
        prop_assert_eq!(teardown, forward);
    }

    #[test]
    fn random_dag_order_is_input_order_independent(
        (dag, reversed) in arb_dag().prop_map(|dag| {
            let mut reversed = dag.clone();
            reversed.reverse();
            (dag, reversed)
        })
    ) {
        let a = PlanBuilder::new().extend(descriptors(&dag)).build().unwrap();
        let b = PlanBuilder::new().extend(descriptors(&reversed)).build().unwrap();
        prop_assert_eq!(a.ids(), b.ids());
    }

    #[test]
    fn back_edge_is_rejected_as_cycle(n in 2usize..10) {
        // hc-00 <- hc-01 <- ... <- hc-(n-1), then hc-00 -> hc-(n-1)
        let mut chain: Vec<ResourceDescriptor> = (1..n)
            .map(|i| health_check(&format!("hc-{:02}", i)).depends_on(format!("hc-{:02}", i - 1).as_str()))
            .collect();
        chain.push(health_check("hc-00").depends_on(format!("hc-{:02}", n - 1).as_str()));

        let err = PlanBuilder::new().extend(chain).build().unwrap_err();
        prop_assert!(matches!(err, ProvisionError::InvalidPlan(_)));
    }
}

#[test]
fn test_missing_dependency_rejected() {
    let err = PlanBuilder::new()
        .add(health_check("a").depends_on("ghost"))
        .build()
        .unwrap_err();
    match err {
        ProvisionError::InvalidPlan(msg) => assert!(msg.contains("ghost"), "{}", msg),
        other => panic!("expected InvalidPlan, got {:?}", other),
    }
}
