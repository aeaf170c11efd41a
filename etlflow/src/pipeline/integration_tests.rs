//! Cross-module tests for planning and execution.

#[cfg(test)]
mod tests {
    use crate::core::{Payload, RunStatus, StepStatus};
    use crate::errors::EtlflowError;
    use crate::events::LoggingEventSink;
    use crate::pipeline::{Executor, ExecutorConfig, GraphBuilder, RetryPolicy};
    use crate::registry::{StepRegistry, StepSpec};
    use crate::steps::{FnStep, NoOpStep, StepResult};
    use crate::context::StepInputs;
    use crate::testing::{FailingStep, StaticStep};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use serde_json::json;
    use std::sync::Arc;

    /// A random DAG: each step may depend on any earlier-numbered step.
    fn random_dag(rng: &mut StdRng, size: usize) -> StepRegistry {
        let mut names: Vec<String> = (0..size).map(|i| format!("s{i}")).collect();
        let mut edges: Vec<Vec<String>> = vec![Vec::new(); size];
        for (i, deps) in edges.iter_mut().enumerate() {
            for j in 0..i {
                if rng.gen_bool(0.3) {
                    deps.push(names[j].clone());
                }
            }
        }

        // Register in shuffled order so registration order is not topological.
        let mut order: Vec<usize> = (0..size).collect();
        for i in (1..order.len()).rev() {
            order.swap(i, rng.gen_range(0..=i));
        }

        let mut registry = StepRegistry::new();
        for i in order {
            let spec = StepSpec::new(std::mem::take(&mut names[i]), Arc::new(NoOpStep))
                .with_dependencies(edges[i].clone());
            registry.register(spec).unwrap();
        }
        registry
    }

    #[test]
    fn test_random_dags_place_dependencies_earlier() {
        let mut rng = StdRng::seed_from_u64(7);
        for size in 0..25 {
            let registry = random_dag(&mut rng, size);
            let plan = GraphBuilder::build(&registry).unwrap();

            assert_eq!(plan.step_count(), size);
            assert_eq!(plan.execution_order().len(), size);
            for id in plan.execution_order() {
                let wave = plan.wave_of(id).unwrap();
                for dep in &plan.step(id).unwrap().dependencies {
                    assert!(plan.wave_of(dep).unwrap() < wave);
                }
            }
        }
    }

    #[test]
    fn test_random_back_edge_is_always_a_cycle() {
        let mut rng = StdRng::seed_from_u64(11);
        for size in 2..20 {
            let mut registry = StepRegistry::new();
            let back_edge_from = rng.gen_range(0..size - 1);
            for i in 0..size {
                let mut spec = StepSpec::new(format!("s{i}"), Arc::new(NoOpStep));
                if i > 0 {
                    spec = spec.with_dependency(format!("s{}", i - 1));
                }
                if i == back_edge_from {
                    spec = spec.with_dependency(format!("s{}", size - 1));
                }
                registry.register(spec).unwrap();
            }

            match GraphBuilder::build(&registry) {
                Err(EtlflowError::CyclicDependency(e)) => {
                    assert_eq!(e.cycle_path.first(), e.cycle_path.last());
                    assert!(e.cycle_path.len() >= 2);
                }
                other => panic!("expected a cycle for size {size}, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_diamond_with_logging_sink() {
        let sum = FnStep::new("sum", |inputs: &StepInputs| -> StepResult {
            let left = inputs.get("left")?.as_i64().unwrap_or_default();
            let right = inputs.get("right")?.as_i64().unwrap_or_default();
            Ok(json!(left + right))
        });

        let registry = StepRegistry::new()
            .step("root", Arc::new(StaticStep::new(json!(1))), &[])
            .unwrap()
            .step("left", Arc::new(StaticStep::new(json!(2))), &["root"])
            .unwrap()
            .step("right", Arc::new(StaticStep::new(json!(3))), &["root"])
            .unwrap()
            .step("sum", Arc::new(sum), &["left", "right"])
            .unwrap();
        let plan = GraphBuilder::build(&registry).unwrap();

        let run = Executor::new(ExecutorConfig::default().with_max_concurrency(1))
            .with_event_sink(Arc::new(LoggingEventSink::debug()))
            .run(&plan, Payload::Null)
            .await;

        assert_eq!(run.status, RunStatus::Succeeded);
        assert_eq!(run.output("sum"), Some(&json!(5)));
        assert_eq!(run.summary().success_rate(), 1.0);
    }

    #[tokio::test]
    async fn test_total_failure_summary() {
        let mut registry = StepRegistry::new();
        registry
            .register(
                StepSpec::new("only", Arc::new(FailingStep::transient("down")))
                    .with_retry(RetryPolicy::immediate(2)),
            )
            .unwrap();
        let plan = GraphBuilder::build(&registry).unwrap();

        let run = Executor::default().run(&plan, Payload::Null).await;
        let summary = run.summary();

        assert_eq!(run.step_status("only"), Some(StepStatus::Failed));
        assert!(summary.is_total_failure());
        assert!(!summary.is_partial_success());
        assert_eq!(summary.failures[0].attempts, 2);
        assert_eq!(run.failed_steps().len(), 1);

        let serialized = serde_json::to_value(&run).unwrap();
        assert_eq!(serialized["status"], json!("failed"));
    }
}
