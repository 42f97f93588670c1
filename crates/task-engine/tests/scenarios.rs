//! §8 end-to-end scenarios, driven against the in-memory repository.

use task_condition::{Bindings, ConditionEvaluator, ConditionEvaluatorConfig};
use task_core::{
    BasicConfig, CollectionConfig, CollectionMode, Component, Config, HumanDuration, RouterConfig,
    State, StateError, Status, Strategy, TaskBody, TaskExecId, TaskId, TaskType, WorkflowExecId,
    WorkflowId,
};
use task_engine::dispatch;
use task_engine::response::{self, TaskResult};
use task_engine::signal::{Delivery, SignalCoordinator};
use task_engine::updater::{self, UpdaterConfig};
use task_repository::{InMemoryRepository, Repository};
use tokio_util::sync::CancellationToken;

fn basic_task(id: &str) -> Config {
    Config {
        id: TaskId::new(id),
        body: TaskBody::Basic(BasicConfig {
            agent: Some("writer".into()),
            tool: None,
            action: None,
        }),
        on_success: None,
        on_error: None,
        strategy: Strategy::WaitAll,
        max_workers: None,
        timeout: HumanDuration::ZERO,
        input_schema: None,
        output_schema: None,
        with: Default::default(),
        env: Default::default(),
        r#final: false,
    }
}

fn parallel_parent(id: &str, strategy: Strategy) -> State {
    let mut parent = State::new_pending(
        Component::Task,
        TaskId::new(id),
        TaskExecId::new(format!("exec-{id}")),
        WorkflowId::new("wf"),
        WorkflowExecId::new("wf-exec-1"),
        TaskType::Parallel,
        None,
    );
    parent.input.insert(
        "_parallel_config".into(),
        serde_json::json!({"strategy": strategy_name(strategy)}),
    );
    parent.transition(Status::Running).unwrap();
    parent
}

fn strategy_name(s: Strategy) -> &'static str {
    match s {
        Strategy::WaitAll => "wait_all",
        Strategy::FailFast => "fail_fast",
        Strategy::BestEffort => "best_effort",
        Strategy::Race => "race",
    }
}

async fn terminate_child(repo: &InMemoryRepository, child: &mut State, status: Status) {
    child.transition(Status::Running).unwrap();
    child.transition(status).unwrap();
    repo.upsert_state(child).await.unwrap();
    updater::reconcile(repo, child, &UpdaterConfig::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn scenario_1_wait_all_three_children_succeed() {
    let repo = InMemoryRepository::new();
    let parent = parallel_parent("root", Strategy::WaitAll);
    repo.upsert_state(&parent).await.unwrap();

    let cfg = task_core::ParallelConfig {
        tasks: vec![basic_task("c1"), basic_task("c2"), basic_task("c3")],
    };
    let mut children = dispatch::dispatch_parallel(&parent, &cfg);
    for child in &mut children {
        terminate_child(&repo, child, Status::Success).await;
    }

    let reconciled = repo.get_state(&parent.task_exec_id).await.unwrap();
    assert_eq!(reconciled.status, Status::Success);
    let progress = repo.get_progress_info(&parent.task_exec_id).await.unwrap();
    assert_eq!(progress.total_children, 3);
    assert_eq!(progress.completed_count, 3);
    assert_eq!(progress.failed_count, 0);
}

#[tokio::test]
async fn scenario_2_fail_fast_trips_on_first_failure() {
    let repo = InMemoryRepository::new();
    let parent = parallel_parent("root", Strategy::FailFast);
    repo.upsert_state(&parent).await.unwrap();

    let cfg = task_core::ParallelConfig {
        tasks: vec![basic_task("c1"), basic_task("c2"), basic_task("c3")],
    };
    let mut children = dispatch::dispatch_parallel(&parent, &cfg);
    for child in &children {
        repo.upsert_state(child).await.unwrap();
    }

    terminate_child(&repo, &mut children[0], Status::Failed).await;
    let reconciled = repo.get_state(&parent.task_exec_id).await.unwrap();
    assert_eq!(reconciled.status, Status::Failed);
    // c2/c3 remain pending; cancellation is the collaborator's job, not C5's.
    let c2 = repo.get_state(&children[1].task_exec_id).await.unwrap();
    assert_eq!(c2.status, Status::Pending);
}

#[tokio::test]
async fn scenario_3_best_effort_partial_success_is_overall_success() {
    let repo = InMemoryRepository::new();
    let parent = parallel_parent("root", Strategy::BestEffort);
    repo.upsert_state(&parent).await.unwrap();

    let cfg = task_core::ParallelConfig {
        tasks: vec![basic_task("c1"), basic_task("c2"), basic_task("c3")],
    };
    let mut children = dispatch::dispatch_parallel(&parent, &cfg);
    terminate_child(&repo, &mut children[0], Status::Success).await;
    terminate_child(&repo, &mut children[1], Status::Failed).await;
    terminate_child(&repo, &mut children[2], Status::Failed).await;

    let reconciled = repo.get_state(&parent.task_exec_id).await.unwrap();
    assert_eq!(reconciled.status, Status::Success);
}

#[tokio::test]
async fn scenario_4_race_first_completion_wins() {
    let repo = InMemoryRepository::new();
    let parent = parallel_parent("root", Strategy::Race);
    repo.upsert_state(&parent).await.unwrap();

    let cfg = task_core::ParallelConfig {
        tasks: vec![basic_task("c1"), basic_task("c2"), basic_task("c3")],
    };
    let mut children = dispatch::dispatch_parallel(&parent, &cfg);
    terminate_child(&repo, &mut children[1], Status::Success).await;

    let reconciled = repo.get_state(&parent.task_exec_id).await.unwrap();
    assert_eq!(reconciled.status, Status::Success);

    // The parent's frozen state does not prevent siblings from later
    // terminating too; the strategy table just never revisits it (wait_all
    // between two terminal successes is a same-status no-op via C5).
    terminate_child(&repo, &mut children[0], Status::Success).await;
    let still = repo.get_state(&parent.task_exec_id).await.unwrap();
    assert_eq!(still.status, Status::Success);
}

#[tokio::test]
async fn scenario_5_router_resolves_branch() {
    let evaluator = ConditionEvaluator::new(ConditionEvaluatorConfig::default());
    let cancel = CancellationToken::new();
    let repo = InMemoryRepository::new();

    let mut routes = std::collections::HashMap::new();
    routes.insert("yes".to_string(), TaskId::new("ok"));
    routes.insert("no".to_string(), TaskId::new("bad"));
    let router_cfg = RouterConfig {
        condition: "signal.payload.approved == true".into(),
        routes,
    };
    let bindings = Bindings {
        signal: serde_json::json!({"payload": {"approved": true}}),
        ..Default::default()
    };
    let selected = response::select_route(&evaluator, &cancel, &router_cfg, &bindings).unwrap();
    assert_eq!(selected, TaskId::new("ok"));

    let mut router_state = State::new_pending(
        Component::Task,
        TaskId::new("route-decision"),
        TaskExecId::new("exec-route-decision"),
        WorkflowId::new("wf"),
        WorkflowExecId::new("wf-exec-1"),
        TaskType::Router,
        None,
    );
    router_state.transition(Status::Running).unwrap();
    repo.upsert_state(&router_state).await.unwrap();

    let target = basic_task(selected.as_str());
    let mut route_child = dispatch::dispatch_router(&router_state, &target);
    route_child.transition(Status::Running).unwrap();
    route_child.transition(Status::Success).unwrap();
    repo.upsert_state(&route_child).await.unwrap();

    let router_cfg_wrapper = basic_task("route-decision");
    let outcome = response::handle_router_child_terminal(
        &repo,
        &router_cfg_wrapper,
        &mut router_state,
        &route_child,
    )
    .await
    .unwrap();

    assert_eq!(router_state.status, Status::Success);
    assert_eq!(outcome.next_task, None);
    let persisted = repo.get_state(&router_state.task_exec_id).await.unwrap();
    assert_eq!(persisted.status, Status::Success);
}

#[tokio::test]
async fn scenario_6_wait_with_dedup() {
    let evaluator = ConditionEvaluator::new(ConditionEvaluatorConfig::default());
    let cancel = CancellationToken::new();
    let coordinator = SignalCoordinator::new();
    let wf_exec = WorkflowExecId::new("wf-exec-1");
    let wait_exec_id = TaskExecId::new("exec-wait-approval");

    coordinator.register(wf_exec.clone(), "approval", wait_exec_id.clone(), None);

    let first = coordinator
        .deliver(
            &evaluator,
            &cancel,
            &wf_exec,
            "approval",
            "s1",
            serde_json::json!({"approved": true}),
        )
        .unwrap();
    assert!(matches!(first[0], Delivery::Accepted { .. }));

    let second = coordinator
        .deliver(
            &evaluator,
            &cancel,
            &wf_exec,
            "approval",
            "s1",
            serde_json::json!({"approved": true}),
        )
        .unwrap();
    assert!(matches!(second[0], Delivery::Duplicate { .. }));
}

#[tokio::test]
async fn scenario_7_collection_with_filter_and_stop_on_failure() {
    let evaluator = ConditionEvaluator::new(ConditionEvaluatorConfig::default());
    let cancel = CancellationToken::new();
    let repo = InMemoryRepository::new();

    let parent = parallel_parent("collect", Strategy::WaitAll);
    repo.upsert_state(&parent).await.unwrap();

    let items = vec![
        serde_json::json!({"v": 1}),
        serde_json::json!({"v": 2}),
        serde_json::json!({"v": 3}),
    ];
    let filtered = dispatch::filter_items(&evaluator, &cancel, Some("payload.v > 1"), &items).unwrap();
    assert_eq!(filtered.len(), 2);

    let collection_cfg = CollectionConfig {
        items: "{{ .input.rows }}".into(),
        task: Box::new(basic_task("process-row")),
        mode: CollectionMode::Sequential,
        batch: 1,
        filter: Some("payload.v > 1".into()),
        stop_condition: None,
        item_var: "item".into(),
        index_var: "index".into(),
        continue_on_error: false,
    };
    // Sequential mode, batch=1: the first wave holds only v=2.
    let mut first_wave = dispatch::dispatch_collection_wave(&parent, &collection_cfg, &filtered, 0);
    assert_eq!(first_wave.len(), 1);
    repo.upsert_state(&first_wave[0]).await.unwrap();

    // v=2 fails with continue_on_error=false: the caller stops before ever
    // dispatching the v=3 wave.
    terminate_child(&repo, &mut first_wave[0], Status::Failed).await;
    let reconciled = repo.get_state(&parent.task_exec_id).await.unwrap();
    assert_eq!(reconciled.status, Status::Failed);
    assert!(!collection_cfg.continue_on_error);

    let second_wave = dispatch::dispatch_collection_wave(&parent, &collection_cfg, &filtered, 1);
    let v3_exec_id = second_wave[0].task_exec_id.clone();
    let v3 = repo.get_state(&v3_exec_id).await;
    assert!(v3.is_err(), "v=3 must never have been persisted/executed");
}

#[tokio::test]
async fn scenario_8_cel_cost_breach_fails_the_evaluation() {
    let config = ConditionEvaluatorConfig {
        cache_size: 100,
        cost_limit: 5,
    };
    let evaluator = ConditionEvaluator::new(config);
    let cancel = CancellationToken::new();
    let bindings = Bindings::default();

    let err = evaluator
        .evaluate(
            &cancel,
            "1 + 1 + 1 + 1 + 1 + 1 + 1 + 1 + 1 + 1 + 1 + 1",
            &bindings,
        )
        .unwrap_err();
    assert!(matches!(err, task_core::Error::CostExceeded { .. }));

    let repo = InMemoryRepository::new();
    let mut state = State::new_pending(
        Component::Task,
        TaskId::new("cost-check"),
        TaskExecId::new("exec-cost-check"),
        WorkflowId::new("wf"),
        WorkflowExecId::new("wf-exec-1"),
        TaskType::Basic,
        None,
    );
    state.transition(Status::Running).unwrap();
    let cfg = basic_task("cost-check");
    let outcome = response::handle_completion(
        &repo,
        &cfg,
        &mut state,
        TaskResult::Failure(StateError {
            code: "CEL_COST_EXCEEDED".into(),
            message: err.to_string(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(state.status, Status::Failed);
    assert!(!outcome.retry_scheduled);
}
