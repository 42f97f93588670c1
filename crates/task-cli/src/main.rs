//! Simulated execution driver — loads a task config, runs it to completion
//! against the in-memory repository, and prints the resulting state tree.
//! Agent/tool invocation, template rendering, and real signal delivery are
//! external-collaborator concerns (see spec Non-goals); this binary stands
//! leaves up immediately so the orchestration machinery in `task-engine`
//! can be exercised end-to-end from the command line.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use task_condition::{Bindings, ConditionEvaluator, ConditionEvaluatorConfig};
use task_core::{
    BasicConfig, CollectionConfig, Config, ParallelConfig, State, Status, TaskBody, TaskId,
    WorkflowExecId, WorkflowId,
};
use task_engine::dispatch;
use task_engine::response::{self, TaskResult};
use task_engine::signal::{Delivery, SignalCoordinator};
use task_repository::{InMemoryRepository, Repository};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "task-cli", about = "Compozy task-engine simulation driver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a task config; compiles embedded CEL expressions.
    Validate {
        /// Path to a YAML task config
        path: PathBuf,
    },
    /// Run a task config to completion against the in-memory repository.
    Run {
        /// Path to a YAML task config
        path: PathBuf,
        /// JSON object merged into the root task's input
        #[arg(long)]
        input: Option<String>,
        /// JSON array of items for a `collection` root task
        #[arg(long)]
        items: Option<String>,
        /// JSON payload delivered to the first `wait`/`router` encountered
        #[arg(long)]
        signal: Option<String>,
        #[arg(long, default_value = "wf")]
        workflow_id: String,
        #[arg(long, default_value = "wf-exec-1")]
        workflow_exec_id: String,
        /// Print the final state tree as JSON instead of an indented tree
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "task_cli=info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Validate { path } => validate(&path),
        Commands::Run {
            path,
            input,
            items,
            signal,
            workflow_id,
            workflow_exec_id,
            json,
        } => run(&path, input, items, signal, workflow_id, workflow_exec_id, json).await,
    }
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let evaluator = ConditionEvaluator::new(ConditionEvaluatorConfig::default());
    let cwd = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    match task_config::load_and_eval(cwd, path, &evaluator) {
        Ok(cfg) => {
            println!("ok: {} ({:?})", cfg.id, cfg.task_type());
            Ok(())
        }
        Err(e) => {
            eprintln!("invalid: {e}");
            std::process::exit(1);
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run(
    path: &Path,
    input: Option<String>,
    items: Option<String>,
    signal: Option<String>,
    workflow_id: String,
    workflow_exec_id: String,
    print_json: bool,
) -> anyhow::Result<()> {
    let evaluator = ConditionEvaluator::new(ConditionEvaluatorConfig::default());
    let cwd = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let cfg = task_config::load_and_eval(cwd, path, &evaluator)?;

    let input_value: serde_json::Value = match input {
        Some(raw) => serde_json::from_str(&raw)?,
        None => serde_json::json!({}),
    };
    let items_value: Vec<serde_json::Value> = match items {
        Some(raw) => serde_json::from_str(&raw)?,
        None => Vec::new(),
    };
    let signal_value: serde_json::Value = match signal {
        Some(raw) => serde_json::from_str(&raw)?,
        None => serde_json::json!({}),
    };

    let repo = InMemoryRepository::new();
    let cancel = CancellationToken::new();
    let coordinator = SignalCoordinator::new();
    let ctx = ExecCtx {
        repo: &repo,
        evaluator: &evaluator,
        cancel: &cancel,
        coordinator: &coordinator,
        workflow_id: WorkflowId::new(workflow_id),
        workflow_exec_id: WorkflowExecId::new(workflow_exec_id),
        input: input_value.clone(),
        items: items_value,
        signal: signal_value,
    };

    let mut root = State::new_pending(
        task_core::Component::Task,
        cfg.id.clone(),
        task_core::TaskExecId::new("root"),
        ctx.workflow_id.clone(),
        ctx.workflow_exec_id.clone(),
        cfg.task_type(),
        None,
    );
    if let serde_json::Value::Object(map) = input_value {
        root.input = map;
    }

    let final_state = execute(&ctx, &cfg, root).await?;
    info!(status = %final_state.status, "root task finished");

    if print_json {
        let tree = print_tree_json(&repo, &final_state.task_exec_id).await?;
        println!("{}", serde_json::to_string_pretty(&tree)?);
    } else {
        print_tree_text(&repo, &final_state.task_exec_id, 0).await?;
    }

    if final_state.status != Status::Success {
        std::process::exit(1);
    }
    Ok(())
}

struct ExecCtx<'a> {
    repo: &'a InMemoryRepository,
    evaluator: &'a ConditionEvaluator,
    cancel: &'a CancellationToken,
    coordinator: &'a SignalCoordinator,
    workflow_id: WorkflowId,
    workflow_exec_id: WorkflowExecId,
    input: serde_json::Value,
    items: Vec<serde_json::Value>,
    signal: serde_json::Value,
}

fn synthetic_basic(id: TaskId) -> Config {
    Config {
        id,
        body: TaskBody::Basic(BasicConfig {
            agent: Some("simulated".into()),
            tool: None,
            action: None,
        }),
        on_success: None,
        on_error: None,
        strategy: Default::default(),
        max_workers: None,
        timeout: Default::default(),
        input_schema: None,
        output_schema: None,
        with: Default::default(),
        env: Default::default(),
        r#final: false,
    }
}

/// Drives `state` (already constructed by the caller, `Pending`) through to
/// a terminal status, dispatching and recursively executing children per
/// `cfg`'s type, and returns the repository's persisted copy once settled.
async fn execute(ctx: &ExecCtx<'_>, cfg: &Config, mut state: State) -> anyhow::Result<State> {
    ctx.repo.upsert_state(&state).await?;
    state.transition(Status::Running)?;
    ctx.repo.upsert_state(&state).await?;

    match &cfg.body {
        TaskBody::Basic(_) | TaskBody::Signal(_) => {
            response::handle_completion(
                ctx.repo,
                cfg,
                &mut state,
                TaskResult::Success(serde_json::json!({"simulated": true})),
            )
            .await?;
        }
        TaskBody::Router(r) => {
            let bindings = Bindings {
                signal: ctx.signal.clone(),
                payload: ctx.input.clone(),
                ..Default::default()
            };
            let target_id = response::select_route(ctx.evaluator, ctx.cancel, r, &bindings)?;
            let target_cfg = synthetic_basic(target_id);
            let child_state = dispatch::dispatch_router(&state, &target_cfg);
            let finished = Box::pin(execute(ctx, &target_cfg, child_state)).await?;
            response::handle_router_child_terminal(ctx.repo, cfg, &mut state, &finished).await?;
        }
        TaskBody::Parallel(p) => {
            for task_cfg in &p.tasks {
                let child_state = dispatch::dispatch_parallel(
                    &state,
                    &ParallelConfig { tasks: vec![task_cfg.clone()] },
                )
                .remove(0);
                let finished = Box::pin(execute(ctx, task_cfg, child_state)).await?;
                response::handle_composite_child_terminal(ctx.repo, cfg, &finished).await?;
            }
        }
        TaskBody::Composite(c) => {
            let synthetic_id = TaskId::new(format!("{}::__parallel", cfg.id));
            let synthetic_cfg = Config {
                id: synthetic_id,
                body: TaskBody::Parallel(ParallelConfig { tasks: c.tasks.clone() }),
                on_success: None,
                on_error: None,
                strategy: cfg.strategy,
                max_workers: cfg.max_workers,
                timeout: cfg.timeout,
                input_schema: None,
                output_schema: None,
                with: Default::default(),
                env: Default::default(),
                r#final: false,
            };
            let synthetic_state = dispatch::dispatch_composite(&state, &c.tasks).0;
            let finished = Box::pin(execute(ctx, &synthetic_cfg, synthetic_state)).await?;
            response::handle_composite_child_terminal(ctx.repo, cfg, &finished).await?;
        }
        TaskBody::Collection(c) => {
            execute_collection(ctx, cfg, &state, c).await?;
        }
        TaskBody::Wait(w) => {
            ctx.coordinator.register(
                ctx.workflow_exec_id.clone(),
                w.signal.clone(),
                state.task_exec_id.clone(),
                w.condition.clone(),
            );
            let deliveries = ctx.coordinator.deliver(
                ctx.evaluator,
                ctx.cancel,
                &ctx.workflow_exec_id,
                &w.signal,
                "cli-signal-1",
                ctx.signal.clone(),
            )?;
            match deliveries.first() {
                Some(Delivery::Accepted { payload, .. }) => {
                    response::handle_wait_accepted(ctx.repo, cfg, &mut state, payload.clone())
                        .await?;
                }
                _ => {
                    response::handle_wait_timeout(ctx.repo, cfg, &mut state).await?;
                }
            }
        }
        TaskBody::Aggregate(a) => {
            let bindings = Bindings {
                payload: ctx.input.clone(),
                ..Default::default()
            };
            let mut output = serde_json::Map::new();
            for (key, expr) in &a.outputs {
                let outcome = ctx.evaluator.evaluate(ctx.cancel, expr, &bindings)?;
                output.insert(key.clone(), serde_json::json!(outcome.result));
            }
            response::handle_completion(
                ctx.repo,
                cfg,
                &mut state,
                TaskResult::Success(serde_json::Value::Object(output)),
            )
            .await?;
        }
    }

    Ok(ctx.repo.get_state(&state.task_exec_id).await?)
}

async fn execute_collection(
    ctx: &ExecCtx<'_>,
    cfg: &Config,
    state: &State,
    c: &CollectionConfig,
) -> anyhow::Result<()> {
    let filtered =
        dispatch::filter_items(ctx.evaluator, ctx.cancel, c.filter.as_deref(), &ctx.items)?;
    let mut produced = Vec::new();
    let mut start = 0usize;
    'waves: while start < filtered.len() {
        let wave = dispatch::dispatch_collection_wave(state, c, &filtered, start);
        if wave.is_empty() {
            break;
        }
        let wave_len = wave.len();
        for child_state in wave {
            let finished = Box::pin(execute(ctx, &c.task, child_state)).await?;
            produced.push(finished.clone());
            response::handle_composite_child_terminal(ctx.repo, cfg, &finished).await?;
            if !c.continue_on_error && finished.status == Status::Failed {
                break 'waves;
            }
        }
        start += wave_len;
        if dispatch::should_stop_collection(ctx.evaluator, ctx.cancel, c, &produced)? {
            break;
        }
    }
    Ok(())
}

async fn print_tree_text(
    repo: &InMemoryRepository,
    task_exec_id: &task_core::TaskExecId,
    depth: usize,
) -> anyhow::Result<()> {
    let state = repo.get_state(task_exec_id).await?;
    let indent = "  ".repeat(depth);
    println!(
        "{indent}{} [{:?}] -> {}",
        state.task_id, state.execution_type, state.status
    );
    if let Some(err) = &state.error {
        println!("{indent}  error: {} ({})", err.message, err.code);
    }
    for child in repo.list_children(task_exec_id).await? {
        Box::pin(print_tree_text(repo, &child.task_exec_id, depth + 1)).await?;
    }
    Ok(())
}

async fn print_tree_json(
    repo: &InMemoryRepository,
    task_exec_id: &task_core::TaskExecId,
) -> anyhow::Result<serde_json::Value> {
    let state = repo.get_state(task_exec_id).await?;
    let mut children = Vec::new();
    for child in repo.list_children(task_exec_id).await? {
        children.push(Box::pin(print_tree_json(repo, &child.task_exec_id)).await?);
    }
    Ok(serde_json::json!({
        "task_id": state.task_id.to_string(),
        "task_exec_id": state.task_exec_id.to_string(),
        "type": format!("{:?}", state.execution_type),
        "status": state.status.to_string(),
        "output": state.output,
        "error": state.error.as_ref().map(|e| serde_json::json!({"code": e.code, "message": e.message})),
        "children": children,
    }))
}
