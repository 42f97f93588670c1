//! §4.4 validator 3: cycle detection over the declared parent→child graph
//! (task IDs as nodes), by DFS with a recursion-stack back-edge check.
//!
//! The spec calls this out for `parallel`; it applies identically to any
//! type that nests `Config` subtask templates (`composite`, `collection`),
//! since they all contribute edges to the same conceptual graph.

use task_core::{Config, Error, TaskId};

pub fn detect(root: &Config) -> Result<(), Error> {
    let mut path = Vec::new();
    visit(root, &mut path)
}

fn visit(cfg: &Config, path: &mut Vec<TaskId>) -> Result<(), Error> {
    if path.contains(&cfg.id) {
        let trail = path
            .iter()
            .map(TaskId::as_str)
            .collect::<Vec<_>>()
            .join(" -> ");
        return Err(Error::CycleDetected(format!("{trail} -> {}", cfg.id)));
    }
    path.push(cfg.id.clone());
    for child in cfg.subtasks() {
        visit(child, path)?;
    }
    path.pop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use task_core::{BasicConfig, ParallelConfig, TaskBody};

    fn leaf(id: &str) -> Config {
        Config {
            id: TaskId::new(id),
            body: TaskBody::Basic(BasicConfig {
                agent: Some("writer".into()),
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

    #[test]
    fn acyclic_tree_passes() {
        let cfg = Config {
            body: TaskBody::Parallel(ParallelConfig {
                tasks: vec![leaf("a"), leaf("b")],
            }),
            ..leaf("root")
        };
        assert!(detect(&cfg).is_ok());
    }

    #[test]
    fn reused_id_on_a_descendant_is_a_cycle() {
        let inner = Config {
            body: TaskBody::Parallel(ParallelConfig {
                tasks: vec![leaf("root")],
            }),
            ..leaf("branch")
        };
        let cfg = Config {
            body: TaskBody::Parallel(ParallelConfig { tasks: vec![inner] }),
            ..leaf("root")
        };
        let err = detect(&cfg).unwrap_err();
        assert!(matches!(err, Error::CycleDetected(_)));
    }
}
