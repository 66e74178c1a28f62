use anyhow::{bail, Result};
use minos_common::types::{ScoringMode, Subtask};
use std::collections::VecDeque;

/// Validate the subtask dependency graph and return a processing order.
///
/// Validation happens while in-degrees are computed: every edge must point
/// at an existing subtask, and both endpoints of an edge must use Minimum
/// scoring. The order is produced with Kahn's algorithm; the queue is
/// seeded in ascending index order, so subtasks of equal rank keep their
/// declared order.
pub fn topological_order(subtasks: &[Subtask]) -> Result<Vec<usize>> {
    let count = subtasks.len();
    let mut in_degree = vec![0usize; count];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];

    for (index, subtask) in subtasks.iter().enumerate() {
        if subtask.dependencies.is_empty() {
            continue;
        }
        if subtask.mode != ScoringMode::Minimum {
            bail!(
                "subtask {} declares dependencies but uses {:?} scoring; only minimum subtasks may depend on others",
                index,
                subtask.mode
            );
        }
        for &dep in &subtask.dependencies {
            if dep >= count {
                bail!("subtask {} depends on nonexistent subtask {}", index, dep);
            }
            if subtasks[dep].mode != ScoringMode::Minimum {
                bail!(
                    "subtask {} depends on subtask {} which uses {:?} scoring; dependency targets must use minimum",
                    index,
                    dep,
                    subtasks[dep].mode
                );
            }
            dependents[dep].push(index);
            in_degree[index] += 1;
        }
    }

    let mut queue: VecDeque<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(count);
    while let Some(index) = queue.pop_front() {
        order.push(index);
        for &dependent in &dependents[index] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if order.len() < count {
        bail!("dependency loop detected among subtasks");
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use minos_common::types::TestcaseJudge;

    fn subtask(mode: ScoringMode, dependencies: Vec<usize>) -> Subtask {
        Subtask {
            mode,
            score: 100.0,
            cases: vec![TestcaseJudge {
                name: "c1".to_string(),
                input: Some("c1.in".to_string()),
                output: Some("c1.out".to_string()),
            }],
            dependencies,
        }
    }

    #[test]
    fn test_independent_subtasks_keep_declared_order() {
        let subtasks = vec![
            subtask(ScoringMode::Summation, vec![]),
            subtask(ScoringMode::Minimum, vec![]),
            subtask(ScoringMode::Multiple, vec![]),
        ];
        assert_eq!(topological_order(&subtasks).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_chain_respects_edges() {
        let subtasks = vec![
            subtask(ScoringMode::Minimum, vec![1]),
            subtask(ScoringMode::Minimum, vec![2]),
            subtask(ScoringMode::Minimum, vec![]),
        ];
        assert_eq!(topological_order(&subtasks).unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn test_diamond_is_stable() {
        let subtasks = vec![
            subtask(ScoringMode::Minimum, vec![]),
            subtask(ScoringMode::Minimum, vec![0]),
            subtask(ScoringMode::Minimum, vec![0]),
            subtask(ScoringMode::Minimum, vec![1, 2]),
        ];
        assert_eq!(topological_order(&subtasks).unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let subtasks = vec![
            subtask(ScoringMode::Minimum, vec![1]),
            subtask(ScoringMode::Minimum, vec![0]),
        ];
        let err = topological_order(&subtasks).unwrap_err();
        assert!(err.to_string().contains("loop detected"));
    }

    #[test]
    fn test_self_dependency_is_a_loop() {
        let subtasks = vec![subtask(ScoringMode::Minimum, vec![0])];
        let err = topological_order(&subtasks).unwrap_err();
        assert!(err.to_string().contains("loop detected"));
    }

    #[test]
    fn test_out_of_range_dependency_is_rejected() {
        let subtasks = vec![subtask(ScoringMode::Minimum, vec![5])];
        let err = topological_order(&subtasks).unwrap_err();
        assert!(err.to_string().contains("nonexistent"));
    }

    #[test]
    fn test_non_minimum_owner_with_dependencies_is_rejected() {
        let subtasks = vec![
            subtask(ScoringMode::Minimum, vec![]),
            subtask(ScoringMode::Summation, vec![0]),
        ];
        assert!(topological_order(&subtasks).is_err());
    }

    #[test]
    fn test_non_minimum_target_is_rejected() {
        let subtasks = vec![
            subtask(ScoringMode::Multiple, vec![]),
            subtask(ScoringMode::Minimum, vec![0]),
        ];
        assert!(topological_order(&subtasks).is_err());
    }
}
