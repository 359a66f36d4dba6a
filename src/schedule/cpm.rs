//! Component C — critical path method over a dependency graph.
//!
//! Tasks and dependencies are dense-indexed into arrays (DESIGN.md
//! "Dependency graph as arena + indices"); cycle detection, topological
//! sort, and the forward/backward passes all operate on indices.

use crate::error::{MonteCarloError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyType {
    #[serde(rename = "fs")]
    FinishToStart,
    #[serde(rename = "ss")]
    StartToStart,
    #[serde(rename = "ff")]
    FinishToFinish,
    #[serde(rename = "sf")]
    StartToFinish,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    pub duration: f64,
    pub baseline_early_start: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub predecessor: String,
    pub successor: String,
    pub dep_type: DependencyType,
    pub lag: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskResult {
    pub early_start: f64,
    pub early_finish: f64,
    pub late_start: f64,
    pub late_finish: f64,
    pub total_float: f64,
    pub free_float: f64,
    pub is_critical: bool,
}

/// The CPM graph: dense-indexed tasks and typed/lagged edges.
#[derive(Debug, Clone, Default)]
pub struct ScheduleGraph {
    tasks: Vec<TaskSpec>,
    index_of: HashMap<String, usize>,
    edges: Vec<DependencyEdge>,
    adjacency_out: Vec<Vec<usize>>,
    adjacency_in: Vec<Vec<usize>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpmResult {
    pub tasks: HashMap<String, TaskResult>,
    pub project_duration: f64,
    pub critical_path: Vec<String>,
}

impl ScheduleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&mut self, task: TaskSpec) -> Result<()> {
        if self.index_of.contains_key(&task.id) {
            return Err(MonteCarloError::validation("task id", format!("duplicate task id '{}'", task.id)));
        }
        if !(task.duration > 0.0) {
            return Err(MonteCarloError::validation("task duration", "must be > 0"));
        }
        self.index_of.insert(task.id.clone(), self.tasks.len());
        self.tasks.push(task);
        self.adjacency_out.push(Vec::new());
        self.adjacency_in.push(Vec::new());
        Ok(())
    }

    fn idx(&self, id: &str) -> Result<usize> {
        self.index_of
            .get(id)
            .copied()
            .ok_or_else(|| MonteCarloError::validation("task id", format!("unknown task '{id}'")))
    }

    /// §4.C "Dependency creation contract": validate endpoints, reject
    /// duplicates, and reject edges that would create a cycle (by testing
    /// reachability from successor to predecessor before insertion).
    pub fn add_dependency(&mut self, edge: DependencyEdge) -> Result<()> {
        let p = self.idx(&edge.predecessor)?;
        let s = self.idx(&edge.successor)?;
        if p == s {
            return Err(MonteCarloError::domain("a task cannot depend on itself"));
        }
        if self.adjacency_out[p].contains(&s) {
            return Err(MonteCarloError::domain(format!(
                "dependency {} -> {} already exists",
                edge.predecessor, edge.successor
            )));
        }
        if self.can_reach(s, p) {
            return Err(MonteCarloError::domain(format!(
                "adding {} -> {} would create a cycle",
                edge.predecessor, edge.successor
            )));
        }
        self.adjacency_out[p].push(s);
        self.adjacency_in[s].push(p);
        self.edges.push(edge);
        Ok(())
    }

    fn can_reach(&self, from: usize, to: usize) -> bool {
        let mut visited = vec![false; self.tasks.len()];
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if visited[node] {
                continue;
            }
            visited[node] = true;
            for &next in &self.adjacency_out[node] {
                if !visited[next] {
                    stack.push(next);
                }
            }
        }
        false
    }

    /// §4.C "Cycle detection": DFS with a recursion stack; returns the
    /// cycle path if one exists. Must run before any forward pass.
    pub fn detect_cycle(&self) -> Option<Vec<String>> {
        let n = self.tasks.len();
        let mut state = vec![0u8; n]; // 0 = unvisited, 1 = in-stack, 2 = done
        let mut path = Vec::new();

        fn visit(
            node: usize,
            graph: &ScheduleGraph,
            state: &mut [u8],
            path: &mut Vec<usize>,
        ) -> Option<Vec<usize>> {
            state[node] = 1;
            path.push(node);
            for &next in &graph.adjacency_out[node] {
                match state[next] {
                    0 => {
                        if let Some(cycle) = visit(next, graph, state, path) {
                            return Some(cycle);
                        }
                    }
                    1 => {
                        let start = path.iter().position(|&x| x == next).unwrap();
                        let mut cycle = path[start..].to_vec();
                        cycle.push(next);
                        return Some(cycle);
                    }
                    _ => {}
                }
            }
            path.pop();
            state[node] = 2;
            None
        }

        for start in 0..n {
            if state[start] == 0 {
                if let Some(cycle) = visit(start, self, &mut state, &mut path) {
                    return Some(cycle.into_iter().map(|i| self.tasks[i].id.clone()).collect());
                }
            }
        }
        None
    }

    fn topological_order(&self) -> Result<Vec<usize>> {
        let n = self.tasks.len();
        let mut in_degree: Vec<usize> = self.adjacency_in.iter().map(|v| v.len()).collect();
        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(node) = queue.pop_front() {
            order.push(node);
            for &next in &self.adjacency_out[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }
        if order.len() != n {
            return Err(MonteCarloError::domain("schedule graph contains a cycle"));
        }
        Ok(order)
    }

    /// Forward + backward CPM pass, producing ES/EF/LS/LF, float, and the
    /// critical path (§4.C "Forward pass" / "Backward pass" / "Float" /
    /// "Critical path").
    pub fn compute(&self) -> Result<CpmResult> {
        if self.detect_cycle().is_some() {
            return Err(MonteCarloError::domain("schedule graph contains a cycle"));
        }
        let order = self.topological_order()?;
        let n = self.tasks.len();
        let mut es = vec![0.0f64; n];
        let mut ef = vec![0.0f64; n];

        for &node in &order {
            let mut start = self.tasks[node].baseline_early_start.unwrap_or(0.0);
            for (edge_idx, edge) in self.edges.iter().enumerate() {
                let p = self.idx(&edge.predecessor)?;
                let s = self.idx(&edge.successor)?;
                if s != node {
                    continue;
                }
                let _ = edge_idx;
                let d_s = self.tasks[s].duration;
                let candidate = match edge.dep_type {
                    DependencyType::FinishToStart => ef[p] + edge.lag + 1.0,
                    DependencyType::StartToStart => es[p] + edge.lag,
                    DependencyType::FinishToFinish => ef[p] + edge.lag - d_s + 1.0,
                    DependencyType::StartToFinish => es[p] + edge.lag - d_s + 1.0,
                };
                start = start.max(candidate);
            }
            es[node] = start;
            ef[node] = es[node] + self.tasks[node].duration - 1.0;
        }

        let project_late_finish = ef.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let mut lf = vec![project_late_finish; n];
        let mut ls = vec![0.0f64; n];

        for &node in order.iter().rev() {
            let mut finish = project_late_finish;
            let mut has_successor = false;
            for edge in &self.edges {
                let p = self.idx(&edge.predecessor)?;
                let s = self.idx(&edge.successor)?;
                if p != node {
                    continue;
                }
                has_successor = true;
                let d_s = self.tasks[s].duration;
                let candidate = match edge.dep_type {
                    DependencyType::FinishToStart => ls[s] - edge.lag - 1.0,
                    DependencyType::StartToStart => es[s] - edge.lag + self.tasks[node].duration - 1.0,
                    DependencyType::FinishToFinish => lf[s] - edge.lag,
                    DependencyType::StartToFinish => lf[s] - edge.lag + d_s - self.tasks[node].duration,
                };
                finish = finish.min(candidate);
            }
            if !has_successor {
                finish = project_late_finish;
            }
            lf[node] = finish;
            ls[node] = lf[node] - self.tasks[node].duration + 1.0;
        }

        let mut results = HashMap::new();
        let mut critical_path = Vec::new();
        for node in 0..n {
            let total_float = ls[node] - es[node];
            let mut free_float = total_float;
            let successors: Vec<usize> = self
                .edges
                .iter()
                .filter(|e| self.idx(&e.predecessor).unwrap() == node)
                .map(|e| self.idx(&e.successor).unwrap())
                .collect();
            if !successors.is_empty() {
                free_float = successors
                    .iter()
                    .map(|&s| (es[s] - ef[node] - 1.0).max(0.0))
                    .fold(f64::INFINITY, f64::min);
            }
            let is_critical = total_float.abs() < 1e-9;
            if is_critical {
                critical_path.push(self.tasks[node].id.clone());
            }
            results.insert(
                self.tasks[node].id.clone(),
                TaskResult {
                    early_start: es[node],
                    early_finish: ef[node],
                    late_start: ls[node],
                    late_finish: lf[node],
                    total_float,
                    free_float,
                    is_critical,
                },
            );
        }
        critical_path.sort_by_key(|id| {
            let idx = self.index_of[id];
            es[idx] as i64
        });

        let min_es = es.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_ef = ef.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let project_duration = if n == 0 { 0.0 } else { max_ef - min_es + 1.0 };

        Ok(CpmResult { tasks: results, project_duration, critical_path })
    }

    /// §4.C "Schedule compression": crashing and fast-tracking candidates.
    pub fn compression_candidates(&self, cpm: &CpmResult) -> (Vec<CrashCandidate>, Vec<FastTrackCandidate>) {
        let mut crashing = Vec::new();
        for task in &self.tasks {
            if let Some(r) = cpm.tasks.get(&task.id) {
                if r.is_critical && task.duration > 1.0 {
                    let savings = (task.duration * 0.3).max(0.0);
                    crashing.push(CrashCandidate {
                        task_id: task.id.clone(),
                        duration: task.duration,
                        max_savings_days: savings,
                    });
                }
            }
        }
        let mut fast_tracking = Vec::new();
        for edge in &self.edges {
            if edge.dep_type != DependencyType::FinishToStart {
                continue;
            }
            let pred_critical = cpm.tasks.get(&edge.predecessor).map(|r| r.is_critical).unwrap_or(false);
            let succ_critical = cpm.tasks.get(&edge.successor).map(|r| r.is_critical).unwrap_or(false);
            if pred_critical && succ_critical {
                if let Some(p_idx) = self.index_of.get(&edge.predecessor) {
                    if let Some(s_idx) = self.index_of.get(&edge.successor) {
                        let overlap = (self.tasks[*s_idx].duration / 2.0).min(self.tasks[*p_idx].duration / 2.0);
                        fast_tracking.push(FastTrackCandidate {
                            predecessor: edge.predecessor.clone(),
                            successor: edge.successor.clone(),
                            potential_overlap_days: overlap,
                        });
                    }
                }
            }
        }
        (crashing, fast_tracking)
    }

    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.id.as_str())
    }

    pub fn task_duration(&self, id: &str) -> Option<f64> {
        self.index_of.get(id).map(|&i| self.tasks[i].duration)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashCandidate {
    pub task_id: String,
    pub duration: f64,
    pub max_savings_days: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FastTrackCandidate {
    pub predecessor: String,
    pub successor: String,
    pub potential_overlap_days: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, d: f64) -> TaskSpec {
        TaskSpec { id: id.into(), duration: d, baseline_early_start: None }
    }

    fn fs(p: &str, s: &str) -> DependencyEdge {
        DependencyEdge { predecessor: p.into(), successor: s.into(), dep_type: DependencyType::FinishToStart, lag: 0.0 }
    }

    #[test]
    fn three_task_chain_matches_e3() {
        let mut g = ScheduleGraph::new();
        g.add_task(task("A", 5.0)).unwrap();
        g.add_task(task("B", 5.0)).unwrap();
        g.add_task(task("C", 5.0)).unwrap();
        g.add_dependency(fs("A", "B")).unwrap();
        g.add_dependency(fs("B", "C")).unwrap();
        let result = g.compute().unwrap();
        assert_eq!(result.tasks["A"].early_start, 0.0);
        assert_eq!(result.tasks["B"].early_start, 5.0);
        assert_eq!(result.tasks["C"].early_start, 10.0);
        assert_eq!(result.tasks["A"].early_finish, 4.0);
        assert_eq!(result.tasks["B"].early_finish, 9.0);
        assert_eq!(result.tasks["C"].early_finish, 14.0);
        assert!(result.tasks.values().all(|t| t.total_float.abs() < 1e-9));
        assert_eq!(result.project_duration, 15.0);
        assert_eq!(result.critical_path, vec!["A", "B", "C"]);
    }

    #[test]
    fn non_critical_branch_has_positive_float_e4() {
        let mut g = ScheduleGraph::new();
        g.add_task(task("A", 5.0)).unwrap();
        g.add_task(task("B", 5.0)).unwrap();
        g.add_task(task("C", 5.0)).unwrap();
        g.add_task(task("D", 3.0)).unwrap();
        g.add_dependency(fs("A", "B")).unwrap();
        g.add_dependency(fs("B", "C")).unwrap();
        g.add_dependency(fs("A", "D")).unwrap();
        g.add_dependency(fs("D", "C")).unwrap();
        let result = g.compute().unwrap();
        assert_eq!(result.tasks["D"].total_float, 2.0);
        assert_eq!(result.critical_path, vec!["A", "B", "C"]);
    }

    #[test]
    fn cycle_rejected_e6() {
        let mut g = ScheduleGraph::new();
        g.add_task(task("T1", 2.0)).unwrap();
        g.add_task(task("T2", 2.0)).unwrap();
        g.add_dependency(fs("T1", "T2")).unwrap();
        let err = g.add_dependency(fs("T2", "T1"));
        assert!(err.is_err());
        // graph unchanged: recomputing still succeeds with the single edge
        assert!(g.compute().is_ok());
    }

    #[test]
    fn every_zero_float_task_is_critical() {
        let mut g = ScheduleGraph::new();
        g.add_task(task("A", 4.0)).unwrap();
        g.add_task(task("B", 2.0)).unwrap();
        g.add_task(task("C", 6.0)).unwrap();
        g.add_dependency(fs("A", "C")).unwrap();
        g.add_dependency(fs("B", "C")).unwrap();
        let result = g.compute().unwrap();
        for (_, t) in &result.tasks {
            if t.total_float.abs() < 1e-9 {
                assert!(t.is_critical);
            }
        }
        let max_ef = result.tasks.values().map(|t| t.early_finish).fold(f64::NEG_INFINITY, f64::max);
        let min_es = result.tasks.values().map(|t| t.early_start).fold(f64::INFINITY, f64::min);
        assert_eq!(result.project_duration, max_ef - min_es + 1.0);
    }
}
