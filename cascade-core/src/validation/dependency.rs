//! Dependency validation
//!
//! Resolves every declared dependency name and searches the resulting graph for
//! cycles. All problems are collected so a user can fix everything in one pass.
//!
//! Cycle detection runs a depth-first traversal from every job with a recursion
//! stack. A dependency pointing back into the stack closes a cycle; the reported
//! path starts at the repeated node. Because several start nodes can rediscover
//! the same cycle, each one is rotated to begin at its lexicographically smallest
//! name and deduplicated by that rotation.

use std::collections::HashSet;

use crate::domain::definition::{JobRef, PipelineDefinition, Resolution};
use crate::validation::error::{ValidationError, ValidationReport};

/// Resolved dependency edges, indexed like the definition's stages and jobs
struct DependencyGraph<'a> {
    pipeline: &'a PipelineDefinition,
    edges: Vec<Vec<Vec<JobRef>>>,
}

impl<'a> DependencyGraph<'a> {
    fn build(pipeline: &'a PipelineDefinition, report: &mut ValidationReport) -> Self {
        let mut edges = Vec::with_capacity(pipeline.stages.len());

        for (stage_idx, stage) in pipeline.stages.iter().enumerate() {
            let mut stage_edges = Vec::with_capacity(stage.jobs.len());

            for (job_idx, job) in stage.jobs.iter().enumerate() {
                let path = dependencies_path(JobRef {
                    stage: stage_idx,
                    job: job_idx,
                });
                let mut job_edges = Vec::with_capacity(job.dependencies.len());

                for dependency in &job.dependencies {
                    match pipeline.resolve_dependency(stage_idx, dependency) {
                        Resolution::SameStage(target) | Resolution::EarlierStage(target) => {
                            job_edges.push(target)
                        }
                        Resolution::LaterStage(target) => {
                            report.push(ValidationError::forward_dependency(
                                path.clone(),
                                &job.name,
                                dependency,
                                &pipeline.stages[target.stage].name,
                            ));
                        }
                        Resolution::Missing => {
                            report.push(ValidationError::missing_dependency(
                                path.clone(),
                                &job.name,
                                dependency,
                            ));
                        }
                    }
                }

                stage_edges.push(job_edges);
            }

            edges.push(stage_edges);
        }

        Self { pipeline, edges }
    }

    fn dependencies_of(&self, node: JobRef) -> &[JobRef] {
        &self.edges[node.stage][node.job]
    }

    fn name(&self, node: JobRef) -> &str {
        &self.pipeline.stages[node.stage].jobs[node.job].name
    }

    fn nodes(&self) -> impl Iterator<Item = JobRef> + '_ {
        self.pipeline.jobs().map(|(at, _)| at)
    }
}

/// Checks dependency references and acyclicity
pub fn validate_dependencies(pipeline: &PipelineDefinition) -> Result<(), ValidationReport> {
    let mut report = ValidationReport::default();
    let graph = DependencyGraph::build(pipeline, &mut report);

    for (start, cycle) in find_cycles(&graph) {
        report.push(ValidationError::cycle(dependencies_path(start), cycle));
    }

    report.into_result()
}

/// Every distinct dependency cycle in the pipeline, canonically rotated
///
/// Unresolvable dependencies are ignored here; they are reported by
/// [`validate_dependencies`].
pub fn detect_cycles(pipeline: &PipelineDefinition) -> Vec<Vec<String>> {
    let mut ignored = ValidationReport::default();
    let graph = DependencyGraph::build(pipeline, &mut ignored);
    find_cycles(&graph).into_iter().map(|(_, cycle)| cycle).collect()
}

/// Rotates a cycle so it starts at its lexicographically smallest element
pub fn canonicalize_cycle(cycle: &[String]) -> Vec<String> {
    let Some(start) = cycle
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(idx, _)| idx)
    else {
        return Vec::new();
    };

    cycle[start..]
        .iter()
        .chain(cycle[..start].iter())
        .cloned()
        .collect()
}

fn find_cycles(graph: &DependencyGraph<'_>) -> Vec<(JobRef, Vec<String>)> {
    let mut signatures = HashSet::new();
    let mut cycles = Vec::new();

    for start in graph.nodes() {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();
        visit(graph, start, &mut visited, &mut stack, &mut |path| {
            let names: Vec<String> = path.iter().map(|n| graph.name(*n).to_string()).collect();
            let canonical = canonicalize_cycle(&names);
            // A cycle never leaves its stage; job names only repeat across stages
            let signature = format!("{}:{}", path[0].stage, canonical.join("->"));
            if signatures.insert(signature) {
                let anchor = path
                    .iter()
                    .copied()
                    .find(|n| graph.name(*n) == canonical[0])
                    .unwrap_or(path[0]);
                cycles.push((anchor, canonical));
            }
        });
    }

    cycles
}

fn visit<F>(
    graph: &DependencyGraph<'_>,
    node: JobRef,
    visited: &mut HashSet<JobRef>,
    stack: &mut Vec<JobRef>,
    on_cycle: &mut F,
) where
    F: FnMut(&[JobRef]),
{
    visited.insert(node);
    stack.push(node);

    for &dependency in graph.dependencies_of(node) {
        if let Some(pos) = stack.iter().position(|n| *n == dependency) {
            on_cycle(&stack[pos..]);
        } else if !visited.contains(&dependency) {
            visit(graph, dependency, visited, stack, on_cycle);
        }
    }

    stack.pop();
}

fn dependencies_path(at: JobRef) -> String {
    format!(
        "pipeline.stages[{}].jobs[{}].dependencies",
        at.stage, at.job
    )
}
