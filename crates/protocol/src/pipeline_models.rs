//! Pipeline definition models.
//!
//! A pipeline is a static directed acyclic graph of named stages. The
//! executor never recomputes ordering per request: the DAG is validated and
//! topologically sorted exactly once, when the definition is constructed.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use ts_rs::TS;

/// One step of the pipeline, bound to a single agent capability.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct StageDefinition {
    /// Stage name, unique within a pipeline.
    pub name: String,

    /// Name of the agent capability this stage invokes.
    pub capability: String,

    /// Stages whose artifacts must exist before this stage runs.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl StageDefinition {
    pub fn new(name: &str, capability: &str, depends_on: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            capability: capability.to_string(),
            depends_on: depends_on.iter().map(|d| (*d).to_string()).collect(),
        }
    }
}

/// Errors detected while validating a pipeline definition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineDefinitionError {
    #[error("duplicate stage name: {0}")]
    DuplicateStage(String),

    #[error("stage '{stage}' depends on unknown stage '{dependency}'")]
    UnknownDependency { stage: String, dependency: String },

    #[error("dependency cycle involving stage '{0}'")]
    Cycle(String),
}

/// A validated pipeline: stages held in a fixed topological order.
///
/// Construction via [`PipelineDefinition::new`] is the only way to obtain
/// one (deserialization routes through it too), so holding a
/// `PipelineDefinition` is proof the stage graph is a DAG and that
/// `stages()` yields a valid execution order.
#[derive(Serialize, Debug, Clone, TS)]
pub struct PipelineDefinition {
    name: String,
    stages: Vec<StageDefinition>,
}

impl<'de> Deserialize<'de> for PipelineDefinition {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            name: String,
            #[serde(default)]
            stages: Vec<StageDefinition>,
        }

        let raw = Raw::deserialize(deserializer)?;
        PipelineDefinition::new(raw.name, raw.stages).map_err(serde::de::Error::custom)
    }
}

impl PipelineDefinition {
    /// Validate the stage graph and fix its execution order.
    ///
    /// Uses a stable Kahn traversal: among stages whose dependencies are
    /// all satisfied, declaration order wins, so the resulting order is
    /// deterministic for a given definition.
    ///
    /// # Errors
    ///
    /// Returns `PipelineDefinitionError` on duplicate stage names, unknown
    /// dependencies, or cycles.
    pub fn new(
        name: impl Into<String>,
        stages: Vec<StageDefinition>,
    ) -> Result<Self, PipelineDefinitionError> {
        let mut seen = HashSet::new();
        for stage in &stages {
            if !seen.insert(stage.name.clone()) {
                return Err(PipelineDefinitionError::DuplicateStage(stage.name.clone()));
            }
        }

        let index_by_name: HashMap<&str, usize> = stages
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();

        for stage in &stages {
            for dep in &stage.depends_on {
                if !index_by_name.contains_key(dep.as_str()) {
                    return Err(PipelineDefinitionError::UnknownDependency {
                        stage: stage.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        // Stable Kahn: repeatedly take the first unplaced stage whose
        // dependencies are all placed.
        let mut placed: Vec<bool> = vec![false; stages.len()];
        let mut order: Vec<usize> = Vec::with_capacity(stages.len());
        let mut placed_names: HashSet<&str> = HashSet::new();

        while order.len() < stages.len() {
            let next = stages.iter().enumerate().position(|(i, stage)| {
                !placed[i]
                    && stage
                        .depends_on
                        .iter()
                        .all(|dep| placed_names.contains(dep.as_str()))
            });

            match next {
                Some(i) => {
                    placed[i] = true;
                    placed_names.insert(stages[i].name.as_str());
                    order.push(i);
                }
                None => {
                    // Every unplaced stage is waiting on another unplaced one.
                    let stuck = stages
                        .iter()
                        .enumerate()
                        .find(|(i, _)| !placed[*i])
                        .map(|(_, s)| s.name.clone())
                        .unwrap_or_default();
                    return Err(PipelineDefinitionError::Cycle(stuck));
                }
            }
        }

        let ordered = order.into_iter().map(|i| stages[i].clone()).collect();

        Ok(Self {
            name: name.into(),
            stages: ordered,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stages in execution (topological) order.
    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    pub fn total_stages(&self) -> usize {
        self.stages.len()
    }
}

/// The production project-generation pipeline.
///
/// Eight analysis/planning stages: each later stage consumes the artifacts
/// of the stages it names. The declaration order below is already
/// topological, so this is also the execution order.
pub fn default_generation_pipeline() -> PipelineDefinition {
    let stages = vec![
        StageDefinition::new("business-case", "business-case", &[]),
        StageDefinition::new("requirements", "requirements", &["business-case"]),
        StageDefinition::new("architecture", "architecture", &["requirements"]),
        StageDefinition::new("wbs", "wbs", &["architecture"]),
        StageDefinition::new("risk", "risk", &["requirements", "architecture", "wbs"]),
        StageDefinition::new("timeline", "timeline", &["wbs"]),
        StageDefinition::new("resource", "resource", &["timeline"]),
        StageDefinition::new("quality", "quality", &["requirements"]),
    ];

    // The stage set above is a known-good DAG; a failure here is a bug in
    // this function, not a runtime condition.
    match PipelineDefinition::new("project-generation", stages) {
        Ok(pipeline) => pipeline,
        Err(e) => unreachable!("default pipeline must validate: {e}"),
    }
}
