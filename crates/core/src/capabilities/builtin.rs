//! Built-in analysis and planning capabilities.
//!
//! Each capability produces a structured artifact for one pipeline stage.
//! The artifacts are deliberately deterministic: real model-backed analysis
//! lives behind the same trait in a separate adapter crate, while these
//! implementations keep the orchestration core self-contained and testable.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::{AgentCapability, StageError, StageInput};

/// All production capabilities, keyed by the names the default pipeline uses.
pub fn all() -> Vec<(&'static str, Arc<dyn AgentCapability>)> {
    vec![
        ("business-case", Arc::new(BusinessCaseAnalyzer)),
        ("requirements", Arc::new(RequirementsAnalyst)),
        ("risk", Arc::new(RiskAssessor)),
        ("wbs", Arc::new(WbsSpecialist)),
        ("architecture", Arc::new(ArchitectureAdvisor)),
        ("timeline", Arc::new(TimelinePlanner)),
        ("resource", Arc::new(ResourceAllocator)),
        ("quality", Arc::new(QualityAssurancePlanner)),
    ]
}

/// Evaluates the business value of the described project.
pub struct BusinessCaseAnalyzer;

#[async_trait]
impl AgentCapability for BusinessCaseAnalyzer {
    async fn invoke(&self, input: &StageInput) -> Result<serde_json::Value, StageError> {
        Ok(json!({
            "project": input.description,
            "methodology": input.methodology.to_string(),
            "recommendations": [
                "Focus on core business value",
                "Consider market trends",
                "Evaluate ROI potential",
            ],
        }))
    }
}

/// Derives functional requirements from the description and business case.
pub struct RequirementsAnalyst;

#[async_trait]
impl AgentCapability for RequirementsAnalyst {
    async fn invoke(&self, _input: &StageInput) -> Result<serde_json::Value, StageError> {
        Ok(json!({
            "requirements": [
                "User authentication system",
                "Project management dashboard",
                "Real-time collaboration features",
            ],
        }))
    }
}

/// Surfaces delivery risks from requirements, architecture and the WBS.
pub struct RiskAssessor;

#[async_trait]
impl AgentCapability for RiskAssessor {
    async fn invoke(&self, _input: &StageInput) -> Result<serde_json::Value, StageError> {
        Ok(json!({
            "risks": [
                "Technical complexity",
                "Resource availability",
                "Timeline constraints",
            ],
        }))
    }
}

/// Breaks the work down into phases and deliverables.
pub struct WbsSpecialist;

#[async_trait]
impl AgentCapability for WbsSpecialist {
    async fn invoke(&self, _input: &StageInput) -> Result<serde_json::Value, StageError> {
        Ok(json!({
            "wbs": {
                "phases": [
                    "Initiation",
                    "Planning",
                    "Execution",
                    "Monitoring",
                    "Closure",
                ],
                "deliverables": [
                    "Project charter",
                    "Requirements document",
                    "Risk assessment",
                    "Timeline",
                ],
            },
        }))
    }
}

/// Recommends a technology stack for the requirements.
pub struct ArchitectureAdvisor;

#[async_trait]
impl AgentCapability for ArchitectureAdvisor {
    async fn invoke(&self, _input: &StageInput) -> Result<serde_json::Value, StageError> {
        Ok(json!({
            "architecture": {
                "frontend": "React with TypeScript",
                "backend": "Node.js with Express",
                "database": "SQLite",
                "deployment": "Docker containers",
            },
        }))
    }
}

/// Lays out milestones over the project duration.
pub struct TimelinePlanner;

#[async_trait]
impl AgentCapability for TimelinePlanner {
    async fn invoke(&self, _input: &StageInput) -> Result<serde_json::Value, StageError> {
        Ok(json!({
            "timeline": {
                "duration": "3 months",
                "milestones": [
                    "Requirements gathering",
                    "Architecture design",
                    "Development phase",
                    "Testing phase",
                    "Deployment",
                ],
            },
        }))
    }
}

/// Estimates staffing and cost against the timeline.
pub struct ResourceAllocator;

#[async_trait]
impl AgentCapability for ResourceAllocator {
    async fn invoke(&self, _input: &StageInput) -> Result<serde_json::Value, StageError> {
        Ok(json!({
            "resources": {
                "developers": 3,
                "designers": 1,
                "projectManagers": 1,
                "estimatedCost": 150000,
            },
        }))
    }
}

/// Plans testing levels and quality metrics.
pub struct QualityAssurancePlanner;

#[async_trait]
impl AgentCapability for QualityAssurancePlanner {
    async fn invoke(&self, _input: &StageInput) -> Result<serde_json::Value, StageError> {
        Ok(json!({
            "qaStrategy": {
                "testingLevels": [
                    "Unit Testing",
                    "Integration Testing",
                    "System Testing",
                    "User Acceptance Testing",
                ],
                "metrics": [
                    "Code coverage",
                    "Bug density",
                    "Performance benchmarks",
                ],
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pg_protocol::request_models::Methodology;

    #[tokio::test]
    async fn test_business_case_echoes_brief() {
        let input = StageInput::new("Build a CRM".to_string(), Methodology::Waterfall);
        let artifact = BusinessCaseAnalyzer.invoke(&input).await.expect("invoke");

        assert_eq!(artifact["project"], "Build a CRM");
        assert_eq!(artifact["methodology"], "waterfall");
        assert!(artifact["recommendations"].is_array());
    }

    #[tokio::test]
    async fn test_all_builtins_produce_objects() {
        let input = StageInput::new("Build a CRM".to_string(), Methodology::Agile);
        for (name, capability) in all() {
            let artifact = capability.invoke(&input).await.expect(name);
            assert!(artifact.is_object(), "{name} should produce an object");
        }
    }

    #[test]
    fn test_all_names_are_unique() {
        let mut names: Vec<&str> = all().into_iter().map(|(n, _)| n).collect();
        let before = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), before);
    }
}
