//! Structural validation
//!
//! Checks that a definition is well-formed before anything looks at
//! dependencies. Fails fast on the first violation.

use std::collections::HashSet;

use crate::domain::definition::{JobDefinition, MAX_PIPELINE_NAME_LEN, PipelineDefinition};
use crate::validation::error::ValidationError;

pub type Result<T> = std::result::Result<T, ValidationError>;

pub fn validate_structure(pipeline: &PipelineDefinition) -> Result<()> {
    validate_pipeline_name(&pipeline.name)?;

    if pipeline.stages.is_empty() {
        return Err(ValidationError::structural(
            "pipeline.stages",
            "pipeline must declare at least one stage",
        ));
    }

    let mut stage_names = HashSet::new();
    for (stage_idx, stage) in pipeline.stages.iter().enumerate() {
        let stage_path = format!("pipeline.stages[{}]", stage_idx);

        if stage.name.trim().is_empty() {
            return Err(ValidationError::structural(
                format!("{}.name", stage_path),
                "stage name is required",
            ));
        }

        if !stage_names.insert(stage.name.as_str()) {
            return Err(ValidationError::structural(
                format!("{}.name", stage_path),
                format!("duplicate stage name '{}'", stage.name),
            ));
        }

        if stage.jobs.is_empty() {
            return Err(ValidationError::structural(
                format!("{}.jobs", stage_path),
                format!("stage '{}' must contain at least one job", stage.name),
            ));
        }

        let mut job_names = HashSet::new();
        for (job_idx, job) in stage.jobs.iter().enumerate() {
            let job_path = format!("{}.jobs[{}]", stage_path, job_idx);
            validate_job(&job_path, job)?;

            if !job_names.insert(job.name.as_str()) {
                return Err(ValidationError::structural(
                    format!("{}.name", job_path),
                    format!("duplicate job name '{}' in stage '{}'", job.name, stage.name),
                ));
            }
        }
    }

    Ok(())
}

// ===== Validation =====

fn validate_pipeline_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ValidationError::structural(
            "pipeline.name",
            "pipeline name is required",
        ));
    }

    if name.chars().count() > MAX_PIPELINE_NAME_LEN {
        return Err(ValidationError::structural(
            "pipeline.name",
            format!(
                "pipeline name cannot exceed {} characters",
                MAX_PIPELINE_NAME_LEN
            ),
        ));
    }

    Ok(())
}

fn validate_job(job_path: &str, job: &JobDefinition) -> Result<()> {
    if job.name.trim().is_empty() {
        return Err(ValidationError::structural(
            format!("{}.name", job_path),
            "job name is required",
        ));
    }

    if job.image.trim().is_empty() {
        return Err(ValidationError::structural(
            format!("{}.image", job_path),
            format!("job '{}' must specify an image", job.name),
        ));
    }

    if !job.has_script() {
        return Err(ValidationError::structural(
            format!("{}.script", job_path),
            format!("job '{}' must have a non-empty script", job.name),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::definition::StageDefinition;

    fn job(name: &str) -> JobDefinition {
        JobDefinition {
            name: name.to_string(),
            image: "alpine".to_string(),
            script: vec!["echo ok".to_string()],
            dependencies: vec![],
            allow_failure: false,
        }
    }

    fn pipeline(stages: Vec<StageDefinition>) -> PipelineDefinition {
        PipelineDefinition {
            name: "demo".to_string(),
            stages,
        }
    }

    fn stage(name: &str, jobs: Vec<JobDefinition>) -> StageDefinition {
        StageDefinition {
            name: name.to_string(),
            jobs,
        }
    }

    #[test]
    fn test_valid_pipeline_passes() {
        let p = pipeline(vec![
            stage("build", vec![job("compile")]),
            stage("test", vec![job("compile"), job("unit")]),
        ]);
        assert!(validate_structure(&p).is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut p = pipeline(vec![stage("build", vec![job("compile")])]);
        p.name = "   ".to_string();
        let err = validate_structure(&p).unwrap_err();
        assert_eq!(err.path, "pipeline.name");
    }

    #[test]
    fn test_long_name_rejected() {
        let mut p = pipeline(vec![stage("build", vec![job("compile")])]);
        p.name = "a".repeat(MAX_PIPELINE_NAME_LEN + 1);
        assert!(validate_structure(&p).is_err());

        p.name = "a".repeat(MAX_PIPELINE_NAME_LEN);
        assert!(validate_structure(&p).is_ok());
    }

    #[test]
    fn test_name_limit_counts_characters() {
        let mut p = pipeline(vec![stage("build", vec![job("compile")])]);
        p.name = "é".repeat(MAX_PIPELINE_NAME_LEN);
        assert!(validate_structure(&p).is_ok());

        p.name.push('é');
        assert!(validate_structure(&p).is_err());
    }

    #[test]
    fn test_no_stages_rejected() {
        let err = validate_structure(&pipeline(vec![])).unwrap_err();
        assert_eq!(err.path, "pipeline.stages");
    }

    #[test]
    fn test_stage_without_jobs_rejected() {
        let p = pipeline(vec![stage("build", vec![job("a")]), stage("empty", vec![])]);
        let err = validate_structure(&p).unwrap_err();
        assert_eq!(err.path, "pipeline.stages[1].jobs");
        assert!(err.message.contains("empty"));
    }

    #[test]
    fn test_duplicate_stage_name_rejected() {
        let p = pipeline(vec![stage("build", vec![job("a")]), stage("build", vec![job("b")])]);
        let err = validate_structure(&p).unwrap_err();
        assert_eq!(err.path, "pipeline.stages[1].name");
    }

    #[test]
    fn test_missing_image_reports_job_path() {
        let mut bad = job("unit");
        bad.image = String::new();
        let p = pipeline(vec![stage("build", vec![job("a")]), stage("test", vec![job("b"), bad])]);
        let err = validate_structure(&p).unwrap_err();
        assert_eq!(err.path, "pipeline.stages[1].jobs[1].image");
    }

    #[test]
    fn test_blank_script_rejected() {
        let mut bad = job("unit");
        bad.script = vec!["  ".to_string()];
        let p = pipeline(vec![stage("test", vec![bad])]);
        let err = validate_structure(&p).unwrap_err();
        assert_eq!(err.path, "pipeline.stages[0].jobs[0].script");
    }

    #[test]
    fn test_duplicate_job_in_stage_rejected() {
        let p = pipeline(vec![stage("build", vec![job("a"), job("a")])]);
        let err = validate_structure(&p).unwrap_err();
        assert_eq!(err.path, "pipeline.stages[0].jobs[1].name");
        assert!(err.message.contains("duplicate job name"));
    }

    #[test]
    fn test_fails_fast_on_first_violation() {
        let mut bad = job("");
        bad.image = String::new();
        let p = pipeline(vec![stage("", vec![bad])]);
        let err = validate_structure(&p).unwrap_err();
        assert_eq!(err.path, "pipeline.stages[0].name");
    }
}
