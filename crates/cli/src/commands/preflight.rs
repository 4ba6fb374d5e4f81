//! `dialectic preflight`: Validate a fixture job and print its budget plan.

use std::path::Path;

use dialectic_config::WorkerConfig;
use dialectic_worker::{EngineSettings, JobExecutor};

use crate::fixture::Fixture;

pub async fn run(config: &WorkerConfig, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let fixture = Fixture::load(path)?;
    let backends = fixture.backends().await;
    let executor = JobExecutor::new(backends.deps(config), EngineSettings::from(config));

    match executor
        .preflight(&fixture.job, fixture.prompt.clone(), &fixture.model)
        .await
    {
        Ok(plan) => {
            println!("{}", serde_json::to_string_pretty(&plan)?);
            Ok(())
        }
        Err(e) => {
            tracing::error!(code = e.code(), category = ?e.category(), "Preflight rejected job");
            Err(e.into())
        }
    }
}
