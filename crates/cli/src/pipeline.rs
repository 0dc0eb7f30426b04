use crate::config::{PipelineConfig, StepConfig};
use anyhow::anyhow;
use std::time::Duration;
use waterfall_core::{future_step, step, waterfall_async, Outcome, Step};

pub type Values = Vec<i64>;

/// Turn the configured steps into runnable ones
pub fn build_steps(config: &PipelineConfig) -> Vec<Step<Values, anyhow::Error>> {
    config.steps.iter().cloned().map(build_step).collect()
}

fn build_step(config: StepConfig) -> Step<Values, anyhow::Error> {
    match config {
        StepConfig::Emit { values } => step(move |_, done| {
            done.succeed(values);
            None
        }),
        StepConfig::Sum => step(|values: Values, done| {
            let sum = values
                .iter()
                .try_fold(0i64, |acc, v| acc.checked_add(*v))
                .map(|sum| vec![sum])
                .ok_or_else(|| anyhow!("sum of {:?} overflows i64", values));
            done.complete(sum);
            None
        }),
        StepConfig::Scale { factor } => step(move |values: Values, done| {
            let scaled = values
                .iter()
                .map(|v| v.checked_mul(factor))
                .collect::<Option<Values>>()
                .ok_or_else(|| anyhow!("scaling {:?} by {} overflows i64", values, factor));
            done.complete(scaled);
            None
        }),
        StepConfig::Delay { ms } => future_step(move |values| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(values)
        }),
        StepConfig::Fail { message } => step(move |_, done| {
            done.fail(anyhow!(message));
            None
        }),
    }
}

/// Run the pipeline, terminating it once `cancel_after` has elapsed.
pub async fn run_pipeline(
    config: &PipelineConfig,
    cancel_after: Option<Duration>,
) -> Outcome<Values, anyhow::Error> {
    let (terminator, mut outcome) = waterfall_async(build_steps(config));

    tracing::info!(
        "Running pipeline {}: run_id={}, steps={}",
        config.name,
        terminator.run_id(),
        config.steps.len()
    );

    let Some(deadline) = cancel_after else {
        return outcome.await;
    };

    tokio::select! {
        result = &mut outcome => result,
        _ = tokio::time::sleep(deadline) => {
            if terminator.terminate() {
                tracing::warn!("Pipeline {} terminated after {:?}", config.name, deadline);
            }
            outcome.await
        }
    }
}
