//! The shared generation pipeline.
//!
//! Every generation tool ends here once it has validated its arguments and
//! picked a model: map uniform arguments onto the model's parameters, check
//! them against the model schema, call the transport (polling async jobs),
//! format the output, record the cost and append a summary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use genmedia_core::redact::redact_json;
use genmedia_core::{
    MediaError, ModelDescriptor, OutputType, RequestOptions, ResponseEnvelope, ResponseKind,
};
use serde_json::{Map, Value};

use crate::context::ToolContext;
use crate::formatter::{format_response, resolve_output_dir, FormatOptions};
use crate::polling::{await_job, job_id};
use crate::{ContentBlock, GenerationResult};

/// Lower bound for the per-call timeout.
pub const MIN_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// One generation request after argument validation and model selection.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    /// Selected model.
    pub model: &'a ModelDescriptor,
    /// Uniform arguments (`prompt`, `width`, `steps`, ...). Nulls are ignored.
    pub arguments: Map<String, Value>,
    /// Return images inline.
    pub inline: bool,
    /// Per-call output directory override.
    pub output_dir: Option<PathBuf>,
    /// Number of sequential units to generate.
    pub batch: usize,
}

impl<'a> GenerationRequest<'a> {
    /// Single-unit request writing to the default directory.
    #[must_use]
    pub fn new(model: &'a ModelDescriptor, arguments: Map<String, Value>) -> Self {
        Self {
            model,
            arguments,
            inline: false,
            output_dir: None,
            batch: 1,
        }
    }
}

/// Per-call timeout: three times the model's typical duration, at least
/// [`MIN_CALL_TIMEOUT`], never above the configured ceiling.
#[must_use]
pub fn call_timeout(model: &ModelDescriptor, ceiling: Duration) -> Duration {
    Duration::from_secs(model.estimated_time_seconds.saturating_mul(3))
        .max(MIN_CALL_TIMEOUT)
        .min(ceiling)
}

/// Response kind hint for a model's output type.
#[must_use]
pub fn response_kind(output: OutputType) -> ResponseKind {
    match output {
        OutputType::Image => ResponseKind::Image,
        OutputType::Video => ResponseKind::Video,
        OutputType::Audio => ResponseKind::Audio,
        OutputType::Text => ResponseKind::Json,
    }
}

/// Mapped parameters for each batch unit. With a seed, unit `i` uses
/// `seed + i`.
fn unit_parameters(request: &GenerationRequest<'_>) -> Vec<Map<String, Value>> {
    let base = request.model.map_parameters(&request.arguments);
    let seed_key = request.model.resolve_param("seed");
    let seed = base.get(seed_key).and_then(Value::as_u64);

    (0..request.batch.max(1))
        .map(|index| {
            let mut params = base.clone();
            if let (Some(seed), Ok(offset)) = (seed, u64::try_from(index)) {
                params.insert(seed_key.to_string(), Value::from(seed.saturating_add(offset)));
            }
            params
        })
        .collect()
}

/// Run a generation request end to end.
///
/// # Errors
///
/// Returns [`MediaError::InvalidInput`] when mapped parameters violate the
/// model schema (before any network call), transport errors, job failures and
/// output write failures.
pub async fn run_generation(
    ctx: &ToolContext,
    request: GenerationRequest<'_>,
) -> anyhow::Result<GenerationResult> {
    let model = request.model;
    let units = unit_parameters(&request);
    for params in &units {
        ctx.catalog.validate_parameters(&model.id, params)?;
    }

    let output_dir = resolve_output_dir(request.output_dir.as_deref(), ctx.output_dir.as_deref());
    let timeout = call_timeout(model, ctx.request_ceiling);
    let kind = response_kind(model.output_type);
    let started = Instant::now();

    let mut content = Vec::new();
    let mut credits_used = 0.0;
    let mut remaining = None;
    let mut job_ids = Vec::new();

    for (index, params) in units.into_iter().enumerate() {
        tracing::debug!(
            model = %model.id,
            unit = index,
            params = %redact_json(&serde_json::Value::Object(params.clone())),
            "dispatching generation"
        );

        let options = RequestOptions::post(Value::Object(params.clone()))
            .expect(kind)
            .timeout(timeout)
            .deadline(timeout * 3);
        let response = if model.output_type == OutputType::Image {
            ctx.transport
                .generate_image(&model.id, Value::Object(params), options)
                .await
        } else {
            ctx.transport.request(&model.endpoint, options).await
        };
        let envelope = response
            .with_context(|| format!("calling {} at {}", model.id, model.endpoint))?
            .into_result()?;

        let envelope = if model.async_job {
            complete_job(ctx, envelope, kind, &mut job_ids).await?
        } else {
            envelope
        };

        let options = FormatOptions {
            inline: request.inline,
            output_dir: output_dir.clone(),
            batch_index: (request.batch > 1).then_some(index),
        };
        content.extend(format_response(&envelope, model, &options).await?);

        let credits = envelope.credits.unwrap_or_default();
        let cost = credits.used.unwrap_or(model.credits_per_use);
        record_cost(ctx, &model.id, cost).await?;
        credits_used += cost;
        remaining = credits.remaining.or(remaining);
    }

    let processing_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    content.push(summary_block(model, credits_used, remaining, processing_time_ms));
    tracing::info!(model = %model.id, credits_used, processing_time_ms, "generation complete");

    Ok(GenerationResult {
        content,
        model_id: model.id.clone(),
        credits_used,
        processing_time_ms,
        metadata: serde_json::json!({
            "batch": request.batch.max(1),
            "job_ids": job_ids,
            "credits_remaining": remaining,
        }),
    })
}

/// Record a cost sample off the async workers, since a file-backed tracker
/// rewrites its JSON file on every sample.
async fn record_cost(ctx: &ToolContext, model_id: &str, cost: f64) -> anyhow::Result<()> {
    let costs = Arc::clone(&ctx.costs);
    let model_id = model_id.to_string();
    tokio::task::spawn_blocking(move || costs.record(&model_id, cost))
        .await
        .context("cost recording task failed")
}

/// Poll when the submission returned a job id instead of a payload.
async fn complete_job(
    ctx: &ToolContext,
    envelope: ResponseEnvelope,
    kind: ResponseKind,
    job_ids: &mut Vec<String>,
) -> anyhow::Result<ResponseEnvelope> {
    let Some(id) = job_id(&envelope) else {
        return Ok(envelope);
    };
    tracing::info!(job_id = %id, "generation queued, polling for result");
    let submitted_credits = envelope.credits;
    let mut finished = await_job(ctx.transport.as_ref(), &id, ctx.poll, kind)
        .await
        .with_context(|| format!("polling job {id}"))?
        .into_result()?;
    if finished.credits.is_none() {
        finished.credits = submitted_credits;
    }
    job_ids.push(id);
    Ok(finished)
}

fn summary_block(
    model: &ModelDescriptor,
    credits_used: f64,
    remaining: Option<f64>,
    processing_time_ms: u64,
) -> ContentBlock {
    let mut summary = format!(
        "Generated with {} ({}) | credits used: {credits_used} | processing time: {processing_time_ms} ms",
        model.name, model.id
    );
    if let Some(remaining) = remaining {
        summary.push_str(&format!(" | credits remaining: {remaining}"));
    }
    ContentBlock::text(summary)
}

/// Reject an explicit model from the wrong category.
///
/// # Errors
///
/// Returns [`MediaError::InvalidInput`] naming both categories.
pub fn ensure_category(
    model: &ModelDescriptor,
    expected: genmedia_core::ModelCategory,
    tool: &str,
) -> Result<(), MediaError> {
    if model.category == expected {
        return Ok(());
    }
    Err(MediaError::InvalidInput(format!(
        "Model {} is a {} model; {tool} needs a {expected} model",
        model.id, model.category
    )))
}
