//! Human-readable rendering of a finished run.

use std::io;

use super::OutputManager;
use crate::pipeline::PipelineReport;

/// Prints the report sections to `out`.
pub fn print_report(out: &OutputManager, report: &PipelineReport) -> io::Result<()> {
    if !report.artifacts.is_empty() || !report.build_failures.is_empty() {
        out.section("Artifacts")?;
        for artifact in &report.artifacts {
            let cached = if report.cached.contains(&artifact.kind) { " (cached)" } else { "" };
            let signed = if artifact.is_signed { "signed" } else { "unsigned" };
            out.success(&format!(
                "{} {} [{}, {} bytes]{}",
                artifact.kind,
                artifact.path.display(),
                signed,
                artifact.size_bytes,
                cached
            ))?;
        }
        for failure in &report.build_failures {
            out.error(&format!("{} failed to build: {}", failure.kind, failure.message))?;
        }
        for metadata in &report.metadata {
            out.indent(&format!(
                "{} {} ({})",
                metadata.package_id,
                metadata.version_name.as_deref().unwrap_or("?"),
                metadata.version_code.as_deref().unwrap_or("?")
            ))?;
        }
        for warning in &report.signing_warnings {
            out.warn(warning)?;
        }
    }

    out.section("Deployments")?;
    for result in &report.deployments {
        if result.success {
            out.success(&format!("{}: {}", result.destination, result.message))?;
            if let Some(id) = &result.build_id {
                out.indent(&format!("build id: {id}"))?;
            }
            if let Some(url) = &result.build_url {
                out.indent(url)?;
            }
        } else {
            out.error(&format!("{}: {}", result.destination, result.message))?;
            if let Some(error) = &result.error {
                out.indent(error)?;
            }
        }
        out.verbose(&format!("took {} ms", result.duration_ms))?;
    }

    let succeeded = report.deployments.iter().filter(|r| r.success).count();
    let summary = format!("{}/{} destinations succeeded", succeeded, report.deployments.len());
    if report.all_succeeded() {
        out.success(&summary)
    } else {
        out.warn(&summary)
    }
}
