//! CLI command implementations. Each prints human-readable output to stdout.

use anyhow::{Context, Result};
use std::path::Path;

use policy_check_core::analyzer::AnalysisRequest;
use policy_check_core::models::{
    ComplianceCheckRecord, LogQuery, NewPolicyDocument, PolicyCategory, RiskLevel,
};
use policy_check_core::store::{ComplianceLog, PolicyStore};

use crate::app::App;

pub struct UploadArgs<'a> {
    pub file: &'a Path,
    pub title: &'a str,
    pub category: &'a str,
    pub department: Option<String>,
    pub version: Option<String>,
}

pub async fn run_upload(app: &App, args: UploadArgs<'_>) -> Result<()> {
    let category: PolicyCategory = args.category.parse()?;
    let bytes = tokio::fs::read(args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let filename = args
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let doc = app
        .ingestor
        .register_document(
            &NewPolicyDocument {
                title: args.title.to_string(),
                category,
                department: args.department,
                version: args.version,
            },
            &filename,
            &bytes,
        )
        .await?;
    println!("registered {} ({})", doc.id, doc.file_path);

    let report = app.ingestor.ingest(&doc.id).await?;
    println!(
        "ingested {}: {} chunks, {} vectors",
        report.document_id, report.chunks, report.vectors
    );
    Ok(())
}

pub async fn run_policies(app: &App) -> Result<()> {
    let docs = app.store.list_documents().await?;
    if docs.is_empty() {
        println!("No policy documents.");
        return Ok(());
    }
    for doc in docs {
        println!(
            "{}  {:<24} {:<22} dept={:<12} v={:<6} {}",
            doc.id,
            doc.title,
            doc.category,
            doc.department.as_deref().unwrap_or("-"),
            doc.version.as_deref().unwrap_or("-"),
            doc.created_at.format("%Y-%m-%d %H:%M"),
        );
    }
    Ok(())
}

pub async fn run_ingest(app: &App, id: &str) -> Result<()> {
    let report = app.ingestor.ingest(id).await?;
    println!(
        "ingested {}: {} chunks, {} vectors",
        report.document_id, report.chunks, report.vectors
    );
    Ok(())
}

pub async fn run_delete(app: &App, id: &str) -> Result<()> {
    app.ingestor.delete_document(id).await?;
    println!("deleted {}", id);
    Ok(())
}

pub async fn run_check(
    app: &App,
    text: &str,
    department: Option<String>,
    category: Option<String>,
    top_k: Option<usize>,
) -> Result<()> {
    let mut request = AnalysisRequest::new(text)
        .top_k(top_k.unwrap_or(app.config.retrieval.default_top_k));
    if let Some(department) = department {
        request = request.department(department);
    }
    if let Some(category) = category {
        request = request.category(category.parse()?);
    }

    let outcome = app.analyzer.analyze(request).await?;
    let verdict = &outcome.verdict;

    println!("risk:     {}", verdict.overall_risk);
    println!("record:   {}", outcome.record_id);
    println!("matched:  {} chunks", outcome.matched_chunks);
    for (i, issue) in verdict.issues.iter().enumerate() {
        println!();
        println!("{}. {}", i + 1, issue.issue_type);
        if let Some(reference) = &issue.policy_reference {
            println!("   policy:  {}", reference);
        }
        if let Some(excerpt) = &issue.excerpt {
            println!("   excerpt: {}", excerpt);
        }
        println!("   why:     {}", issue.explanation);
    }
    if let Some(suggested) = &verdict.suggested_text {
        println!();
        println!("suggested:");
        println!("{}", suggested);
    }
    Ok(())
}

pub async fn run_logs(
    app: &App,
    department: Option<String>,
    risk: Option<String>,
    limit: Option<usize>,
) -> Result<()> {
    let risk = risk.map(|r| r.parse::<RiskLevel>()).transpose()?;
    let query = LogQuery {
        department,
        risk,
        limit: limit.unwrap_or(app.config.logs.max_limit),
    };
    let records = app.store.list(&query).await?;
    if records.is_empty() {
        println!("No compliance checks.");
        return Ok(());
    }
    for record in records {
        println!(
            "{}  {}  {:<6} dept={:<12} {}",
            record.id,
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.overall_risk,
            record.department.as_deref().unwrap_or("-"),
            preview(&record.input_text, 60),
        );
    }
    Ok(())
}

pub async fn run_log(app: &App, id: &str) -> Result<()> {
    let record = app
        .store
        .get(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("compliance check not found: {}", id))?;
    print_record(&record)
}

fn print_record(record: &ComplianceCheckRecord) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(record)?);
    Ok(())
}

/// First `max` characters of `text` on one line.
fn preview(text: &str, max: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max).collect();
        format!("{}…", cut)
    }
}
