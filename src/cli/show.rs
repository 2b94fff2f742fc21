use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use serde::Serialize;
use serde_json::Value;

use crate::accession::GeneratorSettings;
use crate::cli::{open_store, parse_accession, parse_category, OutputFormat};
use crate::clustering::{ClusteringEngine, KeyDeriver};
use crate::core::event::OperationEvent;
use crate::core::types::Category;
use crate::store::{Filter, RecordStore};

#[derive(Args)]
pub struct ShowArgs {
    /// Store snapshot file
    #[arg(long, required = true)]
    pub store: PathBuf,

    /// Record category (ss or rs)
    #[arg(long, required = true, value_parser = parse_category)]
    pub category: Category,

    /// Accession to show (e.g., "rs3000000000" or "3000000000")
    #[arg(required = true, value_parser = parse_accession)]
    pub accession: u64,
}

#[derive(Serialize)]
struct RecordView {
    category: Category,
    accession: u64,
    record: Value,
    /// Cluster that absorbed a merged clustered variant
    #[serde(skip_serializing_if = "Option::is_none")]
    resolves_to: Option<u64>,
    /// Submitted variants pointing at a clustered variant
    #[serde(skip_serializing_if = "Vec::is_empty")]
    members: Vec<u64>,
    events: Vec<OperationEvent>,
}

/// Print one record with its event history
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the accession is unknown.
pub fn run(args: ShowArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let store = open_store(&args.store)?;
    let engine = ClusteringEngine::new(
        store.clone(),
        GeneratorSettings::new("show", "show"),
        Arc::new(KeyDeriver::new()),
    );

    let (record, resolves_to, members) = match args.category {
        Category::Ss => {
            let submitted = engine.submitted_by_accession(args.accession)?;
            (serde_json::to_value(&submitted)?, None, Vec::new())
        }
        Category::Rs => {
            let cluster = engine.get_cluster(args.accession)?;
            let resolves_to = engine
                .resolve(args.accession)?
                .map(|c| c.accession)
                .filter(|&target| target != args.accession);
            let members = engine
                .members(args.accession)?
                .into_iter()
                .map(|ss| ss.accession)
                .collect();
            (serde_json::to_value(&cluster)?, resolves_to, members)
        }
    };

    let mut events: Vec<OperationEvent> = store.find(
        &Filter::new()
            .eq("accession", args.accession)
            .eq("category", args.category),
    )?;
    events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    let view = RecordView {
        category: args.category,
        accession: args.accession,
        record,
        resolves_to,
        members,
        events,
    };

    match format {
        OutputFormat::Text => print_text_view(&view, verbose),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view)?),
        OutputFormat::Tsv => {
            println!("created_at\tevent_type\treason");
            for event in &view.events {
                println!(
                    "{}\t{}\t{}",
                    event.created_at.to_rfc3339(),
                    event.kind.name(),
                    event.reason.as_deref().unwrap_or("")
                );
            }
        }
    }
    Ok(())
}

fn print_text_view(view: &RecordView, verbose: bool) {
    println!("{}{}", view.category, view.accession);
    if let Value::Object(fields) = &view.record {
        for (name, value) in fields {
            if value.is_null() {
                continue;
            }
            match value {
                Value::String(s) => println!("  {name}: {s}"),
                other => println!("  {name}: {other}"),
            }
        }
    }
    if let Some(target) = view.resolves_to {
        println!("  resolves to: rs{target}");
    }
    if !view.members.is_empty() {
        let members: Vec<String> = view.members.iter().map(|ss| format!("ss{ss}")).collect();
        println!("  members: {}", members.join(", "));
    }

    println!();
    println!("History ({} event(s)):", view.events.len());
    for event in &view.events {
        match &event.reason {
            Some(reason) => println!(
                "  {} {} ({})",
                event.created_at.format("%Y-%m-%d %H:%M:%S"),
                event.kind.name(),
                reason
            ),
            None => println!(
                "  {} {}",
                event.created_at.format("%Y-%m-%d %H:%M:%S"),
                event.kind.name()
            ),
        }
        if verbose {
            if let Some(snapshot) = &event.snapshot {
                println!("    before: {snapshot}");
            }
        }
    }
}
