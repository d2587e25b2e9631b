use std::fmt::Write as _;

use anyhow::{bail, Context, Result};
use textlabel_core::{open_store, Annotator, ItemStore, LabelSchema, Summary};

use crate::config::AppConfig;

pub fn stats(config: &AppConfig, json: bool) -> Result<()> {
    if !config.data.results.exists() {
        println!(
            "[textlabel] no results yet at {}",
            config.data.results.display()
        );
        return Ok(());
    }
    let annotator = Annotator::open(
        &config.item_source(),
        &config.data.labels,
        &config.data.results,
    )
    .context("failed to open annotation state")?;
    let summary = annotator.summary();
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", render_summary(&summary));
    }
    Ok(())
}

pub fn check(config: &AppConfig) -> Result<()> {
    let store = open_store(&config.item_source());
    let schema = LabelSchema::load(&config.data.labels);
    print!("{}", render_check(store.as_ref(), &schema));
    if store.is_empty() {
        bail!("nothing to label");
    }
    Ok(())
}

fn render_summary(summary: &Summary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "source: {}", summary.source);
    let _ = writeln!(out, "{}/{} annotated", summary.annotated, summary.total);
    for (label, count) in &summary.label_counts {
        let _ = writeln!(out, "  {label}: {count}");
    }
    if !summary.unreadable.is_empty() {
        let _ = writeln!(out, "{} unreadable items", summary.unreadable.len());
    }
    out
}

fn render_check(store: &dyn ItemStore, schema: &LabelSchema) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "items: {} from {}", store.count(), store.describe());
    for item in store.items().iter().filter(|item| !item.is_readable()) {
        let _ = writeln!(
            out,
            "  unreadable #{} {}: {}",
            item.ordinal,
            item.identifier,
            item.read_error.as_deref().unwrap_or("")
        );
    }
    if schema.is_empty() {
        let _ = writeln!(out, "labels: none configured");
        return out;
    }
    let _ = writeln!(out, "labels: {}", schema.len());
    for group in schema.groups() {
        let options: Vec<String> = group
            .options
            .iter()
            .map(|opt| match opt.shortcut_key() {
                Some(key) => format!("{} [{key}]", opt.value),
                None => opt.value.clone(),
            })
            .collect();
        let _ = writeln!(
            out,
            "  {} ({}): {}",
            group.name,
            group.kind.as_str(),
            options.join(", ")
        );
    }
    out
}
