//! `quotecmp history`: browse and manage saved completions.

use anyhow::Result;

use crate::config::Config;
use crate::models::CompletionRecord;
use crate::naming;
use crate::store::CompletionStore;

/// One line of the history listing.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub filename: String,
    pub label: String,
    pub model: Option<String>,
    pub data_files: (String, String),
}

/// Saved records, newest first, with their display labels.
pub fn entries(store: &CompletionStore) -> Vec<HistoryEntry> {
    store
        .list_newest_first()
        .into_iter()
        .map(|(filename, record)| HistoryEntry {
            label: naming::friendly_name(&filename),
            filename,
            model: record.model,
            data_files: (record.data_file1, record.data_file2),
        })
        .collect()
}

fn store(config: &Config) -> CompletionStore {
    CompletionStore::new(&config.paths.completions)
}

pub fn run_list(config: &Config) -> Result<()> {
    let entries = entries(&store(config));
    if entries.is_empty() {
        println!("No saved completions.");
        return Ok(());
    }

    println!("Saved completions ({}):", entries.len());
    for entry in entries {
        println!("  {}", entry.label);
        println!(
            "      file: {}  model: {}",
            entry.filename,
            entry.model.as_deref().unwrap_or("-")
        );
        println!("      quotes: {} vs {}", entry.data_files.0, entry.data_files.1);
    }
    Ok(())
}

pub fn run_show(config: &Config, filename: &str) -> Result<()> {
    let record = store(config).load(filename)?;
    print_record(filename, &record);
    Ok(())
}

fn print_record(filename: &str, record: &CompletionRecord) {
    println!("--- Completion ---");
    println!("name:         {}", naming::friendly_name(filename));
    println!("file:         {}", filename);
    println!(
        "saved:        {}",
        record
            .timestamp
            .as_deref()
            .map(naming::format_timestamp)
            .unwrap_or_else(|| "(unknown)".to_string())
    );
    println!("model:        {}", record.model.as_deref().unwrap_or("(unknown)"));
    println!("quote 1:      {}", record.data_file1);
    println!("quote 2:      {}", record.data_file2);
    println!("temperature:  {}", record.temperature);
    println!("max_tokens:   {}", record.max_tokens);
    println!();

    println!("--- System message ---");
    println!("{}", record.system_message);
    println!();

    println!("--- User prompt ---");
    println!("{}", record.user_prompt);
    println!();

    println!("--- Completion ---");
    println!("{}", record.completion);
}

pub fn run_rename(config: &Config, filename: &str, new_name: &str) -> Result<()> {
    let message = store(config).rename(filename, new_name)?;
    println!("{}", message);
    Ok(())
}

pub fn run_delete(config: &Config, filename: &str) -> Result<()> {
    let message = store(config).delete(filename)?;
    println!("{}", message);
    Ok(())
}
