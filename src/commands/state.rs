use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;

use crate::Context;
use crate::cli::StateCommand;
use crate::commands::confirm;
use crate::state::StateFile;
use crate::ui;

pub fn run(ctx: &Context, cmd: StateCommand) -> Result<()> {
    let path = ctx.state_file()?;
    let mut state = StateFile::load(&path)?;

    match cmd {
        StateCommand::List => {
            if state.is_empty() {
                ui::info("No records");
                return Ok(());
            }
            ui::header(&format!("{} record(s)", state.len()));
            for record in state.iter() {
                println!(
                    "  {:<44} {:<40} {}",
                    ui::truncate_middle(record.identity.as_str(), 44),
                    record.resource_type.dimmed(),
                    record.digest().short().dimmed()
                );
            }
            if ctx.verbose > 0 {
                println!();
                ui::dim(&format!(
                    "Last updated {}",
                    state.last_updated.format("%Y-%m-%d %H:%M:%S UTC")
                ));
            }
        }
        StateCommand::Show { identity } => {
            let Some(record) = state.get(&identity) else {
                bail!("No record for '{identity}'");
            };
            ui::header(record.identity.as_str());
            ui::kv("Type", &record.resource_type);
            ui::kv("Digest", &record.digest().to_hex());

            println!();
            println!("{}", "Attributes".bold());
            let attributes = serde_json::to_string_pretty(&record.attributes)
                .context("Failed to render attributes")?;
            for line in attributes.lines() {
                println!("  {line}");
            }

            println!();
            println!("{}", "Tags".bold());
            if record.tags.is_empty() {
                ui::dim("(none)");
            }
            for tag in record.tags.iter() {
                let propagate = if tag.propagate { " (propagate)" } else { "" };
                println!("  {} = {}{}", tag.key, tag.value, propagate.dimmed());
            }
        }
        StateCommand::Rm { identity, yes } => {
            if state.get(&identity).is_none() {
                bail!("No record for '{identity}'");
            }
            if !yes && !confirm(&format!("Forget '{identity}'?"))? {
                ui::warn("Aborted");
                return Ok(());
            }
            state.remove(&identity);
            state.touch(&path)?;
            ui::success(&format!("Removed '{identity}' from state"));
        }
    }
    Ok(())
}
