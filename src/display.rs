//! Drift display - tag diffs, attribute drift and refresh summaries

use colored::Colorize;
use reconcile::{AttributeTree, Cycle, Phase, RefreshSummary, Schema, TagDiff, Value};

/// Drift found for one declared resource.
#[derive(Debug)]
pub struct Drift {
    pub resource_type: String,
    pub identity: String,
    pub tags: TagDiff,
    /// `(declared, live)` pretty JSON when configurable attributes differ
    pub attributes: Option<(String, String)>,
    /// The remote entity does not exist yet
    pub missing: bool,
}

impl Drift {
    pub fn is_empty(&self) -> bool {
        !self.missing && self.tags.is_empty() && self.attributes.is_none()
    }
}

/// Whether `live` matches everything `declared` states.
///
/// Unset leaves and empty collections in a declaration carry no opinion:
/// requests never include them, so the remote keeps whatever it has.
pub fn satisfies(declared: &Value, live: &Value) -> bool {
    match (declared, live) {
        (Value::Unset, _) => true,
        (Value::List(items) | Value::Set(items), _) if items.is_empty() => true,
        (Value::Block(fields), Value::Block(live_fields)) => fields.iter().all(|(name, value)| {
            satisfies(value, live_fields.get(name).unwrap_or(&Value::Unset))
        }),
        (Value::List(items), Value::List(live_items)) => {
            items.len() == live_items.len()
                && items.iter().zip(live_items).all(|(d, l)| satisfies(d, l))
        }
        (Value::Set(items) | Value::List(items), Value::Set(live_items)) => {
            items.len() == live_items.len()
                && items
                    .iter()
                    .all(|d| live_items.iter().any(|l| satisfies(d, l)))
        }
        (declared, live) => declared == live,
    }
}

/// Declared attributes that state something, paired with their live values.
fn stated(
    schema: &Schema,
    declared: &AttributeTree,
    live: &AttributeTree,
) -> (AttributeTree, AttributeTree) {
    let mut wanted = AttributeTree::new();
    let mut current = AttributeTree::new();
    for (name, value) in declared.iter() {
        let configurable = schema.get(name).is_some_and(|a| !a.is_computed());
        if configurable && !satisfies(value, &Value::Unset) {
            wanted.set(name, value.clone());
            current.set(name, live.get(name).clone());
        }
    }
    (wanted, current)
}

/// Compare declared and live attribute trees; `None` when the live side
/// already matches every stated attribute.
pub fn attribute_drift(
    schema: &Schema,
    declared: &AttributeTree,
    live: &AttributeTree,
) -> Option<(String, String)> {
    let (wanted, current) = stated(schema, declared, live);
    let converged = wanted
        .iter()
        .all(|(name, value)| satisfies(value, current.get(name)));
    if converged {
        return None;
    }
    let render = |tree: &AttributeTree| serde_json::to_string_pretty(tree).unwrap_or_default();
    Some((render(&wanted), render(&current)))
}

/// Display drift for every resource in a boxed layout
pub fn display_drift(drifts: &[Drift]) {
    let changed: Vec<&Drift> = drifts.iter().filter(|d| !d.is_empty()).collect();
    if changed.is_empty() {
        println!();
        println!("  {} No drift detected", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Drift".bold()
    );
    println!("│");

    for drift in &changed {
        println!("│ {} {}", drift.resource_type.bold(), drift.identity.dimmed());
        if drift.missing {
            println!("│   {} (not created)", "+".green());
        }
        for tag in drift.tags.to_add.iter() {
            println!("│   {} tag {} = {}", "+".green(), tag.key, tag.value);
        }
        for tag in drift.tags.to_remove.iter() {
            println!("│   {} tag {} = {}", "-".red(), tag.key, tag.value.dimmed());
        }
        for tag in drift.tags.to_update.iter() {
            let propagate = if tag.propagate { " (propagate)" } else { "" };
            println!(
                "│   {} tag {} → {}{}",
                "~".yellow(),
                tag.key,
                tag.value,
                propagate.dimmed()
            );
        }
        if let Some((declared, live)) = &drift.attributes {
            show_text_diff(live, declared);
        }
        println!("│");
    }

    let tag_changes: usize = changed.iter().map(|d| d.tags.total()).sum();
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} resource(s) drifted, {} tag change(s)",
        changed.len().to_string().bold(),
        tag_changes.to_string().yellow()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

/// Line diff from `live` to `declared`
fn show_text_diff(live: &str, declared: &str) {
    let diff = similar::TextDiff::from_lines(live, declared);
    for change in diff.iter_all_changes() {
        match change.tag() {
            similar::ChangeTag::Delete => {
                print!("│     {}", format!("- {change}").red());
            }
            similar::ChangeTag::Insert => {
                print!("│     {}", format!("+ {change}").green());
            }
            similar::ChangeTag::Equal => {}
        }
    }
}

/// Print failed cycles and the final counts of a refresh
pub fn display_summary(cycles: &[Cycle], summary: &RefreshSummary) {
    let failed: Vec<&Cycle> = cycles.iter().filter(|c| c.phase() == Phase::Failed).collect();
    if !failed.is_empty() {
        println!();
        println!("{}", "Failures:".red().bold());
        for cycle in failed {
            if let Some(err) = cycle.error() {
                println!("  {} {}", crate::ui::phase_marker(Phase::Failed), err);
                log::debug!("{}: phases {:?}", cycle.identity, cycle.phases);
            }
        }
    }

    println!();
    println!(
        "  {} committed, {} gone, {} failed",
        summary.committed.to_string().green(),
        summary.not_found.to_string().yellow(),
        if summary.failed > 0 {
            summary.failed.to_string().red()
        } else {
            summary.failed.to_string().normal()
        }
    );
}
