use anyhow::{Context as AnyhowContext, Result, bail};
use reconcile::{IdentityCodec, ResourceReconciler, Target, refresh_all};

use crate::Context;
use crate::cli::RefreshArgs;
use crate::commands::{cancel_token, load_config, open_remote};
use crate::display;
use crate::progress::RefreshProgress;
use crate::resource::Registry;
use crate::state::StateFile;
use crate::ui;

/// Re-read every configured resource and publish the results to the state file
pub fn run(ctx: &Context, args: RefreshArgs) -> Result<()> {
    let (config, policy) = load_config(ctx)?;
    let registry = Registry::builtin();
    let declared = config.resolve(&registry, &IdentityCodec::default())?;

    if declared.is_empty() {
        ui::info("No resources configured");
        return Ok(());
    }

    if !ctx.quiet {
        ui::header(&format!("Refreshing {} resource(s)", declared.len()));
    }

    let remote = open_remote(&config, &registry, &args.remote.snapshot)?;
    let reconciler = ResourceReconciler::new(&remote, &policy);
    let targets: Vec<Target<'_>> = declared
        .iter()
        .map(|d| Target {
            kind: d.kind,
            identity: d.identity.clone(),
            local_tags: d.tags.clone(),
        })
        .collect();

    let cancel = cancel_token(args.timeout);
    let mut progress = RefreshProgress::new(ctx.quiet, ctx.verbose > 0);
    let refresh = refresh_all(&reconciler, &targets, args.jobs, &mut progress, &cancel);

    let state_path = ctx.state_file()?;
    let mut state = StateFile::load(&state_path)?;
    let changed = refresh
        .cycles
        .iter()
        .filter(|cycle| state.apply_outcome(&cycle.outcome))
        .count();
    state
        .touch(&state_path)
        .with_context(|| format!("Failed to save state to {}", state_path.display()))?;
    log::info!("{changed} record(s) changed");

    if !ctx.quiet {
        display::display_summary(&refresh.cycles, &refresh.summary);
    }

    if refresh.summary.has_failures() {
        bail!("{} resource(s) failed to refresh", refresh.summary.failed);
    }
    Ok(())
}
