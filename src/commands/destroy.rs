use anyhow::{Context as AnyhowContext, Result, bail};
use reconcile::{CompositeIdentity, IdentityCodec, ResourceReconciler};

use crate::Context;
use crate::cli::SnapshotArgs;
use crate::commands::{confirm, load_config, open_remote};
use crate::config::CloudrecConfig;
use crate::paths;
use crate::resource::{Descriptor, Registry};
use crate::state::StateFile;
use crate::ui;

/// Delete one remote entity and drop its record
pub fn run(ctx: &Context, identity: &str, args: SnapshotArgs, yes: bool) -> Result<()> {
    let (config, policy) = load_config(ctx)?;
    let registry = Registry::builtin();
    let state_path = ctx.state_file()?;
    let mut state = StateFile::load(&state_path)?;

    let kind = find_kind(&config, &registry, &state, identity)?;

    ui::header(&format!("Destroy {}", kind.name()));
    ui::kv("Identity", identity);
    if !yes && !confirm("Delete this resource?")? {
        ui::warn("Aborted");
        return Ok(());
    }

    let remote = open_remote(&config, &registry, &args.snapshot)?;
    let reconciler = ResourceReconciler::new(&remote, &policy);
    let cycle = reconciler.delete(
        kind,
        &CompositeIdentity::from_raw(identity),
        &reconcile::CancelToken::new(),
    );

    if let Some(err) = cycle.error() {
        bail!("Failed to delete {identity}: {err}");
    }

    if remote.inner().is_modified() {
        remote
            .inner()
            .save(&paths::expand(&args.snapshot.to_string_lossy()))?;
    }
    state.apply_outcome(&cycle.outcome);
    state
        .touch(&state_path)
        .with_context(|| format!("Failed to save state to {}", state_path.display()))?;

    ui::success(&format!("Deleted {identity}"));
    Ok(())
}

/// Resource type of an identity, from its state record or its declaration.
fn find_kind<'r>(
    config: &CloudrecConfig,
    registry: &'r Registry,
    state: &StateFile,
    identity: &str,
) -> Result<&'r dyn Descriptor> {
    if let Some(record) = state.get(identity) {
        return registry
            .get(&record.resource_type)
            .with_context(|| format!("Unknown resource type in state: {}", record.resource_type));
    }

    let declared = config.resolve(registry, &IdentityCodec::default())?;
    match declared.into_iter().find(|d| d.identity.as_str() == identity) {
        Some(d) => Ok(d.kind),
        None => bail!("No record or declaration for '{identity}'"),
    }
}
