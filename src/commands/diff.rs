use anyhow::{Result, bail};
use reconcile::{
    CancelToken, IdentityCodec, IgnorePolicy, Outcome, ResourceReconciler, TagSet, tags,
};

use crate::Context;
use crate::cli::SnapshotArgs;
use crate::commands::{Remote, load_config, open_remote};
use crate::config::Declared;
use crate::display::{self, Drift};
use crate::resource::Registry;
use crate::ui;

/// Show drift without writing anything
pub fn run(ctx: &Context, args: SnapshotArgs) -> Result<()> {
    let (config, policy) = load_config(ctx)?;
    let registry = Registry::builtin();
    let declared = config.resolve(&registry, &IdentityCodec::default())?;

    if declared.is_empty() {
        ui::info("No resources configured");
        return Ok(());
    }

    let remote = open_remote(&config, &registry, &args.snapshot)?;
    let cancel = CancelToken::new();
    let mut failed = 0;
    let mut drifts = Vec::with_capacity(declared.len());
    for item in &declared {
        match detect(&remote, &policy, item, &cancel) {
            Ok(drift) => drifts.push(drift),
            Err(e) => {
                failed += 1;
                ui::error(&format!("{}: {e}", item.identity));
            }
        }
    }

    display::display_drift(&drifts);

    if failed > 0 {
        bail!("{failed} resource(s) could not be read");
    }
    Ok(())
}

/// Read one resource and compare it with its declaration.
pub fn detect(
    remote: &Remote,
    policy: &IgnorePolicy,
    item: &Declared<'_>,
    cancel: &CancelToken,
) -> reconcile::Result<Drift> {
    let reconciler = ResourceReconciler::new(remote, policy);
    let cycle = reconciler.reconcile(item.kind, &item.identity, &item.tags, cancel);
    let mut drift = Drift {
        resource_type: item.kind.name().to_string(),
        identity: item.identity.to_string(),
        tags: Default::default(),
        attributes: None,
        missing: false,
    };
    match cycle.outcome {
        Outcome::Committed(record) => {
            if item.kind.supports_tags() {
                drift.tags = tags::diff(&item.tags, &record.tags, policy);
            }
            drift.attributes =
                display::attribute_drift(&item.kind.schema(), &item.tree, &record.attributes);
        }
        Outcome::NotFound { .. } => {
            drift.missing = true;
            if item.kind.supports_tags() {
                drift.tags = tags::diff(&item.tags, &TagSet::new(), policy);
            }
        }
        Outcome::Failed(e) => return Err(e),
    }
    Ok(drift)
}
