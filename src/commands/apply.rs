use anyhow::{Context as AnyhowContext, Result, bail};
use reconcile::{
    CancelToken, Cycle, IdentityCodec, IgnorePolicy, Phase, RefreshSummary, ResourceReconciler,
};

use crate::Context;
use crate::cli::ApplyArgs;
use crate::commands::{Remote, cancel_token, confirm, diff, load_config, open_remote};
use crate::config::Declared;
use crate::display::{self, Drift};
use crate::paths;
use crate::resource::Registry;
use crate::state::StateFile;
use crate::ui;

/// What apply will do for one declaration
enum Action<'d, 'r> {
    Create(&'d Declared<'r>),
    Update(&'d Declared<'r>),
}

/// Create missing resources and push drift on existing ones
pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let (config, policy) = load_config(ctx)?;
    let registry = Registry::builtin();
    let declared = config.resolve(&registry, &IdentityCodec::default())?;

    if declared.is_empty() {
        ui::info("No resources configured");
        return Ok(());
    }

    let remote = open_remote(&config, &registry, &args.remote.snapshot)?;
    let cancel = cancel_token(args.timeout);

    let (drifts, actions, unreadable) = plan(&remote, &policy, &declared, &cancel);
    display::display_drift(&drifts);

    if unreadable > 0 {
        bail!("{unreadable} resource(s) could not be read; nothing applied");
    }
    if actions.is_empty() {
        return Ok(());
    }
    if args.dry_run {
        println!();
        ui::info("Dry run - no changes applied");
        return Ok(());
    }
    if !args.yes && !confirm("Apply these changes?")? {
        ui::warn("Aborted");
        return Ok(());
    }

    let cycles = execute(&remote, &policy, &actions, &cancel, ctx.quiet);

    // Persist both sides
    let snapshot = paths::expand(&args.remote.snapshot.to_string_lossy());
    if remote.inner().is_modified() {
        remote.inner().save(&snapshot)?;
    }

    let state_path = ctx.state_file()?;
    let mut state = StateFile::load(&state_path)?;
    let mut summary = RefreshSummary::default();
    for cycle in &cycles {
        state.apply_outcome(&cycle.outcome);
        summary.add(cycle);
    }
    state
        .touch(&state_path)
        .with_context(|| format!("Failed to save state to {}", state_path.display()))?;

    if !ctx.quiet {
        display::display_summary(&cycles, &summary);
    }
    if summary.has_failures() {
        bail!("{} change(s) failed", summary.failed);
    }
    Ok(())
}

/// Detect drift for every declaration and decide what apply will do.
/// The count is of declarations that could not be read.
fn plan<'d, 'r>(
    remote: &Remote,
    policy: &IgnorePolicy,
    declared: &'d [Declared<'r>],
    cancel: &CancelToken,
) -> (Vec<Drift>, Vec<Action<'d, 'r>>, usize) {
    let mut drifts: Vec<Drift> = Vec::new();
    let mut actions: Vec<Action<'d, 'r>> = Vec::new();
    let mut unreadable = 0;
    for item in declared {
        match diff::detect(remote, policy, item, cancel) {
            Ok(drift) => {
                if drift.missing {
                    actions.push(Action::Create(item));
                } else if !drift.is_empty() {
                    actions.push(Action::Update(item));
                }
                drifts.push(drift);
            }
            Err(e) => {
                unreadable += 1;
                ui::error(&format!("{}: {e}", item.identity));
            }
        }
    }
    (drifts, actions, unreadable)
}

fn execute(
    remote: &Remote,
    policy: &IgnorePolicy,
    actions: &[Action<'_, '_>],
    cancel: &CancelToken,
    quiet: bool,
) -> Vec<Cycle> {
    let reconciler = ResourceReconciler::new(remote, policy);
    let mut cycles: Vec<Cycle> = Vec::with_capacity(actions.len());
    for action in actions {
        let cycle = match action {
            Action::Create(item) => {
                let cycle = reconciler.create(item.kind, &item.tree, &item.tags, cancel);
                if cycle.phase() == Phase::Committed && cycle.identity != item.identity.as_str() {
                    ui::warn(&format!(
                        "{} was created as {}",
                        item.identity, cycle.identity
                    ));
                }
                cycle
            }
            Action::Update(item) => {
                reconciler.update(item.kind, &item.identity, &item.tree, &item.tags, cancel)
            }
        };
        if cycle.phase() == Phase::Committed && !quiet {
            println!("  {} {}", ui::phase_marker(cycle.phase()), cycle.identity);
        }
        cycles.push(cycle);
    }
    cycles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CloudrecConfig;
    use crate::snapshot::SnapshotRemote;
    use reconcile::{Describe, RemoteApi, RemoteValue, RetryConfig, RetryingRemote};

    const DEMO_CONFIG: &str = include_str!("../../demos/cloudrec.toml");
    const DEMO_SNAPSHOT: &str = include_str!("../../demos/remote.json");

    #[test]
    fn test_demo_converges_after_apply() {
        let config = CloudrecConfig::parse(DEMO_CONFIG).unwrap();
        let policy = config.ignore_policy().unwrap();
        let registry = Registry::builtin();
        let declared = config.resolve(&registry, &IdentityCodec::default()).unwrap();
        let inner = SnapshotRemote::from_json(DEMO_SNAPSHOT, &registry).unwrap();
        let remote = RetryingRemote::new(inner, RetryConfig::no_retry());
        let cancel = CancelToken::new();

        let (drifts, actions, unreadable) = plan(&remote, &policy, &declared, &cancel);
        assert_eq!(unreadable, 0);
        assert_eq!(drifts.len(), 3);
        // The boundary attachment already matches
        assert!(drifts[0].is_empty(), "{:?}", drifts[0]);
        assert!(drifts[1].attributes.is_some());
        assert!(drifts[2].missing);
        assert!(matches!(actions[..], [Action::Update(_), Action::Create(_)]));

        let cycles = execute(&remote, &policy, &actions, &cancel, true);
        for cycle in &cycles {
            assert_eq!(cycle.phase(), Phase::Committed, "{:?}", cycle.error());
        }
        assert!(remote.inner().is_modified());

        let (drifts, actions, unreadable) = plan(&remote, &policy, &declared, &cancel);
        assert_eq!(unreadable, 0);
        assert!(actions.is_empty());
        for drift in &drifts {
            assert!(drift.is_empty(), "{drift:?}");
        }

        // Undeclared optional attributes keep their live values
        let Describe::Found(web) = remote
            .inner()
            .describe("autoscaling_group", &["web".to_string()], &cancel)
            .unwrap()
        else {
            panic!("web should exist");
        };
        assert_eq!(web.attributes["desired_capacity"], RemoteValue::Int(2));
        assert_eq!(web.attributes["max_size"], RemoteValue::Int(3));
    }
}
