//! Execution engine - runs independent read cycles in parallel

use crate::identity::CompositeIdentity;
use crate::reconciler::{Cycle, Phase, ResourceReconciler};
use crate::remote::{CancelToken, RemoteApi};
use crate::resource::ResourceType;
use crate::tags::TagSet;
use rayon::prelude::*;

/// One resource to refresh.
#[derive(Debug, Clone)]
pub struct Target<'a> {
    pub kind: &'a dyn ResourceType,
    pub identity: CompositeIdentity,
    /// Effective local tags (defaults merged under the resource's own)
    pub local_tags: TagSet,
}

/// Counts of terminal phases across a refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub committed: usize,
    pub not_found: usize,
    pub failed: usize,
}

impl RefreshSummary {
    pub fn add(&mut self, cycle: &Cycle) {
        match cycle.phase() {
            Phase::Committed => self.committed += 1,
            Phase::NotFound => self.not_found += 1,
            _ => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.committed + self.not_found + self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Progress callback for refresh operations
pub trait ProgressCallback: Send {
    /// Called once before any cycle starts
    fn on_start(&mut self, total: usize);

    /// Called when a cycle reaches a terminal phase
    fn on_cycle_complete(&mut self, cycle: &Cycle);

    /// Called after the last cycle
    fn on_finish(&mut self, summary: &RefreshSummary);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_start(&mut self, _total: usize) {}
    fn on_cycle_complete(&mut self, _cycle: &Cycle) {}
    fn on_finish(&mut self, _summary: &RefreshSummary) {}
}

/// Result of a refresh: one cycle per target, in input order.
#[derive(Debug)]
pub struct Refresh {
    pub cycles: Vec<Cycle>,
    pub summary: RefreshSummary,
}

/// Refresh every target.
///
/// # Arguments
/// * `reconciler` - Shared reconciler (remote + ignore policy)
/// * `targets` - Resources to refresh
/// * `jobs` - Number of worker threads; 1 runs sequentially
/// * `progress` - Progress callback
/// * `cancel` - Token shared by every cycle
pub fn refresh_all<R, P>(
    reconciler: &ResourceReconciler<'_, R>,
    targets: &[Target<'_>],
    jobs: usize,
    progress: &mut P,
    cancel: &CancelToken,
) -> Refresh
where
    R: RemoteApi + ?Sized,
    P: ProgressCallback,
{
    progress.on_start(targets.len());

    let cycles = if jobs <= 1 || targets.len() <= 1 {
        let mut cycles = Vec::with_capacity(targets.len());
        for target in targets {
            let cycle = refresh_one(reconciler, target, cancel);
            progress.on_cycle_complete(&cycle);
            cycles.push(cycle);
        }
        cycles
    } else {
        let cycles = refresh_parallel(reconciler, targets, jobs, cancel);
        // The callback is not shared across threads; report afterwards.
        for cycle in &cycles {
            progress.on_cycle_complete(cycle);
        }
        cycles
    };

    let mut summary = RefreshSummary::default();
    for cycle in &cycles {
        summary.add(cycle);
    }
    progress.on_finish(&summary);

    Refresh { cycles, summary }
}

fn refresh_parallel<R: RemoteApi + ?Sized>(
    reconciler: &ResourceReconciler<'_, R>,
    targets: &[Target<'_>],
    jobs: usize,
    cancel: &CancelToken,
) -> Vec<Cycle> {
    let run = || -> Vec<Cycle> {
        targets
            .par_iter()
            .map(|target| refresh_one(reconciler, target, cancel))
            .collect()
    };

    match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
        Ok(pool) => pool.install(run),
        Err(e) => {
            log::warn!("Failed to create thread pool ({e}), using the global pool");
            run()
        }
    }
}

fn refresh_one<R: RemoteApi + ?Sized>(
    reconciler: &ResourceReconciler<'_, R>,
    target: &Target<'_>,
    cancel: &CancelToken,
) -> Cycle {
    reconciler.reconcile(target.kind, &target.identity, &target.local_tags, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{Attribute, Schema};
    use crate::remote::{
        Describe, RemoteError, RemoteErrorKind, RemoteObject, RemoteResponse, RemoteResult,
        RemoteValue,
    };
    use crate::tags::{IgnorePolicy, TagDiff};

    #[derive(Debug)]
    struct Table;

    impl ResourceType for Table {
        fn name(&self) -> &'static str {
            "table"
        }

        fn description(&self) -> &'static str {
            "Table"
        }

        fn schema(&self) -> Schema {
            Schema::new().attribute("name", Attribute::required_string())
        }
    }

    /// Finds `t*` tables, reports `gone*` as absent and fails everything else.
    struct Fixed;

    impl RemoteApi for Fixed {
        fn describe(&self, _: &str, ids: &[String], _: &CancelToken) -> RemoteResult<Describe> {
            let id = &ids[0];
            if id.starts_with('t') {
                let mut attributes = RemoteObject::new();
                attributes.insert("name".to_string(), RemoteValue::string(id.clone()));
                Ok(Describe::Found(RemoteResponse {
                    attributes,
                    tags: TagSet::new(),
                }))
            } else if id.starts_with("gone") {
                Ok(Describe::NotFound)
            } else {
                Err(RemoteError::new(RemoteErrorKind::Other, "boom"))
            }
        }

        fn create(&self, _: &str, _: &RemoteObject, _: &CancelToken) -> RemoteResult<Vec<String>> {
            Err(RemoteError::new(RemoteErrorKind::Other, "read only"))
        }

        fn update(&self, _: &str, _: &[String], _: &RemoteObject, _: &CancelToken) -> RemoteResult<()> {
            Err(RemoteError::new(RemoteErrorKind::Other, "read only"))
        }

        fn delete(&self, _: &str, _: &[String], _: &CancelToken) -> RemoteResult<Describe> {
            Err(RemoteError::new(RemoteErrorKind::Other, "read only"))
        }

        fn update_tags(&self, _: &str, _: &[String], _: &TagDiff, _: &CancelToken) -> RemoteResult<()> {
            Err(RemoteError::new(RemoteErrorKind::Other, "read only"))
        }
    }

    #[derive(Default)]
    struct Recording {
        started: usize,
        completed: Vec<String>,
        finished: Option<RefreshSummary>,
    }

    impl ProgressCallback for Recording {
        fn on_start(&mut self, total: usize) {
            self.started = total;
        }

        fn on_cycle_complete(&mut self, cycle: &Cycle) {
            self.completed.push(cycle.identity.clone());
        }

        fn on_finish(&mut self, summary: &RefreshSummary) {
            self.finished = Some(*summary);
        }
    }

    fn targets(ids: &[&str]) -> Vec<Target<'static>> {
        ids.iter()
            .map(|id| Target {
                kind: &Table,
                identity: CompositeIdentity::from_raw(*id),
                local_tags: TagSet::new(),
            })
            .collect()
    }

    #[test]
    fn test_refresh_sequential() {
        let policy = IgnorePolicy::none();
        let reconciler = ResourceReconciler::new(&Fixed, &policy);
        let mut progress = Recording::default();

        let refresh = refresh_all(
            &reconciler,
            &targets(&["t1", "gone1", "bad"]),
            1,
            &mut progress,
            &CancelToken::new(),
        );

        assert_eq!(
            refresh.summary,
            RefreshSummary {
                committed: 1,
                not_found: 1,
                failed: 1
            }
        );
        assert_eq!(progress.started, 3);
        assert_eq!(progress.completed, vec!["t1", "gone1", "bad"]);
        assert_eq!(progress.finished, Some(refresh.summary));
    }

    #[test]
    fn test_refresh_parallel_keeps_input_order() {
        let policy = IgnorePolicy::none();
        let reconciler = ResourceReconciler::new(&Fixed, &policy);
        let ids: Vec<String> = (0..32).map(|i| format!("t{i}")).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();

        let refresh = refresh_all(
            &reconciler,
            &targets(&id_refs),
            4,
            &mut NoProgress,
            &CancelToken::new(),
        );

        assert_eq!(refresh.summary.committed, 32);
        let order: Vec<&str> = refresh.cycles.iter().map(|c| c.identity.as_str()).collect();
        assert_eq!(order, id_refs);
    }

    #[test]
    fn test_cancelled_refresh_fails_every_cycle() {
        let policy = IgnorePolicy::none();
        let reconciler = ResourceReconciler::new(&Fixed, &policy);
        let token = CancelToken::new();
        token.cancel();

        let refresh = refresh_all(&reconciler, &targets(&["t1", "t2"]), 2, &mut NoProgress, &token);

        assert_eq!(refresh.summary.failed, 2);
        assert!(refresh.summary.has_failures());
        assert_eq!(refresh.summary.total(), 2);
    }
}
