use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{AliasTable, ReferenceCache};
use crate::creator::{CreateRequest, ReferenceCreator};
use crate::domain::{Entity, EntityId, attr};
use crate::error::XrefError;
use crate::mapping::Mapping;
use crate::probe::{LinkProbe, link_for};
use crate::resolver::Resolution;
use crate::strategy::{Candidate, ReferenceStrategy, SourceContext, Target};

#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct FailedIdentifier {
    pub owner: String,
    pub identifier: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub strategy: String,
    pub created: usize,
    pub skipped: usize,
    pub unmapped: usize,
    pub repaired: usize,
    pub filtered: usize,
    pub dry_run: bool,
    pub cancelled: bool,
    pub failures: Vec<FailedIdentifier>,
}

pub struct OrchestratorOptions {
    pub note: String,
    pub workers: usize,
    pub probe: Option<Arc<dyn LinkProbe>>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            note: crate::config::default_note(),
            workers: crate::config::default_workers(),
            probe: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActionKind {
    Create,
    Skip,
    Repair,
}

#[derive(Debug)]
struct PlannedAction {
    candidate: Candidate,
    database: Target,
    kind: ActionKind,
}

#[derive(Debug)]
enum PlanOutcome {
    Mapped(Vec<PlannedAction>),
    Unmapped,
    Filtered,
}

#[derive(Debug)]
struct EntityPlan {
    owner: EntityId,
    owner_identifier: String,
    species: Option<EntityId>,
    outcome: PlanOutcome,
    failures: Vec<FailedIdentifier>,
}

enum Applied {
    Created,
    Failed(String),
}

struct Attached {
    identifier: String,
    database: Option<EntityId>,
}

pub struct BatchOrchestrator {
    cache: Arc<ReferenceCache>,
    strategy: Box<dyn ReferenceStrategy>,
    creator: ReferenceCreator,
    probe: Option<Arc<dyn LinkProbe>>,
    pool: ThreadPool,
    cancel: CancelFlag,
}

impl BatchOrchestrator {
    pub fn new(
        cache: Arc<ReferenceCache>,
        strategy: Box<dyn ReferenceStrategy>,
        options: OrchestratorOptions,
    ) -> Result<Self, XrefError> {
        let creator = ReferenceCreator::new(
            Arc::clone(&cache),
            strategy.layout().clone(),
            options.note,
        )?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(options.workers.max(1))
            .thread_name(|index| format!("kira-xref-read-{index}"))
            .build()
            .map_err(|err| XrefError::Configuration(format!("worker pool: {err}")))?;
        Ok(Self {
            cache,
            strategy,
            creator,
            probe: options.probe,
            pool,
            cancel: CancelFlag::default(),
        })
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn creator(&self) -> &ReferenceCreator {
        &self.creator
    }

    pub fn create_identifiers(
        &self,
        author: EntityId,
        mapping: &Mapping,
        sources: &[Entity],
        dry_run: bool,
    ) -> Result<RunSummary, XrefError> {
        let mut seen = BTreeSet::new();
        let sources = sources
            .iter()
            .filter(|entity| seen.insert(entity.id))
            .collect::<Vec<_>>();
        let classes = sources
            .iter()
            .map(|entity| entity.class.as_str())
            .collect::<BTreeSet<_>>();
        for class in classes {
            self.creator.check_owner_class(class)?;
        }

        info!(
            strategy = self.strategy.name(),
            sources = sources.len(),
            mapped_keys = mapping.len(),
            dry_run,
            "starting cross-reference run"
        );

        let abort = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel::<Result<EntityPlan, XrefError>>();
        let result = std::thread::scope(|scope| {
            scope.spawn(|| {
                self.pool.install(|| {
                    sources.par_iter().for_each_with(tx, |tx, entity| {
                        if self.cancel.is_cancelled() || abort.load(Ordering::SeqCst) {
                            return;
                        }
                        let plan = self.plan(entity, mapping);
                        let _ = tx.send(plan);
                    });
                });
            });
            let result = self.write(rx, author, dry_run);
            if result.is_err() {
                abort.store(true, Ordering::SeqCst);
            }
            result
        });

        let cancelled = self.cancel.clear();
        let mut summary = result?;
        summary.failures.sort();
        summary.cancelled = cancelled;
        info!(
            strategy = %summary.strategy,
            created = summary.created,
            skipped = summary.skipped,
            unmapped = summary.unmapped,
            repaired = summary.repaired,
            filtered = summary.filtered,
            failures = summary.failures.len(),
            cancelled = summary.cancelled,
            "cross-reference run finished"
        );
        Ok(summary)
    }

    fn plan(&self, entity: &Entity, mapping: &Mapping) -> Result<EntityPlan, XrefError> {
        let species = self.cache.species_names_to_ids();
        let databases = self.cache.database_names_to_ids();
        let own_id = entity.identifier().unwrap_or_default();
        let mut plan = EntityPlan {
            owner: entity.id,
            owner_identifier: own_id.to_string(),
            species: entity.species(),
            outcome: PlanOutcome::Unmapped,
            failures: Vec::new(),
        };
        if own_id.is_empty() {
            warn!(id = %entity.id, "source entity has no identifier");
            return Ok(plan);
        }

        let source = SourceContext {
            entity,
            own_id,
            species_name: entity.species().and_then(|id| species.primary_name(id)),
            database_name: entity
                .reference(attr::REFERENCE_DATABASE)
                .and_then(|id| databases.primary_name(id)),
        };

        if let Some(filter) = self.strategy.species_filter()
            && !filter.accepts_species(source.species_name)
        {
            plan.outcome = PlanOutcome::Filtered;
            return Ok(plan);
        }
        if !self.strategy.is_mapped(&source, mapping) {
            return Ok(plan);
        }

        let attached = self.attached(entity.id)?;
        let mut actions = Vec::new();
        for candidate in self.strategy.candidates(&source, mapping) {
            let primary = match &candidate.target {
                Target::Database(name) => Some(name.clone()),
                Target::Resolved(Resolution::Resolved { database, .. }) => Some(database.clone()),
                Target::Resolved(Resolution::Pending { .. }) => None,
                Target::Resolved(Resolution::Unresolved { reason, .. }) => {
                    warn!(
                        owner = own_id,
                        identifier = %candidate.raw,
                        reason = %reason,
                        "unresolved identifier"
                    );
                    plan.failures.push(FailedIdentifier {
                        owner: own_id.to_string(),
                        identifier: candidate.raw.clone(),
                        reason: reason.clone(),
                    });
                    continue;
                }
            };

            let kind = match &primary {
                Some(name) => self.check(&attached, &candidate.identifier, name, &databases),
                None => ActionKind::Create,
            };
            if kind != ActionKind::Skip
                && let Err(err) = self.probe(&candidate, primary.as_deref(), &databases)
            {
                if !err.is_probe_failure() {
                    return Err(err);
                }
                warn!(
                    owner = own_id,
                    identifier = %candidate.identifier,
                    error = %err,
                    "probe failed; skipping identifier"
                );
                plan.failures.push(FailedIdentifier {
                    owner: own_id.to_string(),
                    identifier: candidate.identifier.clone(),
                    reason: err.to_string(),
                });
                continue;
            }

            let dependents = if primary.is_some() {
                self.strategy.dependents()
            } else {
                &[]
            };
            let fan_out = dependents
                .iter()
                .map(|dependent| PlannedAction {
                    candidate: candidate.clone(),
                    database: Target::Database(dependent.clone()),
                    kind: self.check(&attached, &candidate.identifier, dependent, &databases),
                })
                .collect::<Vec<_>>();
            actions.push(PlannedAction {
                database: candidate.target.clone(),
                candidate,
                kind,
            });
            actions.extend(fan_out);
        }
        plan.outcome = PlanOutcome::Mapped(actions);
        Ok(plan)
    }

    fn attached(&self, owner: EntityId) -> Result<Vec<Attached>, XrefError> {
        let store = self.cache.store();
        let owner = store.require(owner)?;
        let mut attached = Vec::new();
        for id in owner.references(&self.strategy.layout().back_reference) {
            if let Some(xref) = store.fetch_by_id(id)?
                && let Some(identifier) = xref.identifier()
            {
                attached.push(Attached {
                    identifier: identifier.to_string(),
                    database: xref.reference(attr::REFERENCE_DATABASE),
                });
            }
        }
        Ok(attached)
    }

    fn check(
        &self,
        attached: &[Attached],
        identifier: &str,
        database: &str,
        databases: &AliasTable,
    ) -> ActionKind {
        let database = databases.id(database);
        let copies = attached
            .iter()
            .filter(|xref| xref.identifier == identifier)
            .filter(|xref| {
                database.is_none() || xref.database.is_none() || xref.database == database
            })
            .count();
        match copies {
            0 => ActionKind::Create,
            1 => ActionKind::Skip,
            _ => ActionKind::Repair,
        }
    }

    fn probe(
        &self,
        candidate: &Candidate,
        database: Option<&str>,
        databases: &AliasTable,
    ) -> Result<(), XrefError> {
        let Some(probe) = &self.probe else {
            return Ok(());
        };
        match self.access_url(candidate, database, databases)? {
            Some(access_url) => probe.check(&link_for(&access_url, &candidate.identifier)),
            None => Ok(()),
        }
    }

    fn access_url(
        &self,
        candidate: &Candidate,
        database: Option<&str>,
        databases: &AliasTable,
    ) -> Result<Option<String>, XrefError> {
        if let Target::Resolved(Resolution::Pending { prefix, .. }) = &candidate.target {
            return Ok(self
                .strategy
                .resolver()
                .map(|resolver| resolver.access_url(prefix)));
        }
        let Some(id) = database.and_then(|name| databases.id(name)) else {
            return Ok(None);
        };
        let Some(record) = self.cache.store().fetch_by_id(id)? else {
            return Ok(None);
        };
        Ok(record.text(attr::ACCESS_URL).map(str::to_string))
    }

    fn write(
        &self,
        rx: mpsc::Receiver<Result<EntityPlan, XrefError>>,
        author: EntityId,
        dry_run: bool,
    ) -> Result<RunSummary, XrefError> {
        let mut summary = RunSummary {
            strategy: self.strategy.name().to_string(),
            dry_run,
            ..RunSummary::default()
        };
        for plan in rx {
            let plan = plan?;
            summary.failures.extend(plan.failures);
            let actions = match plan.outcome {
                PlanOutcome::Unmapped => {
                    summary.unmapped += 1;
                    continue;
                }
                PlanOutcome::Filtered => {
                    summary.filtered += 1;
                    continue;
                }
                PlanOutcome::Mapped(actions) => actions,
            };
            for action in actions {
                if action.kind == ActionKind::Skip {
                    summary.skipped += 1;
                    continue;
                }
                if !dry_run
                    && let Applied::Failed(reason) =
                        self.apply(&action, plan.owner, plan.species, author)?
                {
                    summary.failures.push(FailedIdentifier {
                        owner: plan.owner_identifier.clone(),
                        identifier: action.candidate.raw.clone(),
                        reason,
                    });
                    continue;
                }
                summary.created += 1;
                if action.kind == ActionKind::Repair {
                    summary.repaired += 1;
                }
            }
        }
        Ok(summary)
    }

    /// An `Err` aborts the batch; `Applied::Failed` fails this identifier only.
    fn apply(
        &self,
        action: &PlannedAction,
        owner: EntityId,
        species: Option<EntityId>,
        author: EntityId,
    ) -> Result<Applied, XrefError> {
        let database = match &action.database {
            Target::Database(name) => name.clone(),
            Target::Resolved(resolution) => {
                let Some(resolver) = self.strategy.resolver() else {
                    return Err(XrefError::Configuration(format!(
                        "strategy {} produced a prefixed identifier without a resolver",
                        self.strategy.name()
                    )));
                };
                let resolution = match resolution {
                    Resolution::Pending { .. } => {
                        resolver.resolve(&action.candidate.raw, &self.creator, author)?
                    }
                    other => other.clone(),
                };
                match resolution {
                    Resolution::Resolved { database, .. } => database,
                    Resolution::Pending { .. } => {
                        return Ok(Applied::Failed(
                            "database creation did not complete".to_string(),
                        ));
                    }
                    Resolution::Unresolved { reason, .. } => return Ok(Applied::Failed(reason)),
                }
            }
        };

        let request = CreateRequest {
            identifier: &action.candidate.identifier,
            owner,
            database: &database,
            author,
            species,
            extra: &action.candidate.extra,
        };
        match self.creator.create_identifier(&request) {
            Ok(_) => Ok(Applied::Created),
            Err(err) if err.is_per_identifier() && matches!(action.database, Target::Resolved(_)) => {
                debug!(identifier = request.identifier, error = %err, "resolver target missing");
                Ok(Applied::Failed(err.to_string()))
            }
            Err(err) => Err(err),
        }
    }
}

impl std::fmt::Debug for BatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOrchestrator")
            .field("strategy", &self.strategy.name())
            .field("workers", &self.pool.current_num_threads())
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}
