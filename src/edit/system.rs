//! The edit system: history, staging, checkpoints, transactions, merge
//! of remote data, and debounced backup.
//!
//! All mutation flows through this type. The shape of the machine:
//!
//! ```text
//!   history[0] .. history[index] .. history[len-1]
//!        base        stable            redo tail
//!                       \
//!                        staging (work in progress)
//! ```
//!
//! `staging` always descends from the stable entry's graph. `perform`
//! grows staging; `commit` stamps it into history and truncates the
//! redo tail; `undo`/`redo` move the stable index. Nothing here spawns
//! tasks or timers: transitions and the backup debounce are driven by
//! the caller's clock through `tick` and `backup_if_idle`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crossbeam::channel::Receiver;
use tracing::{debug, info, warn};

use crate::actions::EditAction;
use crate::core::config::EngineConfig;
use crate::core::error::{BackupError, EditError, Result, SourceError};
use crate::edit::events::{EditEvent, EventBus};
use crate::edit::transition::Transition;
use crate::edit::{CommitOptions, Edit};
use crate::graph::{BaseLayer, Difference, Graph};
use crate::source::{EntitySource, RenderControl, RenderPauseGuard};
use crate::spatial::SpatialIndex;
use crate::storage::backup::{self, BackupFrame, BackupV3, BACKUP_VERSION};
use crate::storage::{BlobStore, SessionMutex};
use crate::types::{Entity, EntityId, EntityKind, Extent, IdGenerator};

/// A named, truncation-independent copy of the history
#[derive(Clone)]
struct Checkpoint {
    history: Vec<Edit>,
    index: usize,
}

/// Builder for [`EditSystem`]; declares its collaborators up front
#[derive(Default)]
pub struct EditSystemBuilder {
    config: Option<EngineConfig>,
    store: Option<Arc<dyn BlobStore>>,
    source: Option<Arc<dyn EntitySource>>,
    render: Option<Arc<dyn RenderControl>>,
}

impl EditSystemBuilder {
    /// Set the engine configuration (required)
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the backup blob store (required)
    pub fn blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the remote entity source (required)
    pub fn entity_source(mut self, source: Arc<dyn EntitySource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the render control; defaults to a no-op
    pub fn render_control(mut self, render: Arc<dyn RenderControl>) -> Self {
        self.render = Some(render);
        self
    }

    /// Assemble the system, failing fast on a missing collaborator
    pub fn build(self) -> Result<EditSystem> {
        let config = self
            .config
            .ok_or(EditError::MissingDependency("config"))?;
        config.validate()?;
        let store = self
            .store
            .ok_or(EditError::MissingDependency("blob_store"))?;
        let source = self
            .source
            .ok_or(EditError::MissingDependency("entity_source"))?;
        let render = self
            .render
            .unwrap_or_else(|| Arc::new(crate::source::NoopRender));

        let base = Arc::new(BaseLayer::new());
        let root = Graph::new(Arc::clone(&base));
        let spatial = SpatialIndex::new(config.spatial.cell_size);
        let session = SessionMutex::acquire(config.backup.lock_name.as_str());
        let restorable = store.get_item(&config.backup_key()).is_some();

        let stable = Edit::base(root.clone());
        let staging = Edit::base(root.branch());

        Ok(EditSystem {
            config,
            base,
            root,
            spatial,
            history: vec![stable],
            index: 0,
            staging,
            checkpoints: HashMap::new(),
            work_in_progress: false,
            transition: None,
            transaction_depth: 0,
            tx_staging_start: None,
            tx_stable_start: None,
            tx_start_index: 0,
            events: EventBus::new(),
            ids: IdGenerator::new(),
            store,
            source,
            render,
            session,
            restorable,
            backup_ok: true,
            backup_pending: false,
            last_stable_change: None,
        })
    }
}

pub struct EditSystem {
    config: EngineConfig,
    base: Arc<BaseLayer>,
    root: Graph,
    spatial: SpatialIndex,

    history: Vec<Edit>,
    index: usize,
    staging: Edit,
    checkpoints: HashMap<String, Checkpoint>,
    work_in_progress: bool,
    transition: Option<Transition>,

    transaction_depth: usize,
    tx_staging_start: Option<Graph>,
    tx_stable_start: Option<Graph>,
    tx_start_index: usize,

    events: EventBus,
    ids: IdGenerator,

    store: Arc<dyn BlobStore>,
    source: Arc<dyn EntitySource>,
    render: Arc<dyn RenderControl>,
    session: Option<SessionMutex>,
    restorable: bool,
    backup_ok: bool,
    backup_pending: bool,
    last_stable_change: Option<Instant>,
}

impl EditSystem {
    /// Start assembling a system
    pub fn builder() -> EditSystemBuilder {
        EditSystemBuilder::default()
    }

    // -- queries -----------------------------------------------------------

    /// The stable history entry
    pub fn stable(&self) -> &Edit {
        &self.history[self.index]
    }

    /// The staging entry (work in progress)
    pub fn staging(&self) -> &Edit {
        &self.staging
    }

    /// The root graph over the shared base layer
    pub fn base_graph(&self) -> Graph {
        self.root.clone()
    }

    /// The stable entry's graph
    pub fn stable_graph(&self) -> Graph {
        self.history[self.index].graph.clone()
    }

    /// The staging graph
    pub fn staging_graph(&self) -> &Graph {
        &self.staging.graph
    }

    /// Number of history entries, base included
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// The stable index
    pub fn index(&self) -> usize {
        self.index
    }

    /// `true` if the stable graph differs from the base
    pub fn has_changes(&self) -> bool {
        !Difference::between(&self.root, &self.history[self.index].graph).is_empty()
    }

    /// Everything created, modified, or deleted between base and stable
    pub fn changes(&self) -> Difference {
        Difference::between(&self.root, &self.history[self.index].graph)
    }

    /// `true` while staging holds uncommitted work
    pub fn has_work_in_progress(&self) -> bool {
        self.work_in_progress
    }

    /// `true` while a transition is easing in
    pub fn has_active_transition(&self) -> bool {
        self.transition.is_some()
    }

    /// Annotation the next `undo` would walk back over
    pub fn undo_annotation(&self) -> Option<&str> {
        self.history[..=self.index]
            .iter()
            .skip(1)
            .rev()
            .find_map(|e| e.annotation.as_deref())
    }

    /// Annotation the next `redo` would walk forward over
    pub fn redo_annotation(&self) -> Option<&str> {
        self.history[self.index + 1..]
            .iter()
            .find_map(|e| e.annotation.as_deref())
    }

    /// Every annotation in the history, oldest first
    pub fn peek_all_annotations(&self) -> Vec<&str> {
        self.history
            .iter()
            .filter_map(|e| e.annotation.as_deref())
            .collect()
    }

    /// Attribution sources recorded by the committed entries up to the
    /// stable index
    pub fn sources_used(&self) -> std::collections::BTreeSet<String> {
        self.history[..=self.index]
            .iter()
            .skip(1)
            .flat_map(|e| e.sources.iter().cloned())
            .collect()
    }

    /// Entities in the staging graph whose indexed box intersects `extent`
    pub fn intersects(&self, extent: &Extent) -> Vec<Arc<Entity>> {
        self.spatial.intersects(extent, &self.staging.graph)
    }

    /// Allocate a fresh local entity id
    pub fn new_entity_id(&mut self, kind: EntityKind) -> EntityId {
        self.ids.next(kind)
    }

    /// Register an observer
    pub fn subscribe(&self) -> Receiver<EditEvent> {
        self.events.subscribe()
    }

    // -- staging -----------------------------------------------------------

    /// Apply actions in order to the staging graph, replacing it stepwise
    pub fn perform(&mut self, actions: Vec<Box<dyn EditAction>>) {
        self.interrupt_transition();
        let prev = self.staging.graph.clone();
        let mut graph = prev.clone();
        for action in &actions {
            graph = action.apply(&graph);
        }
        self.staging.graph = graph;
        self.work_in_progress = true;
        self.notify_staging(&prev);
    }

    /// Apply one transitionable action, easing from 0 to 1 over the
    /// configured duration as `tick` feeds in timestamps.
    /// Non-transitionable actions apply once, immediately.
    pub fn perform_transition(&mut self, action: Box<dyn EditAction>, now: Instant) {
        if !action.transitionable() {
            self.perform(vec![action]);
            return;
        }
        self.interrupt_transition();
        let transition = Transition::new(action, now, self.config.transition_duration());
        self.apply_eased_step(transition.action(), transition.eased(now));
        self.transition = Some(transition);
    }

    /// Advance the active transition to time `now`; completion applies
    /// the action at t = 1 exactly once
    pub fn tick(&mut self, now: Instant) {
        let Some(transition) = self.transition.take() else {
            return;
        };
        if transition.is_complete(now) {
            self.apply_eased_step(transition.action(), 1.0);
        } else {
            self.apply_eased_step(transition.action(), transition.eased(now));
            self.transition = Some(transition);
        }
    }

    /// Each eased step starts over from stable, so partial applications
    /// never compound
    fn apply_eased_step(&mut self, action: &dyn EditAction, t: f64) {
        let prev = self.staging.graph.clone();
        let fresh = self.stable_graph().branch();
        self.staging.graph = action.apply_eased(&fresh, t);
        self.work_in_progress = true;
        self.notify_staging(&prev);
    }

    fn interrupt_transition(&mut self) {
        if let Some(transition) = self.transition.take() {
            self.apply_eased_step(transition.action(), 1.0);
        }
    }

    /// Discard staging; no-op when nothing is in progress
    pub fn revert(&mut self) {
        self.transition = None;
        if !self.work_in_progress {
            return;
        }
        let prev = self.staging.graph.clone();
        self.staging = self.fresh_staging();
        self.work_in_progress = false;
        self.notify_staging(&prev);
    }

    fn fresh_staging(&self) -> Edit {
        Edit::base(self.history[self.index].graph.branch())
    }

    // -- history -----------------------------------------------------------

    /// Stamp staging with metadata, truncate the redo tail, and append
    pub fn commit(&mut self, options: CommitOptions) {
        self.interrupt_transition();
        let prev_stable = self.stable_graph();
        let edit = Edit {
            graph: self.staging.graph.clone(),
            annotation: options.annotation,
            selected_ids: options.selected_ids,
            sources: options.sources,
            transform: options.transform,
        };
        self.history.truncate(self.index + 1);
        self.history.push(edit);
        self.index += 1;
        self.staging = self.fresh_staging();
        self.work_in_progress = false;

        info!(
            index = self.index,
            annotation = self.history[self.index].annotation.as_deref(),
            "committed edit"
        );
        self.notify_stable(&prev_stable);
        self.note_stable_change();
    }

    /// Like `commit`, but replace the stable entry instead of appending.
    /// Invalid at the base entry.
    pub fn commit_append(&mut self, options: CommitOptions) -> Result<()> {
        if self.index == 0 {
            return Err(EditError::InvalidOperation(
                "cannot replace the base history entry".to_string(),
            )
            .into());
        }
        self.interrupt_transition();
        let prev_stable = self.stable_graph();
        self.history.truncate(self.index + 1);
        self.history[self.index] = Edit {
            graph: self.staging.graph.clone(),
            annotation: options.annotation,
            selected_ids: options.selected_ids,
            sources: options.sources,
            transform: options.transform,
        };
        self.staging = self.fresh_staging();
        self.work_in_progress = false;

        self.notify_stable(&prev_stable);
        self.note_stable_change();
        Ok(())
    }

    /// Work in progress is discarded first; otherwise the stable index
    /// steps back, floored at the base entry
    pub fn undo(&mut self) {
        self.transition = None;
        let prev_index = self.index;
        let prev_staging = self.staging.graph.clone();
        let prev_stable = self.stable_graph();

        if self.work_in_progress {
            self.staging = self.fresh_staging();
            self.work_in_progress = false;
        } else if self.index > 0 {
            self.index -= 1;
            self.staging = self.fresh_staging();
            self.note_stable_change();
        } else {
            return;
        }

        debug!(from = prev_index, to = self.index, "undo");
        self.finish_jump(prev_index, &prev_staging, &prev_stable);
    }

    /// Step the stable index forward; no-op at the end of history
    pub fn redo(&mut self) {
        self.transition = None;
        if self.index + 1 >= self.history.len() && !self.work_in_progress {
            return;
        }
        let prev_index = self.index;
        let prev_staging = self.staging.graph.clone();
        let prev_stable = self.stable_graph();

        self.work_in_progress = false;
        if self.index + 1 < self.history.len() {
            self.index += 1;
            self.note_stable_change();
        }
        self.staging = self.fresh_staging();

        debug!(from = prev_index, to = self.index, "redo");
        self.finish_jump(prev_index, &prev_staging, &prev_stable);
    }

    fn finish_jump(&mut self, prev_index: usize, prev_staging: &Graph, prev_stable: &Graph) {
        self.notify_staging(prev_staging);
        self.notify_stable(prev_stable);
        self.notify(EditEvent::HistoryJumped {
            prev_index,
            new_index: self.index,
        });
    }

    // -- checkpoints -------------------------------------------------------

    /// Record the current history and index under `id`. Later
    /// truncation does not disturb the checkpoint.
    pub fn set_checkpoint(&mut self, id: impl Into<String>) {
        self.interrupt_transition();
        self.checkpoints.insert(
            id.into(),
            Checkpoint {
                history: self.history.clone(),
                index: self.index,
            },
        );
    }

    /// Replace the live history with the named checkpoint's copy.
    /// Unknown ids are a no-op.
    pub fn restore_checkpoint(&mut self, id: &str) {
        let Some(checkpoint) = self.checkpoints.get(id).cloned() else {
            return;
        };
        self.transition = None;
        let prev_index = self.index;
        let prev_staging = self.staging.graph.clone();
        let prev_stable = self.stable_graph();

        self.history = checkpoint.history;
        self.index = checkpoint.index;
        self.staging = self.fresh_staging();
        self.work_in_progress = false;

        debug!(checkpoint = id, index = self.index, "restored checkpoint");
        self.finish_jump(prev_index, &prev_staging, &prev_stable);
        self.note_stable_change();
    }

    /// Drop the named checkpoint
    pub fn delete_checkpoint(&mut self, id: &str) {
        self.checkpoints.remove(id);
    }

    /// `true` if a checkpoint exists under `id`
    pub fn has_checkpoint(&self, id: &str) -> bool {
        self.checkpoints.contains_key(id)
    }

    // -- merge -------------------------------------------------------------

    /// Fold remotely fetched entities into the base layer without
    /// disturbing any edit. `seen_ids` are the ids the caller has
    /// already processed; a seen group gaining a newly resolvable
    /// member is touched so observers pick it up as changed.
    pub fn merge(&mut self, entities: Vec<Entity>, seen_ids: HashSet<EntityId>) {
        let arcs: Vec<Arc<Entity>> = entities.into_iter().map(Arc::new).collect();
        let fresh: HashSet<EntityId> = arcs
            .iter()
            .filter(|e| e.visible() && !self.base.contains(e.id()))
            .map(|e| e.id().clone())
            .collect();

        self.base.rebase(&arcs, false);

        // a locally edited relation shadows its base value, so the bump
        // must land on the copy the head graph resolves
        let head = self.staging.graph.clone();
        for id in &seen_ids {
            let Some(entity) = head.get(id) else {
                continue;
            };
            if entity.kind() != EntityKind::Relation {
                continue;
            }
            if entity.child_refs().iter().any(|child| fresh.contains(*child)) {
                entity.touch();
            }
        }

        self.spatial.rebase(&arcs, &head, false);

        debug!(merged = arcs.len(), fresh = fresh.len(), "merged remote data");
        self.events.emit(EditEvent::Merged(seen_ids));
    }

    // -- transactions ------------------------------------------------------

    /// Suppress notifications until the matching `end_transaction`,
    /// which emits one staging diff and one stable diff over the whole
    /// span. Nests.
    pub fn begin_transaction(&mut self) {
        if self.transaction_depth == 0 {
            self.tx_staging_start = Some(self.staging.graph.clone());
            self.tx_stable_start = Some(self.stable_graph());
            self.tx_start_index = self.index;
        }
        self.transaction_depth += 1;
    }

    /// Close the innermost transaction; the outermost close emits the
    /// batched diffs
    pub fn end_transaction(&mut self) {
        if self.transaction_depth == 0 {
            return;
        }
        self.transaction_depth -= 1;
        if self.transaction_depth > 0 {
            return;
        }

        if let Some(start) = self.tx_staging_start.take() {
            let diff = Difference::between(&start, &self.staging.graph);
            if !diff.is_empty() {
                self.events.emit(EditEvent::StagingChanged(diff));
            }
        }
        if let Some(start) = self.tx_stable_start.take() {
            let diff = Difference::between(&start, &self.stable_graph());
            if !diff.is_empty() {
                self.events.emit(EditEvent::StableChanged(diff));
            }
        }
        if self.tx_start_index != self.index {
            self.events.emit(EditEvent::HistoryJumped {
                prev_index: self.tx_start_index,
                new_index: self.index,
            });
        }
    }

    /// Run `f` inside a transaction. The transaction ends on every exit
    /// path, including unwinds out of `f`.
    pub fn transaction<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        struct Guard<'a> {
            system: &'a mut EditSystem,
        }
        impl Drop for Guard<'_> {
            fn drop(&mut self) {
                self.system.end_transaction();
            }
        }

        self.begin_transaction();
        let mut guard = Guard { system: self };
        f(&mut *guard.system)
    }

    // -- notifications -----------------------------------------------------

    /// Gate for diff-class events (staging/stable diffs, index jumps):
    /// suppressed during a transaction and re-emitted over the whole
    /// span at the outermost `end_transaction`. `Merged`, `Restored`
    /// and `BackupStatus` bypass this and go straight to the bus.
    fn notify(&self, event: EditEvent) {
        if self.transaction_depth == 0 {
            self.events.emit(event);
        }
    }

    fn notify_staging(&self, prev: &Graph) {
        let diff = Difference::between(prev, &self.staging.graph);
        if !diff.is_empty() {
            self.notify(EditEvent::StagingChanged(diff));
        }
    }

    fn notify_stable(&self, prev: &Graph) {
        let diff = Difference::between(prev, &self.history[self.index].graph);
        if !diff.is_empty() {
            self.notify(EditEvent::StableChanged(diff));
        }
    }

    fn note_stable_change(&mut self) {
        self.backup_pending = true;
        self.last_stable_change = Some(Instant::now());
    }

    // -- backup ------------------------------------------------------------

    /// Serialize the session. `None` when stable has no changes against
    /// the base.
    pub fn to_json(&self) -> Result<Option<String>> {
        if !self.has_changes() {
            return Ok(None);
        }

        let mut modified: BTreeMap<String, Arc<Entity>> = BTreeMap::new();
        let mut base_ids: HashSet<EntityId> = HashSet::new();
        let mut frames: Vec<BackupFrame> = Vec::with_capacity(self.history.len());
        frames.push(BackupFrame::default());

        for pair in self.history.windows(2) {
            let (prev, cur) = (&pair[0], &pair[1]);
            let mut frame = BackupFrame {
                annotation: cur.annotation.clone(),
                selected_ids: cur.selected_ids.clone(),
                sources: cur.sources.clone(),
                transform: Some(cur.transform),
                ..Default::default()
            };

            let mut entries: Vec<_> = cur.graph.overlay_since(&prev.graph).into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            for (id, entry) in entries {
                match entry {
                    Some(entity) => {
                        frame.modified.push(entity.key());
                        modified.insert(entity.key(), entity);
                        if !id.is_local() {
                            base_ids.insert(id);
                        }
                    }
                    None => {
                        if !id.is_local() {
                            base_ids.insert(id.clone());
                        }
                        frame.deleted.push(id);
                    }
                }
            }
            frames.push(frame);
        }

        // original base values of every touched entity, plus children
        // and parents so the restored history resolves immediately
        let mut base_entities: BTreeMap<EntityId, Arc<Entity>> = BTreeMap::new();
        for id in &base_ids {
            let Some(entity) = self.base.get(id) else {
                continue;
            };
            for child in entity.child_refs() {
                if let Some(child_entity) = self.base.get(child) {
                    base_entities.insert(child.clone(), child_entity);
                }
            }
            let mut parent_ids = self.base.parent_path_ids(id);
            parent_ids.extend(self.base.parent_group_ids(id));
            for parent_id in parent_ids {
                if let Some(parent) = self.base.get(&parent_id) {
                    base_entities.insert(parent_id, parent);
                }
            }
            base_entities.insert(id.clone(), entity);
        }

        let blob = BackupV3 {
            version: BACKUP_VERSION,
            entities: modified.into_values().map(|e| (*e).clone()).collect(),
            base_entities: base_entities.into_values().map(|e| (*e).clone()).collect(),
            stack: frames,
            next_ids: self.ids.clone(),
            index: self.index,
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
        };
        Ok(Some(backup::to_json(&blob)?))
    }

    /// Write a backup now. Skipped (returning `false`) when this
    /// session does not hold the lock or an earlier session's backup is
    /// waiting to be restored. A write failure is reported through
    /// `BackupStatus`, never as an error.
    pub fn save_backup(&mut self) -> bool {
        if self.session.is_none() || self.restorable {
            return false;
        }
        let key = self.config.backup_key();
        let json = match self.to_json() {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "backup serialization failed");
                self.set_backup_status(false);
                return false;
            }
        };
        let result = match &json {
            Some(blob) => self.store.set_item(&key, blob),
            None => {
                self.store.remove_item(&key);
                Ok(())
            }
        };
        match result {
            Ok(()) => {
                self.set_backup_status(true);
                true
            }
            Err(err) => {
                warn!(error = %err, "backup write failed");
                self.set_backup_status(false);
                false
            }
        }
    }

    /// Write a backup only once the configured idle period has elapsed
    /// since the last stable change. Call this from the application's
    /// clock; there are no internal timers.
    pub fn backup_if_idle(&mut self, now: Instant) -> bool {
        if !self.backup_pending {
            return false;
        }
        let idle = match self.last_stable_change {
            Some(at) => now.saturating_duration_since(at) >= self.config.backup_idle_delay(),
            None => true,
        };
        if !idle {
            return false;
        }
        self.backup_pending = false;
        self.save_backup()
    }

    fn set_backup_status(&mut self, ok: bool) {
        if self.backup_ok != ok {
            self.backup_ok = ok;
            self.events.emit(EditEvent::BackupStatus(ok));
        }
    }

    /// `true` unless the most recent backup write failed
    pub fn last_backup_succeeded(&self) -> bool {
        self.backup_ok
    }

    /// `true` if a previous session left a backup to restore
    pub fn has_restorable_changes(&self) -> bool {
        self.restorable
    }

    /// The saved backup blob, if any
    pub fn saved_backup_json(&self) -> Option<String> {
        self.store.get_item(&self.config.backup_key())
    }

    /// Delete the saved backup and its associated changeset metadata
    pub fn clear_backup(&mut self) {
        if self.session.is_none() {
            return;
        }
        self.store.remove_item(&self.config.backup_key());
        for suffix in ["comment", "source", "hashtags"] {
            self.store.remove_item(&format!(
                "{}_{}_{}",
                self.config.backup.key_prefix, self.config.backup.origin, suffix
            ));
        }
        self.restorable = false;
    }

    // -- restore -----------------------------------------------------------

    /// Restore the saved backup, if one exists
    pub async fn restore_saved(&mut self) -> Result<bool> {
        let Some(blob) = self.saved_backup_json() else {
            return Ok(false);
        };
        self.restore_from_json(&blob).await?;
        Ok(true)
    }

    /// Rebuild the session from a backup blob. Rendering is paused for
    /// the duration and resumed on every exit path.
    pub async fn restore_from_json(&mut self, blob: &str) -> Result<()> {
        let parsed = backup::from_json(blob)?;
        let _pause = RenderPauseGuard::new(Arc::clone(&self.render));
        self.restore_parsed(parsed).await
    }

    async fn restore_parsed(&mut self, parsed: BackupV3) -> Result<()> {
        let root = self.base_graph();

        let base_arcs: Vec<Arc<Entity>> = parsed.base_entities.into_iter().map(Arc::new).collect();
        self.base.rebase(&base_arcs, true);
        self.spatial.rebase(&base_arcs, &root, true);

        let mut by_key: HashMap<String, Arc<Entity>> = HashMap::new();
        let mut modified_ids: HashSet<EntityId> = HashSet::new();
        for entity in parsed.entities {
            modified_ids.insert(entity.id().clone());
            by_key.insert(entity.key(), Arc::new(entity));
        }

        self.fetch_missing_children(by_key.values().cloned().collect(), &modified_ids)
            .await?;

        let mut history = vec![Edit::base(root.clone())];
        let mut prev = root;
        for frame in parsed.stack.iter().skip(1) {
            let mut overlay = HashMap::with_capacity(frame.modified.len() + frame.deleted.len());
            for key in frame.modified.iter() {
                let entity = by_key
                    .get(key)
                    .ok_or_else(|| BackupError::MissingEntity { key: key.clone() })?;
                overlay.insert(entity.id().clone(), Some(Arc::clone(entity)));
            }
            for id in frame.deleted.iter() {
                overlay.insert(id.clone(), None);
            }
            let graph = prev.load(overlay);
            history.push(Edit {
                graph: graph.clone(),
                annotation: frame.annotation.clone(),
                selected_ids: frame.selected_ids.clone(),
                sources: frame.sources.clone(),
                transform: frame.transform.unwrap_or_default(),
            });
            prev = graph;
        }

        let prev_index = self.index;
        let prev_stable = self.stable_graph();

        self.history = history;
        self.index = parsed.index.min(self.history.len() - 1);
        self.ids = parsed.next_ids;
        self.staging = self.fresh_staging();
        self.work_in_progress = false;
        self.transition = None;
        self.restorable = false;

        info!(entries = self.history.len(), index = self.index, "restored backup");
        self.notify_stable(&prev_stable);
        self.notify(EditEvent::HistoryJumped {
            prev_index,
            new_index: self.index,
        });
        self.events.emit(EditEvent::Restored);
        self.note_stable_change();
        Ok(())
    }

    /// Fetch children the blob references but does not carry. Runs in
    /// rounds: fetched ways and relations may reference further missing
    /// children. A child deleted upstream is walked down version by
    /// version until a live one is found.
    async fn fetch_missing_children(
        &mut self,
        mut pending_scan: Vec<Arc<Entity>>,
        modified_ids: &HashSet<EntityId>,
    ) -> Result<()> {
        let source = Arc::clone(&self.source);
        let root = self.base_graph();
        let mut requested: HashSet<EntityId> = HashSet::new();
        let mut retry_versions: HashMap<EntityId, u32> = HashMap::new();

        loop {
            let mut missing: Vec<EntityId> = Vec::new();
            for entity in pending_scan.drain(..) {
                for child in entity.child_refs() {
                    if child.is_local() || modified_ids.contains(child) {
                        continue;
                    }
                    if self.base.contains(child)
                        || requested.contains(child)
                        || retry_versions.contains_key(child)
                    {
                        continue;
                    }
                    requested.insert(child.clone());
                    missing.push(child.clone());
                }
            }

            if missing.is_empty() && retry_versions.is_empty() {
                return Ok(());
            }

            let mut fetched: Vec<Entity> = Vec::new();
            if !missing.is_empty() {
                debug!(count = missing.len(), "fetching entities missing from backup");
                fetched = source.fetch_entities(&missing).await?;
                let found: HashSet<&EntityId> = fetched.iter().map(|e| e.id()).collect();
                let unresolved: Vec<EntityId> = missing
                    .iter()
                    .filter(|id| !found.contains(*id))
                    .cloned()
                    .collect();
                if !unresolved.is_empty() {
                    return Err(SourceError::Unresolved(unresolved).into());
                }
            }

            for (id, version) in std::mem::take(&mut retry_versions) {
                fetched.push(source.fetch_entity_version(&id, version).await?);
            }

            let mut live: Vec<Arc<Entity>> = Vec::new();
            for entity in fetched {
                if entity.visible() {
                    live.push(Arc::new(entity));
                } else {
                    let version = entity.version();
                    if version == 0 {
                        return Err(SourceError::ExhaustedVersions {
                            id: entity.id().clone(),
                        }
                        .into());
                    }
                    retry_versions.insert(entity.id().clone(), version - 1);
                }
            }

            self.base.rebase(&live, true);
            self.spatial.rebase(&live, &root, true);
            pending_scan = live;
        }
    }
}
