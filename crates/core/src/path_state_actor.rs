//! Per-path coordinator sitting in front of the prep dispatcher (§4.5).
//!
//! Guarantees at most one prep task in flight per path: concurrent ingress
//! events for the same path collapse into a single merged follow-up, and
//! newer ingress always supersedes stale prep output.

use dashmap::DashMap;

use crate::types::{Lane, PreparedWork, WorkItem, WorkType};

#[derive(Debug, Clone)]
pub struct DispatchTask {
    pub item: WorkItem,
    pub generation: u64,
}

#[derive(Debug, Clone, Default)]
struct PathState {
    latest_generation: u64,
    in_prep: bool,
    pending_merged_type: Option<WorkType>,
    pending_rebuild_lane: bool,
}

fn merge_work_types(lhs: WorkType, rhs: WorkType) -> WorkType {
    if lhs.merge_rank() <= rhs.merge_rank() { lhs } else { rhs }
}

pub struct PathStateActor {
    paths: DashMap<String, PathState>,
}

impl Default for PathStateActor {
    fn default() -> Self {
        Self::new()
    }
}

impl PathStateActor {
    pub fn new() -> Self {
        Self { paths: DashMap::new() }
    }

    pub fn on_ingress(&self, item: &WorkItem) -> Option<DispatchTask> {
        let key = item.path.to_string_lossy().into_owned();
        let mut state = self.paths.entry(key).or_default();
        state.latest_generation += 1;

        if state.in_prep {
            state.pending_merged_type = Some(match state.pending_merged_type {
                Some(existing) => merge_work_types(existing, item.work_type),
                None => item.work_type,
            });
            state.pending_rebuild_lane = state.pending_rebuild_lane || item.lane == Lane::Rebuild;
            return None;
        }

        state.in_prep = true;
        let generation = state.latest_generation;
        Some(DispatchTask { item: item.clone().with_generation(generation), generation })
    }

    pub fn on_prep_completed(&self, prepared: &PreparedWork) -> Option<DispatchTask> {
        let key = prepared.path.to_string_lossy().into_owned();
        let mut entry = self.paths.get_mut(&key)?;

        if let Some(merged_type) = entry.pending_merged_type.take() {
            let lane = if entry.pending_rebuild_lane { Lane::Rebuild } else { Lane::Live };
            let generation = entry.latest_generation;
            let task = DispatchTask {
                item: WorkItem::new(merged_type, prepared.path.clone(), lane).with_generation(generation),
                generation,
            };
            entry.pending_rebuild_lane = false;
            entry.in_prep = true;
            Some(task)
        } else {
            entry.in_prep = false;
            None
        }
    }

    pub fn is_stale_prepared(&self, prepared: &PreparedWork) -> bool {
        let key = prepared.path.to_string_lossy().into_owned();
        match self.paths.get(&key) {
            Some(state) => prepared.generation < state.latest_generation,
            None => false,
        }
    }

    pub fn pending_merged_count(&self) -> usize {
        self.paths.iter().filter(|e| e.pending_merged_type.is_some()).count()
    }

    pub fn reset(&self) {
        self.paths.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn work_item(work_type: WorkType, path: &str) -> WorkItem {
        WorkItem::new(work_type, PathBuf::from(path), Lane::Live)
    }

    fn prepared(path: &str, generation: u64) -> PreparedWork {
        use crate::types::{ItemKind, Sensitivity, ValidationResult};
        PreparedWork {
            work_type: WorkType::NewFile,
            path: PathBuf::from(path),
            validation: ValidationResult::Include,
            size: None,
            created_at: None,
            modified_at: None,
            sensitivity: Sensitivity::Normal,
            kind: ItemKind::Text,
            parent_path: String::new(),
            content_hash: None,
            chunks: Vec::new(),
            extracted: false,
            non_extractable: false,
            failure: None,
            generation,
            retry_count: 0,
            lane: Lane::Live,
        }
    }

    #[test]
    fn first_ingress_dispatches_immediately() {
        let actor = PathStateActor::new();
        let task = actor.on_ingress(&work_item(WorkType::NewFile, "/a")).unwrap();
        assert_eq!(task.generation, 1);
        // The dispatched WorkItem itself must carry the generation through
        // to the prep queue — this is what `Indexer::prepare_work_item`
        // ultimately sees.
        assert_eq!(task.item.generation, 1);
    }

    #[test]
    fn concurrent_ingress_coalesces_into_pending_merge() {
        let actor = PathStateActor::new();
        actor.on_ingress(&work_item(WorkType::NewFile, "/a")).unwrap();
        let second = actor.on_ingress(&work_item(WorkType::ModifiedContent, "/a"));
        assert!(second.is_none());
        assert_eq!(actor.pending_merged_count(), 1);
    }

    #[test]
    fn merge_prefers_higher_priority_type() {
        let actor = PathStateActor::new();
        actor.on_ingress(&work_item(WorkType::RescanDirectory, "/a")).unwrap();
        actor.on_ingress(&work_item(WorkType::NewFile, "/a"));
        actor.on_ingress(&work_item(WorkType::Delete, "/a"));

        let prep = prepared("/a", 1);
        let follow_up = actor.on_prep_completed(&prep).unwrap();
        assert_eq!(follow_up.item.work_type, WorkType::Delete);
    }

    #[test]
    fn prep_completed_with_no_pending_clears_in_prep() {
        let actor = PathStateActor::new();
        actor.on_ingress(&work_item(WorkType::NewFile, "/a")).unwrap();
        let prep = prepared("/a", 1);
        assert!(actor.on_prep_completed(&prep).is_none());

        // Fresh ingress after clearing dispatches immediately again.
        let task = actor.on_ingress(&work_item(WorkType::NewFile, "/a")).unwrap();
        assert_eq!(task.generation, 2);
    }

    #[test]
    fn stale_prepared_detected_after_newer_ingress() {
        let actor = PathStateActor::new();
        actor.on_ingress(&work_item(WorkType::NewFile, "/a")).unwrap();
        actor.on_ingress(&work_item(WorkType::ModifiedContent, "/a"));

        let stale = prepared("/a", 1);
        assert!(actor.is_stale_prepared(&stale));

        let current = prepared("/a", 2);
        assert!(!actor.is_stale_prepared(&current));
    }

    #[test]
    fn reset_clears_all_state() {
        let actor = PathStateActor::new();
        actor.on_ingress(&work_item(WorkType::NewFile, "/a")).unwrap();
        actor.reset();
        assert_eq!(actor.pending_merged_count(), 0);
        let task = actor.on_ingress(&work_item(WorkType::NewFile, "/a")).unwrap();
        assert_eq!(task.generation, 1);
    }
}
