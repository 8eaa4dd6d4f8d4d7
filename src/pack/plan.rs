use std::collections::HashSet;

use crate::cache::{AudioCache, AudioSlot};
use crate::scheduler::Task;
use crate::snapshot::Snapshot;

/// Collect a task for every slot whose cache file does not exist yet.
///
/// Slots already cached are skipped; this is the only thing that makes reruns
/// cheap. Two entries resolving to the same file queue it once.
pub fn plan(snapshot: &Snapshot, cache: &AudioCache) -> Vec<Task> {
    let mut queued = HashSet::new();
    let mut tasks = Vec::new();

    for entry in snapshot {
        for slot in AudioSlot::for_entry(entry) {
            let target = cache.resolve(&slot);
            if cache.exists(&target) || !queued.insert(target.clone()) {
                continue;
            }
            tasks.push(Task {
                text: slot.text,
                target,
                language: slot.language,
            });
        }
    }

    tasks
}
