//! Parallel synthesis of missing cache files.
//!
//! Every task runs on its own worker with its own engine instance. A failing or
//! panicking task only produces a failed [`TaskOutcome`]; its siblings and the
//! scheduler keep going. [`SynthesisScheduler::run`] returns once every task has
//! finished, with one outcome per task in task order.

use std::any::Any;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use rayon::prelude::*;

use crate::cache::AudioCache;
use crate::error::{PackError, SynthesisError};
use crate::{EngineFactory, Language, SynthesisEngine};

/// A pending synthesis: speak `text` in `language` into `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub text: String,
    pub target: PathBuf,
    pub language: Language,
}

/// Result of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub target: PathBuf,
    pub success: bool,
    /// Human-readable result or error message.
    pub detail: String,
    /// The file already existed when the task ran; nothing was synthesized.
    pub reused: bool,
}

impl TaskOutcome {
    fn synthesized(task: &Task) -> Self {
        Self {
            target: task.target.clone(),
            success: true,
            detail: "synthesized".to_string(),
            reused: false,
        }
    }

    fn reused(task: &Task) -> Self {
        Self {
            target: task.target.clone(),
            success: true,
            detail: "already cached".to_string(),
            reused: true,
        }
    }

    fn failed(task: &Task, detail: String) -> Self {
        Self {
            target: task.target.clone(),
            success: false,
            detail,
            reused: false,
        }
    }
}

/// Fans tasks out over a bounded pool of worker threads.
pub struct SynthesisScheduler<'a, F> {
    cache: &'a AudioCache,
    factory: &'a F,
    workers: usize,
}

impl<'a, F: EngineFactory> SynthesisScheduler<'a, F> {
    pub fn new(cache: &'a AudioCache, factory: &'a F, workers: usize) -> Self {
        Self {
            cache,
            factory,
            workers: workers.max(1),
        }
    }

    /// Run all tasks and wait for every one of them.
    ///
    /// Only failing to start the worker pool is an error; individual task
    /// failures are reported in the returned outcomes.
    pub fn run(&self, tasks: &[Task]) -> Result<Vec<TaskOutcome>, PackError> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        let workers = self.workers.min(tasks.len());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("synth-{i}"))
            .build()?;
        log::debug!("Running {} synthesis tasks on {workers} workers", tasks.len());

        let outcomes = pool.install(|| {
            tasks
                .par_iter()
                .with_max_len(1)
                .map(|task| self.run_isolated(task))
                .collect()
        });
        Ok(outcomes)
    }

    fn run_isolated(&self, task: &Task) -> TaskOutcome {
        match panic::catch_unwind(AssertUnwindSafe(|| self.run_task(task))) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => TaskOutcome::failed(task, e.to_string()),
            Err(payload) => TaskOutcome::failed(
                task,
                format!("synthesis panicked: {}", panic_message(payload.as_ref())),
            ),
        }
    }

    fn run_task(&self, task: &Task) -> Result<TaskOutcome, SynthesisError> {
        // Another run, or an earlier task writing the same slot, may have won.
        if self.cache.exists(&task.target) {
            return Ok(TaskOutcome::reused(task));
        }
        if task.text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }

        let mut engine = self.factory.create()?;
        let mut temp = self.cache.temp_file_for(&task.target)?;
        engine.synthesize_to_file(&task.text, task.language, temp.path())?;
        temp.flush()?;

        let size = temp.as_file().metadata()?.len();
        if size == 0 {
            return Err(SynthesisError::InvalidAudio(
                "engine produced an empty file".to_string(),
            ));
        }

        self.cache.store(temp, &task.target)?;
        log::debug!("Synthesized {} ({size} bytes)", task.target.display());
        Ok(TaskOutcome::synthesized(task))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
