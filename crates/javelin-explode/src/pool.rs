use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use javelin_core::Artifact;
use javelin_util::cancel::CancellationToken;
use javelin_util::errors::JavelinResult;
use javelin_util::fs as jfs;
use javelin_util::process::{CommandBuilder, CommandRunner, DefaultCommandRunner};

use crate::exploder::Exploder;

/// One unit of decompilation work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompileJob {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub artifact: Artifact,
    /// Local repository, for jobs whose decompiled archive re-enters the
    /// exploder.
    pub m2_repo: Option<PathBuf>,
}

impl DecompileJob {
    fn key(&self) -> (PathBuf, PathBuf) {
        (self.input_path.clone(), self.output_path.clone())
    }
}

/// Predicate applied to each job before execution.
pub type JobFilter = dyn Fn(&DecompileJob) -> bool + Send + Sync;

/// Maximum processing time, in minutes, granted to the decompiler per
/// method. Keeps pathological classes from stalling a worker.
const DECOMPILER_MPM: &str = "-mpm=30";

/// Bounded worker pool invoking the external decompiler.
///
/// Individual job failures are logged and skipped; the batch as a whole
/// succeeds. Cancellation drops the remaining queue.
pub struct DecompilerPool {
    decompiler: PathBuf,
    workers: usize,
    jvm_max_mem: Option<String>,
    runner: Arc<dyn CommandRunner>,
}

/// Shared work queue. `in_flight` tracks jobs taken but not finished so
/// idle workers can tell "queue momentarily empty" from "batch done"
/// (archive jobs re-enqueue the nested work they discover).
struct JobQueue {
    queue: VecDeque<DecompileJob>,
    seen: HashSet<(PathBuf, PathBuf)>,
    in_flight: usize,
}

enum Pop {
    Job(Box<DecompileJob>),
    Wait,
    Finished,
}

impl JobQueue {
    fn new(jobs: Vec<DecompileJob>) -> Self {
        let mut queue = VecDeque::new();
        let mut seen = HashSet::new();
        for job in jobs {
            if seen.insert(job.key()) {
                queue.push_back(job);
            }
        }
        Self {
            queue,
            seen,
            in_flight: 0,
        }
    }

    fn pop(&mut self) -> Pop {
        match self.queue.pop_front() {
            Some(job) => {
                self.in_flight += 1;
                Pop::Job(Box::new(job))
            }
            None if self.in_flight == 0 => Pop::Finished,
            None => Pop::Wait,
        }
    }

    fn push_deduped(&mut self, jobs: Vec<DecompileJob>) {
        for job in jobs {
            if self.seen.insert(job.key()) {
                self.queue.push_back(job);
            }
        }
    }

    fn done(&mut self) {
        self.in_flight -= 1;
    }

    fn drain(&mut self) {
        self.queue.clear();
    }
}

impl DecompilerPool {
    pub fn new(decompiler: impl Into<PathBuf>, workers: usize) -> Self {
        Self::with_runner(decompiler, workers, Arc::new(DefaultCommandRunner))
    }

    pub fn with_runner(
        decompiler: impl Into<PathBuf>,
        workers: usize,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            decompiler: decompiler.into(),
            workers: workers.max(1),
            jvm_max_mem: None,
            runner,
        }
    }

    /// Forward `-Xmx` to each decompiler JVM.
    pub fn jvm_max_mem(mut self, mem: Option<String>) -> Self {
        self.jvm_max_mem = mem;
        self
    }

    /// Run a batch of jobs on `min(workers, |jobs|)` threads.
    ///
    /// When `exploder` is supplied, decompiled archives recursively re-enter
    /// the exploder and the discovered jobs join the same queue; the
    /// artifacts they reveal are returned for the synthesized pom.
    pub fn run(
        &self,
        ctx: &CancellationToken,
        jobs: Vec<DecompileJob>,
        filter: Option<&JobFilter>,
        exploder: Option<(&Exploder, &Path)>,
    ) -> JavelinResult<Vec<Artifact>> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }
        let worker_count = self.workers.min(jobs.len());
        let queue = Mutex::new(JobQueue::new(jobs));
        let found = Mutex::new(Vec::new());

        std::thread::scope(|scope| {
            for _ in 0..worker_count {
                scope.spawn(|| self.worker(ctx, &queue, &found, filter, exploder));
            }
        });

        ctx.check()?;
        Ok(found.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    fn worker(
        &self,
        ctx: &CancellationToken,
        queue: &Mutex<JobQueue>,
        found: &Mutex<Vec<Artifact>>,
        filter: Option<&JobFilter>,
        exploder: Option<(&Exploder, &Path)>,
    ) {
        loop {
            if ctx.is_cancelled() {
                lock(queue).drain();
                return;
            }
            let job = match lock(queue).pop() {
                Pop::Job(job) => job,
                Pop::Finished => return,
                Pop::Wait => {
                    std::thread::sleep(Duration::from_millis(10));
                    continue;
                }
            };
            self.process(ctx, &job, queue, found, filter, exploder);
            lock(queue).done();
        }
    }

    fn process(
        &self,
        ctx: &CancellationToken,
        job: &DecompileJob,
        queue: &Mutex<JobQueue>,
        found: &Mutex<Vec<Artifact>>,
        filter: Option<&JobFilter>,
        exploder: Option<(&Exploder, &Path)>,
    ) {
        if let Some(filter) = filter {
            if !filter(job) {
                return;
            }
        }
        if job.output_path.exists() {
            tracing::debug!(output = %job.output_path.display(), "output exists, skipping");
            return;
        }
        let Some(out_dir) = job.output_path.parent() else {
            return;
        };
        if let Err(err) = jfs::ensure_dir(out_dir) {
            tracing::warn!(dir = %out_dir.display(), %err, "cannot create output directory");
            return;
        }

        if !self.decompile(ctx, job, out_dir) {
            return;
        }

        // A decompiled archive now contains sources; fold them into the
        // project and pick up whatever new jobs they imply.
        if job.artifact.packaging.is_archive() && job.output_path.exists() {
            if let Some((exploder, project_dir)) = exploder {
                match exploder.explode_nested(ctx, &job.output_path, project_dir) {
                    // A cancelled walk still returns what it gathered; keep
                    // it, the workers drain on the same token anyway.
                    Ok(nested) => {
                        lock(queue).push_deduped(nested.jobs);
                        if let Ok(mut found) = found.lock() {
                            found.extend(nested.artifacts);
                        }
                    }
                    Err(err) => {
                        tracing::warn!(
                            archive = %job.output_path.display(),
                            %err,
                            "nested explosion failed"
                        );
                    }
                }
            }
        }
    }

    /// Spawn the external decompiler for one job. Returns whether the run
    /// succeeded; failures are logged, never fatal.
    fn decompile(&self, ctx: &CancellationToken, job: &DecompileJob, out_dir: &Path) -> bool {
        let mut cmd = CommandBuilder::new("java");
        if let Some(ref mem) = self.jvm_max_mem {
            cmd = cmd.arg(format!("-Xmx{mem}"));
        }
        let cmd = cmd
            .arg("-jar")
            .arg(self.decompiler.to_string_lossy())
            .arg(DECOMPILER_MPM)
            .arg(job.input_path.to_string_lossy())
            .arg(out_dir.to_string_lossy())
            .cancellation(ctx.clone());

        match self.runner.run(&cmd) {
            Ok(output) if output.success() => true,
            Ok(output) => {
                tracing::warn!(
                    input = %job.input_path.display(),
                    code = ?output.code,
                    "decompiler failed: {}",
                    output.combined()
                );
                false
            }
            Err(err) => {
                tracing::warn!(input = %job.input_path.display(), %err, "decompiler did not run");
                false
            }
        }
    }
}

fn lock(queue: &Mutex<JobQueue>) -> std::sync::MutexGuard<'_, JobQueue> {
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use javelin_util::errors::JavelinError;
    use javelin_util::process::CommandOutput;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Runner that records invocations instead of spawning `java`.
    #[derive(Debug, Default)]
    struct RecordingRunner {
        calls: AtomicUsize,
        inputs: Mutex<Vec<String>>,
        fail: bool,
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, cmd: &CommandBuilder) -> Result<CommandOutput, JavelinError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut inputs) = self.inputs.lock() {
                inputs.push(cmd.render());
            }
            Ok(CommandOutput {
                code: Some(if self.fail { 1 } else { 0 }),
                ..CommandOutput::default()
            })
        }
    }

    fn job(tmp: &Path, input: &str, output: &str) -> DecompileJob {
        let input_path = tmp.join(input);
        std::fs::write(&input_path, b"class").unwrap();
        DecompileJob {
            input_path,
            output_path: tmp.join(output),
            artifact: Artifact::default(),
            m2_repo: None,
        }
    }

    #[test]
    fn duplicate_jobs_invoke_the_decompiler_once() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::default());
        let pool = DecompilerPool::with_runner("/opt/fernflower.jar", 4, runner.clone());

        let a = job(tmp.path(), "A.class", "out/A.java");
        let jobs = vec![a.clone(), a];
        pool.run(&CancellationToken::new(), jobs, None, None)
            .unwrap();
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn filter_rejects_jobs_before_execution() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::default());
        let pool = DecompilerPool::with_runner("/opt/fernflower.jar", 2, runner.clone());

        let jobs = vec![
            job(tmp.path(), "Keep.class", "out/Keep.java"),
            job(tmp.path(), "Drop.class", "out/Drop.java"),
        ];
        let filter: Box<JobFilter> =
            Box::new(|job: &DecompileJob| !job.input_path.ends_with("Drop.class"));
        pool.run(&CancellationToken::new(), jobs, Some(&*filter), None)
            .unwrap();
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn existing_output_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::default());
        let pool = DecompilerPool::with_runner("/opt/fernflower.jar", 1, runner.clone());

        let existing = job(tmp.path(), "A.class", "done/A.java");
        std::fs::create_dir_all(existing.output_path.parent().unwrap()).unwrap();
        std::fs::write(&existing.output_path, b"// decompiled").unwrap();
        pool.run(&CancellationToken::new(), vec![existing], None, None)
            .unwrap();
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failures_do_not_abort_the_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner {
            fail: true,
            ..RecordingRunner::default()
        });
        let pool = DecompilerPool::with_runner("/opt/fernflower.jar", 2, runner.clone());

        let jobs = vec![
            job(tmp.path(), "A.class", "out/A.java"),
            job(tmp.path(), "B.class", "out/B.java"),
        ];
        let result = pool.run(&CancellationToken::new(), jobs, None, None);
        assert!(result.is_ok());
        assert_eq!(runner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cancellation_drops_remaining_jobs() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::default());
        let pool = DecompilerPool::with_runner("/opt/fernflower.jar", 1, runner.clone());

        let token = CancellationToken::new();
        token.cancel();
        let jobs = vec![
            job(tmp.path(), "A.class", "out/A.java"),
            job(tmp.path(), "B.class", "out/B.java"),
        ];
        let err = pool.run(&token, jobs, None, None).unwrap_err();
        let err: JavelinError = err.downcast().unwrap();
        assert!(matches!(err, JavelinError::Cancelled));
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn decompiler_arguments_follow_the_contract() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::default());
        let pool = DecompilerPool::with_runner("/opt/fernflower.jar", 1, runner.clone())
            .jvm_max_mem(Some("2g".to_string()));

        pool.run(
            &CancellationToken::new(),
            vec![job(tmp.path(), "A.class", "out/A.java")],
            None,
            None,
        )
        .unwrap();

        let calls = runner.inputs.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("java -Xmx2g -jar /opt/fernflower.jar -mpm=30"));
        assert!(calls[0].contains("A.class"));
    }
}
