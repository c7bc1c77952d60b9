use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::time::Instant;

use crate::compiler::{Job, Outcome};
use crate::error::{ErrorKind, Result, Chainable};
use crate::util::{file_name, fs::list_files, html_name};

use super::Pipeline;

impl Pipeline {
    /// Every staged source that needs compiling. Distributed pages identical
    /// to the previous build's, with their HTML still cached, are skipped.
    fn jobs(&self) -> Result<Vec<Job>> {
        let staged = list_files(self.stage.path(), "adoc")
            .chain_with(|| error!("failed to list staged sources"))
            .kind(ErrorKind::Config)?;

        let mut jobs = vec![];
        for source in staged {
            let name = file_name(&source);
            let cached = self.config.layout.cache.join(html_name(&name));
            if !self.cache.force_all() && self.stage.unchanged_since_last_build(&name) && cached.is_file() {
                tracing::debug!(page = %name, "distributed page unchanged");
                continue;
            }

            let output_dir = self.stage.path().to_path_buf();
            jobs.push(Job { id: jobs.len() + 1, source, output_dir });
        }

        Ok(jobs)
    }

    /// Compiles the staged sources on a pool of `workers` threads. Outcomes
    /// come back over a channel and are post-processed here, one at a time,
    /// while the remaining jobs run.
    pub(super) fn compile(&mut self) -> Result<()> {
        let jobs = self.jobs()?;
        self.report.jobs = jobs.len();
        if jobs.is_empty() {
            tracing::info!("nothing to compile");
            return Ok(());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|i| format!("compile-{i}"))
            .build()
            .chain_with(|| error!("failed to start compile workers", "workers" => self.config.workers))
            .kind(ErrorKind::Exhausted)?;

        tracing::info!(jobs = jobs.len(), workers = self.config.workers, "compiling");
        let (tx, rx) = mpsc::channel::<Outcome>();
        for job in jobs {
            let (tx, compiler) = (tx.clone(), Arc::clone(&self.compiler));
            pool.spawn(move || {
                let start = Instant::now();
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| compiler.compile(&job)))
                    .unwrap_or_else(|_| Outcome::failed(job.clone(), "compiler panicked", start.elapsed()));

                let _ = tx.send(outcome);
            });
        }

        drop(tx);
        for outcome in rx {
            self.complete(outcome)?;
        }

        Ok(())
    }

    fn complete(&mut self, outcome: Outcome) -> Result<()> {
        let doc = outcome.job.doc();
        let page = html_name(&doc);
        if !outcome.success {
            let message = outcome.message.as_deref().unwrap_or("unknown error");
            tracing::error!(job = outcome.job.id, doc = %doc, "compilation failed: {message}");
            self.stage.remove_target(&page);
            self.report.failed += 1;
            return Ok(());
        }

        let elapsed_ms = outcome.elapsed.as_millis() as u64;
        tracing::debug!(job = outcome.job.id, doc = %doc, elapsed_ms, "compiled");

        let output = outcome.job.output();
        let built = self.builder.build_page(&context!(self), &output);
        match built {
            Ok(()) if self.index.contains(&doc) => self.report.compiled += 1,
            Ok(()) => {}
            Err(e) if e.is_fatal() => {
                return Err(e).chain_with(|| error! {
                    "post-processing exhausted system resources; lower the worker count",
                    "doc" => &doc,
                    "workers" => self.config.workers,
                });
            }
            Err(e) => {
                tracing::error!(job = outcome.job.id, doc = %doc, "post-processing failed: {e}");
                self.stage.remove_target(&page);
                self.report.failed += 1;
            }
        }

        Ok(())
    }
}
