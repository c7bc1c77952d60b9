//! The external document compiler.

use std::fmt::{Debug, Write};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::config::{CompilerSettings, Directive};
use crate::util::html_name;

/// One compilation request: `source` is compiled into `output_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: usize,
    pub source: PathBuf,
    pub output_dir: PathBuf,
}

impl Job {
    pub fn doc(&self) -> String {
        crate::util::file_name(&self.source)
    }

    /// Where a successful compilation leaves its HTML.
    pub fn output(&self) -> PathBuf {
        self.output_dir.join(html_name(&self.doc()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub job: Job,
    pub success: bool,
    /// Diagnostics of a failed compilation.
    pub message: Option<String>,
    pub elapsed: Duration,
}

impl Outcome {
    pub fn failed<M: Into<String>>(job: Job, message: M, elapsed: Duration) -> Self {
        Outcome { job, success: false, message: Some(message.into()), elapsed }
    }
}

/// Compiles a single document. Implementations are called from many worker
/// threads at once and must never panic for an ordinary failure.
pub trait Compiler: Send + Sync + Debug {
    fn compile(&self, job: &Job) -> Outcome;
}

/// Runs a shell command per job.
#[derive(Debug, Clone)]
pub struct ShellCompiler {
    command: String,
    attributes: String,
    timeout: Duration,
}

fn quote(string: &str) -> String {
    format!("'{}'", string.replace('\'', r"'\''"))
}

fn quote_path(path: &Path) -> String {
    quote(&path.to_string_lossy())
}

impl ShellCompiler {
    pub fn new(settings: &CompilerSettings, timeout: Duration) -> Self {
        let mut attributes = String::new();
        for (key, directive) in &settings.attributes {
            let _ = match directive {
                Directive::Flag(true) => write!(attributes, " -a {}", quote(key)),
                Directive::Flag(false) => write!(attributes, " -a {}", quote(&format!("{key}!"))),
                Directive::Value(value) => write!(attributes, " -a {}", quote(&format!("{key}={value}"))),
            };
        }

        ShellCompiler {
            command: settings.command.clone(),
            attributes: attributes.trim_start().to_string(),
            timeout,
        }
    }

    pub fn command_line(&self, job: &Job) -> String {
        self.command
            .replace("{attributes}", &self.attributes)
            .replace("{output}", &quote_path(&job.output_dir))
            .replace("{input}", &quote_path(&job.source))
    }

    fn run(&self, job: &Job) -> Result<(), String> {
        let line = self.command_line(job);
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&line)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to spawn `{line}`: {e}"))?;

        let mut stderr = child.stderr.take();
        let reader = std::thread::spawn(move || {
            let mut buf = String::new();
            if let Some(stderr) = stderr.as_mut() {
                let _ = stderr.read_to_string(&mut buf);
            }

            buf
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(format!("timed out after {}s", self.timeout.as_secs()));
                }
                Ok(None) => std::thread::sleep(Duration::from_millis(20)),
                Err(e) => return Err(format!("failed to wait for compiler: {e}")),
            }
        };

        let diagnostics = reader.join().unwrap_or_default();
        if !status.success() {
            return Err(format!("compiler exited with {status}: {}", diagnostics.trim()));
        }

        if !job.output().is_file() {
            return Err(format!("compiler produced no output: {}", diagnostics.trim()));
        }

        Ok(())
    }
}

impl Compiler for ShellCompiler {
    fn compile(&self, job: &Job) -> Outcome {
        let start = Instant::now();
        match self.run(job) {
            Ok(()) => Outcome { job: job.clone(), success: true, message: None, elapsed: start.elapsed() },
            Err(message) => Outcome::failed(job.clone(), message, start.elapsed()),
        }
    }
}

#[cfg(test)]
mod compiler_tests {
    use std::collections::BTreeMap;

    use super::*;

    fn settings(command: &str) -> CompilerSettings {
        let mut attributes = BTreeMap::new();
        attributes.insert("toc".to_string(), Directive::Value("left".into()));
        attributes.insert("linkcss".to_string(), Directive::Flag(true));
        attributes.insert("webfonts".to_string(), Directive::Flag(false));
        CompilerSettings { command: command.into(), attributes }
    }

    fn job(dir: &Path, name: &str) -> Job {
        std::fs::write(dir.join(name), "= Doc\n").unwrap();
        Job { id: 1, source: dir.join(name), output_dir: dir.to_path_buf() }
    }

    #[test]
    fn command_line_substitution() {
        let compiler = ShellCompiler::new(&settings("adoc {attributes} -D {output} {input}"), Duration::from_secs(1));
        let job = Job { id: 1, source: "/s/it's.adoc".into(), output_dir: "/tmp/out".into() };
        assert_eq!(
            compiler.command_line(&job),
            r"adoc -a 'linkcss' -a 'toc=left' -a 'webfonts!' -D '/tmp/out' '/s/it'\''s.adoc'"
        );

        assert_eq!(job.output(), Path::new("/tmp/out/it's.html"));
    }

    #[test]
    fn successful_command_with_output() {
        let tmp = tempfile::tempdir().unwrap();
        let compiler = ShellCompiler::new(&settings("sed 's/= //' {input} > {output}/a.html"), Duration::from_secs(10));
        let outcome = compiler.compile(&job(tmp.path(), "a.adoc"));
        assert!(outcome.success, "{:?}", outcome.message);
        assert_eq!(std::fs::read_to_string(tmp.path().join("a.html")).unwrap(), "Doc\n");
    }

    #[test]
    fn failures_are_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let compiler = ShellCompiler::new(&settings("echo broken >&2; exit 3"), Duration::from_secs(10));
        let outcome = compiler.compile(&job(tmp.path(), "a.adoc"));
        assert!(!outcome.success);
        assert!(outcome.message.unwrap().contains("broken"));

        let compiler = ShellCompiler::new(&settings("true"), Duration::from_secs(10));
        let outcome = compiler.compile(&job(tmp.path(), "b.adoc"));
        assert!(!outcome.success);
        assert!(outcome.message.unwrap().contains("no output"));
    }

    #[test]
    fn slow_jobs_time_out() {
        let tmp = tempfile::tempdir().unwrap();
        let compiler = ShellCompiler::new(&settings("sleep 5"), Duration::from_millis(100));
        let start = Instant::now();
        let outcome = compiler.compile(&job(tmp.path(), "a.adoc"));
        assert!(!outcome.success);
        assert!(outcome.message.unwrap().contains("timed out"));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
