use std::process::ExitCode;

use quire::BuildOptions;
use tracing_subscriber::EnvFilter;

mod workflow;

mod flags {
    use std::path::PathBuf;

    xflags::xflags! {
        /// Incremental builds of metadata-indexed AsciiDoc repositories.
        cmd quill {
            /// Log level: error, warn, info, debug or trace. Defaults to
            /// `RUST_LOG`, or `info`.
            optional -L, --log-level level: String

            /// Build the repository described by a configuration file.
            cmd build {
                required config: PathBuf
                /// Recompile every document and page.
                optional -f, --force
                /// Number of concurrent compile jobs.
                optional -w, --workers workers: usize
            }

            /// Print the settings of a repository.
            cmd info {
                required config: PathBuf
            }

            /// Create a repository at `path` using `theme`.
            cmd create {
                required theme: String
                required path: PathBuf
            }

            /// List the available themes.
            cmd themes {}

            /// List the apps of a theme.
            cmd apps {
                required theme: String
            }
        }
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|e| {
            eprintln!("invalid log level {level:?} ({e}); using `info`");
            EnvFilter::new("info")
        }),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let flags = flags::Quill::from_env_or_exit();
    init_logging(flags.log_level.as_deref());

    let result = match flags.subcommand {
        flags::QuillCmd::Build(cmd) => {
            let options = BuildOptions { force: cmd.force, workers: cmd.workers };
            workflow::build(&cmd.config, options)
        }
        flags::QuillCmd::Info(cmd) => workflow::info(&cmd.config),
        flags::QuillCmd::Create(cmd) => workflow::create(&cmd.theme, &cmd.path),
        flags::QuillCmd::Themes(_) => workflow::themes(),
        flags::QuillCmd::Apps(cmd) => workflow::apps(&cmd.theme),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(kind = %e.kind(), "{e}");
            ExitCode::from(e.kind().exit_code() as u8)
        }
    }
}
