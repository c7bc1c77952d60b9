#![doc = svgbobdoc::transform!(
//! Incremental builds of static sites from AsciiDoc repositories.
//!
//! # Overview
//!
//! Quire turns a directory of AsciiDoc documents into a browsable site.
//! Every document carries a header of `:key: value, value` attributes; on top
//! of the documents themselves, quire generates one page per attribute key
//! listing its values and one page per key/value pair listing the documents
//! that carry it.
//!
//! Builds are incremental. Each document is fingerprinted, and the
//! fingerprints are compared with the ones persisted by the previous build.
//! Only documents that changed, and only aggregate pages whose membership
//! changed, are handed to the external compiler.
//!
//! A build runs the following stages:
//!
//! ```svgbob
//!  +-----------+   +----------+   +------------+   +------+
//!  | configure |-->| discover |-->| preprocess |-->| plan |
//!  +-----------+   +----------+   +-----+------+   +--+---+
//!                                       |             |
//!                                  .----+----.        v
//!                                 | kbdict   |   +----------+
//!                                 | (cache)  |   | generate |
//!                                  '---------'   +----+-----+
//!                                                     |
//!  +---------+   +---------+   +----------------------+-----+
//!  | cleanup |<--| publish |<--| compile: N workers -> chan |
//!  +---------+   +---------+   +----------------------------+
//! ```
//!
//! 1. The [configuration](config::Config) is validated and the
//!    [theme](theme::Theme) resolved.
//! 2. The theme's [page builder](builder::PageBuilder) may generate sources,
//!    then the source directory is listed.
//! 3. Every document is [extracted](extract::extract),
//!    [fingerprinted](fingerprint), registered in the
//!    [index](index::DocumentIndex) and recorded in the
//!    [cache](cache::CacheStore). Documents that must be compiled are
//!    written to a scratch [stage](stage::Stage). The cache is persisted.
//! 4. Key and key/value pages are [planned](pipeline::Plan).
//! 5. The page builder stages the aggregate pages that must be rebuilt.
//! 6. A bounded worker pool runs the [compiler](compiler::Compiler) over the
//!    stage; each compiled page is post-processed as it comes back.
//! 7. The target is [refreshed](deploy::publish) from the cache of compiled
//!    pages.
//! 8. The scratch directory is removed.
//!
//! ```no_run
//! use quire::{BuildOptions, Config, Pipeline};
//!
//! let config = Config::load("repo/config/repo.toml", BuildOptions::default())?;
//! let report = Pipeline::new(config)?.run()?;
//! println!("{} compiled, {} kept", report.compiled, report.kept);
//! # Ok::<(), quire::Error>(())
//! ```
)]

#[macro_use]
pub mod error;
pub mod util;
pub mod fingerprint;
pub mod extract;
pub mod datetime;
pub mod index;
pub mod cache;
pub mod config;
pub mod templating;
pub mod theme;
pub mod stage;
pub mod compiler;
pub mod builder;
pub mod pipeline;
pub mod deploy;

pub use error::{Error, ErrorKind, Result};
pub use config::{BuildOptions, Config, RepoConfig};
pub use pipeline::{BuildReport, Pipeline};
