//! The crate-wide error type.
//!
//! An [`Error`] is a stack of frames, outermost first. Each frame holds a
//! message, `key: value` context, and optionally the lower-level error it
//! wraps. Errors are built with [`error!`](crate::error!) and stacked with
//! [`Chainable`].

use std::fmt;
use std::panic::Location;
use std::sync::Arc;
use std::error::Error as StdError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Where in a build an error originated. Only `Config` and `Exhausted`
/// errors abort a build; everything else is logged and counted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Document,
    Cache,
    Compile,
    Publish,
    Exhausted,
    #[default]
    Other,
}

impl ErrorKind {
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorKind::Config | ErrorKind::Exhausted)
    }

    /// The process exit code a binary should use when this kind of error
    /// ends a run.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Config => 2,
            ErrorKind::Exhausted => 12,
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Config => "configuration",
            ErrorKind::Document => "document",
            ErrorKind::Cache => "cache",
            ErrorKind::Compile => "compile",
            ErrorKind::Publish => "publish",
            ErrorKind::Exhausted => "resource exhaustion",
            ErrorKind::Other => "other",
        };

        f.write_str(name)
    }
}

pub type Context = Vec<(Option<String>, String)>;

#[derive(Debug, Clone)]
struct Frame {
    message: String,
    context: Context,
    cause: Option<Arc<dyn StdError + Send + Sync>>,
    location: &'static Location<'static>,
}

#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    frames: Vec<Frame>,
}

impl Error {
    /// An unclassified error with `message` and `context`.
    #[track_caller]
    pub fn new<M: fmt::Display>(message: M, context: Context) -> Self {
        let frame = Frame {
            message: message.to_string(),
            context,
            cause: None,
            location: Location::caller(),
        };

        Error { kind: ErrorKind::Other, frames: vec![frame] }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }

    /// The message of the outermost frame.
    pub fn message(&self) -> &str {
        self.frames.first().map_or("", |frame| frame.message.as_str())
    }

    /// Places `self` behind `other`. The resulting error keeps `other`'s kind
    /// unless `other` is unclassified, in which case it inherits `self`'s.
    pub fn chain(self, mut other: Error) -> Self {
        if other.kind == ErrorKind::Other {
            other.kind = self.kind;
        }

        other.frames.extend(self.frames);
        other
    }
}

impl<E: StdError + Send + Sync + 'static> From<E> for Error {
    #[track_caller]
    fn from(error: E) -> Self {
        let frame = Frame {
            message: error.to_string(),
            context: vec![],
            cause: Some(Arc::new(error)),
            location: Location::caller(),
        };

        Error { kind: ErrorKind::Other, frames: vec![frame] }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backtrace = std::env::var_os("RUST_BACKTRACE").is_some();
        for (depth, frame) in self.frames.iter().enumerate() {
            let indent = " ".repeat(depth * 4);
            let newline = format!("\n{indent}");
            writeln!(f, "{indent}{}", frame.message.replace('\n', &newline))?;
            for (key, value) in &frame.context {
                let value = value.replace('\n', &newline);
                match key {
                    Some(key) => writeln!(f, "{indent}{key}: {value}")?,
                    None => writeln!(f, "{indent}{value}")?,
                }
            }

            let mut source = frame.cause.as_ref().and_then(|cause| cause.source());
            while let Some(cause) = source {
                writeln!(f, "{indent}{cause}")?;
                source = cause.source();
            }

            if backtrace {
                writeln!(f, "{indent}[{}]", frame.location)?;
            }
        }

        Ok(())
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! err {
    ($($token:tt)*) => (Err($crate::error!($($token)*)));
}

/// Builds an [`Error`](crate::error::Error) from a message and optional
/// `key => value` context pairs. A leading `kind: Kind;` classifies it.
///
/// ```
/// use quire::error;
/// use quire::error::ErrorKind;
///
/// let e = error!(kind: Config; "missing source", "path" => "/nope");
/// assert_eq!(e.kind(), ErrorKind::Config);
/// assert!(e.to_string().contains("path: /nope"));
/// ```
#[doc(hidden)]
#[macro_export]
macro_rules! error {
    (@ctx $v:ident) => {};
    (@ctx $v:ident ,) => {};
    (@ctx $v:ident $key:expr => $value:expr $(, $($rest:tt)*)?) => {
        $v.push((Some($key.to_string()), $value.to_string()));
        $($crate::error!(@ctx $v $($rest)*);)?
    };
    (@ctx $v:ident $value:expr $(, $($rest:tt)*)?) => {
        $v.push((None, $value.to_string()));
        $($crate::error!(@ctx $v $($rest)*);)?
    };

    (kind: $kind:ident; $($rest:tt)*) => (
        $crate::error!($($rest)*).with_kind($crate::error::ErrorKind::$kind)
    );

    ($msg:expr $(, $($rest:tt)*)?) => ({
        #[allow(unused_mut)]
        let mut context: $crate::error::Context = Vec::new();
        $($crate::error!(@ctx context $($rest)*);)?
        $crate::error::Error::new($msg, context)
    });
}

/// Stacks context onto the error of a `Result`.
pub trait Chainable<T> {
    fn chain(self, other: impl Into<Error>) -> Result<T>;

    fn chain_with<F, E>(self, f: F) -> Result<T>
        where F: FnOnce() -> E, E: Into<Error>;

    /// Classifies the error, if any, as `kind`.
    fn kind(self, kind: ErrorKind) -> Result<T>;
}

impl<T, E: Into<Error>> Chainable<T> for Result<T, E> {
    #[track_caller]
    fn chain(self, other: impl Into<Error>) -> Result<T> {
        self.map_err(|e| e.into().chain(other.into()))
    }

    #[track_caller]
    fn chain_with<F, Err>(self, f: F) -> Result<T>
        where F: FnOnce() -> Err, Err: Into<Error>,
    {
        self.map_err(|e| e.into().chain(f().into()))
    }

    fn kind(self, kind: ErrorKind) -> Result<T> {
        self.map_err(|e| e.into().with_kind(kind))
    }
}

#[cfg(test)] static_assertions::assert_impl_all!(Error: Send, Sync, Clone);
