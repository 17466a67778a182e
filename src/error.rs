use std::fmt;
use std::path::PathBuf;

/// Upper bound on how much of a compiler or driver diagnostic is kept.
pub const DIAGNOSTIC_LIMIT: usize = 512;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Vertex,
    Fragment,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Vertex => f.write_str("vertex"),
            Stage::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
    #[error("graphics backend is not supported on this platform")]
    UnsupportedBackend,
    #[error("failed to create surface: {0}")]
    Surface(String),
    #[error("no adapter with a graphics queue family that can present to the surface")]
    NoSuitableAdapter,
    #[error("failed to open device: {0}")]
    DeviceOpen(String),
    #[error("gpu call `{call}` failed: {reason}")]
    Gpu { call: &'static str, reason: String },
    #[error("no memory type satisfies the {0} requirements")]
    NoMemoryType(&'static str),
    #[error("could not read image `{path}`: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("image `{0}` has no pixels")]
    EmptyImage(PathBuf),
    #[error("{stage} shader failed to compile:\n{log}")]
    ShaderCompile { stage: Stage, log: String },
    #[error("invalid SPIR-V: {0}")]
    InvalidSpirv(String),
    #[error("{stage} shader has no binding named `{name}`")]
    UnresolvedName { stage: Stage, name: &'static str },
    #[error("failed to create graphics pipeline:\n{0}")]
    PipelineCreation(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wraps a backend error whose only useful rendering is `Debug`.
    pub fn gpu<E: fmt::Debug>(call: &'static str) -> impl FnOnce(E) -> Error {
        move |err| Error::Gpu {
            call,
            reason: format!("{:?}", err),
        }
    }
}

/// Keeps at most `DIAGNOSTIC_LIMIT` bytes of `log`, cut on a char boundary.
pub fn truncate_diagnostic(log: &str) -> String {
    if log.len() <= DIAGNOSTIC_LIMIT {
        return log.to_owned();
    }
    let mut end = DIAGNOSTIC_LIMIT;
    while !log.is_char_boundary(end) {
        end -= 1;
    }
    log[..end].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_diagnostic_is_kept_whole() {
        assert_eq!(truncate_diagnostic("ERROR: 0:3: 'x' : undeclared"), "ERROR: 0:3: 'x' : undeclared");
    }

    #[test]
    fn long_diagnostic_is_cut_at_limit() {
        let log = "e".repeat(2000);
        assert_eq!(truncate_diagnostic(&log).len(), DIAGNOSTIC_LIMIT);
    }

    #[test]
    fn cut_never_splits_a_char() {
        let mut log = "a".repeat(DIAGNOSTIC_LIMIT - 1);
        log.push('é');
        log.push_str("tail");
        let cut = truncate_diagnostic(&log);
        assert_eq!(cut.len(), DIAGNOSTIC_LIMIT - 1);
        assert!(cut.chars().all(|c| c == 'a'));
    }

    #[test]
    fn gpu_error_keeps_call_name() {
        let err = Error::gpu("create_buffer")("OutOfMemory");
        assert_eq!(err.to_string(), "gpu call `create_buffer` failed: \"OutOfMemory\"");
    }
}
