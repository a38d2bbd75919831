//! Errors raised while setting up or driving a reconstruction.
//!
//! Setup-time contract violations are never recovered from: they propagate
//! out of constructors and `init` methods to the caller. Numerical trouble on
//! individual rays during the SART loop is not an error; such rays are
//! skipped.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Wrong file: {0}")]
    WrongFile(String),

    #[error("Wrong argument: {0}")]
    WrongArg(String),

    #[error("Object used before initialization: {0}")]
    NotInitialized(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Index {index} out of bounds for size {size}")]
    OutOfBound { index: usize, size: usize },

    #[error("Negative solid angle: {value}")]
    BadSolidAngle { value: f64 },

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Could not parse `{text}` in {context}")]
    Parse { text: String, context: String, #[source] source: Box<dyn std::error::Error + Send + Sync> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Binary encoding error: {0}")]
    Binary(#[from] binrw::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn parse<E>(text: &str, context: &str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Parse { text: text.to_string(), context: context.to_string(), source: Box::new(source) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_keeps_its_source() {
        let source = "x".parse::<f64>().unwrap_err();
        let err = Error::parse("x", "sinogram header", source);
        assert_eq!(err.to_string(), "Could not parse `x` in sinogram header");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn io_errors_convert() {
        fn open() -> Result<std::fs::File> {
            Ok(std::fs::File::open("/this/path/does/not/exist")?)
        }
        assert!(matches!(open(), Err(Error::Io(_))));
    }
}
