use aq_core::Code;
use thiserror::Error;

pub type IoResult<T> = Result<T, IoError>;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("cannot open input file")]
    InputOpen,

    #[error("cannot open report file")]
    ReportOpen,

    #[error("cannot open output file")]
    OutputOpen,

    #[error("cannot open hydraulics file")]
    HydOpen,

    #[error("hydraulics file does not match network data")]
    HydMismatch,

    #[error("cannot write to report file")]
    ReportWrite,

    #[error("{0}: syntax error at line {1}")]
    Syntax(String, usize),

    #[error("network error: {0}")]
    Network(#[from] aq_network::NetworkError),

    #[error("rule error: {0}")]
    Rule(#[from] aq_rules::RuleError),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failure: {0}")]
    Json(#[from] serde_json::Error),
}

impl IoError {
    pub fn code(&self) -> Code {
        match self {
            IoError::InputOpen => Code::InputFileOpen,
            IoError::ReportOpen => Code::ReportFileOpen,
            IoError::OutputOpen => Code::OutputFileOpen,
            IoError::HydOpen => Code::HydFileOpen,
            IoError::HydMismatch => Code::HydFileMismatch,
            IoError::ReportWrite => Code::ReportFileWrite,
            IoError::Syntax(_, _) => Code::SyntaxError,
            IoError::Network(e) => e.code(),
            IoError::Rule(e) => e.code(),
            IoError::Io(_) => Code::HydFileOpen,
            IoError::Json(_) => Code::OutputFileOpen,
        }
    }
}
