use aq_core::Code;
use thiserror::Error;

pub type QualResult<T> = Result<T, QualError>;

#[derive(Error, Debug)]
pub enum QualError {
    #[error("water quality not initialized")]
    NotOpen,

    #[error("no water quality source at node")]
    NoSourceAtNode,

    #[error("network error: {0}")]
    Network(#[from] aq_network::NetworkError),
}

impl QualError {
    pub fn code(&self) -> Code {
        match self {
            QualError::NotOpen => Code::QualNotOpen,
            QualError::NoSourceAtNode => Code::NoSourceAtNode,
            QualError::Network(e) => e.code(),
        }
    }
}
