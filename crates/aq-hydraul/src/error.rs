use aq_core::Code;
use thiserror::Error;

pub type HydResult<T> = Result<T, HydError>;

#[derive(Error, Debug)]
pub enum HydError {
    #[error("hydraulics not initialized")]
    NotOpen,

    #[error("cannot solve network hydraulic equations")]
    Unsolvable,

    #[error("network error: {0}")]
    Network(#[from] aq_network::NetworkError),
}

impl HydError {
    pub fn code(&self) -> Code {
        match self {
            HydError::NotOpen => Code::HydNotOpen,
            HydError::Unsolvable => Code::EquationsUnsolvable,
            HydError::Network(e) => e.code(),
        }
    }
}
