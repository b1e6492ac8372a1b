use aq_core::Code;
use thiserror::Error;

pub type ProjectResult<T> = Result<T, ProjectError>;

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("no network data available")]
    NotOpen,

    #[error("project already contains a network")]
    AlreadyOpen,

    #[error("hydraulics not initialized")]
    HydNotOpen,

    #[error("no hydraulics for water quality analysis")]
    NoHydResults,

    #[error("water quality not initialized")]
    QualNotOpen,

    #[error("no results saved to report on")]
    NoResults,

    #[error("hydraulics supplied from external file")]
    HydFileInUse,

    #[error("cannot use external file while hydraulics solver is active")]
    HydOpenWhenUsingFile,

    #[error("identical file names")]
    SameFileNames,

    #[error("function call contains code out of range")]
    CodeOutOfRange,

    #[error("illegal numeric value")]
    BadValue,

    #[error("cannot delete node that traces water quality")]
    TraceNodeUndeletable,

    #[error("cannot delete element referenced by controls or rules")]
    ElementUndeletable,

    #[error("undefined demand category")]
    UndefinedDemand,

    #[error("node has no coordinates")]
    NoCoordinates,

    #[error("no water quality source at node")]
    NoSourceAtNode,

    #[error("pump has no efficiency curve")]
    NoEfficiencyCurve,

    #[error("undefined control")]
    UndefinedControl,

    #[error(transparent)]
    Network(#[from] aq_network::NetworkError),

    #[error(transparent)]
    Rule(#[from] aq_rules::RuleError),

    #[error(transparent)]
    Hyd(#[from] aq_hydraul::HydError),

    #[error(transparent)]
    Qual(#[from] aq_quality::QualError),

    #[error(transparent)]
    Io(#[from] aq_io::IoError),
}

impl ProjectError {
    /// The numeric public error code.
    pub fn code(&self) -> Code {
        match self {
            ProjectError::NotOpen => Code::NotOpen,
            ProjectError::AlreadyOpen => Code::InputFileOpen,
            ProjectError::HydNotOpen => Code::HydNotOpen,
            ProjectError::NoHydResults => Code::NoHydResults,
            ProjectError::QualNotOpen => Code::QualNotOpen,
            ProjectError::NoResults => Code::NoQualResults,
            ProjectError::HydFileInUse => Code::HydFileInUse,
            ProjectError::HydOpenWhenUsingFile => Code::HydOpenWhenUsingFile,
            ProjectError::SameFileNames => Code::SameFileNames,
            ProjectError::CodeOutOfRange => Code::CodeOutOfRange,
            ProjectError::BadValue => Code::BadValue,
            ProjectError::TraceNodeUndeletable => Code::TraceNodeUndeletable,
            ProjectError::ElementUndeletable => Code::ControlledElementUndeletable,
            ProjectError::UndefinedDemand => Code::UndefinedDemand,
            ProjectError::NoCoordinates => Code::NoCoordinates,
            ProjectError::NoSourceAtNode => Code::NoSourceAtNode,
            ProjectError::NoEfficiencyCurve => Code::NoEfficiencyCurve,
            ProjectError::UndefinedControl => Code::UndefinedControl,
            ProjectError::Network(e) => e.code(),
            ProjectError::Rule(e) => e.code(),
            ProjectError::Hyd(e) => e.code(),
            ProjectError::Qual(e) => e.code(),
            ProjectError::Io(e) => e.code(),
        }
    }
}
