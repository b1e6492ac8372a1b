use aq_core::Code;
use thiserror::Error;

pub type RuleResult<T> = Result<T, RuleError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("undefined rule")]
    Undefined,

    #[error("undefined rule clause")]
    ClauseOutOfRange,

    #[error("syntax error in rule clause: {clause}")]
    Syntax { clause: String },

    #[error("mis-placed rule clause: {clause}")]
    Misplaced { clause: String },

    #[error("rule premise names an undefined node: {id}")]
    UndefinedNode { id: String },

    #[error("rule clause names an undefined link: {id}")]
    UndefinedLink { id: String },

    #[error("rule action targets a check valve pipe: {id}")]
    ActionOnCheckValve { id: String },

    #[error("function call contains code out of range")]
    CodeOutOfRange,
}

impl RuleError {
    pub fn code(&self) -> Code {
        match self {
            RuleError::Undefined => Code::UndefinedRule,
            RuleError::ClauseOutOfRange => Code::UndefinedRuleClause,
            RuleError::Syntax { .. } => Code::SyntaxError,
            RuleError::Misplaced { .. } => Code::MisplacedRuleClause,
            RuleError::UndefinedNode { .. } => Code::UndefinedNode,
            RuleError::UndefinedLink { .. } => Code::UndefinedLink,
            RuleError::ActionOnCheckValve { .. } => Code::ControlOnCheckValve,
            RuleError::CodeOutOfRange => Code::CodeOutOfRange,
        }
    }
}
