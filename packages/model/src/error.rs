use crate::ast::NodeTag;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("{tag} nodes have no field `{field}`")]
    UnknownField { tag: NodeTag, field: String },

    #[error("Field `{field}` expects {expected}")]
    InvalidValue {
        field: String,
        expected: &'static str,
    },

    #[error("Field `{0}` cannot be removed")]
    FieldNotRemovable(String),
}
