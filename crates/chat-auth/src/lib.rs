pub mod public_path;
pub mod resolver;
pub mod validator;

pub use resolver::{Decision, DecisionSource, PermissionResolver};
pub use validator::{validate, ValidationError};
