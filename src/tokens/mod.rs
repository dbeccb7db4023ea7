pub mod auditor;
pub mod generator;
pub mod issuer;
pub mod validator;

pub use generator::{generate_secret, is_well_formed, SECRET_LEN};
pub use issuer::{get_or_create_link, IssueError, LinkRequest, TtlBounds};
pub use validator::{validate, DenyReason, Validation};
