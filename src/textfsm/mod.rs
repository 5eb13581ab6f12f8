//! Declarative extraction of records from CLI output.
//!
//! Templates are written in a TextFSM-style format: value declarations
//! followed by states of line-matching rules. See [`Template`].

mod engine;
mod template;

pub use engine::Record;
pub use template::{Template, TemplateError, TemplateResult};
