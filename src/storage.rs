pub mod attachments;
pub mod templates;

pub use attachments::{AttachmentStore, PromoteOutcome};
pub use templates::TemplateStore;
