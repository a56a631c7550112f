pub mod import;
pub mod question;
pub mod repository;
pub mod selection;

pub use question::Question;
pub use repository::{BankError, InMemoryRepository, QueryFilter, QuestionRepository};
