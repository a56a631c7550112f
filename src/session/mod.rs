pub mod attempt;
pub mod module;
pub mod result;
