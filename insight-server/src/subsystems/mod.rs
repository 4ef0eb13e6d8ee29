pub mod catalog;
pub mod narration;
