mod component;
mod string;
pub mod text;

pub use component::{Component, ComponentKey, InsertPolicy};
pub use string::LangString;
pub use text::TextFormat;
