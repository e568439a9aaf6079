pub mod entity;
pub mod holder;

pub use entity::ConfigEntity;
