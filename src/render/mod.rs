pub mod frame;
pub mod style;
pub mod target;
pub mod terminal;
pub mod text;
