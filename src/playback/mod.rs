pub mod clock;
pub mod output;
pub mod session;
