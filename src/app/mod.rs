mod dispatch;
pub mod navigator;
mod selection;
mod state;

pub use dispatch::Intent;
pub use navigator::{Frame, Mode, Navigator};
pub use state::State;
