pub mod history;
pub mod input;

pub use history::{History, HistoryEntry, StoreEdit};
pub use input::{process_key, InputAction};
