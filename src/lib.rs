//! A linked card graph of markdown notes and indexes, browsed through a
//! breadcrumb navigator and searchable through a ranked inverted index.

pub mod app;
pub mod config;
pub mod editor;
pub mod error;
pub mod graph;
pub mod persist;
pub mod search;
pub mod store;

pub use app::{Intent, Mode, State};
pub use config::Config;
pub use error::{CardError, CardResult};
pub use store::{Card, CardId, CardStore, IndexRef, Note};
