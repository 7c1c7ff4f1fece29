//! Database persistence layer for player accounts and match history.

mod error;
mod models;
mod repository;
mod schema;

pub use error::{DbError, DbErrorKind};
pub use models::{MatchRecord, NewMatchRecord, NewPlayerRecord, PlayerRecord};
pub use repository::AccountRepository;
