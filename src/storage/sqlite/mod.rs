//! `SQLite` storage backends.
//!
//! Contacts and suggestions share one database file but each backend holds
//! its own connection. WAL mode lets them work side by side.
//!
//! - [`connection`]: lock acquisition, pragmas, error mapping
//! - [`SqliteContactRepository`]: contacts with phone/email child rows
//! - [`SqliteSuggestionStore`]: one suggestion row per unordered pair

mod connection;
mod contacts;
mod suggestions;

pub use connection::{acquire_lock, configure_connection};
pub use contacts::SqliteContactRepository;
pub use suggestions::SqliteSuggestionStore;
