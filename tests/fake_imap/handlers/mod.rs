//! IMAP command handlers for the fake server.
//!
//! Each module answers one command family: LOGIN/LOGOUT, LIST,
//! SELECT/EXAMINE, UID SEARCH and UID FETCH.

mod list;
mod session;
mod uid_search;

pub use list::handle_list;
pub use select::handle_select;
pub use session::{handle_login, handle_logout};
pub use uid_fetch::handle_uid_fetch;
pub use uid_search::handle_uid_search;
