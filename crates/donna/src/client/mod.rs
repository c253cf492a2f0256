//! Client core: event transport plus transcript reducer.
//!
//! The transport delivers an ordered stream of [`TransportSignal`]s; the
//! reducer folds those into a transcript. Data flows one way for
//! structure (event -> reducer -> transcript) and one way for commands
//! (user input -> command -> transport). The reducer never talks to the
//! transport except through commands returned to the caller.

pub mod reducer;
pub mod transport;

pub use reducer::{Block, Message, PendingPermission, Role, Transcript};
pub use transport::{ChatTransport, TransportConfig, TransportSignal};
