//! JSON lines protocol spoken with the dashboard backend

/// Schema definitions as Serde serializable structures and enums
mod message;
pub use message::*;

/// JSON lines codec definition
mod codec;
pub use codec::*;
