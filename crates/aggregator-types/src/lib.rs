pub mod auction;
pub mod common;
pub mod intent;
pub mod messages;
pub mod serde_helpers;

pub use auction::*;
pub use common::*;
pub use intent::*;
pub use messages::*;
