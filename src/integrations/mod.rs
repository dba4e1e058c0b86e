//! External service integrations.

pub mod auth {
    pub use crate::auth::*;
}

pub mod workflow_client {
    pub use crate::workflow_client::*;
}
