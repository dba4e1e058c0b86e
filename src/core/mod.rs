// Domain-layer modules and shared errors/models
pub mod models {
    pub use crate::models::*;
}

pub mod services {
    pub use crate::services::*;
}

pub mod store {
    pub use crate::store::*;
}

pub mod errors {
    pub use crate::errors::*;
}
