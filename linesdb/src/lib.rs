pub mod schema;
pub mod operators;
pub mod model;
pub mod collection;
pub mod store;
pub mod error;

pub use error::{LinesDbError, Result};
pub use schema::ModelDescriptor;
pub use store::{Database, ModelHandle, Record};
pub use model::ModelInstance;
pub use collection::Collection;
