pub mod mock;
pub mod model_store;

pub use mock::InMemoryModelStore;
pub use model_store::JsonModelStore;
