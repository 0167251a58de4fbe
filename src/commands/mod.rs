pub mod completions;
pub mod rotate;
pub mod store;

pub use completions::CompletionsCommand;
pub use rotate::RotateCommand;
pub use store::StoreCommand;
