pub mod context;
pub mod resources;
pub mod tasks;

pub use context::AppContext;
pub use resources::AppResources;
pub use tasks::AppTasks;
