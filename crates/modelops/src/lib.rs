pub mod cancel;
pub mod controller;
pub mod error;
pub mod progress;
pub mod provider;
mod runner;
pub mod schema;
pub mod store;

pub use cancel::CancellationRegistry;
pub use controller::PullJobs;
pub use error::{PullError, Result};
pub use progress::{parse_chunk, ProgressUpdate};
pub use provider::{ChunkStream, ProviderInfo, PullProvider};
pub use schema::*;
pub use store::JobStore;
