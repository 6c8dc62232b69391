// Last-published cache and the state differ/publisher

mod cache;
mod publisher;

pub use cache::{LastPublishedState, PublishedFields};
pub use publisher::{PublishReport, StatePublisher};
