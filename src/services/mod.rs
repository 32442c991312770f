pub mod aggregator;
pub mod entity_resolver;
pub mod explanation;
pub mod providers;
pub mod recommendation_source;
pub mod recommendations;

pub use recommendations::{Collaborators, RecommendationService};
