pub mod artifact;
pub mod attribution;
pub mod config;
pub mod error;
pub mod features;
pub mod loader;
pub mod model;
pub mod pipeline;
pub mod registry;
pub mod schema;
pub mod util;

pub use config::Config;
pub use error::PredictError;
pub use pipeline::TabularPredictor;
pub use schema::{AttributeWeights, Prediction, RawFeatures};
