pub mod error;
pub mod images;

pub use error::ApiError;
