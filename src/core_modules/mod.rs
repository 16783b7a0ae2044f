pub mod audit;
pub mod image_quality;
pub mod issue;
pub mod lifecycle;
pub mod manifest;
pub mod pixel;
pub mod report;
pub mod snapshot;
pub mod validator;
