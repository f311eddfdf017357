pub mod history;
pub mod plan;
pub mod profile;
pub mod status;
pub mod topology;
