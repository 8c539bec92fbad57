pub mod agent;
pub mod catalog;
pub mod errors;
pub mod models;
pub mod prompt_template;
pub mod providers;
pub mod retrieval;
pub mod tools;
