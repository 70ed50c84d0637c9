pub mod clustering;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod topics;
pub mod utils;
