// src/clustering/mod.rs
pub mod community;
pub mod form_letters;
pub mod representatives;
pub mod similarity_graph;
#[cfg(test)]
pub(crate) mod test_fixtures;
pub mod unique_count;
