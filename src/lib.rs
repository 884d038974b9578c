pub mod error;
pub mod gql;
pub mod graph_utils;
pub mod gui;
pub mod llm;
pub mod persistence;
pub mod session;
