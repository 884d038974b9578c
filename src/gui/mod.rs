pub mod frontend;
pub mod graph_view;
