pub mod connector;
pub mod controller;
