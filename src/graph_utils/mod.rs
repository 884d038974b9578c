pub mod layout;
pub mod projection;
pub mod result_set;
