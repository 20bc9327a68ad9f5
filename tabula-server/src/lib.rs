pub mod http;
pub mod startup;
