pub mod app;

pub mod db;

mod name;
pub use name::Name;
