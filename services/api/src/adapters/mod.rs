pub mod db;
pub mod seed;

pub use db::DbAdapter;
pub use seed::SeedData;
