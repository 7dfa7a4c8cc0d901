pub mod buyback;
pub mod spike;
pub mod wheel;
