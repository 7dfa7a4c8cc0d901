pub mod buyback;
pub mod cooldown;
pub mod sink;
pub mod spike;
pub mod worker;
