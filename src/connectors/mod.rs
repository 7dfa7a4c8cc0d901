pub mod messages;
pub mod traits;
pub mod yahoo;

#[cfg(test)]
pub mod fake;
