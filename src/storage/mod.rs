pub mod export;
pub mod positions;
pub mod presets;
