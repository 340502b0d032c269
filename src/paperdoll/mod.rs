pub mod features;
pub mod pipeline;
pub mod ports;
pub mod prompt;
pub mod results;
pub mod styles;
pub mod themes;
