//! Command-line replay of the dashboard refresh engine over EVE JSON.

pub mod render;
pub mod script;

pub use render::{TextFactory, TextSink, render_chart};
pub use script::{Click, Frame, ReplayError, Script, run};
