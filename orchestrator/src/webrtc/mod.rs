pub mod bridge;
pub mod merger;
pub mod track;

pub use bridge::WebrtcBridge;
