pub mod app;
pub mod cli;
pub mod loading;

pub use app::App;
