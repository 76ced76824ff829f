//! Generated API documentation and its HTML viewer.

pub mod generator;
pub mod ui;

pub use generator::generate;
pub use ui::SWAGGER_UI_HTML;
