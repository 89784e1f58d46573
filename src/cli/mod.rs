pub mod scrape;
pub mod setup;
pub mod ui;
