pub mod catalog;
pub mod composer;
pub mod config_store;
pub mod inference;
pub mod main_ui_html;
pub mod path_utils;
pub mod server;
pub mod upstream;
pub mod workflow;
