pub mod api_connection;
pub mod cli;
pub mod config;
pub mod ingredient_parser;
pub mod logging;
pub mod nutrition_calculator;
pub mod preferences;
pub mod recipe_generator;
pub mod storage;
