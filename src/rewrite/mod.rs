pub mod npm;
pub mod pypi_project;
pub mod pypi_simple;
