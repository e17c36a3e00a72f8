pub mod chains;
pub mod external_modules;
pub mod files;
pub mod health;
pub mod modules;
pub mod results;
pub mod tasks;
