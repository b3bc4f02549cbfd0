pub mod csv_read;
pub mod directory_export;
pub mod excel_read;
pub mod excel_write;
pub mod import;
pub mod inventory_api;
