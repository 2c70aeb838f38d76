pub mod destination;
pub mod excel_read;
pub mod package;
