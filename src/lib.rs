//! Core library for the catalog-append command line application.
//!
//! The library copies rows from selected worksheets of a source workbook
//! into the active sheet of a destination workbook. Workbook IO lives under
//! [`io`], the in-memory cell model in [`model`], the fixed column mappings in
//! [`shape`], allow-list loading in [`config`], and the append pass itself in
//! [`transfer`]. [`inspect`] lists the worksheets a user can choose from.

pub mod config;
pub mod error;
pub mod inspect;
pub mod io;
pub mod model;
pub mod shape;
pub mod transfer;

pub use config::ShapeConfig;
pub use error::{Result, ToolError};
pub use inspect::list_worksheets;
pub use model::{SkipReason, TransferEvent, TransferResult};
pub use shape::ColumnShape;
pub use transfer::{TransferRequest, transfer};
