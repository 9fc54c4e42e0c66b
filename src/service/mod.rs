//! RecordService: generic list/get/create/update/delete over any registered record type.

mod crud;
pub mod request;

pub use crud::RecordService;
pub use request::{parse_sort_entry, ListRequest, Page, Pagination};
