pub mod result_set;
pub mod row;

pub use result_set::{ColumnDesc, QueryDetail, ResultSet};
pub use row::Row;
