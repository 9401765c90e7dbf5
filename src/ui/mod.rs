pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{error, header, info, success, summary_row};
pub use table::{TableBuilder, locations_table, references_table, stats_table};
pub use theme::{Theme, theme};
