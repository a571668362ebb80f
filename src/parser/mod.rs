pub mod card;
pub mod series;
pub mod text;

pub use card::{extract_cards, RESULT_COL};
pub use series::{extract_series, SERIES_SELECT};
